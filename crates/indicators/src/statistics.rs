//! NaN-ignoring whole-raster reductions
//!
//! Every reduction skips NaN cells (masked no-data) and keeps everything
//! else, including infinities produced by a division by zero. Standard
//! deviation is the population form (divide by `n`).

use aquapi_core::raster::Raster;
use aquapi_core::{Error, Result};
use serde::Serialize;

/// Mean of the non-NaN values; NaN when there are none.
pub fn nan_mean<I: IntoIterator<Item = f64>>(values: I) -> f64 {
    let (sum, count) = values
        .into_iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

/// Population standard deviation of the non-NaN values; NaN when there are none.
pub fn nan_std<I>(values: I) -> f64
where
    I: IntoIterator<Item = f64>,
    I::IntoIter: Clone,
{
    let iter = values.into_iter();
    let mean = nan_mean(iter.clone());
    if mean.is_nan() {
        return f64::NAN;
    }
    let (sq, count) = iter
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(s, n), v| (s + (v - mean) * (v - mean), n + 1));
    (sq / count as f64).sqrt()
}

/// The `p`-th percentile (0..=100) of the non-NaN values.
///
/// Values are flattened, NaN entries dropped, and the rest ranked; the
/// result interpolates linearly between the two closest ranks at
/// `p / 100 * (n - 1)`. Returns NaN when no value is left.
pub fn nan_percentile<I: IntoIterator<Item = f64>>(values: I, p: f64) -> Result<f64> {
    if !(0.0..=100.0).contains(&p) {
        return Err(Error::InvalidFactor {
            name: "percentile",
            value: p,
            reason: "must lie between 0 and 100".into(),
        });
    }

    let mut valid: Vec<f64> = values.into_iter().filter(|v| !v.is_nan()).collect();
    if valid.is_empty() {
        return Ok(f64::NAN);
    }
    valid.sort_by(|a, b| a.total_cmp(b));

    let rank = p / 100.0 * (valid.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;

    if lo == hi || frac == 0.0 {
        return Ok(valid[lo]);
    }
    Ok(valid[lo] + (valid[hi] - valid[lo]) * frac)
}

/// Descriptive statistics of a masked band
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BandStatistics {
    pub valid_count: usize,
    pub nodata_count: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
}

impl BandStatistics {
    /// Compute statistics over the non-NaN cells of `raster`.
    pub fn of(raster: &Raster) -> Self {
        let mut min = f64::NAN;
        let mut max = f64::NAN;
        for v in raster.values().filter(|v| !v.is_nan()) {
            min = min.min(v);
            max = max.max(v);
        }

        let nodata_count = raster.nan_count();
        Self {
            valid_count: raster.len() - nodata_count,
            nodata_count,
            mean: nan_mean(raster.values()),
            std_dev: nan_std(raster.data().iter().copied()),
            min,
            max,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const NAN: f64 = f64::NAN;

    #[test]
    fn test_mean_and_std_skip_nan() {
        let v = [10.0, 20.0, NAN, 30.0];
        assert_relative_eq!(nan_mean(v), 20.0);
        assert_relative_eq!(nan_std(v), (200.0f64 / 3.0).sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_constant_values_have_zero_std() {
        let v = [4.5; 16];
        assert_eq!(nan_std(v), 0.0);
    }

    #[test]
    fn test_all_nan_reductions_are_nan() {
        let v = [NAN, NAN];
        assert!(nan_mean(v).is_nan());
        assert!(nan_std(v).is_nan());
        assert!(nan_percentile(v, 99.0).unwrap().is_nan());
        assert!(nan_mean(std::iter::empty()).is_nan());
    }

    #[test]
    fn test_infinity_propagates_into_mean() {
        let v = [1.0, f64::INFINITY, NAN];
        assert_eq!(nan_mean(v), f64::INFINITY);
        assert!(nan_std(v).is_nan());
    }

    #[test]
    fn test_percentile_linear_interpolation() {
        // ranks: 1 2 3 4 5 ; p95 -> rank 3.8 -> 4 + 0.8 * 1
        let v = [5.0, NAN, 1.0, 4.0, 2.0, 3.0];
        assert_relative_eq!(nan_percentile(v, 95.0).unwrap(), 4.8, epsilon = 1e-12);
        assert_relative_eq!(nan_percentile(v, 50.0).unwrap(), 3.0);
        assert_relative_eq!(nan_percentile(v, 0.0).unwrap(), 1.0);
        assert_relative_eq!(nan_percentile(v, 100.0).unwrap(), 5.0);
    }

    #[test]
    fn test_percentile_excludes_nan_before_ranking() {
        // NaN must not be ranked as zero or as the largest value
        let with_nan = [NAN, NAN, NAN, 10.0, 20.0];
        let without = [10.0, 20.0];
        assert_eq!(
            nan_percentile(with_nan, 99.0).unwrap(),
            nan_percentile(without, 99.0).unwrap()
        );
        assert_relative_eq!(nan_percentile(without, 99.0).unwrap(), 19.9, epsilon = 1e-12);
    }

    #[test]
    fn test_percentile_out_of_range() {
        assert!(nan_percentile([1.0], 101.0).is_err());
        assert!(nan_percentile([1.0], -1.0).is_err());
    }

    #[test]
    fn test_band_statistics() {
        let r = Raster::from_vec(vec![10.0, 20.0, NAN, 30.0], 2, 2).unwrap();
        let s = BandStatistics::of(&r);
        assert_eq!(s.valid_count, 3);
        assert_eq!(s.nodata_count, 1);
        assert_eq!(s.min, 10.0);
        assert_eq!(s.max, 30.0);
        assert_relative_eq!(s.mean, 20.0);
        assert_relative_eq!(s.std_dev, 8.16496580927726, epsilon = 1e-9);
    }
}
