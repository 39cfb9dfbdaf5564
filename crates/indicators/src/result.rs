//! Indicator results and their textual summaries

use crate::catalog::IndicatorId;
use crate::statistics::BandStatistics;
use aquapi_core::Extent;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Uniformity class of a coefficient of variation (in percent).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UniformityTier {
    Good,
    Fair,
    Poor,
}

impl UniformityTier {
    /// CV < 10 is good, 10 <= CV < 25 fair, anything else (NaN included) poor.
    pub fn classify(cv: f64) -> Self {
        if cv < 10.0 {
            Self::Good
        } else if (10.0..25.0).contains(&cv) {
            Self::Fair
        } else {
            Self::Poor
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Good => "Good Uniformity",
            Self::Fair => "Fair Uniformity",
            Self::Poor => "Poor Uniformity",
        }
    }
}

impl fmt::Display for UniformityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Scalar part of an indicator result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Summary {
    /// Coefficient of variation of a band and its tier
    Uniformity {
        mean: f64,
        std_dev: f64,
        cv: f64,
        tier: UniformityTier,
    },
    /// Mean and population standard deviation of the output band
    MeanStd { mean: f64, std_dev: f64 },
    /// Deficit of the mean against a percentile threshold
    Deficit { value: f64, threshold: f64 },
    /// Percentile reference value a band was divided by
    Reference { percentile: f64, value: f64 },
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uniformity { cv, tier, .. } => {
                write!(f, "Uniformity in this region is = {:.1}, {}", cv, tier)
            }
            Self::MeanStd { mean, std_dev } => {
                write!(f, "mean = {:.2}, \nstandard deviation = {:.2}", mean, std_dev)
            }
            Self::Deficit { value, .. } => write!(f, "Relative water deficit = {:.2}", value),
            Self::Reference { percentile, value } => {
                write!(f, "Reference value (P{}) = {:.2}", percentile, value)
            }
        }
    }
}

/// Outcome of one indicator computation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComputationResult {
    pub indicator: IndicatorId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<Summary>,
    /// Written output raster, when the indicator produces one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
}

impl ComputationResult {
    pub(crate) fn new(indicator: IndicatorId) -> Self {
        Self {
            indicator,
            summary: None,
            output: None,
        }
    }

    pub(crate) fn with_summary(mut self, summary: Summary) -> Self {
        self.summary = Some(summary);
        self
    }

    pub(crate) fn with_output(mut self, output: PathBuf) -> Self {
        self.output = Some(output);
        self
    }
}

impl fmt::Display for ComputationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.indicator.definition().name)?;
        if let Some(summary) = &self.summary {
            write!(f, "\n{}", summary)?;
        }
        if let Some(output) = &self.output {
            write!(f, "\nOutput: {}", output.display())?;
        }
        Ok(())
    }
}

/// Description of a masked raster in the store
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RasterInfo {
    pub path: PathBuf,
    pub rows: usize,
    pub cols: usize,
    pub cell_size: f64,
    pub extent: Extent,
    pub statistics: BandStatistics,
}

impl fmt::Display for RasterInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = &self.statistics;
        writeln!(f, "Raster: {}", self.path.display())?;
        writeln!(f, "  Dimensions: {} x {} (cols x rows)", self.cols, self.rows)?;
        writeln!(f, "  Cell size: {:.6}", self.cell_size)?;
        writeln!(f, "  Extent: {}", self.extent)?;
        writeln!(f, "  Valid cells: {} ({} no-data)", s.valid_count, s.nodata_count)?;
        writeln!(f, "  Min: {:.4}  Max: {:.4}", s.min, s.max)?;
        write!(f, "  Mean: {:.4}  Std: {:.4}", s.mean, s.std_dev)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_boundaries() {
        assert_eq!(UniformityTier::classify(0.0), UniformityTier::Good);
        assert_eq!(UniformityTier::classify(9.99), UniformityTier::Good);
        assert_eq!(UniformityTier::classify(10.0), UniformityTier::Fair);
        assert_eq!(UniformityTier::classify(24.9), UniformityTier::Fair);
        assert_eq!(UniformityTier::classify(25.0), UniformityTier::Poor);
        assert_eq!(UniformityTier::classify(f64::NAN), UniformityTier::Poor);
    }

    #[test]
    fn test_summary_text() {
        let s = Summary::Uniformity {
            mean: 20.0,
            std_dev: 8.165,
            cv: 40.82,
            tier: UniformityTier::Poor,
        };
        assert_eq!(s.to_string(), "Uniformity in this region is = 40.8, Poor Uniformity");

        let s = Summary::MeanStd { mean: 2.2222, std_dev: 0.0 };
        assert_eq!(s.to_string(), "mean = 2.22, \nstandard deviation = 0.00");

        let s = Summary::Deficit { value: 0.1234, threshold: 30.0 };
        assert_eq!(s.to_string(), "Relative water deficit = 0.12");
    }

    #[test]
    fn test_result_display() {
        let r = ComputationResult::new(IndicatorId::TotalBiomassProduction)
            .with_summary(Summary::MeanStd { mean: 1.0, std_dev: 0.5 })
            .with_output(PathBuf::from("rasters/tbp.tif"));
        let text = r.to_string();
        assert!(text.starts_with("Total Biomass Production\nmean = 1.00"));
        assert!(text.ends_with("Output: rasters/tbp.tif"));
    }
}
