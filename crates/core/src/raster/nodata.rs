//! No-data masking policy
//!
//! Remote-sensing water-accounting layers (AETI, T, NPP, precipitation) never
//! hold negative physical values, so the default policy treats every negative
//! cell as missing. The stricter sentinel policy masks one exact raw value
//! (for WaPOR products, `-9999`). The two are never combined: a band is masked
//! under exactly one policy.

use crate::raster::Raster;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The raw no-data sentinel used by WaPOR products.
pub const WAPOR_NODATA: f64 = -9999.0;

/// How raw cell values are recognised as no-data.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum NodataPolicy {
    /// Every value `< 0.0` is no-data.
    Negative,
    /// Only values equal to `value` are no-data.
    Sentinel { value: f64 },
}

impl Default for NodataPolicy {
    fn default() -> Self {
        Self::Negative
    }
}

impl NodataPolicy {
    /// Whether a raw cell value is no-data under this policy.
    pub fn is_nodata(&self, raw: f64) -> bool {
        match *self {
            Self::Negative => raw < 0.0,
            Self::Sentinel { value } => raw == value,
        }
    }

    /// Replace every no-data cell with NaN and mark NaN as the raster's
    /// no-data value. Returns the number of cells newly masked.
    pub fn apply(&self, raster: &mut Raster) -> usize {
        let mut masked = 0;
        for v in raster.data_mut().iter_mut() {
            if self.is_nodata(*v) {
                *v = f64::NAN;
                masked += 1;
            }
        }
        raster.set_nodata(Some(f64::NAN));
        masked
    }
}

impl fmt::Display for NodataPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Negative => write!(f, "values < 0"),
            Self::Sentinel { value } => write!(f, "values == {}", value),
        }
    }
}
