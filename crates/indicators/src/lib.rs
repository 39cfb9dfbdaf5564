//! # aquapi indicators
//!
//! Water productivity and irrigation performance indicators computed from
//! single-band remote-sensing rasters (AETI, T, NPP, precipitation).
//!
//! - [`catalog`]: static table of indicator definitions
//! - [`engine`]: loads rasters from a store root and computes indicators
//! - [`expr`]: typed per-pixel raster algebra
//! - [`statistics`]: NaN-ignoring reductions
//!
//! ```ignore
//! use aquapi_indicators::prelude::*;
//!
//! let engine = IndicatorEngine::new(&EngineConfig::default());
//! let result = engine.equity("L2_AETI_20.tif")?;
//! println!("{}", result);
//! ```

pub mod catalog;
pub mod config;
pub mod engine;
pub mod expr;
mod maybe_rayon;
pub mod result;
pub mod statistics;
pub mod store;

pub use catalog::{
    definitions, list_indicators, lookup, IndicatorDefinition, IndicatorId, OutputKind,
    RasterRole, Status,
};
pub use config::EngineConfig;
pub use engine::{IndicatorEngine, IndicatorRequest, YieldFactors};
pub use expr::{evaluate, Expr};
pub use result::{ComputationResult, RasterInfo, Summary, UniformityTier};
pub use store::RasterStoreLocation;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::catalog::{IndicatorId, RasterRole};
    pub use crate::config::EngineConfig;
    pub use crate::engine::{IndicatorEngine, IndicatorRequest, YieldFactors};
    pub use crate::result::{ComputationResult, Summary, UniformityTier};
    pub use aquapi_core::prelude::*;
}
