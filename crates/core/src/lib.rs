//! # aquapi core
//!
//! Core types and I/O shared by the aquapi indicator crates.
//!
//! This crate provides:
//! - `Raster`: georeferenced single-band grid of `f64` cells
//! - `CRS`: EPSG-coded coordinate reference system read from GeoKeys
//! - `GeoTransform` / `Extent`: affine georeferencing and bounds
//! - `NodataPolicy`: how raw cell values are recognised as missing
//! - `RasterSource` / `RasterSink`: the storage seam, with a native GeoTIFF
//!   implementation

pub mod crs;
pub mod error;
pub mod io;
pub mod raster;

pub use crs::CRS;
pub use error::{Error, ErrorKind, ErrorReport, Result};
pub use io::{GeoTiff, RasterSink, RasterSource};
pub use raster::{Extent, GeoTransform, NodataPolicy, Raster, WAPOR_NODATA};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::crs::CRS;
    pub use crate::error::{Error, ErrorKind, Result};
    pub use crate::io::{GeoTiff, RasterSink, RasterSource};
    pub use crate::raster::{Extent, GeoTransform, NodataPolicy, Raster};
}
