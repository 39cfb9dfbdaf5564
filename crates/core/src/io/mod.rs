//! Reading and writing single-band rasters
//!
//! Indicator computations only touch storage through [`RasterSource`] and
//! [`RasterSink`]; [`GeoTiff`] implements both on the local filesystem.

mod native;

use crate::error::Result;
use crate::raster::Raster;
use std::path::Path;

pub use native::{read_geotiff, read_geotiff_from_buffer, write_geotiff, write_geotiff_to_buffer};

/// Something that can open a single-band raster.
///
/// Implementations must distinguish a path that does not exist
/// ([`Error::RasterNotFound`](crate::Error::RasterNotFound)) from one that
/// exists but cannot be decoded
/// ([`Error::RasterRead`](crate::Error::RasterRead)). Values are returned raw;
/// no-data masking is the caller's concern.
pub trait RasterSource {
    fn open(&self, path: &Path) -> Result<Raster>;
}

/// Something that can persist a single-band floating-point raster.
///
/// The written raster must keep the georeferencing, width and height of
/// `raster` exactly.
pub trait RasterSink {
    fn write(&self, raster: &Raster, path: &Path) -> Result<()>;
}

/// GeoTIFF files on the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeoTiff;

impl RasterSource for GeoTiff {
    fn open(&self, path: &Path) -> Result<Raster> {
        read_geotiff(path)
    }
}

impl RasterSink for GeoTiff {
    fn write(&self, raster: &Raster, path: &Path) -> Result<()> {
        write_geotiff(raster, path)
    }
}
