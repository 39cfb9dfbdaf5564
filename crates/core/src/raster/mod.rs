//! Raster data structures and no-data handling

mod geotransform;
mod grid;
mod nodata;

pub use geotransform::{Extent, GeoTransform};
pub use grid::Raster;
pub use nodata::{NodataPolicy, WAPOR_NODATA};
