//! Coordinate reference system carried from input to output rasters
//!
//! Only what a GeoKeyDirectory can express by code is kept: the EPSG code and
//! whether it names a geographic or a projected system.

use serde::{Deserialize, Serialize};
use std::fmt;

const GT_MODEL_TYPE: u16 = 1024;
const GT_RASTER_TYPE: u16 = 1025;
const GEOGRAPHIC_TYPE: u16 = 2048;
const PROJECTED_CS_TYPE: u16 = 3072;

const MODEL_PROJECTED: u16 = 1;
const MODEL_GEOGRAPHIC: u16 = 2;
const RASTER_PIXEL_IS_AREA: u16 = 1;
/// GeoKey value meaning "user defined", not an EPSG code
const USER_DEFINED: u16 = 32767;

/// Whether an EPSG code names a geographic or a projected system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrsKind {
    Geographic,
    Projected,
}

/// Coordinate reference system identified by EPSG code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CRS {
    epsg: u16,
    kind: CrsKind,
}

impl CRS {
    pub fn geographic(epsg: u16) -> Self {
        Self {
            epsg,
            kind: CrsKind::Geographic,
        }
    }

    pub fn projected(epsg: u16) -> Self {
        Self {
            epsg,
            kind: CrsKind::Projected,
        }
    }

    /// WGS84 geographic CRS (EPSG:4326), the WaPOR product CRS
    pub fn wgs84() -> Self {
        Self::geographic(4326)
    }

    pub fn epsg(&self) -> u16 {
        self.epsg
    }

    pub fn kind(&self) -> CrsKind {
        self.kind
    }

    /// Parse a GeoKeyDirectory (tag 34735) into a CRS.
    ///
    /// The directory is `[version, revision, minor, count]` followed by
    /// `count` entries of `[key, location, count, value]`. A projected CS key
    /// wins over a geographic one; user-defined systems yield `None`.
    pub fn from_geokeys(directory: &[u16]) -> Option<Self> {
        let count = *directory.get(3)? as usize;
        let mut geographic = None;
        let mut projected = None;

        for entry in directory[4..].chunks_exact(4).take(count) {
            let (key, location, value) = (entry[0], entry[1], entry[3]);
            // location 0 means the value is stored inline
            if location != 0 || value == 0 || value == USER_DEFINED {
                continue;
            }
            match key {
                PROJECTED_CS_TYPE => projected = Some(Self::projected(value)),
                GEOGRAPHIC_TYPE => geographic = Some(Self::geographic(value)),
                _ => {}
            }
        }

        projected.or(geographic)
    }

    /// GeoKeyDirectory describing this CRS, pixel-is-area.
    pub fn to_geokeys(&self) -> Vec<u16> {
        let (model, key) = match self.kind {
            CrsKind::Geographic => (MODEL_GEOGRAPHIC, GEOGRAPHIC_TYPE),
            CrsKind::Projected => (MODEL_PROJECTED, PROJECTED_CS_TYPE),
        };
        vec![
            1, 1, 0, 3,
            GT_MODEL_TYPE, 0, 1, model,
            GT_RASTER_TYPE, 0, 1, RASTER_PIXEL_IS_AREA,
            key, 0, 1, self.epsg,
        ]
    }
}

/// GeoKeyDirectory for a raster without a known CRS: raster type only.
pub fn unknown_crs_geokeys() -> Vec<u16> {
    vec![1, 1, 0, 1, GT_RASTER_TYPE, 0, 1, RASTER_PIXEL_IS_AREA]
}

impl fmt::Display for CRS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg)
    }
}
