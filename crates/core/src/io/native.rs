//! Native GeoTIFF reading/writing
//!
//! Uses the `tiff` crate. Georeferencing is carried by the
//! ModelPixelScale/ModelTiepoint tag pair, or by ModelTransformation when the
//! grid is rotated or south-up; the CRS by the GeoKeyDirectory. Output rasters
//! are always single-band 64-bit float with GDAL_NODATA set to `nan`.

use crate::crs::{unknown_crs_geokeys, CRS};
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster};
use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Cursor, Write};
use std::path::{Path, PathBuf};
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::Gray64Float;
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;
use tiff::ColorType;
use tracing::debug;

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const MODEL_TRANSFORMATION: u16 = 34264;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;

/// The decoder files known codes under named variants, never `Tag::Unknown`.
fn geotiff_tag(code: u16) -> Tag {
    Tag::from_u16_exhaustive(code)
}

fn read_error(path: &Path, reason: impl fmt::Display) -> Error {
    Error::RasterRead {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Read band 1 of a GeoTIFF file into a Raster
pub fn read_geotiff<P: AsRef<Path>>(path: P) -> Result<Raster> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(Error::RasterNotFound {
            path: path.to_path_buf(),
        });
    }
    let file = File::open(path).map_err(|e| read_error(path, e))?;
    let raster = decode_geotiff(file).map_err(|reason| read_error(path, reason))?;
    debug!("Read {} ({} x {})", path.display(), raster.cols(), raster.rows());
    Ok(raster)
}

/// Read a GeoTIFF from an in-memory buffer into a Raster
pub fn read_geotiff_from_buffer(data: &[u8]) -> Result<Raster> {
    decode_geotiff(Cursor::new(data)).map_err(|reason| read_error(Path::new("<buffer>"), reason))
}

/// Internal: decode a GeoTIFF from any `Read + Seek` source
fn decode_geotiff<R>(reader: R) -> std::result::Result<Raster, String>
where
    R: std::io::Read + std::io::Seek,
{
    let mut decoder = Decoder::new(reader).map_err(|e| format!("TIFF decode error: {}", e))?;

    match decoder
        .colortype()
        .map_err(|e| format!("Cannot read color type: {}", e))?
    {
        ColorType::Gray(_) => {}
        other => return Err(format!("expected a single-band raster, found {:?}", other)),
    }

    let (width, height) = decoder
        .dimensions()
        .map_err(|e| format!("Cannot read dimensions: {}", e))?;
    let rows = height as usize;
    let cols = width as usize;

    let result = decoder
        .read_image()
        .map_err(|e| format!("Cannot read image data: {}", e))?;

    let data: Vec<f64> = match result {
        DecodingResult::F64(buf) => buf,
        DecodingResult::F32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::U8(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::U16(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::U32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I8(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I16(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I32(buf) => buf.into_iter().map(f64::from).collect(),
        _ => return Err("Unsupported TIFF pixel format".to_string()),
    };

    if data.len() != rows * cols {
        return Err(format!(
            "pixel buffer holds {} values, expected {} x {}",
            data.len(),
            cols,
            rows
        ));
    }

    let mut raster = Raster::from_vec(data, rows, cols).map_err(|e| e.to_string())?;
    if raster.is_empty() {
        return Err("image has no pixels".to_string());
    }

    if let Some(transform) = read_geotransform(&mut decoder) {
        raster.set_transform(transform);
    }
    if let Ok(geokeys) = decoder.get_tag_u16_vec(geotiff_tag(GEO_KEY_DIRECTORY)) {
        raster.set_crs(CRS::from_geokeys(&geokeys));
    }
    if let Ok(nodata) = decoder.get_tag_ascii_string(geotiff_tag(GDAL_NODATA)) {
        if let Ok(value) = nodata.trim().trim_end_matches('\0').parse::<f64>() {
            raster.set_nodata(Some(value));
        }
    }

    Ok(raster)
}

/// Attempt to read the GeoTransform from GeoTIFF tags
fn read_geotransform<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
) -> Option<GeoTransform> {
    if let Ok(m) = decoder.get_tag_f64_vec(geotiff_tag(MODEL_TRANSFORMATION)) {
        if m.len() >= 8 {
            // Row-major 4x4: x = m0*col + m1*row + m3, y = m4*col + m5*row + m7
            return Some(GeoTransform::from_gdal([m[3], m[0], m[1], m[7], m[4], m[5]]));
        }
    }

    let scale = decoder.get_tag_f64_vec(geotiff_tag(MODEL_PIXEL_SCALE)).ok()?;
    let tiepoint = decoder.get_tag_f64_vec(geotiff_tag(MODEL_TIEPOINT)).ok()?;

    if scale.len() >= 2 && tiepoint.len() >= 6 {
        // tiepoint: [I, J, K, X, Y, Z], scale: [ScaleX, ScaleY, ScaleZ]
        let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
        let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
        return Some(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]));
    }

    None
}

/// Write a Raster to a GeoTIFF file
///
/// The file is first written next to `path` under a temporary name and then
/// renamed, so an interrupted write never leaves a truncated raster at
/// `path`. Missing parent directories are created.
pub fn write_geotiff<P: AsRef<Path>>(raster: &Raster, path: P) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let partial = partial_path(path);
    let written = File::create(&partial)
        .map_err(Error::from)
        .and_then(|file| {
            let mut writer = BufWriter::new(file);
            encode_geotiff(raster, &mut writer)?;
            writer.flush()?;
            writer
                .into_inner()
                .map_err(|e| Error::Io(e.into_error()))?
                .sync_all()?;
            Ok(())
        })
        .and_then(|()| fs::rename(&partial, path).map_err(Error::from));

    if written.is_err() {
        let _ = fs::remove_file(&partial);
    } else {
        debug!("Wrote {} ({} x {})", path.display(), raster.cols(), raster.rows());
    }
    written
}

/// Write a Raster to an in-memory GeoTIFF buffer
pub fn write_geotiff_to_buffer(raster: &Raster) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    encode_geotiff(raster, &mut Cursor::new(&mut buf))?;
    Ok(buf)
}

fn partial_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "raster".to_string());
    path.with_file_name(format!(".{}.partial", name))
}

/// Internal: encode a Raster as GeoTIFF into any `Write + Seek` sink
fn encode_geotiff<W>(raster: &Raster, writer: &mut W) -> Result<()>
where
    W: std::io::Write + std::io::Seek,
{
    let tiff_err = |what: &str, e: tiff::TiffError| Error::Other(format!("{}: {}", what, e));

    let mut encoder = TiffEncoder::new(writer).map_err(|e| tiff_err("TIFF encoder error", e))?;

    let (rows, cols) = raster.shape();
    let data: Vec<f64> = raster.values().collect();

    let mut image = encoder
        .new_image::<Gray64Float>(cols as u32, rows as u32)
        .map_err(|e| tiff_err("Cannot create TIFF image", e))?;

    let gt = raster.transform();
    if gt.is_rotated() || gt.pixel_height > 0.0 {
        let matrix = [
            gt.pixel_width, gt.row_rotation, 0.0, gt.origin_x,
            gt.col_rotation, gt.pixel_height, 0.0, gt.origin_y,
            0.0, 0.0, 0.0, 0.0,
            0.0, 0.0, 0.0, 1.0,
        ];
        image
            .encoder()
            .write_tag(geotiff_tag(MODEL_TRANSFORMATION), &matrix[..])
            .map_err(|e| tiff_err("Cannot write transformation tag", e))?;
    } else {
        let scale = [gt.pixel_width, gt.pixel_height.abs(), 0.0];
        image
            .encoder()
            .write_tag(geotiff_tag(MODEL_PIXEL_SCALE), &scale[..])
            .map_err(|e| tiff_err("Cannot write scale tag", e))?;

        let tiepoint = [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
        image
            .encoder()
            .write_tag(geotiff_tag(MODEL_TIEPOINT), &tiepoint[..])
            .map_err(|e| tiff_err("Cannot write tiepoint tag", e))?;
    }

    let geokeys = raster
        .crs()
        .map(CRS::to_geokeys)
        .unwrap_or_else(unknown_crs_geokeys);
    image
        .encoder()
        .write_tag(geotiff_tag(GEO_KEY_DIRECTORY), &geokeys[..])
        .map_err(|e| tiff_err("Cannot write geokey tag", e))?;

    image
        .encoder()
        .write_tag(geotiff_tag(GDAL_NODATA), "nan")
        .map_err(|e| tiff_err("Cannot write nodata tag", e))?;

    image
        .write_data(&data)
        .map_err(|e| tiff_err("Cannot write image data", e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Raster {
        let mut r = Raster::from_vec(vec![1.5, f64::NAN, -9999.0, 0.25, 8.0, 1e-9], 2, 3).unwrap();
        r.set_transform(GeoTransform::new(300_000.0, 4_500_000.0, 250.0, -250.0));
        r
    }

    #[test]
    fn test_buffer_roundtrip_is_lossless() {
        let original = sample();
        let bytes = write_geotiff_to_buffer(&original).unwrap();
        let back = read_geotiff_from_buffer(&bytes).unwrap();

        assert_eq!(back.shape(), (2, 3));
        assert_eq!(back.transform(), original.transform());
        assert_eq!(back.get(0, 0).unwrap(), 1.5);
        assert!(back.get(0, 1).unwrap().is_nan());
        assert_eq!(back.get(0, 2).unwrap(), -9999.0);
        assert_eq!(back.get(1, 2).unwrap(), 1e-9);
        assert!(back.nodata().unwrap().is_nan());
    }

    #[test]
    fn test_rotated_transform_roundtrip() {
        let mut r = sample();
        r.set_transform(GeoTransform::from_gdal([10.0, 2.0, 0.5, 20.0, 0.25, -2.0]));
        let back = read_geotiff_from_buffer(&write_geotiff_to_buffer(&r).unwrap()).unwrap();
        assert_eq!(back.transform(), r.transform());
    }

    #[test]
    fn test_georef_tags_resolve_to_named_variants() {
        let codes = [
            MODEL_PIXEL_SCALE,
            MODEL_TIEPOINT,
            MODEL_TRANSFORMATION,
            GEO_KEY_DIRECTORY,
            GDAL_NODATA,
        ];
        for code in codes {
            let tag = geotiff_tag(code);
            assert_ne!(tag, Tag::Unknown(code));
            assert_eq!(tag.to_u16(), code);
        }
    }

    #[test]
    fn test_crs_roundtrip() {
        let mut r = sample();
        r.set_crs(Some(CRS::projected(32636)));
        let back = read_geotiff_from_buffer(&write_geotiff_to_buffer(&r).unwrap()).unwrap();
        assert_eq!(back.crs(), Some(&CRS::projected(32636)));
        assert!(back.same_geometry(&r));

        let bare = read_geotiff_from_buffer(&write_geotiff_to_buffer(&sample()).unwrap()).unwrap();
        assert_eq!(bare.crs(), None);
    }

    #[test]
    fn test_open_failure_is_read_error() {
        let denied = std::io::Error::from(std::io::ErrorKind::PermissionDenied);
        let err = read_error(Path::new("/data/aeti.tif"), denied);
        assert_eq!(err.kind(), crate::error::ErrorKind::RasterReadError);
        assert!(matches!(err, Error::RasterRead { ref path, .. } if path == Path::new("/data/aeti.tif")));
    }

    #[test]
    fn test_garbage_is_read_error() {
        let err = read_geotiff_from_buffer(b"definitely not a tiff").unwrap_err();
        assert!(matches!(err, Error::RasterRead { .. }), "{err}");
    }

    #[test]
    fn test_partial_path_is_hidden_sibling() {
        let p = partial_path(Path::new("/data/out/bf.tif"));
        assert_eq!(p, PathBuf::from("/data/out/.bf.tif.partial"));
    }
}
