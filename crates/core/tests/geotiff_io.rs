//! GeoTIFF file round trips through the `RasterSource` / `RasterSink` seam.

use aquapi_core::io::{read_geotiff, write_geotiff};
use aquapi_core::{
    Error, ErrorKind, GeoTiff, GeoTransform, Raster, RasterSink, RasterSource, CRS,
};
use std::fs;

fn field(rows: usize, cols: usize) -> Raster {
    let data = (0..rows * cols).map(|i| i as f64 * 0.5).collect();
    let mut r = Raster::from_vec(data, rows, cols).unwrap();
    r.set_transform(GeoTransform::new(35.25, 12.0, 0.00223, -0.00223));
    r
}

#[test]
fn file_roundtrip_preserves_geometry_and_values() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("aeti.tif");
    let original = field(7, 11);

    GeoTiff.write(&original, &path).unwrap();
    let back = GeoTiff.open(&path).unwrap();

    assert!(back.same_geometry(&original));
    assert_eq!(back.extent(), original.extent());
    assert_eq!(back.data(), original.data());
}

#[test]
fn file_roundtrip_keeps_transform_and_crs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("L2_AETI_20.tif");
    let mut original = field(4, 6);
    original.set_transform(GeoTransform::new(35.0, 14.0, 0.1, -0.1));
    original.set_crs(Some(CRS::wgs84()));

    GeoTiff.write(&original, &path).unwrap();
    let back = GeoTiff.open(&path).unwrap();

    assert_eq!(back.transform(), &GeoTransform::new(35.0, 14.0, 0.1, -0.1));
    assert_eq!(back.crs(), Some(&CRS::wgs84()));
}

#[test]
fn missing_file_is_raster_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let err = read_geotiff(dir.path().join("nope.tif")).unwrap_err();
    assert!(matches!(err, Error::RasterNotFound { .. }));
    assert_eq!(err.kind(), ErrorKind::RasterNotFound);
}

#[test]
fn directory_is_raster_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let err = read_geotiff(dir.path()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RasterNotFound);
}

#[test]
fn corrupt_file_is_read_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.tif");
    fs::write(&path, b"II*\0garbage").unwrap();

    let err = read_geotiff(&path).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RasterReadError);
}

#[test]
fn write_creates_parent_directories_and_leaves_no_partial_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("outputs").join("season1").join("bf.tif");

    write_geotiff(&field(3, 3), &path).unwrap();

    assert!(path.is_file());
    let leftovers: Vec<_> = fs::read_dir(path.parent().unwrap())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".partial"))
        .collect();
    assert!(leftovers.is_empty());
}
