//! Common test fixtures for binning tests.

use std::path::{Path, PathBuf};

/// Common bounding box definitions for testing, as
/// `(min_lon, min_lat, max_lon, max_lat)`.
pub mod bbox {
    /// Global bounding box (-180 to 180, -90 to 90)
    pub const GLOBAL: (f64, f64, f64, f64) = (-180.0, -90.0, 180.0, 90.0);

    /// North-western Mediterranean
    pub const MEDITERRANEAN: (f64, f64, f64, f64) = (0.0, 38.0, 10.0, 44.0);

    /// Tropical Pacific, away from the antimeridian
    pub const TROPICAL_PACIFIC: (f64, f64, f64, f64) = (-160.0, -10.0, -100.0, 10.0);

    /// Antarctic band
    pub const SOUTHERN_OCEAN: (f64, f64, f64, f64) = (-180.0, -80.0, 180.0, -60.0);
}

/// WKT polygon of a bounding box.
pub fn bbox_wkt(bbox: (f64, f64, f64, f64)) -> String {
    let (x0, y0, x1, y1) = bbox;
    format!(
        "POLYGON(({x0} {y0}, {x1} {y0}, {x1} {y1}, {x0} {y1}, {x0} {y0}))",
        x0 = x0,
        y0 = y0,
        x1 = x1,
        y1 = y1
    )
}

/// A scratch directory removed when dropped.
pub fn scratch_dir() -> tempfile::TempDir {
    tempfile::Builder::new()
        .prefix("binning-test-")
        .tempdir()
        .expect("failed to create scratch directory")
}

/// Write `contents` to `dir/name` and return the path.
pub fn write_text_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).expect("failed to write test file");
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox_wkt() {
        assert_eq!(
            bbox_wkt((0.0, 1.0, 2.0, 3.0)),
            "POLYGON((0 1, 2 1, 2 3, 0 3, 0 1))"
        );
    }

    #[test]
    fn test_write_text_file() {
        let dir = scratch_dir();
        let path = write_text_file(dir.path(), "a.txt", "hello");
        assert_eq!(std::fs::read_to_string(path).unwrap(), "hello");
    }
}
