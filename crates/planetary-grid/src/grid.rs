//! The planetary grid abstraction.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::bbox::BoundingBox;
use crate::error::{GridError, GridResult};
use crate::region::Region;

/// Projection family of a planetary grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum GridKind {
    /// Equal-area sinusoidal rows whose column count shrinks toward the poles.
    #[default]
    Sea,
    /// Equirectangular geographic grid (EPSG:4326), same column count in every row.
    PlateCarree,
}

impl GridKind {
    /// Parse a grid name.
    ///
    /// Accepts the canonical names plus the aliases used in older
    /// configuration files. Matching is case-insensitive.
    pub fn from_name(name: &str) -> GridResult<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "SEA" | "SEAGRID" | "SEA_GRID" | "SINUSOIDAL" => Ok(Self::Sea),
            "PLATE_CARREE" | "PLATECARREE" | "CRS" | "CRSGRID" | "EPSG:4326" | "GEOGRAPHIC" => {
                Ok(Self::PlateCarree)
            }
            _ => Err(GridError::UnknownGrid(name.to_string())),
        }
    }

    /// Canonical name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sea => "SEA",
            Self::PlateCarree => "PLATE_CARREE",
        }
    }
}

impl fmt::Display for GridKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<String> for GridKind {
    type Error = GridError;

    fn try_from(value: String) -> GridResult<Self> {
        Self::from_name(&value)
    }
}

impl From<GridKind> for String {
    fn from(kind: GridKind) -> Self {
        kind.as_str().to_string()
    }
}

/// A fixed tessellation of the globe into addressable cells.
///
/// Cells are numbered row-major from the north pole southwards and from the
/// antimeridian eastwards, so `cell_index` ranges over `0..num_cells()`.
/// Implementations only need to describe their row/column layout; cell
/// lookup, validation and region enumeration are provided on top of it.
pub trait PlanetaryGrid: Send + Sync + fmt::Debug {
    /// Projection family.
    fn kind(&self) -> GridKind;

    /// Number of latitude rows.
    fn num_rows(&self) -> usize;

    /// Number of columns in `row`.
    fn num_cols(&self, row: usize) -> usize;

    /// Index of the first (westernmost) cell in `row`.
    fn first_cell_index(&self, row: usize) -> u64;

    /// Total number of cells.
    fn num_cells(&self) -> u64;

    /// Row containing `cell`. `cell` must be `< num_cells()`.
    fn row_index(&self, cell: u64) -> usize;

    /// Row covering latitude `lat`, which must already be within [-90, 90].
    fn row_for_lat(&self, lat: f64) -> usize {
        let num_rows = self.num_rows();
        if lat >= 90.0 {
            return 0;
        }
        if lat <= -90.0 {
            return num_rows - 1;
        }
        let row = ((90.0 - lat) * num_rows as f64 / 180.0).floor() as usize;
        row.min(num_rows - 1)
    }

    /// Column of `row` covering longitude `lon`, which must already be within [-180, 180].
    fn col_for_lon(&self, row: usize, lon: f64) -> usize {
        let num_cols = self.num_cols(row);
        if lon <= -180.0 {
            return 0;
        }
        if lon >= 180.0 {
            return num_cols - 1;
        }
        let col = ((lon + 180.0) * num_cols as f64 / 360.0).floor() as usize;
        col.min(num_cols - 1)
    }

    /// Height of one row in degrees.
    fn row_height(&self) -> f64 {
        180.0 / self.num_rows() as f64
    }

    /// Latitude of the center of `row`.
    fn center_lat(&self, row: usize) -> f64 {
        90.0 - (row as f64 + 0.5) * self.row_height()
    }

    /// Whether every row has the same number of columns, so that cells map
    /// one-to-one onto pixels of an equirectangular raster.
    fn is_rectangular(&self) -> bool {
        false
    }

    /// Map a geographic coordinate to its cell index.
    ///
    /// Latitudes must be in [-90, 90] and longitudes in [-180, 180]; the
    /// antimeridian at +180 belongs to the last column. NaN or out-of-range
    /// values are rejected, never clamped.
    fn cell_index(&self, lat: f64, lon: f64) -> GridResult<u64> {
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return Err(GridError::CoordinateOutOfRange { lat, lon });
        }
        let row = self.row_for_lat(lat);
        let col = self.col_for_lon(row, lon);
        Ok(self.first_cell_index(row) + col as u64)
    }

    /// Center coordinate (lat, lon) of `cell`.
    fn center_lat_lon(&self, cell: u64) -> GridResult<(f64, f64)> {
        let (row, col) = self.row_col(cell)?;
        let num_cols = self.num_cols(row) as f64;
        let lon = -180.0 + (col as f64 + 0.5) * 360.0 / num_cols;
        Ok((self.center_lat(row), lon))
    }

    /// Split a cell index into (row, column).
    fn row_col(&self, cell: u64) -> GridResult<(usize, usize)> {
        let num_cells = self.num_cells();
        if cell >= num_cells {
            return Err(GridError::CellIndexOutOfRange {
                index: cell,
                num_cells,
            });
        }
        let row = self.row_index(cell);
        Ok((row, (cell - self.first_cell_index(row)) as usize))
    }

    /// Geographic footprint of `cell`.
    fn cell_footprint(&self, cell: u64) -> GridResult<BoundingBox> {
        let (row, col) = self.row_col(cell)?;
        let height = self.row_height();
        let max_lat = 90.0 - row as f64 * height;
        let width = 360.0 / self.num_cols(row) as f64;
        let min_lon = -180.0 + col as f64 * width;
        Ok(BoundingBox::new(
            min_lon,
            max_lat - height,
            min_lon + width,
            max_lat,
        ))
    }

    /// All cells whose footprint intersects `region`.
    ///
    /// Cells that only touch the region boundary are included, so the set
    /// may slightly over-cover the region but never misses a cell.
    fn cell_indexes(&self, region: &Region) -> BTreeSet<u64> {
        let mut cells = BTreeSet::new();
        let Some(bbox) = region
            .bounding_box()
            .intersection(&BoundingBox::global())
        else {
            return cells;
        };

        let first_row = self.row_for_lat(bbox.max_lat);
        let last_row = self.row_for_lat(bbox.min_lat);
        for row in first_row..=last_row {
            let first_col = self.col_for_lon(row, bbox.min_lon);
            let last_col = self.col_for_lon(row, bbox.max_lon);
            let base = self.first_cell_index(row);
            for col in first_col..=last_col {
                let cell = base + col as u64;
                match self.cell_footprint(cell) {
                    Ok(footprint) if region.intersects_box(&footprint) => {
                        cells.insert(cell);
                    }
                    _ => {}
                }
            }
        }
        cells
    }
}

/// Validate a row count shared by all grid constructors.
pub(crate) fn check_num_rows(num_rows: usize) -> GridResult<()> {
    if num_rows < 2 {
        return Err(GridError::invalid_resolution(format!(
            "num_rows must be at least 2, got {}",
            num_rows
        )));
    }
    if num_rows % 2 != 0 {
        return Err(GridError::invalid_resolution(format!(
            "num_rows must be even, got {}",
            num_rows
        )));
    }
    Ok(())
}

/// Convert a cell size in degrees to a row count.
pub fn num_rows_for_resolution(degrees: f64) -> GridResult<usize> {
    if !degrees.is_finite() || degrees <= 0.0 {
        return Err(GridError::invalid_resolution(format!(
            "resolution must be a positive number of degrees, got {}",
            degrees
        )));
    }
    if degrees > 90.0 {
        return Err(GridError::invalid_resolution(format!(
            "resolution {} degrees is coarser than half the globe",
            degrees
        )));
    }
    let rows = (180.0 / degrees).round() as usize;
    // Keep the row count even so the equator is a row boundary.
    Ok(rows + rows % 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_kind_from_name() {
        assert_eq!(GridKind::from_name("sea").unwrap(), GridKind::Sea);
        assert_eq!(GridKind::from_name("SEAGrid").unwrap(), GridKind::Sea);
        assert_eq!(
            GridKind::from_name("EPSG:4326").unwrap(),
            GridKind::PlateCarree
        );
        assert_eq!(GridKind::from_name("crs").unwrap(), GridKind::PlateCarree);
        assert!(matches!(
            GridKind::from_name("isea3h"),
            Err(GridError::UnknownGrid(_))
        ));
    }

    #[test]
    fn test_grid_kind_display_roundtrip() {
        for kind in [GridKind::Sea, GridKind::PlateCarree] {
            assert_eq!(GridKind::from_name(&kind.to_string()).unwrap(), kind);
        }
    }

    #[test]
    fn test_num_rows_for_resolution() {
        assert_eq!(num_rows_for_resolution(1.0).unwrap(), 180);
        assert_eq!(num_rows_for_resolution(0.25).unwrap(), 720);
        assert_eq!(num_rows_for_resolution(7.0).unwrap(), 26);
        assert!(num_rows_for_resolution(0.0).is_err());
        assert!(num_rows_for_resolution(-1.0).is_err());
        assert!(num_rows_for_resolution(f64::NAN).is_err());
        assert!(num_rows_for_resolution(f64::INFINITY).is_err());
    }

    #[test]
    fn test_check_num_rows() {
        assert!(check_num_rows(0).is_err());
        assert!(check_num_rows(1).is_err());
        assert!(check_num_rows(3).is_err());
        assert!(check_num_rows(2).is_ok());
        assert!(check_num_rows(2160).is_ok());
    }
}
