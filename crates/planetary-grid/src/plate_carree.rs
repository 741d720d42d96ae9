//! Equirectangular (plate carrée) grid in geographic coordinates.

use crate::error::GridResult;
use crate::grid::{check_num_rows, num_rows_for_resolution, GridKind, PlanetaryGrid};

/// Geographic lat/lon grid with `num_rows` rows and `2 * num_rows` columns.
///
/// Cell `y * num_cols + x` covers exactly one pixel of a global EPSG:4326
/// raster, so rendering can index bins directly without a lat/lon lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlateCarreeGrid {
    num_rows: usize,
}

impl PlateCarreeGrid {
    /// Create a grid with `num_rows` rows. `num_rows` must be even and at least 2.
    pub fn new(num_rows: usize) -> GridResult<Self> {
        check_num_rows(num_rows)?;
        Ok(Self { num_rows })
    }

    /// Create a grid from a pixel size in degrees.
    pub fn from_pixel_size(degrees: f64) -> GridResult<Self> {
        Self::new(num_rows_for_resolution(degrees)?)
    }

    /// Pixel size in degrees.
    pub fn pixel_size(&self) -> f64 {
        180.0 / self.num_rows as f64
    }

    fn width(&self) -> usize {
        2 * self.num_rows
    }
}

impl PlanetaryGrid for PlateCarreeGrid {
    fn kind(&self) -> GridKind {
        GridKind::PlateCarree
    }

    fn num_rows(&self) -> usize {
        self.num_rows
    }

    fn num_cols(&self, _row: usize) -> usize {
        self.width()
    }

    fn first_cell_index(&self, row: usize) -> u64 {
        (row * self.width()) as u64
    }

    fn num_cells(&self) -> u64 {
        (self.num_rows * self.width()) as u64
    }

    fn row_index(&self, cell: u64) -> usize {
        (cell / self.width() as u64) as usize
    }

    fn is_rectangular(&self) -> bool {
        true
    }
}
