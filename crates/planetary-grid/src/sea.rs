//! Equal-area sinusoidal grid.
//!
//! Rows are bands of equal latitude height. The number of columns in a row
//! is proportional to the cosine of the row's center latitude, which keeps
//! cell areas roughly constant from the equator to the poles. This is the
//! layout of the classic ocean-colour level-3 bins.

use crate::grid::{check_num_rows, GridKind, PlanetaryGrid};
use crate::error::{GridError, GridResult};

/// Equal-area sinusoidal planetary grid.
#[derive(Debug, Clone, PartialEq)]
pub struct SeaGrid {
    num_cols: Vec<usize>,
    base_index: Vec<u64>,
    num_cells: u64,
}

impl SeaGrid {
    /// Default row count (about 9.28 km cells).
    pub const DEFAULT_NUM_ROWS: usize = 2160;

    /// Create a grid with `num_rows` rows. `num_rows` must be even and at least 2.
    pub fn new(num_rows: usize) -> GridResult<Self> {
        check_num_rows(num_rows)?;
        let row_height = 180.0 / num_rows as f64;
        let num_cols = (0..num_rows)
            .map(|row| {
                let lat = 90.0 - (row as f64 + 0.5) * row_height;
                let cols = (2.0 * num_rows as f64 * lat.to_radians().cos()).round() as usize;
                cols.max(1)
            })
            .collect();
        Ok(Self::from_layout(num_cols))
    }

    /// Create a grid with an explicit column count per row.
    ///
    /// Rows are still equal-height latitude bands; this is mostly useful for
    /// small, hand-checkable tessellations.
    pub fn with_column_counts(num_cols: Vec<usize>) -> GridResult<Self> {
        if num_cols.is_empty() {
            return Err(GridError::invalid_resolution("grid needs at least one row"));
        }
        if let Some(row) = num_cols.iter().position(|&c| c == 0) {
            return Err(GridError::invalid_resolution(format!(
                "row {} has no columns",
                row
            )));
        }
        Ok(Self::from_layout(num_cols))
    }

    fn from_layout(num_cols: Vec<usize>) -> Self {
        let mut base_index = Vec::with_capacity(num_cols.len());
        let mut next = 0u64;
        for &cols in &num_cols {
            base_index.push(next);
            next += cols as u64;
        }
        Self {
            num_cols,
            base_index,
            num_cells: next,
        }
    }
}

impl PlanetaryGrid for SeaGrid {
    fn kind(&self) -> GridKind {
        GridKind::Sea
    }

    fn num_rows(&self) -> usize {
        self.num_cols.len()
    }

    fn num_cols(&self, row: usize) -> usize {
        self.num_cols[row]
    }

    fn first_cell_index(&self, row: usize) -> u64 {
        self.base_index[row]
    }

    fn num_cells(&self) -> u64 {
        self.num_cells
    }

    fn row_index(&self, cell: u64) -> usize {
        // Last row whose base index is <= cell.
        self.base_index.partition_point(|&base| base <= cell) - 1
    }

    fn is_rectangular(&self) -> bool {
        self.num_cols.windows(2).all(|w| w[0] == w[1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_invalid_row_counts() {
        assert!(SeaGrid::new(0).is_err());
        assert!(SeaGrid::new(5).is_err());
        assert!(SeaGrid::with_column_counts(vec![]).is_err());
        assert!(SeaGrid::with_column_counts(vec![2, 0, 2]).is_err());
    }

    #[test]
    fn test_default_layout() {
        let grid = SeaGrid::new(SeaGrid::DEFAULT_NUM_ROWS).unwrap();
        assert_eq!(grid.num_rows(), 2160);
        // Equator rows have ~2 * num_rows columns, polar rows only a few.
        assert_eq!(grid.num_cols(1079), 4320);
        assert_eq!(grid.num_cols(1080), 4320);
        assert!(grid.num_cols(0) <= 4);
        assert_eq!(grid.num_cols(0), grid.num_cols(2159));
        assert_eq!(grid.num_cells(), 5_940_422);
    }

    #[test]
    fn test_row_index_matches_base() {
        let grid = SeaGrid::new(18).unwrap();
        for row in 0..grid.num_rows() {
            let first = grid.first_cell_index(row);
            let last = first + grid.num_cols(row) as u64 - 1;
            assert_eq!(grid.row_index(first), row);
            assert_eq!(grid.row_index(last), row);
        }
    }

    #[test]
    fn test_poles_and_antimeridian() {
        let grid = SeaGrid::new(18).unwrap();
        assert_eq!(grid.cell_index(90.0, -180.0).unwrap(), 0);
        assert_eq!(
            grid.cell_index(-90.0, 180.0).unwrap(),
            grid.num_cells() - 1
        );
        let row = grid.row_for_lat(10.0);
        assert_eq!(
            grid.cell_index(10.0, 180.0).unwrap(),
            grid.first_cell_index(row) + grid.num_cols(row) as u64 - 1
        );
    }

    #[test]
    fn test_out_of_range_is_rejected() {
        let grid = SeaGrid::new(18).unwrap();
        assert!(grid.cell_index(90.5, 0.0).is_err());
        assert!(grid.cell_index(0.0, -180.1).is_err());
        assert!(grid.cell_index(f64::NAN, 0.0).is_err());
        assert!(grid.center_lat_lon(grid.num_cells()).is_err());
    }

    #[test]
    fn test_is_rectangular() {
        assert!(!SeaGrid::new(18).unwrap().is_rectangular());
        assert!(SeaGrid::with_column_counts(vec![4, 4]).unwrap().is_rectangular());
    }
}
