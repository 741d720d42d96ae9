//! Name-based grid construction.
//!
//! Grids are resolved once from configuration into a shared
//! `Arc<dyn PlanetaryGrid>` and never looked up again on the hot path.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{GridError, GridResult};
use crate::grid::{num_rows_for_resolution, GridKind, PlanetaryGrid};
use crate::plate_carree::PlateCarreeGrid;
use crate::sea::SeaGrid;

/// Grid parameters as they appear in configuration.
///
/// Either `num_rows` or `resolution` (cell size in degrees) selects the
/// resolution; `num_rows` wins when both are given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    /// Projection family.
    #[serde(default)]
    pub kind: GridKind,
    /// Number of latitude rows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_rows: Option<usize>,
    /// Cell size in degrees.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<f64>,
}

impl GridSpec {
    /// Grid of `kind` with `num_rows` rows.
    pub fn new(kind: GridKind, num_rows: usize) -> Self {
        Self {
            kind,
            num_rows: Some(num_rows),
            resolution: None,
        }
    }

    /// Resolve the row count.
    pub fn resolved_num_rows(&self) -> GridResult<usize> {
        match (self.num_rows, self.resolution) {
            (Some(rows), _) => Ok(rows),
            (None, Some(degrees)) => num_rows_for_resolution(degrees),
            (None, None) => Err(GridError::invalid_resolution(
                "either num_rows or resolution must be set",
            )),
        }
    }
}

impl Default for GridSpec {
    fn default() -> Self {
        Self::new(GridKind::Sea, SeaGrid::DEFAULT_NUM_ROWS)
    }
}

/// Build the grid described by `spec`.
pub fn create_grid(spec: &GridSpec) -> GridResult<Arc<dyn PlanetaryGrid>> {
    let num_rows = spec.resolved_num_rows()?;
    debug!(kind = %spec.kind, num_rows, "Creating planetary grid");
    let grid: Arc<dyn PlanetaryGrid> = match spec.kind {
        GridKind::Sea => Arc::new(SeaGrid::new(num_rows)?),
        GridKind::PlateCarree => Arc::new(PlateCarreeGrid::new(num_rows)?),
    };
    Ok(grid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_grid() {
        let sea = create_grid(&GridSpec::new(GridKind::Sea, 18)).unwrap();
        assert_eq!(sea.kind(), GridKind::Sea);
        assert_eq!(sea.num_rows(), 18);

        let pc = create_grid(&GridSpec::new(GridKind::PlateCarree, 90)).unwrap();
        assert!(pc.is_rectangular());
        assert_eq!(pc.num_cells(), 90 * 180);
    }

    #[test]
    fn test_create_grid_from_resolution() {
        let spec = GridSpec {
            kind: GridKind::PlateCarree,
            num_rows: None,
            resolution: Some(2.0),
        };
        assert_eq!(create_grid(&spec).unwrap().num_rows(), 90);
    }

    #[test]
    fn test_create_grid_invalid() {
        assert!(create_grid(&GridSpec::new(GridKind::Sea, 0)).is_err());
        let spec = GridSpec {
            kind: GridKind::Sea,
            num_rows: None,
            resolution: None,
        };
        assert!(matches!(
            create_grid(&spec),
            Err(GridError::InvalidResolution(_))
        ));
    }

    #[test]
    fn test_spec_deserialize() {
        let spec: GridSpec = serde_json::from_str(r#"{"kind": "SEAGrid", "num_rows": 4}"#).unwrap();
        assert_eq!(spec, GridSpec::new(GridKind::Sea, 4));
        let bad: Result<GridSpec, _> = serde_json::from_str(r#"{"kind": "healpix"}"#);
        assert!(bad.is_err());
    }
}
