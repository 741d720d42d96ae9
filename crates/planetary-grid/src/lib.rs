//! Planetary grids for spatial binning.
//!
//! A planetary grid tessellates the globe into cells with stable integer
//! indices. Observations are assigned to cells with
//! [`PlanetaryGrid::cell_index`], rendered back through
//! [`PlanetaryGrid::center_lat_lon`], and regions of interest are turned
//! into cell sets with [`PlanetaryGrid::cell_indexes`].
//!
//! ```text
//!   row 0   | 0 | 1 |               <- few columns near the pole
//!   row 1   | 2 | 3 | 4 | 5 |
//!   row 2   | 6 | 7 | 8 | 9 |       <- most columns at the equator
//!   row 3   |10 |11 |
//! ```
//!
//! Two layouts are provided:
//! - [`SeaGrid`]: equal-area sinusoidal rows
//! - [`PlateCarreeGrid`]: equirectangular EPSG:4326 raster cells

pub mod bbox;
pub mod error;
pub mod grid;
pub mod plate_carree;
pub mod region;
pub mod registry;
pub mod sea;

pub use bbox::BoundingBox;
pub use error::{GridError, GridResult};
pub use grid::{num_rows_for_resolution, GridKind, PlanetaryGrid};
pub use plate_carree::PlateCarreeGrid;
pub use region::Region;
pub use registry::{create_grid, GridSpec};
pub use sea::SeaGrid;
