//! Error types for planetary grid construction and lookups.

use thiserror::Error;

/// Errors that can occur while building or querying a planetary grid.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GridError {
    /// Grid resolution is zero, negative, non-finite or otherwise unusable.
    #[error("invalid grid resolution: {0}")]
    InvalidResolution(String),

    /// Coordinate lies outside the grid domain or is not a number.
    #[error("coordinate out of range: lat={lat}, lon={lon}")]
    CoordinateOutOfRange { lat: f64, lon: f64 },

    /// Cell index is not in `0..num_cells`.
    #[error("cell index {index} out of range (grid has {num_cells} cells)")]
    CellIndexOutOfRange { index: u64, num_cells: u64 },

    /// Region geometry could not be parsed or is degenerate.
    #[error("invalid region: {0}")]
    InvalidRegion(String),

    /// Grid name is not known to the registry.
    #[error("unknown planetary grid: {0}")]
    UnknownGrid(String),
}

impl GridError {
    /// Create an invalid resolution error.
    pub fn invalid_resolution(msg: impl Into<String>) -> Self {
        Self::InvalidResolution(msg.into())
    }

    /// Create an invalid region error.
    pub fn invalid_region(msg: impl Into<String>) -> Self {
        Self::InvalidRegion(msg.into())
    }

    /// True for errors caused by a single bad coordinate rather than by configuration.
    pub fn is_input_validation(&self) -> bool {
        matches!(
            self,
            Self::CoordinateOutOfRange { .. } | Self::CellIndexOutOfRange { .. }
        )
    }
}

/// Result type alias using GridError.
pub type GridResult<T> = std::result::Result<T, GridError>;
