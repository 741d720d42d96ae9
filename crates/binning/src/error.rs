//! Error types for the binning engine.

use std::fmt;
use std::path::{Path, PathBuf};

use planetary_grid::GridError;
use thiserror::Error;

/// Processing stage in which a fatal error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Per-file spatial binning.
    Binning,
    /// Cross-file temporal merging.
    Merging,
    /// Reprojection of temporal bins onto the output raster.
    Rendering,
    /// Serialization of the rendered product.
    Writing,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Binning => "binning",
            Self::Merging => "merging",
            Self::Rendering => "rendering",
            Self::Writing => "writing",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors that can occur during a binning run.
#[derive(Error, Debug)]
pub enum BinningError {
    /// Invalid or inconsistent configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Bins produced with a different aggregator setup were fed into a merge.
    #[error("aggregator configuration mismatch: expected '{expected}', found '{found}'")]
    ConfigurationMismatch { expected: String, found: String },

    /// Invalid grid parameters or coordinates.
    #[error("grid error: {0}")]
    Grid(#[from] GridError),

    /// A single observation could not be used.
    #[error("invalid observation: {0}")]
    InputValidation(String),

    /// A source file could not be read.
    #[error("failed to read '{}': {message}", path.display())]
    InputFault { path: PathBuf, message: String },

    /// The output product could not be written.
    #[error("failed to write '{}': {message}", path.display())]
    OutputFault { path: PathBuf, message: String },

    /// Floating-point cancellation produced an impossible value.
    #[error("numeric anomaly in cell {cell}: {message}")]
    NumericAnomaly { cell: u64, message: String },

    /// A fatal error annotated with the stage and the file or cell that triggered it.
    #[error("{stage} failed ({context}): {source}")]
    Stage {
        stage: Stage,
        context: String,
        #[source]
        source: Box<BinningError>,
    },

    /// The run was cancelled before completion.
    #[error("binning run cancelled")]
    Cancelled,

    /// An operation was invoked in the wrong lifecycle state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Spill file or other local I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BinningError {
    /// Create a configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create an input fault for `path`.
    pub fn input_fault(path: impl AsRef<Path>, msg: impl Into<String>) -> Self {
        Self::InputFault {
            path: path.as_ref().to_path_buf(),
            message: msg.into(),
        }
    }

    /// Create an output fault for `path`.
    pub fn output_fault(path: impl AsRef<Path>, msg: impl Into<String>) -> Self {
        Self::OutputFault {
            path: path.as_ref().to_path_buf(),
            message: msg.into(),
        }
    }

    /// Create an invalid state error.
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Annotate a fatal error with the stage and context that produced it.
    ///
    /// Cancellation and errors that already carry a stage are passed through.
    pub fn at_stage(self, stage: Stage, context: impl Into<String>) -> Self {
        match self {
            Self::Cancelled | Self::Stage { .. } => self,
            other => Self::Stage {
                stage,
                context: context.into(),
                source: Box::new(other),
            },
        }
    }

    /// Stage annotation, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// The innermost error, with stage annotations removed.
    pub fn root(&self) -> &BinningError {
        match self {
            Self::Stage { source, .. } => source.root(),
            other => other,
        }
    }

    /// True for per-file read failures that non-strict runs may skip.
    pub fn is_input_fault(&self) -> bool {
        matches!(self.root(), Self::InputFault { .. })
    }

    /// True when the run was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.root(), Self::Cancelled)
    }
}

/// Result type alias using BinningError.
pub type Result<T> = std::result::Result<T, BinningError>;
