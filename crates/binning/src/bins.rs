//! Bin records.
//!
//! A bin is a cell index plus a flat `f64` feature record whose layout is
//! owned by the [`BinManager`](crate::bin_manager::BinManager): each
//! aggregator gets a contiguous slice of the record.

use std::sync::Arc;

use chrono::{DateTime, Utc};

/// Per-call context handed to aggregators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinContext {
    pub cell_index: u64,
}

impl BinContext {
    pub fn new(cell_index: u64) -> Self {
        Self { cell_index }
    }
}

/// Accumulator for one cell within one source file.
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialBin {
    pub index: u64,
    /// Number of accepted observations folded into this bin.
    pub num_obs: u64,
    /// Latest acquisition time among those observations.
    pub latest_time: Option<DateTime<Utc>>,
    pub features: Vec<f64>,
}

impl SpatialBin {
    pub fn new(index: u64, num_features: usize) -> Self {
        Self {
            index,
            num_obs: 0,
            latest_time: None,
            features: vec![0.0; num_features],
        }
    }
}

/// Accumulator for one cell across all source files of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct TemporalBin {
    pub index: u64,
    /// Total observations over all passes.
    pub num_obs: u64,
    /// Number of spatial bins (file passes) folded in.
    pub num_passes: u32,
    pub features: Vec<f64>,
}

impl TemporalBin {
    pub fn new(index: u64, num_features: usize) -> Self {
        Self {
            index,
            num_obs: 0,
            num_passes: 0,
            features: vec![0.0; num_features],
        }
    }
}

/// Named, finished output values for one cell.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    names: Arc<[String]>,
    values: Vec<f64>,
}

impl FeatureVector {
    pub(crate) fn new(names: Arc<[String]>, values: Vec<f64>) -> Self {
        debug_assert_eq!(names.len(), values.len());
        Self { names, values }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Value of the feature called `name`.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.values[i])
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
