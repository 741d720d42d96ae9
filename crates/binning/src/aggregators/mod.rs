//! Aggregators: named reducers over bin records.
//!
//! Every aggregator owns three fixed layouts, established at configuration
//! time:
//!
//! ```text
//!   observation --aggregate_spatial--> spatial record   (one file, one cell)
//!   spatial     --aggregate_temporal-> temporal record  (all files, one cell)
//!   temporal    --compute_output-----> output features
//! ```
//!
//! Temporal records of the same cell can be combined with
//! [`Aggregator::merge_temporal`], which must be commutative and
//! associative so that the result never depends on file order.

mod average;
mod mean_obs;
mod min_max;
mod missing;
mod on_max_set;
mod registry;
mod sum;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::bins::BinContext;
use crate::observation::Observation;

pub use average::AverageAggregator;
pub use mean_obs::MeanObsAggregator;
pub use min_max::MinMaxAggregator;
pub use missing::MissingAggregator;
pub use on_max_set::OnMaxSetAggregator;
pub use registry::{AggregatorDescriptor, AggregatorRegistry};
pub use sum::SumAggregator;

/// Outcome of [`Aggregator::compute_output`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputStatus {
    /// Values computed without correction.
    #[default]
    Ok,
    /// A negative variance from floating-point cancellation was clamped to zero.
    Clamped,
}

impl OutputStatus {
    /// Combine the status of several aggregators.
    pub fn and(self, other: OutputStatus) -> OutputStatus {
        if self == OutputStatus::Clamped || other == OutputStatus::Clamped {
            OutputStatus::Clamped
        } else {
            OutputStatus::Ok
        }
    }
}

/// A parameterized reduction over one or more measurement channels.
pub trait Aggregator: Send + Sync + fmt::Debug {
    /// Registry name, e.g. `AVG`.
    fn name(&self) -> &str;

    fn spatial_feature_names(&self) -> &[String];

    fn temporal_feature_names(&self) -> &[String];

    fn output_feature_names(&self) -> &[String];

    /// Reset a spatial record to the identity.
    fn init_spatial(&self, ctx: &BinContext, spatial: &mut [f64]);

    /// Fold one observation into a spatial record. Missing values are NaN.
    fn aggregate_spatial(&self, ctx: &BinContext, obs: &Observation, spatial: &mut [f64]);

    /// Finish a spatial record after the last observation of a file.
    fn complete_spatial(&self, _ctx: &BinContext, _num_spatial_obs: u64, _spatial: &mut [f64]) {}

    /// Reset a temporal record to the identity.
    fn init_temporal(&self, ctx: &BinContext, temporal: &mut [f64]);

    /// Fold one completed spatial record into a temporal record.
    fn aggregate_temporal(
        &self,
        ctx: &BinContext,
        spatial: &[f64],
        num_spatial_obs: u64,
        temporal: &mut [f64],
    );

    /// Combine two partial temporal records of the same cell.
    fn merge_temporal(&self, ctx: &BinContext, into: &mut [f64], other: &[f64]);

    /// Finish a temporal record after the last merge.
    fn complete_temporal(&self, _ctx: &BinContext, _num_temporal_obs: u64, _temporal: &mut [f64]) {}

    /// Compute output features. Cells without valid data get `fill`.
    fn compute_output(&self, temporal: &[f64], output: &mut [f64], fill: f64) -> OutputStatus;
}

/// Configuration of one aggregator instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatorConfig {
    /// Registry name (`AVG`, `MEAN_OBS`, `MIN_MAX`, `SUM`, `ON_MAX_SET`, `MISSING`).
    #[serde(rename = "type")]
    pub kind: String,

    /// Source channel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub var_name: Option<String>,

    /// Prefix of the feature names; defaults to `var_name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_name: Option<String>,

    /// Exponent applied to per-file counts when weighting file means (AVG).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_coeff: Option<f64>,

    /// Emit `<target>_counts` (AVG).
    #[serde(default)]
    pub output_counts: bool,

    /// Emit `<target>_sum` and `<target>_sum_sq` (AVG).
    #[serde(default)]
    pub output_sums: bool,

    /// Channels copied from the observation holding the maximum (ON_MAX_SET).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub set_var_names: Vec<String>,
}

impl AggregatorConfig {
    /// Aggregator of `kind` over `var_name`.
    pub fn new(kind: impl Into<String>, var_name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            var_name: Some(var_name.into()),
            target_name: None,
            weight_coeff: None,
            output_counts: false,
            output_sums: false,
            set_var_names: Vec::new(),
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target_name = Some(target.into());
        self
    }

    pub fn with_weight_coeff(mut self, coeff: f64) -> Self {
        self.weight_coeff = Some(coeff);
        self
    }

    pub fn with_output_counts(mut self, enabled: bool) -> Self {
        self.output_counts = enabled;
        self
    }

    pub fn with_output_sums(mut self, enabled: bool) -> Self {
        self.output_sums = enabled;
        self
    }

    pub fn with_set_vars<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.set_var_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Feature name prefix.
    pub fn target(&self) -> Option<&str> {
        self.target_name.as_deref().or(self.var_name.as_deref())
    }

    /// One-line description used in product metadata.
    pub fn describe(&self) -> String {
        let mut parts = vec![format!("type={}", self.kind)];
        if let Some(var) = &self.var_name {
            parts.push(format!("varName={}", var));
        }
        if let Some(target) = &self.target_name {
            parts.push(format!("targetName={}", target));
        }
        if let Some(coeff) = self.weight_coeff {
            parts.push(format!("weightCoeff={}", coeff));
        }
        if self.output_counts {
            parts.push("outputCounts=true".to_string());
        }
        if self.output_sums {
            parts.push("outputSums=true".to_string());
        }
        if !self.set_var_names.is_empty() {
            parts.push(format!("setVarNames={}", self.set_var_names.join(",")));
        }
        parts.join(";")
    }
}

/// Build `<prefix>_<suffix>` feature names.
pub(crate) fn feature_names(prefix: &str, suffixes: &[&str]) -> Vec<String> {
    suffixes
        .iter()
        .map(|suffix| format!("{}_{}", prefix, suffix))
        .collect()
}

/// Mean and clamped standard deviation from weighted sums.
///
/// Returns `None` when the weight is zero.
pub(crate) fn mean_sigma(sum: f64, sum_sq: f64, weight: f64) -> Option<(f64, f64, OutputStatus)> {
    if weight <= 0.0 || !weight.is_finite() {
        return None;
    }
    let mean = sum / weight;
    let variance = sum_sq / weight - mean * mean;
    if variance < 0.0 {
        Some((mean, 0.0, OutputStatus::Clamped))
    } else {
        Some((mean, variance.sqrt(), OutputStatus::Ok))
    }
}
