//! `SUM`: total of one channel.

use crate::aggregators::{feature_names, Aggregator, AggregatorConfig, OutputStatus};
use crate::bins::BinContext;
use crate::error::Result;
use crate::observation::{Observation, VariableContext};

/// Record layout is `[sum, counts]`; only the sum is emitted.
#[derive(Debug, Clone)]
pub struct SumAggregator {
    var_index: usize,
    record_names: Vec<String>,
    output_names: Vec<String>,
}

impl SumAggregator {
    pub const NAME: &'static str = "SUM";

    pub fn new(ctx: &VariableContext, config: &AggregatorConfig) -> Result<Self> {
        let var_name = config.var_name.as_deref().unwrap_or_default();
        let var_index = ctx.require(var_name, Self::NAME)?;
        let target = config.target().unwrap_or(var_name);
        Ok(Self {
            var_index,
            record_names: feature_names(target, &["sum", "counts"]),
            output_names: feature_names(target, &["sum"]),
        })
    }

    fn add(into: &mut [f64], other: &[f64]) {
        into[0] += other[0];
        into[1] += other[1];
    }
}

impl Aggregator for SumAggregator {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn spatial_feature_names(&self) -> &[String] {
        &self.record_names
    }

    fn temporal_feature_names(&self) -> &[String] {
        &self.record_names
    }

    fn output_feature_names(&self) -> &[String] {
        &self.output_names
    }

    fn init_spatial(&self, _ctx: &BinContext, spatial: &mut [f64]) {
        spatial.fill(0.0);
    }

    fn aggregate_spatial(&self, _ctx: &BinContext, obs: &Observation, spatial: &mut [f64]) {
        let value = obs.measurements[self.var_index];
        if !value.is_nan() {
            Self::add(spatial, &[value as f64, 1.0]);
        }
    }

    fn init_temporal(&self, _ctx: &BinContext, temporal: &mut [f64]) {
        temporal.fill(0.0);
    }

    fn aggregate_temporal(
        &self,
        _ctx: &BinContext,
        spatial: &[f64],
        _num_spatial_obs: u64,
        temporal: &mut [f64],
    ) {
        Self::add(temporal, spatial);
    }

    fn merge_temporal(&self, _ctx: &BinContext, into: &mut [f64], other: &[f64]) {
        Self::add(into, other);
    }

    fn compute_output(&self, temporal: &[f64], output: &mut [f64], fill: f64) -> OutputStatus {
        output[0] = if temporal[1] > 0.0 { temporal[0] } else { fill };
        OutputStatus::Ok
    }
}
