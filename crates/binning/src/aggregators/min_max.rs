//! `MIN_MAX`: extreme values of one channel.

use crate::aggregators::{feature_names, Aggregator, AggregatorConfig, OutputStatus};
use crate::bins::BinContext;
use crate::error::Result;
use crate::observation::{Observation, VariableContext};

#[derive(Debug, Clone)]
pub struct MinMaxAggregator {
    var_index: usize,
    names: Vec<String>,
}

impl MinMaxAggregator {
    pub const NAME: &'static str = "MIN_MAX";

    pub fn new(ctx: &VariableContext, config: &AggregatorConfig) -> Result<Self> {
        let var_name = config.var_name.as_deref().unwrap_or_default();
        let var_index = ctx.require(var_name, Self::NAME)?;
        let target = config.target().unwrap_or(var_name);
        Ok(Self {
            var_index,
            names: feature_names(target, &["min", "max"]),
        })
    }

    fn reset(record: &mut [f64]) {
        record[0] = f64::INFINITY;
        record[1] = f64::NEG_INFINITY;
    }

    fn combine(into: &mut [f64], other: &[f64]) {
        into[0] = into[0].min(other[0]);
        into[1] = into[1].max(other[1]);
    }
}

impl Aggregator for MinMaxAggregator {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn spatial_feature_names(&self) -> &[String] {
        &self.names
    }

    fn temporal_feature_names(&self) -> &[String] {
        &self.names
    }

    fn output_feature_names(&self) -> &[String] {
        &self.names
    }

    fn init_spatial(&self, _ctx: &BinContext, spatial: &mut [f64]) {
        Self::reset(spatial);
    }

    fn aggregate_spatial(&self, _ctx: &BinContext, obs: &Observation, spatial: &mut [f64]) {
        let value = obs.measurements[self.var_index];
        if !value.is_nan() {
            let value = value as f64;
            Self::combine(spatial, &[value, value]);
        }
    }

    fn init_temporal(&self, _ctx: &BinContext, temporal: &mut [f64]) {
        Self::reset(temporal);
    }

    fn aggregate_temporal(
        &self,
        _ctx: &BinContext,
        spatial: &[f64],
        _num_spatial_obs: u64,
        temporal: &mut [f64],
    ) {
        Self::combine(temporal, spatial);
    }

    fn merge_temporal(&self, _ctx: &BinContext, into: &mut [f64], other: &[f64]) {
        Self::combine(into, other);
    }

    fn compute_output(&self, temporal: &[f64], output: &mut [f64], fill: f64) -> OutputStatus {
        if temporal[0] > temporal[1] {
            output[0] = fill;
            output[1] = fill;
        } else {
            output[0] = temporal[0];
            output[1] = temporal[1];
        }
        OutputStatus::Ok
    }
}
