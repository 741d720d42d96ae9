//! `MISSING`: counts observations whose channel value was no-data.

use crate::aggregators::{feature_names, Aggregator, AggregatorConfig, OutputStatus};
use crate::bins::BinContext;
use crate::error::Result;
use crate::observation::{Observation, VariableContext};

/// Record layout is `[missing, total]`.
#[derive(Debug, Clone)]
pub struct MissingAggregator {
    var_index: usize,
    record_names: Vec<String>,
    output_names: Vec<String>,
}

impl MissingAggregator {
    pub const NAME: &'static str = "MISSING";

    pub fn new(ctx: &VariableContext, config: &AggregatorConfig) -> Result<Self> {
        let var_name = config.var_name.as_deref().unwrap_or_default();
        let var_index = ctx.require(var_name, Self::NAME)?;
        let target = config.target().unwrap_or(var_name);
        Ok(Self {
            var_index,
            record_names: feature_names(target, &["missing", "total"]),
            output_names: feature_names(target, &["missing", "valid_fraction"]),
        })
    }

    fn add(into: &mut [f64], other: &[f64]) {
        into[0] += other[0];
        into[1] += other[1];
    }
}

impl Aggregator for MissingAggregator {
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
        let missing = if obs.measurements[self.var_index].is_nan() { 1.0 } else { 0.0 };
        Self::add(spatial, &[missing, 1.0]);
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
        let (missing, total) = (temporal[0], temporal[1]);
        output[0] = missing;
        output[1] = if total > 0.0 { (total - missing) / total } else { fill };
        OutputStatus::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_missing_values() {
        let ctx = VariableContext::new(["a", "b"]);
        let agg = MissingAggregator::new(&ctx, &AggregatorConfig::new("MISSING", "b")).unwrap();
        let bin_ctx = BinContext::new(0);

        let mut spatial = vec![0.0; 2];
        agg.init_spatial(&bin_ctx, &mut spatial);
        for b in [1.0, f32::NAN, f32::NAN, 4.0] {
            agg.aggregate_spatial(&bin_ctx, &Observation::new(0.0, 0.0, vec![1.0, b]), &mut spatial);
        }
        let mut temporal = vec![0.0; 2];
        agg.aggregate_temporal(&bin_ctx, &spatial, 4, &mut temporal);

        let mut out = vec![0.0; 2];
        agg.compute_output(&temporal, &mut out, f64::NAN);
        assert_eq!(out, vec![2.0, 0.5]);
    }
}
