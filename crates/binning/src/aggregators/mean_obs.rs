//! `MEAN_OBS`: mean, standard deviation and count over raw observations.
//!
//! Unlike `AVG`, no per-file normalization takes place: sums are carried
//! through to the temporal record unchanged, so every observation has the
//! same weight regardless of the file it came from.

use crate::aggregators::{feature_names, mean_sigma, Aggregator, AggregatorConfig, OutputStatus};
use crate::bins::BinContext;
use crate::error::Result;
use crate::observation::{Observation, VariableContext};

#[derive(Debug, Clone)]
pub struct MeanObsAggregator {
    var_index: usize,
    record_names: Vec<String>,
    output_names: Vec<String>,
}

impl MeanObsAggregator {
    pub const NAME: &'static str = "MEAN_OBS";

    pub fn new(ctx: &VariableContext, config: &AggregatorConfig) -> Result<Self> {
        let var_name = config.var_name.as_deref().unwrap_or_default();
        let var_index = ctx.require(var_name, Self::NAME)?;
        let target = config.target().unwrap_or(var_name);
        Ok(Self {
            var_index,
            record_names: feature_names(target, &["sum", "sum_sq", "counts"]),
            output_names: feature_names(target, &["mean", "sigma", "counts"]),
        })
    }
}

impl Aggregator for MeanObsAggregator {
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
        if value.is_nan() {
            return;
        }
        let value = value as f64;
        spatial[0] += value;
        spatial[1] += value * value;
        spatial[2] += 1.0;
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
        for (t, s) in temporal.iter_mut().zip(spatial) {
            *t += s;
        }
    }

    fn merge_temporal(&self, _ctx: &BinContext, into: &mut [f64], other: &[f64]) {
        for (a, b) in into.iter_mut().zip(other) {
            *a += b;
        }
    }

    fn compute_output(&self, temporal: &[f64], output: &mut [f64], fill: f64) -> OutputStatus {
        let counts = temporal[2];
        output[2] = counts;
        match mean_sigma(temporal[0], temporal[1], counts) {
            Some((mean, sigma, status)) => {
                output[0] = mean;
                output[1] = sigma;
                status
            }
            None => {
                output[0] = fill;
                output[1] = fill;
                OutputStatus::Ok
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(agg: &MeanObsAggregator, files: &[&[f32]]) -> Vec<f64> {
        let ctx = BinContext::new(7);
        let mut temporal = vec![0.0; 3];
        agg.init_temporal(&ctx, &mut temporal);
        for values in files {
            let mut spatial = vec![0.0; 3];
            agg.init_spatial(&ctx, &mut spatial);
            for v in *values {
                agg.aggregate_spatial(&ctx, &Observation::new(0.0, 0.0, vec![*v]), &mut spatial);
            }
            agg.complete_spatial(&ctx, values.len() as u64, &mut spatial);
            agg.aggregate_temporal(&ctx, &spatial, values.len() as u64, &mut temporal);
        }
        let mut out = vec![0.0; 3];
        agg.compute_output(&temporal, &mut out, f64::NAN);
        out
    }

    #[test]
    fn test_mean_sigma_counts() {
        let ctx = VariableContext::new(["c"]);
        let agg = MeanObsAggregator::new(&ctx, &AggregatorConfig::new("MEAN_OBS", "c")).unwrap();
        assert_eq!(agg.output_feature_names(), ["c_mean", "c_sigma", "c_counts"]);

        let out = run(&agg, &[&[0.2, 0.4], &[0.6]]);
        assert!((out[0] - 0.4).abs() < 1e-6);
        assert!((out[1] - (0.08f64 / 3.0).sqrt()).abs() < 1e-6);
        assert_eq!(out[2], 3.0);
    }

    #[test]
    fn test_no_valid_values() {
        let ctx = VariableContext::new(["c"]);
        let agg = MeanObsAggregator::new(&ctx, &AggregatorConfig::new("MEAN_OBS", "c")).unwrap();
        let out = run(&agg, &[&[f32::NAN]]);
        assert!(out[0].is_nan());
        assert!(out[1].is_nan());
        assert_eq!(out[2], 0.0);
    }
}
