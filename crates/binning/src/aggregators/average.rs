//! `AVG`: weighted mean and standard deviation of one channel.
//!
//! Per file, the spatial record is normalized to a mean and a mean of
//! squares. Across files, each file mean is weighted by
//! `counts ^ weight_coeff`. With the default coefficient of 1 this equals
//! the plain mean over all observations, independent of how they were split
//! across files.

use crate::aggregators::{feature_names, mean_sigma, Aggregator, AggregatorConfig, OutputStatus};
use crate::bins::BinContext;
use crate::error::{BinningError, Result};
use crate::observation::{Observation, VariableContext};

const DEFAULT_WEIGHT_COEFF: f64 = 1.0;

#[derive(Debug, Clone)]
pub struct AverageAggregator {
    var_index: usize,
    weight_coeff: f64,
    output_counts: bool,
    output_sums: bool,
    spatial_names: Vec<String>,
    temporal_names: Vec<String>,
    output_names: Vec<String>,
}

impl AverageAggregator {
    pub const NAME: &'static str = "AVG";

    pub fn new(ctx: &VariableContext, config: &AggregatorConfig) -> Result<Self> {
        let var_name = config.var_name.as_deref().unwrap_or_default();
        let var_index = ctx.require(var_name, Self::NAME)?;
        let target = config.target().unwrap_or(var_name);
        let weight_coeff = config.weight_coeff.unwrap_or(DEFAULT_WEIGHT_COEFF);
        if !weight_coeff.is_finite() || weight_coeff < 0.0 {
            return Err(BinningError::configuration(format!(
                "{}: weight_coeff must be a finite non-negative number, got {}",
                Self::NAME,
                weight_coeff
            )));
        }

        let mut output_suffixes = vec!["mean", "sigma"];
        if config.output_counts {
            output_suffixes.push("counts");
        }
        if config.output_sums {
            output_suffixes.extend(["sum", "sum_sq"]);
        }

        Ok(Self {
            var_index,
            weight_coeff,
            output_counts: config.output_counts,
            output_sums: config.output_sums,
            spatial_names: feature_names(target, &["sum", "sum_sq", "counts"]),
            temporal_names: feature_names(target, &["sum", "sum_sq", "weights", "counts"]),
            output_names: feature_names(target, &output_suffixes),
        })
    }
}

impl Aggregator for AverageAggregator {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn spatial_feature_names(&self) -> &[String] {
        &self.spatial_names
    }

    fn temporal_feature_names(&self) -> &[String] {
        &self.temporal_names
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
        let weight = obs.weight as f64;
        spatial[0] += weight * value;
        spatial[1] += weight * value * value;
        spatial[2] += weight;
    }

    fn complete_spatial(&self, _ctx: &BinContext, _num_spatial_obs: u64, spatial: &mut [f64]) {
        let counts = spatial[2];
        if counts > 0.0 {
            spatial[0] /= counts;
            spatial[1] /= counts;
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
        let counts = spatial[2];
        if counts <= 0.0 {
            return;
        }
        let weight = counts.powf(self.weight_coeff);
        temporal[0] += spatial[0] * weight;
        temporal[1] += spatial[1] * weight;
        temporal[2] += weight;
        temporal[3] += counts;
    }

    fn merge_temporal(&self, _ctx: &BinContext, into: &mut [f64], other: &[f64]) {
        for (a, b) in into.iter_mut().zip(other) {
            *a += b;
        }
    }

    fn compute_output(&self, temporal: &[f64], output: &mut [f64], fill: f64) -> OutputStatus {
        let (sum, sum_sq, weights, counts) = (temporal[0], temporal[1], temporal[2], temporal[3]);
        let status = match mean_sigma(sum, sum_sq, weights) {
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
        };

        let mut next = 2;
        if self.output_counts {
            output[next] = counts;
            next += 1;
        }
        if self.output_sums {
            output[next] = sum;
            output[next + 1] = sum_sq;
        }
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aggregator(config: AggregatorConfig) -> AverageAggregator {
        let ctx = VariableContext::new(["c"]);
        AverageAggregator::new(&ctx, &config).unwrap()
    }

    fn spatial(agg: &AverageAggregator, values: &[f32]) -> Vec<f64> {
        let ctx = BinContext::new(0);
        let mut record = vec![0.0; 3];
        agg.init_spatial(&ctx, &mut record);
        for v in values {
            agg.aggregate_spatial(&ctx, &Observation::new(0.0, 0.0, vec![*v]), &mut record);
        }
        agg.complete_spatial(&ctx, values.len() as u64, &mut record);
        record
    }

    #[test]
    fn test_feature_names() {
        let agg = aggregator(
            AggregatorConfig::new("AVG", "c")
                .with_output_counts(true)
                .with_output_sums(true),
        );
        assert_eq!(agg.spatial_feature_names(), ["c_sum", "c_sum_sq", "c_counts"]);
        assert_eq!(
            agg.temporal_feature_names(),
            ["c_sum", "c_sum_sq", "c_weights", "c_counts"]
        );
        assert_eq!(
            agg.output_feature_names(),
            ["c_mean", "c_sigma", "c_counts", "c_sum", "c_sum_sq"]
        );
    }

    #[test]
    fn test_unknown_variable() {
        let ctx = VariableContext::new(["c"]);
        assert!(AverageAggregator::new(&ctx, &AggregatorConfig::new("AVG", "d")).is_err());
    }

    #[test]
    fn test_spatial_skips_nan_and_normalizes() {
        let agg = aggregator(AggregatorConfig::new("AVG", "c"));
        let record = spatial(&agg, &[1.0, f32::NAN, 3.0]);
        assert_eq!(record, vec![2.0, 5.0, 2.0]);
    }

    #[test]
    fn test_mean_over_files_equals_global_mean() {
        let agg = aggregator(AggregatorConfig::new("AVG", "c").with_output_counts(true));
        let ctx = BinContext::new(0);
        let mut temporal = vec![0.0; 4];
        agg.init_temporal(&ctx, &mut temporal);
        agg.aggregate_temporal(&ctx, &spatial(&agg, &[1.0, 2.0]), 2, &mut temporal);
        agg.aggregate_temporal(&ctx, &spatial(&agg, &[6.0]), 1, &mut temporal);

        let mut out = vec![0.0; 3];
        agg.compute_output(&temporal, &mut out, f64::NAN);
        assert!((out[0] - 3.0).abs() < 1e-12);
        let expected_sigma = ((1.0 + 4.0 + 36.0) / 3.0 - 9.0f64).sqrt();
        assert!((out[1] - expected_sigma).abs() < 1e-12);
        assert_eq!(out[2], 3.0);
    }

    #[test]
    fn test_weight_coeff_zero_weights_files_equally() {
        let agg = aggregator(AggregatorConfig::new("AVG", "c").with_weight_coeff(0.0));
        let ctx = BinContext::new(0);
        let mut temporal = vec![0.0; 4];
        agg.aggregate_temporal(&ctx, &spatial(&agg, &[1.0, 1.0, 1.0]), 3, &mut temporal);
        agg.aggregate_temporal(&ctx, &spatial(&agg, &[5.0]), 1, &mut temporal);

        let mut out = vec![0.0; 2];
        agg.compute_output(&temporal, &mut out, f64::NAN);
        assert!((out[0] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_weight_coeff_is_rejected() {
        let ctx = VariableContext::new(["c"]);
        for coeff in [f64::NAN, -1.0, f64::INFINITY] {
            let config = AggregatorConfig::new("AVG", "c").with_weight_coeff(coeff);
            assert!(matches!(
                AverageAggregator::new(&ctx, &config),
                Err(BinningError::Configuration(_))
            ));
        }
    }

    #[test]
    fn test_empty_yields_fill() {
        let agg = aggregator(AggregatorConfig::new("AVG", "c").with_output_counts(true));
        let ctx = BinContext::new(0);
        let mut temporal = vec![0.0; 4];
        agg.aggregate_temporal(&ctx, &spatial(&agg, &[f32::NAN]), 1, &mut temporal);

        let mut out = vec![0.0; 3];
        let status = agg.compute_output(&temporal, &mut out, -1.0);
        assert_eq!(out, vec![-1.0, -1.0, 0.0]);
        assert_eq!(status, OutputStatus::Ok);
    }
}
