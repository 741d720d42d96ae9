//! `ON_MAX_SET`: maximum of one channel together with the values of other
//! channels observed at that maximum.
//!
//! Record layout is `[max, time, set_1, ..., set_n]`. Records are ordered
//! lexicographically with a total float order, so ties between equal maxima
//! are broken the same way whatever the merge order.

use std::cmp::Ordering;

use crate::aggregators::{feature_names, Aggregator, AggregatorConfig, OutputStatus};
use crate::bins::BinContext;
use crate::error::{BinningError, Result};
use crate::observation::{Observation, VariableContext};

#[derive(Debug, Clone)]
pub struct OnMaxSetAggregator {
    var_index: usize,
    set_indices: Vec<usize>,
    names: Vec<String>,
}

impl OnMaxSetAggregator {
    pub const NAME: &'static str = "ON_MAX_SET";

    pub fn new(ctx: &VariableContext, config: &AggregatorConfig) -> Result<Self> {
        let var_name = config.var_name.as_deref().unwrap_or_default();
        let var_index = ctx.require(var_name, Self::NAME)?;
        if config.set_var_names.is_empty() {
            return Err(BinningError::configuration(format!(
                "{} on '{}' needs at least one entry in set_var_names",
                Self::NAME,
                var_name
            )));
        }
        let set_indices = config
            .set_var_names
            .iter()
            .map(|name| ctx.require(name, Self::NAME))
            .collect::<Result<Vec<_>>>()?;

        let target = config.target().unwrap_or(var_name);
        let mut names = feature_names(target, &["max", "time"]);
        names.extend(config.set_var_names.iter().cloned());

        Ok(Self {
            var_index,
            set_indices,
            names,
        })
    }

    fn reset(record: &mut [f64]) {
        record[0] = f64::NEG_INFINITY;
        record[1..].fill(f64::NAN);
    }

    fn compare(a: &[f64], b: &[f64]) -> Ordering {
        a.iter()
            .zip(b)
            .map(|(x, y)| x.total_cmp(y))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    }

    fn keep_greater(into: &mut [f64], candidate: &[f64]) {
        if Self::compare(candidate, into) == Ordering::Greater {
            into.copy_from_slice(candidate);
        }
    }
}

impl Aggregator for OnMaxSetAggregator {
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
        if value.is_nan() || (value as f64) < spatial[0] {
            return;
        }
        let mut candidate = Vec::with_capacity(spatial.len());
        candidate.push(value as f64);
        candidate.push(obs.time_seconds());
        candidate.extend(self.set_indices.iter().map(|&i| obs.measurements[i] as f64));
        Self::keep_greater(spatial, &candidate);
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
        Self::keep_greater(temporal, spatial);
    }

    fn merge_temporal(&self, _ctx: &BinContext, into: &mut [f64], other: &[f64]) {
        Self::keep_greater(into, other);
    }

    fn compute_output(&self, temporal: &[f64], output: &mut [f64], fill: f64) -> OutputStatus {
        if temporal[0] == f64::NEG_INFINITY {
            output.fill(fill);
        } else {
            for (out, value) in output.iter_mut().zip(temporal) {
                *out = if value.is_nan() { fill } else { *value };
            }
        }
        OutputStatus::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn agg() -> OnMaxSetAggregator {
        let ctx = VariableContext::new(["ndvi", "red", "nir"]);
        let config = AggregatorConfig::new("ON_MAX_SET", "ndvi").with_set_vars(["red", "nir"]);
        OnMaxSetAggregator::new(&ctx, &config).unwrap()
    }

    #[test]
    fn test_requires_set_vars() {
        let ctx = VariableContext::new(["ndvi"]);
        assert!(OnMaxSetAggregator::new(&ctx, &AggregatorConfig::new("ON_MAX_SET", "ndvi")).is_err());
    }

    #[test]
    fn test_keeps_values_at_maximum() {
        let agg = agg();
        assert_eq!(agg.output_feature_names(), ["ndvi_max", "ndvi_time", "red", "nir"]);

        let ctx = BinContext::new(0);
        let t = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let mut spatial = vec![0.0; 4];
        agg.init_spatial(&ctx, &mut spatial);
        for (ndvi, red, nir) in [(0.3, 0.1, 0.2), (0.8, 0.05, 0.5), (0.5, 0.2, 0.4)] {
            let obs = Observation::new(0.0, 0.0, vec![ndvi, red, nir]).with_time(t);
            agg.aggregate_spatial(&ctx, &obs, &mut spatial);
        }

        let mut out = vec![0.0; 4];
        agg.compute_output(&spatial, &mut out, f64::NAN);
        assert!((out[0] - 0.8).abs() < 1e-6);
        assert_eq!(out[1], t.timestamp() as f64);
        assert!((out[2] - 0.05).abs() < 1e-6);
        assert!((out[3] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_tie_break_is_order_independent() {
        let agg = agg();
        let ctx = BinContext::new(0);
        let a = vec![0.8, 100.0, 0.1, 0.2];
        let b = vec![0.8, 100.0, 0.3, 0.1];

        let mut ab = vec![0.0; 4];
        agg.init_temporal(&ctx, &mut ab);
        agg.aggregate_temporal(&ctx, &a, 1, &mut ab);
        agg.aggregate_temporal(&ctx, &b, 1, &mut ab);

        let mut ba = vec![0.0; 4];
        agg.init_temporal(&ctx, &mut ba);
        agg.aggregate_temporal(&ctx, &b, 1, &mut ba);
        agg.aggregate_temporal(&ctx, &a, 1, &mut ba);

        assert_eq!(ab, ba);
        assert_eq!(ab, b);
    }

    #[test]
    fn test_empty_yields_fill() {
        let agg = agg();
        let ctx = BinContext::new(0);
        let mut t = vec![0.0; 4];
        agg.init_temporal(&ctx, &mut t);
        let mut out = vec![0.0; 4];
        agg.compute_output(&t, &mut out, -5.0);
        assert_eq!(out, vec![-5.0; 4]);
    }
}
