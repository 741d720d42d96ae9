//! Composition of aggregators into a single bin record.
//!
//! The BinManager owns the record layout: aggregator `i` gets the slice
//! `offsets[i]..offsets[i + 1]` of every spatial, temporal and output
//! record. Registration order is preserved in all feature name lists.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::aggregators::{Aggregator, AggregatorConfig, AggregatorRegistry, OutputStatus};
use crate::bins::{BinContext, FeatureVector, SpatialBin, TemporalBin};
use crate::error::{BinningError, Result};
use crate::observation::{Observation, VariableContext};

/// Post-processing applied to output features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PostProcessorConfig {
    /// Keep only the named output features, in the given order.
    Selection { names: Vec<String> },
}

/// Makes names unique by appending `_1`, `_2`, ... to repeats.
#[derive(Debug, Default)]
struct NameUnifier {
    seen: HashMap<String, usize>,
}

impl NameUnifier {
    fn unify(&mut self, name: &str) -> String {
        let count = self.seen.entry(name.to_string()).or_insert(0);
        let unified = if *count == 0 {
            name.to_string()
        } else {
            format!("{}_{}", name, count)
        };
        *count += 1;
        unified
    }

    fn unify_all<'a>(names: impl IntoIterator<Item = &'a String>) -> Vec<String> {
        let mut unifier = Self::default();
        names.into_iter().map(|n| unifier.unify(n)).collect()
    }
}

/// Flat slice layout of one record type.
#[derive(Debug, Clone)]
struct Layout {
    offsets: Vec<usize>,
    names: Arc<[String]>,
}

impl Layout {
    fn new<'a>(lists: impl Iterator<Item = &'a [String]>) -> Self {
        let mut offsets = vec![0];
        let mut names = Vec::new();
        for list in lists {
            names.extend(list.iter().cloned());
            offsets.push(names.len());
        }
        Self {
            offsets,
            names: NameUnifier::unify_all(&names).into(),
        }
    }

    fn len(&self) -> usize {
        self.names.len()
    }

    fn range(&self, i: usize) -> std::ops::Range<usize> {
        self.offsets[i]..self.offsets[i + 1]
    }
}

/// Composite of all aggregators of a run.
#[derive(Debug)]
pub struct BinManager {
    variables: VariableContext,
    aggregators: Vec<Box<dyn Aggregator>>,
    spatial: Layout,
    temporal: Layout,
    output: Layout,
    result_names: Arc<[String]>,
    selection: Option<Vec<usize>>,
    fill_value: f64,
    signature: String,
}

impl BinManager {
    /// Compose already constructed aggregators.
    pub fn new(
        variables: VariableContext,
        aggregators: Vec<Box<dyn Aggregator>>,
        post_processor: Option<&PostProcessorConfig>,
        fill_value: f64,
    ) -> Result<Self> {
        if aggregators.is_empty() {
            return Err(BinningError::configuration(
                "at least one aggregator must be configured",
            ));
        }

        let spatial = Layout::new(aggregators.iter().map(|a| a.spatial_feature_names()));
        let temporal = Layout::new(aggregators.iter().map(|a| a.temporal_feature_names()));
        let output = Layout::new(aggregators.iter().map(|a| a.output_feature_names()));

        let (result_names, selection) = match post_processor {
            None => (output.names.clone(), None),
            Some(PostProcessorConfig::Selection { names }) => {
                if names.is_empty() {
                    return Err(BinningError::configuration(
                        "feature selection must name at least one feature",
                    ));
                }
                let indices = names
                    .iter()
                    .map(|name| {
                        output.names.iter().position(|n| n == name).ok_or_else(|| {
                            BinningError::configuration(format!(
                                "selected feature '{}' is not produced (available: {})",
                                name,
                                output.names.join(", ")
                            ))
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                (names.clone().into(), Some(indices))
            }
        };

        let signature = aggregators
            .iter()
            .zip(0..)
            .map(|(a, i)| format!("{}[{}]", a.name(), spatial.names[spatial.range(i)].join(",")))
            .collect::<Vec<_>>()
            .join(";");

        debug!(
            aggregators = aggregators.len(),
            spatial_features = spatial.len(),
            output_features = result_names.len(),
            "Created bin manager"
        );

        Ok(Self {
            variables,
            aggregators,
            spatial,
            temporal,
            output,
            result_names,
            selection,
            fill_value,
            signature,
        })
    }

    /// Resolve aggregator configurations through `registry` and compose them.
    pub fn from_config(
        registry: &AggregatorRegistry,
        variables: VariableContext,
        configs: &[AggregatorConfig],
        post_processor: Option<&PostProcessorConfig>,
        fill_value: f64,
    ) -> Result<Self> {
        let aggregators = configs
            .iter()
            .map(|config| registry.create(&variables, config))
            .collect::<Result<Vec<_>>>()?;
        Self::new(variables, aggregators, post_processor, fill_value)
    }

    pub fn variables(&self) -> &VariableContext {
        &self.variables
    }

    pub fn aggregator_count(&self) -> usize {
        self.aggregators.len()
    }

    pub fn aggregator(&self, i: usize) -> &dyn Aggregator {
        self.aggregators[i].as_ref()
    }

    pub fn fill_value(&self) -> f64 {
        self.fill_value
    }

    /// Identifies the aggregator set and record layout.
    ///
    /// Bins can only be merged between managers with the same signature.
    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// Fail with a mismatch error unless `other` equals this manager's signature.
    pub fn check_signature(&self, other: &str) -> Result<()> {
        if other == self.signature {
            Ok(())
        } else {
            Err(BinningError::ConfigurationMismatch {
                expected: self.signature.clone(),
                found: other.to_string(),
            })
        }
    }

    pub fn spatial_feature_names(&self) -> &[String] {
        &self.spatial.names
    }

    pub fn temporal_feature_names(&self) -> &[String] {
        &self.temporal.names
    }

    pub fn output_feature_names(&self) -> &[String] {
        &self.output.names
    }

    /// Names of the features returned by [`compute_result`](Self::compute_result).
    pub fn result_feature_names(&self) -> &[String] {
        &self.result_names
    }

    pub fn create_spatial_bin(&self, index: u64) -> SpatialBin {
        let ctx = BinContext::new(index);
        let mut bin = SpatialBin::new(index, self.spatial.len());
        for (i, agg) in self.aggregators.iter().enumerate() {
            agg.init_spatial(&ctx, &mut bin.features[self.spatial.range(i)]);
        }
        bin
    }

    /// Fold an accepted observation into `bin`.
    pub fn aggregate_spatial_bin(&self, obs: &Observation, bin: &mut SpatialBin) {
        let ctx = BinContext::new(bin.index);
        for (i, agg) in self.aggregators.iter().enumerate() {
            agg.aggregate_spatial(&ctx, obs, &mut bin.features[self.spatial.range(i)]);
        }
        bin.num_obs += 1;
        if obs.time > bin.latest_time {
            bin.latest_time = obs.time;
        }
    }

    pub fn complete_spatial_bin(&self, bin: &mut SpatialBin) {
        let ctx = BinContext::new(bin.index);
        for (i, agg) in self.aggregators.iter().enumerate() {
            agg.complete_spatial(&ctx, bin.num_obs, &mut bin.features[self.spatial.range(i)]);
        }
    }

    pub fn create_temporal_bin(&self, index: u64) -> TemporalBin {
        let ctx = BinContext::new(index);
        let mut bin = TemporalBin::new(index, self.temporal.len());
        for (i, agg) in self.aggregators.iter().enumerate() {
            agg.init_temporal(&ctx, &mut bin.features[self.temporal.range(i)]);
        }
        bin
    }

    /// Fold one completed spatial bin (one file pass) into `temporal`.
    pub fn aggregate_temporal_bin(&self, spatial: &SpatialBin, temporal: &mut TemporalBin) {
        let ctx = BinContext::new(temporal.index);
        for (i, agg) in self.aggregators.iter().enumerate() {
            agg.aggregate_temporal(
                &ctx,
                &spatial.features[self.spatial.range(i)],
                spatial.num_obs,
                &mut temporal.features[self.temporal.range(i)],
            );
        }
        temporal.num_obs += spatial.num_obs;
        temporal.num_passes += 1;
    }

    /// Combine two partial temporal bins of the same cell.
    pub fn merge_temporal_bins(&self, into: &mut TemporalBin, other: &TemporalBin) {
        debug_assert_eq!(into.index, other.index);
        let ctx = BinContext::new(into.index);
        for (i, agg) in self.aggregators.iter().enumerate() {
            let range = self.temporal.range(i);
            agg.merge_temporal(&ctx, &mut into.features[range.clone()], &other.features[range]);
        }
        into.num_obs += other.num_obs;
        into.num_passes += other.num_passes;
    }

    pub fn complete_temporal_bin(&self, bin: &mut TemporalBin) {
        let ctx = BinContext::new(bin.index);
        for (i, agg) in self.aggregators.iter().enumerate() {
            agg.complete_temporal(&ctx, bin.num_obs, &mut bin.features[self.temporal.range(i)]);
        }
    }

    /// All aggregator output features of `bin`.
    pub fn compute_output(&self, bin: &TemporalBin) -> (Vec<f64>, OutputStatus) {
        let mut output = vec![self.fill_value; self.output.len()];
        let mut status = OutputStatus::Ok;
        for (i, agg) in self.aggregators.iter().enumerate() {
            status = status.and(agg.compute_output(
                &bin.features[self.temporal.range(i)],
                &mut output[self.output.range(i)],
                self.fill_value,
            ));
        }
        (output, status)
    }

    /// Output features after post-processing, in `result_feature_names` order.
    pub fn compute_result(&self, bin: &TemporalBin) -> (Vec<f64>, OutputStatus) {
        let (output, status) = self.compute_output(bin);
        match &self.selection {
            None => (output, status),
            Some(indices) => (indices.iter().map(|&i| output[i]).collect(), status),
        }
    }

    /// Result features of `bin` as a named vector.
    pub fn feature_vector(&self, bin: &TemporalBin) -> FeatureVector {
        FeatureVector::new(self.result_names.clone(), self.compute_result(bin).0)
    }

    /// Result features of a cell without any data.
    pub fn fill_result(&self) -> Vec<f64> {
        vec![self.fill_value; self.result_names.len()]
    }
}
