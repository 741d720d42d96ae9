//! Per-file spatial binning.
//!
//! A [`SpatialBinner`] folds the observations of one source file into a
//! private map of cell index to [`SpatialBin`]. It is single-threaded by
//! construction; parallelism comes from running one binner per file.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use planetary_grid::{PlanetaryGrid, Region};
use tracing::trace;

use crate::bin_manager::BinManager;
use crate::bins::SpatialBin;
use crate::config::TimeRange;
use crate::error::Result;
use crate::observation::Observation;

/// Why an observation was not binned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Coordinate is outside the grid domain or not a number.
    OutOfDomain,
    /// Coordinate is outside the region of interest.
    OutsideRegion,
    /// Acquisition time is outside the configured period.
    OutsideTimeRange,
    /// Every channel is no-data, or the measurement vector is malformed.
    NoValidChannel,
    /// Weight is not a finite positive number.
    InvalidWeight,
}

/// Result of [`SpatialBinner::process_observation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservationOutcome {
    Accepted { cell: u64 },
    Rejected(RejectReason),
}

/// Observation counters of one or more files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpatialStats {
    pub accepted: u64,
    pub rejected_out_of_domain: u64,
    pub rejected_outside_region: u64,
    pub rejected_outside_time_range: u64,
    pub rejected_no_valid_channel: u64,
    pub rejected_invalid_weight: u64,
}

impl SpatialStats {
    fn record(&mut self, outcome: ObservationOutcome) {
        match outcome {
            ObservationOutcome::Accepted { .. } => self.accepted += 1,
            ObservationOutcome::Rejected(RejectReason::OutOfDomain) => {
                self.rejected_out_of_domain += 1
            }
            ObservationOutcome::Rejected(RejectReason::OutsideRegion) => {
                self.rejected_outside_region += 1
            }
            ObservationOutcome::Rejected(RejectReason::OutsideTimeRange) => {
                self.rejected_outside_time_range += 1
            }
            ObservationOutcome::Rejected(RejectReason::NoValidChannel) => {
                self.rejected_no_valid_channel += 1
            }
            ObservationOutcome::Rejected(RejectReason::InvalidWeight) => {
                self.rejected_invalid_weight += 1
            }
        }
    }

    pub fn rejected(&self) -> u64 {
        self.rejected_out_of_domain
            + self.rejected_outside_region
            + self.rejected_outside_time_range
            + self.rejected_no_valid_channel
            + self.rejected_invalid_weight
    }

    pub fn total(&self) -> u64 {
        self.accepted + self.rejected()
    }

    pub fn merge(&mut self, other: &SpatialStats) {
        self.accepted += other.accepted;
        self.rejected_out_of_domain += other.rejected_out_of_domain;
        self.rejected_outside_region += other.rejected_outside_region;
        self.rejected_outside_time_range += other.rejected_outside_time_range;
        self.rejected_no_valid_channel += other.rejected_no_valid_channel;
        self.rejected_invalid_weight += other.rejected_invalid_weight;
    }
}

/// Spatial predicates applied before binning.
#[derive(Debug, Clone, Default)]
pub struct ObservationFilter {
    pub region: Option<Region>,
    pub time_range: Option<TimeRange>,
}

/// Completed bins of one file, sorted by cell index.
#[derive(Debug, Clone)]
pub struct SpatialBinBatch {
    pub bins: Vec<SpatialBin>,
    pub stats: SpatialStats,
    /// Signature of the manager that produced the bins.
    pub signature: String,
    pub min_time: Option<DateTime<Utc>>,
    pub max_time: Option<DateTime<Utc>>,
}

/// Bins the observations of a single source file.
pub struct SpatialBinner {
    grid: Arc<dyn PlanetaryGrid>,
    manager: Arc<BinManager>,
    filter: Arc<ObservationFilter>,
    channel_map: Option<Vec<usize>>,
    bins: HashMap<u64, SpatialBin>,
    stats: SpatialStats,
    min_time: Option<DateTime<Utc>>,
    max_time: Option<DateTime<Utc>>,
}

impl SpatialBinner {
    pub fn new(
        grid: Arc<dyn PlanetaryGrid>,
        manager: Arc<BinManager>,
        filter: Arc<ObservationFilter>,
    ) -> Self {
        Self {
            grid,
            manager,
            filter,
            channel_map: None,
            bins: HashMap::new(),
            stats: SpatialStats::default(),
            min_time: None,
            max_time: None,
        }
    }

    /// Declare the channel order of the incoming observations.
    ///
    /// Fails when a configured variable is not provided by the stream.
    pub fn set_channel_names(&mut self, channels: &[String]) -> Result<()> {
        self.channel_map = self.manager.variables().channel_mapping(channels)?;
        Ok(())
    }

    /// Validate and fold one observation.
    pub fn process_observation(&mut self, mut obs: Observation) -> ObservationOutcome {
        let outcome = self.fold(&mut obs);
        self.stats.record(outcome);
        if let ObservationOutcome::Rejected(reason) = outcome {
            trace!(lat = obs.lat, lon = obs.lon, ?reason, "Observation rejected");
        }
        outcome
    }

    fn fold(&mut self, obs: &mut Observation) -> ObservationOutcome {
        if !obs.weight.is_finite() || obs.weight <= 0.0 {
            return ObservationOutcome::Rejected(RejectReason::InvalidWeight);
        }
        let variables = self.manager.variables();
        match &self.channel_map {
            Some(map) => {
                if map.iter().any(|&i| i >= obs.measurements.len()) {
                    return ObservationOutcome::Rejected(RejectReason::NoValidChannel);
                }
                obs.measurements = map.iter().map(|&i| obs.measurements[i]).collect();
            }
            None => {
                if obs.measurements.len() < variables.len() {
                    return ObservationOutcome::Rejected(RejectReason::NoValidChannel);
                }
                obs.measurements.truncate(variables.len());
            }
        }

        if let (Some(range), Some(time)) = (&self.filter.time_range, obs.time) {
            if !range.contains(time) {
                return ObservationOutcome::Rejected(RejectReason::OutsideTimeRange);
            }
        }

        let cell = match self.grid.cell_index(obs.lat, obs.lon) {
            Ok(cell) => cell,
            Err(_) => return ObservationOutcome::Rejected(RejectReason::OutOfDomain),
        };

        if let Some(region) = &self.filter.region {
            if !region.contains(obs.lat, obs.lon) {
                return ObservationOutcome::Rejected(RejectReason::OutsideRegion);
            }
        }

        if variables.normalize(&mut obs.measurements) == 0 {
            return ObservationOutcome::Rejected(RejectReason::NoValidChannel);
        }

        let manager = &self.manager;
        let bin = self
            .bins
            .entry(cell)
            .or_insert_with(|| manager.create_spatial_bin(cell));
        manager.aggregate_spatial_bin(obs, bin);

        if let Some(time) = obs.time {
            self.min_time = Some(self.min_time.map_or(time, |t| t.min(time)));
            self.max_time = Some(self.max_time.map_or(time, |t| t.max(time)));
        }

        ObservationOutcome::Accepted { cell }
    }

    pub fn stats(&self) -> &SpatialStats {
        &self.stats
    }

    /// Number of cells touched so far.
    pub fn num_bins(&self) -> usize {
        self.bins.len()
    }

    /// Complete all bins and emit them in increasing cell order.
    pub fn complete(self) -> SpatialBinBatch {
        let mut bins: Vec<SpatialBin> = self.bins.into_values().collect();
        bins.sort_unstable_by_key(|b| b.index);
        for bin in &mut bins {
            self.manager.complete_spatial_bin(bin);
        }
        SpatialBinBatch {
            bins,
            stats: self.stats,
            signature: self.manager.signature().to_string(),
            min_time: self.min_time,
            max_time: self.max_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregators::{AggregatorConfig, AggregatorRegistry};
    use crate::observation::VariableContext;
    use chrono::TimeZone;
    use planetary_grid::{BoundingBox, SeaGrid};

    fn binner(filter: ObservationFilter) -> SpatialBinner {
        let vars = VariableContext::new(["chl", "sst"]).with_no_data("sst", -999.0);
        let manager = BinManager::from_config(
            &AggregatorRegistry::default(),
            vars,
            &[
                AggregatorConfig::new("MEAN_OBS", "chl"),
                AggregatorConfig::new("MEAN_OBS", "sst"),
            ],
            None,
            f64::NAN,
        )
        .unwrap();
        SpatialBinner::new(
            Arc::new(SeaGrid::new(18).unwrap()),
            Arc::new(manager),
            Arc::new(filter),
        )
    }

    #[test]
    fn test_rejections_are_counted() {
        let region = Region::from_bbox(&BoundingBox::new(0.0, 0.0, 20.0, 20.0)).unwrap();
        let mut b = binner(ObservationFilter {
            region: Some(region),
            time_range: None,
        });

        assert!(matches!(
            b.process_observation(Observation::new(5.0, 5.0, vec![1.0, 2.0])),
            ObservationOutcome::Accepted { .. }
        ));
        assert_eq!(
            b.process_observation(Observation::new(95.0, 5.0, vec![1.0, 2.0])),
            ObservationOutcome::Rejected(RejectReason::OutOfDomain)
        );
        assert_eq!(
            b.process_observation(Observation::new(-5.0, 5.0, vec![1.0, 2.0])),
            ObservationOutcome::Rejected(RejectReason::OutsideRegion)
        );
        assert_eq!(
            b.process_observation(Observation::new(5.0, 5.0, vec![f32::NAN, -999.0])),
            ObservationOutcome::Rejected(RejectReason::NoValidChannel)
        );
        assert_eq!(
            b.process_observation(Observation::new(5.0, 5.0, vec![1.0])),
            ObservationOutcome::Rejected(RejectReason::NoValidChannel)
        );

        let stats = *b.stats();
        assert_eq!(stats.accepted, 1);
        assert_eq!(stats.rejected(), 4);
        assert_eq!(stats.total(), 5);
    }

    #[test]
    fn test_invalid_weights_are_rejected() {
        let mut b = binner(ObservationFilter::default());
        for weight in [f32::NAN, -0.5, 0.0, f32::INFINITY] {
            assert_eq!(
                b.process_observation(Observation::new(5.0, 5.0, vec![1.0, 2.0]).with_weight(weight)),
                ObservationOutcome::Rejected(RejectReason::InvalidWeight)
            );
        }
        b.process_observation(Observation::new(5.0, 5.0, vec![3.0, 2.0]).with_weight(2.5));

        assert_eq!(b.stats().rejected_invalid_weight, 4);
        assert_eq!(b.stats().accepted, 1);
        let batch = b.complete();
        assert_eq!(batch.bins.len(), 1);
        assert_eq!(batch.bins[0].num_obs, 1);
    }

    #[test]
    fn test_time_filter() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut b = binner(ObservationFilter {
            region: None,
            time_range: Some(TimeRange::new(start, start + chrono::Duration::days(1))),
        });
        let inside = Observation::new(0.0, 0.0, vec![1.0, 1.0]).with_time(start);
        let outside =
            Observation::new(0.0, 0.0, vec![1.0, 1.0]).with_time(start + chrono::Duration::days(2));
        let untimed = Observation::new(0.0, 0.0, vec![1.0, 1.0]);

        assert!(matches!(b.process_observation(inside), ObservationOutcome::Accepted { .. }));
        assert_eq!(
            b.process_observation(outside),
            ObservationOutcome::Rejected(RejectReason::OutsideTimeRange)
        );
        assert!(matches!(b.process_observation(untimed), ObservationOutcome::Accepted { .. }));

        let batch = b.complete();
        assert_eq!(batch.min_time, Some(start));
        assert_eq!(batch.max_time, Some(start));
    }

    #[test]
    fn test_no_data_channel_does_not_block_others() {
        let mut b = binner(ObservationFilter::default());
        b.process_observation(Observation::new(1.0, 1.0, vec![0.5, -999.0]));
        b.process_observation(Observation::new(1.0, 1.0, vec![1.5, 20.0]));
        let batch = b.complete();
        assert_eq!(batch.bins.len(), 1);
        let bin = &batch.bins[0];
        assert_eq!(bin.num_obs, 2);
        // MEAN_OBS records: [sum, sum_sq, counts] for chl then sst.
        assert_eq!(bin.features[0], 2.0);
        assert_eq!(bin.features[2], 2.0);
        assert_eq!(bin.features[3], 20.0);
        assert_eq!(bin.features[5], 1.0);
    }

    #[test]
    fn test_channel_remapping() {
        let mut b = binner(ObservationFilter::default());
        b.set_channel_names(&["sst".to_string(), "chl".to_string()])
            .unwrap();
        b.process_observation(Observation::new(1.0, 1.0, vec![20.0, 0.5]));
        let batch = b.complete();
        assert_eq!(batch.bins[0].features[0], 0.5);
        assert_eq!(batch.bins[0].features[3], 20.0);

        let mut missing = binner(ObservationFilter::default());
        assert!(missing.set_channel_names(&["chl".to_string()]).is_err());
    }

    #[test]
    fn test_bins_emitted_in_cell_order() {
        let mut b = binner(ObservationFilter::default());
        for (lat, lon) in [(-80.0, 100.0), (80.0, -100.0), (0.0, 0.0), (45.0, 45.0)] {
            b.process_observation(Observation::new(lat, lon, vec![1.0, 1.0]));
        }
        let batch = b.complete();
        assert_eq!(batch.bins.len(), 4);
        assert!(batch.bins.windows(2).all(|w| w[0].index < w[1].index));
        assert_eq!(batch.signature, b_signature());
    }

    fn b_signature() -> String {
        binner(ObservationFilter::default())
            .manager
            .signature()
            .to_string()
    }
}
