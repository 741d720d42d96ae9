//! Temporal compositing policies.
//!
//! With [`CompositingType::Binning`] every file pass of a cell is
//! accumulated. The selection policies instead keep exactly one pass per
//! cell, chosen by a total order so that the winner does not depend on the
//! order in which passes arrive.

use std::cmp::Ordering;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::bin_manager::BinManager;
use crate::bins::{SpatialBin, TemporalBin};
use crate::error::{BinningError, Result};

/// How passes over the same cell are combined.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompositingType {
    /// Accumulate all passes (arithmetic compositing).
    #[default]
    Binning,
    /// Keep the pass with the latest observation time.
    MostRecent,
    /// Keep the pass with the largest value of a spatial feature, e.g. max-NDVI.
    MaxFeature { feature: String },
}

impl CompositingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Binning => "BINNING",
            Self::MostRecent => "MOST_RECENT",
            Self::MaxFeature { .. } => "MAX_FEATURE",
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Policy {
    Accumulate,
    MostRecent,
    MaxFeature(usize),
}

/// Per-cell state while passes are being combined.
#[derive(Debug, Clone)]
pub enum CellState {
    Accumulated(TemporalBin),
    Selected(SpatialBin),
}

impl CellState {
    pub fn index(&self) -> u64 {
        match self {
            Self::Accumulated(bin) => bin.index,
            Self::Selected(bin) => bin.index,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Accumulated(_) => "accumulated",
            Self::Selected(_) => "selected",
        }
    }
}

/// Applies a compositing policy on top of a [`BinManager`].
#[derive(Debug, Clone)]
pub struct Compositor {
    manager: Arc<BinManager>,
    policy: Policy,
}

impl Compositor {
    pub fn new(manager: Arc<BinManager>, compositing: &CompositingType) -> Result<Self> {
        let policy = match compositing {
            CompositingType::Binning => Policy::Accumulate,
            CompositingType::MostRecent => Policy::MostRecent,
            CompositingType::MaxFeature { feature } => {
                let index = manager
                    .spatial_feature_names()
                    .iter()
                    .position(|n| n == feature)
                    .ok_or_else(|| {
                        BinningError::configuration(format!(
                            "compositing feature '{}' is not a spatial feature (available: {})",
                            feature,
                            manager.spatial_feature_names().join(", ")
                        ))
                    })?;
                Policy::MaxFeature(index)
            }
        };
        Ok(Self { manager, policy })
    }

    pub fn manager(&self) -> &Arc<BinManager> {
        &self.manager
    }

    /// State for the first pass seen for a cell.
    pub fn start(&self, spatial: SpatialBin) -> CellState {
        match self.policy {
            Policy::Accumulate => {
                let mut temporal = self.manager.create_temporal_bin(spatial.index);
                self.manager.aggregate_temporal_bin(&spatial, &mut temporal);
                CellState::Accumulated(temporal)
            }
            _ => CellState::Selected(spatial),
        }
    }

    /// Fold a further pass into an existing cell state.
    pub fn add(&self, state: &mut CellState, spatial: SpatialBin) {
        match state {
            CellState::Accumulated(temporal) => {
                self.manager.aggregate_temporal_bin(&spatial, temporal);
            }
            CellState::Selected(current) => {
                if self.compare(&spatial, current) == Ordering::Greater {
                    *current = spatial;
                }
            }
        }
    }

    /// Combine two states of the same cell built by this compositor.
    pub fn merge(&self, into: &mut CellState, other: CellState) -> Result<()> {
        match (into, other) {
            (CellState::Accumulated(into), CellState::Accumulated(other)) => {
                self.manager.merge_temporal_bins(into, &other);
            }
            (CellState::Selected(current), CellState::Selected(candidate)) => {
                if self.compare(&candidate, current) == Ordering::Greater {
                    *current = candidate;
                }
            }
            (into, other) => {
                return Err(BinningError::invalid_state(format!(
                    "cannot merge {} cell state into {} cell state",
                    other.kind(),
                    into.kind()
                )));
            }
        }
        Ok(())
    }

    /// Final temporal bin of a cell.
    pub fn finish(&self, state: CellState) -> TemporalBin {
        let mut temporal = match state {
            CellState::Accumulated(temporal) => temporal,
            CellState::Selected(spatial) => {
                let mut temporal = self.manager.create_temporal_bin(spatial.index);
                self.manager.aggregate_temporal_bin(&spatial, &mut temporal);
                temporal
            }
        };
        self.manager.complete_temporal_bin(&mut temporal);
        temporal
    }

    fn compare(&self, a: &SpatialBin, b: &SpatialBin) -> Ordering {
        let primary = match self.policy {
            Policy::MaxFeature(i) => a.features[i].total_cmp(&b.features[i]),
            _ => a.latest_time.cmp(&b.latest_time),
        };
        primary
            .then_with(|| a.latest_time.cmp(&b.latest_time))
            .then_with(|| a.num_obs.cmp(&b.num_obs))
            .then_with(|| {
                a.features
                    .iter()
                    .zip(&b.features)
                    .map(|(x, y)| x.total_cmp(y))
                    .find(|o| *o != Ordering::Equal)
                    .unwrap_or(Ordering::Equal)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregators::{AggregatorConfig, AggregatorRegistry};
    use crate::observation::{Observation, VariableContext};
    use chrono::{TimeZone, Utc};

    fn manager() -> Arc<BinManager> {
        Arc::new(
            BinManager::from_config(
                &AggregatorRegistry::default(),
                VariableContext::new(["ndvi"]),
                &[
                    AggregatorConfig::new("MEAN_OBS", "ndvi"),
                    AggregatorConfig::new("MIN_MAX", "ndvi"),
                ],
                None,
                f64::NAN,
            )
            .unwrap(),
        )
    }

    fn pass(mgr: &BinManager, day: u32, values: &[f32]) -> SpatialBin {
        let mut bin = mgr.create_spatial_bin(5);
        let time = Utc.with_ymd_and_hms(2024, 5, day, 10, 0, 0).unwrap();
        for v in values {
            let obs = Observation::new(0.0, 0.0, vec![*v]).with_time(time);
            mgr.aggregate_spatial_bin(&obs, &mut bin);
        }
        mgr.complete_spatial_bin(&mut bin);
        bin
    }

    fn composite(compositor: &Compositor, passes: Vec<SpatialBin>) -> TemporalBin {
        let mut iter = passes.into_iter();
        let mut state = compositor.start(iter.next().unwrap());
        for p in iter {
            compositor.add(&mut state, p);
        }
        compositor.finish(state)
    }

    #[test]
    fn test_binning_accumulates_all_passes() {
        let mgr = manager();
        let c = Compositor::new(mgr.clone(), &CompositingType::Binning).unwrap();
        let bin = composite(&c, vec![pass(&mgr, 1, &[0.2]), pass(&mgr, 2, &[0.4, 0.6])]);
        assert_eq!(bin.num_obs, 3);
        assert_eq!(bin.num_passes, 2);
    }

    #[test]
    fn test_most_recent_keeps_latest_pass() {
        let mgr = manager();
        let c = Compositor::new(mgr.clone(), &CompositingType::MostRecent).unwrap();
        let late = pass(&mgr, 9, &[0.1]);
        let early = pass(&mgr, 3, &[0.9, 0.8]);
        for order in [vec![late.clone(), early.clone()], vec![early.clone(), late.clone()]] {
            let bin = composite(&c, order);
            assert_eq!(bin.num_passes, 1);
            assert_eq!(bin.num_obs, 1);
            let fv = mgr.feature_vector(&bin);
            assert!((fv.get("ndvi_mean").unwrap() - 0.1).abs() < 1e-6);
        }
    }

    #[test]
    fn test_max_feature_selects_greenest_pass() {
        let mgr = manager();
        let policy = CompositingType::MaxFeature {
            feature: "ndvi_max".to_string(),
        };
        let c = Compositor::new(mgr.clone(), &policy).unwrap();
        let bin = composite(
            &c,
            vec![pass(&mgr, 1, &[0.3]), pass(&mgr, 2, &[0.7, 0.2]), pass(&mgr, 3, &[0.5])],
        );
        let fv = mgr.feature_vector(&bin);
        assert!((fv.get("ndvi_max").unwrap() - 0.7).abs() < 1e-6);
        assert!((fv.get("ndvi_min").unwrap() - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_merged_states_match_sequential_adds() {
        let mgr = manager();
        let passes = || vec![pass(&mgr, 1, &[0.2, 0.9]), pass(&mgr, 4, &[0.4]), pass(&mgr, 2, &[0.6, 0.1])];
        for policy in [CompositingType::Binning, CompositingType::MostRecent] {
            let c = Compositor::new(mgr.clone(), &policy).unwrap();
            let sequential = composite(&c, passes());

            let mut states = passes().into_iter().map(|p| c.start(p));
            let mut merged = states.next().unwrap();
            for state in states {
                c.merge(&mut merged, state).unwrap();
            }
            let merged = c.finish(merged);

            assert_eq!(merged.num_obs, sequential.num_obs);
            assert_eq!(merged.num_passes, sequential.num_passes);
            let (a, _) = mgr.compute_output(&merged);
            let (b, _) = mgr.compute_output(&sequential);
            for (x, y) in a.iter().zip(&b) {
                assert!((x - y).abs() < 1e-9, "{:?}: {} vs {}", policy, x, y);
            }
        }
    }

    #[test]
    fn test_merge_rejects_mixed_states() {
        let mgr = manager();
        let binning = Compositor::new(mgr.clone(), &CompositingType::Binning).unwrap();
        let recent = Compositor::new(mgr.clone(), &CompositingType::MostRecent).unwrap();
        let mut state = binning.start(pass(&mgr, 1, &[0.2]));
        let err = binning
            .merge(&mut state, recent.start(pass(&mgr, 2, &[0.3])))
            .unwrap_err();
        assert!(matches!(err, BinningError::InvalidState(_)));
    }

    #[test]
    fn test_unknown_feature() {
        let policy = CompositingType::MaxFeature {
            feature: "evi_max".to_string(),
        };
        assert!(Compositor::new(manager(), &policy).is_err());
    }

    #[test]
    fn test_yaml() {
        let policy: CompositingType =
            serde_yaml::from_str("type: MAX_FEATURE\nfeature: ndvi_max\n").unwrap();
        assert_eq!(policy.as_str(), "MAX_FEATURE");
        let binning: CompositingType = serde_yaml::from_str("type: BINNING\n").unwrap();
        assert_eq!(binning, CompositingType::Binning);
    }
}
