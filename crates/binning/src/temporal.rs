//! Temporal binning: merging per-file spatial bins into one bin per cell.
//!
//! Two strategies share the same compositing rules:
//!
//! - [`TemporalBinStore`] is fed batches concurrently and keeps a locked
//!   map of cell states. Each batch is turned into cell states by its worker
//!   and merged into the map under the lock, so the result is independent
//!   of which worker finishes first.
//! - [`TemporalBinner::merge_sorted`] performs a single k-way merge over
//!   cell-sorted streams, e.g. spill files.

use std::cmp::Reverse;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BinaryHeap};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::bin_manager::BinManager;
use crate::bins::{SpatialBin, TemporalBin};
use crate::cancel::CancellationToken;
use crate::compositing::{CellState, Compositor};
use crate::error::{BinningError, Result};
use crate::spatial::SpatialBinBatch;

const CANCEL_CHECK_INTERVAL: usize = 4096;

/// Shared accumulator for the in-memory merge.
#[derive(Debug)]
pub struct TemporalBinStore {
    compositor: Compositor,
    cells: Mutex<BTreeMap<u64, CellState>>,
}

impl TemporalBinStore {
    pub fn new(compositor: Compositor) -> Self {
        Self {
            compositor,
            cells: Mutex::new(BTreeMap::new()),
        }
    }

    /// Fold the bins of one completed file.
    pub fn accept(&self, batch: SpatialBinBatch) -> Result<()> {
        self.compositor.manager().check_signature(&batch.signature)?;
        let states: Vec<CellState> = batch
            .bins
            .into_iter()
            .map(|bin| self.compositor.start(bin))
            .collect();

        let mut cells = self
            .cells
            .lock()
            .map_err(|_| BinningError::invalid_state("temporal bin store lock poisoned"))?;
        for state in states {
            match cells.entry(state.index()) {
                Entry::Vacant(entry) => {
                    entry.insert(state);
                }
                Entry::Occupied(mut entry) => self.compositor.merge(entry.get_mut(), state)?,
            }
        }
        Ok(())
    }

    /// Number of cells with data so far.
    pub fn num_cells(&self) -> usize {
        self.cells.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// Complete every cell.
    pub fn finish(self) -> Result<TemporalBinList> {
        let cells = self
            .cells
            .into_inner()
            .map_err(|_| BinningError::invalid_state("temporal bin store lock poisoned"))?;
        let bins: Vec<TemporalBin> = cells
            .into_values()
            .map(|state| self.compositor.finish(state))
            .collect();
        debug!(cells = bins.len(), "Temporal bins completed");
        Ok(TemporalBinList::from_sorted(
            self.compositor.manager().clone(),
            bins,
        ))
    }
}

/// Stream-based temporal merging.
pub struct TemporalBinner;

impl TemporalBinner {
    /// Merge streams of spatial bins, each sorted by strictly increasing
    /// cell index, into completed temporal bins.
    pub fn merge_sorted<I>(
        compositor: &Compositor,
        streams: Vec<I>,
        cancel: &CancellationToken,
    ) -> Result<TemporalBinList>
    where
        I: Iterator<Item = Result<SpatialBin>>,
    {
        let mut streams = streams;
        let mut heads: Vec<Option<SpatialBin>> = Vec::with_capacity(streams.len());
        let mut heap = BinaryHeap::new();

        for (i, stream) in streams.iter_mut().enumerate() {
            let head = stream.next().transpose()?;
            if let Some(bin) = &head {
                heap.push(Reverse((bin.index, i)));
            }
            heads.push(head);
        }

        let mut bins = Vec::new();
        let mut current: Option<CellState> = None;
        let mut processed = 0usize;

        while let Some(Reverse((index, i))) = heap.pop() {
            processed += 1;
            if processed % CANCEL_CHECK_INTERVAL == 0 {
                cancel.check()?;
            }

            let bin = match heads[i].take() {
                Some(bin) => bin,
                None => return Err(BinningError::invalid_state("merge head missing")),
            };
            if let Some(next) = streams[i].next().transpose()? {
                if next.index <= index {
                    return Err(BinningError::invalid_state(format!(
                        "stream {} is not sorted by cell index ({} after {})",
                        i, next.index, index
                    )));
                }
                heap.push(Reverse((next.index, i)));
                heads[i] = Some(next);
            }

            current = match current.take() {
                Some(mut state) if state.index() == index => {
                    compositor.add(&mut state, bin);
                    Some(state)
                }
                Some(state) => {
                    bins.push(compositor.finish(state));
                    Some(compositor.start(bin))
                }
                None => Some(compositor.start(bin)),
            };
        }
        if let Some(state) = current {
            bins.push(compositor.finish(state));
        }

        cancel.check()?;
        debug!(cells = bins.len(), passes = processed, "K-way merge completed");
        Ok(TemporalBinList::from_sorted(compositor.manager().clone(), bins))
    }
}

/// Completed temporal bins of a run, sorted by cell index.
#[derive(Debug, Clone)]
pub struct TemporalBinList {
    manager: Arc<BinManager>,
    bins: Vec<TemporalBin>,
}

impl TemporalBinList {
    /// Wrap bins in any order.
    pub fn new(manager: Arc<BinManager>, mut bins: Vec<TemporalBin>) -> Self {
        bins.sort_unstable_by_key(|b| b.index);
        Self { manager, bins }
    }

    fn from_sorted(manager: Arc<BinManager>, bins: Vec<TemporalBin>) -> Self {
        debug_assert!(bins.windows(2).all(|w| w[0].index < w[1].index));
        Self { manager, bins }
    }

    pub fn manager(&self) -> &Arc<BinManager> {
        &self.manager
    }

    /// Bin of `cell`, if it has data.
    pub fn find(&self, cell: u64) -> Option<&TemporalBin> {
        self.bins
            .binary_search_by_key(&cell, |b| b.index)
            .ok()
            .map(|i| &self.bins[i])
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TemporalBin> {
        self.bins.iter()
    }

    pub fn bins(&self) -> &[TemporalBin] {
        &self.bins
    }

    /// Sum of `num_obs` over all cells.
    pub fn total_obs(&self) -> u64 {
        self.bins.iter().map(|b| b.num_obs).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregators::{AggregatorConfig, AggregatorRegistry};
    use crate::compositing::CompositingType;
    use crate::observation::{Observation, VariableContext};
    use crate::spatial::SpatialStats;

    fn manager() -> Arc<BinManager> {
        Arc::new(
            BinManager::from_config(
                &AggregatorRegistry::default(),
                VariableContext::new(["v"]),
                &[AggregatorConfig::new("MEAN_OBS", "v")],
                None,
                f64::NAN,
            )
            .unwrap(),
        )
    }

    fn spatial(mgr: &BinManager, cell: u64, values: &[f32]) -> SpatialBin {
        let mut bin = mgr.create_spatial_bin(cell);
        for v in values {
            mgr.aggregate_spatial_bin(&Observation::new(0.0, 0.0, vec![*v]), &mut bin);
        }
        mgr.complete_spatial_bin(&mut bin);
        bin
    }

    fn batch(mgr: &BinManager, bins: Vec<SpatialBin>) -> SpatialBinBatch {
        SpatialBinBatch {
            bins,
            stats: SpatialStats::default(),
            signature: mgr.signature().to_string(),
            min_time: None,
            max_time: None,
        }
    }

    fn files(mgr: &BinManager) -> Vec<Vec<SpatialBin>> {
        vec![
            vec![spatial(mgr, 1, &[1.0]), spatial(mgr, 4, &[2.0, 4.0])],
            vec![spatial(mgr, 4, &[6.0]), spatial(mgr, 7, &[3.0])],
            vec![spatial(mgr, 1, &[5.0])],
        ]
    }

    #[test]
    fn test_store_and_kway_merge_agree() {
        let mgr = manager();
        let compositor = Compositor::new(mgr.clone(), &CompositingType::Binning).unwrap();

        let store = TemporalBinStore::new(compositor.clone());
        for file in files(&mgr).into_iter().rev() {
            store.accept(batch(&mgr, file)).unwrap();
        }
        assert_eq!(store.num_cells(), 3);
        let from_store = store.finish().unwrap();

        let streams: Vec<_> = files(&mgr)
            .into_iter()
            .map(|f| f.into_iter().map(Ok))
            .collect();
        let merged =
            TemporalBinner::merge_sorted(&compositor, streams, &CancellationToken::new()).unwrap();

        assert_eq!(from_store.bins(), merged.bins());
        assert_eq!(merged.len(), 3);
        assert_eq!(merged.total_obs(), 6);

        let cell4 = merged.find(4).unwrap();
        assert_eq!(cell4.num_obs, 3);
        assert_eq!(cell4.num_passes, 2);
        assert!((mgr.feature_vector(cell4).get("v_mean").unwrap() - 4.0).abs() < 1e-9);
        assert!(merged.find(5).is_none());
    }

    #[test]
    fn test_unsorted_stream_rejected() {
        let mgr = manager();
        let compositor = Compositor::new(mgr.clone(), &CompositingType::Binning).unwrap();
        let stream = vec![spatial(&mgr, 5, &[1.0]), spatial(&mgr, 2, &[1.0])]
            .into_iter()
            .map(Ok);
        let result =
            TemporalBinner::merge_sorted(&compositor, vec![stream], &CancellationToken::new());
        assert!(matches!(result, Err(BinningError::InvalidState(_))));
    }

    #[test]
    fn test_signature_checked() {
        let mgr = manager();
        let compositor = Compositor::new(mgr.clone(), &CompositingType::Binning).unwrap();
        let store = TemporalBinStore::new(compositor);
        let mut foreign = batch(&mgr, vec![spatial(&mgr, 1, &[1.0])]);
        foreign.signature = "MIN_MAX[v_min,v_max]".to_string();
        assert!(matches!(
            store.accept(foreign),
            Err(BinningError::ConfigurationMismatch { .. })
        ));
    }

    #[test]
    fn test_cancelled_merge() {
        let mgr = manager();
        let compositor = Compositor::new(mgr.clone(), &CompositingType::Binning).unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let stream = vec![spatial(&mgr, 1, &[1.0])].into_iter().map(Ok);
        let result = TemporalBinner::merge_sorted(&compositor, vec![stream], &token);
        assert!(matches!(result, Err(BinningError::Cancelled)));
    }
}
