//! End-to-end binning run.
//!
//! ```text
//! files --(rayon, one SpatialBinner each)--> SpatialBinBatch
//!       --> TemporalBinStore (in memory) | SpillFile + k-way merge
//!       --> TemporalBinList --> Reprojector --> Formatter
//! ```

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Once};

use chrono::{DateTime, Utc};
use planetary_grid::{create_grid, PlanetaryGrid};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::aggregators::AggregatorRegistry;
use crate::bin_manager::BinManager;
use crate::cancel::CancellationToken;
use crate::compositing::Compositor;
use crate::config::{BinningConfig, MergeStrategy};
use crate::error::{BinningError, Result, Stage};
use crate::formatter::{Formatter, WrittenProduct};
use crate::input::ObservationSource;
use crate::metadata::ProductMetadata;
use crate::observation::VariableContext;
use crate::raster::RenderStats;
use crate::reprojector::Reprojector;
use crate::spatial::{ObservationFilter, SpatialBinBatch, SpatialBinner, SpatialStats};
use crate::spill::SpillFile;
use crate::temporal::{TemporalBinList, TemporalBinStore, TemporalBinner};

/// Observations processed between cancellation checks within one file.
const OBS_CANCEL_INTERVAL: usize = 65_536;

/// Size the global rayon pool once per process.
///
/// Later calls, and pools already built elsewhere, are left untouched.
pub fn init_thread_pool(num_threads: usize) {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        if num_threads == 0 {
            return;
        }
        match rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("binning-{}", i))
            .build_global()
        {
            Ok(()) => info!(threads = num_threads, "Initialized worker pool"),
            Err(e) => warn!(error = %e, "Worker pool already initialized"),
        }
    });
}

/// A source file skipped because it could not be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFault {
    pub path: PathBuf,
    pub message: String,
}

/// Recoverable problems and counters of a run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub files_total: usize,
    pub files_binned: usize,
    pub file_faults: Vec<FileFault>,
    pub stats: SpatialStats,
    /// Cells with at least one observation.
    pub num_bins: usize,
    pub render_stats: Option<RenderStats>,
    pub start_time: Option<DateTime<Utc>>,
    pub stop_time: Option<DateTime<Utc>>,
}

impl RunSummary {
    fn record_batch(&mut self, report: &FileReport) {
        match report {
            FileReport::Binned {
                stats,
                min_time,
                max_time,
                ..
            } => {
                self.files_binned += 1;
                self.stats.merge(stats);
                if let Some(t) = min_time {
                    self.start_time = Some(self.start_time.map_or(*t, |s| s.min(*t)));
                }
                if let Some(t) = max_time {
                    self.stop_time = Some(self.stop_time.map_or(*t, |s| s.max(*t)));
                }
            }
            FileReport::Skipped(fault) => self.file_faults.push(fault.clone()),
        }
    }
}

/// Everything a run produced.
#[derive(Debug)]
pub struct RunOutcome {
    pub summary: RunSummary,
    /// Written artifacts; `None` when no bins were generated.
    pub product: Option<WrittenProduct>,
    pub bins: TemporalBinList,
}

enum FileReport {
    Binned {
        path: PathBuf,
        stats: SpatialStats,
        min_time: Option<DateTime<Utc>>,
        max_time: Option<DateTime<Utc>>,
    },
    Skipped(FileFault),
}

/// Destination of completed spatial batches.
enum BatchSink<'a> {
    Memory(TemporalBinStore),
    Spill {
        dir: Option<&'a Path>,
        files: Mutex<Vec<SpillFile>>,
    },
}

impl BatchSink<'_> {
    fn accept(&self, batch: SpatialBinBatch) -> Result<()> {
        match self {
            Self::Memory(store) => store.accept(batch),
            Self::Spill { dir, files } => {
                let spill = SpillFile::write(*dir, &batch)?;
                files
                    .lock()
                    .map_err(|_| BinningError::invalid_state("spill file list lock poisoned"))?
                    .push(spill);
                Ok(())
            }
        }
    }
}

/// A configured binning run over one observation source.
pub struct BinningPipeline {
    config: BinningConfig,
    grid: Arc<dyn PlanetaryGrid>,
    manager: Arc<BinManager>,
    compositor: Compositor,
    formatter: Formatter,
    filter: Arc<ObservationFilter>,
    source: Arc<dyn ObservationSource>,
    cancel: CancellationToken,
}

impl BinningPipeline {
    /// Validate `config` and resolve grid, aggregators and formatter.
    ///
    /// Every configuration problem surfaces here, before any input is read.
    pub fn new(config: BinningConfig, source: Arc<dyn ObservationSource>) -> Result<Self> {
        config.validate().map_err(BinningError::Configuration)?;

        let grid = create_grid(&config.grid)?;
        let variables = VariableContext::from_config(&config.variables)?;
        let manager = Arc::new(BinManager::from_config(
            &AggregatorRegistry::default(),
            variables,
            &config.aggregators,
            config.post_processor.as_ref(),
            config.fill_value,
        )?);
        let compositor = Compositor::new(manager.clone(), &config.compositing)?;
        let formatter = Formatter::new(config.output.clone())?;
        formatter.validate_bands(manager.result_feature_names())?;

        let filter = Arc::new(ObservationFilter {
            region: config.region.clone(),
            time_range: config.filter_range()?,
        });

        init_thread_pool(config.num_threads);

        info!(
            grid = %grid.kind(),
            num_rows = grid.num_rows(),
            aggregators = config.aggregators.len(),
            features = %manager.result_feature_names().join(","),
            "Binning pipeline configured"
        );

        Ok(Self {
            config,
            grid,
            manager,
            compositor,
            formatter,
            filter,
            source,
            cancel: CancellationToken::new(),
        })
    }

    /// Use `token` to cancel the run from elsewhere.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn config(&self) -> &BinningConfig {
        &self.config
    }

    pub fn grid(&self) -> &Arc<dyn PlanetaryGrid> {
        &self.grid
    }

    pub fn manager(&self) -> &Arc<BinManager> {
        &self.manager
    }

    /// Bin one source file.
    pub fn bin_file(&self, path: &Path) -> Result<SpatialBinBatch> {
        let mut stream = self.source.open(path)?;
        let mut binner =
            SpatialBinner::new(self.grid.clone(), self.manager.clone(), self.filter.clone());
        if let Some(channels) = stream.channel_names() {
            binner
                .set_channel_names(channels)
                .map_err(|e| BinningError::input_fault(path, e.to_string()))?;
        }

        for (n, obs) in stream.by_ref().enumerate() {
            if n % OBS_CANCEL_INTERVAL == 0 {
                self.cancel.check()?;
            }
            binner.process_observation(obs?);
        }

        let batch = binner.complete();
        debug!(
            file = %path.display(),
            accepted = batch.stats.accepted,
            rejected = batch.stats.rejected(),
            cells = batch.bins.len(),
            "File binned"
        );
        Ok(batch)
    }

    fn bin_into(&self, path: &Path, sink: &BatchSink<'_>) -> Result<FileReport> {
        self.cancel.check()?;
        match self.bin_file(path) {
            Ok(batch) => {
                let report = FileReport::Binned {
                    path: path.to_path_buf(),
                    stats: batch.stats,
                    min_time: batch.min_time,
                    max_time: batch.max_time,
                };
                sink.accept(batch)
                    .map_err(|e| e.at_stage(Stage::Merging, format!("file {}", path.display())))?;
                Ok(report)
            }
            Err(e) if e.is_input_fault() && !self.config.strict => {
                warn!(file = %path.display(), error = %e, "Skipping unreadable file");
                Ok(FileReport::Skipped(FileFault {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                }))
            }
            Err(e) => Err(e.at_stage(Stage::Binning, format!("file {}", path.display()))),
        }
    }

    /// Spatially bin all `paths` and merge them into temporal bins.
    fn bin_and_merge(&self, paths: &[PathBuf]) -> Result<(Vec<FileReport>, TemporalBinList)> {
        let sink = match self.config.merge_strategy {
            MergeStrategy::InMemory => BatchSink::Memory(TemporalBinStore::new(self.compositor.clone())),
            MergeStrategy::Spill => BatchSink::Spill {
                dir: self.config.spill_dir.as_deref(),
                files: Mutex::new(Vec::new()),
            },
        };

        let reports = paths
            .par_iter()
            .map(|path| self.bin_into(path, &sink))
            .collect::<Result<Vec<_>>>()?;
        self.cancel.check()?;

        let bins = match sink {
            BatchSink::Memory(store) => store.finish(),
            BatchSink::Spill { files, .. } => {
                let files = files
                    .into_inner()
                    .map_err(|_| BinningError::invalid_state("spill file list lock poisoned"))?;
                debug!(files = files.len(), "Merging spill files");
                let readers = files
                    .iter()
                    .map(|f| f.open(self.manager.signature(), self.config.read_ahead_bytes))
                    .collect::<Result<Vec<_>>>()?;
                TemporalBinner::merge_sorted(&self.compositor, readers, &self.cancel)
            }
        }
        .map_err(|e| e.at_stage(Stage::Merging, "temporal bins"))?;

        Ok((reports, bins))
    }

    /// Bin, merge, render and write.
    ///
    /// When no observation was binned the product is not written and the
    /// outcome carries an empty bin list.
    pub fn run(&self, paths: &[PathBuf]) -> Result<RunOutcome> {
        info!(files = paths.len(), strategy = self.config.merge_strategy.as_str(), "Starting binning run");

        let (reports, bins) = self.bin_and_merge(paths)?;

        let mut summary = RunSummary {
            files_total: paths.len(),
            num_bins: bins.len(),
            ..Default::default()
        };
        for report in &reports {
            summary.record_batch(report);
        }
        info!(
            files_binned = summary.files_binned,
            files_skipped = summary.file_faults.len(),
            accepted = summary.stats.accepted,
            rejected = summary.stats.rejected(),
            cells = summary.num_bins,
            "Temporal binning completed"
        );

        if bins.is_empty() {
            warn!("No bins generated, product not written");
            return Ok(RunOutcome {
                summary,
                product: None,
                bins,
            });
        }

        let source_names: Vec<String> = reports
            .iter()
            .filter_map(|r| match r {
                FileReport::Binned { path, .. } => Some(
                    path.file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_else(|| path.display().to_string()),
                ),
                FileReport::Skipped(_) => None,
            })
            .collect();
        let metadata = self.product_metadata(&summary, &source_names);

        let mut reprojector = Reprojector::new(
            self.grid.clone(),
            self.config.region.clone(),
            self.config.tile_height,
            self.config.strict_numeric,
            self.cancel.clone(),
        );
        let mut product = reprojector.run(&bins, &self.formatter, &metadata)?;
        summary.render_stats = reprojector.raster().map(|r| r.stats);

        if let Some(table) = self
            .formatter
            .write_bin_table(self.grid.as_ref(), &bins)
            .map_err(|e| e.at_stage(Stage::Writing, "bin table"))?
        {
            product.paths.push(table);
        }

        info!(
            outputs = product.paths.len(),
            cells = bins.len(),
            "Binning run completed"
        );
        Ok(RunOutcome {
            summary,
            product: Some(product),
            bins,
        })
    }

    fn product_metadata(&self, summary: &RunSummary, sources: &[String]) -> ProductMetadata {
        let mut metadata = ProductMetadata::from_config(&self.config, self.grid.num_rows());
        // A configured period wins over the observed span.
        let (start, stop) = match &self.filter.time_range {
            Some(range) => (Some(range.start), Some(range.end)),
            None => (summary.start_time, summary.stop_time),
        };
        metadata.set_observation_period(start, stop);
        metadata.set_source_products(sources.iter().map(String::as_str));
        if let Some(path) = &self.config.metadata_properties_file {
            metadata.load_properties_file(path);
        }
        metadata
    }
}
