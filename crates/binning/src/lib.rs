//! Spatio-temporal binning of earth-observation pixels.
//!
//! Observations from many source files are aggregated into the cells of a
//! [`planetary_grid::PlanetaryGrid`], merged across files into one temporal
//! bin per cell and rendered back onto a raster product.
//!
//! # Architecture
//!
//! ```text
//! source files
//!      │  (rayon, one SpatialBinner per file)
//!      ▼
//! SpatialBinBatch ── sorted spatial bins + stats
//!      │
//!      ├─► TemporalBinStore        in memory, one lock
//!      │
//!      └─► SpillFile + k-way merge  bounded memory
//!               │
//!               ▼
//!      TemporalBinList ── sorted, read-only
//!               │
//!               ▼
//!      Reprojector ── tiled rendering (rayon)
//!               │
//!               ▼
//!      Formatter ── Zarr product | PNG image | cell table
//! ```
//!
//! Aggregators are resolved by name through the [`AggregatorRegistry`] and
//! composed by the [`BinManager`], which owns the flat feature layout of
//! every bin record.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use binning::{BinningConfig, BinningPipeline, JsonLinesSource};
//!
//! let config = BinningConfig::from_yaml_file("binning.yaml".as_ref())?;
//! let pipeline = BinningPipeline::new(config, Arc::new(JsonLinesSource))?;
//! let outcome = pipeline.run(&paths)?;
//! println!("{} cells", outcome.summary.num_bins);
//! ```

pub mod aggregators;
pub mod bin_manager;
pub mod bins;
pub mod cancel;
pub mod compositing;
pub mod config;
pub mod error;
pub mod formatter;
pub mod input;
pub mod metadata;
pub mod observation;
pub mod pipeline;
pub mod raster;
pub mod reprojector;
pub mod spatial;
pub mod spill;
pub mod temporal;

// Re-export commonly used types at crate root
pub use aggregators::{Aggregator, AggregatorConfig, AggregatorRegistry, OutputStatus};
pub use bin_manager::{BinManager, PostProcessorConfig};
pub use bins::{FeatureVector, SpatialBin, TemporalBin};
pub use cancel::CancellationToken;
pub use compositing::{CompositingType, Compositor};
pub use config::{
    BinningConfig, MergeStrategy, TimeFilterConfig, TimeFilterMethod, TimeRange, VariableConfig,
};
pub use error::{BinningError, Result, Stage};
pub use formatter::{
    BandConfiguration, Formatter, FormatterConfig, OutputFormat, OutputType, WrittenProduct,
};
pub use input::{JsonLinesSource, MemorySource, ObservationSource, ObservationStream};
pub use metadata::ProductMetadata;
pub use observation::{Observation, VariableContext};
pub use pipeline::{BinningPipeline, FileFault, RunOutcome, RunSummary};
pub use raster::{compute_raster_sub_region, RasterPyramid, RasterRegion, RenderedRaster};
pub use reprojector::{Reprojector, ReprojectorState};
pub use spatial::{ObservationFilter, SpatialBinBatch, SpatialBinner, SpatialStats};
pub use temporal::{TemporalBinList, TemporalBinStore, TemporalBinner};
