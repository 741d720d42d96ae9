//! Configuration for binning runs.
//!
//! Configuration is read from YAML and can be overridden from the
//! environment, mirroring how the services are deployed.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use planetary_grid::{GridKind, GridSpec, Region};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::aggregators::AggregatorConfig;
use crate::bin_manager::PostProcessorConfig;
use crate::compositing::CompositingType;
use crate::error::{BinningError, Result};
use crate::formatter::FormatterConfig;

// ============================================================================
// Variables
// ============================================================================

/// An input channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableConfig {
    pub name: String,
    /// Value that marks a missing measurement in this channel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_data_value: Option<f32>,
}

impl VariableConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            no_data_value: None,
        }
    }

    pub fn with_no_data(mut self, value: f32) -> Self {
        self.no_data_value = Some(value);
        self
    }
}

// ============================================================================
// Time filtering
// ============================================================================

/// How observations are filtered by acquisition time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeFilterMethod {
    /// Bin everything.
    #[default]
    None,
    /// Only bin observations within `[start, start + period)`.
    TimeRange,
}

impl TimeFilterMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::TimeRange => "TIME_RANGE",
        }
    }
}

impl std::fmt::Display for TimeFilterMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Time filter and aggregation period.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TimeFilterConfig {
    #[serde(default)]
    pub method: TimeFilterMethod,
    /// Period start: `yyyy-MM-dd`, `yyyy-MM-dd HH:mm:ss` or RFC 3339.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date_time: Option<String>,
    /// Period length in days.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_duration: Option<f64>,
}

impl TimeFilterConfig {
    /// The configured period, if both start and duration are set.
    pub fn time_range(&self) -> std::result::Result<Option<TimeRange>, String> {
        match (&self.start_date_time, self.period_duration) {
            (Some(start), Some(days)) => {
                let start = parse_date_time(start)?;
                TimeRange::from_period(start, days).map(Some)
            }
            (None, None) => Ok(None),
            _ => Err("start_date_time and period_duration must be given together".to_string()),
        }
    }
}

/// Half-open time interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Range of `days` days starting at `start`.
    pub fn from_period(start: DateTime<Utc>, days: f64) -> std::result::Result<Self, String> {
        if !days.is_finite() || days <= 0.0 {
            return Err(format!("period_duration must be positive, got {}", days));
        }
        let millis = (days * 86_400_000.0).round() as i64;
        Ok(Self::new(start, start + Duration::milliseconds(millis)))
    }

    pub fn contains(&self, time: DateTime<Utc>) -> bool {
        time >= self.start && time < self.end
    }

    /// Length in days.
    pub fn duration_days(&self) -> f64 {
        (self.end - self.start).num_milliseconds() as f64 / 86_400_000.0
    }
}

/// Parse `yyyy-MM-dd`, `yyyy-MM-dd HH:mm:ss` or an RFC 3339 timestamp as UTC.
pub fn parse_date_time(s: &str) -> std::result::Result<DateTime<Utc>, String> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Ok(dt.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(dt) = date.and_hms_opt(0, 0, 0) {
            return Ok(dt.and_utc());
        }
    }
    Err(format!(
        "invalid date/time '{}': expected yyyy-MM-dd, yyyy-MM-dd HH:mm:ss or RFC 3339",
        s
    ))
}

// ============================================================================
// Merging
// ============================================================================

/// How per-file bins reach the temporal store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Workers merge completed files straight into a shared store.
    #[default]
    InMemory,
    /// Workers spill sorted bins to temporary files, merged afterwards in one k-way pass.
    Spill,
}

impl std::str::FromStr for MergeStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "in_memory" | "memory" => Ok(Self::InMemory),
            "spill" => Ok(Self::Spill),
            other => Err(format!("unknown merge strategy '{}'", other)),
        }
    }
}

impl MergeStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InMemory => "in_memory",
            Self::Spill => "spill",
        }
    }
}

// ============================================================================
// Run configuration
// ============================================================================

fn default_fill_value() -> f64 {
    f64::NAN
}

fn default_product_name() -> String {
    "level-3".to_string()
}

fn default_tile_height() -> usize {
    64
}

fn default_read_ahead_bytes() -> usize {
    256 * 1024
}

/// Complete configuration of a binning run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinningConfig {
    /// Planetary grid.
    #[serde(default)]
    pub grid: GridSpec,

    /// Input channels in the order aggregators see them.
    pub variables: Vec<VariableConfig>,

    /// Aggregators in output order.
    pub aggregators: Vec<AggregatorConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_processor: Option<PostProcessorConfig>,

    #[serde(default)]
    pub compositing: CompositingType,

    /// Region of interest as WKT.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<Region>,

    #[serde(default)]
    pub time_filter: TimeFilterConfig,

    /// Written for cells and features without data.
    #[serde(default = "default_fill_value")]
    pub fill_value: f64,

    pub output: FormatterConfig,

    #[serde(default = "default_product_name")]
    pub product_name: String,

    /// Abort on the first unreadable input file instead of skipping it.
    #[serde(default)]
    pub strict: bool,

    /// Fail when a variance had to be clamped.
    #[serde(default)]
    pub strict_numeric: bool,

    #[serde(default)]
    pub merge_strategy: MergeStrategy,

    /// Directory for spill files; system temp dir when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spill_dir: Option<PathBuf>,

    /// Read-ahead buffer per spill stream.
    #[serde(default = "default_read_ahead_bytes")]
    pub read_ahead_bytes: usize,

    /// Worker threads; 0 uses one per core.
    #[serde(default)]
    pub num_threads: usize,

    /// Raster rows per render tile.
    #[serde(default = "default_tile_height")]
    pub tile_height: usize,

    /// `key = value` file merged into the product metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_properties_file: Option<PathBuf>,
}

impl Default for BinningConfig {
    fn default() -> Self {
        Self {
            grid: GridSpec::default(),
            variables: Vec::new(),
            aggregators: Vec::new(),
            post_processor: None,
            compositing: CompositingType::default(),
            region: None,
            time_filter: TimeFilterConfig::default(),
            fill_value: default_fill_value(),
            output: FormatterConfig::default(),
            product_name: default_product_name(),
            strict: false,
            strict_numeric: false,
            merge_strategy: MergeStrategy::default(),
            spill_dir: None,
            read_ahead_bytes: default_read_ahead_bytes(),
            num_threads: 0,
            tile_height: default_tile_height(),
            metadata_properties_file: None,
        }
    }
}

impl BinningConfig {
    /// Parse a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| BinningError::configuration(format!("invalid configuration: {}", e)))
    }

    /// Read a YAML file.
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            BinningError::configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&text)
    }

    /// Apply overrides from environment variables.
    ///
    /// Recognized: `BINNING_GRID`, `BINNING_NUM_ROWS`, `BINNING_OUTPUT_FILE`,
    /// `BINNING_STRICT`, `BINNING_THREADS`, `BINNING_MERGE_STRATEGY`.
    pub fn apply_env(&mut self) {
        if let Ok(val) = std::env::var("BINNING_GRID") {
            if let Ok(kind) = GridKind::from_name(&val) {
                self.grid.kind = kind;
            }
        }
        if let Ok(val) = std::env::var("BINNING_NUM_ROWS") {
            if let Ok(rows) = val.parse() {
                self.grid.num_rows = Some(rows);
            }
        }
        if let Ok(val) = std::env::var("BINNING_OUTPUT_FILE") {
            self.output.output_file = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("BINNING_STRICT") {
            self.strict = val.to_lowercase() == "true" || val == "1";
        }
        if let Ok(val) = std::env::var("BINNING_THREADS") {
            if let Ok(n) = val.parse() {
                self.num_threads = n;
            }
        }
        if let Ok(val) = std::env::var("BINNING_MERGE_STRATEGY") {
            match val.parse() {
                Ok(strategy) => self.merge_strategy = strategy,
                Err(e) => warn!(error = %e, "Ignoring BINNING_MERGE_STRATEGY"),
            }
        }
    }

    /// Check the parts of the configuration that do not need the registry.
    pub fn validate(&self) -> std::result::Result<(), String> {
        self.grid.resolved_num_rows().map_err(|e| e.to_string())?;

        if self.variables.is_empty() {
            return Err("at least one variable must be configured".to_string());
        }
        if self.aggregators.is_empty() {
            return Err("at least one aggregator must be configured".to_string());
        }
        if self.tile_height == 0 {
            return Err("tile_height must be > 0".to_string());
        }
        if self.read_ahead_bytes == 0 {
            return Err("read_ahead_bytes must be > 0".to_string());
        }
        if self.fill_value.is_infinite() {
            return Err("fill_value must be finite or NaN".to_string());
        }

        match self.time_filter.method {
            TimeFilterMethod::None => {
                self.time_filter.time_range()?;
            }
            TimeFilterMethod::TimeRange => {
                if self.time_filter.time_range()?.is_none() {
                    return Err(
                        "TIME_RANGE filtering needs start_date_time and period_duration".to_string(),
                    );
                }
            }
        }

        self.output.validate()
    }

    /// Time range used to filter observations.
    pub fn filter_range(&self) -> Result<Option<TimeRange>> {
        match self.time_filter.method {
            TimeFilterMethod::None => Ok(None),
            TimeFilterMethod::TimeRange => self
                .time_filter
                .time_range()
                .map_err(BinningError::Configuration),
        }
    }
}
