//! Global product metadata.
//!
//! Metadata is a flat, ordered set of string properties written into the
//! product's root attributes.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{info, warn};

use crate::aggregators::AggregatorConfig;
use crate::config::{BinningConfig, TimeFilterMethod};

/// Mean earth radius in km used for the nominal pixel size.
const EARTH_RADIUS_KM: f64 = 6378.145;

/// Nominal pixel size in km of a grid with `num_rows` rows.
pub fn pixel_size_in_km(num_rows: usize) -> f64 {
    EARTH_RADIUS_KM * std::f64::consts::PI / (num_rows as f64 - 1.0)
}

/// Provenance and processing properties of a product.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductMetadata {
    properties: BTreeMap<String, String>,
}

impl ProductMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Properties describing how the product was configured.
    pub fn from_config(config: &BinningConfig, num_rows: usize) -> Self {
        let mut meta = Self::new();

        let product_name = config
            .output
            .output_file
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| config.product_name.clone());
        meta.set("product_name", product_name);
        meta.set(
            "processing_time",
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        );
        meta.set("software_name", env!("CARGO_PKG_NAME"));
        meta.set("software_version", env!("CARGO_PKG_VERSION"));

        if let Some(start) = &config.time_filter.start_date_time {
            meta.set("aggregation_period_start", start.clone());
        }
        if let Some(days) = config.time_filter.period_duration {
            meta.set("aggregation_period_duration", format!("{} day(s)", days));
        }
        if let Some(region) = &config.region {
            meta.set("region", region.to_wkt());
        }
        if config.time_filter.method != TimeFilterMethod::None {
            meta.set("time_filter_method", config.time_filter.method.as_str());
        }

        meta.set("num_rows", num_rows.to_string());
        meta.set("pixel_size_in_km", pixel_size_in_km(num_rows).to_string());
        meta.set("compositing", config.compositing.as_str());

        for (i, var) in config.variables.iter().enumerate() {
            meta.set(format!("variable_config.{}:name", i), var.name.clone());
            if let Some(no_data) = var.no_data_value {
                meta.set(format!("variable_config.{}:no_data_value", i), no_data.to_string());
            }
        }
        for (i, agg) in config.aggregators.iter().enumerate() {
            meta.add_aggregator(i, agg);
        }

        meta
    }

    fn add_aggregator(&mut self, index: usize, config: &AggregatorConfig) {
        let value = match serde_json::to_value(config) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => return,
        };
        for (name, value) in value {
            let text = match value {
                serde_json::Value::String(s) => s,
                serde_json::Value::Array(items) => items
                    .iter()
                    .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
                    .collect::<Vec<_>>()
                    .join(","),
                other => other.to_string(),
            };
            self.set(format!("aggregator_config.{}:{}", index, name), text);
        }
    }

    /// Record the aggregation period as `start_time` / `stop_time`.
    pub fn set_observation_period(
        &mut self,
        start: Option<DateTime<Utc>>,
        stop: Option<DateTime<Utc>>,
    ) {
        if let Some(start) = start {
            self.set("start_time", start.to_rfc3339_opts(SecondsFormat::Secs, true));
        }
        if let Some(stop) = stop {
            self.set("stop_time", stop.to_rfc3339_opts(SecondsFormat::Secs, true));
        }
    }

    pub fn set_source_products<'a>(&mut self, names: impl IntoIterator<Item = &'a str>) {
        let joined: Vec<&str> = names.into_iter().collect();
        self.set("source_products", joined.join(","));
    }

    /// Merge `key = value` properties from `path`.
    ///
    /// A missing or unreadable file is logged and ignored.
    pub fn load_properties_file(&mut self, path: &Path) {
        if !path.is_file() {
            warn!(path = %path.display(), "Metadata properties file not found");
            return;
        }
        info!(path = %path.display(), "Reading metadata properties file");
        match std::fs::read_to_string(path) {
            Ok(text) => {
                for (key, value) in parse_properties(&text) {
                    self.set(key, value);
                }
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to load metadata properties file");
            }
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    pub fn to_json(&self) -> serde_json::Map<String, serde_json::Value> {
        self.properties
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect()
    }
}

/// Parse `key = value` / `key: value` lines; `#` and `!` start comments.
fn parse_properties(text: &str) -> Vec<(String, String)> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('!'))
        .filter_map(|line| {
            let split = line.find(|c| c == '=' || c == ':')?;
            let key = line[..split].trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), line[split + 1..].trim().to_string()))
        })
        .collect()
}
