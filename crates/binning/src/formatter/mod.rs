//! Output formatting of rendered rasters.
//!
//! | type      | format | result                                            |
//! |-----------|--------|---------------------------------------------------|
//! | `Product` | `Zarr` | Zarr V3 store, one float32 array per band         |
//! | `Image`   | `PNG`  | grey PNG of one band                              |
//! | `Rgb`     | `PNG`  | RGB PNG of three bands                            |
//!
//! Every other combination is rejected by [`FormatterConfig::validate`]
//! before anything is rendered.

mod bin_table;
mod image;
mod zarr;

use std::fmt;
use std::path::{Path, PathBuf};

use planetary_grid::PlanetaryGrid;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{BinningError, Result};
use crate::metadata::ProductMetadata;
use crate::raster::{RenderedRaster, MAX_OVERVIEW_LEVELS};
use crate::temporal::TemporalBinList;

pub use bin_table::write_bin_table;

/// Kind of output artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputType {
    /// Geocoded multi-band product.
    #[default]
    #[serde(alias = "PRODUCT")]
    Product,
    /// Single band rendered as a grey image.
    #[serde(alias = "IMAGE")]
    Image,
    /// Three bands rendered as an RGB image.
    #[serde(alias = "RGB")]
    Rgb,
}

/// Encoding of the output artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputFormat {
    #[default]
    #[serde(alias = "ZARR", alias = "zarr")]
    Zarr,
    #[serde(alias = "PNG", alias = "png")]
    Png,
    /// Native integerized sinusoidal grid table; not supported.
    #[serde(alias = "ISIN", alias = "isin")]
    Isin,
}

impl fmt::Display for OutputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Product => "Product",
            Self::Image => "Image",
            Self::Rgb => "RGB",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Zarr => "Zarr",
            Self::Png => "PNG",
            Self::Isin => "ISIN",
        };
        write!(f, "{}", s)
    }
}

/// Band selection and value range for image outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandConfiguration {
    pub name: String,
    /// Value mapped to black; data minimum when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f32>,
    /// Value mapped to white; data maximum when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f32>,
}

impl BandConfiguration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            min: None,
            max: None,
        }
    }

    pub fn with_range(mut self, min: f32, max: f32) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }
}

fn default_output_file() -> PathBuf {
    PathBuf::from("level3.zarr")
}

fn default_chunk_size() -> usize {
    256
}

/// Output settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormatterConfig {
    #[serde(default)]
    pub output_type: OutputType,

    #[serde(default)]
    pub output_format: OutputFormat,

    #[serde(default = "default_output_file")]
    pub output_file: PathBuf,

    /// Bands to write. Products write every band when empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub band_configurations: Vec<BandConfiguration>,

    /// Number of 2x overview levels written with a product.
    #[serde(default)]
    pub overview_levels: usize,

    /// Also write the cell table `<stem>-bins.csv` next to the output.
    #[serde(default)]
    pub output_binned_data: bool,

    /// Zarr chunk edge length.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl Default for FormatterConfig {
    fn default() -> Self {
        Self {
            output_type: OutputType::default(),
            output_format: OutputFormat::default(),
            output_file: default_output_file(),
            band_configurations: Vec::new(),
            overview_levels: 0,
            output_binned_data: false,
            chunk_size: default_chunk_size(),
        }
    }
}

impl FormatterConfig {
    /// Reject unsupported type/format combinations and malformed settings.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.output_format == OutputFormat::Isin {
            return Err("native-grid tabular output is not supported".to_string());
        }
        match (self.output_type, self.output_format) {
            (OutputType::Product, OutputFormat::Zarr) => {}
            (OutputType::Image, OutputFormat::Png) => {
                if self.band_configurations.len() != 1 {
                    return Err(format!(
                        "Image output needs exactly one band configuration, got {}",
                        self.band_configurations.len()
                    ));
                }
            }
            (OutputType::Rgb, OutputFormat::Png) => {
                if self.band_configurations.len() != 3 {
                    return Err(format!(
                        "RGB output needs exactly three band configurations, got {}",
                        self.band_configurations.len()
                    ));
                }
            }
            (t, f) => {
                return Err(format!("output type {} cannot be written as {}", t, f));
            }
        }

        if self.output_file.as_os_str().is_empty() {
            return Err("output_file must not be empty".to_string());
        }
        if self.chunk_size == 0 {
            return Err("chunk_size must be > 0".to_string());
        }
        if self.overview_levels > MAX_OVERVIEW_LEVELS {
            return Err(format!(
                "overview_levels must be <= {}",
                MAX_OVERVIEW_LEVELS
            ));
        }
        for band in &self.band_configurations {
            if let (Some(min), Some(max)) = (band.min, band.max) {
                if min >= max {
                    return Err(format!(
                        "band '{}': min ({}) must be below max ({})",
                        band.name, min, max
                    ));
                }
            }
        }
        Ok(())
    }

    /// Path of the binned-data table.
    pub fn bin_table_path(&self) -> PathBuf {
        let stem = self
            .output_file
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "level3".to_string());
        let parent = self.output_file.parent().unwrap_or_else(|| Path::new(""));
        parent.join(format!("{}-bins.csv", stem))
    }
}

/// Paths of everything a write produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WrittenProduct {
    pub paths: Vec<PathBuf>,
}

/// Zarr V3 node names are a single path segment.
fn zarr_node_name_problem(name: &str) -> Option<&'static str> {
    if name.is_empty() {
        Some("name is empty")
    } else if name.contains('/') {
        Some("'/' would nest the array")
    } else if name.chars().all(|c| c == '.') {
        Some("name is only periods")
    } else if name.starts_with("__") {
        Some("names starting with '__' are reserved")
    } else {
        None
    }
}

/// Writes rendered rasters according to a validated [`FormatterConfig`].
#[derive(Debug, Clone)]
pub struct Formatter {
    config: FormatterConfig,
}

impl Formatter {
    pub fn new(config: FormatterConfig) -> Result<Self> {
        config.validate().map_err(BinningError::Configuration)?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &FormatterConfig {
        &self.config
    }

    /// Check that every configured band is among `available`, and that a
    /// Zarr product can name one array per feature.
    pub fn validate_bands(&self, available: &[String]) -> Result<()> {
        if self.config.output_type == OutputType::Product {
            for name in available {
                if let Some(problem) = zarr_node_name_problem(name) {
                    return Err(BinningError::configuration(format!(
                        "feature '{}' cannot name a Zarr array: {}",
                        name, problem
                    )));
                }
            }
        }
        for band in &self.config.band_configurations {
            if !available.iter().any(|name| name == &band.name) {
                return Err(BinningError::configuration(format!(
                    "band '{}' is not an output feature (available: {})",
                    band.name,
                    available.join(", ")
                )));
            }
        }
        Ok(())
    }

    /// Write `raster` with `metadata` to the configured output file.
    pub fn write(&self, raster: &RenderedRaster, metadata: &ProductMetadata) -> Result<WrittenProduct> {
        self.validate_bands(&raster.band_names)?;
        let path = &self.config.output_file;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| BinningError::output_fault(parent, e.to_string()))?;
        }

        match self.config.output_type {
            OutputType::Product => zarr::write_product(path, raster, metadata, &self.config)?,
            OutputType::Image | OutputType::Rgb => {
                image::write_png(path, raster, &self.config.band_configurations)?
            }
        }

        info!(
            path = %path.display(),
            output_type = %self.config.output_type,
            width = raster.width(),
            height = raster.height(),
            "Product written"
        );
        Ok(WrittenProduct {
            paths: vec![path.clone()],
        })
    }

    /// Write the cell table if enabled; returns its path.
    pub fn write_bin_table(
        &self,
        grid: &dyn PlanetaryGrid,
        bins: &TemporalBinList,
    ) -> Result<Option<PathBuf>> {
        if !self.config.output_binned_data {
            return Ok(None);
        }
        let path = self.config.bin_table_path();
        write_bin_table(&path, grid, bins)?;
        Ok(Some(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(t: OutputType, f: OutputFormat, bands: &[&str]) -> FormatterConfig {
        FormatterConfig {
            output_type: t,
            output_format: f,
            output_file: PathBuf::from("/tmp/out"),
            band_configurations: bands.iter().map(|b| BandConfiguration::new(*b)).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_supported_combinations() {
        assert!(config(OutputType::Product, OutputFormat::Zarr, &[]).validate().is_ok());
        assert!(config(OutputType::Image, OutputFormat::Png, &["a"]).validate().is_ok());
        assert!(config(OutputType::Rgb, OutputFormat::Png, &["r", "g", "b"])
            .validate()
            .is_ok());
    }

    #[test]
    fn test_unsupported_combinations() {
        assert!(config(OutputType::Product, OutputFormat::Png, &[]).validate().is_err());
        assert!(config(OutputType::Image, OutputFormat::Zarr, &["a"]).validate().is_err());
        assert!(config(OutputType::Image, OutputFormat::Png, &["a", "b"])
            .validate()
            .is_err());
        assert!(config(OutputType::Rgb, OutputFormat::Png, &["r"]).validate().is_err());
    }

    #[test]
    fn test_product_feature_names_are_single_segments() {
        let formatter = Formatter::new(config(OutputType::Product, OutputFormat::Zarr, &[])).unwrap();
        assert!(formatter.validate_bands(&["chl_mean".to_string()]).is_ok());
        for bad in ["chl/a_mean", "..", "__sum", ""] {
            let err = formatter.validate_bands(&[bad.to_string()]).unwrap_err();
            assert!(matches!(err, BinningError::Configuration(_)), "{}", bad);
        }

        let image = Formatter::new(config(OutputType::Image, OutputFormat::Png, &["a"])).unwrap();
        assert!(image
            .validate_bands(&["a".to_string(), "chl/a_mean".to_string()])
            .is_ok());
    }

    #[test]
    fn test_isin_rejected() {
        let err = Formatter::new(config(OutputType::Product, OutputFormat::Isin, &[]))
            .err()
            .unwrap();
        assert!(matches!(err, BinningError::Configuration(_)));
        assert!(err.to_string().contains("native-grid tabular output is not supported"));
    }

    #[test]
    fn test_band_range_checked() {
        let mut c = config(OutputType::Image, OutputFormat::Png, &[]);
        c.band_configurations = vec![BandConfiguration::new("a").with_range(1.0, 1.0)];
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_validate_bands() {
        let f = Formatter::new(config(OutputType::Image, OutputFormat::Png, &["chl_mean"])).unwrap();
        assert!(f.validate_bands(&["chl_mean".to_string()]).is_ok());
        assert!(f.validate_bands(&["chl_sigma".to_string()]).is_err());
    }

    #[test]
    fn test_yaml_aliases() {
        let c: FormatterConfig = serde_yaml::from_str(
            "output_type: RGB\noutput_format: PNG\noutput_file: out/rgb.png\nband_configurations:\n  - {name: r}\n  - {name: g}\n  - {name: b, min: 0.0, max: 1.0}\n",
        )
        .unwrap();
        assert_eq!(c.output_type, OutputType::Rgb);
        assert_eq!(c.output_format, OutputFormat::Png);
        assert_eq!(c.band_configurations[2].max, Some(1.0));
        assert_eq!(c.bin_table_path(), PathBuf::from("out/rgb-bins.csv"));
    }
}
