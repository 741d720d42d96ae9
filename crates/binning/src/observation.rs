//! Observations and the variable layout they are interpreted against.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::VariableConfig;
use crate::error::{BinningError, Result};

/// One geolocated measurement vector.
///
/// Measurement values follow the order of the channel names reported by the
/// stream that produced the observation. NaN marks a missing value.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub lat: f64,
    pub lon: f64,
    pub time: Option<DateTime<Utc>>,
    pub measurements: Vec<f32>,
    /// AVG weight; anything but a finite positive value is rejected at binning.
    pub weight: f32,
}

impl Observation {
    /// Create an untimed observation with unit weight.
    pub fn new(lat: f64, lon: f64, measurements: Vec<f32>) -> Self {
        Self {
            lat,
            lon,
            time: None,
            measurements,
            weight: 1.0,
        }
    }

    /// Set the acquisition time.
    pub fn with_time(mut self, time: DateTime<Utc>) -> Self {
        self.time = Some(time);
        self
    }

    /// Set the observation weight.
    pub fn with_weight(mut self, weight: f32) -> Self {
        self.weight = weight;
        self
    }

    /// Acquisition time as fractional seconds since the Unix epoch, NaN when untimed.
    pub fn time_seconds(&self) -> f64 {
        self.time
            .map(|t| t.timestamp_millis() as f64 / 1000.0)
            .unwrap_or(f64::NAN)
    }
}

/// Wire form of an observation in JSON-lines input files.
///
/// `null` measurement values are read as missing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservationRecord {
    pub lat: f64,
    pub lon: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,
    #[serde(alias = "measurements")]
    pub values: Vec<Option<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f32>,
}

impl From<ObservationRecord> for Observation {
    fn from(record: ObservationRecord) -> Self {
        Self {
            lat: record.lat,
            lon: record.lon,
            time: record.time,
            measurements: record
                .values
                .into_iter()
                .map(|v| v.unwrap_or(f32::NAN))
                .collect(),
            weight: record.weight.unwrap_or(1.0),
        }
    }
}

impl From<&Observation> for ObservationRecord {
    fn from(obs: &Observation) -> Self {
        Self {
            lat: obs.lat,
            lon: obs.lon,
            time: obs.time,
            values: obs
                .measurements
                .iter()
                .map(|v| if v.is_nan() { None } else { Some(*v) })
                .collect(),
            weight: if obs.weight == 1.0 { None } else { Some(obs.weight) },
        }
    }
}

/// Ordered channel layout shared by all aggregators of a run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VariableContext {
    names: Vec<String>,
    no_data: Vec<Option<f32>>,
}

impl VariableContext {
    /// Channels without no-data markers.
    pub fn new<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let no_data = vec![None; names.len()];
        Self { names, no_data }
    }

    /// Build from configured variables. Names must be unique.
    pub fn from_config(variables: &[VariableConfig]) -> Result<Self> {
        let mut ctx = Self::default();
        for var in variables {
            if ctx.index_of(&var.name).is_some() {
                return Err(BinningError::configuration(format!(
                    "variable '{}' is declared twice",
                    var.name
                )));
            }
            ctx.names.push(var.name.clone());
            ctx.no_data.push(var.no_data_value);
        }
        Ok(ctx)
    }

    /// Set the no-data marker of a channel.
    pub fn with_no_data(mut self, name: &str, value: f32) -> Self {
        if let Some(i) = self.index_of(name) {
            self.no_data[i] = Some(value);
        }
        self
    }

    /// Position of `name`, if configured.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Position of `name`, or a configuration error naming the caller.
    pub fn require(&self, name: &str, who: &str) -> Result<usize> {
        self.index_of(name).ok_or_else(|| {
            BinningError::configuration(format!(
                "{} refers to unknown variable '{}' (known: {})",
                who,
                name,
                self.names.join(", ")
            ))
        })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Replace no-data markers with NaN. Returns the number of valid values left.
    pub fn normalize(&self, values: &mut [f32]) -> usize {
        let mut valid = 0;
        for (value, no_data) in values.iter_mut().zip(&self.no_data) {
            if let Some(marker) = no_data {
                if *value == *marker {
                    *value = f32::NAN;
                }
            }
            if !value.is_nan() {
                valid += 1;
            }
        }
        valid
    }

    /// Permutation mapping this context's channels onto a stream's channel list.
    ///
    /// Entry `i` is the stream position of configured channel `i`. Returns
    /// `None` when the stream already uses the configured order.
    pub fn channel_mapping(&self, stream_channels: &[String]) -> Result<Option<Vec<usize>>> {
        if stream_channels.len() >= self.names.len()
            && stream_channels[..self.names.len()] == self.names[..]
        {
            return Ok(None);
        }
        let mut mapping = Vec::with_capacity(self.names.len());
        for name in &self.names {
            let pos = stream_channels.iter().position(|c| c == name).ok_or_else(|| {
                BinningError::InputValidation(format!(
                    "channel '{}' missing from input (available: {})",
                    name,
                    stream_channels.join(", ")
                ))
            })?;
            mapping.push(pos);
        }
        Ok(Some(mapping))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_no_data() {
        let ctx = VariableContext::new(["chl", "sst"]).with_no_data("sst", -999.0);
        let mut values = [0.5, -999.0];
        assert_eq!(ctx.normalize(&mut values), 1);
        assert_eq!(values[0], 0.5);
        assert!(values[1].is_nan());

        let mut all_missing = [f32::NAN, -999.0];
        assert_eq!(ctx.normalize(&mut all_missing), 0);
    }

    #[test]
    fn test_channel_mapping() {
        let ctx = VariableContext::new(["chl", "sst"]);
        let same = vec!["chl".to_string(), "sst".to_string(), "extra".to_string()];
        assert_eq!(ctx.channel_mapping(&same).unwrap(), None);

        let swapped = vec!["sst".to_string(), "chl".to_string()];
        assert_eq!(ctx.channel_mapping(&swapped).unwrap(), Some(vec![1, 0]));

        let missing = vec!["chl".to_string()];
        assert!(ctx.channel_mapping(&missing).is_err());
    }

    #[test]
    fn test_from_config_rejects_duplicates() {
        let vars = vec![
            VariableConfig::new("chl"),
            VariableConfig::new("chl"),
        ];
        assert!(VariableContext::from_config(&vars).is_err());
    }

    #[test]
    fn test_record_conversion() {
        let json = r#"{"lat": 10.0, "lon": 20.0, "values": [1.5, null], "time": "2024-03-01T12:00:00Z"}"#;
        let record: ObservationRecord = serde_json::from_str(json).unwrap();
        let obs = Observation::from(record);
        assert_eq!(obs.measurements[0], 1.5);
        assert!(obs.measurements[1].is_nan());
        assert_eq!(obs.weight, 1.0);
        assert!((obs.time_seconds() - 1_709_294_400.0).abs() < 1e-6);
    }
}
