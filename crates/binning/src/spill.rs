//! On-disk spill files for the two-phase merge.
//!
//! Each file holds the completed spatial bins of one source file, sorted by
//! cell index, as JSON lines. Features are stored as raw `f64` bit patterns
//! so NaN and infinities survive the trip.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Lines, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::bins::SpatialBin;
use crate::error::{BinningError, Result};
use crate::spatial::SpatialBinBatch;

#[derive(Debug, Serialize, Deserialize)]
struct SpillHeader {
    signature: String,
    num_bins: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct SpillRecord {
    i: u64,
    n: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    t: Option<i64>,
    f: Vec<u64>,
}

impl From<&SpatialBin> for SpillRecord {
    fn from(bin: &SpatialBin) -> Self {
        Self {
            i: bin.index,
            n: bin.num_obs,
            t: bin.latest_time.map(|t| t.timestamp_millis()),
            f: bin.features.iter().map(|v| v.to_bits()).collect(),
        }
    }
}

impl SpillRecord {
    fn into_bin(self) -> Result<SpatialBin> {
        let latest_time = match self.t {
            Some(ms) => Some(DateTime::<Utc>::from_timestamp_millis(ms).ok_or_else(|| {
                BinningError::invalid_state(format!("spill record {} has invalid time {}", self.i, ms))
            })?),
            None => None,
        };
        Ok(SpatialBin {
            index: self.i,
            num_obs: self.n,
            latest_time,
            features: self.f.into_iter().map(f64::from_bits).collect(),
        })
    }
}

/// Temporary file holding one spilled batch. Removed on drop.
#[derive(Debug)]
pub struct SpillFile {
    file: NamedTempFile,
    num_bins: usize,
}

impl SpillFile {
    /// Write the bins of `batch` to a new temporary file in `dir`.
    pub fn write(dir: Option<&Path>, batch: &SpatialBinBatch) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("bins-").suffix(".spill");
        let file = match dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }?;

        let path = file.path().to_path_buf();
        let io_err = |e: std::io::Error| BinningError::output_fault(&path, e.to_string());
        {
            let mut writer = BufWriter::new(file.as_file());
            let header = SpillHeader {
                signature: batch.signature.clone(),
                num_bins: batch.bins.len(),
            };
            serde_json::to_writer(&mut writer, &header)?;
            writer.write_all(b"\n").map_err(io_err)?;
            for bin in &batch.bins {
                serde_json::to_writer(&mut writer, &SpillRecord::from(bin))?;
                writer.write_all(b"\n").map_err(io_err)?;
            }
            writer.flush().map_err(io_err)?;
        }

        debug!(path = %path.display(), bins = batch.bins.len(), "Spilled bins");
        Ok(Self {
            file,
            num_bins: batch.bins.len(),
        })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn num_bins(&self) -> usize {
        self.num_bins
    }

    /// Open a reader, checking that the bins were produced with `signature`.
    pub fn open(&self, signature: &str, read_ahead_bytes: usize) -> Result<SpillReader> {
        let file = self.file.reopen()?;
        let mut lines = BufReader::with_capacity(read_ahead_bytes.max(1), file).lines();
        let header: SpillHeader = match lines.next() {
            Some(line) => serde_json::from_str(&line?)?,
            None => {
                return Err(BinningError::invalid_state(format!(
                    "spill file {} has no header",
                    self.path().display()
                )))
            }
        };
        if header.signature != signature {
            return Err(BinningError::ConfigurationMismatch {
                expected: signature.to_string(),
                found: header.signature,
            });
        }
        Ok(SpillReader {
            lines,
            remaining: header.num_bins,
        })
    }
}

/// Sequential reader over a spill file.
pub struct SpillReader {
    lines: Lines<BufReader<File>>,
    remaining: usize,
}

impl Iterator for SpillReader {
    type Item = Result<SpatialBin>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let line = match self.lines.next() {
            Some(Ok(line)) => line,
            Some(Err(e)) => return Some(Err(e.into())),
            None => {
                self.remaining = 0;
                return Some(Err(BinningError::invalid_state("spill file truncated")));
            }
        };
        Some(
            serde_json::from_str::<SpillRecord>(&line)
                .map_err(BinningError::from)
                .and_then(SpillRecord::into_bin),
        )
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::SpatialStats;
    use chrono::TimeZone;

    fn batch(signature: &str) -> SpatialBinBatch {
        let mut a = SpatialBin::new(3, 3);
        a.num_obs = 2;
        a.latest_time = Some(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap());
        a.features = vec![1.5, f64::NAN, f64::NEG_INFINITY];
        let mut b = SpatialBin::new(9, 3);
        b.num_obs = 1;
        b.features = vec![-0.25, 0.0, f64::INFINITY];
        SpatialBinBatch {
            bins: vec![a, b],
            stats: SpatialStats::default(),
            signature: signature.to_string(),
            min_time: None,
            max_time: None,
        }
    }

    #[test]
    fn test_special_values_survive() {
        let dir = tempfile::tempdir().unwrap();
        let original = batch("MEAN_OBS[x]");
        let spill = SpillFile::write(Some(dir.path()), &original).unwrap();
        assert_eq!(spill.num_bins(), 2);

        let read: Vec<SpatialBin> = spill
            .open("MEAN_OBS[x]", 16)
            .unwrap()
            .map(|b| b.unwrap())
            .collect();
        assert_eq!(read.len(), 2);
        assert_eq!(read[0].index, 3);
        assert_eq!(read[0].latest_time, original.bins[0].latest_time);
        assert!(read[0].features[1].is_nan());
        assert_eq!(read[0].features[2], f64::NEG_INFINITY);
        assert_eq!(read[1], original.bins[1]);
    }

    #[test]
    fn test_signature_mismatch() {
        let spill = SpillFile::write(None, &batch("MEAN_OBS[x]")).unwrap();
        let err = spill.open("MIN_MAX[x]", 1024).err().unwrap();
        assert!(matches!(err, BinningError::ConfigurationMismatch { .. }));
    }

    #[test]
    fn test_file_removed_on_drop() {
        let spill = SpillFile::write(None, &batch("s")).unwrap();
        let path = spill.path().to_path_buf();
        assert!(path.exists());
        drop(spill);
        assert!(!path.exists());
    }
}
