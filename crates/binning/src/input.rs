//! Observation sources.
//!
//! Decoding of sensor products is out of scope for this crate; a source
//! only has to turn a path into a stream of [`Observation`]s. The bundled
//! [`JsonLinesSource`] reads a simple line-oriented format:
//!
//! ```text
//! {"channels": ["chl", "sst"]}
//! {"lat": 43.1, "lon": 5.2, "time": "2024-06-01T10:00:00Z", "values": [0.41, 18.2]}
//! {"lat": 43.2, "lon": 5.3, "values": [null, 18.4]}
//! ```
//!
//! The header line is optional; without it channels are taken to be in
//! configured variable order.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Lines, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{BinningError, Result};
use crate::observation::{Observation, ObservationRecord};

/// Observations of one source file.
pub trait ObservationStream: Iterator<Item = Result<Observation>> + Send {
    /// Channel order of the measurement vectors, if the file declares one.
    fn channel_names(&self) -> Option<&[String]>;
}

/// Opens source files as observation streams.
pub trait ObservationSource: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn ObservationStream>>;
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct Header {
    channels: Vec<String>,
}

// ============================================================================
// JSON lines
// ============================================================================

/// Reads `.jsonl` observation files.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonLinesSource;

impl ObservationSource for JsonLinesSource {
    fn open(&self, path: &Path) -> Result<Box<dyn ObservationStream>> {
        Ok(Box::new(JsonLinesStream::open(path)?))
    }
}

/// Streaming reader over one JSON-lines file.
pub struct JsonLinesStream {
    path: PathBuf,
    lines: Lines<BufReader<File>>,
    line_no: usize,
    channels: Option<Vec<String>>,
    pending: Option<(usize, String)>,
    failed: bool,
}

impl JsonLinesStream {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| BinningError::input_fault(path, e.to_string()))?;
        let mut stream = Self {
            path: path.to_path_buf(),
            lines: BufReader::new(file).lines(),
            line_no: 0,
            channels: None,
            pending: None,
            failed: false,
        };

        if let Some((line_no, line)) = stream.next_line()? {
            match serde_json::from_str::<Header>(&line) {
                Ok(header) => stream.channels = Some(header.channels),
                Err(_) => stream.pending = Some((line_no, line)),
            }
        }
        Ok(stream)
    }

    fn next_line(&mut self) -> Result<Option<(usize, String)>> {
        for line in self.lines.by_ref() {
            self.line_no += 1;
            let line = line.map_err(|e| BinningError::input_fault(&self.path, e.to_string()))?;
            if !line.trim().is_empty() {
                return Ok(Some((self.line_no, line)));
            }
        }
        Ok(None)
    }

    fn parse(&self, line_no: usize, line: &str) -> Result<Observation> {
        serde_json::from_str::<ObservationRecord>(line)
            .map(Observation::from)
            .map_err(|e| BinningError::input_fault(&self.path, format!("line {}: {}", line_no, e)))
    }
}

impl Iterator for JsonLinesStream {
    type Item = Result<Observation>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let next = match self.pending.take() {
            Some(entry) => Ok(Some(entry)),
            None => self.next_line(),
        };
        let result = match next {
            Ok(Some((line_no, line))) => self.parse(line_no, &line),
            Ok(None) => return None,
            Err(e) => Err(e),
        };
        if result.is_err() {
            self.failed = true;
        }
        Some(result)
    }
}

impl ObservationStream for JsonLinesStream {
    fn channel_names(&self) -> Option<&[String]> {
        self.channels.as_deref()
    }
}

/// Write observations in the format read by [`JsonLinesSource`].
pub fn write_json_lines(
    path: &Path,
    channels: Option<&[String]>,
    observations: &[Observation],
) -> Result<()> {
    let file = File::create(path).map_err(|e| BinningError::output_fault(path, e.to_string()))?;
    let mut writer = BufWriter::new(file);
    let io_err = |e: std::io::Error| BinningError::output_fault(path, e.to_string());

    if let Some(channels) = channels {
        let header = Header {
            channels: channels.to_vec(),
        };
        serde_json::to_writer(&mut writer, &header)?;
        writer.write_all(b"\n").map_err(io_err)?;
    }
    for obs in observations {
        serde_json::to_writer(&mut writer, &ObservationRecord::from(obs))?;
        writer.write_all(b"\n").map_err(io_err)?;
    }
    writer.flush().map_err(io_err)
}

// ============================================================================
// In memory
// ============================================================================

#[derive(Debug, Clone)]
enum MemoryEntry {
    Observations {
        channels: Option<Vec<String>>,
        observations: Vec<Observation>,
    },
    Fault(String),
}

/// Serves observations registered under synthetic paths.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    entries: HashMap<PathBuf, MemoryEntry>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, observations: Vec<Observation>) {
        self.entries.insert(
            path.into(),
            MemoryEntry::Observations {
                channels: None,
                observations,
            },
        );
    }

    pub fn insert_with_channels(
        &mut self,
        path: impl Into<PathBuf>,
        channels: Vec<String>,
        observations: Vec<Observation>,
    ) {
        self.entries.insert(
            path.into(),
            MemoryEntry::Observations {
                channels: Some(channels),
                observations,
            },
        );
    }

    /// Register a path that fails to open.
    pub fn insert_fault(&mut self, path: impl Into<PathBuf>, message: impl Into<String>) {
        self.entries
            .insert(path.into(), MemoryEntry::Fault(message.into()));
    }

    /// Registered paths, sorted.
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.entries.keys().cloned().collect();
        paths.sort();
        paths
    }
}

impl ObservationSource for MemorySource {
    fn open(&self, path: &Path) -> Result<Box<dyn ObservationStream>> {
        match self.entries.get(path) {
            Some(MemoryEntry::Observations {
                channels,
                observations,
            }) => Ok(Box::new(MemoryStream {
                channels: channels.clone(),
                observations: observations.clone().into_iter(),
            })),
            Some(MemoryEntry::Fault(message)) => Err(BinningError::input_fault(path, message.clone())),
            None => Err(BinningError::input_fault(path, "no such source")),
        }
    }
}

struct MemoryStream {
    channels: Option<Vec<String>>,
    observations: std::vec::IntoIter<Observation>,
}

impl Iterator for MemoryStream {
    type Item = Result<Observation>;

    fn next(&mut self) -> Option<Self::Item> {
        self.observations.next().map(Ok)
    }
}

impl ObservationStream for MemoryStream {
    fn channel_names(&self) -> Option<&[String]> {
        self.channels.as_deref()
    }
}
