//! Replay of captured byte dumps

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace};

use crate::clock::Clock;
use crate::transport::Transport;
use crate::{HarnessError, Result};

fn read_dump(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| HarnessError::file_error(path.to_path_buf(), e))
}

/// Untimed replay of a raw byte dump
///
/// Outgoing writes are kept in memory so callers can inspect what would
/// have been sent to the device.
#[derive(Debug, Clone, Default)]
pub struct DumpTransport {
    data: Vec<u8>,
    position: usize,
    written: Vec<u8>,
}

impl DumpTransport {
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into(), position: 0, written: Vec::new() }
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = read_dump(path)?;
        info!("Opened dump {} ({} bytes)", path.display(), data.len());
        Ok(Self::from_bytes(data))
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// Bytes written to this transport so far
    pub fn written(&self) -> &[u8] {
        &self.written
    }
}

#[async_trait::async_trait]
impl Transport for DumpTransport {
    async fn read(&mut self, max: usize) -> Result<Vec<u8>> {
        let end = (self.position + max.max(1)).min(self.data.len());
        let chunk = self.data[self.position..end].to_vec();
        self.position = end;
        Ok(chunk)
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.written.extend_from_slice(bytes);
        Ok(())
    }
}

/// One timing index row: by `timestamp`, `offset` bytes had arrived
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimingEntry {
    pub timestamp: f64,
    pub offset: u64,
}

/// Arrival times of a byte dump
///
/// Stored either as CSV rows `timestamp,cumulative_byte_offset` without a
/// header, or as a JSON array of `[timestamp, offset]` pairs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimingIndex {
    entries: Vec<TimingEntry>,
}

impl TimingIndex {
    /// Build from entries, which must be finite and non-decreasing in both
    /// columns
    pub fn new(entries: Vec<TimingEntry>) -> Result<Self> {
        if let Some(row) = entries.iter().position(|e| !e.timestamp.is_finite()) {
            return Err(HarnessError::timing_error(
                "timing index",
                format!("row {} has a non-finite timestamp", row),
            ));
        }
        for (i, pair) in entries.windows(2).enumerate() {
            if pair[1].timestamp < pair[0].timestamp || pair[1].offset < pair[0].offset {
                return Err(HarnessError::timing_error(
                    "timing index",
                    format!("row {} goes backwards", i + 1),
                ));
            }
        }
        Ok(Self { entries })
    }

    /// Load by extension: `.json` as JSON, anything else as CSV
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let is_json = path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let index = if is_json { Self::load_json(path)? } else { Self::load_csv(path)? };
        debug!("Loaded {} timing entries from {}", index.entries.len(), path.display());
        Ok(index)
    }

    pub fn load_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file =
            std::fs::File::open(path).map_err(|e| HarnessError::file_error(path.to_path_buf(), e))?;
        Self::from_csv_reader(file, &path.display().to_string())
    }

    fn from_csv_reader<R: std::io::Read>(reader: R, context: &str) -> Result<Self> {
        let mut reader =
            csv::ReaderBuilder::new().has_headers(false).trim(csv::Trim::All).from_reader(reader);
        let entries = reader
            .deserialize::<(f64, u64)>()
            .map(|row| {
                row.map(|(timestamp, offset)| TimingEntry { timestamp, offset })
                    .map_err(|e| HarnessError::timing_error(context, e.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(entries)
    }

    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| HarnessError::file_error(path.to_path_buf(), e))?;
        Self::from_json_str(&text, &path.display().to_string())
    }

    fn from_json_str(text: &str, context: &str) -> Result<Self> {
        let pairs: Vec<(f64, u64)> = serde_json::from_str(text)
            .map_err(|e| HarnessError::timing_error(context, e.to_string()))?;
        Self::new(pairs.into_iter().map(|(timestamp, offset)| TimingEntry { timestamp, offset }).collect())
    }

    pub fn entries(&self) -> &[TimingEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Time between the first and last entry
    pub fn duration(&self) -> f64 {
        match (self.entries.first(), self.entries.last()) {
            (Some(first), Some(last)) => last.timestamp - first.timestamp,
            _ => 0.0,
        }
    }
}

/// Replay of a byte dump at its recorded pace
///
/// The first read anchors the index's first timestamp to the clock's
/// current time. Each read waits until the next entry is due and returns
/// at most the bytes up to that entry's offset. Bytes past the last entry
/// are delivered without waiting.
pub struct TimedDumpTransport {
    dump: DumpTransport,
    index: TimingIndex,
    next_entry: usize,
    clock: Arc<dyn Clock>,
    time_correction: Option<f64>,
}

impl TimedDumpTransport {
    pub fn new(dump: DumpTransport, index: TimingIndex, clock: Arc<dyn Clock>) -> Self {
        Self { dump, index, next_entry: 0, clock, time_correction: None }
    }

    pub fn open<P: AsRef<Path>, Q: AsRef<Path>>(
        dump_path: P,
        timing_path: Q,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let dump = DumpTransport::open(dump_path)?;
        let index = TimingIndex::load(timing_path)?;
        info!("Timed replay over {:.1}s", index.duration());
        Ok(Self::new(dump, index, clock))
    }

    pub fn written(&self) -> &[u8] {
        self.dump.written()
    }
}

impl std::fmt::Debug for TimedDumpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimedDumpTransport")
            .field("position", &self.dump.position())
            .field("next_entry", &self.next_entry)
            .field("entries", &self.index.entries().len())
            .finish()
    }
}

#[async_trait::async_trait]
impl Transport for TimedDumpTransport {
    async fn read(&mut self, max: usize) -> Result<Vec<u8>> {
        let position = self.dump.position() as u64;

        // skip entries whose bytes were already delivered
        while self.index.entries.get(self.next_entry).is_some_and(|e| e.offset <= position) {
            self.next_entry += 1;
        }

        let Some(entry) = self.index.entries.get(self.next_entry).copied() else {
            return self.dump.read(max).await;
        };

        let correction = match self.time_correction {
            Some(correction) => correction,
            None => {
                let first = self.index.entries.first().map_or(0.0, |e| e.timestamp);
                let correction = self.clock.now() - first;
                self.time_correction = Some(correction);
                correction
            }
        };

        let wait = entry.timestamp + correction - self.clock.now();
        if wait > 0.0 {
            trace!("Waiting {:.3}s for timing entry {}", wait, self.next_entry);
            self.clock.sleep(Duration::from_secs_f64(wait)).await;
        }

        let available = (entry.offset - position) as usize;
        self.dump.read(max.min(available)).await
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.dump.write(bytes).await
    }
}
