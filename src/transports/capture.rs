//! Capture of live traffic for later replay

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::transport::Transport;
use crate::{HarnessError, Result};

/// Reads slower than this are recorded in the timing index
const TIMING_GAP_SECS: f64 = 0.01;

/// Tees everything read from an inner transport into a byte dump
///
/// Whenever a read blocks for more than 10 ms, a timing row
/// `(time_before_read, bytes_so_far)` is appended to the CSV index, which
/// [`TimedDumpTransport`](super::TimedDumpTransport) plays back.
pub struct RecordingTransport<T> {
    inner: T,
    clock: Arc<dyn Clock>,
    dump: BufWriter<File>,
    dump_path: PathBuf,
    timing: csv::Writer<File>,
    timing_path: PathBuf,
    position: u64,
}

impl<T: Transport> RecordingTransport<T> {
    /// Record to `<stem>.dat` and `<stem>-timing.csv`
    pub fn create<P: AsRef<Path>>(inner: T, stem: P, clock: Arc<dyn Clock>) -> Result<Self> {
        let stem = stem.as_ref();
        let dump_path = stem.with_extension("dat");
        let file_name = stem.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        let timing_path = stem.with_file_name(format!("{}-timing.csv", file_name));

        let dump = File::create(&dump_path)
            .map_err(|e| HarnessError::file_error(dump_path.clone(), e))?;
        let timing = File::create(&timing_path)
            .map_err(|e| HarnessError::file_error(timing_path.clone(), e))?;

        info!("Recording to {} and {}", dump_path.display(), timing_path.display());
        Ok(Self {
            inner,
            clock,
            dump: BufWriter::new(dump),
            dump_path,
            timing: csv::WriterBuilder::new().has_headers(false).from_writer(timing),
            timing_path,
            position: 0,
        })
    }

    pub fn dump_path(&self) -> &Path {
        &self.dump_path
    }

    pub fn timing_path(&self) -> &Path {
        &self.timing_path
    }

    /// Bytes recorded so far
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn flush(&mut self) -> Result<()> {
        self.dump.flush().map_err(|e| HarnessError::file_error(self.dump_path.clone(), e))?;
        self.timing.flush().map_err(|e| HarnessError::file_error(self.timing_path.clone(), e))
    }

    /// Flush both files and hand back the inner transport
    pub fn finish(mut self) -> Result<T> {
        self.flush()?;
        Ok(self.inner)
    }
}

#[async_trait::async_trait]
impl<T: Transport> Transport for RecordingTransport<T> {
    async fn read(&mut self, max: usize) -> Result<Vec<u8>> {
        let time_before = self.clock.now();
        let chunk = self.inner.read(max).await?;
        let delay = self.clock.now() - time_before;

        if chunk.is_empty() {
            debug!("Recording ended after {} bytes", self.position);
            self.flush()?;
            return Ok(chunk);
        }

        if delay > TIMING_GAP_SECS && self.position > 0 {
            self.timing
                .serialize((time_before, self.position))
                .map_err(|e| HarnessError::timing_error(self.timing_path.display().to_string(), e.to_string()))?;
        }

        self.dump
            .write_all(&chunk)
            .map_err(|e| HarnessError::file_error(self.dump_path.clone(), e))?;
        self.position += chunk.len() as u64;
        Ok(chunk)
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.inner.write(bytes).await
    }
}
