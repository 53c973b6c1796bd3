//! Driver runs the byte read loop on a background task

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::config::DriverConfig;
use crate::pipeline::{PacketHandler, PipelineStats};
use crate::protocol::{DeviceCommand, FrameParser, FramingStats};
use crate::transport::Transport;
use crate::types::Message;
use crate::{HarnessError, Result};

/// Counters of one read loop run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverStats {
    pub bytes_read: u64,
    pub frames: u64,
    pub framing_errors: u64,
    pub messages: u64,
    pub ignored_frames: u64,
    pub pipeline: PipelineStats,
}

impl DriverStats {
    fn update(&mut self, framing: FramingStats, pipeline: PipelineStats) {
        self.bytes_read = framing.bytes;
        self.frames = framing.frames;
        self.framing_errors = framing.errors;
        self.pipeline = pipeline;
    }
}

/// Driver feeds transport bytes through framing, decoding and the
/// [`PacketHandler`]
///
/// The loop owns the transport and the handler. It ends normally when the
/// transport reports end of stream or the cancellation token fires, and
/// with an error on a transport failure, an undecodable payload or a
/// history invariant violation.
pub struct Driver;

impl Driver {
    /// Spawn the read loop on a tokio task
    pub fn spawn<T>(transport: T, handler: PacketHandler, config: DriverConfig) -> DriverHandle
    where
        T: Transport,
    {
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move { Self::run(transport, handler, config, task_cancel).await });
        DriverHandle { cancel, task: Some(task) }
    }

    /// Run the read loop on the current task
    pub async fn run<T>(
        mut transport: T,
        mut handler: PacketHandler,
        config: DriverConfig,
        cancel: CancellationToken,
    ) -> Result<DriverStats>
    where
        T: Transport,
    {
        info!("Read loop started");

        if config.enable_periodic_packets {
            Self::enable_periodic_packets(&mut transport).await;
        }

        let mut parser = FrameParser::new();
        let mut stats = DriverStats::default();
        let chunk_size = config.read_chunk_size.max(1);

        let outcome = loop {
            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Read loop cancelled");
                    break Ok(());
                }
                result = transport.read(chunk_size) => result,
            };

            let bytes = match result {
                Ok(bytes) => bytes,
                Err(e) => {
                    error!("Transport error: {}", e);
                    break Err(e);
                }
            };

            if bytes.is_empty() {
                info!("Transport reached end of stream");
                break Ok(());
            }

            let mut frames = Vec::new();
            parser.feed(&bytes, |frame| frames.push(frame));

            let mut failure = None;
            for frame in frames {
                match Message::decode(&frame) {
                    Ok(Some(message)) => {
                        stats.messages += 1;
                        if let Err(e) = handler.handle(&message) {
                            failure = Some(e);
                            break;
                        }
                    }
                    Ok(None) => {
                        trace!("Ignoring frame with id {:#04x}", frame.message_id);
                        stats.ignored_frames += 1;
                    }
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                }
            }

            if let Some(e) = failure {
                error!("Read loop failed: {}", e);
                break Err(e);
            }
        };

        stats.update(parser.stats(), handler.stats());
        info!(
            "Read loop ended: {} bytes, {} frames, {} framing errors, {} messages",
            stats.bytes_read, stats.frames, stats.framing_errors, stats.messages
        );
        outcome.map(|()| stats)
    }

    async fn enable_periodic_packets<T: Transport>(transport: &mut T) {
        for command in DeviceCommand::PERIODIC_PACKETS {
            let written = match command.encode() {
                Ok(bytes) => transport.write(&bytes).await,
                Err(e) => Err(e),
            };
            match written {
                Ok(()) => debug!("Sent {:?}", command),
                Err(e) => warn!("Failed to send {:?}: {}", command, e),
            }
        }
    }
}

/// Handle to a spawned read loop; dropping it cancels the loop
#[derive(Debug)]
pub struct DriverHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<Result<DriverStats>>>,
}

impl DriverHandle {
    /// Stop reading at the next chunk boundary
    pub fn terminate(&self) {
        self.cancel.cancel();
    }

    /// Wait for the loop to end and return its counters or its error
    pub async fn join(mut self) -> Result<DriverStats> {
        match self.task.take() {
            Some(task) => task.await?,
            None => Err(HarnessError::Task { reason: "driver already joined".to_string() }),
        }
    }
}

impl Drop for DriverHandle {
    fn drop(&mut self) {
        if self.task.is_some() {
            debug!("Dropping driver handle");
            self.cancel.cancel();
        }
    }
}
