//! Protocol engine for Zephyr BioHarness and HxM chest straps.
//!
//! Turns the raw, lossy byte stream of a serial link into time-aligned
//! physiological signal and event streams.
//!
//! # Features
//!
//! - **Framing**: checksum-validated frames recovered from a noisy byte stream
//! - **Codecs**: breathing, ECG, RR, acceleration, summary and HxM payloads
//! - **Continuity**: sequence gaps split signals into separate segments
//! - **Clock correction**: device timestamps mapped onto the host clock
//! - **Bounded history**: per-stream storage with stable global indices
//! - **Delayed playback**: jitter-free, ordered delivery a fixed delay behind now
//! - **Heartbeats**: interval events from the RR channel and from HxM straps
//!
//! # Data flow
//!
//! ```text
//! Transport -> FrameParser -> Message::decode -> PacketHandler -> HistoryStore -> DelayedPlayer
//! ```
//!
//! ## Example (capture replay)
//!
//! ```rust,no_run
//! use bioharness::{BioHarness, EngineConfig};
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = EngineConfig::default();
//!     config.clock.correction_enabled = false;
//!
//!     let (session, mut samples) = BioHarness::replay("capture.dat".as_ref(), None, config)?;
//!     let finished = tokio::spawn(session.finish());
//!
//!     while let Some((stream, sample)) = samples.next().await {
//!         println!("{} {:.3} {:?}", stream, sample.timestamp, sample.value);
//!     }
//!     finished.await??;
//!     Ok(())
//! }
//! ```

// Core types and error handling
mod error;
#[cfg_attr(any(test, feature = "benchmark"), path = "test_utils.rs")]
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Configuration and time
pub mod clock;
pub mod config;

// Wire protocol
pub mod protocol;

// Stream reconstruction
pub mod analysis;
pub mod history;
pub mod pipeline;
pub mod player;

// Byte sources and the read loop
pub mod driver;
pub mod session;
pub mod transport;
pub mod transports;

// Core exports
pub use error::*;
pub use types::*;

pub use analysis::{
    ClockDifferenceEstimator, Continuity, ContinuityTracker, Heartbeat, HeartbeatReconstructor,
    RrIntervalDetector,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    ClockConfig, DriverConfig, EngineConfig, HeartbeatConfig, HistoryConfig, PlayerConfig,
};
pub use driver::{Driver, DriverHandle, DriverStats};
pub use history::{EventStream, HistoryStore, ReaderId, SignalHistory, SignalSegment};
pub use pipeline::{PacketHandler, PipelineStats};
pub use player::{DelayedPlayer, PlaybackCallback, PlayerHandle, PlayerStats};
pub use protocol::{DeviceCommand, Frame, FrameParser, MessageId, crc8, encode_frame, unpack_bits};
pub use session::{Session, SessionBuilder, SessionStats};
pub use transport::Transport;

use futures::Stream;
use std::path::Path;
use std::sync::Arc;

/// Entry point for replaying captured device traffic.
///
/// Live links plug in through [`Session::builder`] with any [`Transport`].
pub struct BioHarness;

impl BioHarness {
    /// Replay a raw byte dump through the full engine.
    ///
    /// With a timing index the dump is paced at its recorded speed on the
    /// system clock; without one it is read as fast as possible. Returns the
    /// running session and the stream of played-back items.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The dump or timing index cannot be read
    /// - The timing index is malformed
    /// - The configuration is invalid
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use bioharness::{BioHarness, EngineConfig};
    ///
    /// # #[tokio::main]
    /// # async fn main() -> bioharness::Result<()> {
    /// let (session, _samples) = BioHarness::replay(
    ///     "capture.dat".as_ref(),
    ///     Some("capture-timing.csv".as_ref()),
    ///     EngineConfig::default(),
    /// )?;
    /// let stats = session.finish().await?;
    /// println!("{} frames", stats.driver.frames);
    /// # Ok(())
    /// # }
    /// ```
    pub fn replay(
        dump: &Path,
        timing: Option<&Path>,
        config: EngineConfig,
    ) -> Result<(Session, impl Stream<Item = (String, StreamSample)> + Send + Unpin + use<>)> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let transport: Box<dyn Transport> = match timing {
            Some(timing) => {
                Box::new(transports::TimedDumpTransport::open(dump, timing, clock.clone())?)
            }
            None => Box::new(transports::DumpTransport::open(dump)?),
        };

        let mut builder = Session::builder().config(config).clock(clock);
        let samples = builder.subscribe();
        let session = builder.start(transport)?;
        Ok((session, samples))
    }
}
