//! Session facade wiring transport, decode pipeline, history and playback
//!
//! ```rust,no_run
//! use bioharness::{EngineConfig, Session};
//! use bioharness::transports::DumpTransport;
//!
//! # async fn example() -> bioharness::Result<()> {
//! let mut builder = Session::builder().config(EngineConfig::default());
//! builder = builder.on_sample(|stream, sample| {
//!     println!("{} {:.3} {:?}", stream, sample.timestamp, sample.value);
//! });
//! let session = builder.start(DumpTransport::open("capture.dat")?)?;
//! let stats = session.finish().await?;
//! println!("{} frames", stats.driver.frames);
//! # Ok(())
//! # }
//! ```

use futures::Stream;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::driver::{Driver, DriverHandle, DriverStats};
use crate::history::HistoryStore;
use crate::pipeline::PacketHandler;
use crate::player::{DelayedPlayer, PlaybackCallback, PlayerHandle, PlayerStats};
use crate::transport::Transport;
use crate::types::StreamSample;
use crate::Result;

/// Counters of a finished session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub driver: DriverStats,
    pub player: PlayerStats,
}

/// Builder for [`Session`]
pub struct SessionBuilder {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    callbacks: Vec<PlaybackCallback>,
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self { config: EngineConfig::default(), clock: Arc::new(SystemClock), callbacks: Vec::new() }
    }
}

impl SessionBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Register a playback consumer
    pub fn on_sample<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str, &StreamSample) + Send + Sync + 'static,
    {
        self.callbacks.push(Box::new(callback));
        self
    }

    /// Played-back items as an async stream, ending when the session stops
    pub fn subscribe(&mut self) -> impl Stream<Item = (String, StreamSample)> + Send + Unpin + use<> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.callbacks.push(Box::new(move |stream: &str, sample: &StreamSample| {
            let _ = tx.send((stream.to_string(), *sample));
        }));
        UnboundedReceiverStream::new(rx)
    }

    /// Validate the configuration and spawn the read loop and the player
    pub fn start<T: Transport>(self, transport: T) -> Result<Session> {
        self.config.validate()?;

        let store = Arc::new(HistoryStore::new(self.config.history.clone()));
        let handler = PacketHandler::new(store.clone(), self.clock.clone(), &self.config);

        let mut player = DelayedPlayer::new(store.clone(), self.clock.clone(), self.config.player.clone());
        for callback in self.callbacks {
            player.add_callback(callback);
        }

        let driver = Driver::spawn(transport, handler, self.config.driver.clone());
        let player = player.spawn();
        info!("Session started");

        Ok(Session { store, clock: self.clock, config: self.config, driver, player })
    }
}

/// A running device session
pub struct Session {
    store: Arc<HistoryStore>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    driver: DriverHandle,
    player: PlayerHandle,
}

impl Session {
    pub fn builder() -> SessionBuilder {
        SessionBuilder::default()
    }

    pub fn store(&self) -> &Arc<HistoryStore> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Wait for the transport to end, let the player catch up with the
    /// longest configured delay, then stop it
    ///
    /// A read loop failure stops the player right away and is returned.
    pub async fn finish(self) -> Result<SessionStats> {
        let Session { clock, config, driver, player, .. } = self;

        let driver = match driver.join().await {
            Ok(stats) => stats,
            Err(e) => {
                warn!("Read loop failed, stopping playback: {}", e);
                player.terminate();
                let _ = player.join().await;
                return Err(e);
            }
        };

        let longest_delay = config
            .player
            .stream_delays
            .values()
            .copied()
            .fold(config.player.default_delay_secs, f64::max);
        clock.sleep(Duration::from_secs_f64(longest_delay) + config.player.tick_period()).await;

        player.terminate();
        let player = player.join().await?;
        info!("Session finished");
        Ok(SessionStats { driver, player })
    }

    /// Stop both tasks immediately
    pub async fn shutdown(self) -> Result<SessionStats> {
        let Session { driver, player, .. } = self;
        driver.terminate();
        player.terminate();

        let player = player.join().await?;
        let driver = driver.join().await?;
        info!("Session shut down");
        Ok(SessionStats { driver, player })
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").field("driver", &self.driver).field("player", &self.player).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::test_utils::{DeviceTime, breathing_payload, frame_bytes, summary_payload};
    use crate::transports::DumpTransport;
    use crate::types::SignalKind;
    use futures::StreamExt;

    fn two_breathing_frames(start: DeviceTime) -> Vec<u8> {
        let raw: Vec<u16> = (0..18).map(|i| 500 + i).collect();
        let next = DeviceTime { millis_of_day: start.millis_of_day + 1000, ..start };
        let mut bytes = frame_bytes(0x21, &breathing_payload(0, start, &raw));
        bytes.extend(frame_bytes(0x21, &breathing_payload(1, next, &raw)));
        bytes
    }

    async fn run_breathing(correction: bool) -> (Arc<HistoryStore>, SessionStats, Vec<(String, StreamSample)>) {
        let start = DeviceTime::new(2012, 6, 14, 45_296_000);
        // well past the capture, so every sample is due on the first tick
        let clock = Arc::new(ManualClock::new(start.unix_seconds() + 10.0));
        let mut config = EngineConfig::default();
        config.clock.correction_enabled = correction;

        let mut builder = Session::builder().config(config).clock(clock);
        let delivered = builder.subscribe();
        let session = builder.start(DumpTransport::from_bytes(two_breathing_frames(start))).unwrap();
        let store = session.store().clone();

        let stats = session.finish().await.unwrap();
        let delivered: Vec<_> = delivered.collect().await;
        (store, stats, delivered)
    }

    #[tokio::test]
    async fn two_breathing_frames_form_one_segment() {
        for correction in [false, true] {
            let (store, stats, _) = run_breathing(correction).await;

            let segments = store.segments(SignalKind::Breathing);
            assert_eq!(segments.len(), 1);
            assert_eq!(segments[0].len(), 36);
            assert_eq!(segments[0].samplerate(), 18.0);
            assert_eq!(stats.driver.pipeline.discontinuities, 0);
            assert_eq!(stats.driver.messages, 2);
        }
    }

    #[tokio::test]
    async fn finish_plays_back_every_sample_in_order() {
        let (_, stats, delivered) = run_breathing(false).await;
        let breathing: Vec<_> = delivered.iter().filter(|(name, _)| name == "breathing").collect();

        assert_eq!(breathing.len(), 36);
        assert!(breathing.iter().enumerate().all(|(i, (_, s))| s.index == i as u64));
        assert!(breathing.windows(2).all(|w| w[0].1.timestamp < w[1].1.timestamp));
        assert_eq!(stats.player.delivered, 36);
    }

    #[tokio::test]
    async fn uncorrected_replay_of_old_capture_delivers_everything() {
        let start = DeviceTime::new(2012, 6, 14, 45_296_000);
        let raw = [512u16; 18];
        let mut bytes = Vec::new();
        for seq in 0..4u8 {
            let time = DeviceTime { millis_of_day: start.millis_of_day + 1000 * u32::from(seq), ..start };
            bytes.extend(frame_bytes(0x21, &breathing_payload(seq, time, &raw)));
        }

        // host clock years past the capture, default retention
        let clock = Arc::new(ManualClock::new(1_700_000_000.0));
        let mut config = EngineConfig::default();
        config.clock.correction_enabled = false;

        let mut builder = Session::builder().config(config).clock(clock);
        let delivered = builder.subscribe();
        let stats = builder.start(DumpTransport::from_bytes(bytes)).unwrap().finish().await.unwrap();

        let indices: Vec<u64> = delivered
            .filter(|(name, _)| futures::future::ready(name == "breathing"))
            .map(|(_, sample)| sample.index)
            .collect()
            .await;
        assert_eq!(indices, (0..72).collect::<Vec<_>>());
        assert_eq!(stats.player.delivered, 72);
    }

    #[tokio::test]
    async fn summary_events_reach_subscribers() {
        let time = DeviceTime::new(2020, 5, 1, 1000);
        let clock = Arc::new(ManualClock::new(time.unix_seconds()));
        let mut config = EngineConfig::default();
        config.clock.correction_enabled = false;

        let mut builder = Session::builder().config(config).clock(clock);
        let delivered = builder.subscribe();
        let bytes = frame_bytes(0x2B, &summary_payload(0, time, 66, 120, 330, 5, 10, 20, 400, 80, 90));
        let stats = builder.start(DumpTransport::from_bytes(bytes)).unwrap().finish().await.unwrap();

        let delivered: Vec<_> = delivered.collect().await;
        let heart_rate: Vec<_> = delivered.iter().filter(|(n, _)| n == "heart_rate").collect();
        assert_eq!(heart_rate.len(), 1);
        assert_eq!(heart_rate[0].1.value.as_scalar(), Some(66.0));
        assert_eq!(stats.driver.pipeline.summaries, 1);
    }

    #[tokio::test]
    async fn decode_failure_is_returned_from_finish() {
        let clock = Arc::new(ManualClock::new(0.0));
        let session = Session::builder()
            .clock(clock)
            .start(DumpTransport::from_bytes(frame_bytes(0x2B, &[0; 10])))
            .unwrap();
        assert!(session.finish().await.is_err());
    }

    #[test]
    fn invalid_config_is_rejected_before_start() {
        let mut config = EngineConfig::default();
        config.player.tick_period_ms = 0;
        let result = Session::builder().config(config).start(DumpTransport::default());
        assert!(result.is_err());
    }
}
