//! Decode-path wiring from typed messages into the history store

use std::sync::Arc;
use tracing::{trace, warn};

use crate::analysis::{
    ClockDifferenceEstimator, ContinuityTracker, HeartbeatReconstructor, RrIntervalDetector,
};
use crate::clock::Clock;
use crate::config::{EngineConfig, HeartbeatConfig};
use crate::history::HistoryStore;
use crate::types::{HxMMessage, Message, SignalKind, SignalPacket, SummaryMessage};
use crate::{HarnessError, Result};

/// Clock-correction key shared by all summary messages
pub const SUMMARY_CLOCK_KEY: &str = "summary";

/// Counters kept by a [`PacketHandler`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub signal_packets: u64,
    pub summaries: u64,
    pub hxm_messages: u64,
    pub discontinuities: u64,
    pub heartbeat_intervals: u64,
    pub heartbeat_overflows: u64,
}

/// Per-device message handler
///
/// Runs continuity tracking and clock correction on signal packets before
/// storing them, derives events from summary, RR and HxM messages, and
/// triggers periodic eviction. Single producer: owned by the read loop.
pub struct PacketHandler {
    store: Arc<HistoryStore>,
    clock: Arc<dyn Clock>,
    continuity: ContinuityTracker,
    estimator: ClockDifferenceEstimator,
    rr: RrIntervalDetector,
    heartbeat: HeartbeatReconstructor,
    heartbeat_config: HeartbeatConfig,
    stats: PipelineStats,
}

impl PacketHandler {
    pub fn new(store: Arc<HistoryStore>, clock: Arc<dyn Clock>, config: &EngineConfig) -> Self {
        Self {
            continuity: ContinuityTracker::new(config.sequence_modulus),
            estimator: ClockDifferenceEstimator::new(
                clock.clone(),
                config.clock.window,
                config.clock.correction_enabled,
            ),
            rr: RrIntervalDetector::new(),
            heartbeat: HeartbeatReconstructor::new(&config.heartbeat),
            heartbeat_config: config.heartbeat.clone(),
            stats: PipelineStats::default(),
            store,
            clock,
        }
    }

    pub fn store(&self) -> &Arc<HistoryStore> {
        &self.store
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    /// Route one decoded message, then evict if due
    pub fn handle(&mut self, message: &Message) -> Result<()> {
        match message {
            Message::Signal(packet) => self.handle_signal(packet)?,
            Message::Summary(summary) => self.handle_summary(summary),
            Message::HxM(hxm) => self.handle_hxm(hxm),
        }
        self.store.maybe_evict(self.clock.now());
        Ok(())
    }

    pub fn handle_signal(&mut self, packet: &SignalPacket) -> Result<()> {
        self.stats.signal_packets += 1;

        let continuity = self.continuity.check(packet);
        if continuity.is_discontinuity() {
            self.stats.discontinuities += 1;
        }
        let starts_new_segment = continuity.starts_new_segment();

        // correct the time of the last sample, which is when the chunk was
        // complete on the device, then shift back to the first sample
        let end = packet.last_sample_timestamp();
        let corrected_end = self.estimator.correct(end, packet.kind.name());
        let corrected = packet.with_timestamp(packet.timestamp + (corrected_end - end));

        trace!(
            stream = packet.kind.name(),
            sequence = packet.sequence_number,
            samples = packet.samples.len(),
            "Signal packet at {:.3}",
            corrected.timestamp
        );

        self.store.append_signal(&corrected, starts_new_segment)?;

        if packet.kind == SignalKind::Rr {
            for (timestamp, interval) in self.rr.process(&corrected, starts_new_segment) {
                self.store.append_event("heartbeat_interval", timestamp, interval);
                self.stats.heartbeat_intervals += 1;
            }
        }
        Ok(())
    }

    pub fn handle_summary(&mut self, summary: &SummaryMessage) {
        self.stats.summaries += 1;
        let timestamp = self.estimator.correct(summary.timestamp, SUMMARY_CLOCK_KEY);

        let events = [
            ("activity", summary.activity),
            ("heart_rate", f64::from(summary.heart_rate)),
            ("respiration_rate", summary.respiration_rate),
            ("skin_temperature", summary.skin_temperature),
            ("posture", f64::from(summary.posture)),
        ];
        for (name, value) in events {
            self.store.append_event(name, timestamp, value);
        }
    }

    /// HxM messages are timed by the heartbeat reconstructor's own offset
    /// model, not the clock difference estimator
    pub fn handle_hxm(&mut self, hxm: &HxMMessage) {
        self.stats.hxm_messages += 1;
        let now = self.clock.now();

        let beats = match self.heartbeat.process(hxm, now) {
            Ok(beats) => beats,
            Err(HarnessError::CalculationHistoryOverflow { increment }) => {
                warn!(
                    increment,
                    "Heartbeat history overflow, restarting heartbeat analysis from this message"
                );
                self.stats.heartbeat_overflows += 1;
                self.heartbeat = HeartbeatReconstructor::new(&self.heartbeat_config);
                // a fresh analyzer only takes its baseline from the first message
                self.heartbeat.process(hxm, now).unwrap_or_default()
            }
            Err(e) => {
                warn!("Heartbeat analysis failed: {}", e);
                Vec::new()
            }
        };

        for beat in &beats {
            self.store.append_event("heartbeat_interval", beat.timestamp, beat.interval);
        }
        self.stats.heartbeat_intervals += beats.len() as u64;

        if let Some(newest) = beats.last() {
            self.store.append_event("heart_rate", newest.timestamp, f64::from(hxm.heart_rate));
        }
    }
}

impl std::fmt::Debug for PacketHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketHandler").field("stats", &self.stats).finish_non_exhaustive()
    }
}
