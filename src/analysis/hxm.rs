//! HxM heartbeat timestamp reconstruction
//!
//! The HxM strap reports the 15 most recent beat times as milliseconds
//! modulo 65536 together with a wrapping beat counter. This module unwraps
//! those into a monotonic timeline, derives beat-to-beat intervals and maps
//! the timeline onto the host clock.

use std::collections::VecDeque;
use tracing::trace;

use crate::config::HeartbeatConfig;
use crate::types::HxMMessage;
use crate::{HarnessError, Result};

/// Beat times in an HxM message wrap at this many milliseconds
pub const HEARTBEAT_MS_MODULUS: f64 = 65_536.0;
/// Beats of history carried by one message
pub const HEARTBEAT_HISTORY_LEN: usize = 15;

/// Unwraps a modulo-bounded, non-decreasing sequence onto an absolute axis
///
/// Each value is shifted by a cumulative offset which grows by `modulus`
/// until the result is no smaller than the previous output.
#[derive(Debug, Clone)]
pub struct ModuloUnwrapper {
    modulus: f64,
    offset: f64,
    last: Option<f64>,
}

impl ModuloUnwrapper {
    pub fn new(modulus: f64) -> Self {
        Self { modulus, offset: 0.0, last: None }
    }

    pub fn process(&mut self, value: f64) -> f64 {
        let mut unwrapped = value + self.offset;
        if let Some(last) = self.last {
            while unwrapped < last {
                self.offset += self.modulus;
                unwrapped = value + self.offset;
            }
        }
        self.last = Some(unwrapped);
        unwrapped
    }
}

/// One reconstructed beat
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Heartbeat {
    /// Host-clock time of the beat
    pub timestamp: f64,
    /// Seconds since the previous beat
    pub interval: f64,
}

/// Turns successive HxM messages into absolute heartbeat interval events
#[derive(Debug, Clone)]
pub struct HeartbeatReconstructor {
    previous_number: Option<u8>,
    unwrapper: ModuloUnwrapper,
    previous_beat_secs: Option<f64>,
    latency_window: usize,
    offset_window: usize,
    latencies: VecDeque<f64>,
    latency_minima: VecDeque<f64>,
}

impl Default for HeartbeatReconstructor {
    fn default() -> Self {
        Self::new(&HeartbeatConfig::default())
    }
}

impl HeartbeatReconstructor {
    pub fn new(config: &HeartbeatConfig) -> Self {
        Self {
            previous_number: None,
            unwrapper: ModuloUnwrapper::new(HEARTBEAT_MS_MODULUS),
            previous_beat_secs: None,
            latency_window: config.latency_window.max(1),
            offset_window: config.offset_window.max(1),
            latencies: VecDeque::new(),
            latency_minima: VecDeque::new(),
        }
    }

    /// Current strap-to-host offset estimate in seconds
    pub fn offset(&self) -> f64 {
        if self.latency_minima.is_empty() {
            0.0
        } else {
            self.latency_minima.iter().sum::<f64>() / self.latency_minima.len() as f64
        }
    }

    /// Process one message received at host time `now`
    ///
    /// The first message only establishes the baseline. Fails with
    /// [`HarnessError::CalculationHistoryOverflow`] when more beats happened
    /// since the previous message than one message can carry; state is left
    /// untouched in that case and the analyzer should be replaced.
    pub fn process(&mut self, message: &HxMMessage, now: f64) -> Result<Vec<Heartbeat>> {
        let number = message.heartbeat_number;

        let Some(previous_number) = self.previous_number else {
            let newest = message.heartbeat_milliseconds[HEARTBEAT_HISTORY_LEN - 1];
            let newest_secs = self.unwrapper.process(f64::from(newest)) / 1000.0;
            self.previous_beat_secs = Some(newest_secs);
            self.previous_number = Some(number);
            self.update_offset(now, newest_secs);
            return Ok(Vec::new());
        };

        let increment = number.wrapping_sub(previous_number);
        if increment == 0 {
            return Ok(Vec::new());
        }
        if usize::from(increment) > HEARTBEAT_HISTORY_LEN {
            return Err(HarnessError::CalculationHistoryOverflow { increment });
        }
        self.previous_number = Some(number);

        let first_new = HEARTBEAT_HISTORY_LEN - usize::from(increment);
        let relative: Vec<(f64, Option<f64>)> = message.heartbeat_milliseconds[first_new..]
            .iter()
            .map(|&ms| {
                let beat_secs = self.unwrapper.process(f64::from(ms)) / 1000.0;
                let interval = self.previous_beat_secs.map(|previous| beat_secs - previous);
                self.previous_beat_secs = Some(beat_secs);
                (beat_secs, interval)
            })
            .collect();

        if let Some(&(latest, _)) = relative.last() {
            self.update_offset(now, latest);
        }

        let offset = self.offset();
        let beats: Vec<Heartbeat> = relative
            .into_iter()
            .filter_map(|(beat_secs, interval)| {
                interval.map(|interval| Heartbeat { timestamp: beat_secs + offset, interval })
            })
            .collect();

        trace!("HxM beat {}: {} new beats, offset {:.3}", number, beats.len(), offset);
        Ok(beats)
    }

    fn update_offset(&mut self, now: f64, latest_beat_secs: f64) {
        self.latencies.push_back(now - latest_beat_secs);
        while self.latencies.len() > self.latency_window {
            self.latencies.pop_front();
        }

        let minimum = self.latencies.iter().copied().fold(f64::INFINITY, f64::min);
        self.latency_minima.push_back(minimum);
        while self.latency_minima.len() > self.offset_window {
            self.latency_minima.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Message sent right after beat `latest` of a strap beating every
    /// `period_ms` starting at `start_ms`
    fn message(latest: u64, start_ms: u64, period_ms: u64) -> HxMMessage {
        let heartbeat_milliseconds = std::array::from_fn(|slot| {
            let beat = (latest + slot as u64).saturating_sub(14);
            ((start_ms + beat * period_ms) % 65_536) as u16
        });
        HxMMessage {
            heart_rate: (60_000 / period_ms) as u8,
            heartbeat_number: (latest % 256) as u8,
            heartbeat_milliseconds,
            distance: 0.0,
            speed: 0.0,
            strides: 0,
        }
    }

    #[test]
    fn unwrapper_adds_cumulative_modulus() {
        let mut unwrapper = ModuloUnwrapper::new(10.0);
        let outputs: Vec<f64> = [5.0, 9.0, 1.0, 0.5, 1.0].iter().map(|&v| unwrapper.process(v)).collect();
        assert_eq!(outputs, vec![5.0, 9.0, 11.0, 20.5, 21.0]);
    }

    #[test]
    fn unwrapper_equal_values_do_not_wrap() {
        let mut unwrapper = ModuloUnwrapper::new(65_536.0);
        assert_eq!(unwrapper.process(100.0), 100.0);
        assert_eq!(unwrapper.process(100.0), 100.0);
    }

    #[test]
    fn first_message_is_baseline_only() {
        let mut reconstructor = HeartbeatReconstructor::default();
        let beats = reconstructor.process(&message(20, 0, 1000), 21.0).unwrap();
        assert!(beats.is_empty());
    }

    #[test]
    fn sixty_bpm_for_an_hour() {
        let mut reconstructor = HeartbeatReconstructor::default();
        let mut emitted = 0;

        for beat in 0..3600u64 {
            // host receives each message 150 ms after the beat
            let now = 5000.0 + beat as f64 + 0.15;
            let beats = reconstructor
                .process(&message(beat, 0, 1000), now)
                .expect("periodic beats never overflow");
            for heartbeat in &beats {
                assert!((heartbeat.interval - 1.0).abs() < 1e-9, "interval {}", heartbeat.interval);
            }
            emitted += beats.len();
        }

        assert_eq!(emitted, 3599);
    }

    #[test]
    fn beats_are_mapped_onto_host_clock() {
        let mut reconstructor = HeartbeatReconstructor::default();
        let mut last = Vec::new();
        for beat in 0..40u64 {
            let now = 5000.0 + beat as f64 + 0.2;
            last = reconstructor.process(&message(beat, 0, 1000), now).unwrap();
        }
        // the offset is the smallest observed receive delay, so the newest
        // beat lands on its receive time
        assert_eq!(last.len(), 1);
        assert!((last[0].timestamp - (5000.2 + 39.0)).abs() < 1e-6);
        assert!((reconstructor.offset() - 5000.2).abs() < 1e-6);
    }

    #[test]
    fn several_beats_per_message() {
        let mut reconstructor = HeartbeatReconstructor::default();
        reconstructor.process(&message(10, 0, 800), 100.0).unwrap();
        let beats = reconstructor.process(&message(14, 0, 800), 103.3).unwrap();
        assert_eq!(beats.len(), 4);
        assert!(beats.iter().all(|b| (b.interval - 0.8).abs() < 1e-9));
        assert!(beats.windows(2).all(|w| w[1].timestamp > w[0].timestamp));
    }

    #[test]
    fn duplicate_message_emits_nothing() {
        let mut reconstructor = HeartbeatReconstructor::default();
        reconstructor.process(&message(3, 0, 1000), 4.0).unwrap();
        reconstructor.process(&message(4, 0, 1000), 5.0).unwrap();
        assert!(reconstructor.process(&message(4, 0, 1000), 5.1).unwrap().is_empty());
    }

    #[test]
    fn counter_wraparound_is_continuous() {
        let mut reconstructor = HeartbeatReconstructor::default();
        reconstructor.process(&message(254, 0, 1000), 255.0).unwrap();
        reconstructor.process(&message(255, 0, 1000), 256.0).unwrap();
        let beats = reconstructor.process(&message(256, 0, 1000), 257.0).unwrap();
        assert_eq!(beats.len(), 1);
        assert!((beats[0].interval - 1.0).abs() < 1e-9);
    }

    #[test]
    fn gap_beyond_history_overflows() {
        let mut reconstructor = HeartbeatReconstructor::default();
        reconstructor.process(&message(10, 0, 1000), 11.0).unwrap();

        let err = reconstructor.process(&message(26, 0, 1000), 27.0).unwrap_err();
        assert!(matches!(err, HarnessError::CalculationHistoryOverflow { increment: 16 }));

        // state untouched: the next in-range message still works
        let beats = reconstructor.process(&message(11, 0, 1000), 12.0).unwrap();
        assert_eq!(beats.len(), 1);
    }

    #[test]
    fn fifteen_beat_gap_is_recoverable() {
        let mut reconstructor = HeartbeatReconstructor::default();
        reconstructor.process(&message(10, 0, 1000), 11.0).unwrap();
        let beats = reconstructor.process(&message(25, 0, 1000), 26.0).unwrap();
        assert_eq!(beats.len(), 15);
    }
}
