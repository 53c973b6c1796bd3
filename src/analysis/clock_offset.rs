//! Device-to-host clock difference estimation

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::clock::Clock;

/// Smooths `device_time - host_time` per stream over a trailing window
///
/// The device clock drifts against the host and the serial link adds
/// variable latency; the window mean tracks the drift while damping jitter.
pub struct ClockDifferenceEstimator {
    clock: Arc<dyn Clock>,
    window: usize,
    enabled: bool,
    offsets: HashMap<String, VecDeque<f64>>,
}

impl std::fmt::Debug for ClockDifferenceEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClockDifferenceEstimator")
            .field("window", &self.window)
            .field("enabled", &self.enabled)
            .field("streams", &self.offsets.len())
            .finish()
    }
}

impl ClockDifferenceEstimator {
    pub fn new(clock: Arc<dyn Clock>, window: usize, enabled: bool) -> Self {
        Self { clock, window: window.max(1), enabled, offsets: HashMap::new() }
    }

    /// Mean offset for `key`, 0.0 before any observation
    pub fn estimate(&self, key: &str) -> f64 {
        match self.offsets.get(key) {
            Some(window) if !window.is_empty() => window.iter().sum::<f64>() / window.len() as f64,
            _ => 0.0,
        }
    }

    /// Record the offset of `timestamp` against now and return it mapped
    /// onto the host clock
    ///
    /// Identity when correction is disabled.
    pub fn correct(&mut self, timestamp: f64, key: &str) -> f64 {
        if !self.enabled {
            return timestamp;
        }

        let offset = timestamp - self.clock.now();
        let window = self.offsets.entry(key.to_string()).or_default();
        window.push_back(offset);
        while window.len() > self.window {
            window.pop_front();
        }

        timestamp - self.estimate(key)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}
