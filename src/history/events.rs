//! Timestamped scalar event streams

use std::collections::VecDeque;
use tracing::debug;

use crate::types::{SampleValue, StreamSample};

/// Non-decreasing `(timestamp, value)` pairs with a stable global index
#[derive(Debug, Clone, Default)]
pub struct EventStream {
    events: VecDeque<(f64, f64)>,
    evicted: u64,
}

impl EventStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event; a timestamp older than the newest entry is clamped
    /// to it
    pub fn append(&mut self, timestamp: f64, value: f64) {
        let timestamp = match self.events.back() {
            Some(&(last, _)) if timestamp < last => {
                debug!("Clamping out-of-order event at {:.3} to {:.3}", timestamp, last);
                last
            }
            _ => timestamp,
        };
        self.events.push_back((timestamp, value));
    }

    pub fn evict(&mut self, horizon: f64) -> usize {
        self.evict_before(horizon, u64::MAX)
    }

    /// Evict entries older than `horizon` whose global index is below `keep_from`
    pub fn evict_before(&mut self, horizon: f64, keep_from: u64) -> usize {
        let mut removed = 0;
        while self.evicted + (removed as u64) < keep_from
            && self.events.front().is_some_and(|&(timestamp, _)| timestamp < horizon)
        {
            self.events.pop_front();
            removed += 1;
        }
        self.evicted += removed as u64;
        removed
    }

    pub fn iterate(&self, from_index: u64, to_timestamp: f64) -> Vec<StreamSample> {
        let skip = from_index.saturating_sub(self.evicted) as usize;
        self.events
            .iter()
            .enumerate()
            .skip(skip)
            .take_while(|(_, (timestamp, _))| *timestamp <= to_timestamp)
            .map(|(offset, &(timestamp, value))| StreamSample {
                index: self.evicted + offset as u64,
                timestamp,
                value: SampleValue::Scalar(value),
            })
            .collect()
    }

    pub fn entries(&self) -> impl Iterator<Item = &(f64, f64)> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn evicted_count(&self) -> u64 {
        self.evicted
    }
}
