//! Contiguous signal segments and per-signal history

use std::collections::VecDeque;

use crate::types::{SampleValue, SignalKind, SignalPacket, StreamSample};
use crate::{HarnessError, Result};

/// A gap-free run of samples at one samplerate
#[derive(Debug, Clone, PartialEq)]
pub struct SignalSegment {
    samplerate: f64,
    start_timestamp: f64,
    samples: VecDeque<SampleValue>,
}

impl SignalSegment {
    fn new(samplerate: f64, start_timestamp: f64) -> Self {
        Self { samplerate, start_timestamp, samples: VecDeque::new() }
    }

    pub fn samplerate(&self) -> f64 {
        self.samplerate
    }

    pub fn start_timestamp(&self) -> f64 {
        self.start_timestamp
    }

    /// Time just past the last sample
    pub fn end_timestamp(&self) -> f64 {
        self.start_timestamp + self.samples.len() as f64 / self.samplerate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn sample_timestamp(&self, index: usize) -> f64 {
        self.start_timestamp + index as f64 / self.samplerate
    }

    pub fn samples(&self) -> impl Iterator<Item = &SampleValue> {
        self.samples.iter()
    }

    /// Append a continuing packet, re-anchoring the start on the packet's
    /// end time without ever moving it backwards
    fn extend(&mut self, packet: &SignalPacket) {
        self.samples.extend(packet.samples.iter().copied());
        let packet_end = packet.timestamp + packet.samples.len() as f64 / self.samplerate;
        let anchored_start = packet_end - self.samples.len() as f64 / self.samplerate;
        self.start_timestamp = self.start_timestamp.max(anchored_start);
    }

    /// Drop at most `limit` samples timestamped before `horizon`, returning
    /// how many went
    fn trim_before(&mut self, horizon: f64, limit: usize) -> usize {
        let behind = (horizon - self.start_timestamp) * self.samplerate;
        if behind <= 0.0 {
            return 0;
        }
        let count = (behind.ceil() as usize).min(self.samples.len()).min(limit);
        self.samples.drain(..count);
        self.start_timestamp += count as f64 / self.samplerate;
        count
    }
}

/// All retained segments of one signal, oldest first
#[derive(Debug, Clone)]
pub struct SignalHistory {
    kind: SignalKind,
    segments: VecDeque<SignalSegment>,
    evicted: u64,
}

impl SignalHistory {
    pub fn new(kind: SignalKind) -> Self {
        Self { kind, segments: VecDeque::new(), evicted: 0 }
    }

    pub fn kind(&self) -> SignalKind {
        self.kind
    }

    /// Add a packet, opening a new segment when continuity was broken
    ///
    /// A new segment never overlaps the one before it. Continuing with a
    /// different samplerate is a [`HarnessError::SampleRateMismatch`].
    pub fn append(&mut self, packet: &SignalPacket, starts_new_segment: bool) -> Result<()> {
        match self.segments.back_mut() {
            Some(segment) if !starts_new_segment => {
                if segment.samplerate != packet.samplerate {
                    return Err(HarnessError::SampleRateMismatch {
                        stream: self.kind.name().to_string(),
                        expected: segment.samplerate,
                        found: packet.samplerate,
                    });
                }
                segment.extend(packet);
            }
            previous => {
                let start = match previous {
                    Some(previous) => packet.timestamp.max(previous.end_timestamp()),
                    None => packet.timestamp,
                };
                let mut segment = SignalSegment::new(packet.samplerate, start);
                segment.samples.extend(packet.samples.iter().copied());
                self.segments.push_back(segment);
            }
        }
        Ok(())
    }

    /// Remove everything older than `horizon`, returning the sample count
    pub fn evict(&mut self, horizon: f64) -> usize {
        self.evict_before(horizon, u64::MAX)
    }

    /// Like [`evict`](Self::evict), but samples with global index
    /// `>= keep_from` stay whatever their age
    pub fn evict_before(&mut self, horizon: f64, keep_from: u64) -> usize {
        let budget = keep_from.saturating_sub(self.evicted).min(usize::MAX as u64) as usize;
        let mut removed = 0;
        while let Some(front) = self.segments.front_mut() {
            removed += front.trim_before(horizon, budget - removed);
            if front.is_empty() {
                self.segments.pop_front();
            } else {
                break;
            }
        }
        self.evicted += removed as u64;
        removed
    }

    /// Samples with global index `>= from_index` and timestamp `<= to_timestamp`
    pub fn iterate(&self, from_index: u64, to_timestamp: f64) -> Vec<StreamSample> {
        let mut out = Vec::new();
        let mut base = self.evicted;

        for segment in &self.segments {
            let len = segment.len() as u64;
            if base + len <= from_index {
                base += len;
                continue;
            }

            let first = from_index.saturating_sub(base) as usize;
            for (offset, value) in segment.samples.iter().enumerate().skip(first) {
                let timestamp = segment.sample_timestamp(offset);
                if timestamp > to_timestamp {
                    return out;
                }
                out.push(StreamSample { index: base + offset as u64, timestamp, value: *value });
            }
            base += len;
        }
        out
    }

    pub fn segments(&self) -> impl Iterator<Item = &SignalSegment> {
        self.segments.iter()
    }

    /// Samples removed by eviction so far
    pub fn evicted_count(&self) -> u64 {
        self.evicted
    }

    /// Samples currently retained
    pub fn retained_count(&self) -> usize {
        self.segments.iter().map(SignalSegment::len).sum()
    }
}
