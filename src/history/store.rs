//! Shared multi-stream history

use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

use super::{EventStream, SignalHistory, SignalSegment};
use crate::config::HistoryConfig;
use crate::types::{SignalKind, SignalPacket, StreamSample};
use crate::Result;

/// Event streams present before any data arrives
pub const DEFAULT_EVENT_STREAMS: [&str; 4] =
    ["activity", "heart_rate", "respiration_rate", "heartbeat_interval"];

/// Handle of a registered reader, see [`HistoryStore::register_reader`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReaderId(u64);

#[derive(Debug, Default)]
struct Readers {
    next_id: u64,
    /// Next undelivered global index per stream, per reader
    cursors: HashMap<ReaderId, HashMap<String, u64>>,
}

impl Readers {
    /// Lowest index any reader still has to consume in `name`
    fn keep_from(&self, name: &str) -> u64 {
        self.cursors
            .values()
            .map(|cursors| cursors.get(name).copied().unwrap_or(0))
            .min()
            .unwrap_or(u64::MAX)
    }
}

/// Bounded history of every signal and event stream of one device
///
/// Each stream sits behind its own lock, so the decode path appending to
/// one stream never waits on the player reading another. All methods take
/// `&self`; share the store through an `Arc`.
///
/// Eviction never removes an item a registered reader has not consumed
/// yet, whatever its timestamp.
#[derive(Debug)]
pub struct HistoryStore {
    config: HistoryConfig,
    signals: [Mutex<SignalHistory>; SignalKind::ALL.len()],
    events: RwLock<BTreeMap<String, Arc<Mutex<EventStream>>>>,
    last_eviction: Mutex<Option<f64>>,
    readers: Mutex<Readers>,
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new(HistoryConfig::default())
    }
}

impl HistoryStore {
    pub fn new(config: HistoryConfig) -> Self {
        let events = DEFAULT_EVENT_STREAMS
            .iter()
            .map(|name| (name.to_string(), Arc::new(Mutex::new(EventStream::new()))))
            .collect();

        Self {
            config,
            signals: std::array::from_fn(|i| Mutex::new(SignalHistory::new(SignalKind::ALL[i]))),
            events: RwLock::new(events),
            last_eviction: Mutex::new(None),
            readers: Mutex::new(Readers::default()),
        }
    }

    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    pub fn append_signal(&self, packet: &SignalPacket, starts_new_segment: bool) -> Result<()> {
        self.signals[packet.kind.index()].lock().append(packet, starts_new_segment)
    }

    pub fn append_event(&self, name: &str, timestamp: f64, value: f64) {
        self.event_stream(name).lock().append(timestamp, value);
    }

    fn event_stream(&self, name: &str) -> Arc<Mutex<EventStream>> {
        if let Some(stream) = self.events.read().get(name) {
            return stream.clone();
        }
        self.events.write().entry(name.to_string()).or_default().clone()
    }

    /// Register a consumer whose undelivered items are held back from eviction
    pub fn register_reader(&self) -> ReaderId {
        let mut readers = self.readers.lock();
        let id = ReaderId(readers.next_id);
        readers.next_id += 1;
        readers.cursors.insert(id, HashMap::new());
        id
    }

    /// Record that `reader` has consumed `name` up to, not including, `next_index`
    pub fn advance_reader(&self, reader: ReaderId, name: &str, next_index: u64) {
        if let Some(cursors) = self.readers.lock().cursors.get_mut(&reader) {
            cursors.insert(name.to_string(), next_index);
        }
    }

    pub fn release_reader(&self, reader: ReaderId) {
        self.readers.lock().cursors.remove(&reader);
    }

    /// Evict all streams up to `horizon`, returning the number of items removed
    ///
    /// Items registered readers have not consumed are kept.
    pub fn evict(&self, horizon: f64) -> usize {
        // cursors only move forward, so a snapshot is a safe lower bound
        let (signal_floors, event_floors, unseen_floor) = {
            let readers = self.readers.lock();
            let signals = SignalKind::ALL.map(|kind| readers.keep_from(kind.name()));
            let events: HashMap<String, u64> = self
                .events
                .read()
                .keys()
                .map(|name| (name.clone(), readers.keep_from(name)))
                .collect();
            let unseen = if readers.cursors.is_empty() { u64::MAX } else { 0 };
            (signals, events, unseen)
        };

        let signals: usize = self
            .signals
            .iter()
            .zip(signal_floors)
            .map(|(history, keep_from)| history.lock().evict_before(horizon, keep_from))
            .sum();
        let events: usize = self
            .events
            .read()
            .iter()
            .map(|(name, stream)| {
                // streams created after the snapshot have not been read by anyone
                let keep_from = event_floors.get(name).copied().unwrap_or(unseen_floor);
                stream.lock().evict_before(horizon, keep_from)
            })
            .sum();
        if signals + events > 0 {
            debug!("Evicted {} samples and {} events older than {:.3}", signals, events, horizon);
        }
        signals + events
    }

    /// Evict with the configured retention if the eviction interval has
    /// passed since the last pass
    pub fn maybe_evict(&self, now: f64) -> bool {
        {
            let mut last = self.last_eviction.lock();
            match *last {
                Some(previous) if now - previous < self.config.eviction_interval_secs => return false,
                _ => *last = Some(now),
            }
        }
        self.evict(now - self.config.length_secs);
        true
    }

    /// Items of stream `name` from global index `from_index` up to
    /// `to_timestamp`
    ///
    /// Signal names take precedence; unknown names yield nothing.
    pub fn iterate(&self, name: &str, from_index: u64, to_timestamp: f64) -> Vec<StreamSample> {
        if let Some(kind) = SignalKind::from_name(name) {
            return self.signals[kind.index()].lock().iterate(from_index, to_timestamp);
        }
        let stream = self.events.read().get(name).cloned();
        stream.map(|s| s.lock().iterate(from_index, to_timestamp)).unwrap_or_default()
    }

    /// Signal names followed by event stream names
    pub fn stream_names(&self) -> Vec<String> {
        SignalKind::ALL
            .iter()
            .map(|kind| kind.name().to_string())
            .chain(self.events.read().keys().cloned())
            .collect()
    }

    /// Snapshot of the retained segments of `kind`
    pub fn segments(&self, kind: SignalKind) -> Vec<SignalSegment> {
        self.signals[kind.index()].lock().segments().cloned().collect()
    }

    /// Snapshot of the retained events of `name`
    pub fn events(&self, name: &str) -> Vec<(f64, f64)> {
        let stream = self.events.read().get(name).cloned();
        stream.map(|s| s.lock().entries().copied().collect()).unwrap_or_default()
    }

    pub fn evicted_count(&self, name: &str) -> u64 {
        if let Some(kind) = SignalKind::from_name(name) {
            return self.signals[kind.index()].lock().evicted_count();
        }
        let stream = self.events.read().get(name).cloned();
        stream.map(|s| s.lock().evicted_count()).unwrap_or(0)
    }
}
