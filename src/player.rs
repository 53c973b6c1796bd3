//! Delayed real-time playback of the stream history
//!
//! Data reaches the host in bursts, and packets can arrive slightly out of
//! order across streams. The player reads each stream a fixed delay behind
//! the wall clock, so by the time an item is handed out everything with an
//! earlier timestamp has arrived too.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use bioharness::{DelayedPlayer, HistoryStore, PlayerConfig, SystemClock};
//! use futures::StreamExt;
//!
//! # async fn example() -> bioharness::Result<()> {
//! let store = Arc::new(HistoryStore::default());
//! let mut player = DelayedPlayer::new(store, Arc::new(SystemClock), PlayerConfig::default());
//! let mut samples = player.subscribe().take(100);
//! let handle = player.spawn();
//!
//! while let Some((stream, sample)) = samples.next().await {
//!     println!("{} {:.3} {:?}", stream, sample.timestamp, sample.value);
//! }
//! handle.terminate();
//! handle.join().await?;
//! # Ok(())
//! # }
//! ```

use futures::Stream;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::config::PlayerConfig;
use crate::history::{HistoryStore, ReaderId};
use crate::types::StreamSample;
use crate::Result;

/// Consumer invoked with `(stream_name, item)` for every delivered item
pub type PlaybackCallback = Box<dyn Fn(&str, &StreamSample) + Send + Sync>;

/// Counters reported when the player stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlayerStats {
    pub ticks: u64,
    pub delivered: u64,
}

/// Replays every stream of a [`HistoryStore`] a fixed delay behind now
///
/// Each stream has a cursor (global index) that only moves forward; an
/// item is delivered to every callback exactly once, in timestamp order
/// within its stream. Callbacks run on the player's task, so a slow
/// callback delays the next tick for all streams.
///
/// The player is a registered reader of the store: items it has not
/// delivered yet survive eviction until it is dropped.
pub struct DelayedPlayer {
    store: Arc<HistoryStore>,
    reader: ReaderId,
    clock: Arc<dyn Clock>,
    config: PlayerConfig,
    callbacks: Vec<PlaybackCallback>,
    cursors: HashMap<String, u64>,
    stats: PlayerStats,
}

impl DelayedPlayer {
    pub fn new(store: Arc<HistoryStore>, clock: Arc<dyn Clock>, config: PlayerConfig) -> Self {
        let reader = store.register_reader();
        Self {
            reader,
            store,
            clock,
            config,
            callbacks: Vec::new(),
            cursors: HashMap::new(),
            stats: PlayerStats::default(),
        }
    }

    pub fn add_callback<F>(&mut self, callback: F)
    where
        F: Fn(&str, &StreamSample) + Send + Sync + 'static,
    {
        self.callbacks.push(Box::new(callback));
    }

    /// Delivered items as an async stream
    ///
    /// The stream ends once the player has stopped and been dropped.
    pub fn subscribe(&mut self) -> impl Stream<Item = (String, StreamSample)> + Send + Unpin + use<> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.add_callback(move |stream, sample| {
            let _ = tx.send((stream.to_string(), *sample));
        });
        UnboundedReceiverStream::new(rx)
    }

    /// Next global index to be delivered for `stream`
    pub fn cursor(&self, stream: &str) -> u64 {
        self.cursors.get(stream).copied().unwrap_or(0)
    }

    pub fn stats(&self) -> PlayerStats {
        self.stats
    }

    /// Deliver everything that has become due, returning the item count
    pub fn tick(&mut self) -> usize {
        let now = self.clock.now();
        let mut delivered = 0;

        for name in self.store.stream_names() {
            let delayed_now = now - self.config.delay_for(&name);
            let cursor = self.cursors.entry(name.clone()).or_insert(0);
            let before = *cursor;

            for item in self.store.iterate(&name, *cursor, delayed_now) {
                for callback in &self.callbacks {
                    callback(&name, &item);
                }
                *cursor = item.index + 1;
                delivered += 1;
            }
            if *cursor != before {
                self.store.advance_reader(self.reader, &name, *cursor);
            }
        }

        self.stats.ticks += 1;
        self.stats.delivered += delivered as u64;
        delivered
    }

    /// Tick until `cancel` fires
    ///
    /// Cancellation is checked once per tick: the tick during which it is
    /// observed is the last one, so items already due are still delivered.
    pub async fn run(&mut self, cancel: CancellationToken) -> PlayerStats {
        info!("Delayed player started (default delay {:.2}s)", self.config.default_delay_secs);
        let period = self.config.tick_period();

        loop {
            self.tick();
            if cancel.is_cancelled() {
                break;
            }

            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = self.clock.sleep(period) => {}
            }
        }

        info!(
            "Delayed player stopped after {} ticks, {} items delivered",
            self.stats.ticks, self.stats.delivered
        );
        self.stats
    }

    /// Run on a tokio task
    pub fn spawn(mut self) -> PlayerHandle {
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move { self.run(task_cancel).await });
        PlayerHandle { cancel, task: Some(task) }
    }
}

impl Drop for DelayedPlayer {
    fn drop(&mut self) {
        self.store.release_reader(self.reader);
    }
}

impl std::fmt::Debug for DelayedPlayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelayedPlayer")
            .field("config", &self.config)
            .field("callbacks", &self.callbacks.len())
            .field("cursors", &self.cursors)
            .finish()
    }
}

/// Handle to a spawned [`DelayedPlayer`]; dropping it stops the player
#[derive(Debug)]
pub struct PlayerHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<PlayerStats>>,
}

impl PlayerHandle {
    /// Ask the player to stop after one final tick
    pub fn terminate(&self) {
        self.cancel.cancel();
    }

    /// Wait for the run loop to exit
    pub async fn join(mut self) -> Result<PlayerStats> {
        match self.task.take() {
            Some(task) => Ok(task.await?),
            None => Ok(PlayerStats::default()),
        }
    }
}

impl Drop for PlayerHandle {
    fn drop(&mut self) {
        if self.task.is_some() {
            debug!("Dropping player handle");
            self.cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::types::{SampleValue, SignalKind, SignalPacket};
    use futures::StreamExt;
    use parking_lot::Mutex;

    type Log = Arc<Mutex<Vec<(String, StreamSample)>>>;

    fn setup(delay: f64) -> (Arc<ManualClock>, Arc<HistoryStore>, DelayedPlayer, Log) {
        let clock = Arc::new(ManualClock::new(100.0));
        let store = Arc::new(HistoryStore::default());
        let config = PlayerConfig { default_delay_secs: delay, ..PlayerConfig::default() };
        let mut player = DelayedPlayer::new(store.clone(), clock.clone(), config);

        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        player.add_callback(move |stream, item| sink.lock().push((stream.to_string(), *item)));
        (clock, store, player, log)
    }

    fn breathing(timestamp: f64, values: &[f64]) -> SignalPacket {
        let samples = values.iter().map(|&v| SampleValue::Scalar(v)).collect();
        SignalPacket::new(SignalKind::Breathing, timestamp, samples, 0)
    }

    #[test]
    fn delivers_in_order_exactly_once() {
        let (clock, store, mut player, log) = setup(1.2);
        store.append_event("heart_rate", 97.0, 60.0);
        store.append_event("heart_rate", 97.5, 61.0);
        store.append_event("heart_rate", 98.0, 62.0);

        clock.set(98.0 + 1.2);
        assert_eq!(player.tick(), 3);
        assert_eq!(player.tick(), 0);

        let log = log.lock();
        let values: Vec<_> = log.iter().map(|(_, item)| item.value).collect();
        assert_eq!(
            values,
            vec![SampleValue::Scalar(60.0), SampleValue::Scalar(61.0), SampleValue::Scalar(62.0)]
        );
        assert!(log.windows(2).all(|w| w[0].1.timestamp < w[1].1.timestamp));
    }

    #[test]
    fn holds_items_until_delay_has_passed() {
        let (clock, store, mut player, log) = setup(2.0);
        store.append_signal(&breathing(99.0, &[1.0; 18]), true).unwrap();

        // delayed now is 98.0
        assert_eq!(player.tick(), 0);

        clock.set(101.5);
        assert_eq!(player.tick(), 10);
        assert_eq!(player.cursor("breathing"), 10);

        clock.set(102.0);
        assert_eq!(player.tick(), 8);
        assert_eq!(log.lock().len(), 18);
        assert_eq!(player.stats().delivered, 18);
    }

    #[test]
    fn undelivered_items_survive_eviction() {
        let (clock, store, mut player, log) = setup(1.2);
        // device-time data far behind the host clock, evicted before the first tick
        clock.set(1_700_000_000.0);
        store.append_signal(&breathing(1_339_677_296.0, &[1.0; 18]), true).unwrap();
        store.maybe_evict(clock.now());

        assert_eq!(player.tick(), 18);
        assert_eq!(log.lock().len(), 18);

        clock.advance(10.0);
        store.maybe_evict(clock.now());
        assert_eq!(store.evicted_count("breathing"), 18);

        drop(player);
        store.append_signal(&breathing(1_339_677_297.0, &[1.0; 18]), false).unwrap();
        store.evict(clock.now());
        assert_eq!(store.evicted_count("breathing"), 36);
    }

    #[test]
    fn late_arrivals_are_still_delivered_once() {
        let (clock, store, mut player, log) = setup(1.0);
        store.append_event("activity", 50.0, 0.1);
        clock.set(60.0);
        player.tick();
        store.append_event("activity", 55.0, 0.2);
        player.tick();
        player.tick();
        assert_eq!(log.lock().len(), 2);
    }

    #[test]
    fn per_stream_delays() {
        let (clock, store, _, _) = setup(1.0);
        let mut config = PlayerConfig { default_delay_secs: 1.0, ..PlayerConfig::default() };
        config.stream_delays.insert("heartbeat_interval".to_string(), 5.0);
        let mut player = DelayedPlayer::new(store.clone(), clock.clone(), config);

        store.append_event("heart_rate", 100.0, 60.0);
        store.append_event("heartbeat_interval", 100.0, 1.0);
        clock.set(102.0);

        assert_eq!(player.tick(), 1);
        assert_eq!(player.cursor("heart_rate"), 1);
        assert_eq!(player.cursor("heartbeat_interval"), 0);
    }

    #[tokio::test]
    async fn spawned_player_streams_and_stops() {
        let (clock, store, mut player, _) = setup(1.0);
        let mut stream = player.subscribe();
        store.append_event("respiration_rate", clock.now(), 14.0);

        let handle = player.spawn();
        let (name, item) = stream.next().await.expect("item delivered");
        assert_eq!(name, "respiration_rate");
        assert_eq!(item.value, SampleValue::Scalar(14.0));

        handle.terminate();
        let stats = handle.join().await.unwrap();
        assert_eq!(stats.delivered, 1);
        assert!(stats.ticks > 1);

        // the player and its sender are gone
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn final_tick_delivers_due_items() {
        let (clock, store, player, log) = setup(1.0);
        let handle = player.spawn();
        store.append_event("heart_rate", clock.now(), 64.0);
        clock.advance(5.0);
        handle.terminate();
        handle.join().await.unwrap();
        assert_eq!(log.lock().len(), 1);
    }

    #[tokio::test]
    async fn dropping_handle_cancels() {
        let (_, _, player, _) = setup(1.0);
        let handle = player.spawn();
        let cancel = handle.cancel.clone();
        drop(handle);
        assert!(cancel.is_cancelled());
    }
}
