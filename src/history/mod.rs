//! Bounded in-memory stream history
//!
//! Signals are stored as [`SignalSegment`]s: gap-free runs whose sample
//! times follow from a start timestamp and the samplerate. Scalar events
//! live in [`EventStream`]s. Both count what eviction removed so a reader's
//! global index stays valid across trims.

mod events;
mod segment;
mod store;

pub use events::EventStream;
pub use segment::{SignalHistory, SignalSegment};
pub use store::{DEFAULT_EVENT_STREAMS, HistoryStore, ReaderId};
