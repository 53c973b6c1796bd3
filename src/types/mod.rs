//! Core data types flowing through the engine.
//!
//! - [`SignalPacket`] is one decoded waveform chunk with its device timestamp
//! - [`SummaryMessage`] and [`HxMMessage`] are scalar telemetry messages
//! - [`Message`] is the closed set of messages produced by the payload codecs
//! - [`StreamSample`] is what the history store and the delayed player hand out

mod message;
mod signal;

pub use message::{HxMMessage, Message, SummaryMessage};
pub use signal::{SampleValue, SignalKind, SignalPacket, StreamSample};
