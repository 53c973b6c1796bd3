//! Transport implementations for offline replay and capture
//!
//! - [`DumpTransport`]: raw byte dump delivered as fast as it is read
//! - [`TimedDumpTransport`]: raw byte dump paced by a [`TimingIndex`]
//! - [`RecordingTransport`]: wraps a live transport and writes a dump plus
//!   timing index that the replay transports can play back

pub mod capture;
pub mod replay;

pub use capture::RecordingTransport;
pub use replay::{DumpTransport, TimedDumpTransport, TimingIndex};
