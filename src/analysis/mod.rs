//! Stream analysis applied on the decode path
//!
//! - [`ContinuityTracker`] flags sequence gaps that break sample-count timing
//! - [`ClockDifferenceEstimator`] maps device timestamps onto the host clock
//! - [`RrIntervalDetector`] extracts heartbeat intervals from the RR channel
//! - [`HeartbeatReconstructor`] rebuilds beat times from HxM messages

pub mod clock_offset;
pub mod continuity;
pub mod hxm;
pub mod rr;

pub use clock_offset::ClockDifferenceEstimator;
pub use continuity::{Continuity, ContinuityTracker};
pub use hxm::{Heartbeat, HeartbeatReconstructor, ModuloUnwrapper};
pub use rr::RrIntervalDetector;
