//! Per-stream sequence number tracking

use tracing::warn;

use crate::types::{SignalKind, SignalPacket};

/// Outcome of checking one packet's sequence number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuity {
    /// First packet seen for the stream
    Fresh,
    /// Sequence number is the expected successor
    Continues,
    /// Packets were lost between the previous one and this one
    Discontinuity { expected: u8, received: u8 },
}

impl Continuity {
    /// Whether the packet must begin a new segment
    pub fn starts_new_segment(self) -> bool {
        !matches!(self, Continuity::Continues)
    }

    pub fn is_discontinuity(self) -> bool {
        matches!(self, Continuity::Discontinuity { .. })
    }
}

/// Validates that each stream's sequence numbers advance by one modulo the
/// wraparound
#[derive(Debug, Clone)]
pub struct ContinuityTracker {
    modulus: u16,
    last_seen: [Option<u8>; SignalKind::ALL.len()],
}

impl Default for ContinuityTracker {
    fn default() -> Self {
        Self::new(256)
    }
}

impl ContinuityTracker {
    /// `modulus` is the counter wraparound, at most 256
    pub fn new(modulus: u16) -> Self {
        Self { modulus: modulus.clamp(1, 256), last_seen: [None; SignalKind::ALL.len()] }
    }

    pub fn check(&mut self, packet: &SignalPacket) -> Continuity {
        self.observe(packet.kind, packet.sequence_number)
    }

    /// Record `received` as the latest sequence number of `kind`
    pub fn observe(&mut self, kind: SignalKind, received: u8) -> Continuity {
        let slot = &mut self.last_seen[kind.index()];
        let previous = slot.replace(received);

        let Some(last) = previous else {
            return Continuity::Fresh;
        };

        let expected = ((u16::from(last) + 1) % self.modulus) as u8;
        if received == expected {
            Continuity::Continues
        } else {
            warn!(
                stream = kind.name(),
                expected, received, "Sequence discontinuity, starting new segment"
            );
            Continuity::Discontinuity { expected, received }
        }
    }

    /// Last sequence number seen for `kind`
    pub fn last_seen(&self, kind: SignalKind) -> Option<u8> {
        self.last_seen[kind.index()]
    }
}
