//! Byte-stream framing
//!
//! Wire layout of one frame:
//!
//! ```text
//! STX(0x02) | id | length (0..=128) | payload[length] | crc8(payload) | ETX(0x03) / ACK(0x06) / NAK(0x15)
//! ```
//!
//! [`FrameParser`] consumes bytes one at a time and resynchronizes on the
//! next STX after any error. There is no resend mechanism on the link, so a
//! single corrupted byte costs the whole frame it belongs to.

use std::sync::Arc;
use tracing::{trace, warn};

use super::crc::crc8;
use crate::{FramingError, HarnessError, Result};

pub const STX: u8 = 0x02;
pub const ETX: u8 = 0x03;
pub const ACK: u8 = 0x06;
pub const NAK: u8 = 0x15;

/// Largest payload a frame can carry
pub const MAX_PAYLOAD_LEN: usize = 128;

/// End-of-message status byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminator {
    Etx,
    Ack,
    Nak,
}

impl Terminator {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            ETX => Some(Terminator::Etx),
            ACK => Some(Terminator::Ack),
            NAK => Some(Terminator::Nak),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            Terminator::Etx => ETX,
            Terminator::Ack => ACK,
            Terminator::Nak => NAK,
        }
    }
}

/// A checksum-validated protocol message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub message_id: u8,
    pub payload: Arc<[u8]>,
    pub terminator: Terminator,
}

impl Frame {
    pub fn new(message_id: u8, payload: Vec<u8>, terminator: Terminator) -> Self {
        Self { message_id, payload: payload.into(), terminator }
    }
}

/// Build the wire bytes of an outgoing ETX-terminated frame
pub fn encode_frame(message_id: u8, payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(HarnessError::PayloadTooLong { length: payload.len() });
    }

    let mut bytes = Vec::with_capacity(payload.len() + 5);
    bytes.push(STX);
    bytes.push(message_id);
    bytes.push(payload.len() as u8);
    bytes.extend_from_slice(payload);
    bytes.push(crc8(payload));
    bytes.push(ETX);
    Ok(bytes)
}

#[derive(Debug)]
enum State {
    SeekStart,
    ReadId,
    ReadLength { message_id: u8 },
    ReadPayload { message_id: u8, length: usize, payload: Vec<u8> },
    ReadChecksum { message_id: u8, payload: Vec<u8> },
    ReadTerminator { message_id: u8, payload: Vec<u8> },
}

/// Counters kept by a [`FrameParser`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FramingStats {
    pub bytes: u64,
    pub frames: u64,
    pub errors: u64,
}

/// Single-threaded, byte-at-a-time frame recognizer
#[derive(Debug)]
pub struct FrameParser {
    state: State,
    stats: FramingStats,
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameParser {
    pub fn new() -> Self {
        Self { state: State::SeekStart, stats: FramingStats::default() }
    }

    pub fn stats(&self) -> FramingStats {
        self.stats
    }

    /// Whether the parser is between frames
    pub fn is_idle(&self) -> bool {
        matches!(self.state, State::SeekStart)
    }

    /// Advance the state machine by one byte
    ///
    /// Returns the completed frame when `byte` was a valid terminator. On
    /// error the in-progress frame is dropped and the parser is back to
    /// seeking a start byte; the offending byte is consumed, not rescanned.
    pub fn push(&mut self, byte: u8) -> Result<Option<Frame>, FramingError> {
        let state = std::mem::replace(&mut self.state, State::SeekStart);

        self.state = match state {
            State::SeekStart => {
                if byte == STX {
                    State::ReadId
                } else {
                    State::SeekStart
                }
            }
            State::ReadId => State::ReadLength { message_id: byte },
            State::ReadLength { message_id } => {
                let length = byte as usize;
                if length > MAX_PAYLOAD_LEN {
                    return Err(FramingError::InvalidLength(byte));
                }
                if length == 0 {
                    State::ReadChecksum { message_id, payload: Vec::new() }
                } else {
                    State::ReadPayload { message_id, length, payload: Vec::with_capacity(length) }
                }
            }
            State::ReadPayload { message_id, length, mut payload } => {
                payload.push(byte);
                if payload.len() == length {
                    State::ReadChecksum { message_id, payload }
                } else {
                    State::ReadPayload { message_id, length, payload }
                }
            }
            State::ReadChecksum { message_id, payload } => {
                let expected = crc8(&payload);
                if byte != expected {
                    return Err(FramingError::ChecksumMismatch { expected, received: byte });
                }
                State::ReadTerminator { message_id, payload }
            }
            State::ReadTerminator { message_id, payload } => {
                let terminator =
                    Terminator::from_byte(byte).ok_or(FramingError::InvalidTerminator(byte))?;
                return Ok(Some(Frame::new(message_id, payload, terminator)));
            }
        };

        Ok(None)
    }

    /// Feed a chunk of bytes, handing every completed frame to `on_frame`
    ///
    /// Framing errors are logged and counted, never returned.
    pub fn feed<F>(&mut self, bytes: &[u8], mut on_frame: F) -> usize
    where
        F: FnMut(Frame),
    {
        let mut frames = 0;
        for &byte in bytes {
            self.stats.bytes += 1;
            match self.push(byte) {
                Ok(Some(frame)) => {
                    trace!(
                        "Frame id={:#04x} len={} terminator={:?}",
                        frame.message_id,
                        frame.payload.len(),
                        frame.terminator
                    );
                    self.stats.frames += 1;
                    frames += 1;
                    on_frame(frame);
                }
                Ok(None) => {}
                Err(e) => {
                    self.stats.errors += 1;
                    warn!("Framing error, resynchronizing: {}", e);
                }
            }
        }
        frames
    }
}
