//! Wire protocol: checksum, bit packing, framing and payload codecs.
//!
//! Bytes flow through [`FrameParser`] into checksum-validated [`Frame`]s,
//! which [`Message::decode`](crate::types::Message::decode) turns into typed
//! messages. [`DeviceCommand`] builds the outgoing configuration frames.

pub mod bits;
pub mod commands;
pub mod crc;
pub mod frame;
pub mod payload;

pub use bits::unpack_bits;
pub use commands::DeviceCommand;
pub use crc::crc8;
pub use frame::{Frame, FrameParser, FramingStats, Terminator, encode_frame};
pub use payload::MessageId;
