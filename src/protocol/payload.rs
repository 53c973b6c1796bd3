//! Per-message payload codecs
//!
//! Dispatch is a closed set of known message ids ([`MessageId`]); frames
//! with any other id decode to `None` and are ignored, since devices emit
//! vendor and info frames the engine has no use for.
//!
//! Signal payload header (ids 0x21, 0x22, 0x24, 0x25):
//!
//! ```text
//! [0] sequence | [1..3] year LE | [3] month | [4] day | [5..9] ms of day LE | [9..] packed samples
//! ```

use chrono::NaiveDate;

use super::bits::unpack_bits;
use super::frame::Frame;
use crate::types::{HxMMessage, Message, SampleValue, SignalKind, SignalPacket, SummaryMessage};
use crate::{HarnessError, Result};

const SIGNAL_HEADER_LEN: usize = 9;
const SUMMARY_MIN_LEN: usize = 35;
const HXM_MIN_LEN: usize = 53;

/// Raw 10-bit samples are centred on this value
const TEN_BIT_OFFSET: i32 = 512;
/// Accelerometer counts per g
const ACCELERATION_SCALE: f64 = 20.75;

/// Message ids with a known payload layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageId {
    Breathing,
    Ecg,
    Rr,
    Acceleration,
    HxM,
    Summary,
}

impl MessageId {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x21 => Some(MessageId::Breathing),
            0x22 => Some(MessageId::Ecg),
            0x24 => Some(MessageId::Rr),
            0x25 => Some(MessageId::Acceleration),
            0x26 => Some(MessageId::HxM),
            0x2B => Some(MessageId::Summary),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            MessageId::Breathing => 0x21,
            MessageId::Ecg => 0x22,
            MessageId::Rr => 0x24,
            MessageId::Acceleration => 0x25,
            MessageId::HxM => 0x26,
            MessageId::Summary => 0x2B,
        }
    }
}

impl Message {
    /// Decode a validated frame
    ///
    /// Returns `Ok(None)` for unrecognized ids. A payload too short for its
    /// id, or carrying an impossible date, is a [`HarnessError::Decode`].
    pub fn decode(frame: &Frame) -> Result<Option<Message>> {
        let Some(id) = MessageId::from_byte(frame.message_id) else {
            return Ok(None);
        };
        let payload = &frame.payload[..];

        let message = match id {
            MessageId::Breathing => {
                Message::Signal(decode_ten_bit_signal(id, SignalKind::Breathing, payload)?)
            }
            MessageId::Ecg => Message::Signal(decode_ten_bit_signal(id, SignalKind::Ecg, payload)?),
            MessageId::Rr => Message::Signal(decode_rr(payload)?),
            MessageId::Acceleration => Message::Signal(decode_acceleration(payload)?),
            MessageId::HxM => Message::HxM(decode_hxm(payload)?),
            MessageId::Summary => Message::Summary(decode_summary(payload)?),
        };
        Ok(Some(message))
    }
}

fn require_len(id: MessageId, payload: &[u8], min: usize) -> Result<()> {
    if payload.len() < min {
        return Err(HarnessError::decode_error(
            id.as_byte(),
            format!("payload has {} bytes, at least {} required", payload.len(), min),
        ));
    }
    Ok(())
}

fn u16_at(payload: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([payload[offset], payload[offset + 1]])
}

/// Device calendar timestamp at `payload[1..9]`, as Unix seconds (UTC)
fn decode_timestamp(id: MessageId, payload: &[u8]) -> Result<f64> {
    let year = u16_at(payload, 1);
    let month = payload[3];
    let day = payload[4];
    let millis = u32::from_le_bytes([payload[5], payload[6], payload[7], payload[8]]);

    let date = NaiveDate::from_ymd_opt(i32::from(year), u32::from(month), u32::from(day))
        .ok_or_else(|| {
            HarnessError::decode_error(
                id.as_byte(),
                format!("invalid date {:04}-{:02}-{:02}", year, month, day),
            )
        })?;
    let midnight = date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc().timestamp()).ok_or_else(|| {
        HarnessError::decode_error(id.as_byte(), "date has no midnight".to_string())
    })?;

    Ok(midnight as f64 + f64::from(millis) / 1000.0)
}

fn decode_header(id: MessageId, payload: &[u8]) -> Result<(u8, f64)> {
    require_len(id, payload, SIGNAL_HEADER_LEN)?;
    Ok((payload[0], decode_timestamp(id, payload)?))
}

fn decode_ten_bit_signal(id: MessageId, kind: SignalKind, payload: &[u8]) -> Result<SignalPacket> {
    let (sequence, timestamp) = decode_header(id, payload)?;
    let samples = unpack_bits(&payload[SIGNAL_HEADER_LEN..], 10, false)
        .into_iter()
        .map(|raw| SampleValue::Scalar(f64::from(raw - TEN_BIT_OFFSET)))
        .collect();
    Ok(SignalPacket::new(kind, timestamp, samples, sequence))
}

fn decode_rr(payload: &[u8]) -> Result<SignalPacket> {
    let (sequence, timestamp) = decode_header(MessageId::Rr, payload)?;
    let samples = unpack_bits(&payload[SIGNAL_HEADER_LEN..], 16, true)
        .into_iter()
        .map(|raw| SampleValue::Scalar(f64::from(raw) / 1000.0))
        .collect();
    Ok(SignalPacket::new(SignalKind::Rr, timestamp, samples, sequence))
}

fn decode_acceleration(payload: &[u8]) -> Result<SignalPacket> {
    let (sequence, timestamp) = decode_header(MessageId::Acceleration, payload)?;
    let values: Vec<f64> = unpack_bits(&payload[SIGNAL_HEADER_LEN..], 10, false)
        .into_iter()
        .map(|raw| f64::from(raw - TEN_BIT_OFFSET) / ACCELERATION_SCALE)
        .collect();

    // x, y, z interleaved; a trailing partial triple is dropped
    let samples = values
        .chunks_exact(3)
        .map(|xyz| SampleValue::Vector([xyz[0], xyz[1], xyz[2]]))
        .collect();
    Ok(SignalPacket::new(SignalKind::Acceleration, timestamp, samples, sequence))
}

fn decode_summary(payload: &[u8]) -> Result<SummaryMessage> {
    let id = MessageId::Summary;
    require_len(id, payload, SUMMARY_MIN_LEN)?;
    let timestamp = decode_timestamp(id, payload)?;

    Ok(SummaryMessage {
        sequence_number: payload[0],
        timestamp,
        heart_rate: u16_at(payload, 10),
        respiration_rate: f64::from(u16_at(payload, 12)) * 0.1,
        skin_temperature: f64::from(u16_at(payload, 14)) * 0.1,
        posture: u16_at(payload, 16),
        activity: f64::from(u16_at(payload, 18)) * 0.01,
        peak_acceleration: f64::from(u16_at(payload, 20)) * 0.01,
        breathing_wave_amplitude: u16_at(payload, 25),
        breathing_confidence: payload[29],
        heart_rate_confidence: payload[34],
    })
}

fn decode_hxm(payload: &[u8]) -> Result<HxMMessage> {
    require_len(MessageId::HxM, payload, HXM_MIN_LEN)?;

    let mut heartbeat_milliseconds = [0u16; 15];
    for (i, slot) in heartbeat_milliseconds.iter_mut().enumerate() {
        *slot = u16_at(payload, 11 + 2 * i);
    }

    Ok(HxMMessage {
        heart_rate: payload[9],
        heartbeat_number: payload[10],
        heartbeat_milliseconds,
        distance: f64::from(u16_at(payload, 47)) / 16.0,
        speed: f64::from(u16_at(payload, 49)) / 256.0,
        strides: u16_at(payload, 51),
    })
}
