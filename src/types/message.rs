//! Decoded device messages

use serde::{Deserialize, Serialize};

use super::SignalPacket;

/// Once-per-interval scalar snapshot from the BioHarness
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryMessage {
    pub sequence_number: u8,
    /// Device-clock time, seconds since the Unix epoch
    pub timestamp: f64,
    /// Beats per minute
    pub heart_rate: u16,
    /// Breaths per minute
    pub respiration_rate: f64,
    /// Degrees Celsius
    pub skin_temperature: f64,
    /// Degrees from vertical
    pub posture: u16,
    /// Vector magnitude units (g)
    pub activity: f64,
    /// g
    pub peak_acceleration: f64,
    pub breathing_wave_amplitude: u16,
    /// Percent
    pub breathing_confidence: u8,
    /// Percent
    pub heart_rate_confidence: u8,
}

/// Heart rate monitor message from the HxM strap
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HxMMessage {
    pub heart_rate: u8,
    /// Beat counter, wraps at 256
    pub heartbeat_number: u8,
    /// Beat times in ms modulo 65536, oldest first
    pub heartbeat_milliseconds: [u16; 15],
    /// Metres
    pub distance: f64,
    /// Metres per second
    pub speed: f64,
    pub strides: u16,
}

/// Any message the engine understands
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Summary(SummaryMessage),
    Signal(SignalPacket),
    HxM(HxMMessage),
}
