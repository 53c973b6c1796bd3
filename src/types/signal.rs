//! Signal packet types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Waveform channels of the BioHarness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Breathing,
    Ecg,
    Rr,
    Acceleration,
}

impl SignalKind {
    pub const ALL: [SignalKind; 4] =
        [SignalKind::Breathing, SignalKind::Ecg, SignalKind::Rr, SignalKind::Acceleration];

    /// Fixed sampling rate of the channel in Hz
    pub fn samplerate(self) -> f64 {
        match self {
            SignalKind::Breathing | SignalKind::Rr => 18.0,
            SignalKind::Ecg => 250.0,
            SignalKind::Acceleration => 50.0,
        }
    }

    /// Stream name used by the history store and playback consumers
    pub fn name(self) -> &'static str {
        match self {
            SignalKind::Breathing => "breathing",
            SignalKind::Ecg => "ecg",
            SignalKind::Rr => "rr",
            SignalKind::Acceleration => "acceleration",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    pub(crate) fn index(self) -> usize {
        match self {
            SignalKind::Breathing => 0,
            SignalKind::Ecg => 1,
            SignalKind::Rr => 2,
            SignalKind::Acceleration => 3,
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One sample: a scalar, or an (x, y, z) acceleration vector in g
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SampleValue {
    Scalar(f64),
    Vector([f64; 3]),
}

impl SampleValue {
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            SampleValue::Scalar(v) => Some(*v),
            SampleValue::Vector(_) => None,
        }
    }
}

/// A decoded waveform chunk as sent by the device
#[derive(Debug, Clone, PartialEq)]
pub struct SignalPacket {
    pub kind: SignalKind,
    /// Device-clock time of the first sample, seconds since the Unix epoch
    pub timestamp: f64,
    pub samplerate: f64,
    pub samples: Vec<SampleValue>,
    pub sequence_number: u8,
}

impl SignalPacket {
    pub fn new(kind: SignalKind, timestamp: f64, samples: Vec<SampleValue>, sequence_number: u8) -> Self {
        Self { kind, timestamp, samplerate: kind.samplerate(), samples, sequence_number }
    }

    /// Copy of this packet re-timed to start at `timestamp`
    pub fn with_timestamp(&self, timestamp: f64) -> Self {
        Self { timestamp, ..self.clone() }
    }

    /// Time of the last sample (equal to `timestamp` for empty packets)
    pub fn last_sample_timestamp(&self) -> f64 {
        let intervals = self.samples.len().saturating_sub(1) as f64;
        self.timestamp + intervals / self.samplerate
    }

    /// Time of sample `index` within the packet
    pub fn sample_timestamp(&self, index: usize) -> f64 {
        self.timestamp + index as f64 / self.samplerate
    }
}

/// A sample or event read back from the history, with its stable position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StreamSample {
    /// Global index within the stream, unaffected by eviction
    pub index: u64,
    pub timestamp: f64,
    pub value: SampleValue,
}
