//! Outgoing device configuration frames

use super::frame::encode_frame;
use crate::Result;

/// Configuration messages sent to the BioHarness when a session starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCommand {
    EnableBreathingWaveform,
    EnableEcgWaveform,
    EnableRrData,
    EnableAccelerometerWaveform,
    /// Summary packets once per second
    SummaryIntervalOneSecond,
}

impl DeviceCommand {
    /// Every command needed to receive all periodic packets
    pub const PERIODIC_PACKETS: [DeviceCommand; 5] = [
        DeviceCommand::EnableEcgWaveform,
        DeviceCommand::EnableBreathingWaveform,
        DeviceCommand::EnableRrData,
        DeviceCommand::EnableAccelerometerWaveform,
        DeviceCommand::SummaryIntervalOneSecond,
    ];

    pub fn message_id(self) -> u8 {
        match self {
            DeviceCommand::EnableBreathingWaveform => 0x15,
            DeviceCommand::EnableEcgWaveform => 0x16,
            DeviceCommand::EnableRrData => 0x19,
            DeviceCommand::EnableAccelerometerWaveform => 0x1E,
            DeviceCommand::SummaryIntervalOneSecond => 0xBD,
        }
    }

    pub fn payload(self) -> &'static [u8] {
        match self {
            DeviceCommand::SummaryIntervalOneSecond => &[1, 0],
            _ => &[1],
        }
    }

    /// Wire bytes of this command
    pub fn encode(self) -> Result<Vec<u8>> {
        encode_frame(self.message_id(), self.payload())
    }
}
