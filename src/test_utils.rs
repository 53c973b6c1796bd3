//! Fixture builders for tests and benchmarks
//!
//! Produces wire-accurate payloads and frames so codec, pipeline and
//! end-to-end tests can synthesize device traffic without capture files.

#![cfg(any(test, feature = "benchmark"))]

use chrono::NaiveDate;

use crate::protocol::{encode_frame, frame::MAX_PAYLOAD_LEN};

/// Pack values LSB-first into `width`-bit fields, the inverse of
/// [`unpack_bits`](crate::protocol::unpack_bits)
pub fn pack_bits(values: &[u16], width: u32) -> Vec<u8> {
    let width = width as usize;
    let total_bits = values.len() * width;
    let mut bytes = vec![0u8; total_bits.div_ceil(8)];

    for (i, &value) in values.iter().enumerate() {
        for bit in 0..width {
            if (value >> bit) & 1 == 1 {
                let position = i * width + bit;
                bytes[position / 8] |= 1 << (position % 8);
            }
        }
    }
    bytes
}

/// Calendar timestamp as carried in signal and summary headers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub millis_of_day: u32,
}

impl DeviceTime {
    pub fn new(year: u16, month: u8, day: u8, millis_of_day: u32) -> Self {
        Self { year, month, day, millis_of_day }
    }

    pub fn unix_seconds(&self) -> f64 {
        let date = NaiveDate::from_ymd_opt(self.year.into(), self.month.into(), self.day.into())
            .expect("valid fixture date");
        let midnight = date.and_hms_opt(0, 0, 0).expect("midnight").and_utc().timestamp();
        midnight as f64 + f64::from(self.millis_of_day) / 1000.0
    }

    /// Nine byte header: sequence number followed by the timestamp
    pub fn header(&self, sequence: u8) -> Vec<u8> {
        let mut bytes = vec![sequence];
        bytes.extend(self.year.to_le_bytes());
        bytes.push(self.month);
        bytes.push(self.day);
        bytes.extend(self.millis_of_day.to_le_bytes());
        bytes
    }
}

/// Breathing payload from raw (unsigned, offset 512) 10-bit samples
pub fn breathing_payload(sequence: u8, time: DeviceTime, raw: &[u16]) -> Vec<u8> {
    let mut payload = time.header(sequence);
    payload.extend(pack_bits(raw, 10));
    payload
}

/// ECG payload from raw 10-bit samples
pub fn ecg_payload(sequence: u8, time: DeviceTime, raw: &[u16]) -> Vec<u8> {
    breathing_payload(sequence, time, raw)
}

/// RR payload from signed millisecond values
pub fn rr_payload(sequence: u8, time: DeviceTime, millis: &[i16]) -> Vec<u8> {
    let mut payload = time.header(sequence);
    for value in millis {
        payload.extend(value.to_le_bytes());
    }
    payload
}

/// Acceleration payload from interleaved raw x, y, z 10-bit samples
pub fn acceleration_payload(sequence: u8, time: DeviceTime, raw: &[u16]) -> Vec<u8> {
    breathing_payload(sequence, time, raw)
}

/// 35 byte summary payload
#[allow(clippy::too_many_arguments)]
pub fn summary_payload(
    sequence: u8,
    time: DeviceTime,
    heart_rate: u16,
    respiration_rate_tenths: u16,
    skin_temperature_tenths: u16,
    posture: u16,
    activity_hundredths: u16,
    peak_acceleration_hundredths: u16,
    breathing_wave_amplitude: u16,
    breathing_confidence: u8,
    heart_rate_confidence: u8,
) -> Vec<u8> {
    let mut payload = time.header(sequence);
    payload.resize(35, 0);
    let mut put = |offset: usize, value: u16| {
        payload[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
    };
    put(10, heart_rate);
    put(12, respiration_rate_tenths);
    put(14, skin_temperature_tenths);
    put(16, posture);
    put(18, activity_hundredths);
    put(20, peak_acceleration_hundredths);
    put(25, breathing_wave_amplitude);
    payload[29] = breathing_confidence;
    payload[34] = heart_rate_confidence;
    payload
}

/// 55 byte HxM payload; `beats` are oldest first
pub fn hxm_payload(
    heart_rate: u8,
    heartbeat_number: u8,
    beats: [u16; 15],
    distance_sixteenths: u16,
    speed_256ths: u16,
    strides: u16,
) -> Vec<u8> {
    let mut payload = vec![0u8; 55];
    payload[9] = heart_rate;
    payload[10] = heartbeat_number;
    for (i, beat) in beats.iter().enumerate() {
        payload[11 + 2 * i..13 + 2 * i].copy_from_slice(&beat.to_le_bytes());
    }
    payload[47..49].copy_from_slice(&distance_sixteenths.to_le_bytes());
    payload[49..51].copy_from_slice(&speed_256ths.to_le_bytes());
    payload[51..53].copy_from_slice(&strides.to_le_bytes());
    payload
}

/// HxM beat history for a strap whose beat `number` happened at `beat_millis(number)`
///
/// Slots hold the 15 most recent beats ending at `latest`, oldest first.
pub fn hxm_beats(latest: u64, beat_millis: impl Fn(u64) -> u64) -> [u16; 15] {
    std::array::from_fn(|slot| {
        let beat = (latest + slot as u64).saturating_sub(14);
        (beat_millis(beat) % 65_536) as u16
    })
}

/// Wire bytes of a frame built from a fixture payload
pub fn frame_bytes(message_id: u8, payload: &[u8]) -> Vec<u8> {
    assert!(payload.len() <= MAX_PAYLOAD_LEN, "fixture payload too long");
    encode_frame(message_id, payload).expect("fixture payload fits in a frame")
}
