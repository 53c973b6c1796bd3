//! Frame checksum

/// Reflected CRC-8 (polynomial 0x8C after each right shift) over a frame payload
///
/// The checksum covers the payload bytes only, never the STX, id, length or
/// terminator bytes.
pub fn crc8(bytes: &[u8]) -> u8 {
    let mut crc = 0u8;
    for &byte in bytes {
        crc ^= byte;
        for _ in 0..8 {
            crc = if crc & 1 != 0 { (crc >> 1) ^ 0x8C } else { crc >> 1 };
        }
    }
    crc
}
