//! Packed sub-byte integer decoding

/// Decode consecutive `width`-bit little-endian fields packed back to back
///
/// Value `i` starts at bit `i * width`. It is read from the 16-bit
/// little-endian window formed by the byte holding that bit and the byte
/// after it, shifted down and masked to `width` bits. With
/// `twos_complement`, values with the top bit set are sign-extended.
///
/// `floor(bytes.len() * 8 / width)` values are returned. A window reaching
/// past the end of the input reads the missing byte as zero, so the final
/// value is only meaningful when the caller supplied its trailing byte.
///
/// # Panics
///
/// Panics if `width` is not in `1..=16`.
pub fn unpack_bits(bytes: &[u8], width: u32, twos_complement: bool) -> Vec<i32> {
    assert!((1..=16).contains(&width), "bit width {} out of range 1..=16", width);

    let count = bytes.len() * 8 / width as usize;
    let mask = ((1u32 << width) - 1) as u16;
    let sign_bit = 1i32 << (width - 1);

    (0..count)
        .map(|i| {
            let bit_offset = i * width as usize;
            let byte_index = bit_offset / 8;
            let shift = bit_offset % 8;

            let low = bytes[byte_index];
            let high = bytes.get(byte_index + 1).copied().unwrap_or(0);
            let word = u16::from_le_bytes([low, high]);

            // a 16-bit window shifted by up to 7 bits holds at least 9 bits;
            // wider fields at an odd shift pull the remainder from the next byte
            let mut raw = u32::from(word >> shift);
            let available = 16 - shift as u32;
            if available < width {
                let extra = bytes.get(byte_index + 2).copied().unwrap_or(0);
                raw |= u32::from(extra) << available;
            }

            let value = (raw as u16 & mask) as i32;
            if twos_complement && value >= sign_bit { value - (1 << width) } else { value }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::pack_bits;
    use proptest::prelude::*;

    #[test]
    fn ten_bit_unsigned_first_value() {
        assert_eq!(unpack_bits(&[0x00, 0x02], 10, false), vec![512]);
    }

    #[test]
    fn sixteen_bit_twos_complement_minus_one() {
        assert_eq!(unpack_bits(&[0xFF, 0xFF], 16, true), vec![-1]);
        assert_eq!(unpack_bits(&[0xFF, 0xFF], 16, false), vec![65535]);
    }

    #[test]
    fn ten_bit_values_across_byte_boundaries() {
        // 1, 2, 3, 1023 packed LSB-first
        let packed = pack_bits(&[1, 2, 3, 1023], 10);
        assert_eq!(packed.len(), 5);
        assert_eq!(unpack_bits(&packed, 10, false), vec![1, 2, 3, 1023]);
    }

    #[test]
    fn value_count_is_floor_of_total_bits() {
        assert_eq!(unpack_bits(&[0u8; 23], 10, false).len(), 18);
        assert_eq!(unpack_bits(&[0u8; 79], 10, false).len(), 63);
        assert_eq!(unpack_bits(&[0u8; 1], 10, false).len(), 0);
        assert!(unpack_bits(&[], 16, true).is_empty());
    }

    #[test]
    fn twos_complement_ten_bit() {
        let packed = pack_bits(&[0x200, 0x3FF, 0x1FF], 10);
        assert_eq!(unpack_bits(&packed, 10, true), vec![-512, -1, 511]);
    }

    #[test]
    #[should_panic]
    fn zero_width_panics() {
        unpack_bits(&[1, 2, 3], 0, false);
    }

    proptest! {
        #[test]
        fn unpacks_what_was_packed(
            width in 1u32..=16,
            seed in prop::collection::vec(any::<u16>(), 0..64)
        ) {
            let mask = ((1u32 << width) - 1) as u16;
            let values: Vec<u16> = seed.iter().map(|v| v & mask).collect();
            let packed = pack_bits(&values, width);
            let unpacked = unpack_bits(&packed, width, false);

            prop_assert!(unpacked.len() >= values.len());
            for (expected, got) in values.iter().zip(unpacked.iter()) {
                prop_assert_eq!(i32::from(*expected), *got);
            }
        }
    }
}
