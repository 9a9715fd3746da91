//! Morton (bit-interleaved) codes of the Brotli encoding.
//!
//! A 64-bit code interleaves three 16-bit values, bit `i` of the first at
//! bit `3i`, of the second at `3i + 1` and of the third at `3i + 2`. Only the
//! low 48 bits are used. Positions use two codes, the first eight bytes
//! holding bits 16..32 and the last eight bits 0..16.

use byteorder::{ByteOrder, LittleEndian};

/// Compacts every third bit of the low 24 bits of `morton` into 8 bits.
pub fn dealign_24b(mut morton: u32) -> u32 {
    morton &= 0x0024_9249; // bits 0, 3, 6, .., 21

    morton = (morton | (morton >> 2)) & 0x030c30c3;
    morton = (morton | (morton >> 4)) & 0x0300f00f;
    morton = (morton | (morton >> 8)) & 0x030000ff;
    morton = (morton | (morton >> 16)) & 0x000003ff;

    morton
}

/// Splits one 64-bit code, given as its high (`mc_0`) and low (`mc_1`)
/// words, into three 16-bit values.
pub fn decode_morton_64(mc_0: u32, mc_1: u32) -> (u32, u32, u32) {
    let low = mc_1 & 0x00FFFFFF;
    let high = (mc_1 >> 24) | (mc_0 << 8);

    let a = dealign_24b(low) | (dealign_24b(high) << 8);
    let b = dealign_24b(low >> 1) | (dealign_24b(high >> 1) << 8);
    let c = dealign_24b(low >> 2) | (dealign_24b(high >> 2) << 8);

    (a, b, c)
}

/// Splits a pair of 64-bit codes into three 32-bit values. `mc_0`/`mc_1`
/// are the high and low words of the code carrying the upper 16 bits,
/// `mc_2`/`mc_3` those of the code carrying the lower 16 bits.
pub fn decode_morton_128(mc_0: u32, mc_1: u32, mc_2: u32, mc_3: u32) -> (u32, u32, u32) {
    let (mut x, mut y, mut z) = decode_morton_64(mc_2, mc_3);

    // upper code only matters for values wider than 16 bits
    if mc_0 != 0 || mc_1 != 0 {
        let (hx, hy, hz) = decode_morton_64(mc_0, mc_1);
        x |= hx << 16;
        y |= hy << 16;
        z |= hz << 16;
    }

    (x, y, z)
}

/// Reads an 8-byte color code.
pub fn decode_color(bytes: &[u8]) -> (u32, u32, u32) {
    let mc_0 = LittleEndian::read_u32(&bytes[4..8]);
    let mc_1 = LittleEndian::read_u32(&bytes[0..4]);

    decode_morton_64(mc_0, mc_1)
}

/// Reads a 16-byte position code.
pub fn decode_position(bytes: &[u8]) -> (u32, u32, u32) {
    let mc_0 = LittleEndian::read_u32(&bytes[4..8]);
    let mc_1 = LittleEndian::read_u32(&bytes[0..4]);
    let mc_2 = LittleEndian::read_u32(&bytes[12..16]);
    let mc_3 = LittleEndian::read_u32(&bytes[8..12]);

    decode_morton_128(mc_0, mc_1, mc_2, mc_3)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use proptest::prelude::*;

    fn spread(v: u32) -> u64 {
        (0..16).fold(0u64, |acc, bit| acc | ((((v >> bit) & 1) as u64) << (3 * bit)))
    }

    fn interleave_16(a: u32, b: u32, c: u32) -> u64 {
        spread(a & 0xffff) | (spread(b & 0xffff) << 1) | (spread(c & 0xffff) << 2)
    }

    /// 16-byte position code for `(x, y, z)`.
    pub(crate) fn encode_position(x: u32, y: u32, z: u32) -> [u8; 16] {
        let high = interleave_16(x >> 16, y >> 16, z >> 16);
        let low = interleave_16(x, y, z);
        let mut bytes = [0u8; 16];
        bytes[..8].copy_from_slice(&high.to_le_bytes());
        bytes[8..].copy_from_slice(&low.to_le_bytes());
        bytes
    }

    /// 8-byte color code for `(r, g, b)`, 16 bits each.
    pub(crate) fn encode_color(r: u16, g: u16, b: u16) -> [u8; 8] {
        interleave_16(r as u32, g as u32, b as u32).to_le_bytes()
    }

    #[test]
    fn dealign_keeps_every_third_bit() {
        assert_eq!(dealign_24b(0b001_001_001), 0b111);
        assert_eq!(dealign_24b(0b110_110_110), 0);
        assert_eq!(dealign_24b(0x0024_9249), 0xff);
        // bits above 24 belong to the next group
        assert_eq!(dealign_24b(0xff00_0000), 0);
    }

    #[test]
    fn decodes_known_code() {
        // x = 1, y = 2, z = 3 -> bits 0 (x0), 4 (y1), 2 (z0), 5 (z1)
        assert_eq!(decode_morton_64(0, 0b11_0101), (1, 2, 3));
    }

    #[test]
    fn wide_values_use_the_upper_code() {
        let bytes = encode_position(0x0001_0000, 0x00ab_cdef, 0xffff_ffff);
        assert_eq!(decode_position(&bytes), (0x0001_0000, 0x00ab_cdef, 0xffff_ffff));
    }

    proptest! {
        #[test]
        fn position_round_trip_21_bits(x in 0u32..(1 << 21), y in 0u32..(1 << 21), z in 0u32..(1 << 21)) {
            prop_assert_eq!(decode_position(&encode_position(x, y, z)), (x, y, z));
        }

        #[test]
        fn position_round_trip_32_bits(x: u32, y: u32, z: u32) {
            prop_assert_eq!(decode_position(&encode_position(x, y, z)), (x, y, z));
        }

        #[test]
        fn color_round_trip(r: u16, g: u16, b: u16) {
            prop_assert_eq!(decode_color(&encode_color(r, g, b)), (r as u32, g as u32, b as u32));
        }
    }
}
