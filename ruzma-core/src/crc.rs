//! CRC-32 lookup table (IEEE 802.3 polynomial, reflected).
//!
//! The LZMA BT4 match finder hashes window bytes through this table to
//! decorrelate its 2/3/4-byte hash heads. The table is generated at compile
//! time from the reflected polynomial `0xEDB88320`.

/// CRC-32 table for byte-at-a-time processing.
pub const CRC32_TABLE: [u32; 256] = {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut j = 0;
        while j < 8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ 0xEDB8_8320
            } else {
                crc >> 1
            };
            j += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_known_entries() {
        assert_eq!(CRC32_TABLE[0], 0x0000_0000);
        assert_eq!(CRC32_TABLE[1], 0x7707_3096);
        assert_eq!(CRC32_TABLE[2], 0xEE0E_612C);
        assert_eq!(CRC32_TABLE[255], 0x2D02_EF8D);
    }

    #[test]
    fn test_table_matches_bitwise_computation() {
        for i in 0..256u32 {
            let mut crc = i;
            for _ in 0..8 {
                crc = if crc & 1 != 0 {
                    (crc >> 1) ^ 0xEDB8_8320
                } else {
                    crc >> 1
                };
            }
            assert_eq!(CRC32_TABLE[i as usize], crc);
        }
    }
}
