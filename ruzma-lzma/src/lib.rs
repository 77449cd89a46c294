//! # Ruzma LZMA
//!
//! LZMA (Lempel-Ziv-Markov chain Algorithm) compression and decompression.
//!
//! LZMA is a lossless compression algorithm built on LZ77-style dictionary
//! matching and range coding. It is the method behind:
//! - 7-Zip archives (.7z)
//! - XZ compressed files (.xz)
//! - LZMA-compressed files (.lzma)
//! - Some ZIP archives (method 14)
//!
//! ## Features
//!
//! - **Pure Rust** implementation
//! - **Optimal parsing** encoder: a dynamic program over a price model
//!   chooses between literals, fresh matches, and repeated distances
//! - **Binary-tree match finders** (two- and four-byte hash heads)
//! - **Streaming decoder** with access to the decoded token stream
//!
//! ## Usage
//!
//! ```
//! use ruzma_lzma::{LzmaLevel, compress, decompress};
//!
//! let data = b"an example of an example of an example";
//! let packed = compress(data, LzmaLevel::DEFAULT).unwrap();
//! let unpacked = decompress(&packed).unwrap();
//! assert_eq!(unpacked, data);
//! ```
//!
//! ## LZMA Format
//!
//! A `.lzma` stream consists of:
//! 1. Properties byte (lc, lp, pb encoded)
//! 2. Dictionary size (4 bytes, little-endian)
//! 3. Uncompressed size (8 bytes, little-endian, `0xFFFFFFFFFFFFFFFF` =
//!    unknown, terminated by the end marker)
//! 4. Range-coded data
//!
//! The algorithm uses:
//! - LZ77-style dictionary compression with a sliding window
//! - Range coding for entropy encoding
//! - Context-dependent adaptive probability models

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod decoder;
pub mod encoder;
mod match_finder;
pub mod model;
mod optimal;
pub mod range_coder;

// Re-exports
pub use config::{EncoderConfig, MatchFinderKind};
pub use decoder::{DecodedToken, LzmaDecoder};
pub use encoder::LzmaEncoder;
pub use model::LzmaProperties;
pub use range_coder::{RangeDecoder, RangeEncoder};

use ruzma_core::error::Result;

/// LZMA compression level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LzmaLevel(u8);

impl LzmaLevel {
    /// Fastest compression (level 0).
    pub const FAST: Self = Self(0);
    /// Default compression (level 6).
    pub const DEFAULT: Self = Self(6);
    /// Best compression (level 9).
    pub const BEST: Self = Self(9);

    /// Create a new compression level.
    pub fn new(level: u8) -> Self {
        Self(level.min(9))
    }

    /// Get the level value.
    pub fn level(&self) -> u8 {
        self.0
    }

    /// Get the dictionary size for this level.
    pub fn dict_size(&self) -> u32 {
        match self.0 {
            0 => 1 << 16, // 64 KB
            1 => 1 << 18, // 256 KB
            2 => 1 << 19, // 512 KB
            3 => 1 << 20, // 1 MB
            4 => 1 << 21, // 2 MB
            5 => 1 << 22, // 4 MB
            6 => 1 << 23, // 8 MB
            7 => 1 << 24, // 16 MB
            8 => 1 << 25, // 32 MB
            _ => 1 << 26, // 64 MB
        }
    }

    /// Encoder configuration for this level: the dictionary from
    /// [`dict_size`](Self::dict_size), more fast bytes as the level rises,
    /// and the four-byte-hash match finder from level 2 up.
    pub fn config(&self) -> EncoderConfig {
        EncoderConfig {
            dict_size: self.dict_size(),
            fast_bytes: match self.0 {
                0..=2 => 16,
                3..=6 => 32,
                7..=8 => 64,
                _ => 128,
            },
            match_finder: if self.0 <= 1 {
                MatchFinderKind::Bt2
            } else {
                MatchFinderKind::Bt4
            },
            ..EncoderConfig::new()
        }
    }
}

impl Default for LzmaLevel {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Compress data to a `.lzma`-framed Vec at the given level.
///
/// The output carries the five-byte properties header and the uncompressed
/// size, so it decodes with [`decompress`] alone.
pub fn compress(data: &[u8], level: LzmaLevel) -> Result<Vec<u8>> {
    let mut config = level.config();
    // The window never needs to exceed the input; levels only set an upper
    // bound on it.
    if (data.len() as u64) < u64::from(config.dict_size) {
        config.dict_size = data.len().next_power_of_two().max(1 << 12) as u32;
    }
    compress_with(data, config)
}

/// Compress data to a `.lzma`-framed Vec with an explicit configuration.
///
/// The size field holds the input length, or `u64::MAX` when
/// [`end_marker`](EncoderConfig::end_marker) is set and the stream is
/// terminated in-band instead.
pub fn compress_with(data: &[u8], config: EncoderConfig) -> Result<Vec<u8>> {
    let mut encoder = LzmaEncoder::new(config)?;
    let mut out = Vec::new();
    encoder.write_properties(&mut out)?;
    let size = if config.end_marker {
        u64::MAX
    } else {
        data.len() as u64
    };
    out.extend_from_slice(&size.to_le_bytes());
    encoder.code(data, &mut out)?;
    Ok(out)
}

/// Decompress a `.lzma`-framed buffer to a Vec.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    LzmaDecoder::from_header(data)?.decode_to_end()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level() {
        assert_eq!(LzmaLevel::FAST.level(), 0);
        assert_eq!(LzmaLevel::DEFAULT.level(), 6);
        assert_eq!(LzmaLevel::BEST.level(), 9);
    }

    #[test]
    fn test_level_clamp() {
        assert_eq!(LzmaLevel::new(100).level(), 9);
    }

    #[test]
    fn test_dict_size() {
        assert_eq!(LzmaLevel::FAST.dict_size(), 1 << 16);
        assert_eq!(LzmaLevel::DEFAULT.dict_size(), 1 << 23);
        assert_eq!(LzmaLevel::BEST.dict_size(), 1 << 26);
    }

    #[test]
    fn test_level_config() {
        let fast = LzmaLevel::FAST.config();
        assert_eq!(fast.match_finder, MatchFinderKind::Bt2);
        assert_eq!(fast.fast_bytes, 16);

        let default = LzmaLevel::DEFAULT.config();
        assert_eq!(default.match_finder, MatchFinderKind::Bt4);
        assert_eq!(default.fast_bytes, 32);

        let best = LzmaLevel::BEST.config();
        assert_eq!(best.match_finder, MatchFinderKind::Bt4);
        assert_eq!(best.fast_bytes, 128);
        assert!(best.validate().is_ok());
    }

    #[test]
    fn test_properties_roundtrip() {
        let props = LzmaProperties::new(3, 0, 2).unwrap();
        let byte = props.to_byte();
        let decoded = LzmaProperties::from_byte(byte).unwrap();

        assert_eq!(decoded.lc, 3);
        assert_eq!(decoded.lp, 0);
        assert_eq!(decoded.pb, 2);
    }

    #[test]
    fn test_size_field_carries_input_length() {
        let compressed = compress(b"abc", LzmaLevel::DEFAULT).unwrap();
        assert_eq!(compressed[5..13], 3u64.to_le_bytes());
    }

    #[test]
    fn test_compress_decompress_empty() {
        let original: &[u8] = b"";
        let compressed = compress(original, LzmaLevel::DEFAULT).unwrap();
        let decompressed = decompress(&compressed).unwrap();
        assert_eq!(decompressed, original);
    }

    #[test]
    fn test_compress_decompress_single_byte() {
        let original = b"A";
        let compressed = compress(original, LzmaLevel::DEFAULT).unwrap();
        let decompressed = decompress(&compressed).unwrap();
        assert_eq!(decompressed, original);
    }

    #[test]
    fn test_compress_decompress_few_bytes() {
        let original = b"ABC";
        let compressed = compress(original, LzmaLevel::DEFAULT).unwrap();
        let decompressed = decompress(&compressed).unwrap();
        assert_eq!(decompressed, original);
    }

    #[test]
    fn test_compress_decompress_roundtrip() {
        let original = b"Hello, LZMA World! This is a test of compression and decompression.";
        let compressed = compress(original, LzmaLevel::DEFAULT).unwrap();
        let decompressed = decompress(&compressed).unwrap();
        assert_eq!(decompressed, original);
    }

    #[test]
    fn test_compress_decompress_repeated() {
        let original = vec![b'A'; 1000];
        let compressed = compress(&original, LzmaLevel::DEFAULT).unwrap();
        assert!(compressed.len() < original.len());
        let decompressed = decompress(&compressed).unwrap();
        assert_eq!(decompressed, original);
    }

    #[test]
    fn test_compression_levels() {
        let data = b"Hello World! This is a test of LZMA compression with various levels.";

        for level in 0..=9 {
            let compressed = compress(data, LzmaLevel::new(level)).unwrap();
            let decompressed = decompress(&compressed).unwrap();
            assert_eq!(
                &decompressed[..],
                &data[..],
                "Level {} roundtrip failed",
                level
            );
        }
    }

    #[test]
    fn test_compress_with_end_marker() {
        let original = b"terminated in-band rather than by a declared size";
        let config = EncoderConfig {
            dict_size: 1 << 12,
            end_marker: true,
            ..EncoderConfig::new()
        };
        let compressed = compress_with(original, config).unwrap();
        assert_eq!(compressed[5..13], u64::MAX.to_le_bytes());
        let decompressed = decompress(&compressed).unwrap();
        assert_eq!(decompressed, original);
    }
}
