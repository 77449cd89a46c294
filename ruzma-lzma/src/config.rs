//! Encoder tunables and their fail-fast validation.

use ruzma_core::error::{Result, RuzmaError};

use crate::model::{LzmaProperties, MATCH_LEN_MAX};

/// Which match finder backs the encoder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MatchFinderKind {
    /// Binary tree over a direct 2-byte hash. Faster, finds fewer matches,
    /// and reports candidates from length 2 up.
    Bt2,
    /// Binary tree over CRC-mixed 2/3/4-byte hashes. The default; reports
    /// short hash-head candidates before the tree walk.
    #[default]
    Bt4,
}

impl MatchFinderKind {
    /// Parse the conventional `"BT2"`/`"BT4"` names.
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "BT2" | "bt2" => Ok(Self::Bt2),
            "BT4" | "bt4" => Ok(Self::Bt4),
            _ => Err(RuzmaError::invalid_parameter(
                "match_finder",
                format!("unknown match finder {name:?}, expected BT2 or BT4"),
            )),
        }
    }

    /// Canonical name of this finder.
    pub fn name(self) -> &'static str {
        match self {
            Self::Bt2 => "BT2",
            Self::Bt4 => "BT4",
        }
    }
}

/// Tunables for [`LzmaEncoder`](crate::LzmaEncoder).
///
/// Fields are plain and public; [`validate`](Self::validate) checks the whole
/// set at once and is called by the encoder constructor, so an invalid
/// configuration never encodes anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderConfig {
    /// Dictionary (history window) size in bytes,
    /// [`DICT_SIZE_MIN`](Self::DICT_SIZE_MIN)..=[`DICT_SIZE_MAX`](Self::DICT_SIZE_MAX).
    pub dict_size: u32,
    /// Match length that short-circuits the optimal parse,
    /// [`FAST_BYTES_MIN`](Self::FAST_BYTES_MIN)..=[`FAST_BYTES_MAX`](Self::FAST_BYTES_MAX).
    /// Higher values search harder and compress better.
    pub fast_bytes: u32,
    /// Literal context bits, `0..=8`.
    pub lc: u32,
    /// Literal position bits, `0..=4`.
    pub lp: u32,
    /// Position bits, `0..=4`.
    pub pb: u32,
    /// Match finder variant.
    pub match_finder: MatchFinderKind,
    /// Emit the end-of-stream marker after the last token. Required when the
    /// container does not record the uncompressed size.
    pub end_marker: bool,
}

impl EncoderConfig {
    /// Smallest accepted dictionary.
    pub const DICT_SIZE_MIN: u32 = 1;
    /// Largest accepted dictionary (1 GiB).
    pub const DICT_SIZE_MAX: u32 = 1 << 30;
    /// Smallest accepted fast-bytes threshold.
    pub const FAST_BYTES_MIN: u32 = 5;
    /// Largest accepted fast-bytes threshold (the longest encodable match).
    pub const FAST_BYTES_MAX: u32 = MATCH_LEN_MAX;

    /// The classic defaults: 4 MiB dictionary, 32 fast bytes, `lc=3` `lp=0`
    /// `pb=2`, BT4, no end marker.
    pub fn new() -> Self {
        Self {
            dict_size: 1 << 22,
            fast_bytes: 32,
            lc: 3,
            lp: 0,
            pb: 2,
            match_finder: MatchFinderKind::Bt4,
            end_marker: false,
        }
    }

    /// Check every field, naming the first offender.
    pub fn validate(&self) -> Result<()> {
        if self.dict_size < Self::DICT_SIZE_MIN || self.dict_size > Self::DICT_SIZE_MAX {
            return Err(RuzmaError::invalid_parameter(
                "dict_size",
                format!(
                    "must be in {}..={}, got {}",
                    Self::DICT_SIZE_MIN,
                    Self::DICT_SIZE_MAX,
                    self.dict_size
                ),
            ));
        }
        if self.fast_bytes < Self::FAST_BYTES_MIN || self.fast_bytes > Self::FAST_BYTES_MAX {
            return Err(RuzmaError::invalid_parameter(
                "fast_bytes",
                format!(
                    "must be in {}..={}, got {}",
                    Self::FAST_BYTES_MIN,
                    Self::FAST_BYTES_MAX,
                    self.fast_bytes
                ),
            ));
        }
        LzmaProperties::new(self.lc, self.lp, self.pb)?;
        Ok(())
    }

    /// The validated `lc`/`lp`/`pb` triple for the stream header.
    pub(crate) fn properties(&self) -> LzmaProperties {
        LzmaProperties {
            lc: self.lc,
            lp: self.lp,
            pb: self.pb,
        }
    }
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self::new()
    }
}
