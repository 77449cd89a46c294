//! The block coder: drives one encoding session from input stream to LZMA
//! bitstream.
//!
//! [`LzmaEncoder`] wires the collaborators together: a [`BinTree`] finder
//! feeds the [`OptimalParser`], whose tokens are coded through the adaptive
//! [`ContextModels`] into a [`RangeEncoder`]. The first byte of a stream is
//! always coded as a literal; after that the token loop runs until the
//! finder is exhausted. Price caches refresh only between tokens, when the
//! parser's lookahead debt is zero and the models are in sync with the
//! coded prefix. The session ends with an optional end marker (a length-2
//! match at the reserved distance `0xFFFF_FFFF`) and the final range flush.

use std::io::{Read, Write};

use ruzma_core::error::Result;

use crate::config::EncoderConfig;
use crate::match_finder::{BinTree, MatchFinder};
use crate::model::{ContextModels, LzmaProperties, MATCH_LEN_MAX, MATCH_LEN_MIN, NUM_REPS, State};
use crate::optimal::{NUM_OPT_NODES, OptimalParser, Token};
use crate::range_coder::RangeEncoder;

/// Input bytes coded between progress callbacks.
const PROGRESS_INTERVAL: u64 = 1 << 12;

/// Streaming LZMA encoder with optimal parsing.
///
/// One instance owns the adaptive models, the parse engine, and the session
/// state: the position FSM, the four most recent distances, the previous
/// byte, and the stream position. [`code`](Self::code) and
/// [`code_with_progress`](Self::code_with_progress) reset all of it before
/// encoding, so one encoder can code several streams in sequence.
///
/// The output is a raw LZMA bitstream. Pair it with
/// [`write_properties`](Self::write_properties) (and an uncompressed-size
/// field if the stream has no end marker) to produce a decodable file.
pub struct LzmaEncoder {
    config: EncoderConfig,
    models: ContextModels,
    parser: OptimalParser,
    state: State,
    reps: [u32; NUM_REPS],
    prev_byte: u8,
    position: u64,
    pos_state_mask: u32,
}

impl LzmaEncoder {
    /// Create an encoder for `config`, validating it first.
    pub fn new(config: EncoderConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            models: ContextModels::new(config.lc, config.lp),
            parser: OptimalParser::new(config.fast_bytes, config.pb),
            state: State::new(),
            reps: [0; NUM_REPS],
            prev_byte: 0,
            position: 0,
            pos_state_mask: (1 << config.pb) - 1,
            config,
        })
    }

    /// The configuration this encoder was built with.
    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    /// The `lc`/`lp`/`pb` triple of the streams this encoder produces.
    pub fn properties(&self) -> LzmaProperties {
        self.config.properties()
    }

    /// Write the five-byte properties header (properties byte plus
    /// dictionary size) that must precede the compressed payload.
    pub fn write_properties<W: Write>(&self, writer: &mut W) -> Result<()> {
        self.config
            .properties()
            .write_header(self.config.dict_size, writer)
    }

    /// Encode everything `input` yields into `output`.
    ///
    /// Returns `(input_bytes, output_bytes)` for the completed stream. The
    /// output byte count includes the final flush.
    pub fn code<R: Read, W: Write>(&mut self, input: R, output: W) -> Result<(u64, u64)> {
        self.code_with_progress(input, output, |_, _| {})
    }

    /// Encode everything `input` yields into `output`, reporting progress.
    ///
    /// `progress` receives `(input_bytes, output_bytes)` roughly every 4096
    /// input bytes; the output count includes bytes still held in the range
    /// coder's carry pipeline. Returns the final totals like
    /// [`code`](Self::code).
    pub fn code_with_progress<R, W, F>(
        &mut self,
        input: R,
        output: W,
        mut progress: F,
    ) -> Result<(u64, u64)>
    where
        R: Read,
        W: Write,
        F: FnMut(u64, u64),
    {
        let mut finder = BinTree::new(
            input,
            self.config.match_finder,
            self.config.dict_size,
            NUM_OPT_NODES as u32,
            self.config.fast_bytes,
            MATCH_LEN_MAX + 1,
        )?;
        let mut rc = RangeEncoder::new(output);

        self.models.reset();
        self.models.init_price_tables(
            self.config.fast_bytes,
            self.config.dict_size,
            1usize << self.config.pb,
        );
        self.parser.reset();
        self.state = State::new();
        self.reps = [0; NUM_REPS];
        self.prev_byte = 0;
        self.position = 0;

        loop {
            if self.code_one_block(&mut finder, &mut rc)? {
                break;
            }
            progress(self.position, rc.processed_bytes());
        }
        Ok((self.position, rc.bytes_written()))
    }

    /// Encode tokens until the stream ends or a progress yield point.
    ///
    /// Returns `true` once the stream is fully coded and flushed.
    fn code_one_block<M: MatchFinder, W: Write>(
        &mut self,
        finder: &mut M,
        rc: &mut RangeEncoder<W>,
    ) -> Result<bool> {
        let progress_base = self.position;

        if self.position == 0 {
            if finder.available_bytes() == 0 {
                self.flush_stream(rc)?;
                return Ok(true);
            }
            // Prime the finder; its first candidate set has no history to
            // point into, so the first byte is a literal unconditionally.
            self.parser.read_match_distances(finder)?;
            let pos_state = (self.position as u32) & self.pos_state_mask;
            rc.encode_bit(
                &mut self.models.is_match[self.state.index()][pos_state as usize],
                0,
            )?;
            let cur_byte = finder.byte_at(-(self.parser.additional_offset() as i32));
            self.models
                .literal
                .encode(rc, self.position as u32, self.prev_byte, cur_byte)?;
            self.state.update_literal();
            self.prev_byte = cur_byte;
            self.parser.consume(1);
            self.position = 1;
        }
        if finder.available_bytes() == 0 {
            self.flush_stream(rc)?;
            return Ok(true);
        }
        loop {
            let token = self.parser.next_token(
                self.position as u32,
                self.state,
                self.reps,
                self.prev_byte,
                &self.models,
                finder,
            )?;
            let len = token.len();
            let pos_state = (self.position as u32) & self.pos_state_mask;
            let state_index = self.state.index();

            match token {
                Token::Literal => {
                    rc.encode_bit(
                        &mut self.models.is_match[state_index][pos_state as usize],
                        0,
                    )?;
                    let cur_byte = finder.byte_at(-(self.parser.additional_offset() as i32));
                    if self.state.is_literal() {
                        self.models.literal.encode(
                            rc,
                            self.position as u32,
                            self.prev_byte,
                            cur_byte,
                        )?;
                    } else {
                        let match_byte = finder.byte_at(
                            -(self.reps[0] as i32) - 1 - self.parser.additional_offset() as i32,
                        );
                        self.models.literal.encode_matched(
                            rc,
                            self.position as u32,
                            self.prev_byte,
                            match_byte,
                            cur_byte,
                        )?;
                    }
                    self.prev_byte = cur_byte;
                    self.state.update_literal();
                }
                Token::Rep { index, len } => {
                    // Only rep0 can carry length 1 (the short rep).
                    debug_assert!(len > 1 || index == 0);
                    rc.encode_bit(
                        &mut self.models.is_match[state_index][pos_state as usize],
                        1,
                    )?;
                    rc.encode_bit(&mut self.models.is_rep[state_index], 1)?;
                    if index == 0 {
                        rc.encode_bit(&mut self.models.is_rep_g0[state_index], 0)?;
                        rc.encode_bit(
                            &mut self.models.is_rep0_long[state_index][pos_state as usize],
                            u32::from(len != 1),
                        )?;
                    } else {
                        rc.encode_bit(&mut self.models.is_rep_g0[state_index], 1)?;
                        if index == 1 {
                            rc.encode_bit(&mut self.models.is_rep_g1[state_index], 0)?;
                        } else {
                            rc.encode_bit(&mut self.models.is_rep_g1[state_index], 1)?;
                            rc.encode_bit(
                                &mut self.models.is_rep_g2[state_index],
                                index as u32 - 2,
                            )?;
                        }
                    }
                    if len == 1 {
                        self.state.update_short_rep();
                    } else {
                        self.models.rep_len.encode(rc, len, pos_state as usize)?;
                        self.state.update_rep();
                    }
                    if index != 0 {
                        let distance = self.reps[index];
                        for i in (1..=index).rev() {
                            self.reps[i] = self.reps[i - 1];
                        }
                        self.reps[0] = distance;
                    }
                    self.prev_byte = finder
                        .byte_at(len as i32 - 1 - self.parser.additional_offset() as i32);
                }
                Token::Match { dist, len } => {
                    rc.encode_bit(
                        &mut self.models.is_match[state_index][pos_state as usize],
                        1,
                    )?;
                    rc.encode_bit(&mut self.models.is_rep[state_index], 0)?;
                    self.state.update_match();
                    self.models.match_len.encode(rc, len, pos_state as usize)?;
                    self.models.distance.encode(rc, len, dist)?;
                    for i in (1..NUM_REPS).rev() {
                        self.reps[i] = self.reps[i - 1];
                    }
                    self.reps[0] = dist;
                    self.prev_byte = finder
                        .byte_at(len as i32 - 1 - self.parser.additional_offset() as i32);
                }
            }
            self.parser.consume(len);
            self.position += u64::from(len);

            if self.parser.additional_offset() == 0 {
                self.models.distance.refresh_if_stale();
                if finder.available_bytes() == 0 {
                    self.flush_stream(rc)?;
                    return Ok(true);
                }
                if self.position - progress_base >= PROGRESS_INTERVAL {
                    return Ok(false);
                }
            }
        }
    }

    /// Terminate the stream: end marker if configured, then the range flush.
    fn flush_stream<W: Write>(&mut self, rc: &mut RangeEncoder<W>) -> Result<()> {
        if self.config.end_marker {
            let pos_state = (self.position as u32) & self.pos_state_mask;
            self.write_end_marker(rc, pos_state)?;
        }
        rc.flush()
    }

    /// A length-2 match at distance `0xFFFF_FFFF`: slot 63, 26 direct bits,
    /// align 15. Decoders treat the reserved distance as end-of-stream.
    fn write_end_marker<W: Write>(
        &mut self,
        rc: &mut RangeEncoder<W>,
        pos_state: u32,
    ) -> Result<()> {
        rc.encode_bit(
            &mut self.models.is_match[self.state.index()][pos_state as usize],
            1,
        )?;
        rc.encode_bit(&mut self.models.is_rep[self.state.index()], 0)?;
        self.state.update_match();
        self.models
            .match_len
            .encode(rc, MATCH_LEN_MIN, pos_state as usize)?;
        self.models.distance.encode(rc, MATCH_LEN_MIN, u32::MAX)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::LzmaDecoder;
    use ruzma_core::error::RuzmaError;

    #[test]
    fn test_write_properties_header() {
        let encoder = LzmaEncoder::new(EncoderConfig::new()).unwrap();
        let mut header = Vec::new();
        encoder.write_properties(&mut header).unwrap();
        assert_eq!(header, [0x5D, 0x00, 0x00, 0x40, 0x00]);
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = EncoderConfig {
            fast_bytes: 4,
            ..EncoderConfig::new()
        };
        let err = LzmaEncoder::new(config)
            .err()
            .unwrap_or_else(|| panic!("fast_bytes below the minimum was accepted"));
        assert!(
            matches!(err, RuzmaError::InvalidParameter { ref name, .. } if name == "fast_bytes")
        );
    }

    #[test]
    fn test_empty_input_is_five_zero_bytes() {
        // No end marker: the output is just the flushed initial range state.
        let config = EncoderConfig {
            dict_size: 1 << 12,
            ..EncoderConfig::new()
        };
        let mut encoder = LzmaEncoder::new(config).unwrap();
        let mut out = Vec::new();
        let (read, written) = encoder.code(&b""[..], &mut out).unwrap();
        assert_eq!(read, 0);
        assert_eq!(written, 5);
        assert_eq!(out, [0u8; 5]);
    }

    #[test]
    fn test_roundtrip_through_decoder() {
        let data = b"the quick brown fox jumps over the lazy dog; the quick brown fox";
        let config = EncoderConfig {
            dict_size: 1 << 16,
            ..EncoderConfig::new()
        };
        let mut encoder = LzmaEncoder::new(config).unwrap();
        let mut compressed = Vec::new();
        let (read, written) = encoder.code(&data[..], &mut compressed).unwrap();
        assert_eq!(read, data.len() as u64);
        assert_eq!(written, compressed.len() as u64);

        let decoded = LzmaDecoder::new(
            &compressed[..],
            config.properties(),
            config.dict_size,
            Some(data.len() as u64),
        )
        .unwrap()
        .decode_to_end()
        .unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_end_marker_stream_decodes_without_size() {
        let data = b"marker terminated stream, marker terminated stream";
        let config = EncoderConfig {
            dict_size: 1 << 16,
            end_marker: true,
            ..EncoderConfig::new()
        };
        let mut encoder = LzmaEncoder::new(config).unwrap();
        let mut compressed = Vec::new();
        encoder.code(&data[..], &mut compressed).unwrap();

        let decoded = LzmaDecoder::new(&compressed[..], config.properties(), config.dict_size, None)
            .unwrap()
            .decode_to_end()
            .unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_encoder_reuse_across_streams() {
        let config = EncoderConfig {
            dict_size: 1 << 16,
            ..EncoderConfig::new()
        };
        let mut encoder = LzmaEncoder::new(config).unwrap();
        for data in [
            &b"first stream first stream first stream"[..],
            &b"a different second stream, a different second stream"[..],
        ] {
            let mut compressed = Vec::new();
            encoder.code(data, &mut compressed).unwrap();
            let decoded = LzmaDecoder::new(
                &compressed[..],
                config.properties(),
                config.dict_size,
                Some(data.len() as u64),
            )
            .unwrap()
            .decode_to_end()
            .unwrap();
            assert_eq!(decoded, data);
        }
    }
}
