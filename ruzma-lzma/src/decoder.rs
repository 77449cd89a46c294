//! LZMA decoding, token by token.
//!
//! [`LzmaDecoder`] is the encoder's inverse and shares its adaptive model
//! types, so any divergence between the two shows up as a broken round-trip.
//! Beyond plain decompression it exposes the decoded token stream
//! ([`next_token`](LzmaDecoder::next_token)), which the tests use to check
//! parse decisions against the format's invariants: token lengths covering
//! the input exactly, the most-recently-used distance rotation, and end
//! marker placement.
//!
//! The decoded output doubles as the match window, so the whole stream is
//! held in memory. Streams are bounded either by a known uncompressed size
//! or by the end marker (a match at the reserved distance `0xFFFF_FFFF`).

use std::io::Read;

use ruzma_core::error::{Result, RuzmaError};

use crate::model::{ContextModels, LzmaProperties, NUM_REPS, State};
use crate::range_coder::RangeDecoder;

/// One decoded decision, with real (not coded) distances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodedToken {
    /// A single verbatim byte.
    Literal(u8),
    /// `len` bytes copied from `distance` bytes back, a fresh distance.
    Match {
        /// Real distance, 1 meaning the previous byte.
        distance: u32,
        /// Bytes copied.
        len: u32,
    },
    /// `len` bytes copied from the `index`-th most recent distance.
    /// Index 0 with length 1 is the short rep.
    Rep {
        /// Which entry of the recent-distance set was used.
        index: usize,
        /// Real distance, 1 meaning the previous byte.
        distance: u32,
        /// Bytes copied.
        len: u32,
    },
    /// The end-of-stream marker.
    EndMarker,
}

/// Streaming LZMA decoder over any [`Read`] source.
///
/// Bounded by an uncompressed size when one is known, otherwise by the end
/// marker. [`next_token`](Self::next_token) yields decisions one at a time;
/// [`decode_to_end`](Self::decode_to_end) drains the stream and hands back
/// the decoded bytes.
pub struct LzmaDecoder<R: Read> {
    rc: RangeDecoder<R>,
    models: ContextModels,
    state: State,
    reps: [u32; NUM_REPS],
    output: Vec<u8>,
    dict_size: u32,
    pos_state_mask: u32,
    limit: Option<u64>,
    finished: bool,
}

impl<R: Read> LzmaDecoder<R> {
    /// Create a decoder for a raw LZMA stream.
    ///
    /// `unpacked_size` bounds the output when known; pass `None` for a
    /// stream terminated by the end marker. Consumes the five-byte range
    /// coder initialization from `reader`.
    pub fn new(
        reader: R,
        props: LzmaProperties,
        dict_size: u32,
        unpacked_size: Option<u64>,
    ) -> Result<Self> {
        Ok(Self {
            rc: RangeDecoder::new(reader)?,
            models: ContextModels::new(props.lc, props.lp),
            state: State::new(),
            reps: [0; NUM_REPS],
            output: Vec::new(),
            dict_size,
            pos_state_mask: (1 << props.pb) - 1,
            limit: unpacked_size,
            finished: false,
        })
    }

    /// Create a decoder from a classic `.lzma` framing: the five-byte
    /// properties header, then the uncompressed size as a little-endian
    /// 64-bit value (`u64::MAX` meaning "until the end marker").
    pub fn from_header(mut reader: R) -> Result<Self> {
        let (props, dict_size) = LzmaProperties::read_header(&mut reader)?;
        let mut size = [0u8; 8];
        reader.read_exact(&mut size)?;
        let size = u64::from_le_bytes(size);
        let unpacked_size = if size == u64::MAX { None } else { Some(size) };
        Self::new(reader, props, dict_size, unpacked_size)
    }

    /// Bytes decoded so far.
    pub fn position(&self) -> u64 {
        self.output.len() as u64
    }

    /// Decode the next token and apply it to the output.
    ///
    /// Returns `None` once the stream is complete: the declared size has
    /// been produced, or the end marker was already returned.
    pub fn next_token(&mut self) -> Result<Option<DecodedToken>> {
        if self.finished {
            return Ok(None);
        }
        if let Some(limit) = self.limit {
            if self.output.len() as u64 >= limit {
                self.finished = true;
                return Ok(None);
            }
        }

        let position = self.output.len() as u32;
        let pos_state = position & self.pos_state_mask;
        let state_index = self.state.index();

        if self
            .rc
            .decode_bit(&mut self.models.is_match[state_index][pos_state as usize])?
            == 0
        {
            let prev_byte = self.output.last().copied().unwrap_or(0);
            let byte = if self.state.is_literal() {
                self.models.literal.decode(&mut self.rc, position, prev_byte)?
            } else {
                // The previous token was a match, so reps[0] was checked
                // against the output length when it was applied.
                let match_byte = self.output[self.output.len() - self.reps[0] as usize - 1];
                self.models
                    .literal
                    .decode_matched(&mut self.rc, position, prev_byte, match_byte)?
            };
            self.state.update_literal();
            self.output.push(byte);
            return Ok(Some(DecodedToken::Literal(byte)));
        }

        let token = if self.rc.decode_bit(&mut self.models.is_rep[state_index])? == 1 {
            if self.rc.decode_bit(&mut self.models.is_rep_g0[state_index])? == 0 {
                if self
                    .rc
                    .decode_bit(&mut self.models.is_rep0_long[state_index][pos_state as usize])?
                    == 0
                {
                    self.state.update_short_rep();
                    self.copy_match(self.reps[0], 1)?;
                    DecodedToken::Rep {
                        index: 0,
                        distance: self.reps[0] + 1,
                        len: 1,
                    }
                } else {
                    let len = self.models.rep_len.decode(&mut self.rc, pos_state as usize)?;
                    self.state.update_rep();
                    self.copy_match(self.reps[0], len)?;
                    DecodedToken::Rep {
                        index: 0,
                        distance: self.reps[0] + 1,
                        len,
                    }
                }
            } else {
                let index = if self.rc.decode_bit(&mut self.models.is_rep_g1[state_index])? == 0 {
                    1
                } else if self.rc.decode_bit(&mut self.models.is_rep_g2[state_index])? == 0 {
                    2
                } else {
                    3
                };
                let distance = self.reps[index];
                for i in (1..=index).rev() {
                    self.reps[i] = self.reps[i - 1];
                }
                self.reps[0] = distance;
                let len = self.models.rep_len.decode(&mut self.rc, pos_state as usize)?;
                self.state.update_rep();
                self.copy_match(distance, len)?;
                DecodedToken::Rep {
                    index,
                    distance: distance + 1,
                    len,
                }
            }
        } else {
            let len = self.models.match_len.decode(&mut self.rc, pos_state as usize)?;
            self.state.update_match();
            let dist = self.models.distance.decode(&mut self.rc, len)?;
            if dist == u32::MAX {
                self.finished = true;
                if self.limit.is_some() {
                    // With a declared size the loop stops at that size, so
                    // any marker we actually read arrived early.
                    return Err(RuzmaError::corrupted_data(
                        self.output.len() as u64,
                        "end marker before the declared uncompressed size",
                    ));
                }
                return Ok(Some(DecodedToken::EndMarker));
            }
            self.reps[3] = self.reps[2];
            self.reps[2] = self.reps[1];
            self.reps[1] = self.reps[0];
            self.reps[0] = dist;
            self.copy_match(dist, len)?;
            DecodedToken::Match {
                distance: dist + 1,
                len,
            }
        };
        Ok(Some(token))
    }

    /// Decode the remaining tokens and return the complete output.
    pub fn decode_to_end(mut self) -> Result<Vec<u8>> {
        while self.next_token()?.is_some() {}
        Ok(self.output)
    }

    /// Append `len` bytes copied from coded distance `dist` back.
    fn copy_match(&mut self, dist: u32, len: u32) -> Result<()> {
        let real = dist as usize + 1;
        if dist >= self.dict_size {
            return Err(RuzmaError::corrupted_data(
                self.output.len() as u64,
                format!("match distance {real} exceeds the dictionary size"),
            ));
        }
        if real > self.output.len() {
            return Err(RuzmaError::corrupted_data(
                self.output.len() as u64,
                format!(
                    "match distance {real} reaches before the start of the stream"
                ),
            ));
        }
        if let Some(limit) = self.limit {
            if self.output.len() as u64 + u64::from(len) > limit {
                return Err(RuzmaError::corrupted_data(
                    self.output.len() as u64,
                    format!("match of length {len} overruns the declared uncompressed size"),
                ));
            }
        }
        // Byte at a time; the source may overlap the bytes just written.
        for _ in 0..len {
            let byte = self.output[self.output.len() - real];
            self.output.push(byte);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EncoderConfig;
    use crate::encoder::LzmaEncoder;
    use crate::range_coder::RangeEncoder;

    fn small_config() -> EncoderConfig {
        EncoderConfig {
            dict_size: 1 << 16,
            ..EncoderConfig::new()
        }
    }

    fn encode(data: &[u8], config: EncoderConfig) -> Vec<u8> {
        let mut encoder = LzmaEncoder::new(config).unwrap();
        let mut out = Vec::new();
        encoder.code(data, &mut out).unwrap();
        out
    }

    fn trace(data: &[u8], config: EncoderConfig) -> Vec<DecodedToken> {
        let compressed = encode(data, config);
        let mut decoder = LzmaDecoder::new(
            &compressed[..],
            config.properties(),
            config.dict_size,
            Some(data.len() as u64),
        )
        .unwrap();
        let mut tokens = Vec::new();
        while let Some(token) = decoder.next_token().unwrap() {
            tokens.push(token);
        }
        tokens
    }

    fn token_len(token: &DecodedToken) -> u64 {
        match token {
            DecodedToken::Literal(_) => 1,
            DecodedToken::Match { len, .. } | DecodedToken::Rep { len, .. } => u64::from(*len),
            DecodedToken::EndMarker => 0,
        }
    }

    #[test]
    fn test_empty_end_marker_trace() {
        let config = EncoderConfig {
            dict_size: 1 << 12,
            end_marker: true,
            ..EncoderConfig::new()
        };
        let compressed = encode(b"", config);
        let mut decoder = LzmaDecoder::new(
            &compressed[..],
            config.properties(),
            config.dict_size,
            None,
        )
        .unwrap();
        assert_eq!(decoder.next_token().unwrap(), Some(DecodedToken::EndMarker));
        assert_eq!(decoder.next_token().unwrap(), None);
        assert_eq!(decoder.position(), 0);
    }

    #[test]
    fn test_short_run_rides_the_initial_rep() {
        // The rep0 slot is usable from position 1 on (coded distance 0 is
        // the previous byte), and at initial probabilities it is far cheaper
        // than three more literals.
        let config = EncoderConfig {
            dict_size: 1 << 12,
            fast_bytes: 5,
            ..EncoderConfig::new()
        };
        let tokens = trace(b"AAAA", config);
        assert_eq!(
            tokens,
            vec![
                DecodedToken::Literal(b'A'),
                DecodedToken::Rep {
                    index: 0,
                    distance: 1,
                    len: 3
                },
            ]
        );
    }

    #[test]
    fn test_alternating_pattern_uses_one_fresh_distance() {
        let data: Vec<u8> = b"AB".repeat(50);
        let config = EncoderConfig {
            dict_size: 1 << 12,
            fast_bytes: 8,
            ..EncoderConfig::new()
        };
        let tokens = trace(&data, config);
        let fresh: Vec<u32> = tokens
            .iter()
            .filter_map(|t| match t {
                DecodedToken::Match { distance, .. } => Some(*distance),
                _ => None,
            })
            .collect();
        assert_eq!(fresh, vec![2]);
        let total: u64 = tokens.iter().map(token_len).sum();
        assert_eq!(total, data.len() as u64);
    }

    #[test]
    fn test_token_lengths_cover_input() {
        let mut data = Vec::new();
        for i in 0..600u32 {
            data.push((i * 17 % 251) as u8);
        }
        data.extend_from_slice(&data.clone()[100..300]);
        data.extend_from_slice(b"and a literal tail");
        let tokens = trace(&data, small_config());
        let total: u64 = tokens.iter().map(token_len).sum();
        assert_eq!(total, data.len() as u64);
    }

    #[test]
    fn test_rep_mru_rotation_law() {
        // A 40-byte run forces at least one rep (the rep-run bailout fires
        // at position 1 on the initial distance), and the unique separators
        // keep the block copies from collapsing into one long match. Verify
        // every rep token names the distance the rotation predicts.
        let a = b"qwertyuiopasdfgh";
        let b = b"0123456";
        let mut data = vec![b'z'; 40];
        for i in 0u8..6 {
            data.extend_from_slice(a);
            data.push(i);
            data.extend_from_slice(b);
            data.push(100 + i);
        }
        let config = EncoderConfig {
            dict_size: 1 << 12,
            fast_bytes: 16,
            ..EncoderConfig::new()
        };
        let tokens = trace(&data, config);

        let mut shadow = [1u32; NUM_REPS];
        for token in &tokens {
            match *token {
                DecodedToken::Rep {
                    index, distance, ..
                } => {
                    assert_eq!(distance, shadow[index], "rep names the wrong distance");
                    let dist = shadow[index];
                    for i in (1..=index).rev() {
                        shadow[i] = shadow[i - 1];
                    }
                    shadow[0] = dist;
                }
                DecodedToken::Match { distance, .. } => {
                    for i in (1..NUM_REPS).rev() {
                        shadow[i] = shadow[i - 1];
                    }
                    shadow[0] = distance;
                }
                DecodedToken::Literal(_) | DecodedToken::EndMarker => {}
            }
        }
        assert!(
            tokens
                .iter()
                .any(|t| matches!(t, DecodedToken::Rep { .. })),
            "corpus produced no rep tokens"
        );
        let total: u64 = tokens.iter().map(token_len).sum();
        assert_eq!(total, data.len() as u64);
    }

    #[test]
    fn test_framed_stream_roundtrip() {
        let data = b"framed stream payload, framed stream payload, framed";
        let config = small_config();
        let mut encoder = LzmaEncoder::new(config).unwrap();
        let mut framed = Vec::new();
        encoder.write_properties(&mut framed).unwrap();
        framed.extend_from_slice(&(data.len() as u64).to_le_bytes());
        encoder.code(&data[..], &mut framed).unwrap();

        let decoded = LzmaDecoder::from_header(&framed[..])
            .unwrap()
            .decode_to_end()
            .unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_truncated_stream_errors() {
        let data = b"a stream long enough that six bytes cannot possibly hold it";
        let compressed = encode(data, small_config());
        assert!(compressed.len() > 6);
        let config = small_config();
        let mut decoder = LzmaDecoder::new(
            &compressed[..6],
            config.properties(),
            config.dict_size,
            Some(data.len() as u64),
        )
        .unwrap();
        let mut result = Ok(Some(DecodedToken::Literal(0)));
        while let Ok(Some(_)) = result {
            result = decoder.next_token();
        }
        assert!(matches!(result, Err(RuzmaError::Io(_))));
    }

    #[test]
    fn test_early_end_marker_rejected() {
        // A marker-terminated empty stream decoded under a declared size:
        // the marker arrives with bytes still owed.
        let config = EncoderConfig {
            dict_size: 1 << 12,
            end_marker: true,
            ..EncoderConfig::new()
        };
        let compressed = encode(b"", config);
        let mut decoder = LzmaDecoder::new(
            &compressed[..],
            config.properties(),
            config.dict_size,
            Some(5),
        )
        .unwrap();
        let err = decoder.next_token().unwrap_err();
        assert!(matches!(err, RuzmaError::CorruptedData { offset: 0, .. }));
    }

    #[test]
    fn test_match_before_stream_start_rejected() {
        // Hand-assemble a stream whose first token is a length-2 match at
        // real distance 1; with nothing decoded yet there is no byte to copy.
        let config = small_config();
        let mut rc = RangeEncoder::new(Vec::new());
        let mut models = ContextModels::new(config.lc, config.lp);
        rc.encode_bit(&mut models.is_match[0][0], 1).unwrap();
        rc.encode_bit(&mut models.is_rep[0], 0).unwrap();
        models.match_len.encode(&mut rc, 2, 0).unwrap();
        models.distance.encode(&mut rc, 2, 0).unwrap();
        let payload = rc.finish().unwrap();

        let mut decoder = LzmaDecoder::new(
            &payload[..],
            config.properties(),
            config.dict_size,
            None,
        )
        .unwrap();
        let err = decoder.next_token().unwrap_err();
        assert!(matches!(err, RuzmaError::CorruptedData { offset: 0, .. }));
    }

    #[test]
    fn test_match_past_declared_size_rejected() {
        // "AAAA" parses as a literal plus a length-3 rep; claiming only 2
        // bytes makes that rep overrun the declared size mid-copy.
        let config = EncoderConfig {
            dict_size: 1 << 12,
            fast_bytes: 5,
            ..EncoderConfig::new()
        };
        let compressed = encode(b"AAAA", config);
        let mut decoder = LzmaDecoder::new(
            &compressed[..],
            config.properties(),
            config.dict_size,
            Some(2),
        )
        .unwrap();
        assert_eq!(
            decoder.next_token().unwrap(),
            Some(DecodedToken::Literal(b'A'))
        );
        let err = decoder.next_token().unwrap_err();
        assert!(matches!(err, RuzmaError::CorruptedData { offset: 1, .. }));
    }

    #[test]
    fn test_nonzero_lead_byte_rejected() {
        let config = small_config();
        let err = LzmaDecoder::new(
            &[0x01, 0x00, 0x00, 0x00, 0x00][..],
            config.properties(),
            config.dict_size,
            None,
        )
        .err()
        .unwrap_or_else(|| panic!("nonzero lead byte was accepted"));
        assert!(matches!(err, RuzmaError::InvalidHeader { .. }));
    }

    #[test]
    fn test_short_header_errors() {
        let err = LzmaDecoder::from_header(&[0x5D, 0x00, 0x00][..])
            .err()
            .unwrap_or_else(|| panic!("truncated header was accepted"));
        assert!(matches!(err, RuzmaError::Io(_)));
    }
}
