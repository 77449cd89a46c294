//! Range coder for LZMA compression.
//!
//! The range coder is a binary arithmetic coder over 11-bit adaptive
//! probabilities. Both directions live here:
//!
//! - [`RangeEncoder`] narrows a 32-bit range per bit and emits bytes through
//!   a carry pipeline (`cache`/`cache_size`) as the top byte of `low`
//!   settles.
//! - [`RangeDecoder`] mirrors the arithmetic, consuming one byte per
//!   renormalization.
//!
//! ## Prices
//!
//! The encoder side also owns the cost model: [`get_price0`]/[`get_price1`]
//! convert a probability into the number of 1/64-bit units a bit would cost,
//! via a 512-entry table generated at compile time. The optimal parser sums
//! these prices to compare encoding decisions without touching the stream.
//!
//! ## Probability model
//!
//! Probabilities are `u16` in `0..2048` starting at 1024. A 0-bit moves the
//! probability toward 2048 by `(2048 - p) >> 5`, a 1-bit toward 0 by
//! `p >> 5`, so the steady-state range is `31..=2017` and prices stay finite.

use std::io::{Read, Write};

use ruzma_core::error::{Result, RuzmaError};

/// Number of bits in a probability value.
pub const PROB_BITS: u32 = 11;
/// Initial probability (one half) for every adaptive bit model.
pub const PROB_INIT: u16 = 1 << (PROB_BITS - 1);
/// Probability denominator (2^11).
pub const PROB_MAX: u16 = 1 << PROB_BITS;
/// Adaptation shift controlling how fast probabilities move.
pub const MOVE_BITS: u32 = 5;

/// Renormalization threshold: the range never drops below 2^24.
const TOP_VALUE: u32 = 1 << 24;

/// Prices are fixed-point with this shift: 64 units per bit.
pub const PRICE_SHIFT_BITS: u32 = 6;
/// Probability resolution dropped when indexing the price table.
const PRICE_STEP_BITS: u32 = 2;

/// Price table: entry `p >> 2` holds the cost in 1/64-bit units of encoding
/// a bit whose model probability is `p`.
static PROB_PRICES: [u32; (PROB_MAX >> PRICE_STEP_BITS) as usize] = {
    let num_bits = PROB_BITS - PRICE_STEP_BITS;
    let mut prices = [0u32; (PROB_MAX >> PRICE_STEP_BITS) as usize];
    let mut i = num_bits;
    while i > 0 {
        i -= 1;
        let start = 1u32 << (num_bits - i - 1);
        let end = 1u32 << (num_bits - i);
        let mut j = start;
        while j < end {
            prices[j as usize] =
                (i << PRICE_SHIFT_BITS) + (((end - j) << PRICE_SHIFT_BITS) >> (num_bits - i - 1));
            j += 1;
        }
    }
    prices
};

/// Price in 1/64-bit units of encoding `bit` under probability `prob`.
#[inline]
pub fn get_price(prob: u16, bit: u32) -> u32 {
    if bit == 0 {
        get_price0(prob)
    } else {
        get_price1(prob)
    }
}

/// Price of a 0-bit under probability `prob`.
#[inline]
pub fn get_price0(prob: u16) -> u32 {
    PROB_PRICES[(prob >> PRICE_STEP_BITS) as usize]
}

/// Price of a 1-bit under probability `prob`.
#[inline]
pub fn get_price1(prob: u16) -> u32 {
    PROB_PRICES[((PROB_MAX - prob) >> PRICE_STEP_BITS) as usize]
}

/// Price of encoding `symbol` through a bit tree, MSB first.
pub fn get_bit_tree_price(probs: &[u16], num_bits: u32, symbol: u32) -> u32 {
    let mut price = 0;
    let mut m = 1usize;
    for i in (0..num_bits).rev() {
        let bit = (symbol >> i) & 1;
        price += get_price(probs[m], bit);
        m = (m << 1) | bit as usize;
    }
    price
}

/// Price of encoding `symbol` through a bit tree in reverse (LSB-first) order.
pub fn get_bit_tree_reverse_price(probs: &[u16], num_bits: u32, symbol: u32) -> u32 {
    let mut price = 0;
    let mut m = 1usize;
    let mut sym = symbol;
    for _ in 0..num_bits {
        let bit = sym & 1;
        sym >>= 1;
        price += get_price(probs[m], bit);
        m = (m << 1) | bit as usize;
    }
    price
}

/// Arithmetic range encoder writing an LZMA-compatible stream to `W`.
#[derive(Debug)]
pub struct RangeEncoder<W: Write> {
    writer: W,
    range: u32,
    low: u64,
    cache: u8,
    cache_size: u64,
    processed: u64,
}

impl<W: Write> RangeEncoder<W> {
    /// Create an encoder in the initial state.
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            range: 0xFFFF_FFFF,
            low: 0,
            cache: 0,
            cache_size: 1,
            processed: 0,
        }
    }

    /// Bytes pushed toward the writer so far, counting pending carry bytes.
    pub fn processed_bytes(&self) -> u64 {
        self.processed + self.cache_size
    }

    /// Bytes actually written to the writer. Exact only after
    /// [`flush`](Self::flush) has drained the carry pipeline.
    pub fn bytes_written(&self) -> u64 {
        self.processed
    }

    /// Encode one bit, adapting the probability model.
    pub fn encode_bit(&mut self, prob: &mut u16, bit: u32) -> Result<()> {
        let bound = (self.range >> PROB_BITS) * u32::from(*prob);
        if bit == 0 {
            self.range = bound;
            *prob += (PROB_MAX - *prob) >> MOVE_BITS;
        } else {
            self.low += u64::from(bound);
            self.range -= bound;
            *prob -= *prob >> MOVE_BITS;
        }
        if self.range < TOP_VALUE {
            self.range <<= 8;
            self.shift_low()?;
        }
        Ok(())
    }

    /// Encode `count` bits of `value`, MSB first, at fixed probability 0.5.
    pub fn encode_direct_bits(&mut self, value: u32, count: u32) -> Result<()> {
        for i in (0..count).rev() {
            self.range >>= 1;
            if (value >> i) & 1 != 0 {
                self.low += u64::from(self.range);
            }
            if self.range < TOP_VALUE {
                self.range <<= 8;
                self.shift_low()?;
            }
        }
        Ok(())
    }

    /// Encode `symbol` through a bit tree, MSB first.
    pub fn encode_bit_tree(&mut self, probs: &mut [u16], num_bits: u32, symbol: u32) -> Result<()> {
        let mut m = 1usize;
        for i in (0..num_bits).rev() {
            let bit = (symbol >> i) & 1;
            self.encode_bit(&mut probs[m], bit)?;
            m = (m << 1) | bit as usize;
        }
        Ok(())
    }

    /// Encode `symbol` through a bit tree in reverse (LSB-first) order.
    pub fn encode_bit_tree_reverse(
        &mut self,
        probs: &mut [u16],
        num_bits: u32,
        symbol: u32,
    ) -> Result<()> {
        let mut m = 1usize;
        let mut sym = symbol;
        for _ in 0..num_bits {
            let bit = sym & 1;
            sym >>= 1;
            self.encode_bit(&mut probs[m], bit)?;
            m = (m << 1) | bit as usize;
        }
        Ok(())
    }

    fn shift_low(&mut self) -> Result<()> {
        if self.low < 0xFF00_0000 || self.low > 0xFFFF_FFFF {
            let carry = (self.low >> 32) as u8;
            let mut byte = self.cache;
            loop {
                self.writer.write_all(&[byte.wrapping_add(carry)])?;
                self.processed += 1;
                byte = 0xFF;
                self.cache_size -= 1;
                if self.cache_size == 0 {
                    break;
                }
            }
            self.cache = (self.low >> 24) as u8;
        }
        self.cache_size += 1;
        self.low = (self.low & 0x00FF_FFFF) << 8;
        Ok(())
    }

    /// Drain the carry pipeline and flush the underlying writer.
    pub fn flush(&mut self) -> Result<()> {
        for _ in 0..5 {
            self.shift_low()?;
        }
        self.writer.flush()?;
        Ok(())
    }

    /// Flush and return the underlying writer.
    pub fn finish(mut self) -> Result<W> {
        self.flush()?;
        Ok(self.writer)
    }
}

/// Arithmetic range decoder reading an LZMA-compatible stream from `R`.
#[derive(Debug)]
pub struct RangeDecoder<R: Read> {
    reader: R,
    range: u32,
    code: u32,
}

impl<R: Read> RangeDecoder<R> {
    /// Create a decoder, consuming the 5-byte initialization sequence.
    pub fn new(reader: R) -> Result<Self> {
        let mut decoder = Self {
            reader,
            range: 0xFFFF_FFFF,
            code: 0,
        };
        let mut buf = [0u8; 5];
        decoder.reader.read_exact(&mut buf)?;
        if buf[0] != 0 {
            return Err(RuzmaError::invalid_header(
                "range coder stream must start with a zero byte",
            ));
        }
        for &b in &buf[1..] {
            decoder.code = (decoder.code << 8) | u32::from(b);
        }
        Ok(decoder)
    }

    #[inline]
    fn normalize(&mut self) -> Result<()> {
        if self.range < TOP_VALUE {
            let mut byte = [0u8; 1];
            self.reader.read_exact(&mut byte)?;
            self.code = (self.code << 8) | u32::from(byte[0]);
            self.range <<= 8;
        }
        Ok(())
    }

    /// Decode one bit, adapting the probability model.
    pub fn decode_bit(&mut self, prob: &mut u16) -> Result<u32> {
        self.normalize()?;
        let bound = (self.range >> PROB_BITS) * u32::from(*prob);
        if self.code < bound {
            self.range = bound;
            *prob += (PROB_MAX - *prob) >> MOVE_BITS;
            Ok(0)
        } else {
            self.code -= bound;
            self.range -= bound;
            *prob -= *prob >> MOVE_BITS;
            Ok(1)
        }
    }

    /// Decode `count` fixed-probability bits, MSB first.
    pub fn decode_direct_bits(&mut self, count: u32) -> Result<u32> {
        let mut result = 0;
        for _ in 0..count {
            self.normalize()?;
            self.range >>= 1;
            let t = self.code.wrapping_sub(self.range) >> 31;
            self.code -= self.range & t.wrapping_sub(1);
            result = (result << 1) | (1 - t);
        }
        Ok(result)
    }

    /// Decode a symbol from a bit tree, MSB first.
    pub fn decode_bit_tree(&mut self, probs: &mut [u16], num_bits: u32) -> Result<u32> {
        let mut m = 1u32;
        for _ in 0..num_bits {
            m = (m << 1) | self.decode_bit(&mut probs[m as usize])?;
        }
        Ok(m - (1 << num_bits))
    }

    /// Decode a symbol from a reverse-ordered bit tree.
    pub fn decode_bit_tree_reverse(&mut self, probs: &mut [u16], num_bits: u32) -> Result<u32> {
        let mut m = 1u32;
        let mut symbol = 0;
        for i in 0..num_bits {
            let bit = self.decode_bit(&mut probs[m as usize])?;
            m = (m << 1) | bit;
            symbol |= bit << i;
        }
        Ok(symbol)
    }
}
