//! Probability models shared by the LZMA encoder and decoder.
//!
//! Everything adaptive lives here: the 12-state token history machine, the
//! per-context literal coder, the two length coders (match and rep), and the
//! distance coder with its slot/special/align trees. [`ContextModels`]
//! bundles them together with the token-selection bits (`is_match`,
//! `is_rep`, ...) so the encoder and decoder drive one structure from both
//! directions.
//!
//! ## Prices
//!
//! The encoder-side price tables are cached here too. Length prices refresh
//! per position state after `table_size` encodes, distance prices after 128
//! new distances, align prices after 16 align encodes. The optimal parser
//! only ever sees the cached values through the
//! [`PriceOracle`](crate::optimal::PriceOracle) impl, so pricing stays a
//! pure read even while the models adapt.

use std::io::{Read, Write};

use ruzma_core::error::{Result, RuzmaError};

use crate::optimal::PriceOracle;
use crate::range_coder::{
    PRICE_SHIFT_BITS, PROB_INIT, RangeDecoder, RangeEncoder, get_bit_tree_price,
    get_bit_tree_reverse_price, get_price, get_price0, get_price1,
};

/// Number of states in the token history machine.
pub(crate) const NUM_STATES: usize = 12;
/// Maximum number of position states (pb is at most 4).
pub(crate) const POS_STATES_MAX: usize = 16;
/// Shortest encodable match.
pub(crate) const MATCH_LEN_MIN: u32 = 2;
/// Longest encodable match.
pub(crate) const MATCH_LEN_MAX: u32 = 273;
/// Number of distance coder classes, selected by match length.
pub(crate) const NUM_LEN_TO_POS_STATES: usize = 4;
/// Number of recent distances kept in most-recently-used order.
pub(crate) const NUM_REPS: usize = 4;

const NUM_SLOT_BITS: u32 = 6;
const NUM_SLOTS: usize = 1 << NUM_SLOT_BITS;
/// First slot whose distance carries extra bits.
const START_POS_MODEL_INDEX: u32 = 4;
/// First slot whose extra bits go through the align tree instead of the
/// special probability block.
const END_POS_MODEL_INDEX: u32 = 14;
/// Distances below this bound get an exact cached price.
const NUM_FULL_DISTANCES: usize = 1 << (END_POS_MODEL_INDEX as usize >> 1);
const NUM_SPECIAL_PROBS: usize = NUM_FULL_DISTANCES - END_POS_MODEL_INDEX as usize;
const NUM_ALIGN_BITS: u32 = 4;
const ALIGN_SIZE: usize = 1 << NUM_ALIGN_BITS;
const ALIGN_MASK: u32 = ALIGN_SIZE as u32 - 1;
/// New-distance count that forces a distance price refresh.
const MATCH_PRICE_REFRESH: u32 = 1 << 7;

const LEN_LOW_SYMBOLS: u32 = 8;
const LEN_MID_SYMBOLS: u32 = 8;
/// Total length symbols: 8 low + 8 mid + 256 high.
const LEN_SYMBOLS: usize = 272;

/// Size of one literal probability context: 256 normal entries plus two
/// banks of 256 for matched-literal coding.
const LITERAL_CODER_SIZE: usize = 0x300;

/// Token history state.
///
/// The state index encodes what the last few tokens were and selects the
/// probability contexts for the next token. States 0-6 follow a literal,
/// 7-11 follow a match, rep, or short rep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct State(u8);

impl State {
    pub(crate) fn new() -> Self {
        State(0)
    }

    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }

    /// True if the last token was a literal.
    #[inline]
    pub(crate) fn is_literal(self) -> bool {
        self.0 < 7
    }

    pub(crate) fn update_literal(&mut self) {
        self.0 = if self.0 < 4 {
            0
        } else if self.0 < 10 {
            self.0 - 3
        } else {
            self.0 - 6
        };
    }

    pub(crate) fn update_match(&mut self) {
        self.0 = if self.0 < 7 { 7 } else { 10 };
    }

    pub(crate) fn update_rep(&mut self) {
        self.0 = if self.0 < 7 { 8 } else { 11 };
    }

    pub(crate) fn update_short_rep(&mut self) {
        self.0 = if self.0 < 7 { 9 } else { 11 };
    }
}

/// Slot for a coded distance: 6 bits that select the magnitude class.
///
/// Slots 0-3 are the distance itself, higher slots carry `(slot >> 1) - 1`
/// extra bits below a `2 | (slot & 1)` prefix.
#[inline]
pub(crate) fn dist_slot(dist: u32) -> u32 {
    if dist < 2 {
        dist
    } else {
        let bits = 32 - dist.leading_zeros();
        ((bits - 1) << 1) | ((dist >> (bits - 2)) & 1)
    }
}

/// Distance coder class for a match of length `len`.
#[inline]
pub(crate) fn len_state(len: u32) -> usize {
    ((len - MATCH_LEN_MIN).min(NUM_LEN_TO_POS_STATES as u32 - 1)) as usize
}

/// Encode `symbol` LSB-first through a reverse tree stored at a signed
/// offset into `probs`. The distance coder's special block is indexed as
/// `base - slot - 1 + m` with `m` starting at 1, which is -1 + m for slot 4.
fn reverse_encode_at<W: Write>(
    rc: &mut RangeEncoder<W>,
    probs: &mut [u16],
    offset: i32,
    num_bits: u32,
    symbol: u32,
) -> Result<()> {
    let mut m = 1i32;
    let mut sym = symbol;
    for _ in 0..num_bits {
        let bit = sym & 1;
        sym >>= 1;
        rc.encode_bit(&mut probs[(offset + m) as usize], bit)?;
        m = (m << 1) | bit as i32;
    }
    Ok(())
}

fn reverse_decode_at<R: Read>(
    rd: &mut RangeDecoder<R>,
    probs: &mut [u16],
    offset: i32,
    num_bits: u32,
) -> Result<u32> {
    let mut m = 1i32;
    let mut symbol = 0;
    for i in 0..num_bits {
        let bit = rd.decode_bit(&mut probs[(offset + m) as usize])?;
        m = (m << 1) | bit as i32;
        symbol |= bit << i;
    }
    Ok(symbol)
}

fn reverse_price_at(probs: &[u16], offset: i32, num_bits: u32, symbol: u32) -> u32 {
    let mut price = 0;
    let mut m = 1i32;
    let mut sym = symbol;
    for _ in 0..num_bits {
        let bit = sym & 1;
        sym >>= 1;
        price += get_price(probs[(offset + m) as usize], bit);
        m = (m << 1) | bit as i32;
    }
    price
}

/// Literal coder: one 8-bit tree per `(position, previous byte)` context,
/// with two extra banks per context for matched-literal coding.
#[derive(Debug)]
pub(crate) struct LiteralCoder {
    probs: Vec<[u16; LITERAL_CODER_SIZE]>,
    lc: u32,
    pos_mask: u32,
}

impl LiteralCoder {
    pub(crate) fn new(lc: u32, lp: u32) -> Self {
        Self {
            probs: vec![[PROB_INIT; LITERAL_CODER_SIZE]; 1 << (lc + lp)],
            lc,
            pos_mask: (1 << lp) - 1,
        }
    }

    pub(crate) fn reset(&mut self) {
        for context in &mut self.probs {
            context.fill(PROB_INIT);
        }
    }

    #[inline]
    fn context(&self, position: u32, prev_byte: u8) -> usize {
        (((position & self.pos_mask) << self.lc) + (u32::from(prev_byte) >> (8 - self.lc))) as usize
    }

    pub(crate) fn encode<W: Write>(
        &mut self,
        rc: &mut RangeEncoder<W>,
        position: u32,
        prev_byte: u8,
        symbol: u8,
    ) -> Result<()> {
        let context = self.context(position, prev_byte);
        let probs = &mut self.probs[context];
        let mut m = 1usize;
        for i in (0..8).rev() {
            let bit = (u32::from(symbol) >> i) & 1;
            rc.encode_bit(&mut probs[m], bit)?;
            m = (m << 1) | bit as usize;
        }
        Ok(())
    }

    /// Encode a literal right after a match, steering by the byte the
    /// dropped match distance would have produced.
    pub(crate) fn encode_matched<W: Write>(
        &mut self,
        rc: &mut RangeEncoder<W>,
        position: u32,
        prev_byte: u8,
        match_byte: u8,
        symbol: u8,
    ) -> Result<()> {
        let context = self.context(position, prev_byte);
        let probs = &mut self.probs[context];
        let mut m = 1usize;
        let mut same = true;
        for i in (0..8).rev() {
            let bit = (u32::from(symbol) >> i) & 1;
            let mut index = m;
            if same {
                let match_bit = (u32::from(match_byte) >> i) & 1;
                index += (1 + match_bit as usize) << 8;
                same = match_bit == bit;
            }
            rc.encode_bit(&mut probs[index], bit)?;
            m = (m << 1) | bit as usize;
        }
        Ok(())
    }

    pub(crate) fn price(
        &self,
        position: u32,
        prev_byte: u8,
        match_mode: bool,
        match_byte: u8,
        symbol: u8,
    ) -> u32 {
        let probs = &self.probs[self.context(position, prev_byte)];
        let mut price = 0;
        let mut m = 1usize;
        let mut i = 7i32;
        if match_mode {
            while i >= 0 {
                let match_bit = (u32::from(match_byte) >> i) & 1;
                let bit = (u32::from(symbol) >> i) & 1;
                price += get_price(probs[((1 + match_bit as usize) << 8) + m], bit);
                m = (m << 1) | bit as usize;
                i -= 1;
                if match_bit != bit {
                    break;
                }
            }
        }
        while i >= 0 {
            let bit = (u32::from(symbol) >> i) & 1;
            price += get_price(probs[m], bit);
            m = (m << 1) | bit as usize;
            i -= 1;
        }
        price
    }

    pub(crate) fn decode<R: Read>(
        &mut self,
        rd: &mut RangeDecoder<R>,
        position: u32,
        prev_byte: u8,
    ) -> Result<u8> {
        let context = self.context(position, prev_byte);
        let probs = &mut self.probs[context];
        let mut m = 1usize;
        for _ in 0..8 {
            m = (m << 1) | rd.decode_bit(&mut probs[m])? as usize;
        }
        Ok((m - 0x100) as u8)
    }

    pub(crate) fn decode_matched<R: Read>(
        &mut self,
        rd: &mut RangeDecoder<R>,
        position: u32,
        prev_byte: u8,
        match_byte: u8,
    ) -> Result<u8> {
        let context = self.context(position, prev_byte);
        let probs = &mut self.probs[context];
        let mut m = 1usize;
        let mut remaining = u32::from(match_byte);
        while m < 0x100 {
            let match_bit = (remaining >> 7) & 1;
            remaining <<= 1;
            let bit = rd.decode_bit(&mut probs[((1 + match_bit as usize) << 8) + m])? as usize;
            m = (m << 1) | bit;
            if match_bit as usize != bit {
                while m < 0x100 {
                    m = (m << 1) | rd.decode_bit(&mut probs[m])? as usize;
                }
                break;
            }
        }
        Ok((m - 0x100) as u8)
    }
}

/// Length coder: a choice ladder over three trees (lengths 2-9, 10-17,
/// 18-273) plus an encoder-side price cache per position state.
#[derive(Debug)]
pub(crate) struct LengthCoder {
    choice: u16,
    choice2: u16,
    low: Vec<[u16; 8]>,
    mid: Vec<[u16; 8]>,
    high: [u16; 256],
    prices: Vec<[u32; LEN_SYMBOLS]>,
    counters: Vec<u32>,
    table_size: u32,
}

impl LengthCoder {
    pub(crate) fn new() -> Self {
        Self {
            choice: PROB_INIT,
            choice2: PROB_INIT,
            low: vec![[PROB_INIT; 8]; POS_STATES_MAX],
            mid: vec![[PROB_INIT; 8]; POS_STATES_MAX],
            high: [PROB_INIT; 256],
            prices: vec![[0; LEN_SYMBOLS]; POS_STATES_MAX],
            counters: vec![0; POS_STATES_MAX],
            table_size: 0,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.choice = PROB_INIT;
        self.choice2 = PROB_INIT;
        for tree in &mut self.low {
            tree.fill(PROB_INIT);
        }
        for tree in &mut self.mid {
            tree.fill(PROB_INIT);
        }
        self.high.fill(PROB_INIT);
    }

    /// Number of length symbols the price cache must cover. The parser never
    /// prices a length above `fast_bytes`, so the cache stops there.
    pub(crate) fn set_table_size(&mut self, table_size: u32) {
        self.table_size = table_size;
    }

    pub(crate) fn update_tables(&mut self, num_pos_states: usize) {
        for pos_state in 0..num_pos_states {
            self.fill_prices(pos_state);
        }
    }

    pub(crate) fn encode<W: Write>(
        &mut self,
        rc: &mut RangeEncoder<W>,
        len: u32,
        pos_state: usize,
    ) -> Result<()> {
        let symbol = len - MATCH_LEN_MIN;
        if symbol < LEN_LOW_SYMBOLS {
            rc.encode_bit(&mut self.choice, 0)?;
            rc.encode_bit_tree(&mut self.low[pos_state], 3, symbol)?;
        } else {
            rc.encode_bit(&mut self.choice, 1)?;
            if symbol < LEN_LOW_SYMBOLS + LEN_MID_SYMBOLS {
                rc.encode_bit(&mut self.choice2, 0)?;
                rc.encode_bit_tree(&mut self.mid[pos_state], 3, symbol - LEN_LOW_SYMBOLS)?;
            } else {
                rc.encode_bit(&mut self.choice2, 1)?;
                rc.encode_bit_tree(
                    &mut self.high,
                    8,
                    symbol - LEN_LOW_SYMBOLS - LEN_MID_SYMBOLS,
                )?;
            }
        }
        if self.counters[pos_state] <= 1 {
            self.fill_prices(pos_state);
        } else {
            self.counters[pos_state] -= 1;
        }
        Ok(())
    }

    #[inline]
    pub(crate) fn price(&self, len: u32, pos_state: usize) -> u32 {
        self.prices[pos_state][(len - MATCH_LEN_MIN) as usize]
    }

    fn fill_prices(&mut self, pos_state: usize) {
        let a0 = get_price0(self.choice);
        let a1 = get_price1(self.choice);
        let b0 = a1 + get_price0(self.choice2);
        let b1 = a1 + get_price1(self.choice2);
        let mut symbol = 0u32;
        while symbol < self.table_size && symbol < LEN_LOW_SYMBOLS {
            self.prices[pos_state][symbol as usize] =
                a0 + get_bit_tree_price(&self.low[pos_state], 3, symbol);
            symbol += 1;
        }
        while symbol < self.table_size && symbol < LEN_LOW_SYMBOLS + LEN_MID_SYMBOLS {
            self.prices[pos_state][symbol as usize] =
                b0 + get_bit_tree_price(&self.mid[pos_state], 3, symbol - LEN_LOW_SYMBOLS);
            symbol += 1;
        }
        while symbol < self.table_size {
            self.prices[pos_state][symbol as usize] = b1
                + get_bit_tree_price(&self.high, 8, symbol - LEN_LOW_SYMBOLS - LEN_MID_SYMBOLS);
            symbol += 1;
        }
        self.counters[pos_state] = self.table_size;
    }

    pub(crate) fn decode<R: Read>(
        &mut self,
        rd: &mut RangeDecoder<R>,
        pos_state: usize,
    ) -> Result<u32> {
        if rd.decode_bit(&mut self.choice)? == 0 {
            Ok(MATCH_LEN_MIN + rd.decode_bit_tree(&mut self.low[pos_state], 3)?)
        } else if rd.decode_bit(&mut self.choice2)? == 0 {
            Ok(MATCH_LEN_MIN + LEN_LOW_SYMBOLS + rd.decode_bit_tree(&mut self.mid[pos_state], 3)?)
        } else {
            Ok(MATCH_LEN_MIN
                + LEN_LOW_SYMBOLS
                + LEN_MID_SYMBOLS
                + rd.decode_bit_tree(&mut self.high, 8)?)
        }
    }
}

/// Distance coder: a 6-bit slot tree per length class, special probabilities
/// for slots 4-13, direct bits plus a 4-bit align tree above that.
///
/// The encoder-side price caches are refreshed lazily: distance prices after
/// 128 new distances, align prices after 16 align encodes. Slot 63 with all
/// extra bits set codes the end-of-stream distance `0xFFFF_FFFF`.
#[derive(Debug)]
pub(crate) struct DistanceCoder {
    slot_probs: [[u16; NUM_SLOTS]; NUM_LEN_TO_POS_STATES],
    special_probs: [u16; NUM_SPECIAL_PROBS],
    align_probs: [u16; ALIGN_SIZE],
    slot_prices: [[u32; NUM_SLOTS]; NUM_LEN_TO_POS_STATES],
    dist_prices: [[u32; NUM_FULL_DISTANCES]; NUM_LEN_TO_POS_STATES],
    align_prices: [u32; ALIGN_SIZE],
    dist_table_size: u32,
    match_price_count: u32,
    align_price_count: u32,
}

impl DistanceCoder {
    pub(crate) fn new() -> Self {
        Self {
            slot_probs: [[PROB_INIT; NUM_SLOTS]; NUM_LEN_TO_POS_STATES],
            special_probs: [PROB_INIT; NUM_SPECIAL_PROBS],
            align_probs: [PROB_INIT; ALIGN_SIZE],
            slot_prices: [[0; NUM_SLOTS]; NUM_LEN_TO_POS_STATES],
            dist_prices: [[0; NUM_FULL_DISTANCES]; NUM_LEN_TO_POS_STATES],
            align_prices: [0; ALIGN_SIZE],
            dist_table_size: 0,
            match_price_count: 0,
            align_price_count: 0,
        }
    }

    pub(crate) fn reset(&mut self) {
        for tree in &mut self.slot_probs {
            tree.fill(PROB_INIT);
        }
        self.special_probs.fill(PROB_INIT);
        self.align_probs.fill(PROB_INIT);
    }

    pub(crate) fn set_dict_size(&mut self, dict_size: u32) {
        let mut log = 0;
        while (1u32 << log) < dict_size {
            log += 1;
        }
        self.dist_table_size = log * 2;
    }

    pub(crate) fn encode<W: Write>(
        &mut self,
        rc: &mut RangeEncoder<W>,
        len: u32,
        dist: u32,
    ) -> Result<()> {
        let slot = dist_slot(dist);
        rc.encode_bit_tree(&mut self.slot_probs[len_state(len)], NUM_SLOT_BITS, slot)?;
        if slot >= START_POS_MODEL_INDEX {
            let footer_bits = (slot >> 1) - 1;
            let base = (2 | (slot & 1)) << footer_bits;
            let reduced = dist - base;
            if slot < END_POS_MODEL_INDEX {
                reverse_encode_at(
                    rc,
                    &mut self.special_probs,
                    base as i32 - slot as i32 - 1,
                    footer_bits,
                    reduced,
                )?;
            } else {
                rc.encode_direct_bits(reduced >> NUM_ALIGN_BITS, footer_bits - NUM_ALIGN_BITS)?;
                rc.encode_bit_tree_reverse(
                    &mut self.align_probs,
                    NUM_ALIGN_BITS,
                    reduced & ALIGN_MASK,
                )?;
                self.align_price_count += 1;
            }
        }
        self.match_price_count += 1;
        Ok(())
    }

    pub(crate) fn decode<R: Read>(&mut self, rd: &mut RangeDecoder<R>, len: u32) -> Result<u32> {
        let slot = rd.decode_bit_tree(&mut self.slot_probs[len_state(len)], NUM_SLOT_BITS)?;
        if slot < START_POS_MODEL_INDEX {
            return Ok(slot);
        }
        let footer_bits = (slot >> 1) - 1;
        let base = (2 | (slot & 1)) << footer_bits;
        if slot < END_POS_MODEL_INDEX {
            let low = reverse_decode_at(
                rd,
                &mut self.special_probs,
                base as i32 - slot as i32 - 1,
                footer_bits,
            )?;
            Ok(base + low)
        } else {
            let high = rd.decode_direct_bits(footer_bits - NUM_ALIGN_BITS)? << NUM_ALIGN_BITS;
            let align = rd.decode_bit_tree_reverse(&mut self.align_probs, NUM_ALIGN_BITS)?;
            Ok(base + high + align)
        }
    }

    /// Cached price of the distance part of a match (length part excluded).
    #[inline]
    pub(crate) fn price(&self, len: u32, dist: u32) -> u32 {
        let class = len_state(len);
        if dist < NUM_FULL_DISTANCES as u32 {
            self.dist_prices[class][dist as usize]
        } else {
            self.slot_prices[class][dist_slot(dist) as usize]
                + self.align_prices[(dist & ALIGN_MASK) as usize]
        }
    }

    pub(crate) fn fill_distance_prices(&mut self) {
        let mut temp = [0u32; NUM_FULL_DISTANCES];
        for dist in START_POS_MODEL_INDEX..NUM_FULL_DISTANCES as u32 {
            let slot = dist_slot(dist);
            let footer_bits = (slot >> 1) - 1;
            let base = (2 | (slot & 1)) << footer_bits;
            temp[dist as usize] = reverse_price_at(
                &self.special_probs,
                base as i32 - slot as i32 - 1,
                footer_bits,
                dist - base,
            );
        }
        for class in 0..NUM_LEN_TO_POS_STATES {
            for slot in 0..self.dist_table_size {
                self.slot_prices[class][slot as usize] =
                    get_bit_tree_price(&self.slot_probs[class], NUM_SLOT_BITS, slot);
            }
            for slot in END_POS_MODEL_INDEX..self.dist_table_size {
                self.slot_prices[class][slot as usize] +=
                    ((slot >> 1) - 1 - NUM_ALIGN_BITS) << PRICE_SHIFT_BITS;
            }
            for dist in 0..START_POS_MODEL_INDEX as usize {
                self.dist_prices[class][dist] = self.slot_prices[class][dist];
            }
            for dist in START_POS_MODEL_INDEX as usize..NUM_FULL_DISTANCES {
                self.dist_prices[class][dist] =
                    self.slot_prices[class][dist_slot(dist as u32) as usize] + temp[dist];
            }
        }
        self.match_price_count = 0;
    }

    pub(crate) fn fill_align_prices(&mut self) {
        for symbol in 0..ALIGN_SIZE {
            self.align_prices[symbol] =
                get_bit_tree_reverse_price(&self.align_probs, NUM_ALIGN_BITS, symbol as u32);
        }
        self.align_price_count = 0;
    }

    /// Refresh whichever price caches have gone stale. Called between
    /// tokens, never inside a lattice fill.
    pub(crate) fn refresh_if_stale(&mut self) {
        if self.match_price_count >= MATCH_PRICE_REFRESH {
            self.fill_distance_prices();
        }
        if self.align_price_count >= ALIGN_SIZE as u32 {
            self.fill_align_prices();
        }
    }
}

/// All adaptive contexts of one LZMA stream, plus the encoder price caches.
#[derive(Debug)]
pub(crate) struct ContextModels {
    pub(crate) is_match: [[u16; POS_STATES_MAX]; NUM_STATES],
    pub(crate) is_rep: [u16; NUM_STATES],
    pub(crate) is_rep_g0: [u16; NUM_STATES],
    pub(crate) is_rep_g1: [u16; NUM_STATES],
    pub(crate) is_rep_g2: [u16; NUM_STATES],
    pub(crate) is_rep0_long: [[u16; POS_STATES_MAX]; NUM_STATES],
    pub(crate) literal: LiteralCoder,
    pub(crate) match_len: LengthCoder,
    pub(crate) rep_len: LengthCoder,
    pub(crate) distance: DistanceCoder,
}

impl ContextModels {
    pub(crate) fn new(lc: u32, lp: u32) -> Self {
        Self {
            is_match: [[PROB_INIT; POS_STATES_MAX]; NUM_STATES],
            is_rep: [PROB_INIT; NUM_STATES],
            is_rep_g0: [PROB_INIT; NUM_STATES],
            is_rep_g1: [PROB_INIT; NUM_STATES],
            is_rep_g2: [PROB_INIT; NUM_STATES],
            is_rep0_long: [[PROB_INIT; POS_STATES_MAX]; NUM_STATES],
            literal: LiteralCoder::new(lc, lp),
            match_len: LengthCoder::new(),
            rep_len: LengthCoder::new(),
            distance: DistanceCoder::new(),
        }
    }

    /// Reset every probability to one half for a fresh stream.
    pub(crate) fn reset(&mut self) {
        for row in &mut self.is_match {
            row.fill(PROB_INIT);
        }
        self.is_rep.fill(PROB_INIT);
        self.is_rep_g0.fill(PROB_INIT);
        self.is_rep_g1.fill(PROB_INIT);
        self.is_rep_g2.fill(PROB_INIT);
        for row in &mut self.is_rep0_long {
            row.fill(PROB_INIT);
        }
        self.literal.reset();
        self.match_len.reset();
        self.rep_len.reset();
        self.distance.reset();
    }

    /// Build the encoder price caches. Must run after [`reset`](Self::reset)
    /// and before the first token is priced.
    pub(crate) fn init_price_tables(
        &mut self,
        fast_bytes: u32,
        dict_size: u32,
        num_pos_states: usize,
    ) {
        let table_size = fast_bytes + 1 - MATCH_LEN_MIN;
        self.match_len.set_table_size(table_size);
        self.rep_len.set_table_size(table_size);
        self.match_len.update_tables(num_pos_states);
        self.rep_len.update_tables(num_pos_states);
        self.distance.set_dict_size(dict_size);
        self.distance.fill_distance_prices();
        self.distance.fill_align_prices();
    }
}

impl PriceOracle for ContextModels {
    #[inline]
    fn literal_entry_price(&self, state: State, pos_state: u32) -> u32 {
        get_price0(self.is_match[state.index()][pos_state as usize])
    }

    #[inline]
    fn match_entry_price(&self, state: State, pos_state: u32) -> u32 {
        get_price1(self.is_match[state.index()][pos_state as usize])
            + get_price0(self.is_rep[state.index()])
    }

    #[inline]
    fn rep_entry_price(&self, state: State, pos_state: u32) -> u32 {
        get_price1(self.is_match[state.index()][pos_state as usize])
            + get_price1(self.is_rep[state.index()])
    }

    #[inline]
    fn literal_price(
        &self,
        position: u32,
        prev_byte: u8,
        match_mode: bool,
        match_byte: u8,
        symbol: u8,
    ) -> u32 {
        self.literal
            .price(position, prev_byte, match_mode, match_byte, symbol)
    }

    #[inline]
    fn short_rep_price(&self, state: State, pos_state: u32) -> u32 {
        get_price0(self.is_rep_g0[state.index()])
            + get_price0(self.is_rep0_long[state.index()][pos_state as usize])
    }

    fn rep_select_price(&self, rep_index: usize, state: State, pos_state: u32) -> u32 {
        if rep_index == 0 {
            get_price0(self.is_rep_g0[state.index()])
                + get_price1(self.is_rep0_long[state.index()][pos_state as usize])
        } else {
            let mut price = get_price1(self.is_rep_g0[state.index()]);
            if rep_index == 1 {
                price += get_price0(self.is_rep_g1[state.index()]);
            } else {
                price += get_price1(self.is_rep_g1[state.index()]);
                price += get_price(self.is_rep_g2[state.index()], rep_index as u32 - 2);
            }
            price
        }
    }

    #[inline]
    fn rep_price(&self, rep_index: usize, len: u32, state: State, pos_state: u32) -> u32 {
        self.rep_len.price(len, pos_state as usize)
            + self.rep_select_price(rep_index, state, pos_state)
    }

    #[inline]
    fn rep_len_price(&self, len: u32, pos_state: u32) -> u32 {
        self.rep_len.price(len, pos_state as usize)
    }

    #[inline]
    fn match_price(&self, dist: u32, len: u32, pos_state: u32) -> u32 {
        self.match_len.price(len, pos_state as usize) + self.distance.price(len, dist)
    }
}

/// The `lc`/`lp`/`pb` parameter triple of an LZMA stream.
///
/// The triple packs into a single byte as `(pb * 5 + lp) * 9 + lc`, which is
/// always below 225 for valid parameters. Together with the dictionary size
/// it forms the five-byte header that prefixes a `.lzma` stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LzmaProperties {
    /// Literal context bits, `0..=8`. High bits of the previous byte that
    /// select the literal probability context.
    pub lc: u32,
    /// Literal position bits, `0..=4`.
    pub lp: u32,
    /// Position bits, `0..=4`. Low bits of the position that select the
    /// token probability context.
    pub pb: u32,
}

impl LzmaProperties {
    /// Create a validated parameter triple.
    pub fn new(lc: u32, lp: u32, pb: u32) -> Result<Self> {
        if lc > 8 {
            return Err(RuzmaError::invalid_parameter(
                "lc",
                format!("must be in 0..=8, got {lc}"),
            ));
        }
        if lp > 4 {
            return Err(RuzmaError::invalid_parameter(
                "lp",
                format!("must be in 0..=4, got {lp}"),
            ));
        }
        if pb > 4 {
            return Err(RuzmaError::invalid_parameter(
                "pb",
                format!("must be in 0..=4, got {pb}"),
            ));
        }
        Ok(Self { lc, lp, pb })
    }

    /// Pack the triple into its header byte.
    pub fn to_byte(self) -> u8 {
        ((self.pb * 5 + self.lp) * 9 + self.lc) as u8
    }

    /// Unpack a header byte.
    pub fn from_byte(byte: u8) -> Result<Self> {
        if byte >= 225 {
            return Err(RuzmaError::invalid_header(format!(
                "properties byte {byte} out of range"
            )));
        }
        let value = u32::from(byte);
        Ok(Self {
            lc: value % 9,
            lp: (value / 9) % 5,
            pb: value / 45,
        })
    }

    /// Write the five-byte stream header: the packed properties byte
    /// followed by the dictionary size as a little-endian u32.
    pub fn write_header<W: Write>(self, dict_size: u32, writer: &mut W) -> Result<()> {
        writer.write_all(&[self.to_byte()])?;
        writer.write_all(&dict_size.to_le_bytes())?;
        Ok(())
    }

    /// Read a five-byte stream header back.
    pub fn read_header<R: Read>(reader: &mut R) -> Result<(Self, u32)> {
        let mut header = [0u8; 5];
        reader.read_exact(&mut header)?;
        let props = Self::from_byte(header[0])?;
        let dict_size = u32::from_le_bytes([header[1], header[2], header[3], header[4]]);
        Ok((props, dict_size))
    }
}
