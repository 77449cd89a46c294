//! Optimal parse engine: the lattice search that picks each token.
//!
//! For every stream position the encoder chooses between a literal, a fresh
//! (length, distance) match, one of the four most recent distances, or the
//! single-byte rep0 short rep. [`OptimalParser`] prices every viable choice
//! over a bounded lookahead, relaxes a forward dynamic program across a
//! 4096-node lattice, and walks the cheapest path backwards into concrete
//! [`Token`]s. One search usually settles several tokens: the reconstructed
//! path is cached and drained by later calls without searching again.
//!
//! Two greedy shortcuts skip the lattice entirely: a rep run or a fresh match
//! already reaching `fast_bytes` is taken whole, and a match of that length
//! discovered mid-search ends the search early and is stashed for the next
//! call. Beyond plain steps the forward pass also relaxes three two-step
//! combinations (literal+rep0, rep+literal+rep0, match+literal+rep0) that
//! model the cheap "rep0 right after a literal" encoding.
//!
//! Prices come from a [`PriceOracle`] so the search never touches the
//! adaptive models, and candidates come from a
//! [`MatchFinder`](crate::match_finder::MatchFinder). Relaxations use strict
//! `<` except the forward short-rep step, where `<=` lets the shorter token
//! win a price tie; the asymmetry keeps the output identical to the
//! reference encoder and must not be normalized away.

use ruzma_core::error::Result;

use crate::match_finder::{MatchFinder, MatchPair};
use crate::model::{MATCH_LEN_MAX, NUM_REPS, State};

/// Lattice capacity; the search never looks further ahead than this.
pub(crate) const NUM_OPT_NODES: usize = 1 << 12;

/// Back-reference sentinel for a literal step. Kept as a reserved maximum
/// instead of a signed value so rep indexing stays branch-free.
const LITERAL_BACK: u32 = u32::MAX;

/// Price of a lattice node no path has reached yet.
const INFINITY_PRICE: u32 = 0x0FFF_FFFF;

/// Read-only pricing surface the parse engine searches against.
///
/// Every method returns a cost in 1/64-bit units under the current adaptive
/// models; none of them mutates anything. The entry prices cover the token
/// class bits (`is_match`, `is_rep`), the rest cover payloads.
pub(crate) trait PriceOracle {
    /// Price of the `is_match = 0` bit opening a literal.
    fn literal_entry_price(&self, state: State, pos_state: u32) -> u32;
    /// Price of the `is_match = 1`, `is_rep = 0` bits opening a fresh match.
    fn match_entry_price(&self, state: State, pos_state: u32) -> u32;
    /// Price of the `is_match = 1`, `is_rep = 1` bits opening a rep.
    fn rep_entry_price(&self, state: State, pos_state: u32) -> u32;
    /// Price of a literal payload, in matched mode when `match_mode` is set.
    fn literal_price(
        &self,
        position: u32,
        prev_byte: u8,
        match_mode: bool,
        match_byte: u8,
        symbol: u8,
    ) -> u32;
    /// Price of the short-rep selector bits after the rep entry.
    fn short_rep_price(&self, state: State, pos_state: u32) -> u32;
    /// Price of the selector bits naming `rep_index`, without a length.
    fn rep_select_price(&self, rep_index: usize, state: State, pos_state: u32) -> u32;
    /// Price of a full rep payload: selector bits plus length.
    fn rep_price(&self, rep_index: usize, len: u32, state: State, pos_state: u32) -> u32;
    /// Price of a rep length alone.
    fn rep_len_price(&self, len: u32, pos_state: u32) -> u32;
    /// Price of a fresh match payload: length plus coded distance.
    fn match_price(&self, dist: u32, len: u32, pos_state: u32) -> u32;
}

/// One decision on the chosen path.
///
/// Lengths count consumed bytes and a literal always consumes one. `Rep`
/// with index 0 and length 1 is the short rep. Match distances are coded
/// (real distance minus one).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Token {
    /// Emit the next byte verbatim through the literal coder.
    Literal,
    /// Reuse the `index`-th most recent distance for `len` bytes.
    Rep { index: usize, len: u32 },
    /// A fresh match at coded distance `dist` for `len` bytes.
    Match { dist: u32, len: u32 },
}

impl Token {
    /// Bytes this token consumes.
    pub(crate) fn len(self) -> u32 {
        match self {
            Token::Literal => 1,
            Token::Rep { len, .. } | Token::Match { len, .. } => len,
        }
    }
}

/// Decode the lattice back-reference encoding into a token.
fn token_from(len: u32, back: u32) -> Token {
    if back == LITERAL_BACK {
        Token::Literal
    } else if (back as usize) < NUM_REPS {
        Token::Rep {
            index: back as usize,
            len,
        }
    } else {
        Token::Match {
            dist: back - NUM_REPS as u32,
            len,
        }
    }
}

/// One lattice entry: the cheapest known way to reach a lookahead offset.
///
/// `back_prev`/`pos_prev` describe the final step into the node. The combo
/// flags mark the two-step endings: `prev1_is_literal` says the step was
/// preceded by a literal, and `prev2` says that literal was itself preceded
/// by the match stored in `pos_prev2`/`back_prev2`.
#[derive(Debug, Clone, Copy)]
struct Node {
    price: u32,
    pos_prev: u32,
    back_prev: u32,
    prev1_is_literal: bool,
    prev2: bool,
    pos_prev2: u32,
    back_prev2: u32,
    state: State,
    backs: [u32; NUM_REPS],
}

impl Node {
    fn new() -> Self {
        Self {
            price: 0,
            pos_prev: 0,
            back_prev: 0,
            prev1_is_literal: false,
            prev2: false,
            pos_prev2: 0,
            back_prev2: 0,
            state: State::new(),
            backs: [0; NUM_REPS],
        }
    }

    fn make_literal(&mut self) {
        self.back_prev = LITERAL_BACK;
        self.prev1_is_literal = false;
    }

    fn make_short_rep(&mut self) {
        self.back_prev = 0;
        self.prev1_is_literal = false;
    }

    fn is_short_rep(&self) -> bool {
        self.back_prev == 0
    }
}

/// The lattice parser. Owns the DP arena, the candidate buffer, and the
/// lookahead debt against the match finder (`additional_offset`: how many
/// bytes the finder's cursor is ahead of the last emitted byte).
pub(crate) struct OptimalParser {
    nodes: Vec<Node>,
    pairs: Vec<MatchPair>,
    reps: [u32; NUM_REPS],
    rep_lens: [u32; NUM_REPS],
    opt_cur: usize,
    opt_end: usize,
    /// A match >= `fast_bytes` found mid-search, kept for the next search.
    stashed_len: Option<u32>,
    additional_offset: u32,
    fast_bytes: u32,
    pos_state_mask: u32,
}

impl OptimalParser {
    pub(crate) fn new(fast_bytes: u32, pb: u32) -> Self {
        Self {
            nodes: vec![Node::new(); NUM_OPT_NODES],
            pairs: Vec::with_capacity(MATCH_LEN_MAX as usize + 1),
            reps: [0; NUM_REPS],
            rep_lens: [0; NUM_REPS],
            opt_cur: 0,
            opt_end: 0,
            stashed_len: None,
            additional_offset: 0,
            fast_bytes,
            pos_state_mask: (1 << pb) - 1,
        }
    }

    /// Clear per-stream state for a fresh encoding session.
    pub(crate) fn reset(&mut self) {
        self.opt_cur = 0;
        self.opt_end = 0;
        self.stashed_len = None;
        self.additional_offset = 0;
    }

    /// How far the match finder's cursor is ahead of the coder.
    pub(crate) fn additional_offset(&self) -> u32 {
        self.additional_offset
    }

    /// Settle `len` emitted bytes against the lookahead debt.
    pub(crate) fn consume(&mut self, len: u32) {
        debug_assert!(len <= self.additional_offset);
        self.additional_offset -= len;
    }

    /// Pull the next candidate set and advance the finder one byte.
    ///
    /// Returns the longest candidate length, extended up to
    /// [`MATCH_LEN_MAX`] when it hits the finder's own reporting cap.
    pub(crate) fn read_match_distances<M: MatchFinder>(&mut self, finder: &mut M) -> Result<u32> {
        finder.get_matches(&mut self.pairs)?;
        self.additional_offset += 1;
        let mut len = 0;
        if let Some(last) = self.pairs.last() {
            len = last.len;
            if len == self.fast_bytes {
                len += finder.match_len(len as i32 - 1, last.dist, MATCH_LEN_MAX - len);
            }
        }
        Ok(len)
    }

    fn move_pos<M: MatchFinder>(&mut self, finder: &mut M, num: u32) -> Result<()> {
        if num > 0 {
            finder.skip(num)?;
            self.additional_offset += num;
        }
        Ok(())
    }

    /// Determine the next token starting at `position`.
    ///
    /// `state`, `rep_set` and `prev_byte` are the coder's session state at
    /// that position. A cached path from an earlier search is drained first;
    /// otherwise a fresh lattice search runs against `oracle` and `finder`.
    pub(crate) fn next_token<O: PriceOracle, M: MatchFinder>(
        &mut self,
        mut position: u32,
        state: State,
        rep_set: [u32; NUM_REPS],
        prev_byte: u8,
        oracle: &O,
        finder: &mut M,
    ) -> Result<Token> {
        if self.opt_end != self.opt_cur {
            let len = self.nodes[self.opt_cur].pos_prev - self.opt_cur as u32;
            let back = self.nodes[self.opt_cur].back_prev;
            self.opt_cur = self.nodes[self.opt_cur].pos_prev as usize;
            return Ok(token_from(len, back));
        }
        self.opt_cur = 0;
        self.opt_end = 0;

        let len_main = match self.stashed_len.take() {
            Some(len) => len,
            None => self.read_match_distances(finder)?,
        };
        let mut num_pairs = self.pairs.len();

        if finder.available_bytes().wrapping_add(1) < 2 {
            return Ok(Token::Literal);
        }

        let mut rep_max_index = 0;
        for i in 0..NUM_REPS {
            self.reps[i] = rep_set[i];
            self.rep_lens[i] = finder.match_len(-1, rep_set[i], MATCH_LEN_MAX);
            if self.rep_lens[i] > self.rep_lens[rep_max_index] {
                rep_max_index = i;
            }
        }
        if self.rep_lens[rep_max_index] >= self.fast_bytes {
            let len = self.rep_lens[rep_max_index];
            self.move_pos(finder, len - 1)?;
            return Ok(Token::Rep {
                index: rep_max_index,
                len,
            });
        }
        if len_main >= self.fast_bytes {
            let dist = self.pairs[num_pairs - 1].dist;
            self.move_pos(finder, len_main - 1)?;
            return Ok(Token::Match {
                dist,
                len: len_main,
            });
        }

        let mut current_byte = finder.byte_at(-1);
        let mut match_byte = finder.byte_at(-(rep_set[0] as i32) - 2);
        if len_main < 2 && current_byte != match_byte && self.rep_lens[rep_max_index] < 2 {
            return Ok(Token::Literal);
        }

        self.nodes[0].state = state;
        let mut pos_state = position & self.pos_state_mask;

        self.nodes[1].price = oracle.literal_entry_price(state, pos_state)
            + oracle.literal_price(
                position,
                prev_byte,
                !state.is_literal(),
                match_byte,
                current_byte,
            );
        self.nodes[1].make_literal();

        let mut rep_match_price = oracle.rep_entry_price(state, pos_state);
        if match_byte == current_byte {
            let short_rep_price = rep_match_price + oracle.short_rep_price(state, pos_state);
            if short_rep_price < self.nodes[1].price {
                self.nodes[1].price = short_rep_price;
                self.nodes[1].make_short_rep();
            }
        }

        let mut len_end = len_main.max(self.rep_lens[rep_max_index]) as usize;
        if len_end < 2 {
            return Ok(token_from(1, self.nodes[1].back_prev));
        }
        self.nodes[1].pos_prev = 0;
        self.nodes[0].backs = self.reps;

        for len in (2..=len_end).rev() {
            self.nodes[len].price = INFINITY_PRICE;
        }

        for i in 0..NUM_REPS {
            let mut rep_len = self.rep_lens[i];
            if rep_len < 2 {
                continue;
            }
            let select_price = rep_match_price + oracle.rep_select_price(i, state, pos_state);
            while rep_len >= 2 {
                let price = select_price + oracle.rep_len_price(rep_len, pos_state);
                let node = &mut self.nodes[rep_len as usize];
                if price < node.price {
                    node.price = price;
                    node.pos_prev = 0;
                    node.back_prev = i as u32;
                    node.prev1_is_literal = false;
                }
                rep_len -= 1;
            }
        }

        let mut normal_match_price = oracle.match_entry_price(state, pos_state);
        let mut len = if self.rep_lens[0] >= 2 {
            self.rep_lens[0] + 1
        } else {
            2
        };
        if len <= len_main {
            let mut offs = 0;
            while len > self.pairs[offs].len {
                offs += 1;
            }
            loop {
                let dist = self.pairs[offs].dist;
                let price = normal_match_price + oracle.match_price(dist, len, pos_state);
                let node = &mut self.nodes[len as usize];
                if price < node.price {
                    node.price = price;
                    node.pos_prev = 0;
                    node.back_prev = dist + NUM_REPS as u32;
                    node.prev1_is_literal = false;
                }
                if len == self.pairs[offs].len {
                    offs += 1;
                    if offs == num_pairs {
                        break;
                    }
                }
                len += 1;
            }
        }

        let mut cur = 0usize;
        loop {
            cur += 1;
            if cur == len_end {
                return Ok(self.backward(cur));
            }
            let new_len_raw = self.read_match_distances(finder)?;
            num_pairs = self.pairs.len();
            if new_len_raw >= self.fast_bytes {
                self.stashed_len = Some(new_len_raw);
                return Ok(self.backward(cur));
            }
            let mut new_len = new_len_raw;
            position = position.wrapping_add(1);

            // Re-derive the state and rep set produced by the best path
            // into `cur`, then snapshot them on the node.
            let cur_node = self.nodes[cur];
            let mut pos_prev = cur_node.pos_prev as usize;
            let mut state = if cur_node.prev1_is_literal {
                pos_prev -= 1;
                let mut s = if cur_node.prev2 {
                    let mut s = self.nodes[cur_node.pos_prev2 as usize].state;
                    if (cur_node.back_prev2 as usize) < NUM_REPS {
                        s.update_rep();
                    } else {
                        s.update_match();
                    }
                    s
                } else {
                    self.nodes[pos_prev].state
                };
                s.update_literal();
                s
            } else {
                self.nodes[pos_prev].state
            };
            if pos_prev == cur - 1 {
                // Single-byte step; the rep set carries over unchanged.
                if cur_node.is_short_rep() {
                    state.update_short_rep();
                } else {
                    state.update_literal();
                }
            } else {
                let back;
                if cur_node.prev1_is_literal && cur_node.prev2 {
                    pos_prev = cur_node.pos_prev2 as usize;
                    back = cur_node.back_prev2;
                    state.update_rep();
                } else {
                    back = cur_node.back_prev;
                    if (back as usize) < NUM_REPS {
                        state.update_rep();
                    } else {
                        state.update_match();
                    }
                }
                let prev_backs = self.nodes[pos_prev].backs;
                if (back as usize) < NUM_REPS {
                    let k = back as usize;
                    self.reps[0] = prev_backs[k];
                    let mut j = 1;
                    for (i, &b) in prev_backs.iter().enumerate() {
                        if i != k {
                            self.reps[j] = b;
                            j += 1;
                        }
                    }
                } else {
                    self.reps[0] = back - NUM_REPS as u32;
                    self.reps[1] = prev_backs[0];
                    self.reps[2] = prev_backs[1];
                    self.reps[3] = prev_backs[2];
                }
            }
            self.nodes[cur].state = state;
            self.nodes[cur].backs = self.reps;
            let cur_price = self.nodes[cur].price;

            current_byte = finder.byte_at(-1);
            match_byte = finder.byte_at(-(self.reps[0] as i32) - 2);
            pos_state = position & self.pos_state_mask;

            let literal_price = cur_price
                + oracle.literal_entry_price(state, pos_state)
                + oracle.literal_price(
                    position,
                    finder.byte_at(-2),
                    !state.is_literal(),
                    match_byte,
                    current_byte,
                );

            let mut next_settled = false;
            if literal_price < self.nodes[cur + 1].price {
                let next = &mut self.nodes[cur + 1];
                next.price = literal_price;
                next.pos_prev = cur as u32;
                next.make_literal();
                next_settled = true;
            }

            rep_match_price = cur_price + oracle.rep_entry_price(state, pos_state);

            if match_byte == current_byte
                && !(self.nodes[cur + 1].pos_prev < cur as u32
                    && self.nodes[cur + 1].back_prev == 0)
            {
                let short_rep_price = rep_match_price + oracle.short_rep_price(state, pos_state);
                // The one non-strict relaxation: on a price tie the short
                // rep beats the literal.
                if short_rep_price <= self.nodes[cur + 1].price {
                    let next = &mut self.nodes[cur + 1];
                    next.price = short_rep_price;
                    next.pos_prev = cur as u32;
                    next.make_short_rep();
                    next_settled = true;
                }
            }

            let num_avail_full =
                (finder.available_bytes().wrapping_add(1)).min((NUM_OPT_NODES - 1 - cur) as u32);
            if num_avail_full < 2 {
                continue;
            }
            let num_avail = num_avail_full.min(self.fast_bytes);

            if !next_settled && match_byte != current_byte {
                // Literal, then a rep0 run starting on the next byte.
                let limit = (num_avail_full - 1).min(self.fast_bytes);
                let rep0_len = finder.match_len(0, self.reps[0], limit);
                if rep0_len >= 2 {
                    let mut state2 = state;
                    state2.update_literal();
                    let pos_state_next = position.wrapping_add(1) & self.pos_state_mask;
                    let entry = literal_price + oracle.rep_entry_price(state2, pos_state_next);
                    let offset = cur + 1 + rep0_len as usize;
                    while len_end < offset {
                        len_end += 1;
                        self.nodes[len_end].price = INFINITY_PRICE;
                    }
                    let price = entry + oracle.rep_price(0, rep0_len, state2, pos_state_next);
                    let node = &mut self.nodes[offset];
                    if price < node.price {
                        node.price = price;
                        node.pos_prev = (cur + 1) as u32;
                        node.back_prev = 0;
                        node.prev1_is_literal = true;
                        node.prev2 = false;
                    }
                }
            }

            let mut start_len = 2u32;

            for rep_index in 0..NUM_REPS {
                let rep_len = finder.match_len(-1, self.reps[rep_index], num_avail);
                if rep_len < 2 {
                    continue;
                }
                let mut len_test = rep_len;
                loop {
                    while len_end < cur + len_test as usize {
                        len_end += 1;
                        self.nodes[len_end].price = INFINITY_PRICE;
                    }
                    let price =
                        rep_match_price + oracle.rep_price(rep_index, len_test, state, pos_state);
                    let node = &mut self.nodes[cur + len_test as usize];
                    if price < node.price {
                        node.price = price;
                        node.pos_prev = cur as u32;
                        node.back_prev = rep_index as u32;
                        node.prev1_is_literal = false;
                    }
                    len_test -= 1;
                    if len_test < 2 {
                        break;
                    }
                }
                let len_test = rep_len;

                if rep_index == 0 {
                    // Shorter fresh matches cannot beat the rep0 run.
                    start_len = len_test + 1;
                }

                if len_test < num_avail_full {
                    // Rep, then a literal, then a rep0 run.
                    let limit = (num_avail_full - 1 - len_test).min(self.fast_bytes);
                    let rep0_len = finder.match_len(len_test as i32, self.reps[rep_index], limit);
                    if rep0_len >= 2 {
                        let mut state2 = state;
                        state2.update_rep();
                        let mut pos_state_next =
                            position.wrapping_add(len_test) & self.pos_state_mask;
                        let through_literal = rep_match_price
                            + oracle.rep_price(rep_index, len_test, state, pos_state)
                            + oracle.literal_entry_price(state2, pos_state_next)
                            + oracle.literal_price(
                                position.wrapping_add(len_test),
                                finder.byte_at(len_test as i32 - 2),
                                true,
                                finder.byte_at(
                                    len_test as i32 - 2 - self.reps[rep_index] as i32,
                                ),
                                finder.byte_at(len_test as i32 - 1),
                            );
                        state2.update_literal();
                        pos_state_next =
                            position.wrapping_add(len_test).wrapping_add(1) & self.pos_state_mask;
                        let entry =
                            through_literal + oracle.rep_entry_price(state2, pos_state_next);
                        let offset = len_test as usize + 1 + rep0_len as usize;
                        while len_end < cur + offset {
                            len_end += 1;
                            self.nodes[len_end].price = INFINITY_PRICE;
                        }
                        let price = entry + oracle.rep_price(0, rep0_len, state2, pos_state_next);
                        let node = &mut self.nodes[cur + offset];
                        if price < node.price {
                            node.price = price;
                            node.pos_prev = (cur + len_test as usize + 1) as u32;
                            node.back_prev = 0;
                            node.prev1_is_literal = true;
                            node.prev2 = true;
                            node.pos_prev2 = cur as u32;
                            node.back_prev2 = rep_index as u32;
                        }
                    }
                }
            }

            if new_len > num_avail {
                // Clamp the freshly read candidates to the lattice frontier.
                new_len = num_avail;
                let mut idx = 0;
                while new_len > self.pairs[idx].len {
                    idx += 1;
                }
                self.pairs[idx].len = new_len;
                self.pairs.truncate(idx + 1);
                num_pairs = idx + 1;
            }
            if new_len >= start_len {
                normal_match_price = cur_price + oracle.match_entry_price(state, pos_state);
                while len_end < cur + new_len as usize {
                    len_end += 1;
                    self.nodes[len_end].price = INFINITY_PRICE;
                }

                let mut offs = 0;
                while start_len > self.pairs[offs].len {
                    offs += 1;
                }
                let mut len_test = start_len;
                loop {
                    let cur_back = self.pairs[offs].dist;
                    let match_price =
                        normal_match_price + oracle.match_price(cur_back, len_test, pos_state);
                    {
                        let node = &mut self.nodes[cur + len_test as usize];
                        if match_price < node.price {
                            node.price = match_price;
                            node.pos_prev = cur as u32;
                            node.back_prev = cur_back + NUM_REPS as u32;
                            node.prev1_is_literal = false;
                        }
                    }
                    if len_test == self.pairs[offs].len {
                        if len_test < num_avail_full {
                            // Match, then a literal, then a rep0 run.
                            let limit = (num_avail_full - 1 - len_test).min(self.fast_bytes);
                            let rep0_len = finder.match_len(len_test as i32, cur_back, limit);
                            if rep0_len >= 2 {
                                let mut state2 = state;
                                state2.update_match();
                                let mut pos_state_next =
                                    position.wrapping_add(len_test) & self.pos_state_mask;
                                let through_literal = match_price
                                    + oracle.literal_entry_price(state2, pos_state_next)
                                    + oracle.literal_price(
                                        position.wrapping_add(len_test),
                                        finder.byte_at(len_test as i32 - 2),
                                        true,
                                        finder.byte_at(len_test as i32 - 2 - cur_back as i32),
                                        finder.byte_at(len_test as i32 - 1),
                                    );
                                state2.update_literal();
                                pos_state_next = position.wrapping_add(len_test).wrapping_add(1)
                                    & self.pos_state_mask;
                                let entry = through_literal
                                    + oracle.rep_entry_price(state2, pos_state_next);
                                let offset = len_test as usize + 1 + rep0_len as usize;
                                while len_end < cur + offset {
                                    len_end += 1;
                                    self.nodes[len_end].price = INFINITY_PRICE;
                                }
                                let price =
                                    entry + oracle.rep_price(0, rep0_len, state2, pos_state_next);
                                let node = &mut self.nodes[cur + offset];
                                if price < node.price {
                                    node.price = price;
                                    node.pos_prev = (cur + len_test as usize + 1) as u32;
                                    node.back_prev = 0;
                                    node.prev1_is_literal = true;
                                    node.prev2 = true;
                                    node.pos_prev2 = cur as u32;
                                    node.back_prev2 = cur_back + NUM_REPS as u32;
                                }
                            }
                        }
                        offs += 1;
                        if offs == num_pairs {
                            break;
                        }
                    }
                    len_test += 1;
                }
            }
        }
    }

    /// Rebuild the cheapest path from the terminal node by reversing the
    /// predecessor links in place, then return the first token. Combo nodes
    /// re-splice the literal and the stored first match while walking.
    fn backward(&mut self, mut cur: usize) -> Token {
        debug_assert_ne!(self.nodes[cur].price, INFINITY_PRICE);
        self.opt_end = cur;
        let mut pos_mem = self.nodes[cur].pos_prev as usize;
        let mut back_mem = self.nodes[cur].back_prev;
        loop {
            if self.nodes[cur].prev1_is_literal {
                self.nodes[pos_mem].make_literal();
                self.nodes[pos_mem].pos_prev = (pos_mem - 1) as u32;
                if self.nodes[cur].prev2 {
                    let pos_prev2 = self.nodes[cur].pos_prev2;
                    let back_prev2 = self.nodes[cur].back_prev2;
                    let first = &mut self.nodes[pos_mem - 1];
                    first.prev1_is_literal = false;
                    first.pos_prev = pos_prev2;
                    first.back_prev = back_prev2;
                }
            }
            let pos_prev = pos_mem;
            let back_cur = back_mem;
            back_mem = self.nodes[pos_prev].back_prev;
            pos_mem = self.nodes[pos_prev].pos_prev as usize;
            self.nodes[pos_prev].back_prev = back_cur;
            self.nodes[pos_prev].pos_prev = cur as u32;
            cur = pos_prev;
            if cur == 0 {
                break;
            }
        }
        self.opt_cur = self.nodes[0].pos_prev as usize;
        token_from(self.opt_cur as u32, self.nodes[0].back_prev)
    }
}
