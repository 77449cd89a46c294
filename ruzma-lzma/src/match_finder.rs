//! Sliding-window binary-tree match finder.
//!
//! [`BinTree`] keeps recent history in one flat buffer and indexes it with a
//! binary search tree per hash bucket: `son` holds the two subtree links of
//! every window position in a cyclic array, and candidate chains start from
//! hash heads (CRC-mixed 2/3/4-byte hashes for BT4, a direct 2-byte hash
//! for BT2). Walking a chain collects candidates and re-splices the tree
//! around the new position in the same pass, so search and insert are one
//! traversal bounded by a cut value.
//!
//! Window positions carry a +1 shift: the first byte sits at position 1 so
//! the hash tables can use 0 as their empty marker, and the buffer offset
//! starts at `u32::MAX` so `offset + position` wraps back to a plain buffer
//! index. When the position counter reaches `2^31 - 1`, every link drops by
//! a common value and stale ones become empty. The buffer itself slides:
//! `read_block` tops it up from the stream and `move_block` shifts the kept
//! history down once the write cursor nears the end.
//!
//! [`MatchFinder`] is the seam the parse engine searches through; reported
//! pairs have strictly increasing lengths and coded (real minus one)
//! distances.

use std::io::{self, Read};

use ruzma_core::crc::CRC32_TABLE;
use ruzma_core::error::Result;

use crate::config::MatchFinderKind;

/// Hash head for a position's leading 2 bytes (BT4).
const HASH2_SIZE: u32 = 1 << 10;
/// Hash head for a position's leading 3 bytes (BT4).
const HASH3_SIZE: u32 = 1 << 16;
const HASH3_OFFSET: u32 = HASH2_SIZE;
/// BT4 keeps the short hash heads in front of the main table.
const FIX_HASH_SIZE: u32 = HASH2_SIZE + HASH3_SIZE;
/// BT2 hashes the 2 leading bytes directly.
const BT2_HASH_SIZE: u32 = 1 << 16;

/// Hash and tree links use 0 for "no position"; real positions start at 1.
const EMPTY: u32 = 0;
/// Position at which all links are renumbered downward.
const MAX_POS_FOR_NORMALIZE: u32 = (1 << 31) - 1;

/// One match candidate: `len` bytes at coded distance `dist`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MatchPair {
    pub(crate) len: u32,
    pub(crate) dist: u32,
}

/// Candidate source the parse engine searches through.
///
/// The finder owns a cursor one byte past the last analyzed position:
/// [`get_matches`](Self::get_matches) analyzes the cursor position and
/// advances, [`skip`](Self::skip) advances without reporting, and the read
/// methods take offsets relative to the advanced cursor (so `-1` is the
/// position just analyzed).
pub(crate) trait MatchFinder {
    /// Collect the candidates at the cursor into `out` (cleared first,
    /// lengths strictly increasing, coded distances), then advance one byte.
    fn get_matches(&mut self, out: &mut Vec<MatchPair>) -> Result<()>;
    /// Advance `count` bytes, indexing each skipped position.
    fn skip(&mut self, count: u32) -> Result<()>;
    /// Byte at the cursor plus `offset`.
    fn byte_at(&self, offset: i32) -> u8;
    /// Length (capped at `limit`) of the match between the bytes starting at
    /// the cursor plus `offset` and the same bytes back by coded distance
    /// `dist`.
    fn match_len(&self, offset: i32, dist: u32, limit: u32) -> u32;
    /// Bytes between the cursor and the end of the stream. Wraps when the
    /// cursor has been advanced past the end.
    fn available_bytes(&self) -> u32;
}

/// Binary-tree match finder over a sliding stream window.
pub(crate) struct BinTree<R: Read> {
    stream: R,
    buffer: Vec<u8>,
    /// Wrapping shift from window positions to buffer indices.
    buf_offset: u32,
    /// Window position of the cursor (shifted, starts at 1).
    pos: u32,
    /// First cursor position that requires a block move or read.
    pos_limit: u32,
    /// Window position one past the last byte read from the stream.
    stream_pos: u32,
    stream_end: bool,
    keep_size_before: u32,
    keep_size_after: u32,
    /// Highest buffer index the cursor may occupy before the block moves.
    last_safe_index: u32,
    match_max_len: u32,
    kind: MatchFinderKind,
    direct_hash_bytes: u32,
    min_match_check: u32,
    /// Tree-walk step budget per position.
    cut_value: u32,
    cyclic_pos: u32,
    cyclic_size: u32,
    son: Vec<u32>,
    hash: Vec<u32>,
    hash_mask: u32,
    fix_hash_size: u32,
}

impl<R: Read> BinTree<R> {
    /// Build a finder over `stream` with a `history_size`-byte window.
    ///
    /// `keep_add_before` reserves extra history for lookahead already
    /// consumed by the caller, `match_max_len` caps reported candidate
    /// lengths, and `keep_add_after` reserves room past the cursor for
    /// match-length probes beyond that cap. Reads the first block eagerly.
    pub(crate) fn new(
        stream: R,
        kind: MatchFinderKind,
        history_size: u32,
        keep_add_before: u32,
        match_max_len: u32,
        keep_add_after: u32,
    ) -> Result<Self> {
        debug_assert!(history_size <= MAX_POS_FOR_NORMALIZE - 256);
        let keep_size_before = history_size + keep_add_before;
        let keep_size_after = match_max_len + keep_add_after;
        let reserve =
            (history_size + keep_add_before + match_max_len + keep_add_after) / 2 + 256;
        let block_size = keep_size_before + keep_size_after + reserve;
        let cyclic_size = history_size + 1;

        let (direct_hash_bytes, min_match_check, fix_hash_size) = match kind {
            MatchFinderKind::Bt2 => (2, 3, 0),
            MatchFinderKind::Bt4 => (0, 4, FIX_HASH_SIZE),
        };
        let (hash_size, hash_mask) = match kind {
            MatchFinderKind::Bt2 => (BT2_HASH_SIZE, 0),
            MatchFinderKind::Bt4 => {
                // Spread the window size into an all-ones mask, at least
                // 16 bits, at most 24.
                let mut hs = history_size - 1;
                hs |= hs >> 1;
                hs |= hs >> 2;
                hs |= hs >> 4;
                hs |= hs >> 8;
                hs >>= 1;
                hs |= 0xFFFF;
                if hs > (1 << 24) {
                    hs >>= 1;
                }
                (hs + 1 + FIX_HASH_SIZE, hs)
            }
        };

        let mut finder = Self {
            stream,
            buffer: vec![0; block_size as usize],
            buf_offset: 0,
            pos: 0,
            pos_limit: 0,
            stream_pos: 0,
            stream_end: false,
            keep_size_before,
            keep_size_after,
            last_safe_index: block_size - keep_size_after,
            match_max_len,
            kind,
            direct_hash_bytes,
            min_match_check,
            cut_value: 16 + (match_max_len >> 1),
            cyclic_pos: 0,
            cyclic_size,
            son: vec![EMPTY; cyclic_size as usize * 2],
            hash: vec![EMPTY; hash_size as usize],
            hash_mask,
            fix_hash_size,
        };
        finder.read_block()?;
        // Shift positions up by one so 0 stays free as the empty marker.
        finder.reduce_offsets(-1);
        Ok(finder)
    }

    /// Buffer index of the cursor plus `offset`.
    #[inline]
    fn index_of(&self, offset: i32) -> usize {
        let base = self.buf_offset.wrapping_add(self.pos);
        (i64::from(base) + i64::from(offset)) as usize
    }

    fn reduce_offsets(&mut self, sub: i32) {
        self.buf_offset = self.buf_offset.wrapping_add(sub as u32);
        self.pos_limit = self.pos_limit.wrapping_sub(sub as u32);
        self.pos = self.pos.wrapping_sub(sub as u32);
        self.stream_pos = self.stream_pos.wrapping_sub(sub as u32);
    }

    /// Top the buffer up from the stream. On end of stream, clamp the
    /// position limit to the data actually present.
    fn read_block(&mut self) -> Result<()> {
        if self.stream_end {
            return Ok(());
        }
        loop {
            let start = self.buf_offset.wrapping_add(self.stream_pos) as usize;
            if start == self.buffer.len() {
                return Ok(());
            }
            let read = loop {
                match self.stream.read(&mut self.buffer[start..]) {
                    Ok(n) => break n,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e.into()),
                }
            };
            if read == 0 {
                self.pos_limit = self.stream_pos;
                let end_index = self.buf_offset.wrapping_add(self.pos_limit);
                if end_index > self.last_safe_index {
                    self.pos_limit = self.last_safe_index.wrapping_sub(self.buf_offset);
                }
                self.stream_end = true;
                return Ok(());
            }
            self.stream_pos += read as u32;
            if self.stream_pos >= self.pos.wrapping_add(self.keep_size_after) {
                self.pos_limit = self.stream_pos - self.keep_size_after;
            }
        }
    }

    /// Slide the kept window down to the buffer start.
    fn move_block(&mut self) {
        let mut offset = self.buf_offset.wrapping_add(self.pos) - self.keep_size_before;
        // Keep one extra byte; the cursor moves before the next check.
        if offset > 0 {
            offset -= 1;
        }
        let num_bytes = (self.buf_offset.wrapping_add(self.stream_pos) - offset) as usize;
        let offset = offset as usize;
        self.buffer.copy_within(offset..offset + num_bytes, 0);
        self.buf_offset = self.buf_offset.wrapping_sub(offset as u32);
    }

    /// Advance the cursor one byte, sliding and refilling as needed and
    /// renumbering positions before they can overflow.
    fn move_pos(&mut self) -> Result<()> {
        self.cyclic_pos += 1;
        if self.cyclic_pos >= self.cyclic_size {
            self.cyclic_pos = 0;
        }
        self.pos += 1;
        if self.pos > self.pos_limit {
            if self.buf_offset.wrapping_add(self.pos) > self.last_safe_index {
                self.move_block();
            }
            self.read_block()?;
        }
        if self.pos == MAX_POS_FOR_NORMALIZE {
            self.normalize();
        }
        Ok(())
    }

    fn normalize(&mut self) {
        let sub = self.pos - self.cyclic_size;
        normalize_links(&mut self.son, sub);
        normalize_links(&mut self.hash, sub);
        self.reduce_offsets(sub as i32);
    }

    /// Candidate length limit at the cursor, or `None` when fewer bytes
    /// remain than the finder indexes (the position is then only skipped).
    fn len_limit(&self) -> Option<u32> {
        if self.pos + self.match_max_len <= self.stream_pos {
            Some(self.match_max_len)
        } else {
            let limit = self.stream_pos - self.pos;
            if limit < self.min_match_check {
                None
            } else {
                Some(limit)
            }
        }
    }

    /// Walk the tree chain rooted at `cur_match`, splicing the cursor
    /// position in. With `out`, also record every candidate longer than all
    /// previous ones (starting above `max_len`).
    fn update_tree(
        &mut self,
        len_limit: u32,
        mut cur_match: u32,
        mut max_len: u32,
        mut out: Option<&mut Vec<MatchPair>>,
    ) {
        let match_min_pos = if self.pos > self.cyclic_size {
            self.pos - self.cyclic_size
        } else {
            0
        };
        let cur = self.buf_offset.wrapping_add(self.pos) as usize;
        let mut ptr0 = (self.cyclic_pos << 1) as usize + 1;
        let mut ptr1 = (self.cyclic_pos << 1) as usize;
        let mut len0 = self.direct_hash_bytes;
        let mut len1 = self.direct_hash_bytes;
        let mut count = self.cut_value;

        loop {
            if cur_match <= match_min_pos || count == 0 {
                self.son[ptr0] = EMPTY;
                self.son[ptr1] = EMPTY;
                break;
            }
            count -= 1;

            let delta = self.pos - cur_match;
            let cyclic_slot = if delta <= self.cyclic_pos {
                self.cyclic_pos - delta
            } else {
                self.cyclic_pos + self.cyclic_size - delta
            };
            let cyclic = (cyclic_slot << 1) as usize;

            let pby1 = self.buf_offset.wrapping_add(cur_match) as usize;
            let mut len = len0.min(len1);
            if self.buffer[pby1 + len as usize] == self.buffer[cur + len as usize] {
                len += 1;
                while len != len_limit
                    && self.buffer[pby1 + len as usize] == self.buffer[cur + len as usize]
                {
                    len += 1;
                }
                if let Some(pairs) = out.as_deref_mut() {
                    if max_len < len {
                        max_len = len;
                        pairs.push(MatchPair {
                            len,
                            dist: delta - 1,
                        });
                    }
                }
                if len == len_limit {
                    // Full-length match: adopt its subtrees and stop.
                    self.son[ptr1] = self.son[cyclic];
                    self.son[ptr0] = self.son[cyclic + 1];
                    break;
                }
            }
            if self.buffer[pby1 + len as usize] < self.buffer[cur + len as usize] {
                self.son[ptr1] = cur_match;
                ptr1 = cyclic + 1;
                cur_match = self.son[ptr1];
                len1 = len;
            } else {
                self.son[ptr0] = cur_match;
                ptr0 = cyclic;
                cur_match = self.son[ptr0];
                len0 = len;
            }
        }
    }

    /// BT4 hash heads for the cursor bytes: `(hash2, hash3, main)` indices.
    #[inline]
    fn bt4_hashes(&self, cur: usize) -> (usize, usize, usize) {
        let temp = CRC32_TABLE[self.buffer[cur] as usize] ^ u32::from(self.buffer[cur + 1]);
        let hash2 = temp & (HASH2_SIZE - 1);
        let temp = temp ^ (u32::from(self.buffer[cur + 2]) << 8);
        let hash3 = HASH3_OFFSET + (temp & (HASH3_SIZE - 1));
        let main = (temp ^ (CRC32_TABLE[self.buffer[cur + 3] as usize] << 5)) & self.hash_mask;
        (
            hash2 as usize,
            hash3 as usize,
            (self.fix_hash_size + main) as usize,
        )
    }

    #[inline]
    fn bt2_hash(&self, cur: usize) -> usize {
        (u32::from(self.buffer[cur]) | (u32::from(self.buffer[cur + 1]) << 8)) as usize
    }
}

fn normalize_links(links: &mut [u32], sub: u32) {
    for link in links.iter_mut() {
        *link = if *link <= sub { EMPTY } else { *link - sub };
    }
}

impl<R: Read> MatchFinder for BinTree<R> {
    fn get_matches(&mut self, out: &mut Vec<MatchPair>) -> Result<()> {
        out.clear();
        let Some(len_limit) = self.len_limit() else {
            return self.move_pos();
        };

        let match_min_pos = if self.pos > self.cyclic_size {
            self.pos - self.cyclic_size
        } else {
            0
        };
        let cur = self.buf_offset.wrapping_add(self.pos) as usize;
        let mut max_len = 1;

        let cur_match = match self.kind {
            MatchFinderKind::Bt4 => {
                let (hash2, hash3, main) = self.bt4_hashes(cur);
                let cur_match = self.hash[main];
                let mut cur_match2 = self.hash[hash2];
                let cur_match3 = self.hash[hash3];
                self.hash[hash2] = self.pos;
                self.hash[hash3] = self.pos;
                // The short hashes pin bytes 1 and 2 once byte 0 matches,
                // so a single byte compare validates the whole head.
                if cur_match2 > match_min_pos
                    && self.buffer[self.buf_offset.wrapping_add(cur_match2) as usize]
                        == self.buffer[cur]
                {
                    max_len = 2;
                    out.push(MatchPair {
                        len: 2,
                        dist: self.pos - cur_match2 - 1,
                    });
                }
                if cur_match3 > match_min_pos
                    && self.buffer[self.buf_offset.wrapping_add(cur_match3) as usize]
                        == self.buffer[cur]
                {
                    if cur_match3 == cur_match2 {
                        // Same position; the 3-byte pair supersedes it.
                        out.pop();
                    }
                    max_len = 3;
                    out.push(MatchPair {
                        len: 3,
                        dist: self.pos - cur_match3 - 1,
                    });
                    cur_match2 = cur_match3;
                }
                if !out.is_empty() && cur_match2 == cur_match {
                    // The tree walk re-finds this position at full length.
                    out.pop();
                    max_len = 1;
                }
                self.hash[main] = self.pos;
                cur_match
            }
            MatchFinderKind::Bt2 => {
                let hash = self.bt2_hash(cur);
                let cur_match = self.hash[hash];
                self.hash[hash] = self.pos;
                // The hash is exact for 2 bytes; report the pair now only
                // when byte 2 diverges, otherwise the walk finds it longer.
                if cur_match > match_min_pos
                    && self.buffer[self.buf_offset.wrapping_add(cur_match) as usize + 2]
                        != self.buffer[cur + 2]
                {
                    max_len = 2;
                    out.push(MatchPair {
                        len: 2,
                        dist: self.pos - cur_match - 1,
                    });
                }
                cur_match
            }
        };

        self.update_tree(len_limit, cur_match, max_len, Some(out));
        self.move_pos()
    }

    fn skip(&mut self, count: u32) -> Result<()> {
        for _ in 0..count {
            let Some(len_limit) = self.len_limit() else {
                self.move_pos()?;
                continue;
            };
            let cur = self.buf_offset.wrapping_add(self.pos) as usize;
            let cur_match = match self.kind {
                MatchFinderKind::Bt4 => {
                    let (hash2, hash3, main) = self.bt4_hashes(cur);
                    self.hash[hash2] = self.pos;
                    self.hash[hash3] = self.pos;
                    let cur_match = self.hash[main];
                    self.hash[main] = self.pos;
                    cur_match
                }
                MatchFinderKind::Bt2 => {
                    let hash = self.bt2_hash(cur);
                    let cur_match = self.hash[hash];
                    self.hash[hash] = self.pos;
                    cur_match
                }
            };
            self.update_tree(len_limit, cur_match, 1, None);
            self.move_pos()?;
        }
        Ok(())
    }

    #[inline]
    fn byte_at(&self, offset: i32) -> u8 {
        self.buffer[self.index_of(offset)]
    }

    fn match_len(&self, offset: i32, dist: u32, mut limit: u32) -> u32 {
        if self.stream_end {
            let target = i64::from(self.pos) + i64::from(offset);
            if target + i64::from(limit) > i64::from(self.stream_pos) {
                limit = (i64::from(self.stream_pos) - target) as u32;
            }
        }
        let real = dist as usize + 1;
        let base = self.index_of(offset);
        debug_assert!(base >= real);
        let mut len = 0;
        while len < limit
            && self.buffer[base + len as usize] == self.buffer[base + len as usize - real]
        {
            len += 1;
        }
        len
    }

    #[inline]
    fn available_bytes(&self) -> u32 {
        self.stream_pos.wrapping_sub(self.pos)
    }
}
