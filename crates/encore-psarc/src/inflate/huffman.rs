//! Canonical Huffman decoding tables.
//!
//! Codes are stored as a binary tree packed into a fixed array so a table can
//! be rebuilt in place for every block without touching the heap. Each node
//! holds two children indexed by the next input bit. A child `>= 0` is a leaf
//! carrying the decoded symbol; a negative child `-n` continues at node `n`.
//! Node 0 is the root, so no internal node is ever referenced as `-0`.

use super::bits::{BitBuffer, Input};
use super::InflateError;

/// Longest code DEFLATE allows.
pub(crate) const MAX_CODE_LENGTH: usize = 15;

/// Largest alphabet (fixed literal/length codes, 288 symbols).
pub(crate) const MAX_SYMBOLS: usize = 288;

/// A full binary tree over `n` leaves has `n - 1` internal nodes.
const MAX_NODES: usize = MAX_SYMBOLS - 1;

/// Child slot that no code reaches.
const UNUSED: i16 = i16::MIN;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    /// No symbols at all; any decode attempt is an error.
    Empty,
    /// Exactly one symbol: decoding consumes its code length and yields it.
    Single { symbol: u16, length: u8 },
    /// Two or more symbols tiling the code space.
    Tree,
}

/// Decoding table for one DEFLATE alphabet.
#[derive(Clone)]
pub(crate) struct HuffmanTable {
    shape: Shape,
    nodes: [[i16; 2]; MAX_NODES],
}

impl HuffmanTable {
    /// An empty table; [`build`](Self::build) must run before decoding.
    pub(crate) const fn new() -> Self {
        Self {
            shape: Shape::Empty,
            nodes: [[UNUSED; 2]; MAX_NODES],
        }
    }

    /// Rebuild from per-symbol code lengths (0 = symbol unused).
    ///
    /// The lengths must describe a complete prefix code. Two cases are let
    /// through without tiling the space: a single used symbol, decoded as a
    /// direct index, and no used symbols at all when `allow_no_symbols` is set
    /// (a block that never emits a distance code).
    pub(crate) fn build(
        &mut self,
        lengths: &[u8],
        allow_no_symbols: bool,
    ) -> Result<(), InflateError> {
        debug_assert!(lengths.len() <= MAX_SYMBOLS);

        let mut count = [0u16; MAX_CODE_LENGTH + 1];
        for &len in lengths {
            if len as usize > MAX_CODE_LENGTH {
                return Err(InflateError::InvalidCodeLength(len));
            }
            count[len as usize] += 1;
        }
        count[0] = 0;

        let used: u16 = count.iter().sum();
        if used == 0 {
            if allow_no_symbols {
                self.shape = Shape::Empty;
                return Ok(());
            }
            return Err(InflateError::EmptyCode);
        }

        // Codes left unassigned after each length; negative means two codes
        // collide.
        let mut left: i32 = 1;
        for &n in &count[1..] {
            left = (left << 1) - n as i32;
            if left < 0 {
                return Err(InflateError::OversubscribedCode);
            }
        }

        if used == 1 {
            let (symbol, &length) = lengths
                .iter()
                .enumerate()
                .find(|&(_, &len)| len != 0)
                .ok_or(InflateError::EmptyCode)?;
            self.shape = Shape::Single {
                symbol: symbol as u16,
                length,
            };
            return Ok(());
        }

        if left > 0 {
            return Err(InflateError::IncompleteCode);
        }

        // First canonical code of each length.
        let mut next_code = [0u16; MAX_CODE_LENGTH + 1];
        let mut code = 0u16;
        for len in 1..=MAX_CODE_LENGTH {
            code = (code + count[len - 1]) << 1;
            next_code[len] = code;
        }

        self.nodes[0] = [UNUSED; 2];
        let mut next_free = 1usize;

        for (symbol, &len) in lengths.iter().enumerate() {
            if len == 0 {
                continue;
            }
            let code = next_code[len as usize];
            next_code[len as usize] += 1;

            let mut node = 0usize;
            for depth in (0..len).rev() {
                let bit = ((code >> depth) & 1) as usize;
                let child = self.nodes[node][bit];

                if depth == 0 {
                    if child != UNUSED {
                        return Err(InflateError::OversubscribedCode);
                    }
                    self.nodes[node][bit] = symbol as i16;
                } else if child == UNUSED {
                    if next_free >= MAX_NODES {
                        return Err(InflateError::OversubscribedCode);
                    }
                    self.nodes[next_free] = [UNUSED; 2];
                    self.nodes[node][bit] = -(next_free as i16);
                    node = next_free;
                    next_free += 1;
                } else if child < 0 {
                    node = (-child) as usize;
                } else {
                    // A shorter code is a prefix of this one.
                    return Err(InflateError::OversubscribedCode);
                }
            }
        }

        self.shape = Shape::Tree;
        Ok(())
    }

    /// Decode one symbol.
    ///
    /// Returns `Ok(None)` when the input runs out before a full code has been
    /// seen; in that case no bits are consumed and the bytes pulled so far
    /// stay buffered in `bits` for the next call.
    pub(crate) fn decode(
        &self,
        bits: &mut BitBuffer,
        input: &mut Input<'_>,
    ) -> Result<Option<u16>, InflateError> {
        match self.shape {
            Shape::Empty => Err(InflateError::InvalidCode),
            Shape::Single { symbol, length } => {
                if !bits.fill(input, length as u32) {
                    return Ok(None);
                }
                bits.consume(length as u32);
                Ok(Some(symbol))
            }
            Shape::Tree => {
                let mut node = 0usize;
                let mut depth = 0u32;
                loop {
                    if !bits.fill(input, depth + 1) {
                        return Ok(None);
                    }
                    let bit = bits.peek_bit(depth) as usize;
                    let child = self.nodes[node][bit];
                    depth += 1;

                    if child == UNUSED {
                        return Err(InflateError::InvalidCode);
                    }
                    if child >= 0 {
                        bits.consume(depth);
                        return Ok(Some(child as u16));
                    }
                    node = (-child) as usize;
                }
            }
        }
    }
}

impl std::fmt::Debug for HuffmanTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HuffmanTable")
            .field("shape", &self.shape)
            .finish_non_exhaustive()
    }
}
