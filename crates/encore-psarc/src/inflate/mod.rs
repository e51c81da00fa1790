//! Resumable DEFLATE decoder.
//!
//! Every compressed chunk in a song package is a zlib stream holding at most
//! one chunk of output. [`inflate`] decodes such a chunk in one call.
//! [`Inflater`] is the machine underneath: it keeps its whole state in a
//! fixed-size value, so a caller can hand it input piecemeal and pick up
//! exactly where the previous call stopped.
//!
//! Supported: stored, fixed-Huffman and dynamic-Huffman blocks, with or without
//! a leading 2-byte zlib header. Preset dictionaries are rejected, and the
//! trailing Adler-32 is not checked; a running CRC32 of the output is kept
//! instead.

mod bits;
mod huffman;

use encore_common::crc::Crc32;
use thiserror::Error;
use tracing::trace;

use bits::{BitBuffer, Input};
use huffman::HuffmanTable;

/// Base lengths for length codes 257..=285.
const LENGTH_BASE: [u16; 29] = [
    3, 4, 5, 6, 7, 8, 9, 10, 11, 13, 15, 17, 19, 23, 27, 31, 35, 43, 51, 59, 67, 83, 99, 115, 131,
    163, 195, 227, 258,
];

/// Extra bits for length codes 257..=285.
const LENGTH_EXTRA: [u8; 29] = [
    0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4, 5, 5, 5, 5, 0,
];

/// Base distances for distance codes 0..=29.
const DISTANCE_BASE: [u16; 30] = [
    1, 2, 3, 4, 5, 7, 9, 13, 17, 25, 33, 49, 65, 97, 129, 193, 257, 385, 513, 769, 1025, 1537,
    2049, 3073, 4097, 6145, 8193, 12289, 16385, 24577,
];

/// Extra bits for distance codes 0..=29.
const DISTANCE_EXTRA: [u8; 30] = [
    0, 0, 0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9, 10, 10, 11, 11, 12, 12, 13,
    13,
];

/// Transmission order of code-length code lengths.
const CODE_LENGTH_ORDER: [usize; 19] = [
    16, 17, 18, 0, 8, 7, 9, 6, 10, 5, 11, 4, 12, 3, 13, 2, 14, 1, 15,
];

const MAX_LITERAL_CODES: usize = 286;
const MAX_DISTANCE_CODES: usize = 30;
const END_OF_BLOCK: u16 = 256;

/// Errors that end a decode. Running out of input is not one of them; see
/// [`InflateStatus::NeedMoreData`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum InflateError {
    /// Block type 3.
    #[error("invalid block type 3")]
    InvalidBlockType,

    /// Stored block LEN and NLEN are not one's complements.
    #[error("stored block length {len:#06x} does not match its complement {nlen:#06x}")]
    StoredLengthMismatch { len: u16, nlen: u16 },

    /// Code lengths claim more codes than the code space holds.
    #[error("over-subscribed Huffman code")]
    OversubscribedCode,

    /// Code lengths leave part of the code space unused.
    #[error("incomplete Huffman code")]
    IncompleteCode,

    /// No symbol has a code where at least one is required.
    #[error("Huffman code has no symbols")]
    EmptyCode,

    /// A code length above 15.
    #[error("invalid code length {0}")]
    InvalidCodeLength(u8),

    /// Bits that match no code in the table.
    #[error("invalid Huffman code in stream")]
    InvalidCode,

    /// Literal/length symbol 286 or 287, or distance symbol 30 or 31.
    #[error("invalid symbol {0}")]
    InvalidSymbol(u16),

    /// HLIT above 286 or HDIST above 30.
    #[error("too many codes: {literals} literal/length, {distances} distance")]
    TooManyCodes { literals: usize, distances: usize },

    /// Repeat code 16 with no previous length.
    #[error("repeat of previous code length with no previous length")]
    RepeatWithoutPrevious,

    /// Repeat code running past the declared code counts.
    #[error("code length repeat overflows the declared code count")]
    RepeatOverflow,

    /// Dynamic block without a code for end-of-block.
    #[error("literal/length code has no end-of-block symbol")]
    MissingEndOfBlock,

    /// Back-reference to before the start of the output.
    #[error("distance {distance} exceeds {available} bytes of output")]
    DistanceTooFar { distance: usize, available: usize },

    /// zlib header requesting a preset dictionary.
    #[error("preset dictionaries are not supported")]
    PresetDictionary,

    /// Input ended before the final block (one-shot decoding only).
    #[error("compressed stream is truncated")]
    Truncated,
}

/// Outcome of one [`Inflater::inflate`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InflateStatus {
    /// The final block has been decoded.
    Done,
    /// All input was consumed mid-stream; call again with more.
    NeedMoreData,
}

/// Summary of a one-shot [`inflate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inflated {
    /// Logical decompressed size. May exceed the output buffer, in which
    /// case the excess was discarded.
    pub size: usize,
    /// Compressed bytes read, zlib header included.
    pub consumed: usize,
    /// CRC32 of the bytes written to the output buffer.
    pub crc32: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Initial,
    PartialZlibHeader { cmf: u8 },
    Header,
    UncompressedLen,
    UncompressedIlen { len: u16 },
    UncompressedData { remaining: u16 },
    LiteralCount,
    DistanceCount,
    CodeLenCount,
    ReadCodeLengths { index: usize },
    ReadLengths { index: usize },
    ReadLengths16 { index: usize },
    ReadLengths17 { index: usize },
    ReadLengths18 { index: usize },
    ReadSymbol,
    ReadLength { symbol: u16 },
    ReadDistance { length: u16 },
    ReadDistanceExtra { length: u16, symbol: u16 },
    Done,
}

/// What a single state step decided.
enum Step {
    Continue,
    NeedInput,
    Finished,
}

/// Resumable DEFLATE decoding state.
///
/// All tables live inline, so an `Inflater` never allocates. It is a few
/// kilobytes; box it if that is too much for the stack.
///
/// Output is addressed by a logical cursor. Each call writes at the cursor
/// into the buffer it is given, so a caller feeding input in pieces must pass
/// the same output buffer every time. Bytes past the end of that buffer are
/// dropped but still counted.
#[derive(Clone)]
pub struct Inflater {
    state: State,
    bits: BitBuffer,
    final_block: bool,
    literal_count: usize,
    distance_count: usize,
    codelen_count: usize,
    lengths: [u8; MAX_LITERAL_CODES + MAX_DISTANCE_CODES],
    codelen_lengths: [u8; 19],
    literals: HuffmanTable,
    distances: HuffmanTable,
    codelens: HuffmanTable,
    out_pos: usize,
    crc_pos: usize,
    crc: Crc32,
    total_in: usize,
}

impl Inflater {
    /// A decoder at the start of a stream.
    pub fn new() -> Self {
        Self {
            state: State::Initial,
            bits: BitBuffer::new(),
            final_block: false,
            literal_count: 0,
            distance_count: 0,
            codelen_count: 0,
            lengths: [0; MAX_LITERAL_CODES + MAX_DISTANCE_CODES],
            codelen_lengths: [0; 19],
            literals: HuffmanTable::new(),
            distances: HuffmanTable::new(),
            codelens: HuffmanTable::new(),
            out_pos: 0,
            crc_pos: 0,
            crc: Crc32::new(),
            total_in: 0,
        }
    }

    /// Return to the start of a stream without reallocating anything.
    pub fn reset(&mut self) {
        self.state = State::Initial;
        self.bits = BitBuffer::new();
        self.final_block = false;
        self.out_pos = 0;
        self.crc_pos = 0;
        self.crc.reset();
        self.total_in = 0;
    }

    /// Logical bytes produced so far.
    #[inline]
    pub fn total_out(&self) -> usize {
        self.out_pos
    }

    /// Compressed bytes consumed so far.
    #[inline]
    pub fn total_in(&self) -> usize {
        self.total_in
    }

    /// CRC32 of the bytes written to the output buffer so far.
    #[inline]
    pub fn crc32(&self) -> u32 {
        self.crc.value()
    }

    /// Whether the final block has been decoded.
    #[inline]
    pub fn is_done(&self) -> bool {
        self.state == State::Done
    }

    /// Decode as much of `input` as possible into `output`.
    ///
    /// `input` continues where the previous call's input ended. All of it is
    /// consumed unless the stream finishes first; bytes after the final block
    /// (such as the zlib Adler-32 trailer) are left unread.
    pub fn inflate(
        &mut self,
        input: &[u8],
        output: &mut [u8],
    ) -> Result<InflateStatus, InflateError> {
        let mut input = Input::new(input);

        let result = loop {
            match self.step(&mut input, output) {
                Ok(Step::Continue) => continue,
                Ok(Step::NeedInput) => break Ok(InflateStatus::NeedMoreData),
                Ok(Step::Finished) => break Ok(InflateStatus::Done),
                Err(e) => break Err(e),
            }
        };

        self.total_in += input.position();

        let written = self.out_pos.min(output.len());
        if written > self.crc_pos {
            self.crc.update(&output[self.crc_pos..written]);
            self.crc_pos = written;
        }

        result
    }

    fn step(&mut self, input: &mut Input<'_>, output: &mut [u8]) -> Result<Step, InflateError> {
        match self.state {
            State::Initial => {
                let rest = input.remaining();
                match rest.len() {
                    0 => return Ok(Step::NeedInput),
                    1 => {
                        if could_be_zlib_cmf(rest[0]) {
                            self.state = State::PartialZlibHeader { cmf: rest[0] };
                            input.advance(1);
                            return Ok(Step::NeedInput);
                        }
                    }
                    _ => {
                        if is_zlib_header(rest[0], rest[1]) {
                            check_dictionary(rest[1])?;
                            trace!("zlib header {:#04x}{:02x}", rest[0], rest[1]);
                            input.advance(2);
                        }
                    }
                }
                self.state = State::Header;
            }

            State::PartialZlibHeader { cmf } => {
                let Some(&flg) = input.remaining().first() else {
                    return Ok(Step::NeedInput);
                };
                if is_zlib_header(cmf, flg) {
                    check_dictionary(flg)?;
                    input.advance(1);
                } else {
                    // Not a header after all: the byte starts the deflate data.
                    self.bits.push_front_byte(cmf);
                }
                self.state = State::Header;
            }

            State::Header => {
                let Some(header) = self.bits.read(input, 3) else {
                    return Ok(Step::NeedInput);
                };
                self.final_block = header & 1 != 0;
                let block_type = header >> 1;
                trace!(final_block = self.final_block, block_type, "block header");

                self.state = match block_type {
                    0 => {
                        self.bits.align_to_byte();
                        State::UncompressedLen
                    }
                    1 => {
                        self.build_fixed_tables()?;
                        State::ReadSymbol
                    }
                    2 => State::LiteralCount,
                    _ => return Err(InflateError::InvalidBlockType),
                };
            }

            State::UncompressedLen => {
                let Some(len) = self.bits.read(input, 16) else {
                    return Ok(Step::NeedInput);
                };
                self.state = State::UncompressedIlen { len: len as u16 };
            }

            State::UncompressedIlen { len } => {
                let Some(nlen) = self.bits.read(input, 16) else {
                    return Ok(Step::NeedInput);
                };
                let nlen = nlen as u16;
                if len != !nlen {
                    return Err(InflateError::StoredLengthMismatch { len, nlen });
                }
                self.state = State::UncompressedData { remaining: len };
            }

            State::UncompressedData { mut remaining } => {
                // Whole bytes may still sit in the bit buffer after the header.
                while remaining > 0 && self.bits.available() >= 8 {
                    let byte = self.bits.take(8) as u8;
                    self.emit(output, byte);
                    remaining -= 1;
                }

                let direct = input.remaining();
                let n = direct.len().min(remaining as usize);
                self.emit_slice(output, &direct[..n]);
                input.advance(n);
                remaining -= n as u16;

                if remaining > 0 {
                    self.state = State::UncompressedData { remaining };
                    return Ok(Step::NeedInput);
                }
                self.state = self.end_of_block();
            }

            State::LiteralCount => {
                let Some(hlit) = self.bits.read(input, 5) else {
                    return Ok(Step::NeedInput);
                };
                self.literal_count = hlit as usize + 257;
                self.state = State::DistanceCount;
            }

            State::DistanceCount => {
                let Some(hdist) = self.bits.read(input, 5) else {
                    return Ok(Step::NeedInput);
                };
                self.distance_count = hdist as usize + 1;
                if self.literal_count > MAX_LITERAL_CODES
                    || self.distance_count > MAX_DISTANCE_CODES
                {
                    return Err(InflateError::TooManyCodes {
                        literals: self.literal_count,
                        distances: self.distance_count,
                    });
                }
                self.state = State::CodeLenCount;
            }

            State::CodeLenCount => {
                let Some(hclen) = self.bits.read(input, 4) else {
                    return Ok(Step::NeedInput);
                };
                self.codelen_count = hclen as usize + 4;
                self.codelen_lengths = [0; 19];
                self.state = State::ReadCodeLengths { index: 0 };
            }

            State::ReadCodeLengths { mut index } => {
                while index < self.codelen_count {
                    let Some(len) = self.bits.read(input, 3) else {
                        self.state = State::ReadCodeLengths { index };
                        return Ok(Step::NeedInput);
                    };
                    self.codelen_lengths[CODE_LENGTH_ORDER[index]] = len as u8;
                    index += 1;
                }
                self.codelens.build(&self.codelen_lengths, false)?;
                self.state = State::ReadLengths { index: 0 };
            }

            State::ReadLengths { mut index } => {
                let total = self.literal_count + self.distance_count;
                while index < total {
                    let Some(symbol) = self.codelens.decode(&mut self.bits, input)? else {
                        self.state = State::ReadLengths { index };
                        return Ok(Step::NeedInput);
                    };
                    match symbol {
                        0..=15 => {
                            self.lengths[index] = symbol as u8;
                            index += 1;
                        }
                        16 => {
                            if index == 0 {
                                return Err(InflateError::RepeatWithoutPrevious);
                            }
                            self.state = State::ReadLengths16 { index };
                            return Ok(Step::Continue);
                        }
                        17 => {
                            self.state = State::ReadLengths17 { index };
                            return Ok(Step::Continue);
                        }
                        18 => {
                            self.state = State::ReadLengths18 { index };
                            return Ok(Step::Continue);
                        }
                        other => return Err(InflateError::InvalidSymbol(other)),
                    }
                }
                self.build_dynamic_tables()?;
                self.state = State::ReadSymbol;
            }

            State::ReadLengths16 { index } => {
                let Some(extra) = self.bits.read(input, 2) else {
                    return Ok(Step::NeedInput);
                };
                let previous = self.lengths[index - 1];
                let index = self.repeat_length(index, previous, 3 + extra as usize)?;
                self.state = State::ReadLengths { index };
            }

            State::ReadLengths17 { index } => {
                let Some(extra) = self.bits.read(input, 3) else {
                    return Ok(Step::NeedInput);
                };
                let index = self.repeat_length(index, 0, 3 + extra as usize)?;
                self.state = State::ReadLengths { index };
            }

            State::ReadLengths18 { index } => {
                let Some(extra) = self.bits.read(input, 7) else {
                    return Ok(Step::NeedInput);
                };
                let index = self.repeat_length(index, 0, 11 + extra as usize)?;
                self.state = State::ReadLengths { index };
            }

            State::ReadSymbol => loop {
                let Some(symbol) = self.literals.decode(&mut self.bits, input)? else {
                    return Ok(Step::NeedInput);
                };
                match symbol {
                    0..=255 => self.emit(output, symbol as u8),
                    END_OF_BLOCK => {
                        self.state = self.end_of_block();
                        break;
                    }
                    257..=285 => {
                        let index = (symbol - 257) as usize;
                        self.state = if LENGTH_EXTRA[index] == 0 {
                            State::ReadDistance {
                                length: LENGTH_BASE[index],
                            }
                        } else {
                            State::ReadLength { symbol }
                        };
                        break;
                    }
                    other => return Err(InflateError::InvalidSymbol(other)),
                }
            },

            State::ReadLength { symbol } => {
                let index = (symbol - 257) as usize;
                let Some(extra) = self.bits.read(input, LENGTH_EXTRA[index] as u32) else {
                    return Ok(Step::NeedInput);
                };
                self.state = State::ReadDistance {
                    length: LENGTH_BASE[index] + extra as u16,
                };
            }

            State::ReadDistance { length } => {
                let Some(symbol) = self.distances.decode(&mut self.bits, input)? else {
                    return Ok(Step::NeedInput);
                };
                if symbol as usize >= MAX_DISTANCE_CODES {
                    return Err(InflateError::InvalidSymbol(symbol));
                }
                if DISTANCE_EXTRA[symbol as usize] == 0 {
                    let distance = DISTANCE_BASE[symbol as usize] as usize;
                    self.copy_match(output, distance, length as usize)?;
                    self.state = State::ReadSymbol;
                } else {
                    self.state = State::ReadDistanceExtra { length, symbol };
                }
            }

            State::ReadDistanceExtra { length, symbol } => {
                let index = symbol as usize;
                let Some(extra) = self.bits.read(input, DISTANCE_EXTRA[index] as u32) else {
                    return Ok(Step::NeedInput);
                };
                let distance = DISTANCE_BASE[index] as usize + extra as usize;
                self.copy_match(output, distance, length as usize)?;
                self.state = State::ReadSymbol;
            }

            State::Done => return Ok(Step::Finished),
        }

        Ok(Step::Continue)
    }

    #[inline]
    fn end_of_block(&self) -> State {
        if self.final_block {
            State::Done
        } else {
            State::Header
        }
    }

    fn repeat_length(&mut self, index: usize, value: u8, count: usize) -> Result<usize, InflateError> {
        let end = index + count;
        if end > self.literal_count + self.distance_count {
            return Err(InflateError::RepeatOverflow);
        }
        self.lengths[index..end].fill(value);
        Ok(end)
    }

    fn build_fixed_tables(&mut self) -> Result<(), InflateError> {
        let mut lengths = [0u8; 288];
        lengths[..144].fill(8);
        lengths[144..256].fill(9);
        lengths[256..280].fill(7);
        lengths[280..].fill(8);
        self.literals.build(&lengths, false)?;
        // All 32 five-bit codes form a complete code; symbols 30 and 31 are
        // rejected when decoded.
        self.distances.build(&[5u8; 32], false)
    }

    fn build_dynamic_tables(&mut self) -> Result<(), InflateError> {
        let (literals, rest) = self.lengths.split_at(self.literal_count);
        let distances = &rest[..self.distance_count];

        if literals[END_OF_BLOCK as usize] == 0 {
            return Err(InflateError::MissingEndOfBlock);
        }

        self.literals.build(literals, false)?;
        self.distances.build(distances, true)
    }

    #[inline]
    fn emit(&mut self, output: &mut [u8], byte: u8) {
        if let Some(slot) = output.get_mut(self.out_pos) {
            *slot = byte;
        }
        self.out_pos += 1;
    }

    fn emit_slice(&mut self, output: &mut [u8], bytes: &[u8]) {
        let start = self.out_pos.min(output.len());
        let fit = bytes.len().min(output.len() - start);
        output[start..start + fit].copy_from_slice(&bytes[..fit]);
        self.out_pos += bytes.len();
    }

    fn copy_match(
        &mut self,
        output: &mut [u8],
        distance: usize,
        length: usize,
    ) -> Result<(), InflateError> {
        if distance > self.out_pos {
            return Err(InflateError::DistanceTooFar {
                distance,
                available: self.out_pos,
            });
        }

        // Byte by byte: source and destination overlap when distance < length.
        // A destination inside the buffer always has its source inside too.
        for _ in 0..length {
            let pos = self.out_pos;
            if pos < output.len() {
                output[pos] = output[pos - distance];
            }
            self.out_pos += 1;
        }
        Ok(())
    }
}

impl Default for Inflater {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Inflater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inflater")
            .field("state", &self.state)
            .field("total_in", &self.total_in)
            .field("total_out", &self.out_pos)
            .finish_non_exhaustive()
    }
}

/// Decode a complete stream in one call.
///
/// `output` should be sized to the known decompressed length; anything beyond
/// it is dropped, and `Inflated::size` then exceeds `output.len()`.
pub fn inflate(input: &[u8], output: &mut [u8]) -> Result<Inflated, InflateError> {
    let mut inflater = Inflater::new();
    match inflater.inflate(input, output)? {
        InflateStatus::Done => Ok(Inflated {
            size: inflater.total_out(),
            consumed: inflater.total_in(),
            crc32: inflater.crc32(),
        }),
        InflateStatus::NeedMoreData => Err(InflateError::Truncated),
    }
}

/// Whether `cmf` can start a zlib header: method 8 with a window of at most 32 KiB.
#[inline]
fn could_be_zlib_cmf(cmf: u8) -> bool {
    cmf & 0x0F == 8 && cmf >> 4 <= 7
}

/// Whether two bytes form a zlib header (`CMF * 256 + FLG` divisible by 31).
#[inline]
pub fn is_zlib_header(cmf: u8, flg: u8) -> bool {
    could_be_zlib_cmf(cmf) && (((cmf as u16) << 8) | flg as u16) % 31 == 0
}

#[inline]
fn check_dictionary(flg: u8) -> Result<(), InflateError> {
    if flg & 0x20 != 0 {
        return Err(InflateError::PresetDictionary);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::{DeflateEncoder, ZlibEncoder};
    use flate2::Compression;
    use std::io::Write;

    fn zlib(data: &[u8], level: u32) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(level));
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn deflate(data: &[u8], level: u32) -> Vec<u8> {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::new(level));
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn sample(len: usize) -> Vec<u8> {
        let text = b"<song><arrangement name=\"Lead\" tuning=\"E Standard\"/></song>\n";
        let mut seed = 0x1234_5678u32;
        (0..len)
            .map(|i| {
                if (i / 512) % 3 == 2 {
                    seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                    (seed >> 24) as u8
                } else {
                    text[i % text.len()]
                }
            })
            .collect()
    }

    #[test]
    fn test_zlib_roundtrip_levels() {
        let original = sample(65536);
        for level in [0, 1, 6, 9] {
            let compressed = zlib(&original, level);
            let mut output = vec![0u8; original.len()];
            let result = inflate(&compressed, &mut output).unwrap();

            assert_eq!(result.size, original.len(), "level {level}");
            assert_eq!(output, original, "level {level}");
            assert_eq!(result.crc32, encore_common::crc::hash_bytes(&original));
            // Adler-32 trailer is left unread.
            assert_eq!(result.consumed, compressed.len() - 4);
        }
    }

    #[test]
    fn test_raw_deflate_roundtrip() {
        let original = sample(10_000);
        let compressed = deflate(&original, 6);
        let mut output = vec![0u8; original.len()];
        let result = inflate(&compressed, &mut output).unwrap();

        assert_eq!(result.size, original.len());
        assert_eq!(output, original);
        assert_eq!(result.consumed, compressed.len());
    }

    #[test]
    fn test_fixed_huffman_block() {
        let original = b"hello hello hello world";
        let compressed = zlib(original, 6);
        // BFINAL in bit 0, BTYPE in bits 1-2 of the first deflate byte.
        assert_eq!((compressed[2] >> 1) & 0b11, 1);

        let mut output = [0u8; 23];
        let result = inflate(&compressed, &mut output).unwrap();
        assert_eq!(result.size, original.len());
        assert_eq!(&output, original);
    }

    #[test]
    fn test_fixed_huffman_name_list() {
        let names = b"songs/arr/song_lead.xml\nmanifests/songs/song_lead.json\n";
        let compressed = deflate(names, 6);
        assert_eq!((compressed[0] >> 1) & 0b11, 1);

        let mut output = vec![0u8; names.len()];
        let result = inflate(&compressed, &mut output).unwrap();
        assert_eq!(result.size, names.len());
        assert_eq!(result.consumed, compressed.len());
        assert_eq!(&output[..], &names[..]);
    }

    #[test]
    fn test_fixed_distance_symbol_30_rejected() {
        // Fixed block: literal 'a' (00110000 + 0x61 = 10010001), then
        // length code 257 (0000001) and distance symbol 30 (11110).
        let mut bits = vec![1u8, 1, 0];
        bits.extend([1, 0, 0, 1, 0, 0, 0, 1]);
        bits.extend([0, 0, 0, 0, 0, 0, 1]);
        bits.extend([1, 1, 1, 1, 0]);
        let mut bytes = vec![0u8; bits.len().div_ceil(8)];
        for (i, bit) in bits.iter().enumerate() {
            bytes[i / 8] |= bit << (i % 8);
        }

        let mut output = [0u8; 8];
        assert_eq!(
            inflate(&bytes, &mut output),
            Err(InflateError::InvalidSymbol(30))
        );
    }

    #[test]
    fn test_empty_stream() {
        let compressed = zlib(b"", 6);
        let mut output = [0u8; 0];
        let result = inflate(&compressed, &mut output).unwrap();
        assert_eq!(result.size, 0);
        assert_eq!(result.crc32, 0);
    }

    #[test]
    fn test_byte_at_a_time_matches_one_shot() {
        let original = sample(20_000);
        let compressed = zlib(&original, 9);
        let mut output = vec![0u8; original.len()];

        let mut inflater = Inflater::new();
        let mut status = InflateStatus::NeedMoreData;
        for byte in &compressed {
            status = inflater.inflate(std::slice::from_ref(byte), &mut output).unwrap();
            if status == InflateStatus::Done {
                break;
            }
        }

        assert_eq!(status, InflateStatus::Done);
        assert!(inflater.is_done());
        assert_eq!(output, original);
        assert_eq!(inflater.crc32(), encore_common::crc::hash_bytes(&original));
    }

    #[test]
    fn test_stored_blocks_fed_in_pieces() {
        let original = sample(70_000);
        let compressed = zlib(&original, 0);
        let mut output = vec![0u8; original.len()];

        let mut inflater = Inflater::new();
        let mut chunks = compressed.chunks(777);
        loop {
            let chunk = chunks.next().expect("stream ended early");
            if inflater.inflate(chunk, &mut output).unwrap() == InflateStatus::Done {
                break;
            }
        }
        assert_eq!(output, original);
    }

    #[test]
    fn test_zlib_header_split_across_calls() {
        let original = sample(3000);
        let compressed = zlib(&original, 6);
        let mut output = vec![0u8; original.len()];

        let mut inflater = Inflater::new();
        assert_eq!(
            inflater.inflate(&compressed[..1], &mut output).unwrap(),
            InflateStatus::NeedMoreData
        );
        assert_eq!(
            inflater.inflate(&compressed[1..], &mut output).unwrap(),
            InflateStatus::Done
        );
        assert_eq!(output, original);
    }

    #[test]
    fn test_cmf_like_first_byte_replayed_as_data() {
        // 0x78 looks like a CMF byte, but 0x78 0x03 is not a valid header.
        // As raw deflate it is a non-final stored block whose padding happens
        // to be 0b01111; the LEN/NLEN pair follows.
        let mut stream = vec![0x78u8];
        stream.extend_from_slice(&[0x03, 0x00, 0xFC, 0xFF]);
        stream.extend_from_slice(b"abc");
        stream.extend_from_slice(&[0x01, 0x00, 0x00, 0xFF, 0xFF]); // final empty stored block

        let mut output = [0u8; 3];
        let mut inflater = Inflater::new();
        assert_eq!(
            inflater.inflate(&stream[..1], &mut output).unwrap(),
            InflateStatus::NeedMoreData
        );
        assert_eq!(
            inflater.inflate(&stream[1..], &mut output).unwrap(),
            InflateStatus::Done
        );
        assert_eq!(&output, b"abc");
    }

    #[test]
    fn test_output_clipped_but_counted() {
        let original = sample(5000);
        let compressed = zlib(&original, 6);
        let mut output = vec![0u8; 1000];
        let result = inflate(&compressed, &mut output).unwrap();

        assert_eq!(result.size, original.len());
        assert_eq!(output, original[..1000]);
        assert_eq!(result.crc32, encore_common::crc::hash_bytes(&original[..1000]));
    }

    #[test]
    fn test_truncated_stream() {
        let original = sample(5000);
        let compressed = zlib(&original, 6);
        let mut output = vec![0u8; original.len()];
        assert_eq!(
            inflate(&compressed[..compressed.len() / 2], &mut output),
            Err(InflateError::Truncated)
        );
    }

    #[test]
    fn test_invalid_block_type() {
        // BFINAL=1, BTYPE=11
        let mut output = [0u8; 16];
        assert_eq!(
            inflate(&[0x07], &mut output),
            Err(InflateError::InvalidBlockType)
        );
    }

    #[test]
    fn test_stored_length_mismatch() {
        let stream = [0x01, 0x05, 0x00, 0x00, 0x00];
        let mut output = [0u8; 16];
        assert_eq!(
            inflate(&stream, &mut output),
            Err(InflateError::StoredLengthMismatch {
                len: 5,
                nlen: 0
            })
        );
    }

    #[test]
    fn test_distance_too_far() {
        // Fixed block: length code 257 (len 3) first, distance code 0 (dist 1)
        // with nothing produced yet. 257 is the 7-bit code 0000001, distance 0
        // is the 5-bit code 00000.
        // Bits, LSB first: 1 (final), 10 (fixed, as 1 then 0), 0000001, 00000.
        let bits: [u8; 15] = [1, 1, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0, 0, 0];
        let mut bytes = [0u8; 2];
        for (i, bit) in bits.iter().enumerate() {
            bytes[i / 8] |= bit << (i % 8);
        }

        let mut output = [0u8; 16];
        assert_eq!(
            inflate(&bytes, &mut output),
            Err(InflateError::DistanceTooFar {
                distance: 1,
                available: 0
            })
        );
    }

    #[test]
    fn test_preset_dictionary_rejected() {
        // CMF 0x78, FLG with FDICT set and a valid check: 0x78 0xBB.
        assert!(is_zlib_header(0x78, 0xBB));
        let mut output = [0u8; 4];
        assert_eq!(
            inflate(&[0x78, 0xBB, 0, 0, 0, 0], &mut output),
            Err(InflateError::PresetDictionary)
        );
    }

    #[test]
    fn test_zlib_header_detection() {
        assert!(is_zlib_header(0x78, 0x9C));
        assert!(is_zlib_header(0x78, 0xDA));
        assert!(is_zlib_header(0x78, 0x01));
        assert!(!is_zlib_header(0x78, 0x00));
        assert!(!is_zlib_header(b'h', b'e'));
    }

    #[test]
    fn test_reset_allows_reuse() {
        let first = sample(4000);
        let second = sample(9000);
        let mut inflater = Inflater::new();

        let mut out = vec![0u8; first.len()];
        inflater.inflate(&zlib(&first, 6), &mut out).unwrap();
        assert_eq!(out, first);

        inflater.reset();
        let mut out = vec![0u8; second.len()];
        assert_eq!(
            inflater.inflate(&zlib(&second, 1), &mut out).unwrap(),
            InflateStatus::Done
        );
        assert_eq!(out, second);
        assert_eq!(inflater.total_out(), second.len());
    }
}
