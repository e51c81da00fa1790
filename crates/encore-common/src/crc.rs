//! CRC32 hashing utilities.
//!
//! Song packages carry zlib-wrapped chunks, so the checksum of record is the
//! standard IEEE CRC32 (reflected polynomial `0xEDB88320`).

/// Compute the CRC32 of a byte slice.
///
/// Uses hardware acceleration when available (PCLMULQDQ on x86).
#[inline]
pub fn hash_bytes(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// Running CRC32 accumulator.
///
/// Unlike [`crc32fast::Hasher`], reading the current value does not consume
/// the accumulator, which suits decoders that report progress mid-stream.
#[derive(Debug, Clone, Default)]
pub struct Crc32 {
    hasher: crc32fast::Hasher,
}

impl Crc32 {
    /// Create an accumulator with an empty checksum.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed more bytes.
    #[inline]
    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    /// Current checksum of every byte fed so far.
    #[inline]
    pub fn value(&self) -> u32 {
        self.hasher.clone().finalize()
    }

    /// Forget everything fed so far.
    #[inline]
    pub fn reset(&mut self) {
        self.hasher.reset();
    }
}
