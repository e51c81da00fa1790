//! Decrypted table of contents: fixed-stride entry records followed by the
//! chunk-size table.

use encore_common::BinaryReader;
use tracing::debug;

use crate::cipher::{BlockCipher, BLOCK_SIZE};
use crate::Result;

/// One TOC record as stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TocRecord {
    pub hash: [u8; 16],
    pub zindex: u32,
    pub length: u64,
    pub offset: u64,
}

impl TocRecord {
    /// Read the fixed fields at the front of a record.
    fn read(reader: &mut BinaryReader<'_>) -> Result<Self> {
        Ok(Self {
            hash: reader.read_array()?,
            zindex: reader.read_u32()?,
            length: reader.read_u40()?,
            offset: reader.read_u40()?,
        })
    }
}

/// Decrypt a TOC body into a fresh buffer.
///
/// CFB works on whole blocks, so a ragged tail is zero-padded for the
/// cipher and cut off again afterwards.
pub(crate) fn decrypt(cipher: &mut BlockCipher, encrypted: &[u8]) -> Result<Vec<u8>> {
    let len = encrypted.len();
    let padded = len.div_ceil(BLOCK_SIZE) * BLOCK_SIZE;

    let mut toc = Vec::with_capacity(padded);
    toc.extend_from_slice(encrypted);
    toc.resize(padded, 0);

    cipher.decrypt_blocks(&mut toc)?;
    toc.truncate(len);
    Ok(toc)
}

/// Parse `count` records laid out `stride` bytes apart.
pub(crate) fn parse_records(toc: &[u8], count: usize, stride: usize) -> Result<Vec<TocRecord>> {
    let mut records = Vec::with_capacity(count);
    for index in 0..count {
        let mut reader = BinaryReader::new_at(toc, index * stride);
        records.push(TocRecord::read(&mut reader)?);
    }
    Ok(records)
}

/// Compressed size of every chunk in the archive, indexed by chunk number.
///
/// A size of 0 marks a chunk stored uncompressed at the full block size.
#[derive(Debug, Clone, Default)]
pub struct ChunkSizeTable {
    sizes: Vec<u32>,
}

impl ChunkSizeTable {
    /// Decode big-endian sizes of `width` bytes each. A trailing partial
    /// entry is ignored.
    pub fn parse(bytes: &[u8], width: usize) -> Result<Self> {
        let count = bytes.len() / width;
        let mut reader = BinaryReader::new(bytes);
        let sizes = (0..count)
            .map(|_| reader.read_uint(width).map(|size| size as u32))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        debug!(chunks = count, width, "parsed chunk-size table");
        Ok(Self { sizes })
    }

    /// Number of chunks.
    #[inline]
    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    /// Compressed size of chunk `index`.
    #[inline]
    pub fn get(&self, index: usize) -> Option<u32> {
        self.sizes.get(index).copied()
    }
}
