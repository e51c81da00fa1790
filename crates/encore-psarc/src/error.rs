//! Error types for the PSARC crate.

use thiserror::Error;

use crate::cipher::CipherError;
use crate::inflate::InflateError;

/// Errors that can occur when working with song packages.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Common library error.
    #[error("{0}")]
    Common(#[from] encore_common::Error),

    /// Table of contents could not be decrypted.
    #[error("decryption error: {0}")]
    Cipher(#[from] CipherError),

    /// A compressed chunk failed to decode.
    #[error("decompression error in chunk {chunk}: {source}")]
    Inflate {
        chunk: usize,
        #[source]
        source: InflateError,
    },

    /// Header does not start with `PSAR`.
    #[error("invalid PSARC magic: {0:02x?}")]
    InvalidMagic([u8; 4]),

    /// Compression tag other than `zlib`.
    #[error("unsupported compression method: {0}")]
    UnsupportedCompression(String),

    /// Chunk allocation size without a known size-table width.
    #[error("unsupported block size: {0}")]
    UnsupportedBlockSize(u32),

    /// TOC records shorter than the fixed 30-byte layout.
    #[error("invalid TOC entry size: {0}")]
    InvalidTocEntrySize(u32),

    /// Declared TOC length cannot hold the header and records.
    #[error("TOC length {toc_length} is smaller than the {required} bytes its records need")]
    TocTooSmall { toc_length: u64, required: u64 },

    /// Archive holds no entries, not even the name list.
    #[error("archive has no name list entry")]
    MissingManifest,

    /// A region extends past the end of the archive.
    #[error("{what} at offset {offset} needs {needed} bytes but the archive has {available}")]
    Truncated {
        what: &'static str,
        offset: u64,
        needed: u64,
        available: u64,
    },

    /// Walking an entry ran off the end of the chunk-size table.
    #[error("chunk index {index} is past the end of the {len}-entry chunk table")]
    ChunkTableOverrun { index: usize, len: usize },

    /// A chunk produced more bytes than the entry had left.
    #[error("chunk {chunk} produced {produced} bytes but only {remaining} remained")]
    OutputOverflow {
        chunk: usize,
        produced: usize,
        remaining: usize,
    },

    /// Caller's buffer is smaller than the entry's declared length.
    #[error("buffer of {available} bytes cannot hold {needed} bytes")]
    BufferTooSmall { needed: u64, available: usize },

    /// Name list has fewer lines than there are entries.
    #[error("name list has {actual} names for {expected} entries")]
    NameCountMismatch { expected: usize, actual: usize },

    /// Entry hash is not the MD5 of its name.
    #[error("name hash mismatch for {0}")]
    NameHashMismatch(String),

    /// Entry not found.
    #[error("entry not found: {0}")]
    EntryNotFound(String),
}

/// Result type for PSARC operations.
pub type Result<T> = std::result::Result<T, Error>;
