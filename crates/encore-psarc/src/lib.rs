//! PSARC song package reader.
//!
//! A song package is a big-endian archive with three layers:
//!
//! - A fixed 32-byte header (`PSAR` magic, TOC length, record stride, file
//!   count, chunk size, flags)
//! - A table of contents encrypted with AES-256 in CFB mode, holding one
//!   30-byte record per file followed by the compressed size of every chunk
//! - Chunk payloads: each file is split into 64 KiB chunks that are stored,
//!   zlib-compressed, or (for a short tail) copied raw
//!
//! Entry 0 is a newline-separated list naming every other entry.
//!
//! The decryption and decompression primitives are public on their own
//! ([`cipher`], [`inflate`]) because other game assets use them with
//! different keys.
//!
//! # Example
//!
//! ```no_run
//! use encore_psarc::PsarcArchive;
//!
//! let archive = PsarcArchive::open("song_p.psarc")?;
//!
//! for entry in archive.iter() {
//!     println!("{}: {} bytes", entry.name(), entry.length());
//! }
//!
//! if let Some(entry) = archive.find_suffix(".json") {
//!     let manifest = archive.read(entry)?;
//! }
//! # Ok::<(), encore_psarc::Error>(())
//! ```

mod archive;
mod entry;
mod error;
mod header;
mod options;
mod toc;

pub mod cipher;
pub mod inflate;

pub use archive::PsarcArchive;
pub use cipher::{BlockCipher, CipherError};
pub use entry::PsarcEntry;
pub use error::{Error, Result};
pub use header::{
    ArchiveFlags, ArchiveHeader, CompressionMethod, DEFAULT_BLOCK_SIZE, HEADER_SIZE,
    MIN_TOC_ENTRY_SIZE,
};
pub use inflate::{InflateError, InflateStatus, Inflated, Inflater};
pub use options::ArchiveOptions;
pub use toc::ChunkSizeTable;
