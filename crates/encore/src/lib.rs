//! Encore - song package decoding library.
//!
//! This crate provides a unified interface to the Encore library ecosystem
//! for reading Rocksmith song packages.
//!
//! # Crates
//!
//! - [`encore_common`] - Common utilities (big-endian binary reading, CRC32)
//! - [`encore_psarc`] - PSARC archive reading (AES-CFB table of contents + zlib chunks)
//!
//! # Example
//!
//! ```no_run
//! use encore::prelude::*;
//!
//! let archive = PsarcArchive::open("song_p.psarc")?;
//!
//! // Collaborators pick entries by suffix
//! for entry in archive.entries_with_suffix(".json") {
//!     let manifest = archive.read(entry)?;
//!     println!("{}: {} bytes", entry.name(), manifest.len());
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

// Re-export all sub-crates
pub use encore_common as common;
pub use encore_psarc as psarc;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use encore_common::{crc, BinaryReader};
    pub use encore_psarc::inflate::inflate;
    pub use encore_psarc::{
        ArchiveOptions, BlockCipher, Inflater, InflateStatus, PsarcArchive, PsarcEntry,
    };
}

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
