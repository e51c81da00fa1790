//! Common utilities for Encore.
//!
//! This crate provides foundational types and utilities used across all Encore crates:
//!
//! - [`BinaryReader`] - Zero-copy big-endian reading from byte slices
//! - [`crc`] - CRC32 (IEEE) hashing utilities
//! - [`Error`] - Shared error type for truncated or malformed buffers

mod error;
mod reader;

pub mod crc;

pub use error::{Error, Result};
pub use reader::BinaryReader;

/// Re-export zerocopy traits for convenience
pub use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Re-export memchr for SIMD-accelerated byte searching
pub use memchr;
