//! Fixed 32-byte archive header.

use std::fmt;

use tracing::warn;
use zerocopy::byteorder::{BigEndian, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{Error, Result};

/// Size of [`ArchiveHeader`] on disk.
pub const HEADER_SIZE: usize = 32;

/// Size of the fields every TOC record carries.
pub const MIN_TOC_ENTRY_SIZE: u32 = 30;

/// Chunk allocation size whose compressed sizes fit in two bytes.
pub const DEFAULT_BLOCK_SIZE: u32 = 65536;

/// Archive header. Every integer is big-endian.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct ArchiveHeader {
    /// `PSAR`
    pub magic: [u8; 4],
    /// Major version in the high half, minor in the low half.
    pub version: U32<BigEndian>,
    /// Four-character compression tag
    pub compression: [u8; 4],
    /// Header plus encrypted TOC, in bytes
    pub toc_length: U32<BigEndian>,
    /// Stride of one TOC record
    pub toc_entry_size: U32<BigEndian>,
    /// Number of TOC records, name list included
    pub num_files: U32<BigEndian>,
    /// Decompressed size of a full chunk
    pub block_size: U32<BigEndian>,
    /// See [`ArchiveFlags`]
    pub flags: U32<BigEndian>,
}

impl ArchiveHeader {
    /// Magic bytes.
    pub const MAGIC: [u8; 4] = *b"PSAR";

    /// Build a header from its field values.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        version: u32,
        compression: [u8; 4],
        toc_length: u32,
        toc_entry_size: u32,
        num_files: u32,
        block_size: u32,
        flags: ArchiveFlags,
    ) -> Self {
        Self {
            magic: Self::MAGIC,
            version: U32::new(version),
            compression,
            toc_length: U32::new(toc_length),
            toc_entry_size: U32::new(toc_entry_size),
            num_files: U32::new(num_files),
            block_size: U32::new(block_size),
            flags: U32::new(flags.bits()),
        }
    }

    #[inline]
    pub fn version_major(&self) -> u16 {
        (self.version.get() >> 16) as u16
    }

    #[inline]
    pub fn version_minor(&self) -> u16 {
        self.version.get() as u16
    }

    #[inline]
    pub fn compression_method(&self) -> CompressionMethod {
        CompressionMethod::from_tag(self.compression)
    }

    #[inline]
    pub fn archive_flags(&self) -> ArchiveFlags {
        ArchiveFlags::from_bits(self.flags.get())
    }

    /// Bytes of encrypted TOC following the header.
    #[inline]
    pub fn toc_body_length(&self) -> u64 {
        (self.toc_length.get() as u64).saturating_sub(HEADER_SIZE as u64)
    }

    /// Width in bytes of one chunk-size table entry.
    pub fn chunk_size_width(&self) -> Result<usize> {
        match self.block_size.get() {
            DEFAULT_BLOCK_SIZE => Ok(2),
            other => Err(Error::UnsupportedBlockSize(other)),
        }
    }

    /// Check everything that can be checked before the TOC is decrypted.
    pub fn validate(&self) -> Result<()> {
        if self.magic != Self::MAGIC {
            return Err(Error::InvalidMagic(self.magic));
        }

        match self.compression_method() {
            CompressionMethod::Zlib => {}
            CompressionMethod::Lzma => {
                return Err(Error::UnsupportedCompression("lzma".to_string()));
            }
            CompressionMethod::Other(tag) => {
                warn!(
                    tag = %String::from_utf8_lossy(&tag),
                    "unknown compression tag, assuming zlib chunks"
                );
            }
        }

        self.chunk_size_width()?;

        let entry_size = self.toc_entry_size.get();
        if entry_size < MIN_TOC_ENTRY_SIZE {
            return Err(Error::InvalidTocEntrySize(entry_size));
        }

        let num_files = self.num_files.get() as u64;
        if num_files == 0 {
            return Err(Error::MissingManifest);
        }

        let required = HEADER_SIZE as u64 + num_files * entry_size as u64;
        if (self.toc_length.get() as u64) < required {
            return Err(Error::TocTooSmall {
                toc_length: self.toc_length.get() as u64,
                required,
            });
        }

        Ok(())
    }
}

/// Compression tag from the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Zlib,
    Lzma,
    Other([u8; 4]),
}

impl CompressionMethod {
    pub fn from_tag(tag: [u8; 4]) -> Self {
        match &tag {
            b"zlib" => Self::Zlib,
            b"lzma" => Self::Lzma,
            _ => Self::Other(tag),
        }
    }

    pub fn tag(&self) -> [u8; 4] {
        match self {
            Self::Zlib => *b"zlib",
            Self::Lzma => *b"lzma",
            Self::Other(tag) => *tag,
        }
    }
}

impl fmt::Display for CompressionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.tag()))
    }
}

/// Archive flag word.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveFlags(u32);

impl ArchiveFlags {
    /// Names compare case-insensitively.
    pub const IGNORE_CASE: Self = Self(1 << 0);
    /// Names are stored with a leading `/`.
    pub const ABSOLUTE_PATHS: Self = Self(1 << 1);
    /// TOC is encrypted.
    pub const ENCRYPTED_TOC: Self = Self(1 << 2);

    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn ignore_case(self) -> bool {
        self.contains(Self::IGNORE_CASE)
    }

    #[inline]
    pub fn absolute_paths(self) -> bool {
        self.contains(Self::ABSOLUTE_PATHS)
    }

    #[inline]
    pub fn encrypted_toc(self) -> bool {
        self.contains(Self::ENCRYPTED_TOC)
    }
}

impl std::ops::BitOr for ArchiveFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use encore_common::BinaryReader;

    fn header(toc_entry_size: u32, num_files: u32, toc_length: u32) -> ArchiveHeader {
        ArchiveHeader::new(
            0x0001_0004,
            *b"zlib",
            toc_length,
            toc_entry_size,
            num_files,
            DEFAULT_BLOCK_SIZE,
            ArchiveFlags::ENCRYPTED_TOC,
        )
    }

    #[test]
    fn test_layout_is_big_endian() {
        let bytes = header(30, 2, 100).as_bytes().to_vec();
        assert_eq!(bytes.len(), HEADER_SIZE);
        assert_eq!(&bytes[..4], b"PSAR");
        assert_eq!(&bytes[4..8], &[0, 1, 0, 4]);
        assert_eq!(&bytes[8..12], b"zlib");
        assert_eq!(&bytes[12..16], &[0, 0, 0, 100]);
        assert_eq!(&bytes[24..28], &[0, 1, 0, 0]);
        assert_eq!(&bytes[28..32], &[0, 0, 0, 4]);

        let parsed: ArchiveHeader = BinaryReader::new(&bytes).read_struct().unwrap();
        assert_eq!(parsed.num_files.get(), 2);
        assert_eq!(parsed.version_major(), 1);
        assert_eq!(parsed.version_minor(), 4);
        assert!(parsed.archive_flags().encrypted_toc());
        assert!(!parsed.archive_flags().ignore_case());
    }

    #[test]
    fn test_validate() {
        assert!(header(30, 2, 92).validate().is_ok());

        let mut bad = header(30, 2, 92);
        bad.magic = *b"PSAX";
        assert!(matches!(bad.validate(), Err(Error::InvalidMagic(m)) if &m == b"PSAX"));

        assert!(matches!(
            header(29, 2, 92).validate(),
            Err(Error::InvalidTocEntrySize(29))
        ));
        assert!(matches!(
            header(30, 0, 92).validate(),
            Err(Error::MissingManifest)
        ));
        assert!(matches!(
            header(30, 2, 91).validate(),
            Err(Error::TocTooSmall {
                toc_length: 91,
                required: 92
            })
        ));

        let mut lzma = header(30, 2, 92);
        lzma.compression = *b"lzma";
        assert!(matches!(lzma.validate(), Err(Error::UnsupportedCompression(_))));

        let mut big_blocks = header(30, 2, 92);
        big_blocks.block_size = U32::new(1 << 20);
        assert!(matches!(
            big_blocks.validate(),
            Err(Error::UnsupportedBlockSize(0x10_0000))
        ));
    }

    #[test]
    fn test_compression_tags() {
        assert_eq!(CompressionMethod::from_tag(*b"zlib"), CompressionMethod::Zlib);
        assert_eq!(CompressionMethod::from_tag(*b"lzma"), CompressionMethod::Lzma);
        let other = CompressionMethod::from_tag(*b"none");
        assert_eq!(other.to_string(), "none");
    }

    #[test]
    fn test_flags() {
        let flags = ArchiveFlags::IGNORE_CASE | ArchiveFlags::ABSOLUTE_PATHS;
        assert_eq!(flags.bits(), 3);
        assert!(flags.ignore_case());
        assert!(flags.absolute_paths());
        assert!(!flags.encrypted_toc());
    }
}
