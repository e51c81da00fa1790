//! PSARC archive entry.

use std::path::{Component, Path, PathBuf};

use crate::toc::TocRecord;

/// A named file within a song package.
///
/// This is metadata only. Use [`PsarcArchive::read`](crate::PsarcArchive::read)
/// to get the contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PsarcEntry {
    /// Path as listed in the name list.
    name: String,
    /// MD5 of the name (all zeros for the name list itself).
    hash: [u8; 16],
    /// First chunk in the chunk-size table.
    zindex: u32,
    /// Decompressed size in bytes.
    length: u64,
    /// Archive offset of the first chunk.
    offset: u64,
}

impl PsarcEntry {
    pub(crate) fn from_record(name: String, record: &TocRecord) -> Self {
        Self {
            name,
            hash: record.hash,
            zindex: record.zindex,
            length: record.length,
            offset: record.offset,
        }
    }

    /// Get the file name/path.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the stored name hash.
    #[inline]
    pub fn hash(&self) -> &[u8; 16] {
        &self.hash
    }

    /// Get the index of the entry's first chunk.
    #[inline]
    pub fn zindex(&self) -> u32 {
        self.zindex
    }

    /// Get the decompressed size in bytes.
    #[inline]
    pub fn length(&self) -> u64 {
        self.length
    }

    /// Get the archive offset of the entry's first chunk.
    #[inline]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Whether the stored hash is the MD5 of the name.
    pub fn name_hash_matches(&self) -> bool {
        md5::compute(self.name.as_bytes()).0 == self.hash
    }

    /// Get the relative output path for extraction.
    ///
    /// Only plain components are kept. Root, drive prefixes, `.` and `..` are
    /// dropped, so the result is always relative and cannot climb out of the
    /// directory it is joined to. A name with no plain component yields an
    /// empty path.
    pub fn output_path(&self) -> PathBuf {
        let normalized = self.name.replace('\\', "/");
        Path::new(&normalized)
            .components()
            .filter_map(|component| match component {
                Component::Normal(part) => Some(part),
                Component::Prefix(_)
                | Component::RootDir
                | Component::CurDir
                | Component::ParentDir => None,
            })
            .collect()
    }

    /// Get the file extension, if any.
    pub fn extension(&self) -> Option<&str> {
        Path::new(&self.name)
            .extension()
            .and_then(|ext| ext.to_str())
    }
}
