//! Archive opening options.

use crate::cipher::{BLOCK_SIZE, KEY_SIZE, PSARC_TOC_IV, PSARC_TOC_KEY};

/// How an archive is opened.
#[derive(Clone)]
pub struct ArchiveOptions {
    /// AES-256 key for the table of contents.
    pub toc_key: [u8; KEY_SIZE],
    /// CFB initialization vector for the table of contents.
    pub toc_iv: [u8; BLOCK_SIZE],
    /// Reject entries whose hash is not the MD5 of their name.
    pub verify_name_hashes: bool,
    /// Fail when the name list is short; otherwise unnamed entries get a
    /// placeholder name.
    pub strict_names: bool,
}

impl ArchiveOptions {
    /// Use a different TOC key.
    pub fn with_key(mut self, key: [u8; KEY_SIZE]) -> Self {
        self.toc_key = key;
        self
    }

    pub fn with_iv(mut self, iv: [u8; BLOCK_SIZE]) -> Self {
        self.toc_iv = iv;
        self
    }

    pub fn verify_name_hashes(mut self, verify: bool) -> Self {
        self.verify_name_hashes = verify;
        self
    }

    pub fn strict_names(mut self, strict: bool) -> Self {
        self.strict_names = strict;
        self
    }
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            toc_key: PSARC_TOC_KEY,
            toc_iv: PSARC_TOC_IV,
            verify_name_hashes: false,
            strict_names: true,
        }
    }
}

impl std::fmt::Debug for ArchiveOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveOptions")
            .field("custom_key", &(self.toc_key != PSARC_TOC_KEY))
            .field("verify_name_hashes", &self.verify_name_hashes)
            .field("strict_names", &self.strict_names)
            .finish_non_exhaustive()
    }
}
