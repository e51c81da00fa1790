//! AES-256 in cipher-feedback mode.
//!
//! The table of contents of a song package is encrypted with AES-256 in
//! 128-bit CFB mode under a key that ships with the game client. Each
//! plaintext block is the ciphertext block XORed with the encryption of a
//! 16-byte chain register; the chain register then takes the ciphertext block
//! just consumed. Only the forward cipher is ever run, in both directions.
//!
//! The chain register is the IV. Package tables start from a zero IV; other
//! asset formats built on the same primitive supply their own through
//! [`BlockCipher::with_iv`] or [`BlockCipher::reset`].

use aes::cipher::{BlockEncrypt, KeyInit};
use aes::{Aes256, Block};
use thiserror::Error;

/// AES block size in bytes.
pub const BLOCK_SIZE: usize = 16;

/// AES-256 key size in bytes.
pub const KEY_SIZE: usize = 32;

/// The AES-256 key protecting package tables of contents.
///
/// This is hardcoded in the game client and is not a secret.
pub const PSARC_TOC_KEY: [u8; KEY_SIZE] = [
    0xC5, 0x3D, 0xB2, 0x38, 0x70, 0xA1, 0xA2, 0xF7, 0x1C, 0xAE, 0x64, 0x06, 0x1F, 0xDD, 0x0E, 0x11,
    0x57, 0x30, 0x9D, 0xC8, 0x52, 0x04, 0xD4, 0xC5, 0xBF, 0xDF, 0x25, 0x09, 0x0D, 0xF2, 0x57, 0x2C,
];

/// The initialization vector for package tables (all zeros).
pub const PSARC_TOC_IV: [u8; BLOCK_SIZE] = [0u8; BLOCK_SIZE];

/// Errors raised by [`BlockCipher`] on contract violations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CipherError {
    /// Key was not 32 bytes.
    #[error("invalid AES-256 key length: expected {KEY_SIZE} bytes, got {0}")]
    InvalidKeyLength(usize),

    /// IV was not 16 bytes.
    #[error("invalid IV length: expected {BLOCK_SIZE} bytes, got {0}")]
    InvalidIvLength(usize),

    /// Buffer length was not a whole number of blocks.
    #[error("data length {0} is not a multiple of {BLOCK_SIZE} bytes")]
    UnalignedLength(usize),
}

/// AES-256-CFB128 keyed state.
///
/// Holds the expanded round keys and the chain register. Each archive opens
/// its own instance, so decrypting several archives at once needs no locking.
#[derive(Clone)]
pub struct BlockCipher {
    cipher: Aes256,
    chain: [u8; BLOCK_SIZE],
}

impl BlockCipher {
    /// Expand `key` into the 14-round schedule and zero the chain register.
    pub fn new(key: &[u8]) -> Result<Self, CipherError> {
        let cipher =
            Aes256::new_from_slice(key).map_err(|_| CipherError::InvalidKeyLength(key.len()))?;

        Ok(Self {
            cipher,
            chain: [0u8; BLOCK_SIZE],
        })
    }

    /// Expand `key` and load `iv` into the chain register.
    pub fn with_iv(key: &[u8], iv: &[u8]) -> Result<Self, CipherError> {
        let iv: [u8; BLOCK_SIZE] = iv
            .try_into()
            .map_err(|_| CipherError::InvalidIvLength(iv.len()))?;

        let mut cipher = Self::new(key)?;
        cipher.reset(iv);
        Ok(cipher)
    }

    /// Cipher for package tables of contents: well-known key, zero IV.
    pub fn psarc() -> Self {
        Self {
            cipher: Aes256::new(&PSARC_TOC_KEY.into()),
            chain: PSARC_TOC_IV,
        }
    }

    /// Load a new IV, keeping the key schedule.
    #[inline]
    pub fn reset(&mut self, iv: [u8; BLOCK_SIZE]) {
        self.chain = iv;
    }

    /// Current chain register.
    #[inline]
    pub fn chain(&self) -> &[u8; BLOCK_SIZE] {
        &self.chain
    }

    /// Decrypt whole blocks in place.
    ///
    /// The chain register carries over, so a long buffer may be decrypted in
    /// several calls as long as each call covers whole blocks.
    pub fn decrypt_blocks(&mut self, data: &mut [u8]) -> Result<(), CipherError> {
        check_aligned(data)?;

        for block in data.chunks_exact_mut(BLOCK_SIZE) {
            let keystream = self.keystream();
            self.chain.copy_from_slice(block);
            xor_in_place(block, &keystream);
        }

        Ok(())
    }

    /// Encrypt whole blocks in place; the inverse of [`decrypt_blocks`](Self::decrypt_blocks).
    pub fn encrypt_blocks(&mut self, data: &mut [u8]) -> Result<(), CipherError> {
        check_aligned(data)?;

        for block in data.chunks_exact_mut(BLOCK_SIZE) {
            let keystream = self.keystream();
            xor_in_place(block, &keystream);
            self.chain.copy_from_slice(block);
        }

        Ok(())
    }

    /// Encrypt the chain register with the forward round keys.
    #[inline]
    fn keystream(&self) -> Block {
        let mut block = Block::from(self.chain);
        self.cipher.encrypt_block(&mut block);
        block
    }
}

impl std::fmt::Debug for BlockCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Round keys stay out of logs.
        f.debug_struct("BlockCipher").finish_non_exhaustive()
    }
}

#[inline]
fn check_aligned(data: &[u8]) -> Result<(), CipherError> {
    if data.len() % BLOCK_SIZE != 0 {
        return Err(CipherError::UnalignedLength(data.len()));
    }
    Ok(())
}

#[inline]
fn xor_in_place(block: &mut [u8], keystream: &Block) {
    for (b, k) in block.iter_mut().zip(keystream.iter()) {
        *b ^= k;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unhex(s: &str) -> Vec<u8> {
        hex::decode(s).unwrap()
    }

    // NIST SP 800-38A, F.3.17 / F.3.18 (CFB128-AES256).
    const NIST_KEY: &str = "603deb1015ca71be2b73aef0857d77811f352c073b6108d72d9810a30914dff4";
    const NIST_IV: &str = "000102030405060708090a0b0c0d0e0f";
    const NIST_PLAIN: &str = concat!(
        "6bc1bee22e409f96e93d7e117393172a",
        "ae2d8a571e03ac9c9eb76fac45af8e51",
        "30c81c46a35ce411e5fbc1191a0a52ef",
        "f69f2445df4f9b17ad2b417be66c3710",
    );
    const NIST_CIPHER: &str = concat!(
        "dc7e84bfda79164b7ecd8486985d3860",
        "39ffed143b28b1c832113c6331e5407b",
        "df10132415e54b92a13ed0a8267ae2f9",
        "75a385741ab9cef82031623d55b1e471",
    );

    #[test]
    fn test_nist_decrypt() {
        let mut cipher = BlockCipher::with_iv(&unhex(NIST_KEY), &unhex(NIST_IV)).unwrap();
        let mut data = unhex(NIST_CIPHER);
        cipher.decrypt_blocks(&mut data).unwrap();
        assert_eq!(data, unhex(NIST_PLAIN));
    }

    #[test]
    fn test_nist_encrypt() {
        let mut cipher = BlockCipher::with_iv(&unhex(NIST_KEY), &unhex(NIST_IV)).unwrap();
        let mut data = unhex(NIST_PLAIN);
        cipher.encrypt_blocks(&mut data).unwrap();
        assert_eq!(data, unhex(NIST_CIPHER));
    }

    #[test]
    fn test_split_calls_match_single_call() {
        let mut whole = unhex(NIST_CIPHER);
        BlockCipher::with_iv(&unhex(NIST_KEY), &unhex(NIST_IV))
            .unwrap()
            .decrypt_blocks(&mut whole)
            .unwrap();

        let mut split = unhex(NIST_CIPHER);
        let mut cipher = BlockCipher::with_iv(&unhex(NIST_KEY), &unhex(NIST_IV)).unwrap();
        let (head, tail) = split.split_at_mut(16);
        cipher.decrypt_blocks(head).unwrap();
        cipher.decrypt_blocks(tail).unwrap();

        assert_eq!(whole, split);
    }

    #[test]
    fn test_roundtrip_block_counts() {
        let mut seed = 0x2545_F491u32;
        for blocks in 1..=100usize {
            let original: Vec<u8> = (0..blocks * BLOCK_SIZE)
                .map(|_| {
                    seed ^= seed << 13;
                    seed ^= seed >> 17;
                    seed ^= seed << 5;
                    seed as u8
                })
                .collect();

            let mut data = original.clone();
            BlockCipher::psarc().encrypt_blocks(&mut data).unwrap();
            assert_ne!(data, original);
            BlockCipher::psarc().decrypt_blocks(&mut data).unwrap();
            assert_eq!(data, original, "roundtrip failed for {blocks} blocks");
        }
    }

    #[test]
    fn test_chain_advances_to_last_ciphertext() {
        let mut cipher = BlockCipher::psarc();
        assert_eq!(cipher.chain(), &[0u8; 16]);

        let mut data = [0xA5u8; 32];
        let last: [u8; 16] = data[16..].try_into().unwrap();
        cipher.decrypt_blocks(&mut data).unwrap();
        assert_eq!(cipher.chain(), &last);

        cipher.reset([0u8; 16]);
        assert_eq!(cipher.chain(), &[0u8; 16]);
    }

    #[test]
    fn test_invalid_lengths() {
        assert_eq!(
            BlockCipher::new(&[0u8; 16]).unwrap_err(),
            CipherError::InvalidKeyLength(16)
        );
        assert_eq!(
            BlockCipher::with_iv(&PSARC_TOC_KEY, &[0u8; 8]).unwrap_err(),
            CipherError::InvalidIvLength(8)
        );

        let mut data = vec![0u8; 15];
        assert_eq!(
            BlockCipher::psarc().decrypt_blocks(&mut data),
            Err(CipherError::UnalignedLength(15))
        );
    }

    #[test]
    fn test_empty_is_noop() {
        let mut cipher = BlockCipher::psarc();
        cipher.decrypt_blocks(&mut []).unwrap();
        assert_eq!(cipher.chain(), &[0u8; 16]);
    }
}
