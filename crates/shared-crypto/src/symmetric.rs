//! # Symmetric Encryption
//!
//! AES-CBC with byte-value padding, the payload cipher of the ticket envelope.
//!
//! ## Padding
//!
//! Encryption always appends `n` bytes of value `n` (1..=16). Decryption reads
//! the pad length from the final byte and only rejects it when it exceeds the
//! plaintext length; the pad bytes themselves are not inspected.
//!
//! ## IV discipline
//!
//! A response is encrypted under the request's key, so it must use a
//! different IV. [`Iv::flipped`] derives one by flipping the lowest bit of the
//! first byte.

use crate::CryptoError;
use aes::cipher::block_padding::{NoPadding, Pkcs7};
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::{Aes128, Aes192, Aes256};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// AES block size in bytes.
pub const BLOCK_SIZE: usize = 16;

/// Accepted AES key sizes (AES-128, AES-192, AES-256).
pub const KEY_SIZES: &[usize] = &[16, 24, 32];

/// AES key recovered from (or placed into) an envelope.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey(Vec<u8>);

impl SymmetricKey {
    /// Create from bytes. The length selects AES-128/192/256.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, CryptoError> {
        if !KEY_SIZES.contains(&bytes.len()) {
            return Err(CryptoError::InvalidKeyLength {
                expected: KEY_SIZES,
                actual: bytes.len(),
            });
        }
        Ok(Self(bytes))
    }

    /// Generate a random AES-256 key.
    pub fn generate() -> Self {
        let mut bytes = vec![0u8; 32];
        rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut bytes);
        Self(bytes)
    }

    /// Get inner bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SymmetricKey(AES-{}, ..)", self.0.len() * 8)
    }
}

/// CBC initialization vector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Iv([u8; BLOCK_SIZE]);

impl Iv {
    /// Create from bytes.
    pub fn from_bytes(bytes: [u8; BLOCK_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create from a slice, which must be exactly one block long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let array: [u8; BLOCK_SIZE] = bytes.try_into().map_err(|_| CryptoError::InvalidIvLength {
            expected: BLOCK_SIZE,
            actual: bytes.len(),
        })?;
        Ok(Self(array))
    }

    /// Generate a random IV.
    pub fn generate() -> Self {
        let mut bytes = [0u8; BLOCK_SIZE];
        rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut bytes);
        Self(bytes)
    }

    /// IV for the response to a request sent under `self`. Differs in exactly
    /// one bit.
    pub fn flipped(&self) -> Self {
        let mut bytes = self.0;
        bytes[0] ^= 1;
        Self(bytes)
    }

    /// Get inner bytes.
    pub fn as_bytes(&self) -> &[u8; BLOCK_SIZE] {
        &self.0
    }
}

/// Encrypt `plaintext` with AES-CBC, appending byte-value padding.
///
/// The ciphertext is always a non-zero multiple of [`BLOCK_SIZE`].
pub fn encrypt(key: &SymmetricKey, iv: &Iv, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    macro_rules! seal {
        ($aes:ty) => {
            cbc::Encryptor::<$aes>::new_from_slices(key.as_bytes(), iv.as_bytes())
                .map(|cipher| cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
                .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))
        };
    }

    match key.as_bytes().len() {
        16 => seal!(Aes128),
        24 => seal!(Aes192),
        32 => seal!(Aes256),
        actual => Err(CryptoError::InvalidKeyLength {
            expected: KEY_SIZES,
            actual,
        }),
    }
}

/// Decrypt AES-CBC `ciphertext` and strip byte-value padding.
///
/// # Errors
///
/// - `CryptoError::DecryptionFailed` if the ciphertext is not block aligned
/// - `CryptoError::EmptyPlaintext` if there is nothing to unpad
/// - `CryptoError::InvalidPadding` if the pad length exceeds the plaintext
pub fn decrypt(key: &SymmetricKey, iv: &Iv, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    macro_rules! open {
        ($aes:ty) => {
            cbc::Decryptor::<$aes>::new_from_slices(key.as_bytes(), iv.as_bytes())
                .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))?
                .decrypt_padded_vec_mut::<NoPadding>(ciphertext)
                .map_err(|_| {
                    CryptoError::DecryptionFailed(format!(
                        "ciphertext length {} is not a multiple of the block size",
                        ciphertext.len()
                    ))
                })?
        };
    }

    let plaintext = match key.as_bytes().len() {
        16 => open!(Aes128),
        24 => open!(Aes192),
        32 => open!(Aes256),
        actual => {
            return Err(CryptoError::InvalidKeyLength {
                expected: KEY_SIZES,
                actual,
            })
        }
    };

    strip_padding(plaintext)
}

fn strip_padding(mut plaintext: Vec<u8>) -> Result<Vec<u8>, CryptoError> {
    let pad_length = match plaintext.last() {
        Some(&last) => last as usize,
        None => return Err(CryptoError::EmptyPlaintext),
    };
    if pad_length > plaintext.len() {
        return Err(CryptoError::InvalidPadding);
    }
    plaintext.truncate(plaintext.len() - pad_length);
    Ok(plaintext)
}
