//! Crypto error types.

use thiserror::Error;

/// Cryptographic operation errors.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Encryption failed
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// Decryption failed
    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    /// Invalid key length
    #[error("Invalid key length: expected one of {expected:?}, got {actual}")]
    InvalidKeyLength {
        /// Accepted key lengths in bytes
        expected: &'static [usize],
        /// Actual key length in bytes
        actual: usize,
    },

    /// Invalid IV length
    #[error("Invalid IV length: expected {expected}, got {actual}")]
    InvalidIvLength {
        /// Expected IV length in bytes
        expected: usize,
        /// Actual IV length in bytes
        actual: usize,
    },

    /// Decrypted plaintext was empty
    #[error("Empty plaintext")]
    EmptyPlaintext,

    /// Claimed padding is longer than the plaintext
    #[error("Invalid padding size")]
    InvalidPadding,

    /// Signature verification failed
    #[error("Signature verification failed")]
    SignatureVerificationFailed,

    /// Signing failed
    #[error("Signing failed: {0}")]
    SigningFailed(String),

    /// Key generation failed
    #[error("Key generation failed: {0}")]
    KeyGenerationFailed(String),

    /// Key material is not PEM or not of the expected kind
    #[error("Invalid key encoding: {0}")]
    InvalidKeyEncoding(String),
}
