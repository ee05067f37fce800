//! # RSA Keys and Key Wrapping
//!
//! RSA key material in the two PEM encodings the gateway consumes, plus
//! RSA-OAEP (SHA-256, empty label) wrapping of the envelope's AES key.
//!
//! - Decryption keys: PKCS#1 `RSA PRIVATE KEY` blocks (`.priv` files)
//! - Verification keys: PKIX `PUBLIC KEY` blocks (`.pub` files)

use crate::symmetric::SymmetricKey;
use crate::CryptoError;
use rand::rngs::OsRng;
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey};
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey, LineEnding};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use zeroize::Zeroizing;

/// RSA private key.
#[derive(Clone)]
pub struct PrivateKey(RsaPrivateKey);

impl PrivateKey {
    /// Parse a PKCS#1 PEM block.
    pub fn from_pkcs1_pem(pem: &str) -> Result<Self, CryptoError> {
        RsaPrivateKey::from_pkcs1_pem(pem)
            .map(Self)
            .map_err(|e| CryptoError::InvalidKeyEncoding(e.to_string()))
    }

    /// Encode as a PKCS#1 PEM block.
    pub fn to_pkcs1_pem(&self) -> Result<Zeroizing<String>, CryptoError> {
        self.0
            .to_pkcs1_pem(LineEnding::LF)
            .map_err(|e| CryptoError::InvalidKeyEncoding(e.to_string()))
    }

    /// Generate a fresh key of `bits` modulus size.
    pub fn generate(bits: usize) -> Result<Self, CryptoError> {
        RsaPrivateKey::new(&mut OsRng, bits)
            .map(Self)
            .map_err(|e| CryptoError::KeyGenerationFailed(e.to_string()))
    }

    /// Matching public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0.to_public_key())
    }

    /// Recover an AES key wrapped with RSA-OAEP(SHA-256).
    ///
    /// The private-key operation is blinded; `wrapped` is attacker-supplied.
    pub fn unwrap_key(&self, wrapped: &[u8]) -> Result<SymmetricKey, CryptoError> {
        let raw = self
            .0
            .decrypt_blinded(&mut OsRng, Oaep::new::<Sha256>(), wrapped)
            .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))?;
        SymmetricKey::from_bytes(raw)
    }

    pub(crate) fn inner(&self) -> &RsaPrivateKey {
        &self.0
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PrivateKey(..)")
    }
}

/// RSA public key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicKey(RsaPublicKey);

impl PublicKey {
    /// Parse a PKIX (`SubjectPublicKeyInfo`) PEM block.
    pub fn from_public_key_pem(pem: &str) -> Result<Self, CryptoError> {
        RsaPublicKey::from_public_key_pem(pem)
            .map(Self)
            .map_err(|e| CryptoError::InvalidKeyEncoding(e.to_string()))
    }

    /// Encode as a PKIX PEM block.
    pub fn to_public_key_pem(&self) -> Result<String, CryptoError> {
        self.0
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| CryptoError::InvalidKeyEncoding(e.to_string()))
    }

    /// Wrap an AES key with RSA-OAEP(SHA-256).
    pub fn wrap_key(&self, key: &SymmetricKey) -> Result<Vec<u8>, CryptoError> {
        self.0
            .encrypt(&mut OsRng, Oaep::new::<Sha256>(), key.as_bytes())
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))
    }

    pub(crate) fn inner(&self) -> &RsaPublicKey {
        &self.0
    }
}
