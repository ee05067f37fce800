//! # RSA Signatures
//!
//! RSASSA-PKCS1-v1_5 over SHA-256, the scheme tickets are signed with.
//!
//! ## Security Properties
//!
//! - Deterministic: the signature does not depend on the RNG, which only
//!   blinds the private-key operation
//! - The message is hashed here; callers pass the canonical bytes, never a digest

use crate::asymmetric::{PrivateKey, PublicKey};
use crate::CryptoError;
use rand::rngs::OsRng;
use rsa::Pkcs1v15Sign;
use sha2::{Digest, Sha256};

/// Sign `message` with PKCS#1 v1.5 over its SHA-256 digest.
pub fn sign(key: &PrivateKey, message: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let hashed = Sha256::digest(message);
    key.inner()
        .sign_with_rng(&mut OsRng, Pkcs1v15Sign::new::<Sha256>(), &hashed)
        .map_err(|e| CryptoError::SigningFailed(e.to_string()))
}

/// Verify a PKCS#1 v1.5 / SHA-256 `signature` over `message`.
///
/// # Errors
///
/// Returns `CryptoError::SignatureVerificationFailed` on any mismatch.
pub fn verify(key: &PublicKey, message: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
    let hashed = Sha256::digest(message);
    key.inner()
        .verify(Pkcs1v15Sign::new::<Sha256>(), &hashed, signature)
        .map_err(|_| CryptoError::SignatureVerificationFailed)
}
