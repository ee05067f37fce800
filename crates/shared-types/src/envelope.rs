//! # Ticket Envelope
//!
//! The hybrid-encrypted wire form of a ticket.
//!
//! ## Security Properties
//!
//! - The symmetric key is wrapped with the gateway's RSA key selected by
//!   `key_fingerprint` (OAEP, SHA-256).
//! - The payload is AES-CBC encrypted under that key and `iv`.
//! - The response reuses the key but never the IV.

/// One inbound submission, after transport decoding.
#[derive(Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Selects the gateway decryption key.
    pub key_fingerprint: String,
    /// RSA-OAEP wrapped AES key.
    pub encrypted_key: Vec<u8>,
    /// AES-CBC encrypted ticket JSON.
    pub encrypted: Vec<u8>,
    /// CBC initialization vector of the request.
    pub iv: Vec<u8>,
}

impl std::fmt::Debug for Envelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Envelope")
            .field("key_fingerprint", &self.key_fingerprint)
            .field("encrypted_key_len", &self.encrypted_key.len())
            .field("encrypted_len", &self.encrypted.len())
            .field("iv_len", &self.iv.len())
            .finish()
    }
}
