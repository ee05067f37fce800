//! # Ticket Crypto
//!
//! Envelope decryption, ticket signature and expiration checks, and answer
//! encryption.
//!
//! ```text
//! Envelope ──unwrap_key──► AES key ──open_payload──► ticket JSON
//!    │                        │
//!    └── IV ──────────────────┴──► ResponseKey (answer uses IV ^ 0x01)
//! ```
//!
//! RSA work is CPU-bound; the async entry points [`TicketCrypto::open_envelope`]
//! and [`TicketCrypto::authenticate`] run it on tokio's blocking pool.
//!
//! Once the AES key has been unwrapped it is kept in a [`ResponseKey`] even
//! if a later stage fails, so the error answer can still be encrypted.

use crate::domain::error::{GatewayError, GatewayResult};
use crate::keys::KeyRegistry;
use crate::ports::outbound::TimeSource;
use shared_crypto::{symmetric, CryptoError, Iv, PrivateKey, PublicKey, SymmetricKey};
use shared_types::{Envelope, Ticket};
use std::sync::Arc;
use tracing::debug;

/// Key and IV under which a request arrived; encrypts the answer to it.
#[derive(Debug, Clone)]
pub struct ResponseKey {
    key: SymmetricKey,
    request_iv: Iv,
}

impl ResponseKey {
    /// Bundle a recovered key with the request IV.
    pub fn new(key: SymmetricKey, request_iv: Iv) -> Self {
        Self { key, request_iv }
    }

    /// IV used for the answer. Never equal to the request IV.
    pub fn response_iv(&self) -> Iv {
        self.request_iv.flipped()
    }

    /// Encrypt a serialized answer.
    pub fn seal(&self, answer_json: &[u8]) -> GatewayResult<Vec<u8>> {
        encrypt_answer(answer_json, &self.key, &self.request_iv)
    }

    /// Decrypt an answer sealed with [`ResponseKey::seal`] (client side).
    pub fn open(&self, ciphertext: &[u8]) -> GatewayResult<Vec<u8>> {
        Ok(symmetric::decrypt(&self.key, &self.response_iv(), ciphertext)?)
    }
}

/// Successful envelope decryption.
#[derive(Debug)]
pub struct DecryptedEnvelope {
    /// Ticket JSON
    pub plaintext: Vec<u8>,
    /// For encrypting the answer
    pub response_key: ResponseKey,
}

/// Failed envelope decryption.
#[derive(Debug)]
pub struct DecryptionFailure {
    /// What went wrong
    pub error: GatewayError,
    /// Present if the AES key was recovered before the failure
    pub response_key: Option<ResponseKey>,
}

impl DecryptionFailure {
    fn before_unwrap(error: GatewayError) -> Self {
        Self {
            error,
            response_key: None,
        }
    }
}

/// Cryptographic stages of the request pipeline. Cheap to clone.
#[derive(Clone)]
pub struct TicketCrypto {
    keys: Arc<KeyRegistry>,
    clock: Arc<dyn TimeSource>,
}

impl TicketCrypto {
    /// Create over a key registry and a clock.
    pub fn new(keys: Arc<KeyRegistry>, clock: Arc<dyn TimeSource>) -> Self {
        Self { keys, clock }
    }

    /// Recover the envelope's AES key with the decryption key selected by its
    /// fingerprint.
    ///
    /// # Errors
    ///
    /// - `DecryptionKeyUnknown` if no key has that fingerprint
    /// - `Encryption` if OAEP unwrapping fails or yields no valid AES key
    pub fn unwrap_key(&self, envelope: &Envelope) -> GatewayResult<SymmetricKey> {
        let private = self.keys.decryption_key(&envelope.key_fingerprint)?;
        Ok(private.unwrap_key(&envelope.encrypted_key)?)
    }

    /// Decrypt the envelope payload with a recovered key.
    ///
    /// A payload that unpads to nothing is an encryption failure, not an
    /// empty ticket.
    pub fn open_payload(key: &SymmetricKey, iv: &Iv, envelope: &Envelope) -> GatewayResult<Vec<u8>> {
        let plaintext = symmetric::decrypt(key, iv, &envelope.encrypted)?;
        if plaintext.is_empty() {
            return Err(CryptoError::EmptyPlaintext.into());
        }
        Ok(plaintext)
    }

    /// Full envelope decryption.
    pub fn decrypt_envelope(
        &self,
        envelope: &Envelope,
    ) -> Result<DecryptedEnvelope, DecryptionFailure> {
        let key = self
            .unwrap_key(envelope)
            .map_err(DecryptionFailure::before_unwrap)?;
        // No usable IV means no way to encrypt the answer either
        let iv = Iv::from_slice(&envelope.iv)
            .map_err(|e| DecryptionFailure::before_unwrap(e.into()))?;

        match Self::open_payload(&key, &iv, envelope) {
            Ok(plaintext) => {
                debug!(
                    fingerprint = %envelope.key_fingerprint,
                    bytes = plaintext.len(),
                    "Envelope decrypted"
                );
                Ok(DecryptedEnvelope {
                    plaintext,
                    response_key: ResponseKey::new(key, iv),
                })
            }
            Err(error) => Err(DecryptionFailure {
                error,
                response_key: Some(ResponseKey::new(key, iv)),
            }),
        }
    }

    /// [`Self::decrypt_envelope`] off the async workers.
    pub async fn open_envelope(
        &self,
        envelope: &Envelope,
    ) -> Result<DecryptedEnvelope, DecryptionFailure> {
        let crypto = self.clone();
        let envelope = envelope.clone();
        tokio::task::spawn_blocking(move || crypto.decrypt_envelope(&envelope))
            .await
            .unwrap_or_else(|e| {
                Err(DecryptionFailure::before_unwrap(GatewayError::CryptoWorker(
                    e.to_string(),
                )))
            })
    }

    /// Parse the ticket, then check its signature and expiration, off the
    /// async workers.
    pub async fn authenticate(&self, plaintext: Vec<u8>) -> GatewayResult<Ticket> {
        let crypto = self.clone();
        tokio::task::spawn_blocking(move || {
            let ticket = Self::parse_ticket(&plaintext)?;
            crypto.verify_ticket(&ticket)?;
            crypto.check_expiration(&ticket)?;
            debug!(signer = %ticket.signer_key_id, "Ticket authenticated");
            Ok(ticket)
        })
        .await
        .map_err(|e| GatewayError::CryptoWorker(e.to_string()))?
    }

    /// Parse decrypted ticket JSON.
    pub fn parse_ticket(plaintext: &[u8]) -> GatewayResult<Ticket> {
        serde_json::from_slice(plaintext).map_err(|e| GatewayError::MalformedTicket(e.to_string()))
    }

    /// Check the ticket's signature against its signer's verification key.
    ///
    /// The signature covers the ticket serialized with its signature cleared.
    pub fn verify_ticket(&self, ticket: &Ticket) -> GatewayResult<()> {
        let public = self.keys.verification_key(&ticket.signer_key_id)?;
        let payload = ticket
            .signing_payload()
            .map_err(|e| GatewayError::MalformedTicket(e.to_string()))?;
        shared_crypto::verify(&public, &payload, &ticket.signature)
            .map_err(|e| GatewayError::SignatureInvalid(e.to_string()))
    }

    /// Reject tickets at or past their expiration.
    pub fn check_expiration(&self, ticket: &Ticket) -> GatewayResult<()> {
        if self.clock.now() >= ticket.expiration {
            return Err(GatewayError::TicketExpired);
        }
        Ok(())
    }
}

/// Encrypt an answer under the request's key with the request IV flipped.
pub fn encrypt_answer(
    answer_json: &[u8],
    key: &SymmetricKey,
    request_iv: &Iv,
) -> GatewayResult<Vec<u8>> {
    Ok(symmetric::encrypt(key, &request_iv.flipped(), answer_json)?)
}

/// Sign a ticket over its canonical form (issuer side).
pub fn sign_ticket(mut ticket: Ticket, key: &PrivateKey) -> GatewayResult<Ticket> {
    let payload = ticket
        .signing_payload()
        .map_err(|e| GatewayError::MalformedTicket(e.to_string()))?;
    ticket.signature = shared_crypto::sign(key, &payload)?;
    Ok(ticket)
}

/// Encrypt `plaintext` for the gateway key `gateway_key` (client side).
///
/// Uses a fresh AES-256 key and IV. The returned [`ResponseKey`] opens the
/// gateway's encrypted answer.
pub fn seal_envelope(
    plaintext: &[u8],
    gateway_key: &PublicKey,
    fingerprint: &str,
) -> GatewayResult<(Envelope, ResponseKey)> {
    let key = SymmetricKey::generate();
    let iv = Iv::generate();
    let envelope = Envelope {
        key_fingerprint: fingerprint.to_string(),
        encrypted_key: gateway_key.wrap_key(&key)?,
        encrypted: symmetric::encrypt(&key, &iv, plaintext)?,
        iv: iv.as_bytes().to_vec(),
    };
    Ok((envelope, ResponseKey::new(key, iv)))
}
