//! Gateway error types and their mapping onto the client-visible error codes.
//!
//! Ticket-level variants abort the whole request; task-level variants
//! (`TaskInvalid`, `NotAllowed`, `Broker`) are collected per task.

use shared_crypto::CryptoError;
use shared_types::{ErrorCode, ErrorRecord};

/// Errors produced while processing one request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// No decryption key registered under the envelope's fingerprint
    #[error("Private key {0} not found")]
    DecryptionKeyUnknown(String),

    /// No verification key registered for the ticket's signer
    #[error("Couldn't verify signature: Key {0} unknown")]
    VerificationKeyUnknown(String),

    /// A cryptographic primitive failed (unwrap, CBC, padding)
    #[error("{0}")]
    Encryption(String),

    /// Inbound request fields could not be decoded
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    /// Decrypted payload is not a ticket
    #[error("Malformed ticket: {0}")]
    MalformedTicket(String),

    /// Ticket signature does not match its contents
    #[error("Invalid ticket signature: {0}")]
    SignatureInvalid(String),

    /// Ticket is past its expiration
    #[error("Ticket expired")]
    TicketExpired,

    /// Signer has no ACL entry
    #[error("Organization '{0}' not allowed")]
    OrganizationNotAllowed(String),

    /// Task failed structural validation
    #[error("Invalid Task ({0})")]
    TaskInvalid(String),

    /// Requested analyses are not in the organization's ACL
    #[error("Rejected")]
    NotAllowed,

    /// A blocking crypto job panicked or was cancelled
    #[error("Crypto worker failed: {0}")]
    CryptoWorker(String),

    /// Publishing to the broker failed after the reconnect escalation
    #[error("Broker delivery failed: {0}")]
    Broker(String),
}

impl GatewayError {
    /// Client-visible error class.
    pub fn code(&self) -> ErrorCode {
        match self {
            GatewayError::DecryptionKeyUnknown(_) | GatewayError::VerificationKeyUnknown(_) => {
                ErrorCode::KeyUnknown
            }
            GatewayError::Encryption(_) => ErrorCode::Encryption,
            GatewayError::TaskInvalid(_) => ErrorCode::TaskInvalid,
            GatewayError::NotAllowed => ErrorCode::NotAllowed,
            GatewayError::MalformedRequest(_)
            | GatewayError::MalformedTicket(_)
            | GatewayError::SignatureInvalid(_)
            | GatewayError::TicketExpired
            | GatewayError::OrganizationNotAllowed(_)
            | GatewayError::CryptoWorker(_)
            | GatewayError::Broker(_) => ErrorCode::OtherRecoverable,
        }
    }

    /// Wire representation.
    pub fn to_record(&self) -> ErrorRecord {
        ErrorRecord::new(self.code(), self.to_string())
    }
}

impl From<CryptoError> for GatewayError {
    fn from(e: CryptoError) -> Self {
        GatewayError::Encryption(e.to_string())
    }
}

/// Result type for request processing
pub type GatewayResult<T> = Result<T, GatewayError>;
