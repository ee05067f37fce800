//! # Shared Crypto - Ticket Envelope Primitives
//!
//! ## Components
//!
//! | Module | Algorithm | Use Case |
//! |--------|-----------|----------|
//! | `symmetric` | AES-CBC, byte-value padding | Ticket payload and answer encryption |
//! | `asymmetric` | RSA-OAEP (SHA-256) | Wrapping the per-request AES key |
//! | `signatures` | RSASSA-PKCS1-v1_5 (SHA-256) | Ticket signatures |
//!
//! ## Security Properties
//!
//! - **Key hygiene**: symmetric keys are zeroized on drop and never printed
//! - **IV discipline**: responses use [`Iv::flipped`], never the request IV
//! - **Lenient unpadding**: the CBC layer only rejects empty plaintexts and
//!   oversized pad lengths

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod asymmetric;
pub mod errors;
pub mod signatures;
pub mod symmetric;

// Re-exports
pub use asymmetric::{PrivateKey, PublicKey};
pub use errors::CryptoError;
pub use signatures::{sign, verify};
pub use symmetric::{decrypt, encrypt, Iv, SymmetricKey, BLOCK_SIZE};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
