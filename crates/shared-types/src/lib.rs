//! # Shared Types Crate
//!
//! Wire and domain types shared by the ticket gateway, the ticket-issuing
//! service and the analysis workers.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: every JSON field name used on the wire is
//!   defined here and nowhere else.
//! - **Canonical Signing Form**: a ticket is signed over its own
//!   serialization with the signature cleared (see [`Ticket::signing_payload`]).
//! - **Deterministic Maps**: task-name mappings are `BTreeMap`s so that the
//!   canonical form does not depend on insertion order.

pub mod entities;
pub mod envelope;
pub mod errors;

pub use entities::*;
pub use envelope::Envelope;
pub use errors::*;
