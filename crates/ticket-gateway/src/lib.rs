//! # Ticket Gateway
//!
//! Secure ingestion point of the task-dispatch platform. Organizations submit
//! signed, expiring tickets inside a hybrid RSA/AES envelope; the gateway
//! decrypts them, checks the signature and expiration, enforces the
//! per-organization ACL and publishes every accepted task to the broker.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                          TICKET GATEWAY                              │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │   POST /task/ ──► RequestHandler                                     │
//! │                      │                                               │
//! │          ┌───────────┼──────────────┬──────────────┐                 │
//! │          ▼           ▼              ▼              ▼                 │
//! │    TicketCrypto  AccessPolicy   validation     TaskRouter            │
//! │          │                                         │                 │
//! │          ▼                                         ▼                 │
//! │    KeyRegistry ◄── KeyWatcher (notify)      BrokerConnector          │
//! │                                              (AMQP / memory)         │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use ticket_gateway::{GatewayConfig, KeyRegistry, TaskRouter, AmqpConnector};
//!
//! let config = GatewayConfig::from_file("config/gateway.conf")?;
//! let keys = Arc::new(KeyRegistry::new());
//! keys.load(&config.sources_keys_path, &config.ticket_keys_path)?;
//! let router = TaskRouter::connect(
//!     config.routing_table(),
//!     Arc::new(AmqpConnector::new(config.broker_uri())),
//!     RetryPolicy::from(&config),
//! ).await?;
//! ```

#![allow(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod adapters;
pub mod domain;
pub mod handler;
pub mod keys;
pub mod ports;
pub mod router;
pub mod service;
pub mod ticket_crypto;

#[cfg(test)]
mod test_utils;

// Re-exports
pub use adapters::{AmqpConnector, InMemoryBroker, PublishedMessage};
pub use domain::{
    AccessPolicy, ConfigError, Delivery, Destination, GatewayConfig, GatewayError, GatewayResult,
    RoutingTable,
};
pub use handler::{EnvelopeRequest, GatewayResponse, RequestHandler};
pub use keys::{watch, KeyLoadError, KeyRegistry, KeyWatcher};
pub use ports::{BrokerChannel, BrokerConnector, BrokerError, SystemTimeSource, TimeSource};
pub use router::{RetryPolicy, TaskRouter};
pub use service::{build_router, GatewayService};
pub use ticket_crypto::{encrypt_answer, seal_envelope, sign_ticket, ResponseKey, TicketCrypto};
