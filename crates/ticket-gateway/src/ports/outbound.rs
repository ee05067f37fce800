//! # Outbound Ports (Driven Ports)
//!
//! Dependencies the ticket gateway requires from its host: a message broker
//! and a clock.
//!
//! Production: `AmqpConnector` (adapters/amqp.rs), `SystemTimeSource`
//! Testing: `InMemoryBroker` (adapters/memory.rs), fixed clocks

use crate::domain::routing::Destination;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Broker failures. All of them are recoverable from the request's point of
/// view; the router decides whether to reconnect.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BrokerError {
    /// Dialing or opening a channel failed
    #[error("connection failed: {0}")]
    Connect(String),
    /// Declaring or binding a destination failed
    #[error("declare failed: {0}")]
    Declare(String),
    /// The broker did not accept the message
    #[error("publish failed: {0}")]
    Publish(String),
    /// The operation did not finish before its deadline
    #[error("{0} timed out")]
    Timeout(&'static str),
}

/// An open publish channel.
///
/// Implementations must be safe to share between concurrent requests.
#[async_trait]
pub trait BrokerChannel: Send + Sync {
    /// Idempotently declare a durable queue and durable topic exchange and
    /// bind them with the destination's routing key.
    async fn declare(&self, destination: &Destination) -> Result<(), BrokerError>;

    /// Publish `body` persistently and wait for the broker to accept it.
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: Vec<u8>,
    ) -> Result<(), BrokerError>;
}

/// Establishes (and re-establishes) broker channels.
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    /// Dial the broker and open a fresh channel.
    async fn connect(&self) -> Result<Arc<dyn BrokerChannel>, BrokerError>;
}

/// Time source trait for testability
pub trait TimeSource: Send + Sync {
    /// Current wall-clock time.
    fn now(&self) -> DateTime<Utc>;
}

/// System time implementation
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedTimeSource(pub DateTime<Utc>);

impl TimeSource for FixedTimeSource {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
