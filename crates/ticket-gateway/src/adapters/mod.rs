//! Adapters for the outbound ports.
//!
//! - `amqp`: production broker over AMQP 0-9-1
//! - `memory`: in-process broker for tests and local runs

pub mod amqp;
pub mod memory;

pub use amqp::AmqpConnector;
pub use memory::{InMemoryBroker, PublishedMessage};
