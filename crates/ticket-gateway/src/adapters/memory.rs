//! # In-Memory Broker
//!
//! Records every declaration and publish instead of talking to a broker.
//! Failures can be scripted so the router's reconnect path is testable
//! without a network.

use crate::domain::routing::Destination;
use crate::ports::outbound::{BrokerChannel, BrokerConnector, BrokerError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

/// A message accepted by the in-memory broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    /// Exchange published to
    pub exchange: String,
    /// Routing key used
    pub routing_key: String,
    /// Raw message body
    pub body: Vec<u8>,
    /// Which connection (1-based) carried the message
    pub connection: usize,
}

impl PublishedMessage {
    /// Body parsed as JSON.
    pub fn json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_slice(&self.body)
    }
}

#[derive(Debug, Default)]
struct BrokerState {
    published: Vec<PublishedMessage>,
    declared: Vec<Destination>,
    connections: usize,
    publish_attempts: usize,
    failing_publishes: usize,
    failing_connects: usize,
}

/// In-memory implementation of [`BrokerConnector`].
///
/// Clones share state, so a test can keep one handle for inspection and hand
/// another to the router.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl InMemoryBroker {
    /// Create an empty broker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` publishes fail.
    pub fn fail_next_publishes(&self, n: usize) {
        self.state.lock().failing_publishes = n;
    }

    /// Make the next `n` connection attempts fail.
    pub fn fail_next_connects(&self, n: usize) {
        self.state.lock().failing_connects = n;
    }

    /// Messages accepted so far, in order.
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.state.lock().published.clone()
    }

    /// Destinations declared so far, in order (repeats on reconnect).
    pub fn declared(&self) -> Vec<Destination> {
        self.state.lock().declared.clone()
    }

    /// Successful connections so far.
    pub fn connections(&self) -> usize {
        self.state.lock().connections
    }

    /// Publish calls so far, failed ones included.
    pub fn publish_attempts(&self) -> usize {
        self.state.lock().publish_attempts
    }
}

#[async_trait]
impl BrokerConnector for InMemoryBroker {
    async fn connect(&self) -> Result<Arc<dyn BrokerChannel>, BrokerError> {
        let mut state = self.state.lock();
        if state.failing_connects > 0 {
            state.failing_connects -= 1;
            return Err(BrokerError::Connect("scripted connect failure".into()));
        }
        state.connections += 1;
        debug!(connection = state.connections, "In-memory broker connected");
        Ok(Arc::new(InMemoryChannel {
            state: Arc::clone(&self.state),
            connection: state.connections,
        }))
    }
}

struct InMemoryChannel {
    state: Arc<Mutex<BrokerState>>,
    connection: usize,
}

#[async_trait]
impl BrokerChannel for InMemoryChannel {
    async fn declare(&self, destination: &Destination) -> Result<(), BrokerError> {
        self.state.lock().declared.push(destination.clone());
        Ok(())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: Vec<u8>,
    ) -> Result<(), BrokerError> {
        let mut state = self.state.lock();
        state.publish_attempts += 1;
        if state.failing_publishes > 0 {
            state.failing_publishes -= 1;
            return Err(BrokerError::Publish("scripted publish failure".into()));
        }
        state.published.push(PublishedMessage {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            body,
            connection: self.connection,
        });
        Ok(())
    }
}
