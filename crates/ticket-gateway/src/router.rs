//! # Task Router
//!
//! Publishes approved tasks to their broker destinations.
//!
//! ## Failure escalation
//!
//! ```text
//! publish ──ok──► done
//!    │
//!   err
//!    ▼
//! reconnect (up to N dials, fixed delay between them) ──all fail──► Broker error
//!    │
//!   ok
//!    ▼
//! publish once more ──err──► Broker error
//! ```
//!
//! A message is therefore published at most twice per destination. Every
//! dial and publish runs under a deadline; a timeout counts as a failure.

use crate::domain::config::GatewayConfig;
use crate::domain::error::{GatewayError, GatewayResult};
use crate::domain::routing::{Destination, RoutingTable};
use crate::ports::outbound::{BrokerChannel, BrokerConnector, BrokerError};
use parking_lot::RwLock;
use shared_types::Task;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Reconnect and deadline settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Dial attempts after a failed publish
    pub reconnect_attempts: u32,
    /// Pause between dial attempts
    pub reconnect_delay: Duration,
    /// Deadline for dialing and declaring all destinations
    pub connect_timeout: Duration,
    /// Deadline for one publish
    pub publish_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            reconnect_attempts: 3,
            reconnect_delay: Duration::from_secs(3),
            connect_timeout: Duration::from_secs(10),
            publish_timeout: Duration::from_secs(10),
        }
    }
}

impl From<&GatewayConfig> for RetryPolicy {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            reconnect_attempts: config.reconnect.attempts,
            reconnect_delay: config.reconnect.delay,
            connect_timeout: config.timeouts.connect,
            publish_timeout: config.timeouts.publish,
        }
    }
}

/// Routes tasks over one shared broker channel.
pub struct TaskRouter {
    table: RoutingTable,
    connector: Arc<dyn BrokerConnector>,
    policy: RetryPolicy,
    channel: RwLock<Arc<dyn BrokerChannel>>,
}

impl TaskRouter {
    /// Dial the broker and declare every destination of `table`.
    ///
    /// # Errors
    ///
    /// Fails if the initial connection cannot be set up; callers treat this
    /// as fatal.
    pub async fn connect(
        table: RoutingTable,
        connector: Arc<dyn BrokerConnector>,
        policy: RetryPolicy,
    ) -> Result<Self, BrokerError> {
        let channel = open_channel(connector.as_ref(), &table, policy.connect_timeout).await?;
        info!(
            destinations = table.destinations().count(),
            "Broker channel ready"
        );
        Ok(Self {
            table,
            connector,
            policy,
            channel: RwLock::new(channel),
        })
    }

    /// The routing table in use.
    pub fn table(&self) -> &RoutingTable {
        &self.table
    }

    /// Deliver all analyses of `task`.
    ///
    /// Stops at the first destination that cannot be reached; publishes that
    /// already succeeded are not rolled back.
    pub async fn route(&self, task: &Task) -> GatewayResult<()> {
        for delivery in self.table.plan(task) {
            let body = serde_json::to_vec(&delivery.task)
                .map_err(|e| GatewayError::Broker(format!("cannot serialize task: {e}")))?;
            self.publish_with_recovery(&delivery.destination, body)
                .await?;
            debug!(
                exchange = %delivery.destination.exchange,
                routing_key = %delivery.destination.routing_key,
                analyses = delivery.task.tasks.len(),
                "Task published"
            );
        }
        Ok(())
    }

    /// Publish once; on failure reconnect and publish exactly once more.
    pub async fn publish_with_recovery(
        &self,
        destination: &Destination,
        body: Vec<u8>,
    ) -> GatewayResult<()> {
        let first = self.publish_once(destination, body.clone()).await;
        let Err(first_error) = first else {
            return Ok(());
        };
        warn!(
            exchange = %destination.exchange,
            error = %first_error,
            "Publish failed, reconnecting"
        );

        self.reconnect()
            .await
            .map_err(|e| GatewayError::Broker(format!("reconnect failed: {e}")))?;

        self.publish_once(destination, body)
            .await
            .map_err(|e| GatewayError::Broker(e.to_string()))
    }

    /// Replace the shared channel with a fresh one.
    ///
    /// Tries up to `reconnect_attempts` dials with `reconnect_delay` between
    /// them and returns the last error if all fail.
    pub async fn reconnect(&self) -> Result<(), BrokerError> {
        let attempts = self.policy.reconnect_attempts.max(1);
        let mut last_error = BrokerError::Connect("no reconnect attempted".into());

        for attempt in 1..=attempts {
            match open_channel(
                self.connector.as_ref(),
                &self.table,
                self.policy.connect_timeout,
            )
            .await
            {
                Ok(channel) => {
                    *self.channel.write() = channel;
                    info!(attempt, "Reconnected to broker");
                    return Ok(());
                }
                Err(e) => {
                    warn!(attempt, attempts, error = %e, "Broker reconnect failed");
                    last_error = e;
                    if attempt < attempts {
                        tokio::time::sleep(self.policy.reconnect_delay).await;
                    }
                }
            }
        }
        Err(last_error)
    }

    async fn publish_once(&self, destination: &Destination, body: Vec<u8>) -> Result<(), BrokerError> {
        let channel = self.current_channel();
        tokio::time::timeout(
            self.policy.publish_timeout,
            channel.publish(&destination.exchange, &destination.routing_key, body),
        )
        .await
        .map_err(|_| BrokerError::Timeout("publish"))?
    }

    fn current_channel(&self) -> Arc<dyn BrokerChannel> {
        Arc::clone(&self.channel.read())
    }
}

async fn open_channel(
    connector: &dyn BrokerConnector,
    table: &RoutingTable,
    deadline: Duration,
) -> Result<Arc<dyn BrokerChannel>, BrokerError> {
    let setup = async {
        let channel = connector.connect().await?;
        for destination in table.destinations() {
            channel.declare(destination).await?;
        }
        Ok::<_, BrokerError>(channel)
    };
    tokio::time::timeout(deadline, setup)
        .await
        .map_err(|_| BrokerError::Timeout("broker connect"))?
}
