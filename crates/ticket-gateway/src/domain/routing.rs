//! Static routing of analyses to broker destinations.
//!
//! Every analysis goes to the default destination unless an override is
//! configured for its name. A task requesting several analyses is split:
//! one sub-task per overridden analysis, plus one sub-task carrying all
//! remaining analyses for the default destination.

use serde::{Deserialize, Serialize};
use shared_types::{Task, TaskMap};
use std::collections::HashMap;

/// A broker exchange/queue/routing-key triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct Destination {
    /// Durable queue bound to the exchange
    pub queue: String,
    /// Durable topic exchange published to
    pub exchange: String,
    /// Routing key used for both binding and publishing
    pub routing_key: String,
}

impl Destination {
    /// Create a new destination.
    pub fn new(
        queue: impl Into<String>,
        exchange: impl Into<String>,
        routing_key: impl Into<String>,
    ) -> Self {
        Self {
            queue: queue.into(),
            exchange: exchange.into(),
            routing_key: routing_key.into(),
        }
    }
}

/// One publish the router has to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Where to publish
    pub destination: Destination,
    /// What to publish
    pub task: Task,
}

/// Default destination plus per-analysis overrides.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RoutingTable {
    default: Destination,
    overrides: HashMap<String, Destination>,
}

impl RoutingTable {
    /// Create a routing table.
    pub fn new(default: Destination, overrides: HashMap<String, Destination>) -> Self {
        Self { default, overrides }
    }

    /// The default destination.
    pub fn default_destination(&self) -> &Destination {
        &self.default
    }

    /// Override configured for an analysis name, if any.
    pub fn override_for(&self, name: &str) -> Option<&Destination> {
        self.overrides.get(name)
    }

    /// Every destination that must exist on the broker, default first.
    pub fn destinations(&self) -> impl Iterator<Item = &Destination> {
        std::iter::once(&self.default).chain(self.overrides.values())
    }

    /// Split a task into the publishes needed to deliver all its analyses.
    ///
    /// Overridden analyses come first, in name order, each as a single-entry
    /// sub-task. The remaining analyses follow as one sub-task for the default
    /// destination, omitted when nothing remains.
    pub fn plan(&self, task: &Task) -> Vec<Delivery> {
        let mut remaining = TaskMap::new();
        let mut deliveries = Vec::new();

        for (name, args) in &task.tasks {
            match self.overrides.get(name) {
                Some(destination) => {
                    let single = TaskMap::from([(name.clone(), args.clone())]);
                    deliveries.push(Delivery {
                        destination: destination.clone(),
                        task: task.with_tasks(single),
                    });
                }
                None => {
                    remaining.insert(name.clone(), args.clone());
                }
            }
        }

        if !remaining.is_empty() {
            deliveries.push(Delivery {
                destination: self.default.clone(),
                task: task.with_tasks(remaining),
            });
        }
        deliveries
    }
}
