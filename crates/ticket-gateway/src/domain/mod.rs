//! Domain types for the ticket gateway.
//!
//! Pure policy: configuration, error taxonomy, task validation, the ACL and
//! the routing table. Nothing in here performs I/O except reading the
//! configuration file.

pub mod acl;
pub mod config;
pub mod error;
pub mod routing;
pub mod validation;

// Re-exports for convenience
pub use acl::{AccessPolicy, OrgPolicy, Partition, WILDCARD};
pub use config::{ConfigError, GatewayConfig, ReconnectConfig, TimeoutConfig};
pub use error::{GatewayError, GatewayResult};
pub use routing::{Delivery, Destination, RoutingTable};
pub use validation::{is_printable, validate_task};
