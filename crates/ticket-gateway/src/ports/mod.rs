//! Ports (hexagonal architecture boundaries).

pub mod outbound;

pub use outbound::{
    BrokerChannel, BrokerConnector, BrokerError, FixedTimeSource, SystemTimeSource, TimeSource,
};
