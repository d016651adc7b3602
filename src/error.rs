//! Error Taxonomy - Setup Failures vs In-cycle Failures
//!
//! `NotFound` and `UnregisteredProtocol` are returned to whoever starts a
//! sync or a monitor. `Adapter`, `Persistence` and `Timeout` happen inside
//! running cycles and are recorded, never propagated out of a timer task.

use thiserror::Error;

use crate::domain::feed::Protocol;

/// Errors raised by the scheduling engine.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MonitorError {
    /// Unknown instance id.
    #[error("instance not found: {0}")]
    NotFound(String),

    /// Nothing wired in the registry for this protocol.
    #[error("no {kind} registered for protocol {protocol}")]
    UnregisteredProtocol {
        protocol: Protocol,
        kind: &'static str,
    },

    /// Failure from a protocol adapter or sync function.
    #[error("adapter error: {0}")]
    Adapter(String),

    /// Failure writing through the persistence gateway.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// A guarded call did not settle in time.
    #[error("{0}")]
    Timeout(String),
}

impl MonitorError {
    /// Wrap any adapter-side error, keeping its context chain.
    pub fn adapter(err: &anyhow::Error) -> Self {
        Self::Adapter(format!("{err:#}"))
    }

    /// Wrap any gateway-side error, keeping its context chain.
    pub fn persistence(err: &anyhow::Error) -> Self {
        Self::Persistence(format!("{err:#}"))
    }
}

/// Result alias for the engine.
pub type Result<T> = std::result::Result<T, MonitorError>;
