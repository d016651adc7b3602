//! Domain layer - Core models and rules.
//!
//! Pure types for feeds, health verdicts and sync state.
//! No I/O here (hexagonal architecture inner ring).
//! All types are serializable and testable in isolation.

pub mod feed;
pub mod health;
pub mod sync;

// Re-export core types for convenience
pub use feed::{
    AdapterConfig, FeedSpec, MonitoredInstance, PriceFeedKey, PriceFeedRecord, Protocol, Reading,
};
pub use health::{FeedObservation, FeedVerdict, HealthCheckResult, ProtocolHealthSummary};
pub use sync::{CycleOutcome, SyncState, SyncStateRecord, SyncStatus};
