//! Adapters Layer - Hexagonal Architecture Outer Ring
//!
//! Implements the port traits defined in `crate::ports` with concrete
//! external dependencies (HTTP clients, file I/O, Prometheus). Each
//! sub-module groups adapters by infrastructure concern.
//!
//! Adapter categories:
//! - `catalog`: instances from configuration
//! - `metrics`: Prometheus telemetry and liveness/readiness probes
//! - `oracles`: generic HTTP/JSON oracle adapter
//! - `persistence`: JSONL logs, sync-state snapshots, in-memory gateway

pub mod catalog;
pub mod metrics;
pub mod oracles;
pub mod persistence;
