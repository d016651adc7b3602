//! Persistence Adapters - JSONL and Snapshot File Storage
//!
//! Implements the `PersistenceGateway` port with append-only JSONL files
//! for price rows and atomic JSON snapshots for health and sync rows.
//! `MemoryGateway` holds the same tables without touching disk.

pub mod file_gateway;
pub mod memory;
pub mod records;
pub mod state;

pub use file_gateway::FileGateway;
pub use memory::MemoryGateway;
pub use records::RecordLog;
pub use state::SnapshotStore;
