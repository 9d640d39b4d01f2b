//! # worldvault
//!
//! Versioned git snapshots of live world directories.
//!
//! This facade re-exports the workspace crates:
//!
//! - [`core`]: snapshot repository, synchronizer, retention and the orchestrator
//! - [`server`]: backup scheduler and HTTP API daemon
//! - [`sdk`]: blocking client for a running daemon

pub use worldvault_core as core;
pub use worldvault_sdk as sdk;
pub use worldvault_server as server;

pub use worldvault_core::{SnapshotOrchestrator, VaultConfig};
pub use worldvault_sdk::VaultClient;
pub use worldvault_server::{BackupScheduler, VaultServer};
