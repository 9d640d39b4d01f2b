//! # worldvault-server
//!
//! Daemon for worldvault: runs scheduled backups and exposes the orchestrator over HTTP.

pub mod api;
pub mod scheduler;
pub mod server;

pub use scheduler::{BackupScheduler, ScheduleControl};
pub use server::VaultServer;
