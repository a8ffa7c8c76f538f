//! # sitekit-commands
//!
//! **Purpose**: Asynchronous command queue for the SiteKit orchestrator
//!
//! Queues package-manager commands (install, add, update) for fire-and-forget
//! execution, tracks each command as a monotonic record with a terminal
//! `completed` flag, serves long-poll progress queries backed by an internal
//! update broadcaster, and escalates dependency upgrades (detected by diffing
//! the project manifest around the run) to a full-process restart event.

pub mod error;
pub mod manifest;
pub mod queue;
pub mod record;

pub use error::{CommandError, Result};
pub use manifest::changed_dependencies;
pub use queue::{CommandQueue, ProgressResponse, QueueConfig, Queued};
pub use record::CommandRecord;
