//! # sitekit-orchestration
//!
//! **Purpose**: Role lifecycle management for the SiteKit development loop
//!
//! Supervises the three development roles (kit server, management UI,
//! file watcher) through a per-role state machine, with readiness gating
//! for the kit server, crash containment with automatic restart, serialized
//! rebuild-then-restart on content changes, and a debounced bridge from
//! file-change events to rebuilds.

pub mod error;
pub mod orchestrator;
pub mod role;

pub use error::{OrchestrationError, Result};
pub use orchestrator::Orchestrator;
pub use role::{OrchestratorConfig, Role, RoleSpec, RoleState};
