//! Error types for orchestration

use std::io;

use thiserror::Error;

use sitekit_process::ProcessError;

use crate::role::Role;

/// Orchestration errors
#[derive(Debug, Error)]
pub enum OrchestrationError {
    /// A lifecycle operation was requested while one is already in flight
    #[error("role {0} is already starting, running, or stopping")]
    RoleBusy(Role),

    /// The role's process spawned but never became ready
    #[error("role {role} failed to start: {source}")]
    StartupFailed {
        role: Role,
        #[source]
        source: ProcessError,
    },

    /// The static-asset rebuild exited with a failure
    #[error("rebuild command failed (code {code:?})")]
    RebuildFailed { code: Option<i32> },

    /// The rebuild command could not be spawned
    #[error("failed to spawn rebuild command: {0}")]
    RebuildSpawn(#[from] io::Error),

    /// Process supervision failure
    #[error(transparent)]
    Process(#[from] ProcessError),
}

/// Result type for orchestration operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;
