//! Error types for process supervision

use std::io;

use thiserror::Error;

/// Process supervision errors
#[derive(Debug, Error)]
pub enum ProcessError {
    /// Invalid spawn configuration; raised synchronously at spawn time
    #[error("invalid spawn configuration: {0}")]
    InvalidConfig(String),

    /// The OS refused to spawn the process
    #[error("failed to spawn `{command}`: {source}")]
    SpawnFailed {
        command: String,
        #[source]
        source: io::Error,
    },

    /// The process exited with an unexpected status
    #[error(
        "`{command}` (pid {pid}) closed with failure (code {code:?}): {stderr}\nspawned at:\n{spawned_at}"
    )]
    ClosedWithFailure {
        command: String,
        pid: u32,
        code: Option<i32>,
        stderr: String,
        /// Call-site backtrace captured at spawn, for diagnosability
        spawned_at: String,
    },

    /// No readiness marker appeared on stdout before the deadline
    #[error("`{command}` produced no readiness marker before the deadline; stderr: {stderr}")]
    ReadyTimeout { command: String, stderr: String },

    /// The process was spawned without a message channel
    #[error("process has no message channel")]
    NoMessageChannel,

    /// Event encoding or allowlist failure
    #[error(transparent)]
    Event(#[from] sitekit_events::EventError),
}

/// Result type for process operations
pub type Result<T> = std::result::Result<T, ProcessError>;
