//! Error types for the command queue

use std::io;

use thiserror::Error;
use uuid::Uuid;

/// Command queue errors
#[derive(Debug, Error)]
pub enum CommandError {
    /// No record exists for the given id
    #[error("unknown command id {0}")]
    NotFound(Uuid),

    /// The command runner could not be spawned
    #[error("failed to spawn command runner: {0}")]
    Runner(#[from] io::Error),
}

/// Result type for command-queue operations
pub type Result<T> = std::result::Result<T, CommandError>;
