//! Error types for plugin resolution

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Plugin resolution errors
#[derive(Debug, Error)]
pub enum PluginError {
    /// The declared dependency graph contains a cycle
    #[error("cyclic plugin dependency: {}", chain.join(" -> "))]
    CyclicDependency {
        /// The dependency chain that closed the cycle
        chain: Vec<String>,
    },

    /// The project manifest could not be read
    #[error("failed to read manifest `{path}`: {source}")]
    ManifestRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The project manifest is not valid JSON
    #[error("failed to parse manifest: {0}")]
    ManifestParse(#[from] serde_json::Error),
}

/// Result type for plugin operations
pub type Result<T> = std::result::Result<T, PluginError>;
