//! # sitekit-process
//!
//! **Purpose**: Child-process supervision for the SiteKit orchestrator
//!
//! Provides async spawning with stdio capture, a line-oriented stdout scanner
//! (readiness markers, capability handshake, relayed events), a capped stderr
//! tail for diagnostics, and a two-phase shutdown: message handshake where
//! the child supports it, interrupt-signal polling where it does not, and
//! forceful kill past the hard deadline in either case.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use sitekit_events::EventBus;
//! use sitekit_process::{SpawnOptions, Supervisor};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let supervisor = Supervisor::new(EventBus::new());
//! let options = SpawnOptions::new("node").args(["kit/server.js"]);
//! let process = supervisor.spawn(options).await?;
//! process.close().await;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod managed;
pub mod options;
pub mod supervisor;

pub use error::{ProcessError, Result};
pub use managed::{ExitOutcome, ManagedProcess, ReadySignal, STDERR_TAIL_LINES};
pub use options::{SpawnOptions, DEFAULT_GRACE_TIMEOUT, DEFAULT_HARD_TIMEOUT};
pub use supervisor::Supervisor;
