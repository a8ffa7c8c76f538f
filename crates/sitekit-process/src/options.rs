//! Spawn configuration

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use sitekit_events::EventKind;

/// Grace period before shutdown escalates past the polite phase.
pub const DEFAULT_GRACE_TIMEOUT: Duration = Duration::from_secs(3);
/// Hard deadline after which the process is force-killed.
pub const DEFAULT_HARD_TIMEOUT: Duration = Duration::from_secs(8);

/// Configuration for spawning a supervised process
#[derive(Debug, Clone)]
pub struct SpawnOptions {
    /// Executable command
    pub command: String,
    /// Command arguments
    pub args: Vec<String>,
    /// Environment variables added to the parent environment
    pub env: HashMap<String, String>,
    /// Working directory (None = current dir)
    pub working_dir: Option<PathBuf>,
    /// Pipe the child's stdin as a message channel for relayed events
    pub message_channel: bool,
    /// Bus event kinds forwarded into the child over the message channel
    pub forward_in: Vec<EventKind>,
    /// Child event kinds re-emitted on the parent bus
    pub forward_out: Vec<EventKind>,
    /// Whether an unexpected exit rejects the completion future
    pub reject_on_failure: bool,
    /// Grace period for the polite shutdown phase
    pub grace_timeout: Duration,
    /// Hard deadline before force-kill
    pub hard_timeout: Duration,
    /// Stdout markers that signal readiness
    pub ready_markers: Vec<String>,
}

impl SpawnOptions {
    /// Create options for a command with defaults
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: vec![],
            env: HashMap::new(),
            working_dir: None,
            message_channel: false,
            forward_in: vec![],
            forward_out: vec![],
            reject_on_failure: true,
            grace_timeout: DEFAULT_GRACE_TIMEOUT,
            hard_timeout: DEFAULT_HARD_TIMEOUT,
            ready_markers: vec![],
        }
    }

    /// Set command arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Add an environment variable
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set the working directory
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Pipe the child's stdin as a message channel
    pub fn message_channel(mut self, enabled: bool) -> Self {
        self.message_channel = enabled;
        self
    }

    /// Forward these bus events into the child
    pub fn forward_in<I: IntoIterator<Item = EventKind>>(mut self, kinds: I) -> Self {
        self.forward_in = kinds.into_iter().collect();
        self
    }

    /// Re-emit these child events on the parent bus
    pub fn forward_out<I: IntoIterator<Item = EventKind>>(mut self, kinds: I) -> Self {
        self.forward_out = kinds.into_iter().collect();
        self
    }

    /// Treat unexpected exits as settled-with-outcome instead of errors
    pub fn suppress_rejection(mut self) -> Self {
        self.reject_on_failure = false;
        self
    }

    /// Set the grace period for the polite shutdown phase
    pub fn grace_timeout(mut self, timeout: Duration) -> Self {
        self.grace_timeout = timeout;
        self
    }

    /// Set the hard deadline before force-kill
    pub fn hard_timeout(mut self, timeout: Duration) -> Self {
        self.hard_timeout = timeout;
        self
    }

    /// Set the stdout readiness markers
    pub fn ready_markers<I, S>(mut self, markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ready_markers = markers.into_iter().map(Into::into).collect();
        self
    }
}
