//! Role identities, states, and per-role configuration

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use sitekit_events::EventKind;

/// The three supervised process kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// The site server rendering the prototype
    Kit,
    /// The management UI
    Management,
    /// The source file watcher
    Watcher,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Kit, Role::Management, Role::Watcher];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Kit => "kit",
            Role::Management => "management",
            Role::Watcher => "watcher",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of one role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoleState {
    #[default]
    NotStarted,
    Starting,
    Running,
    Stopping,
    Stopped,
    Crashed,
}

/// How to start one role.
#[derive(Debug, Clone)]
pub struct RoleSpec {
    /// Executable command
    pub command: String,
    /// Command arguments
    pub args: Vec<String>,
    /// Extra environment on top of the parent's
    pub env: HashMap<String, String>,
    /// Exported to the child as `PORT`
    pub port: Option<u16>,
    /// Pipe stdin as a message channel
    pub message_channel: bool,
    /// Bus events forwarded into the child
    pub forward_in: Vec<EventKind>,
    /// Child events re-emitted on the bus
    pub forward_out: Vec<EventKind>,
    /// Stdout markers that signal readiness; empty means the role counts
    /// as running as soon as it spawns
    pub ready_markers: Vec<String>,
    /// How long to wait for a readiness marker
    pub ready_timeout: Duration,
}

impl RoleSpec {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: vec![],
            env: HashMap::new(),
            port: None,
            message_channel: false,
            forward_in: vec![],
            forward_out: vec![],
            ready_markers: vec![],
            ready_timeout: Duration::from_secs(30),
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn message_channel(mut self, enabled: bool) -> Self {
        self.message_channel = enabled;
        self
    }

    pub fn forward_in<I: IntoIterator<Item = EventKind>>(mut self, kinds: I) -> Self {
        self.forward_in = kinds.into_iter().collect();
        self
    }

    pub fn forward_out<I: IntoIterator<Item = EventKind>>(mut self, kinds: I) -> Self {
        self.forward_out = kinds.into_iter().collect();
        self
    }

    pub fn ready_markers<I, S>(mut self, markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ready_markers = markers.into_iter().map(Into::into).collect();
        self
    }

    pub fn ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }
}

/// Whole-orchestrator configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub kit: RoleSpec,
    pub management: RoleSpec,
    pub watcher: RoleSpec,
    /// Static-asset rebuild command; empty skips the rebuild phase
    pub rebuild_command: Vec<String>,
    /// Working directory for all roles and the rebuild command
    pub working_dir: PathBuf,
}

impl OrchestratorConfig {
    pub fn new(
        kit: RoleSpec,
        management: RoleSpec,
        watcher: RoleSpec,
        working_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            kit,
            management,
            watcher,
            rebuild_command: vec![],
            working_dir: working_dir.into(),
        }
    }

    pub fn rebuild_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rebuild_command = command.into_iter().map(Into::into).collect();
        self
    }

    pub fn spec(&self, role: Role) -> &RoleSpec {
        match role {
            Role::Kit => &self.kit,
            Role::Management => &self.management,
            Role::Watcher => &self.watcher,
        }
    }
}
