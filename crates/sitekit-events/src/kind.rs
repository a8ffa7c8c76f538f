//! Closed, versioned registry of event kinds

use std::fmt;

use serde::{Deserialize, Serialize};

/// Every event kind the orchestrator knows about.
///
/// The registry is closed: wire lines carrying any other tag are rejected at
/// the relay boundary. Only kinds for which [`EventKind::is_relayable`]
/// returns `true` may cross a process boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    /// One or more watched files changed on disk
    FileChanged,
    /// Rebuild static assets, then restart the kit process if the rebuild
    /// succeeded
    KitRebuildAndRestart,
    /// Restart the kit process without rebuilding
    KitRestart,
    /// Restart the management UI process
    ManagementRestart,
    /// Restart the filesystem watcher process
    WatcherRestart,
    /// Close every supervised role and start them again
    FullRestart,
    /// Ask connected browsers to reload the page
    ReloadPage,
    /// The kit process reported readiness on its output stream
    KitReady,
    /// A supervised process exited with an unexpected status; payload carries
    /// its captured stderr tail
    ClosedWithFailure,
    /// A queued command record changed
    CommandUpdated,
    /// The resolved plugin set changed
    PluginsChanged,
    /// Two-phase shutdown request delivered over a message channel
    Shutdown,
    /// Capability announcement: the child opts into the shutdown handshake.
    /// Transport-level; the supervisor consumes it and never re-emits it.
    Handshake,
}

impl EventKind {
    /// All kinds, in registry order.
    pub const ALL: [EventKind; 13] = [
        EventKind::FileChanged,
        EventKind::KitRebuildAndRestart,
        EventKind::KitRestart,
        EventKind::ManagementRestart,
        EventKind::WatcherRestart,
        EventKind::FullRestart,
        EventKind::ReloadPage,
        EventKind::KitReady,
        EventKind::ClosedWithFailure,
        EventKind::CommandUpdated,
        EventKind::PluginsChanged,
        EventKind::Shutdown,
        EventKind::Handshake,
    ];

    /// Whether this kind may cross a process boundary.
    pub fn is_relayable(self) -> bool {
        !matches!(
            self,
            EventKind::ClosedWithFailure | EventKind::PluginsChanged | EventKind::Handshake
        )
    }

    /// Whether this kind asks the receiving process to shut down.
    ///
    /// Shutdown-class kinds may only be forwarded into a child that has a
    /// message channel able to deliver them.
    pub fn is_shutdown_class(self) -> bool {
        matches!(self, EventKind::Shutdown)
    }

    /// Wire tag for this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::FileChanged => "file-changed",
            EventKind::KitRebuildAndRestart => "kit-rebuild-and-restart",
            EventKind::KitRestart => "kit-restart",
            EventKind::ManagementRestart => "management-restart",
            EventKind::WatcherRestart => "watcher-restart",
            EventKind::FullRestart => "full-restart",
            EventKind::ReloadPage => "reload-page",
            EventKind::KitReady => "kit-ready",
            EventKind::ClosedWithFailure => "closed-with-failure",
            EventKind::CommandUpdated => "command-updated",
            EventKind::PluginsChanged => "plugins-changed",
            EventKind::Shutdown => "shutdown",
            EventKind::Handshake => "handshake",
        }
    }

    /// Parse a wire tag back into a kind.
    pub fn parse(tag: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.as_str() == tag)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_trips_every_kind() {
        for kind in EventKind::ALL {
            assert_eq!(EventKind::parse(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn test_parse_rejects_unknown_tag() {
        assert_eq!(EventKind::parse("made-up-event"), None);
    }

    #[test]
    fn test_shutdown_is_relayable_and_shutdown_class() {
        assert!(EventKind::Shutdown.is_relayable());
        assert!(EventKind::Shutdown.is_shutdown_class());
        assert!(!EventKind::KitRestart.is_shutdown_class());
    }

    #[test]
    fn test_diagnostic_kinds_stay_local() {
        assert!(!EventKind::ClosedWithFailure.is_relayable());
        assert!(!EventKind::Handshake.is_relayable());
        assert!(!EventKind::PluginsChanged.is_relayable());
    }
}
