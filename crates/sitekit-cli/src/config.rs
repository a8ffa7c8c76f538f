//! `sitekit.toml` configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use sitekit_commands::QueueConfig;
use sitekit_events::EventKind;
use sitekit_orchestration::{OrchestratorConfig, RoleSpec};

/// Project configuration, loaded from `sitekit.toml`.
///
/// Every field has a default so a missing or empty file still yields a
/// workable development setup.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub kit: RoleSection,
    pub management: RoleSection,
    pub watcher: RoleSection,
    /// Static-asset rebuild command, e.g. `["npm", "run", "build"]`
    pub rebuild_command: Vec<String>,
    /// Package-manager binary for queued commands
    pub command_runner: String,
    /// Plugins that always load first, before dependency resolution
    pub always_first_plugins: Vec<String>,
    /// Manifest dependency prefix that marks a package as a plugin
    pub plugin_prefix: String,
    /// Declared plugin dependencies, package name to its prerequisites
    pub plugin_dependencies: std::collections::BTreeMap<String, Vec<String>>,
    /// File-change debounce window in milliseconds
    pub debounce_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            kit: RoleSection {
                command: "node".into(),
                args: vec!["kit/server.js".into()],
                ready_markers: vec!["now running".into(), "listening".into()],
                ready_timeout_secs: 30,
                message_channel: true,
            },
            management: RoleSection {
                command: "node".into(),
                args: vec!["management/server.js".into()],
                ready_markers: vec![],
                ready_timeout_secs: 30,
                message_channel: true,
            },
            watcher: RoleSection {
                command: "node".into(),
                args: vec!["watcher/index.js".into()],
                ready_markers: vec![],
                ready_timeout_secs: 30,
                message_channel: false,
            },
            rebuild_command: vec![],
            command_runner: "npm".into(),
            always_first_plugins: vec![],
            plugin_prefix: "sitekit-plugin-".into(),
            plugin_dependencies: Default::default(),
            debounce_ms: 300,
        }
    }
}

/// One role's entry point.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RoleSection {
    pub command: String,
    pub args: Vec<String>,
    pub ready_markers: Vec<String>,
    pub ready_timeout_secs: u64,
    pub message_channel: bool,
}

impl Default for RoleSection {
    fn default() -> Self {
        Self {
            command: "node".into(),
            args: vec![],
            ready_markers: vec![],
            ready_timeout_secs: 30,
            message_channel: false,
        }
    }
}

impl Config {
    /// Load the config file; a missing file yields the defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config `{}`", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("invalid config `{}`", path.display()))
    }

    pub fn debounce_interval(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Orchestrator wiring: which events each role exchanges with the bus.
    pub fn to_orchestrator_config(
        &self,
        project_dir: &Path,
        kit_port: u16,
        management_port: u16,
        plugin_order: &[String],
    ) -> OrchestratorConfig {
        let kit = self
            .kit
            .to_spec()
            .port(kit_port)
            .env("SITEKIT_PLUGINS", plugin_order.join(","))
            .forward_in([EventKind::ReloadPage, EventKind::Shutdown])
            .forward_out([EventKind::FileChanged]);
        let management = self
            .management
            .to_spec()
            .port(management_port)
            .env("SITEKIT_KIT_PORT", kit_port.to_string())
            .forward_in([
                EventKind::ReloadPage,
                EventKind::KitReady,
                EventKind::CommandUpdated,
                EventKind::Shutdown,
            ]);
        let watcher = self.watcher.to_spec().forward_out([EventKind::FileChanged]);

        OrchestratorConfig::new(kit, management, watcher, project_dir)
            .rebuild_command(self.rebuild_command.clone())
    }

    pub fn queue_config(&self, project_dir: &Path) -> QueueConfig {
        QueueConfig::new(&self.command_runner, project_dir)
            .manifest_path(project_dir.join("package.json"))
    }
}

impl RoleSection {
    fn to_spec(&self) -> RoleSpec {
        RoleSpec::new(&self.command)
            .args(self.args.clone())
            .ready_markers(self.ready_markers.clone())
            .ready_timeout(Duration::from_secs(self.ready_timeout_secs))
            .message_channel(self.message_channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = Config::load(Path::new("/nonexistent/sitekit.toml")).unwrap();
        assert_eq!(config.command_runner, "npm");
        assert_eq!(config.debounce_ms, 300);
    }

    #[test]
    fn test_partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sitekit.toml");
        std::fs::write(
            &path,
            "command_runner = \"pnpm\"\n\n[kit]\ncommand = \"deno\"\nargs = [\"run\", \"kit.ts\"]\n",
        )
        .unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.command_runner, "pnpm");
        assert_eq!(config.kit.command, "deno");
        assert_eq!(config.watcher.command, "node");
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sitekit.toml");
        std::fs::write(&path, "comand_runner = \"npm\"\n").unwrap();
        assert!(Config::load(&path).is_err());
    }
}
