//! SiteKit development orchestrator entry point

mod config;
mod console;
mod watch;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use sitekit_commands::CommandQueue;
use sitekit_common::logging;
use sitekit_events::EventBus;
use sitekit_orchestration::Orchestrator;
use sitekit_plugins::{base_order, installed_plugins, resolve_load_order, PluginNode};

use crate::config::Config;

#[derive(Debug, Parser)]
#[command(name = "sitekit", version, about = "Local development orchestrator for templated sites")]
struct Cli {
    /// Project directory containing the site and its manifest
    #[arg(default_value = ".")]
    project_dir: PathBuf,

    /// Config file path (defaults to `sitekit.toml` in the project dir)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Port for the kit server
    #[arg(long, default_value_t = 4000)]
    kit_port: u16,

    /// Port for the management UI
    #[arg(long, default_value_t = 4001)]
    management_port: u16,

    /// Verbose (debug-level) logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_tracing(cli.verbose);

    let project_dir = cli
        .project_dir
        .canonicalize()
        .with_context(|| format!("project dir `{}` not found", cli.project_dir.display()))?;
    let config_path = cli
        .config
        .unwrap_or_else(|| project_dir.join("sitekit.toml"));
    let config = Config::load(&config_path)?;

    let plugin_order = resolve_plugins(&config, &project_dir)?;
    info!(plugins = %plugin_order.join(", "), "resolved plugin load order");

    let bus = EventBus::new();
    let orchestrator = Orchestrator::new(
        bus.clone(),
        config.to_orchestrator_config(&project_dir, cli.kit_port, cli.management_port, &plugin_order),
    );
    orchestrator.install_handlers();
    orchestrator.install_file_debounce(config.debounce_interval());

    let queue = CommandQueue::new(bus.clone(), config.queue_config(&project_dir));
    let _watcher = watch::watch_project(bus.clone(), &project_dir)?;

    orchestrator.start_all().await?;
    info!(
        kit_port = cli.kit_port,
        management_port = cli.management_port,
        "all roles started"
    );

    tokio::select! {
        _ = console::run(bus.clone(), orchestrator.clone(), queue) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received; shutting down");
        }
    }

    orchestrator.shutdown_all().await?;
    Ok(())
}

/// Compute the plugin load order from the manifest and config.
fn resolve_plugins(config: &Config, project_dir: &std::path::Path) -> anyhow::Result<Vec<String>> {
    let manifest = project_dir.join("package.json");
    let installed = match installed_plugins(&manifest, &config.plugin_prefix) {
        Ok(installed) => installed,
        Err(err) => {
            warn!(error = %err, "could not list installed plugins; continuing without");
            return Ok(vec![]);
        }
    };
    let nodes: Vec<PluginNode> = installed
        .iter()
        .map(|name| {
            let deps = config
                .plugin_dependencies
                .get(name)
                .cloned()
                .unwrap_or_default();
            PluginNode::new(name.clone()).depends_on(deps)
        })
        .collect();
    let order = base_order(&config.always_first_plugins, &nodes);
    resolve_load_order(&order, &nodes).context("plugin dependency resolution failed")
}
