//! Project file watching

use std::path::{Path, PathBuf};

use anyhow::Context;
use notify::{Event as FsEvent, EventKind as FsEventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, warn};

use sitekit_events::{Event, EventBus, EventKind};

/// Keeps the filesystem watcher alive; dropping it stops watching.
pub struct ProjectWatcher {
    _watcher: RecommendedWatcher,
}

/// Watch the project directory, emitting `FileChanged` events on the bus.
///
/// Changes to `package.json` are surfaced as `PluginsChanged` instead: the
/// manifest is shared state guarded only by watch-then-diff, so drift is
/// reported rather than corrected.
pub fn watch_project(bus: EventBus, project_dir: &Path) -> anyhow::Result<ProjectWatcher> {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<FsEvent>();

    let mut watcher = notify::recommended_watcher(move |result: notify::Result<FsEvent>| {
        match result {
            Ok(event) => {
                let _ = tx.send(event);
            }
            Err(err) => warn!(error = %err, "file watcher error"),
        }
    })
    .context("failed to create file watcher")?;
    watcher
        .watch(project_dir, RecursiveMode::Recursive)
        .with_context(|| format!("failed to watch `{}`", project_dir.display()))?;

    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if !matches!(
                event.kind,
                FsEventKind::Create(_) | FsEventKind::Modify(_) | FsEventKind::Remove(_)
            ) {
                continue;
            }
            for path in event.paths {
                bus.emit(&to_bus_event(&path));
            }
        }
    });

    Ok(ProjectWatcher { _watcher: watcher })
}

fn to_bus_event(path: &PathBuf) -> Event {
    let display_path = path.display().to_string();
    if path.file_name().is_some_and(|name| name == "package.json") {
        warn!(path = %display_path, "project manifest changed on disk");
        Event::new(EventKind::PluginsChanged).with("path", display_path)
    } else {
        debug!(path = %display_path, "file changed");
        Event::new(EventKind::FileChanged).with("path", display_path)
    }
}
