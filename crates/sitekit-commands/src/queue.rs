//! Fire-and-forget command execution with long-poll progress

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::RwLock;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tokio::time::timeout_at;
use tracing::{debug, info, warn};
use uuid::Uuid;

use sitekit_common::retry_bounded;
use sitekit_events::{Event, EventBus, EventKind};

use crate::error::{CommandError, Result};
use crate::manifest::{changed_dependencies, read_deps_once};
use crate::record::CommandRecord;

/// Bounded retry budget for manifest reads around a command run.
const MANIFEST_READ_ATTEMPTS: u32 = 3;
const MANIFEST_READ_DELAY: Duration = Duration::from_millis(150);

/// Command queue configuration
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Package-manager binary the queue shells out to
    pub runner: String,
    /// Working directory for runner invocations
    pub working_dir: PathBuf,
    /// Project manifest diffed around each run
    pub manifest_path: PathBuf,
    /// Server-side nudge: the longest a progress poll may hold
    pub nudge_interval: Duration,
    /// Path prefix used when composing `next_url` values
    pub progress_path: String,
}

impl QueueConfig {
    pub fn new(runner: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        let working_dir = working_dir.into();
        Self {
            runner: runner.into(),
            manifest_path: working_dir.join("package.json"),
            working_dir,
            nudge_interval: Duration::from_secs(25),
            progress_path: "/sitekit/progress".to_string(),
        }
    }

    pub fn manifest_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.manifest_path = path.into();
        self
    }

    pub fn nudge_interval(mut self, interval: Duration) -> Self {
        self.nudge_interval = interval;
        self
    }
}

/// Acknowledgement returned at queue time.
#[derive(Debug, Clone)]
pub struct Queued {
    pub id: Uuid,
    /// Where to poll for progress
    pub next_url: String,
}

/// A progress snapshot; `next_url` is present while the record is
/// non-terminal.
#[derive(Debug, Clone)]
pub struct ProgressResponse {
    pub record: CommandRecord,
    pub next_url: Option<String>,
}

/// Asynchronous command queue.
///
/// Cloning is cheap; all clones share the same record map and update
/// broadcaster.
#[derive(Clone)]
pub struct CommandQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    bus: EventBus,
    config: QueueConfig,
    records: RwLock<HashMap<Uuid, CommandRecord>>,
    changed: broadcast::Sender<Uuid>,
}

impl CommandQueue {
    pub fn new(bus: EventBus, config: QueueConfig) -> Self {
        let (changed, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(QueueInner {
                bus,
                config,
                records: RwLock::new(HashMap::new()),
                changed,
            }),
        }
    }

    /// Queue a command for execution. Returns immediately; the run happens
    /// in a background task and progress is observed via [`Self::progress`].
    pub fn queue(&self, command: impl Into<String>) -> Queued {
        let record = CommandRecord::new(command);
        let id = record.id;
        let next_url = self.next_url(&record);
        info!(id = %id, command = %record.command, "queued command");
        self.inner.records.write().unwrap().insert(id, record);

        let queue = self.clone();
        tokio::spawn(async move {
            queue.run(id).await;
        });

        Queued { id, next_url }
    }

    /// Current record snapshot.
    pub fn record(&self, id: Uuid) -> Option<CommandRecord> {
        self.inner.records.read().unwrap().get(&id).cloned()
    }

    /// Long-poll a record.
    ///
    /// Returns immediately when the record is newer than `updated_since`,
    /// otherwise holds until the record changes or the server-side nudge
    /// deadline passes. Terminal records drop `next_url`.
    pub async fn progress(&self, id: Uuid, updated_since: Option<i64>) -> Result<ProgressResponse> {
        // Subscribe before the first read so an update between the read and
        // the wait cannot be missed.
        let mut rx = self.inner.changed.subscribe();
        let deadline = tokio::time::Instant::now() + self.inner.config.nudge_interval;
        loop {
            let record = self.record(id).ok_or(CommandError::NotFound(id))?;
            let fresh = updated_since.map_or(true, |since| record.updated_millis() > since);
            if fresh {
                return Ok(self.response(record));
            }
            match timeout_at(deadline, rx.recv()).await {
                Ok(Ok(changed_id)) if changed_id == id => continue,
                Ok(Ok(_)) => continue,
                // Lagged or closed broadcaster, or the nudge fired: answer
                // with the current state so the client can re-poll.
                Ok(Err(_)) | Err(_) => {
                    let record = self.record(id).ok_or(CommandError::NotFound(id))?;
                    return Ok(self.response(record));
                }
            }
        }
    }

    fn response(&self, record: CommandRecord) -> ProgressResponse {
        let next_url = (!record.completed).then(|| self.next_url(&record));
        ProgressResponse { record, next_url }
    }

    fn next_url(&self, record: &CommandRecord) -> String {
        format!(
            "{}?id={}&updatedSince={}",
            self.inner.config.progress_path,
            record.id,
            record.updated_millis()
        )
    }

    /// Apply a mutation to a record, refusing terminal mutations and keeping
    /// `updated_date` strictly increasing.
    ///
    /// Monotonicity is enforced at millisecond granularity, the cursor unit
    /// of [`Self::progress`]: two updates landing in the same millisecond
    /// must still produce distinct cursors or a held poll would miss the
    /// second one.
    fn update(&self, id: Uuid, mutate: impl FnOnce(&mut CommandRecord)) {
        {
            let mut records = self.inner.records.write().unwrap();
            let Some(record) = records.get_mut(&id) else {
                warn!(id = %id, "update for unknown command record");
                return;
            };
            if record.completed {
                warn!(id = %id, "ignoring update to a terminal command record");
                return;
            }
            mutate(record);
            let now = Utc::now();
            record.updated_date = if now.timestamp_millis() > record.updated_millis() {
                now
            } else {
                record.updated_date + chrono::Duration::milliseconds(1)
            };
        }
        let _ = self.inner.changed.send(id);
        self.inner
            .bus
            .emit(&Event::new(EventKind::CommandUpdated).with("id", id.to_string()));
    }

    async fn run(&self, id: Uuid) {
        let config = &self.inner.config;
        let before = self.read_deps().await;

        self.update(id, |record| record.started = true);

        let command = match self.record(id) {
            Some(record) => record.command,
            None => return,
        };
        let status = tokio::process::Command::new(&config.runner)
            .args(command.split_whitespace())
            .current_dir(&config.working_dir)
            .status()
            .await;
        let success = match status {
            Ok(status) => status.success(),
            Err(err) => {
                warn!(id = %id, runner = %config.runner, error = %err, "command runner failed to spawn");
                false
            }
        };

        let after = self.read_deps().await;
        let changed = changed_dependencies(&before, &after);
        let restarting = success && !changed.is_empty();

        self.update(id, |record| {
            record.completed = true;
            record.success = Some(success);
            record.restarting = restarting;
        });

        if restarting {
            info!(id = %id, changed = ?changed, "dependency upgrade detected; escalating to full restart");
            self.inner.bus.emit(
                &Event::new(EventKind::FullRestart)
                    .with("commandId", id.to_string())
                    .with("changed", changed),
            );
        } else {
            debug!(id = %id, success, "command settled");
        }
    }

    async fn read_deps(&self) -> BTreeMap<String, String> {
        let path = self.inner.config.manifest_path.clone();
        retry_bounded(MANIFEST_READ_ATTEMPTS, MANIFEST_READ_DELAY, || {
            let path = path.clone();
            async move { read_deps_once(&path).ok_or("manifest unavailable") }
        })
        .await
        .unwrap_or_default()
    }
}
