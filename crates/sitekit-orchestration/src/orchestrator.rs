//! Role state machine and restart policies

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use sitekit_common::{Debouncer, Serializer};
use sitekit_events::{Event, EventBus, EventKind};
use sitekit_process::{ExitOutcome, ManagedProcess, SpawnOptions, Supervisor};

use crate::error::{OrchestrationError, Result};
use crate::role::{OrchestratorConfig, Role, RoleState};

/// Live state of one role slot.
#[derive(Default)]
struct RoleSlot {
    state: RoleState,
    process: Option<ManagedProcess>,
    /// Whether this role ever reached `Running`; gates crash-restart
    reached_running: bool,
    restart_count: u32,
}

struct Inner {
    bus: EventBus,
    supervisor: Supervisor,
    config: OrchestratorConfig,
    kit: Mutex<RoleSlot>,
    management: Mutex<RoleSlot>,
    watcher: Mutex<RoleSlot>,
    kit_ops: Serializer,
    management_ops: Serializer,
    watcher_ops: Serializer,
}

/// Orchestrates the three development roles.
///
/// Cloning is cheap; all clones share the same slots and serializers.
/// Within one role, lifecycle operations never interleave: the slot mutex
/// covers spawn-to-ready and stop-to-settled, and rebuild/restart sequences
/// run through a per-role serializer.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn new(bus: EventBus, config: OrchestratorConfig) -> Self {
        let supervisor = Supervisor::new(bus.clone());
        Self {
            inner: Arc::new(Inner {
                bus,
                supervisor,
                config,
                kit: Mutex::default(),
                management: Mutex::default(),
                watcher: Mutex::default(),
                kit_ops: Serializer::new(),
                management_ops: Serializer::new(),
                watcher_ops: Serializer::new(),
            }),
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    fn slot(&self, role: Role) -> &Mutex<RoleSlot> {
        match role {
            Role::Kit => &self.inner.kit,
            Role::Management => &self.inner.management,
            Role::Watcher => &self.inner.watcher,
        }
    }

    fn ops(&self, role: Role) -> &Serializer {
        match role {
            Role::Kit => &self.inner.kit_ops,
            Role::Management => &self.inner.management_ops,
            Role::Watcher => &self.inner.watcher_ops,
        }
    }

    pub async fn state(&self, role: Role) -> RoleState {
        self.slot(role).lock().await.state
    }

    pub async fn restart_count(&self, role: Role) -> u32 {
        self.slot(role).lock().await.restart_count
    }

    pub async fn role_fork_id(&self, role: Role) -> Option<String> {
        self.slot(role)
            .lock()
            .await
            .process
            .as_ref()
            .map(|p| p.fork_id().to_string())
    }

    /// Start a role that is not currently live.
    ///
    /// The kit role is gated on its readiness marker; other roles count as
    /// running once spawned. Holding the slot lock across the whole start
    /// keeps the crash monitor from observing a half-started slot.
    pub async fn start_role(&self, role: Role) -> Result<()> {
        let mut slot = self.slot(role).lock().await;
        if matches!(
            slot.state,
            RoleState::Starting | RoleState::Running | RoleState::Stopping
        ) {
            return Err(OrchestrationError::RoleBusy(role));
        }
        slot.state = RoleState::Starting;
        info!(role = %role, "starting role");

        let spec = self.inner.config.spec(role);
        let mut options = SpawnOptions::new(&spec.command)
            .args(spec.args.clone())
            .working_dir(&self.inner.config.working_dir)
            .message_channel(spec.message_channel)
            .forward_in(spec.forward_in.clone())
            .forward_out(spec.forward_out.clone())
            .ready_markers(spec.ready_markers.clone())
            .suppress_rejection();
        for (key, value) in &spec.env {
            options = options.env(key, value);
        }
        if let Some(port) = spec.port {
            options = options.env("PORT", port.to_string());
        }

        let process = match self.inner.supervisor.spawn(options).await {
            Ok(process) => process,
            Err(source) => {
                slot.state = RoleState::Crashed;
                return Err(OrchestrationError::StartupFailed { role, source });
            }
        };
        slot.process = Some(process.clone());
        self.spawn_monitor(role, process.clone());

        if spec.ready_markers.is_empty() {
            slot.state = RoleState::Running;
            slot.reached_running = true;
            return Ok(());
        }

        match process.wait_ready(spec.ready_timeout).await {
            Ok(ready) => {
                slot.state = RoleState::Running;
                slot.reached_running = true;
                info!(role = %role, marker = %ready.marker, url = ?ready.url, "role is ready");
                if role == Role::Kit {
                    let mut event = Event::new(EventKind::KitReady);
                    if let Some(url) = ready.url {
                        event = event.with("url", url);
                    }
                    self.inner.bus.emit(&event);
                }
                Ok(())
            }
            Err(source) => {
                warn!(role = %role, error = %source, "role never became ready");
                process.close().await;
                slot.state = RoleState::Crashed;
                slot.process = None;
                Err(OrchestrationError::StartupFailed { role, source })
            }
        }
    }

    /// Stop a role and settle its slot.
    pub async fn stop_role(&self, role: Role) -> Result<()> {
        let mut slot = self.slot(role).lock().await;
        let Some(process) = slot.process.take() else {
            if slot.state != RoleState::Crashed {
                slot.state = RoleState::Stopped;
            }
            return Ok(());
        };
        slot.state = RoleState::Stopping;
        info!(role = %role, pid = process.pid(), "stopping role");
        let outcome = process.close().await;
        slot.state = RoleState::Stopped;
        debug!(role = %role, forced = outcome.forced, "role stopped");
        Ok(())
    }

    /// Close-then-start, serialized against other lifecycle operations on
    /// the same role.
    pub async fn restart_role(&self, role: Role) -> Result<()> {
        self.ops(role).run(self.restart_inner(role)).await
    }

    async fn restart_inner(&self, role: Role) -> Result<()> {
        self.stop_role(role).await?;
        self.start_role(role).await
    }

    /// Rebuild static assets, then restart the kit only if the rebuild
    /// succeeded. A failed rebuild leaves the current instance serving the
    /// last good assets.
    pub async fn rebuild_and_restart_kit(&self) -> Result<()> {
        self.ops(Role::Kit)
            .run(async {
                self.run_rebuild().await?;
                self.restart_inner(Role::Kit).await
            })
            .await
    }

    async fn run_rebuild(&self) -> Result<()> {
        let command = &self.inner.config.rebuild_command;
        let Some((program, args)) = command.split_first() else {
            debug!("no rebuild command configured; skipping rebuild phase");
            return Ok(());
        };
        info!(command = %command.join(" "), "rebuilding static assets");
        let status = tokio::process::Command::new(program)
            .args(args)
            .current_dir(&self.inner.config.working_dir)
            .status()
            .await?;
        if !status.success() {
            warn!(code = ?status.code(), "rebuild failed; keeping the current kit instance");
            return Err(OrchestrationError::RebuildFailed {
                code: status.code(),
            });
        }
        Ok(())
    }

    /// Stop every role, then start them all again.
    pub async fn full_restart(&self) -> Result<()> {
        info!("full restart requested");
        self.shutdown_all().await?;
        self.start_all().await
    }

    /// Start all roles: watcher and management first, kit last so its
    /// readiness gate sees a complete environment.
    pub async fn start_all(&self) -> Result<()> {
        self.start_role(Role::Watcher).await?;
        self.start_role(Role::Management).await?;
        self.start_role(Role::Kit).await
    }

    /// Stop all roles, kit first.
    pub async fn shutdown_all(&self) -> Result<()> {
        self.stop_role(Role::Kit).await?;
        self.stop_role(Role::Management).await?;
        self.stop_role(Role::Watcher).await
    }

    /// Monitor task: observes settlement and applies the crash policy.
    fn spawn_monitor(&self, role: Role, process: ManagedProcess) {
        let orchestrator = self.clone();
        tokio::spawn(async move {
            let outcome = process.wait_settled().await;
            orchestrator.on_process_settled(role, process, outcome).await;
        });
    }

    async fn on_process_settled(&self, role: Role, process: ManagedProcess, outcome: ExitOutcome) {
        let restart = {
            let mut slot = self.slot(role).lock().await;
            let current = slot
                .process
                .as_ref()
                .map(|p| p.fork_id() == process.fork_id())
                .unwrap_or(false);
            if !current {
                // A stop or restart already swapped this instance out.
                return;
            }
            if slot.state == RoleState::Stopping || process.close_called() {
                slot.state = RoleState::Stopped;
                slot.process = None;
                return;
            }
            slot.process = None;
            if outcome.success {
                debug!(role = %role, "role exited cleanly on its own");
                slot.state = RoleState::Stopped;
                return;
            }
            slot.state = RoleState::Crashed;
            warn!(role = %role, code = ?outcome.code, "role crashed");
            if role == Role::Kit && slot.reached_running {
                slot.restart_count += 1;
                info!(restart_count = slot.restart_count, "restarting crashed kit");
                true
            } else {
                false
            }
        };
        if restart {
            let orchestrator = self.clone();
            tokio::spawn(async move {
                let result = orchestrator
                    .ops(Role::Kit)
                    .run(orchestrator.start_role(Role::Kit))
                    .await;
                if let Err(err) = result {
                    warn!(error = %err, "automatic kit restart failed");
                }
            });
        }
    }

    /// Subscribe restart policies to their bus events.
    ///
    /// Each handler spawns the operation so bus dispatch stays synchronous.
    pub fn install_handlers(&self) {
        let bus = self.inner.bus.clone();

        let orchestrator = self.clone();
        bus.on(EventKind::KitRebuildAndRestart, move |_event: &Event| {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                if let Err(err) = orchestrator.rebuild_and_restart_kit().await {
                    warn!(error = %err, "rebuild-and-restart failed");
                }
            });
        });

        for (kind, role) in [
            (EventKind::KitRestart, Role::Kit),
            (EventKind::ManagementRestart, Role::Management),
            (EventKind::WatcherRestart, Role::Watcher),
        ] {
            let orchestrator = self.clone();
            bus.on(kind, move |_event: &Event| {
                let orchestrator = orchestrator.clone();
                tokio::spawn(async move {
                    if let Err(err) = orchestrator.restart_role(role).await {
                        warn!(role = %role, error = %err, "restart failed");
                    }
                });
            });
        }

        let orchestrator = self.clone();
        bus.on(EventKind::FullRestart, move |_event: &Event| {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                if let Err(err) = orchestrator.full_restart().await {
                    warn!(error = %err, "full restart failed");
                }
            });
        });
    }

    /// Bridge file-change events into debounced rebuild requests.
    pub fn install_file_debounce(&self, min_interval: Duration) {
        let bus = self.inner.bus.clone();
        let emitter = bus.clone();
        let debouncer = Debouncer::new(min_interval, move || {
            emitter.emit(&Event::new(EventKind::KitRebuildAndRestart));
        });
        bus.on(EventKind::FileChanged, move |_event: &Event| {
            debouncer.trigger();
        });
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::role::RoleSpec;
    use std::path::Path;
    use std::time::Duration;

    fn sleeper() -> RoleSpec {
        RoleSpec::new("sh").args(["-c", "sleep 30"])
    }

    fn kit_spec(script: &str) -> RoleSpec {
        RoleSpec::new("sh")
            .args(["-c", script])
            .ready_markers(["kit running"])
            .ready_timeout(Duration::from_secs(5))
    }

    fn config(dir: &Path, kit: RoleSpec) -> OrchestratorConfig {
        OrchestratorConfig::new(kit, sleeper(), sleeper(), dir)
    }

    async fn wait_for<F, Fut>(mut condition: F)
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        while !condition().await {
            assert!(
                tokio::time::Instant::now() < deadline,
                "condition not reached in time"
            );
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }

    #[tokio::test]
    async fn test_kit_reaches_running_and_emits_ready() {
        let dir = tempfile::tempdir().unwrap();
        let bus = EventBus::new();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        bus.once(EventKind::KitReady, move |event: &Event| {
            let _ = tx.send(event.clone());
        });

        let orchestrator = Orchestrator::new(
            bus,
            config(dir.path(), kit_spec("echo 'kit running'; sleep 30")),
        );
        orchestrator.start_role(Role::Kit).await.unwrap();
        assert_eq!(orchestrator.state(Role::Kit).await, RoleState::Running);
        rx.recv().await.unwrap();

        orchestrator.stop_role(Role::Kit).await.unwrap();
        assert_eq!(orchestrator.state(Role::Kit).await, RoleState::Stopped);
    }

    #[tokio::test]
    async fn test_crashed_kit_restarts_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("crashed-once");
        let script = format!(
            "echo 'kit running'; if [ ! -f {m} ]; then touch {m}; exit 3; fi; sleep 30",
            m = marker.display()
        );
        let orchestrator =
            Orchestrator::new(EventBus::new(), config(dir.path(), kit_spec(&script)));

        orchestrator.start_role(Role::Kit).await.unwrap();
        let first_fork = orchestrator.role_fork_id(Role::Kit).await;

        wait_for(|| async {
            orchestrator.restart_count(Role::Kit).await == 1
                && orchestrator.state(Role::Kit).await == RoleState::Running
        })
        .await;

        let second_fork = orchestrator.role_fork_id(Role::Kit).await;
        assert_ne!(first_fork, second_fork);

        // Second instance is healthy; no further restarts may happen.
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(orchestrator.restart_count(Role::Kit).await, 1);

        orchestrator.stop_role(Role::Kit).await.unwrap();
    }

    #[tokio::test]
    async fn test_kit_that_never_ran_does_not_restart() {
        let dir = tempfile::tempdir().unwrap();
        let kit = RoleSpec::new("sh")
            .args(["-c", "echo nothing; exit 3"])
            .ready_markers(["kit running"])
            .ready_timeout(Duration::from_millis(500));
        let orchestrator = Orchestrator::new(EventBus::new(), config(dir.path(), kit));

        let err = orchestrator.start_role(Role::Kit).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::StartupFailed { .. }));
        assert_eq!(orchestrator.state(Role::Kit).await, RoleState::Crashed);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(orchestrator.restart_count(Role::Kit).await, 0);
    }

    #[tokio::test]
    async fn test_failed_rebuild_keeps_current_kit() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), kit_spec("echo 'kit running'; sleep 30"))
            .rebuild_command(["false"]);
        let orchestrator = Orchestrator::new(EventBus::new(), config);

        orchestrator.start_role(Role::Kit).await.unwrap();
        let fork = orchestrator.role_fork_id(Role::Kit).await;

        let err = orchestrator.rebuild_and_restart_kit().await.unwrap_err();
        assert!(matches!(err, OrchestrationError::RebuildFailed { .. }));
        assert_eq!(orchestrator.state(Role::Kit).await, RoleState::Running);
        assert_eq!(orchestrator.role_fork_id(Role::Kit).await, fork);

        orchestrator.stop_role(Role::Kit).await.unwrap();
    }

    #[tokio::test]
    async fn test_successful_rebuild_swaps_the_kit_instance() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), kit_spec("echo 'kit running'; sleep 30"))
            .rebuild_command(["true"]);
        let orchestrator = Orchestrator::new(EventBus::new(), config);

        orchestrator.start_role(Role::Kit).await.unwrap();
        let fork = orchestrator.role_fork_id(Role::Kit).await;

        orchestrator.rebuild_and_restart_kit().await.unwrap();
        assert_eq!(orchestrator.state(Role::Kit).await, RoleState::Running);
        assert_ne!(orchestrator.role_fork_id(Role::Kit).await, fork);

        orchestrator.stop_role(Role::Kit).await.unwrap();
    }

    #[tokio::test]
    async fn test_management_restart_is_independent_of_kit() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = Orchestrator::new(
            EventBus::new(),
            config(dir.path(), kit_spec("echo 'kit running'; sleep 30")),
        );

        orchestrator.start_role(Role::Management).await.unwrap();
        let fork = orchestrator.role_fork_id(Role::Management).await;

        orchestrator.restart_role(Role::Management).await.unwrap();
        assert_ne!(orchestrator.role_fork_id(Role::Management).await, fork);
        assert_eq!(
            orchestrator.state(Role::Management).await,
            RoleState::Running
        );
        assert_eq!(orchestrator.state(Role::Kit).await, RoleState::NotStarted);

        orchestrator.stop_role(Role::Management).await.unwrap();
    }

    #[tokio::test]
    async fn test_start_while_running_is_busy() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = Orchestrator::new(
            EventBus::new(),
            config(dir.path(), kit_spec("echo 'kit running'; sleep 30")),
        );

        orchestrator.start_role(Role::Watcher).await.unwrap();
        let err = orchestrator.start_role(Role::Watcher).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::RoleBusy(Role::Watcher)));

        orchestrator.stop_role(Role::Watcher).await.unwrap();
    }

    #[tokio::test]
    async fn test_file_changes_debounce_into_one_rebuild_request() {
        let dir = tempfile::tempdir().unwrap();
        let bus = EventBus::new();
        let count = Arc::new(std::sync::atomic::AtomicU32::new(0));
        {
            let count = Arc::clone(&count);
            bus.on(EventKind::KitRebuildAndRestart, move |_event: &Event| {
                count.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            });
        }

        let orchestrator = Orchestrator::new(
            bus.clone(),
            config(dir.path(), kit_spec("echo 'kit running'; sleep 30")),
        );
        orchestrator.install_file_debounce(Duration::from_millis(100));

        for _ in 0..5 {
            bus.emit(&Event::new(EventKind::FileChanged).with("path", "site/index.html"));
        }
        tokio::time::sleep(Duration::from_millis(400)).await;

        // Leading call plus one trailing coalesced call.
        assert_eq!(count.load(std::sync::atomic::Ordering::SeqCst), 2);
    }
}
