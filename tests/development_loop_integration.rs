//! End-to-end development loop: a supervised watcher reports file changes
//! over the IPC sentinel, the debouncer coalesces them into one rebuild
//! request, and the kit role is rebuilt and swapped.

#![cfg(unix)]

use std::time::Duration;

use sitekit_events::{Event, EventBus, EventKind};
use sitekit_orchestration::{Orchestrator, OrchestratorConfig, Role, RoleSpec, RoleState};

fn kit_spec() -> RoleSpec {
    RoleSpec::new("sh")
        .args(["-c", "echo 'kit running'; sleep 30"])
        .ready_markers(["kit running"])
        .ready_timeout(Duration::from_secs(5))
}

fn sleeper() -> RoleSpec {
    RoleSpec::new("sh").args(["-c", "sleep 30"])
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
async fn watcher_changes_drive_a_rebuild_and_kit_swap() {
    let dir = tempfile::tempdir().unwrap();
    let rebuilt = dir.path().join("rebuilt");

    // Stand-in watcher: bursts three change reports over the sentinel, then
    // idles like a real watcher would.
    let watcher_script = r#"
        for i in 1 2 3; do
            printf '@sitekit-ipc:{"type":"file-changed","payload":{"path":"site/index.html"}}\n'
        done
        sleep 30
    "#;
    let watcher = RoleSpec::new("sh")
        .args(["-c", watcher_script])
        .forward_out([EventKind::FileChanged]);

    let config = OrchestratorConfig::new(kit_spec(), sleeper(), watcher, dir.path())
        .rebuild_command(["touch", rebuilt.to_str().unwrap()]);

    let bus = EventBus::new();
    let orchestrator = Orchestrator::new(bus.clone(), config);
    orchestrator.install_handlers();
    orchestrator.install_file_debounce(Duration::from_millis(100));

    orchestrator.start_role(Role::Kit).await.unwrap();
    let first_fork = orchestrator.role_fork_id(Role::Kit).await;

    orchestrator.start_role(Role::Watcher).await.unwrap();

    wait_for(|| async {
        rebuilt.exists()
            && orchestrator.role_fork_id(Role::Kit).await != first_fork
            && orchestrator.state(Role::Kit).await == RoleState::Running
    })
    .await;

    orchestrator.shutdown_all().await.unwrap();
    assert_eq!(orchestrator.state(Role::Kit).await, RoleState::Stopped);
    assert_eq!(orchestrator.state(Role::Watcher).await, RoleState::Stopped);
}

#[tokio::test]
async fn reload_events_reach_a_channelled_child() {
    let dir = tempfile::tempdir().unwrap();
    let seen = dir.path().join("seen-reload");

    // Child that copies relayed stdin lines to a file so the test can
    // observe delivery.
    let script = format!("cat > {}", seen.display());
    let kit = RoleSpec::new("sh")
        .args(["-c", &script])
        .message_channel(true)
        .forward_in([EventKind::ReloadPage]);

    let bus = EventBus::new();
    let orchestrator = Orchestrator::new(
        bus.clone(),
        OrchestratorConfig::new(kit, sleeper(), sleeper(), dir.path()),
    );
    orchestrator.start_role(Role::Kit).await.unwrap();

    bus.emit(&Event::new(EventKind::ReloadPage).with("reason", "operator"));

    wait_for(|| {
        let seen = seen.clone();
        async move {
            std::fs::read_to_string(&seen)
                .map(|content| content.contains("reload-page"))
                .unwrap_or(false)
        }
    })
    .await;

    orchestrator.stop_role(Role::Kit).await.unwrap();
}
