//! Command queue against live roles: a queued dependency upgrade settles
//! through the long-poll endpoint and escalates to a full restart of every
//! role.

#![cfg(unix)]

use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::time::Duration;

use sitekit_commands::{CommandQueue, QueueConfig};
use sitekit_events::EventBus;
use sitekit_orchestration::{Orchestrator, OrchestratorConfig, Role, RoleSpec, RoleState};

fn sleeper() -> RoleSpec {
    RoleSpec::new("sh").args(["-c", "sleep 30"])
}

fn kit_spec() -> RoleSpec {
    RoleSpec::new("sh")
        .args(["-c", "echo 'kit running'; sleep 30"])
        .ready_markers(["kit running"])
        .ready_timeout(Duration::from_secs(5))
}

#[tokio::test]
async fn dependency_upgrade_restarts_every_role() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = dir.path().join("package.json");
    std::fs::write(
        &manifest,
        r#"{"dependencies":{"sitekit-plugin-forms":"^1.2.0"}}"#,
    )
    .unwrap();

    // Stand-in package manager that performs an upgrade.
    let runner = dir.path().join("runner.sh");
    {
        let mut file = std::fs::File::create(&runner).unwrap();
        writeln!(file, "#!/bin/sh").unwrap();
        writeln!(
            file,
            r#"echo '{{"dependencies":{{"sitekit-plugin-forms":"^2.0.0"}}}}' > {}"#,
            manifest.display()
        )
        .unwrap();
    }
    std::fs::set_permissions(&runner, std::fs::Permissions::from_mode(0o755)).unwrap();

    let bus = EventBus::new();
    let orchestrator = Orchestrator::new(
        bus.clone(),
        OrchestratorConfig::new(kit_spec(), sleeper(), sleeper(), dir.path()),
    );
    orchestrator.install_handlers();
    orchestrator.start_all().await.unwrap();
    let kit_fork = orchestrator.role_fork_id(Role::Kit).await;
    let watcher_fork = orchestrator.role_fork_id(Role::Watcher).await;

    let queue_config = QueueConfig::new(runner.to_str().unwrap(), dir.path())
        .manifest_path(&manifest)
        .nudge_interval(Duration::from_millis(100));
    let queue = CommandQueue::new(bus.clone(), queue_config);

    let queued = queue.queue("update");

    // Follow the long-poll chain until the record is terminal.
    let mut cursor = None;
    let record = loop {
        let response = queue.progress(queued.id, cursor).await.unwrap();
        if response.record.completed {
            assert!(response.next_url.is_none());
            break response.record;
        }
        assert!(response.next_url.is_some());
        cursor = Some(response.record.updated_millis());
    };
    assert_eq!(record.success, Some(true));
    assert!(record.restarting);

    // The escalation swaps every role instance.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let kit_swapped = orchestrator.role_fork_id(Role::Kit).await != kit_fork;
        let watcher_swapped = orchestrator.role_fork_id(Role::Watcher).await != watcher_fork;
        let running = orchestrator.state(Role::Kit).await == RoleState::Running;
        if kit_swapped && watcher_swapped && running {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "full restart did not happen"
        );
        tokio::time::sleep(Duration::from_millis(25)).await;
    }

    orchestrator.shutdown_all().await.unwrap();
}
