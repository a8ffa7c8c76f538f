//! Interactive stdin console

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

use sitekit_commands::CommandQueue;
use sitekit_events::{Event, EventBus, EventKind};
use sitekit_orchestration::{Orchestrator, Role};

const HELP: &str = "\
commands:
  restart            restart every role
  rk                 restart the kit server only
  rm                 restart the management UI
  rw                 restart the watcher
  reload             ask open browsers to reload
  install <pkg>      queue a plugin install
  update             queue a dependency update
  status             show role states
  emit <type> <json> fire a raw event
  help               this text
  quit               stop all roles and exit";

/// Drive the operator console until `quit` or stdin closes.
pub async fn run(bus: EventBus, orchestrator: Orchestrator, queue: CommandQueue) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("sitekit console ready; type `help` for commands");
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (command, rest) = match line.split_once(char::is_whitespace) {
            Some((command, rest)) => (command, rest.trim()),
            None => (line, ""),
        };
        match command {
            "help" => println!("{HELP}"),
            "restart" => dispatch(orchestrator.full_restart().await),
            "rk" => dispatch(orchestrator.restart_role(Role::Kit).await),
            "rm" => dispatch(orchestrator.restart_role(Role::Management).await),
            "rw" => dispatch(orchestrator.restart_role(Role::Watcher).await),
            "reload" => bus.emit(&Event::new(EventKind::ReloadPage)),
            "install" | "add" if !rest.is_empty() => {
                let queued = queue.queue(format!("install {rest}"));
                println!("queued {} -> {}", queued.id, queued.next_url);
            }
            "install" | "add" => println!("usage: install <package>"),
            "update" => {
                let queued = queue.queue("update");
                println!("queued {} -> {}", queued.id, queued.next_url);
            }
            "status" => {
                for role in Role::ALL {
                    println!("{role:<12} {:?}", orchestrator.state(role).await);
                }
            }
            "emit" => emit_raw(&bus, rest),
            "quit" | "exit" => break,
            other => println!("unknown command `{other}`; type `help`"),
        }
    }
}

fn dispatch<T>(result: sitekit_orchestration::Result<T>) {
    if let Err(err) = result {
        warn!(error = %err, "console command failed");
        println!("error: {err}");
    }
}

/// `emit <type> [<json payload>]` escape hatch.
fn emit_raw(bus: &EventBus, rest: &str) {
    let (tag, payload) = match rest.split_once(char::is_whitespace) {
        Some((tag, payload)) => (tag, payload.trim()),
        None => (rest, ""),
    };
    let Some(kind) = EventKind::parse(tag) else {
        println!("unknown event type `{tag}`");
        return;
    };
    let mut event = Event::new(kind);
    if !payload.is_empty() {
        match serde_json::from_str::<serde_json::Value>(payload) {
            Ok(serde_json::Value::Object(map)) => event.payload = map,
            Ok(_) => {
                println!("payload must be a JSON object");
                return;
            }
            Err(err) => {
                println!("invalid payload: {err}");
                return;
            }
        }
    }
    bus.emit(&event);
}
