//! Process spawning and stdio supervision

use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use sitekit_events::{strip_sentinel, Event, EventBus, EventKind, HandlerId};

use crate::error::{ProcessError, Result};
use crate::managed::{ExitOutcome, ManagedProcess, ProcessShared, ReadySignal, STDERR_TAIL_LINES};
use crate::options::SpawnOptions;

/// Spawns and supervises child processes, bridging their stdio to the
/// event bus.
pub struct Supervisor {
    bus: EventBus,
    next_fork: AtomicU64,
}

impl Supervisor {
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus,
            next_fork: AtomicU64::new(1),
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Spawn a supervised process.
    ///
    /// Validates the options, wires stdout scanning, stderr capture, the
    /// optional stdin message channel, bus forwarding in both directions,
    /// and the settlement task that classifies the exit.
    pub async fn spawn(&self, options: SpawnOptions) -> Result<ManagedProcess> {
        if options.command.trim().is_empty() {
            return Err(ProcessError::InvalidConfig("empty command".into()));
        }
        if !options.message_channel {
            if let Some(kind) = options.forward_in.iter().find(|k| k.is_shutdown_class()) {
                return Err(ProcessError::InvalidConfig(format!(
                    "forwarding `{kind}` into a child requires a message channel"
                )));
            }
        }
        for kind in options.forward_in.iter().chain(options.forward_out.iter()) {
            if !kind.is_relayable() {
                return Err(ProcessError::InvalidConfig(format!(
                    "`{kind}` is not relayable across processes"
                )));
            }
        }

        let mut command = Command::new(&options.command);
        command
            .args(&options.args)
            .envs(&options.env)
            .stdin(if options.message_channel {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &options.working_dir {
            command.current_dir(dir);
        }

        let spawned_at = std::backtrace::Backtrace::force_capture().to_string();

        let mut child = command.spawn().map_err(|source| ProcessError::SpawnFailed {
            command: options.command.clone(),
            source,
        })?;
        let pid = child.id().unwrap_or(0);

        let seq = self.next_fork.fetch_add(1, Ordering::SeqCst);
        let fork_id = format!("{seq}-{}", &uuid::Uuid::new_v4().simple().to_string()[..8]);
        debug!(pid, fork_id = %fork_id, command = %options.command, "spawned process");

        let (finished_tx, finished_rx) = watch::channel::<Option<ExitOutcome>>(None);
        let (ready_tx, ready_rx) = watch::channel::<Option<ReadySignal>>(None);

        // Stdin writer task: drains queued wire lines into the child.
        let channel = if options.message_channel {
            let mut stdin = child.stdin.take().ok_or_else(|| ProcessError::InvalidConfig(
                "child stdin was not piped".into(),
            ))?;
            let (tx, mut rx) = mpsc::unbounded_channel::<String>();
            tokio::spawn(async move {
                while let Some(line) = rx.recv().await {
                    if stdin.write_all(line.as_bytes()).await.is_err() {
                        break;
                    }
                    if stdin.write_all(b"\n").await.is_err() {
                        break;
                    }
                }
            });
            Some(tx)
        } else {
            None
        };

        let stderr_tail = Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_TAIL_LINES)));
        let stderr_task = {
            let stderr = child.stderr.take().ok_or_else(|| ProcessError::InvalidConfig(
                "child stderr was not piped".into(),
            ))?;
            let tail = Arc::clone(&stderr_tail);
            let command = options.command.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(command = %command, stderr = %line);
                    let mut tail = tail.lock().unwrap();
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
            })
        };

        let supports_handshake = Arc::new(AtomicBool::new(false));

        // Stdout scanner: readiness markers, handshake detection, sentinel
        // event relay.
        {
            let stdout = child.stdout.take().ok_or_else(|| ProcessError::InvalidConfig(
                "child stdout was not piped".into(),
            ))?;
            let bus = self.bus.clone();
            let markers = options.ready_markers.clone();
            let forward_out = options.forward_out.clone();
            let handshake = Arc::clone(&supports_handshake);
            let command = options.command.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                let mut ready_sent = false;
                let mut url_expected = false;
                while let Ok(Some(line)) = lines.next_line().await {
                    if let Some(body) = strip_sentinel(&line) {
                        match Event::from_wire_line(body) {
                            Ok(event) if event.kind == EventKind::Handshake => {
                                if !handshake.swap(true, Ordering::SeqCst) {
                                    debug!(command = %command, "child supports shutdown handshake");
                                }
                            }
                            Ok(event) if forward_out.contains(&event.kind) => {
                                bus.emit(&event);
                            }
                            Ok(event) => {
                                debug!(command = %command, kind = %event.kind, "dropping unforwarded child event");
                            }
                            Err(err) => {
                                warn!(command = %command, error = %err, "malformed sentinel line from child");
                            }
                        }
                        continue;
                    }
                    if !ready_sent {
                        if let Some(marker) = markers.iter().find(|m| line.contains(m.as_str())) {
                            ready_sent = true;
                            url_expected = true;
                            let _ = ready_tx.send(Some(ReadySignal {
                                marker: marker.clone(),
                                url: None,
                            }));
                            continue;
                        }
                    } else if url_expected {
                        let trimmed = line.trim();
                        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
                            let marker = ready_tx
                                .borrow()
                                .as_ref()
                                .map(|s| s.marker.clone())
                                .unwrap_or_default();
                            let _ = ready_tx.send(Some(ReadySignal {
                                marker,
                                url: Some(trimmed.to_string()),
                            }));
                        }
                        url_expected = false;
                        continue;
                    }
                    debug!(command = %command, stdout = %line);
                }
            });
        }

        let shared = Arc::new(ProcessShared {
            pid,
            fork_id,
            command: options.command.clone(),
            args: options.args.clone(),
            reject_on_failure: options.reject_on_failure,
            grace_timeout: options.grace_timeout,
            hard_timeout: options.hard_timeout,
            is_open: AtomicBool::new(true),
            close_called: AtomicBool::new(false),
            supports_handshake,
            forced: AtomicBool::new(false),
            stderr_tail: Arc::clone(&stderr_tail),
            channel,
            finished_rx,
            ready_rx,
            spawned_at,
        });
        let process = ManagedProcess { shared };

        // Forward allowlisted bus events into the child's message channel.
        let mut forward_ids: Vec<(EventKind, HandlerId)> = Vec::new();
        if let Some(tx) = &process.shared.channel {
            for kind in &options.forward_in {
                let tx = tx.clone();
                let open = Arc::clone(&process.shared);
                let id = self.bus.on(*kind, move |event: &Event| {
                    if !open.is_open.load(Ordering::SeqCst) {
                        return;
                    }
                    match event.to_wire_line() {
                        Ok(line) => {
                            if tx.send(line).is_err() {
                                debug!(kind = %event.kind, "message channel closed; dropping forward");
                            }
                        }
                        Err(err) => warn!(kind = %event.kind, error = %err, "failed to encode event"),
                    }
                });
                forward_ids.push((*kind, id));
            }
        }

        // Settlement task: reap the child, classify the exit, publish the
        // outcome exactly once, detach bus forwarding.
        {
            let shared = Arc::clone(&process.shared);
            let bus = self.bus.clone();
            tokio::spawn(async move {
                let status = child.wait().await;
                // Let the stderr reader drain before composing diagnostics.
                let _ = stderr_task.await;

                let closing =
                    shared.close_called.load(Ordering::SeqCst) || shared.forced.load(Ordering::SeqCst);
                let code = status.as_ref().ok().and_then(|s| s.code());
                let success = match (&status, code) {
                    (Err(_), _) => false,
                    (Ok(_), Some(0)) => true,
                    // A signalled death is clean only when we asked for it.
                    (Ok(_), None) => closing,
                    // Console apps killed via taskkill report code 1.
                    (Ok(_), Some(1)) if cfg!(windows) && closing => true,
                    (Ok(_), Some(_)) => false,
                };
                shared.is_open.store(false, Ordering::SeqCst);

                let stderr_tail: Vec<String> =
                    shared.stderr_tail.lock().unwrap().iter().cloned().collect();
                let outcome = ExitOutcome {
                    code,
                    success,
                    forced: shared.forced.load(Ordering::SeqCst),
                    stderr_tail,
                };

                if outcome.is_failure() {
                    warn!(
                        pid = shared.pid,
                        command = %shared.command,
                        code = ?outcome.code,
                        "process closed with failure"
                    );
                    bus.emit(
                        &Event::new(EventKind::ClosedWithFailure)
                            .with("command", shared.command.clone())
                            .with("pid", shared.pid)
                            .with("forkId", shared.fork_id.clone())
                            .with("code", outcome.code)
                            .with("stderr", outcome.stderr_tail.join("\n")),
                    );
                } else {
                    debug!(pid = shared.pid, command = %shared.command, "process closed cleanly");
                }

                for (kind, id) in forward_ids {
                    bus.off(kind, id);
                }
                let _ = finished_tx.send(Some(outcome));
            });
        }

        Ok(process)
    }
}
