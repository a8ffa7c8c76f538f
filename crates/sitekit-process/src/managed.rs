//! Managed process handle and two-phase shutdown

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tracing::{debug, warn};

use sitekit_events::{Event, EventError, EventKind};

use crate::error::{ProcessError, Result};

/// Lines of stderr retained for diagnostics.
pub const STDERR_TAIL_LINES: usize = 100;
/// Poll interval while waiting for a signalled process to report closed.
pub(crate) const CLOSE_POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Short window after a readiness marker in which an optional URL line may
/// still arrive.
pub(crate) const READY_URL_GRACE: Duration = Duration::from_millis(200);

/// Readiness signal scanned off the child's stdout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadySignal {
    /// The marker string that matched
    pub marker: String,
    /// Serving URL from the optional follow-up line
    pub url: Option<String>,
}

/// Final settlement of a supervised process.
///
/// Settles exactly once regardless of which shutdown path ran.
#[derive(Debug, Clone)]
pub struct ExitOutcome {
    /// OS exit code; `None` when the process died from a signal
    pub code: Option<i32>,
    /// Whether the exit is considered clean under the exit-code policy
    pub success: bool,
    /// Whether the forceful kill path was required
    pub forced: bool,
    /// Captured stderr tail at close time
    pub stderr_tail: Vec<String>,
}

impl ExitOutcome {
    pub fn is_failure(&self) -> bool {
        !self.success
    }
}

/// Cheaply cloneable handle to a supervised child process.
#[derive(Clone)]
pub struct ManagedProcess {
    pub(crate) shared: Arc<ProcessShared>,
}

pub(crate) struct ProcessShared {
    pub(crate) pid: u32,
    pub(crate) fork_id: String,
    pub(crate) command: String,
    pub(crate) args: Vec<String>,
    pub(crate) reject_on_failure: bool,
    pub(crate) grace_timeout: Duration,
    pub(crate) hard_timeout: Duration,
    pub(crate) is_open: AtomicBool,
    pub(crate) close_called: AtomicBool,
    /// Shared with the stdout scanner task
    pub(crate) supports_handshake: Arc<AtomicBool>,
    pub(crate) forced: AtomicBool,
    /// Shared with the stderr reader task
    pub(crate) stderr_tail: Arc<Mutex<VecDeque<String>>>,
    /// Writer side of the message channel, when one was requested
    pub(crate) channel: Option<mpsc::UnboundedSender<String>>,
    pub(crate) finished_rx: watch::Receiver<Option<ExitOutcome>>,
    pub(crate) ready_rx: watch::Receiver<Option<ReadySignal>>,
    /// Rendered call-site backtrace captured at spawn
    pub(crate) spawned_at: String,
}

impl ManagedProcess {
    pub fn pid(&self) -> u32 {
        self.shared.pid
    }

    /// Monotonic-plus-random identity for this spawn; distinguishes
    /// restarted instances of the same command.
    pub fn fork_id(&self) -> &str {
        &self.shared.fork_id
    }

    pub fn command(&self) -> &str {
        &self.shared.command
    }

    pub fn args(&self) -> &[String] {
        &self.shared.args
    }

    pub fn is_open(&self) -> bool {
        self.shared.is_open.load(Ordering::SeqCst)
    }

    pub fn close_called(&self) -> bool {
        self.shared.close_called.load(Ordering::SeqCst)
    }

    /// Whether the child announced support for the shutdown handshake.
    pub fn supports_handshake(&self) -> bool {
        self.shared.supports_handshake.load(Ordering::SeqCst)
    }

    /// Snapshot of the captured stderr tail.
    pub fn stderr_tail(&self) -> Vec<String> {
        self.shared.stderr_tail.lock().unwrap().iter().cloned().collect()
    }

    /// Await settlement without turning failures into errors.
    pub async fn wait_settled(&self) -> ExitOutcome {
        let mut rx = self.shared.finished_rx.clone();
        loop {
            if let Some(outcome) = rx.borrow_and_update().clone() {
                return outcome;
            }
            if rx.changed().await.is_err() {
                // Settlement sender vanished without publishing; treat as a
                // forced, failed close so callers still make progress.
                warn!(pid = self.shared.pid, "process settled without an exit outcome");
                return ExitOutcome {
                    code: None,
                    success: false,
                    forced: self.shared.forced.load(Ordering::SeqCst),
                    stderr_tail: self.stderr_tail(),
                };
            }
        }
    }

    /// Await settlement, rejecting on unexpected exits.
    ///
    /// Unless the spawn suppressed rejection, a failed exit yields
    /// [`ProcessError::ClosedWithFailure`] embedding the command, pid and the
    /// call-site backtrace captured at spawn.
    pub async fn wait(&self) -> Result<ExitOutcome> {
        let outcome = self.wait_settled().await;
        if outcome.is_failure() && self.shared.reject_on_failure {
            return Err(ProcessError::ClosedWithFailure {
                command: self.shared.command.clone(),
                pid: self.shared.pid,
                code: outcome.code,
                stderr: outcome.stderr_tail.join("\n"),
                spawned_at: self.shared.spawned_at.clone(),
            });
        }
        Ok(outcome)
    }

    /// Await the readiness marker, up to `deadline`.
    ///
    /// When the marker line arrives, a short grace window is allowed for the
    /// optional follow-up line carrying the serving URL.
    pub async fn wait_ready(&self, deadline: Duration) -> Result<ReadySignal> {
        let mut rx = self.shared.ready_rx.clone();
        let first = async {
            loop {
                if let Some(signal) = rx.borrow_and_update().clone() {
                    return Some(signal);
                }
                if rx.changed().await.is_err() {
                    return None;
                }
            }
        };
        let signal = match timeout(deadline, first).await {
            Ok(Some(signal)) => signal,
            Ok(None) | Err(_) => {
                return Err(ProcessError::ReadyTimeout {
                    command: self.shared.command.clone(),
                    stderr: self.stderr_tail().join("\n"),
                })
            }
        };
        if signal.url.is_none() {
            let mut rx = self.shared.ready_rx.clone();
            let _ = timeout(READY_URL_GRACE, rx.changed()).await;
            let updated = rx.borrow().clone();
            if let Some(updated) = updated {
                return Ok(updated);
            }
        }
        Ok(signal)
    }

    /// Send an allowlisted event into the child over the message channel.
    pub fn send_event(&self, event: &Event) -> Result<()> {
        if !event.kind.is_relayable() {
            return Err(ProcessError::Event(EventError::NotRelayable(event.kind)));
        }
        let Some(tx) = &self.shared.channel else {
            return Err(ProcessError::NoMessageChannel);
        };
        let line = event.to_wire_line()?;
        tx.send(line).map_err(|_| ProcessError::NoMessageChannel)?;
        Ok(())
    }

    /// Two-phase shutdown.
    ///
    /// Phase one is a shutdown message when the child announced handshake
    /// support and a channel exists, otherwise an interrupt signal with
    /// fixed-interval polling. Past the grace deadline either phase escalates
    /// to a non-maskable kill and resolves regardless.
    ///
    /// Idempotent: a concurrent or repeated call sends no duplicate signals
    /// and awaits the same settlement.
    pub async fn close(&self) -> ExitOutcome {
        if self.shared.close_called.swap(true, Ordering::SeqCst) {
            debug!(pid = self.pid(), "close already in progress");
            return self.wait_settled().await;
        }
        if !self.is_open() {
            return self.wait_settled().await;
        }

        let graceful = self.supports_handshake() && self.shared.channel.is_some();
        if graceful {
            debug!(pid = self.pid(), "sending shutdown handshake");
            if let Err(err) = self.send_event(&Event::new(EventKind::Shutdown)) {
                warn!(pid = self.pid(), error = %err, "shutdown message failed; falling back to signal");
                self.interrupt();
            }
            if let Ok(outcome) = timeout(self.shared.grace_timeout, self.wait_settled()).await {
                return outcome;
            }
        } else {
            debug!(pid = self.pid(), "no shutdown handshake; interrupting");
            self.interrupt();
            let deadline = tokio::time::Instant::now() + self.shared.grace_timeout;
            while tokio::time::Instant::now() < deadline {
                if let Ok(outcome) = timeout(CLOSE_POLL_INTERVAL, self.wait_settled()).await {
                    return outcome;
                }
            }
        }

        warn!(
            pid = self.pid(),
            command = %self.shared.command,
            "grace deadline passed; force-killing"
        );
        self.shared.forced.store(true, Ordering::SeqCst);
        self.force_kill();
        match timeout(self.shared.hard_timeout, self.wait_settled()).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(pid = self.pid(), "process did not reap after force kill");
                ExitOutcome {
                    code: None,
                    success: false,
                    forced: true,
                    stderr_tail: self.stderr_tail(),
                }
            }
        }
    }

    #[cfg(unix)]
    fn interrupt(&self) {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if let Err(err) = kill(Pid::from_raw(self.shared.pid as i32), Signal::SIGINT) {
            warn!(pid = self.pid(), error = %err, "failed to send SIGINT");
        }
    }

    #[cfg(windows)]
    fn interrupt(&self) {
        // No cross-console SIGINT on Windows; ask taskkill politely first.
        let taskkill = which::which("taskkill")
            .unwrap_or_else(|_| std::path::PathBuf::from("taskkill"));
        let result = std::process::Command::new(taskkill)
            .args(["/pid", &self.shared.pid.to_string(), "/t"])
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn();
        if let Err(err) = result {
            warn!(pid = self.pid(), error = %err, "failed to run taskkill");
        }
    }

    #[cfg(unix)]
    fn force_kill(&self) {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if let Err(err) = kill(Pid::from_raw(self.shared.pid as i32), Signal::SIGKILL) {
            warn!(pid = self.pid(), error = %err, "failed to send SIGKILL");
        }
    }

    #[cfg(windows)]
    fn force_kill(&self) {
        let taskkill = which::which("taskkill")
            .unwrap_or_else(|_| std::path::PathBuf::from("taskkill"));
        let result = std::process::Command::new(taskkill)
            .args(["/pid", &self.shared.pid.to_string(), "/f", "/t"])
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn();
        if let Err(err) = result {
            warn!(pid = self.pid(), error = %err, "failed to run taskkill /f");
        }
    }
}

impl std::fmt::Debug for ManagedProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedProcess")
            .field("pid", &self.shared.pid)
            .field("fork_id", &self.shared.fork_id)
            .field("command", &self.shared.command)
            .field("is_open", &self.is_open())
            .finish()
    }
}
