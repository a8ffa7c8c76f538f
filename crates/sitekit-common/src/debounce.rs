//! Trigger coalescing

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};
use tracing::trace;

/// Coalesces bursty triggers.
///
/// The first trigger of a window runs the action promptly. Triggers arriving
/// inside the window are merged into exactly one trailing run scheduled for
/// `min_interval` after the window start. Triggers are never dropped, only
/// merged.
///
/// Must be constructed inside a Tokio runtime; the worker task ends when the
/// `Debouncer` is dropped.
pub struct Debouncer {
    tx: mpsc::UnboundedSender<()>,
}

impl Debouncer {
    pub fn new<F>(min_interval: Duration, mut action: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();
        tokio::spawn(async move {
            while rx.recv().await.is_some() {
                let deadline = Instant::now() + min_interval;
                action();
                let mut coalesced = false;
                loop {
                    match timeout_at(deadline, rx.recv()).await {
                        Ok(Some(())) => coalesced = true,
                        Ok(None) => {
                            if coalesced {
                                action();
                            }
                            return;
                        }
                        Err(_) => break,
                    }
                }
                if coalesced {
                    trace!("running coalesced trailing call");
                    action();
                }
            }
        });
        Self { tx }
    }

    /// Record a trigger.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }
}
