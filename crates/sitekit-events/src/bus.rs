//! In-process bus with optional single relay

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{
    error::{EventError, Result},
    event::Event,
    kind::EventKind,
    relay::RelayChannel,
};

type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

/// Token returned by [`EventBus::on`], usable to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerId(u64);

struct Subscription {
    id: u64,
    once: bool,
    spent: Arc<AtomicBool>,
    handler: Handler,
}

/// Typed publish/subscribe bus.
///
/// Cheap to clone; clones share subscriptions and the relay. Local dispatch
/// is synchronous and runs handlers in subscription order.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

struct BusInner {
    handlers: Mutex<HashMap<EventKind, Vec<Subscription>>>,
    relay: Mutex<Option<Arc<dyn RelayChannel>>>,
    listening: AtomicBool,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                handlers: Mutex::new(HashMap::new()),
                relay: Mutex::new(None),
                listening: AtomicBool::new(false),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Subscribe a handler for a kind.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> HandlerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.subscribe(kind, false, handler)
    }

    /// Subscribe a handler that runs at most once.
    pub fn once<F>(&self, kind: EventKind, handler: F) -> HandlerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.subscribe(kind, true, handler)
    }

    fn subscribe<F>(&self, kind: EventKind, once: bool, handler: F) -> HandlerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let mut handlers = self.inner.handlers.lock().unwrap();
        handlers.entry(kind).or_default().push(Subscription {
            id,
            once,
            spent: Arc::new(AtomicBool::new(false)),
            handler: Arc::new(handler),
        });
        HandlerId(id)
    }

    /// Remove a previously registered handler.
    pub fn off(&self, kind: EventKind, id: HandlerId) {
        let mut handlers = self.inner.handlers.lock().unwrap();
        if let Some(list) = handlers.get_mut(&kind) {
            list.retain(|sub| sub.id != id.0);
        }
    }

    /// Dispatch an event to local subscribers, in subscription order.
    ///
    /// The handler list is snapshotted before dispatch, so handlers may
    /// subscribe or emit reentrantly without deadlocking.
    pub fn emit(&self, event: &Event) {
        let snapshot: Vec<(bool, Arc<AtomicBool>, Handler)> = {
            let handlers = self.inner.handlers.lock().unwrap();
            handlers
                .get(&event.kind)
                .map(|list| {
                    list.iter()
                        .map(|sub| (sub.once, sub.spent.clone(), sub.handler.clone()))
                        .collect()
                })
                .unwrap_or_default()
        };
        debug!(kind = %event.kind, handlers = snapshot.len(), "dispatching event");
        for (once, spent, handler) in snapshot {
            if once && spent.swap(true, Ordering::SeqCst) {
                continue;
            }
            handler(event);
        }
        let mut handlers = self.inner.handlers.lock().unwrap();
        if let Some(list) = handlers.get_mut(&event.kind) {
            list.retain(|sub| !(sub.once && sub.spent.load(Ordering::SeqCst)));
        }
    }

    /// Attach the single relay channel to the linked peer process.
    pub fn attach_relay(&self, relay: Arc<dyn RelayChannel>) {
        *self.inner.relay.lock().unwrap() = Some(relay);
    }

    pub fn has_relay(&self) -> bool {
        self.inner.relay.lock().unwrap().is_some()
    }

    /// Emit an event across the process boundary.
    ///
    /// Returns [`EventError::NotRelayable`] for kinds outside the allowlist
    /// (a configuration mistake). When no relay channel is attached the call
    /// is a silent no-op, so the same code runs in a top-level process.
    /// Send failures are logged and swallowed: the peer is presumed gone.
    pub fn emit_external(&self, event: &Event) -> Result<()> {
        if !event.kind.is_relayable() {
            return Err(EventError::NotRelayable(event.kind));
        }
        let relay = self.inner.relay.lock().unwrap().clone();
        let Some(relay) = relay else {
            debug!(kind = %event.kind, "no relay channel attached; dropping external emit");
            return Ok(());
        };
        let line = event.to_wire_line()?;
        if let Err(err) = relay.send_line(&line) {
            warn!(kind = %event.kind, error = %err, "relay send failed; peer presumed gone");
        }
        Ok(())
    }

    /// Start consuming relayed lines from the peer, re-emitting them locally.
    ///
    /// Idempotent: a second call warns and does nothing. Unknown kinds are
    /// logged and dropped.
    pub fn listen_external(&self, mut lines: mpsc::UnboundedReceiver<String>) {
        if self.inner.listening.swap(true, Ordering::SeqCst) {
            warn!("listen_external called more than once; ignoring");
            return;
        }
        let bus = self.clone();
        tokio::spawn(async move {
            while let Some(line) = lines.recv().await {
                match Event::from_wire_line(&line) {
                    Ok(event) => bus.emit(&event),
                    Err(err) => warn!(error = %err, line = %line, "dropping unrecognized relayed event"),
                }
            }
            debug!("relay listener closed");
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
