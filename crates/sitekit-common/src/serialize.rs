//! At-most-one-in-flight execution

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;

/// Wraps async operations so that at most one runs at a time.
///
/// Callers await their turn on an async mutex rather than spinning on a
/// flag. Arrival order is not guaranteed and callers must not rely on it;
/// the guarded operations are idempotent "make state current" actions.
#[derive(Clone, Default)]
pub struct Serializer {
    lock: Arc<Mutex<()>>,
}

impl Serializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `op` once no other serialized operation is in flight.
    pub async fn run<F, T>(&self, op: F) -> T
    where
        F: Future<Output = T>,
    {
        let _guard = self.lock.lock().await;
        op.await
    }
}
