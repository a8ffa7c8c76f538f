//! Bounded fixed-delay retry for transient IO

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::debug;

/// Run `op` up to `attempts` times, sleeping `delay` between attempts.
///
/// Returns the first success, or the last error once the budget is spent.
/// Intended for transient filesystem races (e.g. a manifest being rewritten
/// while we read it); callers typically treat the final error as "absent".
pub async fn retry_bounded<T, E, F, Fut>(attempts: u32, delay: Duration, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= attempts {
                    return Err(err);
                }
                debug!(attempt, error = %err, "transient failure, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
