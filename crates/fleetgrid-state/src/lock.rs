//! Named lease locks shared by every process using the same registry.

use std::future::Future;
use std::time::Duration;

use fleet_core::Clock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::StateResult;
use crate::registry::Registry;

/// A held lock row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub holder: String,
    /// Epoch ms after which other holders may take the lock over.
    pub expires_at: u64,
}

/// Run `body` while holding the named lock.
///
/// Returns `Ok(None)` without running `body` when another holder owns a
/// live lease. The lease is released after `body` completes; if the
/// process dies first, it expires after `ttl`.
pub async fn with_lock<R, F, Fut, T>(
    registry: &R,
    clock: &dyn Clock,
    key: &str,
    holder: &str,
    ttl: Duration,
    body: F,
) -> StateResult<Option<T>>
where
    R: Registry + ?Sized,
    F: FnOnce() -> Fut,
    Fut: Future<Output = T>,
{
    if !registry.try_lock(key, holder, clock.now_millis(), ttl.as_millis() as u64)? {
        debug!(%key, "lock busy, skipping");
        return Ok(None);
    }
    let output = body().await;
    if let Err(e) = registry.unlock(key, holder) {
        warn!(%key, error = %e, "failed to release lock");
    }
    Ok(Some(output))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StateStore;
    use fleet_core::FakeClock;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn body_runs_and_lock_is_released() {
        let store = StateStore::open_in_memory().unwrap();
        let clock = FakeClock::new(0);
        let ttl = Duration::from_secs(60);

        let out = with_lock(&store, &clock, "k", "a", ttl, || async { 7 })
            .await
            .unwrap();
        assert_eq!(out, Some(7));
        assert!(store.try_lock("k", "b", 0, 1).unwrap());
    }

    #[tokio::test]
    async fn busy_lock_skips_body() {
        let store = StateStore::open_in_memory().unwrap();
        let clock = FakeClock::new(0);
        store.try_lock("k", "other", 0, 60_000).unwrap();

        let ran = AtomicBool::new(false);
        let flag = &ran;
        let out = with_lock(&store, &clock, "k", "me", Duration::from_secs(60), || async move {
            flag.store(true, Ordering::SeqCst);
        })
        .await
        .unwrap();
        assert!(out.is_none());
        assert!(!ran.load(Ordering::SeqCst));
        // Other holder still owns it.
        assert!(!store.unlock("k", "me").unwrap());
    }
}
