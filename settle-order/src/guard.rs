use settle_core::lock::{DistributedLock, LockToken};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, warn};

/// Held payment lock.
///
/// `release` is the normal exit. If the guard is dropped while still holding
/// the lock (cancelled future, panic), the release is spawned onto the current
/// runtime instead. Either way the release gets its own timeout and its
/// failure is only logged: the TTL bounds a leaked lock.
pub(crate) struct LockGuard {
    lock: Arc<dyn DistributedLock>,
    key: String,
    token: Option<LockToken>,
    release_timeout: Duration,
}

impl LockGuard {
    pub(crate) fn new(lock: Arc<dyn DistributedLock>, key: String, token: LockToken, release_timeout: Duration) -> Self {
        Self { lock, key, token: Some(token), release_timeout }
    }

    pub(crate) async fn release(mut self) {
        if let Some(token) = self.token.take() {
            let key = std::mem::take(&mut self.key);
            release_lock(self.lock.clone(), key, token, self.release_timeout).await;
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let Some(token) = self.token.take() else {
            return;
        };
        let key = std::mem::take(&mut self.key);

        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(release_lock(self.lock.clone(), key, token, self.release_timeout));
            }
            Err(_) => warn!(key = %key, "No runtime to release lock; it will expire after its TTL"),
        }
    }
}

async fn release_lock(lock: Arc<dyn DistributedLock>, key: String, token: LockToken, timeout: Duration) {
    match tokio::time::timeout(timeout, lock.release(&key, &token)).await {
        Ok(Ok(true)) => debug!(key = %key, "Lock released"),
        Ok(Ok(false)) => warn!(key = %key, "Lock had already expired or changed hands"),
        Ok(Err(e)) => warn!(key = %key, error = %e, "Failed to release lock; it will expire after its TTL"),
        Err(_) => warn!(key = %key, "Timed out releasing lock; it will expire after its TTL"),
    }
}
