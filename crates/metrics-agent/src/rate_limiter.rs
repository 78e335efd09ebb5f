use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

/// A fixed-capacity token pool shared by the two samplers (§4.7). The
/// reporter does not participate. Modeled as a `Semaphore` rather than the
/// source's hand-rolled buffered channel: acquiring a permit is the token,
/// and dropping it is the release, so callers cannot forget to return one.
pub struct RateLimiter {
    semaphore: Arc<Semaphore>,
}

impl RateLimiter {
    pub fn new(capacity: usize) -> Self {
        RateLimiter { semaphore: Arc::new(Semaphore::new(capacity.max(1))) }
    }

    /// Acquires one token, or returns `None` if `cancel` fires first. A
    /// cancelled acquire performs no protected work, matching the
    /// cancellation contract in §5.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Option<OwnedSemaphorePermit> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            permit = self.semaphore.clone().acquire_owned() => permit.ok(),
        }
    }
}
