use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::ScanError;

const ACTIVE: u8 = 0;
const RETURNED: u8 = 1;
const FORCE_EXPIRED: u8 = 2;

/// Background reaper cadence. Checking every 5 s against a 120 s default
/// lifetime keeps force-expiry detection latency small relative to the
/// lifetime itself without busy-polling.
const REAPER_INTERVAL: Duration = Duration::from_secs(5);

struct TokenState {
    status: AtomicU8,
    acquired_at: Instant,
}

/// Bounds the number of simultaneous BLE sessions (§4.2). Unlike
/// `tokio::sync::Semaphore`, whose owned permits can only be released by
/// their holder, `BtManager` can forcibly reclaim a slot out from under a
/// still-running holder once `token_lifetime` elapses — required so a
/// wedged session can never permanently starve the pool.
pub struct BtManager {
    pool_size: usize,
    token_lifetime: Duration,
    live_count: AtomicUsize,
    next_id: AtomicU64,
    tokens: Arc<DashMap<u64, Arc<TokenState>>>,
    notify: Arc<Notify>,
    reaper_cancel: CancellationToken,
}

impl BtManager {
    #[must_use]
    pub fn new(pool_size: usize, token_lifetime: Duration) -> Arc<Self> {
        let manager = Arc::new(BtManager {
            pool_size,
            token_lifetime,
            live_count: AtomicUsize::new(0),
            next_id: AtomicU64::new(1),
            tokens: Arc::new(DashMap::new()),
            notify: Arc::new(Notify::new()),
            reaper_cancel: CancellationToken::new(),
        });
        manager.clone().spawn_reaper();
        manager
    }

    fn spawn_reaper(self: Arc<Self>) {
        let cancel = self.reaper_cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(REAPER_INTERVAL) => {}
                }
                let now = Instant::now();
                let lifetime = self.token_lifetime;
                self.tokens.retain(|id, state| {
                    if state.status.load(Ordering::Acquire) != ACTIVE {
                        return false;
                    }
                    if now.duration_since(state.acquired_at) < lifetime {
                        return true;
                    }
                    if state
                        .status
                        .compare_exchange(ACTIVE, FORCE_EXPIRED, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        warn!(token_id = id, "force-expiring token past its lifetime");
                        self.live_count.fetch_sub(1, Ordering::AcqRel);
                        self.notify.notify_waiters();
                    }
                    false
                });
            }
        });
    }

    /// Blocks until a permit is available, `timeout` elapses, or `cancel`
    /// fires. On success, dropping the returned [`Token`] releases the
    /// permit exactly once, whether by normal drop or prior force-expiry.
    pub async fn acquire(
        self: &Arc<Self>,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Token, ScanError> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.try_acquire() {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let state = Arc::new(TokenState {
                    status: AtomicU8::new(ACTIVE),
                    acquired_at: Instant::now(),
                });
                self.tokens.insert(id, state.clone());
                debug!(token_id = id, "token acquired");
                return Ok(Token {
                    id,
                    state,
                    manager: self.clone(),
                    released: false,
                });
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ScanError::TokenUnavailable);
            }

            tokio::select! {
                () = self.notify.notified() => {}
                () = tokio::time::sleep(remaining) => return Err(ScanError::TokenUnavailable),
                () = cancel.cancelled() => return Err(ScanError::Cancelled),
            }
        }
    }

    fn try_acquire(&self) -> bool {
        self.live_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                if current < self.pool_size {
                    Some(current + 1)
                } else {
                    None
                }
            })
            .is_ok()
    }

    fn release(&self, id: u64) {
        if let Some((_, state)) = self.tokens.remove(&id) {
            if state
                .status
                .compare_exchange(ACTIVE, RETURNED, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                self.live_count.fetch_sub(1, Ordering::AcqRel);
            }
        }
        self.notify.notify_waiters();
    }

    pub fn live_count(&self) -> usize {
        self.live_count.load(Ordering::Acquire)
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn shutdown(&self) {
        self.reaper_cancel.cancel();
    }
}

/// A permit from the bounded pool. Dropping it releases the permit; using
/// it after force-expiry (`is_valid()` returns `false`) must surface as a
/// fatal session error rather than silently proceeding.
pub struct Token {
    id: u64,
    state: Arc<TokenState>,
    manager: Arc<BtManager>,
    released: bool,
}

impl Token {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.state.status.load(Ordering::Acquire) == ACTIVE
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for Token {
    fn drop(&mut self) {
        if !self.released {
            self.released = true;
            self.manager.release(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_up_to_pool_size_then_blocks() {
        let manager = BtManager::new(2, Duration::from_secs(120));
        let cancel = CancellationToken::new();

        let t1 = manager.acquire(Duration::from_millis(50), &cancel).await.unwrap();
        let t2 = manager.acquire(Duration::from_millis(50), &cancel).await.unwrap();
        assert_eq!(manager.live_count(), 2);

        let result = manager.acquire(Duration::from_millis(50), &cancel).await;
        assert!(matches!(result, Err(ScanError::TokenUnavailable)));

        drop(t1);
        drop(t2);
        manager.shutdown();
    }

    #[tokio::test]
    async fn release_is_idempotent_and_frees_a_slot() {
        let manager = BtManager::new(1, Duration::from_secs(120));
        let cancel = CancellationToken::new();

        let token = manager.acquire(Duration::from_millis(50), &cancel).await.unwrap();
        drop(token);
        assert_eq!(manager.live_count(), 0);

        let _second = manager.acquire(Duration::from_millis(50), &cancel).await.unwrap();
        assert_eq!(manager.live_count(), 1);
        manager.shutdown();
    }

    #[tokio::test]
    async fn cancellation_returns_cancelled_while_waiting() {
        let manager = BtManager::new(1, Duration::from_secs(120));
        let cancel = CancellationToken::new();
        let _held = manager.acquire(Duration::from_secs(5), &cancel).await.unwrap();

        let waiter_cancel = cancel.clone();
        let waiter_manager = manager.clone();
        let waiter = tokio::spawn(async move {
            waiter_manager.acquire(Duration::from_secs(5), &waiter_cancel).await
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();
        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(ScanError::Cancelled)));
        manager.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn a_token_held_past_its_lifetime_is_force_expired() {
        let manager = BtManager::new(1, Duration::from_secs(1));
        let cancel = CancellationToken::new();

        let token = manager.acquire(Duration::from_millis(50), &cancel).await.unwrap();
        assert!(token.is_valid());

        tokio::time::advance(Duration::from_secs(7)).await;
        // Give the reaper a tick to observe the expiry.
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert!(!token.is_valid());
        assert_eq!(manager.live_count(), 0);

        // The slot must be reusable once force-expired.
        let _next = manager.acquire(Duration::from_millis(50), &cancel).await.unwrap();
        manager.shutdown();
    }
}
