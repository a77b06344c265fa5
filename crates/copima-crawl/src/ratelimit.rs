//! A hand-rolled async token bucket gating all outbound HTTP. `capacity =
//! rateLimit / 60`, refilled once per second by a background `tokio::spawn`
//! tick loop — the same "background task mutating shared atomic state"
//! idiom as the token manager's scheduled refresh loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::AbortHandle;

pub struct TokenBucket {
    tokens: AtomicU64,
    capacity: u64,
    notify: Notify,
    tick: std::sync::Mutex<Option<AbortHandle>>,
}

impl TokenBucket {
    /// `rate_limit_per_minute` is the `gitlab.rateLimit` config value;
    /// capacity is burst-per-second (`rateLimit / 60`, floored at 1 so a
    /// tiny configured rate still makes forward progress).
    pub fn new(rate_limit_per_minute: u64) -> Arc<Self> {
        let capacity = (rate_limit_per_minute / 60).max(1);
        let bucket = Arc::new(Self {
            tokens: AtomicU64::new(capacity),
            capacity,
            notify: Notify::new(),
            tick: std::sync::Mutex::new(None),
        });

        let background = Arc::clone(&bucket);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            interval.tick().await; // first tick fires immediately; capacity already seeded
            loop {
                interval.tick().await;
                background.refill();
            }
        });
        *bucket.tick.lock().expect("token bucket lock poisoned") = Some(handle.abort_handle());
        bucket
    }

    /// Refill to a full `capacity` tokens once per second, so steady-state
    /// throughput matches `rateLimit`/minute instead of being capped at
    /// one request per second regardless of the configured rate.
    fn refill(&self) {
        self.tokens.store(self.capacity, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Acquire one token, waiting for the next refill tick if the bucket is
    /// empty.
    pub async fn acquire(&self) {
        loop {
            let current = self.tokens.load(Ordering::SeqCst);
            if current > 0
                && self
                    .tokens
                    .compare_exchange(current, current - 1, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
            {
                return;
            }
            self.notify.notified().await;
        }
    }

    #[cfg(test)]
    fn available(&self) -> u64 {
        self.tokens.load(Ordering::SeqCst)
    }
}

impl Drop for TokenBucket {
    fn drop(&mut self) {
        if let Ok(mut tick) = self.tick.lock()
            && let Some(handle) = tick.take()
        {
            handle.abort();
        }
    }
}
