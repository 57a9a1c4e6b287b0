//! Throttling for the send-message operation.
//!
//! There is exactly one limiter for the whole process: every user and every character
//! share it, so one busy conversation slows down all the others. A keyed limiter (per
//! user or per character, with lazy eviction) would isolate callers; the global one is
//! kept because that is the behaviour the application was built around.

use crate::config::AppConfig;
use async_trait::async_trait;
use di::{Ref, injectable};
use log::debug;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep_until};

#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Waits until the caller may proceed and returns how long it waited.
    async fn acquire(&self) -> Duration;
}

/// Enforces a minimum interval between the *starts* of consecutive calls.
pub struct GlobalRateLimiter {
    interval: Duration,
    last_start: Mutex<Option<Instant>>,
}

#[injectable(RateLimiter)]
impl GlobalRateLimiter {
    #[inject]
    pub fn create(config: Ref<AppConfig>) -> GlobalRateLimiter {
        GlobalRateLimiter::per_minute(config.rate_limit_per_minute)
    }
}

impl GlobalRateLimiter {
    pub fn per_minute(max_per_minute: u32) -> Self {
        GlobalRateLimiter {
            interval: Duration::from_secs(60) / max_per_minute.max(1),
            last_start: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

#[async_trait]
impl RateLimiter for GlobalRateLimiter {
    async fn acquire(&self) -> Duration {
        // Held across the sleep: waiters queue up in order and each one stamps the
        // moment it was released, so bursts never drift.
        let mut last_start = self.last_start.lock().await;
        let arrived = Instant::now();

        if let Some(previous) = *last_start {
            let ready_at = previous + self.interval;
            if arrived < ready_at {
                debug!("throttling send_message for {:?}", ready_at - arrived);
                sleep_until(ready_at).await;
            }
        }

        let started = Instant::now();
        *last_start = Some(started);
        started - arrived
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio_test::{assert_pending, assert_ready, task};

    #[test]
    fn test_interval_from_rate() {
        assert_eq!(GlobalRateLimiter::per_minute(15).interval(), Duration::from_secs(4));
        assert_eq!(GlobalRateLimiter::per_minute(60).interval(), Duration::from_secs(1));
        assert_eq!(GlobalRateLimiter::per_minute(0).interval(), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_call_is_not_delayed() {
        let limiter = GlobalRateLimiter::per_minute(15);
        assert_eq!(limiter.acquire().await, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_call_waits_for_remaining_interval() {
        let limiter = GlobalRateLimiter::per_minute(15);
        limiter.acquire().await;

        tokio::time::advance(Duration::from_secs(1)).await;
        let started = Instant::now();
        let waited = limiter.acquire().await;

        assert_eq!(waited, Duration::from_secs(3));
        assert!(Instant::now() - started >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_after_interval_is_not_delayed() {
        let limiter = GlobalRateLimiter::per_minute(15);
        limiter.acquire().await;

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(limiter.acquire().await, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_is_spaced_from_release_times() {
        let limiter = Arc::new(GlobalRateLimiter::per_minute(15));
        let origin = Instant::now();

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move {
                    limiter.acquire().await;
                    Instant::now() - origin
                })
            })
            .collect();

        let mut starts = Vec::new();
        for handle in handles {
            starts.push(handle.await.unwrap());
        }
        starts.sort();

        assert_eq!(
            starts,
            vec![Duration::ZERO, Duration::from_secs(4), Duration::from_secs(8)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocked_call_stays_pending_until_interval() {
        let limiter = GlobalRateLimiter::per_minute(15);
        limiter.acquire().await;

        let mut second = task::spawn(limiter.acquire());
        assert_pending!(second.poll());

        tokio::time::advance(Duration::from_secs(4)).await;
        assert_ready!(second.poll());
    }
}
