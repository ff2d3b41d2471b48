//! Sliding-window rate limiter keyed by `sender:command`.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::security::GuardError;

#[derive(Debug)]
struct RateLimiterState {
    /// Call times inside the current window, oldest first.
    timestamps: VecDeque<Instant>,
    last_access: Instant,
}

#[derive(Debug)]
pub struct RateLimiter {
    max_calls: usize,
    window: Duration,
    state: Mutex<HashMap<String, RateLimiterState>>,
}

impl RateLimiter {
    pub fn new(max_calls: usize, window: Duration) -> Self {
        Self {
            max_calls,
            window,
            state: Mutex::new(HashMap::new()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record a call for `key` now, or reject it.
    pub fn check(&self, key: &str) -> Result<(), GuardError> {
        self.check_at(key, Instant::now())
    }

    pub fn check_at(&self, key: &str, now: Instant) -> Result<(), GuardError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = state
            .entry(key.to_string())
            .or_insert_with(|| RateLimiterState {
                timestamps: VecDeque::new(),
                last_access: now,
            });
        entry.last_access = now;

        while let Some(&oldest) = entry.timestamps.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                entry.timestamps.pop_front();
            } else {
                break;
            }
        }

        if entry.timestamps.len() >= self.max_calls {
            warn!(key, max_calls = self.max_calls, "Rate limit exceeded");
            return Err(GuardError::RateLimited {
                key: key.to_string(),
                max_calls: self.max_calls,
                window_ms: self.window.as_millis() as u64,
            });
        }

        entry.timestamps.push_back(now);
        Ok(())
    }

    /// Drop keys idle for longer than twice the window. Returns how many
    /// were removed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    pub fn sweep_at(&self, now: Instant) -> usize {
        let max_idle = self.window * 2;
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let before = state.len();
        state.retain(|_, entry| now.saturating_duration_since(entry.last_access) <= max_idle);
        before - state.len()
    }

    /// Number of keys currently tracked.
    pub fn tracked(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Run [`RateLimiter::sweep`] every `every` until the limiter is dropped or
/// the task is aborted.
pub fn spawn_sweeper(limiter: &Arc<RateLimiter>, every: Duration) -> JoinHandle<()> {
    let weak: Weak<RateLimiter> = Arc::downgrade(limiter);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        // First tick completes immediately.
        interval.tick().await;
        loop {
            interval.tick().await;
            let Some(limiter) = weak.upgrade() else {
                break;
            };
            let removed = limiter.sweep();
            if removed > 0 {
                debug!("Swept {} idle rate limit entries", removed);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn fourth_call_in_window_is_rejected() {
        let limiter = RateLimiter::new(3, ms(1000));
        let t0 = Instant::now();
        limiter.check_at("a:ping", t0).unwrap();
        limiter.check_at("a:ping", t0 + ms(100)).unwrap();
        limiter.check_at("a:ping", t0 + ms(200)).unwrap();
        let err = limiter.check_at("a:ping", t0 + ms(300)).unwrap_err();
        assert!(matches!(
            err,
            GuardError::RateLimited {
                max_calls: 3,
                window_ms: 1000,
                ..
            }
        ));
    }

    #[test]
    fn call_accepted_once_oldest_ages_out() {
        let limiter = RateLimiter::new(3, ms(1000));
        let t0 = Instant::now();
        for i in 0..3 {
            limiter.check_at("k", t0 + ms(i * 100)).unwrap();
        }
        assert!(limiter.check_at("k", t0 + ms(999)).is_err());
        // Age equal to the window counts as expired.
        limiter.check_at("k", t0 + ms(1000)).unwrap();
        assert!(limiter.check_at("k", t0 + ms(1050)).is_err());
    }

    #[test]
    fn rejected_calls_are_not_recorded() {
        let limiter = RateLimiter::new(1, ms(1000));
        let t0 = Instant::now();
        limiter.check_at("k", t0).unwrap();
        for i in 1..10 {
            assert!(limiter.check_at("k", t0 + ms(i * 50)).is_err());
        }
        limiter.check_at("k", t0 + ms(1000)).unwrap();
    }

    #[test]
    fn keys_are_independent() {
        let limiter = RateLimiter::new(1, ms(1000));
        let t0 = Instant::now();
        limiter.check_at("a:open_file", t0).unwrap();
        limiter.check_at("b:open_file", t0).unwrap();
        limiter.check_at("a:ping", t0).unwrap();
        assert!(limiter.check_at("a:open_file", t0).is_err());
    }

    #[test]
    fn sweep_removes_keys_idle_past_twice_window() {
        let limiter = RateLimiter::new(5, ms(1000));
        let t0 = Instant::now();
        limiter.check_at("old", t0).unwrap();
        limiter.check_at("recent", t0 + ms(1500)).unwrap();
        assert_eq!(limiter.tracked(), 2);

        assert_eq!(limiter.sweep_at(t0 + ms(2000)), 0);
        assert_eq!(limiter.sweep_at(t0 + ms(2001)), 1);
        assert_eq!(limiter.tracked(), 1);
    }

    #[test]
    fn rejected_call_still_refreshes_last_access() {
        let limiter = RateLimiter::new(1, ms(1000));
        let t0 = Instant::now();
        limiter.check_at("k", t0).unwrap();
        assert!(limiter.check_at("k", t0 + ms(900)).is_err());
        assert_eq!(limiter.sweep_at(t0 + ms(2500)), 0);
    }

    #[tokio::test]
    async fn sweeper_purges_in_background() {
        let limiter = Arc::new(RateLimiter::new(5, ms(20)));
        limiter.check("k").unwrap();
        let handle = spawn_sweeper(&limiter, ms(10));

        tokio::time::sleep(ms(300)).await;
        assert_eq!(limiter.tracked(), 0);

        handle.abort();
    }

    #[tokio::test]
    async fn sweeper_stops_when_limiter_dropped() {
        let limiter = Arc::new(RateLimiter::new(5, ms(100)));
        let handle = spawn_sweeper(&limiter, ms(10));
        drop(limiter);
        tokio::time::sleep(ms(300)).await;
        assert!(handle.is_finished());
    }
}
