//! Core fixed-window limiter implementation.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::{debug, trace};

use super::policy::RateLimitPolicy;

/// Per-key window state.
///
/// A window is created on the first request from a key, counts every
/// evaluated request until `reset_at_ms`, and is replaced (count back to 1)
/// by the first request after expiry. `reset_at_ms` is fixed at creation
/// and never extended by requests inside the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateWindow {
    /// Requests observed in the current window
    pub count: u32,
    /// Absolute expiry of the window, milliseconds since epoch
    pub reset_at_ms: i64,
}

/// The outcome of evaluating one request against a key's window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The request may proceed.
    Admitted {
        /// Requests left in the window after this one
        remaining: u32,
        /// When the window expires, milliseconds since epoch
        reset_at_ms: i64,
    },
    /// The window is exhausted; the request must not proceed.
    Rejected {
        /// Seconds until the window expires, rounded up
        retry_after_secs: u32,
        /// When the window expires, milliseconds since epoch
        reset_at_ms: i64,
    },
}

impl Decision {
    /// Whether the request was admitted.
    pub fn is_admitted(&self) -> bool {
        matches!(self, Decision::Admitted { .. })
    }
}

/// A fixed-window rate limiter over string keys.
///
/// All window state lives in one map guarded by a mutex, so the
/// read-check-increment-write sequence in [`admit`](Self::admit) is atomic
/// with respect to concurrent callers, and a sweep can never race an
/// in-flight admission on the same key. The lock is held only for in-memory
/// work; `admit` performs no I/O and has no await point.
///
/// State is process-local. Multiple instances behind a load balancer each
/// enforce their own quota independently.
pub struct FixedWindowLimiter {
    /// The policy governing every key in this limiter
    policy: RateLimitPolicy,
    /// Window state indexed by caller key
    windows: Mutex<HashMap<String, RateWindow>>,
}

impl FixedWindowLimiter {
    /// Create a new limiter for the given policy.
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self {
            policy,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Get the policy governing this limiter.
    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    /// Evaluate one request for `key` at time `now_ms` (milliseconds since
    /// epoch) and record it.
    ///
    /// If the key has no window, or its window has expired, a fresh window
    /// is started with a count of 1. Otherwise the count is incremented and
    /// compared against the policy ceiling. The decision carries either the
    /// remaining quota or the retry-after hint,
    /// `ceil((reset_at - now) / 1000)` seconds.
    ///
    /// Backward clock jumps can keep a window alive longer than intended;
    /// callers are expected to supply a monotonically reasonable wall clock.
    pub fn admit(&self, key: &str, now_ms: i64) -> Decision {
        let max_requests = self.policy.max_requests();
        let mut windows = self.windows.lock();

        if let Some(window) = windows.get_mut(key) {
            if window.reset_at_ms > now_ms {
                window.count += 1;

                if window.count <= max_requests {
                    trace!(
                        key = %key,
                        count = window.count,
                        "Request admitted"
                    );
                    return Decision::Admitted {
                        remaining: max_requests - window.count,
                        reset_at_ms: window.reset_at_ms,
                    };
                }

                let millis_until_reset = window.reset_at_ms - now_ms;
                debug!(
                    key = %key,
                    count = window.count,
                    max_requests = max_requests,
                    "Rate limit exceeded"
                );
                return Decision::Rejected {
                    retry_after_secs: ((millis_until_reset + 999) / 1000) as u32,
                    reset_at_ms: window.reset_at_ms,
                };
            }
            // Expired window: fall through and start a fresh one
        }

        let reset_at_ms = now_ms + self.policy.window_ms();
        windows.insert(
            key.to_string(),
            RateWindow {
                count: 1,
                reset_at_ms,
            },
        );
        trace!(key = %key, reset_at_ms = reset_at_ms, "New window started");
        Decision::Admitted {
            remaining: max_requests - 1,
            reset_at_ms,
        }
    }

    /// Remove every window whose expiry has passed.
    ///
    /// Windows with `reset_at_ms > now_ms` are left untouched. Returns the
    /// number of evicted entries. This bounds memory growth from abandoned
    /// keys; it is not part of the admission path.
    pub fn sweep_expired(&self, now_ms: i64) -> usize {
        let mut windows = self.windows.lock();
        let before = windows.len();
        windows.retain(|_, window| window.reset_at_ms > now_ms);
        let evicted = before - windows.len();

        if evicted > 0 {
            debug!(evicted = evicted, remaining = windows.len(), "Swept expired windows");
        }

        evicted
    }

    /// Get the window currently tracked for a key, if any.
    ///
    /// Returns a copy; primarily useful for tests and introspection.
    pub fn window_for(&self, key: &str) -> Option<RateWindow> {
        let windows = self.windows.lock();
        windows.get(key).copied()
    }

    /// Get the number of tracked windows.
    pub fn window_count(&self) -> usize {
        let windows = self.windows.lock();
        windows.len()
    }

    /// Clear all window state.
    ///
    /// This is primarily useful for testing.
    pub fn clear(&self) {
        let mut windows = self.windows.lock();
        windows.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::time::Duration;

    fn limiter(window: Duration, max_requests: u32) -> FixedWindowLimiter {
        FixedWindowLimiter::new(RateLimitPolicy::new(window, max_requests).unwrap())
    }

    #[test]
    fn test_window_ceiling() {
        let limiter = limiter(Duration::from_secs(60), 10);

        for i in 0..10 {
            let decision = limiter.admit("1.2.3.4", 0);
            assert!(decision.is_admitted(), "request {} should be admitted", i);
        }

        // The 11th request in the same window is rejected
        let decision = limiter.admit("1.2.3.4", 0);
        assert!(!decision.is_admitted());
    }

    #[test]
    fn test_remaining_counts_down() {
        let limiter = limiter(Duration::from_secs(60), 3);

        for expected_remaining in [2, 1, 0] {
            match limiter.admit("key", 0) {
                Decision::Admitted { remaining, .. } => {
                    assert_eq!(remaining, expected_remaining)
                }
                Decision::Rejected { .. } => panic!("expected admission"),
            }
        }
    }

    #[test]
    fn test_window_reset_after_expiry() {
        let limiter = limiter(Duration::from_secs(1), 2);

        // Exhaust the window
        limiter.admit("key", 0);
        limiter.admit("key", 0);
        assert!(!limiter.admit("key", 500).is_admitted());

        // Past the expiry, a fresh window starts with count 1
        let decision = limiter.admit("key", 1000);
        assert_eq!(
            decision,
            Decision::Admitted {
                remaining: 1,
                reset_at_ms: 2000
            }
        );
        assert_eq!(limiter.window_for("key").unwrap().count, 1);
    }

    #[test]
    fn test_reset_at_is_not_extended_within_window() {
        let limiter = limiter(Duration::from_secs(60), 100);

        limiter.admit("key", 0);
        limiter.admit("key", 30_000);
        limiter.admit("key", 59_999);

        // Fixed-window semantics: expiry stays anchored to the first request
        assert_eq!(limiter.window_for("key").unwrap().reset_at_ms, 60_000);
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = limiter(Duration::from_secs(60), 2);

        limiter.admit("a", 0);
        limiter.admit("a", 0);
        assert!(!limiter.admit("a", 0).is_admitted());

        // Key "b" is unaffected by "a" exhausting its quota
        assert!(limiter.admit("b", 0).is_admitted());
    }

    #[test]
    fn test_retry_after_decreases_toward_reset() {
        let limiter = limiter(Duration::from_secs(10), 1);
        limiter.admit("key", 0);

        let mut last = u32::MAX;
        for now_ms in [1_000, 4_000, 7_000, 9_500] {
            match limiter.admit("key", now_ms) {
                Decision::Rejected {
                    retry_after_secs, ..
                } => {
                    let expected = ((10_000 - now_ms) + 999) / 1000;
                    assert_eq!(retry_after_secs as i64, expected);
                    assert!(retry_after_secs < last);
                    last = retry_after_secs;
                }
                Decision::Admitted { .. } => panic!("expected rejection"),
            }
        }
    }

    #[test]
    fn test_concrete_scenario() {
        let limiter = limiter(Duration::from_millis(1000), 2);

        assert_eq!(
            limiter.admit("1.2.3.4", 0),
            Decision::Admitted {
                remaining: 1,
                reset_at_ms: 1000
            }
        );
        assert_eq!(
            limiter.admit("1.2.3.4", 100),
            Decision::Admitted {
                remaining: 0,
                reset_at_ms: 1000
            }
        );
        assert_eq!(
            limiter.admit("1.2.3.4", 200),
            Decision::Rejected {
                retry_after_secs: 1,
                reset_at_ms: 1000
            }
        );
        assert_eq!(
            limiter.admit("1.2.3.4", 1001),
            Decision::Admitted {
                remaining: 1,
                reset_at_ms: 2001
            }
        );
    }

    #[test]
    fn test_sweep_removes_only_expired_windows() {
        let limiter = limiter(Duration::from_secs(1), 10);

        limiter.admit("expired", 0); // resets at 1000
        limiter.admit("live", 0);
        limiter.admit("live", 500); // still resets at 1000
        limiter.admit("fresh", 2000); // resets at 3000

        let evicted = limiter.sweep_expired(1000);
        assert_eq!(evicted, 2);
        assert!(limiter.window_for("expired").is_none());
        assert!(limiter.window_for("live").is_none());

        // Survivor is untouched
        assert_eq!(
            limiter.window_for("fresh"),
            Some(RateWindow {
                count: 1,
                reset_at_ms: 3000
            })
        );
    }

    #[test]
    fn test_sweep_on_empty_map() {
        let limiter = limiter(Duration::from_secs(1), 10);
        assert_eq!(limiter.sweep_expired(0), 0);
    }

    #[test]
    fn test_concurrent_admission_at_the_ceiling() {
        let limiter = Arc::new(limiter(Duration::from_secs(60), 2));

        // One slot left in the window
        limiter.admit("key", 0);

        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    limiter.admit("key", 1)
                })
            })
            .collect();

        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(Decision::is_admitted)
            .count();

        // Exactly one of the simultaneous requests gets the last slot
        assert_eq!(admitted, 1);
    }

    #[test]
    fn test_clear() {
        let limiter = limiter(Duration::from_secs(60), 10);
        limiter.admit("a", 0);
        limiter.admit("b", 0);
        assert_eq!(limiter.window_count(), 2);

        limiter.clear();
        assert_eq!(limiter.window_count(), 0);
    }
}
