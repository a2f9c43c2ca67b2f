//! Fixed-window admission control.
//!
//! The allowance is refilled to the ceiling once a second has passed since the
//! current window opened. Callers arriving right before and right after a
//! boundary can therefore see up to twice the ceiling within one second; that
//! burst is accepted behaviour of a fixed window.

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Length of one admission window
pub const WINDOW: Duration = Duration::from_secs(1);

#[derive(Debug)]
struct Window {
    /// Tokens left in the current window, always within [0, ceiling]
    remaining: u32,
    /// When the current window opened
    started: Instant,
}

/// Global requests-per-second ceiling shared by every worker.
#[derive(Debug)]
pub struct RateLimiter {
    ceiling: u32,
    window: Mutex<Window>,
}

impl RateLimiter {
    /// Create a limiter admitting `ceiling` requests per window
    pub fn new(ceiling: u32) -> Self {
        Self::starting_at(ceiling, Instant::now())
    }

    /// Create a limiter whose first window opens at `started`
    pub fn starting_at(ceiling: u32, started: Instant) -> Self {
        Self {
            ceiling,
            window: Mutex::new(Window {
                remaining: ceiling,
                started,
            }),
        }
    }

    /// Try to take one token. Never blocks beyond the critical section.
    pub fn allow(&self) -> bool {
        self.allow_at(Instant::now())
    }

    /// Admission decision as of `now`.
    ///
    /// The refill and the decrement happen under the same lock, so no caller
    /// can observe a half-applied reset.
    pub fn allow_at(&self, now: Instant) -> bool {
        let mut window = self.window.lock().unwrap_or_else(PoisonError::into_inner);

        if now.saturating_duration_since(window.started) >= WINDOW {
            window.remaining = self.ceiling;
            window.started = now;
        }

        if window.remaining > 0 {
            window.remaining -= 1;
            true
        } else {
            false
        }
    }

    /// Tokens left in the current window
    pub fn remaining(&self) -> u32 {
        self.window
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remaining
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_admits_up_to_ceiling_then_rejects() {
        let now = Instant::now();
        let limiter = RateLimiter::starting_at(5, now);

        for _ in 0..5 {
            assert!(limiter.allow_at(now));
        }
        assert!(!limiter.allow_at(now));
        assert!(!limiter.allow_at(now + Duration::from_millis(999)));
        assert_eq!(limiter.remaining(), 0);
    }

    #[test]
    fn test_window_boundary_refills() {
        let start = Instant::now();
        let limiter = RateLimiter::starting_at(2, start);

        assert!(limiter.allow_at(start));
        assert!(limiter.allow_at(start));
        assert!(!limiter.allow_at(start));

        let next = start + WINDOW + Duration::from_millis(1);
        assert!(limiter.allow_at(next));
        assert_eq!(limiter.remaining(), 1);
    }

    #[test]
    fn test_boundary_burst_is_bounded_by_twice_ceiling() {
        let start = Instant::now();
        let limiter = RateLimiter::starting_at(3, start);

        // Drain the first window at its very end, then the next at its start.
        let late = start + Duration::from_millis(999);
        let early = start + Duration::from_millis(1001);
        let admitted = (0..10).filter(|_| limiter.allow_at(late)).count()
            + (0..10).filter(|_| limiter.allow_at(early)).count();

        assert_eq!(admitted, 6);
    }

    #[test]
    fn test_zero_ceiling_rejects_everything() {
        let limiter = RateLimiter::new(0);
        assert!(!limiter.allow());
        assert!(!limiter.allow_at(Instant::now() + WINDOW * 2));
    }

    #[test]
    fn test_concurrent_callers_never_exceed_ceiling() {
        let now = Instant::now();
        let limiter = Arc::new(RateLimiter::starting_at(100, now));
        let admitted = Arc::new(AtomicU32::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                let admitted = admitted.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        if limiter.allow_at(now) {
                            admitted.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(admitted.load(Ordering::Relaxed), 100);
        assert_eq!(limiter.remaining(), 0);
    }
}
