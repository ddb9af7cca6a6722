use once_cell::sync::Lazy;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config;
use crate::types::PinScope;

type Key = (PinScope, String);

/// Sliding-window counter of unlock attempts per (scope, client).
///
/// An attempt is reserved before the PIN is verified, so concurrent guesses
/// from one client are counted against the limit before any of them runs.
pub struct UnlockThrottle {
    max_failures: u32,
    window: Duration,
    attempts: Mutex<HashMap<Key, VecDeque<Instant>>>,
}

/// A reserved unlock attempt. Dropping it without settling gives the slot back.
#[must_use]
pub struct Attempt<'a> {
    throttle: &'a UnlockThrottle,
    key: Key,
    at: Instant,
    settled: bool,
}

impl Attempt<'_> {
    /// The PIN was wrong: keep the attempt counted
    pub fn failed(mut self) {
        self.settled = true;
    }

    /// The PIN was right: forget every attempt from this client
    pub fn succeeded(mut self) {
        self.settled = true;
        self.throttle.clear(self.key.0, &self.key.1);
    }
}

impl Drop for Attempt<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.throttle.release(&self.key, self.at);
        }
    }
}

impl UnlockThrottle {
    pub fn new(max_failures: u32, window: Duration) -> Self {
        Self {
            max_failures,
            window,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    /// Reserve an attempt, or return the seconds the client must wait
    pub fn try_begin(&self, scope: PinScope, client: &str) -> Result<Attempt<'_>, u64> {
        self.try_begin_at(scope, client, Instant::now())
    }

    fn try_begin_at(&self, scope: PinScope, client: &str, now: Instant) -> Result<Attempt<'_>, u64> {
        let key = (scope, client.to_string());
        let mut attempts = self.attempts.lock().unwrap_or_else(|p| p.into_inner());
        let recent = attempts.entry(key.clone()).or_default();
        Self::prune(recent, self.window, now);

        if recent.len() as u32 >= self.max_failures {
            let wait = recent
                .front()
                .map(|oldest| self.window.saturating_sub(now.duration_since(*oldest)))
                .unwrap_or(self.window);
            return Err(wait.as_secs().max(1));
        }

        recent.push_back(now);
        Ok(Attempt {
            throttle: self,
            key,
            at: now,
            settled: false,
        })
    }

    pub fn clear(&self, scope: PinScope, client: &str) {
        let mut attempts = self.attempts.lock().unwrap_or_else(|p| p.into_inner());
        attempts.remove(&(scope, client.to_string()));
    }

    /// Drop clients whose attempts have all left the window
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    fn sweep_at(&self, now: Instant) -> usize {
        let mut attempts = self.attempts.lock().unwrap_or_else(|p| p.into_inner());
        let before = attempts.len();
        attempts.retain(|_, recent| {
            Self::prune(recent, self.window, now);
            !recent.is_empty()
        });
        before - attempts.len()
    }

    #[cfg(test)]
    fn tracked_clients(&self) -> usize {
        self.attempts.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    fn release(&self, key: &Key, at: Instant) {
        let mut attempts = self.attempts.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(recent) = attempts.get_mut(key) {
            if let Some(pos) = recent.iter().rposition(|t| *t == at) {
                recent.remove(pos);
            }
            if recent.is_empty() {
                attempts.remove(key);
            }
        }
    }

    fn prune(recent: &mut VecDeque<Instant>, window: Duration, now: Instant) {
        while let Some(front) = recent.front() {
            if now.duration_since(*front) >= window {
                recent.pop_front();
            } else {
                break;
            }
        }
    }
}

static THROTTLE: Lazy<UnlockThrottle> = Lazy::new(|| {
    let security = &config::config().security;
    UnlockThrottle::new(
        security.unlock_max_failures,
        Duration::from_secs(security.unlock_window_secs),
    )
});

/// Process-wide throttle configured from SecurityConfig
pub fn throttle() -> &'static UnlockThrottle {
    &THROTTLE
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};

    #[test]
    fn blocks_after_max_failures_within_window() {
        let t = UnlockThrottle::new(3, Duration::from_secs(60));
        let start = Instant::now();

        for i in 0..3 {
            t.try_begin_at(PinScope::Manager, "10.0.0.1", start + Duration::from_secs(i))
                .unwrap()
                .failed();
        }

        let wait = t.try_begin_at(PinScope::Manager, "10.0.0.1", start + Duration::from_secs(10));
        assert_eq!(wait.err(), Some(50));
    }

    #[test]
    fn concurrent_attempts_are_counted_before_verification() {
        let t = Arc::new(UnlockThrottle::new(3, Duration::from_secs(60)));
        let barrier = Arc::new(Barrier::new(16));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let t = Arc::clone(&t);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    match t.try_begin(PinScope::Manager, "10.0.0.9") {
                        Ok(attempt) => {
                            // Hold the reservation while "verifying"
                            std::thread::sleep(Duration::from_millis(20));
                            attempt.failed();
                            true
                        }
                        Err(_) => false,
                    }
                })
            })
            .collect();

        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|admitted| *admitted)
            .count();
        assert_eq!(admitted, 3);
    }

    #[test]
    fn unsettled_attempt_gives_its_slot_back() {
        let t = UnlockThrottle::new(1, Duration::from_secs(60));
        let now = Instant::now();
        {
            let _attempt = t.try_begin_at(PinScope::Staff, "kiosk-1", now).unwrap();
            assert!(t.try_begin_at(PinScope::Staff, "kiosk-1", now).is_err());
        }
        assert!(t.try_begin_at(PinScope::Staff, "kiosk-1", now).is_ok());
        assert_eq!(t.tracked_clients(), 0);
    }

    #[test]
    fn window_expiry_lets_client_retry() {
        let t = UnlockThrottle::new(2, Duration::from_secs(30));
        let start = Instant::now();
        t.try_begin_at(PinScope::Staff, "kiosk-1", start).unwrap().failed();
        t.try_begin_at(PinScope::Staff, "kiosk-1", start).unwrap().failed();
        assert!(t.try_begin_at(PinScope::Staff, "kiosk-1", start).is_err());
        t.try_begin_at(PinScope::Staff, "kiosk-1", start + Duration::from_secs(31))
            .unwrap()
            .failed();
    }

    #[test]
    fn scopes_and_clients_are_counted_separately() {
        let t = UnlockThrottle::new(1, Duration::from_secs(60));
        let now = Instant::now();
        t.try_begin_at(PinScope::Manager, "a", now).unwrap().failed();
        assert!(t.try_begin_at(PinScope::Manager, "a", now).is_err());
        assert!(t.try_begin_at(PinScope::Staff, "a", now).is_ok());
        assert!(t.try_begin_at(PinScope::Manager, "b", now).is_ok());
    }

    #[test]
    fn success_resets_counter() {
        let t = UnlockThrottle::new(2, Duration::from_secs(60));
        let now = Instant::now();
        t.try_begin_at(PinScope::Staff, "a", now).unwrap().failed();
        t.try_begin_at(PinScope::Staff, "a", now).unwrap().succeeded();
        assert_eq!(t.tracked_clients(), 0);
        assert!(t.try_begin_at(PinScope::Staff, "a", now).is_ok());
    }

    #[test]
    fn sweep_forgets_clients_once_their_window_closes() {
        let t = UnlockThrottle::new(5, Duration::from_secs(60));
        let start = Instant::now();
        for i in 0..1_000 {
            t.try_begin_at(PinScope::Staff, &format!("10.1.{}.{}", i / 256, i % 256), start)
                .unwrap()
                .failed();
        }
        assert_eq!(t.tracked_clients(), 1_000);

        assert_eq!(t.sweep_at(start + Duration::from_secs(30)), 0);
        assert_eq!(t.sweep_at(start + Duration::from_secs(3_600)), 1_000);
        assert_eq!(t.tracked_clients(), 0);
    }
}
