//! Circuit breaker guarding a text-generation client
//!
//! After `threshold` consecutive non-retryable failures the breaker opens and
//! calls are rejected without touching the network until `cooldown` has
//! elapsed. The first call after the cooldown is let through as a probe.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Requests allowed
    Closed,
    /// Requests rejected until the cooldown elapses
    Open,
    /// Cooldown elapsed, next request probes recovery
    HalfOpen,
}

/// Consecutive-failure circuit breaker
///
/// Each [`crate::AnthropicClient`] owns its own breaker, so independent
/// clients (planner, executors, tests) never trip each other.
///
/// ```
/// use counsel_agent::{CircuitBreaker, CircuitState};
/// use std::time::Duration;
///
/// let breaker = CircuitBreaker::new(2, Duration::from_secs(60));
/// breaker.record_failure();
/// breaker.record_failure();
/// assert_eq!(breaker.state(), CircuitState::Open);
/// ```
#[derive(Debug)]
pub struct CircuitBreaker {
    consecutive_failures: AtomicU32,
    opened_at: Mutex<Option<Instant>>,
    threshold: u32,
    cooldown: Duration,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            consecutive_failures: AtomicU32::new(0),
            opened_at: Mutex::new(None),
            threshold: threshold.max(1),
            cooldown,
        }
    }

    pub fn state(&self) -> CircuitState {
        match self.last_trip() {
            None => CircuitState::Closed,
            Some(at) if at.elapsed() >= self.cooldown => CircuitState::HalfOpen,
            Some(_) => CircuitState::Open,
        }
    }

    /// Whether a request may be sent now
    pub fn can_execute(&self) -> bool {
        self.state() != CircuitState::Open
    }

    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        *self.trip_guard() = None;
    }

    pub fn record_failure(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures >= self.threshold {
            *self.trip_guard() = Some(Instant::now());
        }
    }

    pub fn failure_count(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    /// Remaining cooldown, zero unless open
    pub fn time_until_retry(&self) -> Duration {
        match self.last_trip() {
            Some(at) => self.cooldown.saturating_sub(at.elapsed()),
            None => Duration::ZERO,
        }
    }

    fn last_trip(&self) -> Option<Instant> {
        *self.trip_guard()
    }

    fn trip_guard(&self) -> std::sync::MutexGuard<'_, Option<Instant>> {
        // A poisoned lock still holds a valid Option<Instant>
        self.opened_at.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_closed() {
        let breaker = CircuitBreaker::default();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.can_execute());
        assert_eq!(breaker.time_until_retry(), Duration::ZERO);
    }

    #[test]
    fn test_opens_at_threshold() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(60));
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.can_execute());
        assert!(breaker.time_until_retry() > Duration::ZERO);
    }

    #[test]
    fn test_success_closes_and_resets() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(60));
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        breaker.record_success();
        assert_eq!(breaker.failure_count(), 0);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_after_cooldown() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(20));
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(breaker.can_execute());
    }

    #[test]
    fn test_failed_probe_reopens() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(20));
        breaker.record_failure();
        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
    }
}
