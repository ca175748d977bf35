//! Three-state circuit breaker guarding the LLM gateway

use crate::config::BreakerConfig;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Observable breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerState::Closed => "CLOSED",
            BreakerState::Open => "OPEN",
            BreakerState::HalfOpen => "HALF_OPEN",
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    failure_count: u32,
    last_failure: Option<Instant>,
    probe_in_flight: bool,
}

/// Circuit breaker: opens after `failure_threshold` consecutive failures,
/// stays open for `timeout_secs`, then admits a single half-open probe.
/// Probe success closes the circuit; probe failure re-opens it.
pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                failure_count: 0,
                last_failure: None,
                probe_in_flight: false,
            }),
        }
    }

    /// Whether a call may proceed right now. Transitions OPEN → HALF_OPEN
    /// once the open timeout has elapsed; in HALF_OPEN only one probe is
    /// admitted at a time.
    pub fn can_execute(&self) -> bool {
        let mut inner = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        match inner.state {
            BreakerState::Closed => true,
            BreakerState::Open => {
                let elapsed = inner
                    .last_failure
                    .map(|at| at.elapsed())
                    .unwrap_or(Duration::ZERO);
                if elapsed >= Duration::from_secs(self.config.timeout_secs) {
                    info!("Circuit breaker transitioning OPEN -> HALF_OPEN");
                    inner.state = BreakerState::HalfOpen;
                    inner.probe_in_flight = true;
                    true
                } else {
                    false
                }
            }
            BreakerState::HalfOpen => {
                if inner.probe_in_flight {
                    false
                } else {
                    inner.probe_in_flight = true;
                    true
                }
            }
        }
    }

    /// Record a successful call: resets to CLOSED.
    pub fn record_success(&self) {
        let mut inner = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if inner.state != BreakerState::Closed {
            info!("Circuit breaker transitioning {} -> CLOSED", inner.state.as_str());
        }
        inner.state = BreakerState::Closed;
        inner.failure_count = 0;
        inner.probe_in_flight = false;
    }

    /// Record a failed call: opens after the threshold, and a half-open
    /// probe failure re-opens immediately.
    pub fn record_failure(&self) {
        let mut inner = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        inner.failure_count += 1;
        inner.last_failure = Some(Instant::now());
        inner.probe_in_flight = false;

        let should_open = inner.state == BreakerState::HalfOpen
            || inner.failure_count >= self.config.failure_threshold;

        if should_open && inner.state != BreakerState::Open {
            warn!(
                "Circuit breaker opening after {} consecutive failures",
                inner.failure_count
            );
            inner.state = BreakerState::Open;
        }
    }

    /// Current observable state.
    pub fn state(&self) -> BreakerState {
        match self.inner.lock() {
            Ok(guard) => guard.state,
            Err(poisoned) => poisoned.into_inner().state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, timeout_secs: u64) -> CircuitBreaker {
        CircuitBreaker::new(BreakerConfig {
            failure_threshold: threshold,
            timeout_secs,
        })
    }

    #[test]
    fn test_closed_allows_execution() {
        let cb = breaker(5, 60);
        assert_eq!(cb.state(), BreakerState::Closed);
        assert!(cb.can_execute());
    }

    #[test]
    fn test_opens_after_threshold() {
        let cb = breaker(3, 60);

        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), BreakerState::Closed);

        cb.record_failure();
        assert_eq!(cb.state(), BreakerState::Open);
        assert!(!cb.can_execute());
    }

    #[test]
    fn test_success_resets_failure_count() {
        let cb = breaker(3, 60);

        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[test]
    fn test_half_open_probe_after_timeout() {
        let cb = breaker(1, 0);

        cb.record_failure();
        assert_eq!(cb.state(), BreakerState::Open);

        // Zero timeout: next check admits a single probe.
        assert!(cb.can_execute());
        assert_eq!(cb.state(), BreakerState::HalfOpen);
        assert!(!cb.can_execute(), "only one probe at a time");

        cb.record_success();
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let cb = breaker(1, 0);

        cb.record_failure();
        assert!(cb.can_execute());
        assert_eq!(cb.state(), BreakerState::HalfOpen);

        cb.record_failure();
        assert_eq!(cb.state(), BreakerState::Open);
    }
}
