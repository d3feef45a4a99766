//! Circuit breaker around the shared language-model endpoint.
//!
//! ```text
//!   CLOSED ── N consecutive failures ──► OPEN
//!     ▲                                   │ reset_timeout elapses
//!     │ trial succeeds                    ▼
//!     └──────────────────────────── HALF_OPEN ── trial fails ──► OPEN
//! ```
//!
//! One breaker is shared by every tenant in the process. All transitions
//! happen under a single mutex.

use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::config::BreakerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

/// Counts consecutive failures and short-circuits calls while open.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                trial_in_flight: false,
            }),
        }
    }

    /// Current state. An open breaker whose timeout has elapsed reports
    /// `HalfOpen` even before the trial call is taken.
    pub fn state(&self) -> BreakerState {
        let inner = self.lock();
        match inner.state {
            BreakerState::Open if self.reset_elapsed(&inner) => BreakerState::HalfOpen,
            state => state,
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    /// Ask to make a call. `None` means the call must not be attempted.
    ///
    /// The returned permit reports the outcome. Dropping it without
    /// reporting counts as a failure.
    pub fn try_acquire(&self) -> Option<BreakerPermit<'_>> {
        let mut inner = self.lock();
        match inner.state {
            BreakerState::Closed => Some(self.permit(false)),
            BreakerState::Open if self.reset_elapsed(&inner) => {
                info!("Circuit breaker half-open, allowing one trial call");
                inner.state = BreakerState::HalfOpen;
                inner.trial_in_flight = true;
                Some(self.permit(true))
            }
            BreakerState::Open => None,
            BreakerState::HalfOpen if inner.trial_in_flight => None,
            BreakerState::HalfOpen => {
                inner.trial_in_flight = true;
                Some(self.permit(true))
            }
        }
    }

    fn permit(&self, trial: bool) -> BreakerPermit<'_> {
        BreakerPermit {
            breaker: self,
            trial,
            reported: false,
        }
    }

    /// Only the trial call can close the breaker. A success from a permit
    /// taken before the breaker opened leaves the open state alone.
    fn on_success(&self, trial: bool) {
        let mut inner = self.lock();
        if !trial {
            if inner.state == BreakerState::Closed {
                inner.consecutive_failures = 0;
            }
            return;
        }

        inner.trial_in_flight = false;
        inner.consecutive_failures = 0;
        if inner.state != BreakerState::Closed {
            info!("Circuit breaker closed");
            inner.state = BreakerState::Closed;
            inner.opened_at = None;
        }
    }

    fn on_failure(&self, trial: bool) {
        let mut inner = self.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);

        if trial {
            inner.trial_in_flight = false;
            if inner.state == BreakerState::HalfOpen {
                warn!("Circuit breaker trial call failed, reopening");
                inner.state = BreakerState::Open;
                inner.opened_at = Some(Instant::now());
            }
            return;
        }

        if inner.state == BreakerState::Closed
            && inner.consecutive_failures >= self.config.failure_threshold.max(1)
        {
            warn!(
                failures = inner.consecutive_failures,
                reset_secs = self.config.reset_timeout_secs,
                "Circuit breaker opened"
            );
            inner.state = BreakerState::Open;
            inner.opened_at = Some(Instant::now());
        }
    }

    fn reset_elapsed(&self, inner: &Inner) -> bool {
        inner
            .opened_at
            .is_some_and(|at| at.elapsed() >= self.config.reset_timeout())
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Permission for one call through the breaker.
#[derive(Debug)]
pub struct BreakerPermit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    reported: bool,
}

impl BreakerPermit<'_> {
    /// Whether this is the single half-open trial call.
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    pub fn success(mut self) {
        self.reported = true;
        self.breaker.on_success(self.trial);
    }

    pub fn failure(mut self) {
        self.reported = true;
        self.breaker.on_failure(self.trial);
    }
}

impl Drop for BreakerPermit<'_> {
    fn drop(&mut self) {
        if !self.reported {
            self.breaker.on_failure(self.trial);
        }
    }
}
