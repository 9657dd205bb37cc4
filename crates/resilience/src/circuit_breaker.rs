//! Circuit breaker on lock-free atomics.
//!
//! closed → open when consecutive failures reach the threshold; open → half
//! open when the recovery timeout has elapsed and a call arrives; half-open
//! lets one probe through, closing on success and re-opening on failure.

use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::ResilienceError;

const STATE_CLOSED: u8 = 0;
const STATE_OPEN: u8 = 1;
const STATE_HALF_OPEN: u8 = 2;

/// Clock abstraction so breaker timing can be driven in tests.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> u64;
}

/// Monotonic clock backed by `Instant::now()`.
pub struct MonotonicClock {
    start: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Clock for MonotonicClock {
    fn now_millis(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

/// Hand-advanced clock for deterministic recovery-timeout tests.
#[derive(Default)]
pub struct ManualClock {
    millis: AtomicU64,
}

impl ManualClock {
    pub fn advance(&self, duration: Duration) {
        self.millis
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.millis.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

pub struct CircuitBreaker {
    state: AtomicU8,
    failure_count: AtomicUsize,
    opened_at_millis: AtomicU64,
    half_open_in_flight: AtomicUsize,
    failure_threshold: usize,
    recovery_timeout: Duration,
    half_open_max_calls: usize,
    clock: Arc<dyn Clock>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: usize, recovery_timeout: Duration) -> Self {
        Self {
            state: AtomicU8::new(STATE_CLOSED),
            failure_count: AtomicUsize::new(0),
            opened_at_millis: AtomicU64::new(0),
            half_open_in_flight: AtomicUsize::new(0),
            failure_threshold: failure_threshold.max(1),
            recovery_timeout,
            half_open_max_calls: 1,
            clock: Arc::new(MonotonicClock::default()),
        }
    }

    pub fn with_clock<C: Clock + 'static>(mut self, clock: Arc<C>) -> Self {
        self.clock = clock;
        self
    }

    pub fn state(&self) -> CircuitState {
        match self.state.load(Ordering::Acquire) {
            STATE_OPEN => CircuitState::Open,
            STATE_HALF_OPEN => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }

    pub fn failure_count(&self) -> usize {
        self.failure_count.load(Ordering::Acquire)
    }

    /// Gate and run one terminal call. `operation` is the whole retried call;
    /// its single outcome is what the breaker counts.
    pub async fn execute<T, Fut, Op>(&self, operation: Op) -> Result<T, ResilienceError>
    where
        Fut: Future<Output = Result<T, ResilienceError>>,
        Op: FnOnce() -> Fut,
    {
        loop {
            match self.state.load(Ordering::Acquire) {
                STATE_CLOSED => break,
                STATE_OPEN => {
                    let opened_at = self.opened_at_millis.load(Ordering::Acquire);
                    let elapsed = self.clock.now_millis().saturating_sub(opened_at);
                    if elapsed < self.recovery_timeout.as_millis() as u64 {
                        return Err(ResilienceError::CircuitOpen {
                            failure_count: self.failure_count(),
                        });
                    }
                    match self.state.compare_exchange(
                        STATE_OPEN,
                        STATE_HALF_OPEN,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    ) {
                        Ok(_) => {
                            tracing::info!("Circuit breaker: open → half-open");
                            self.half_open_in_flight.store(1, Ordering::Release);
                            break;
                        }
                        // Lost the race; re-evaluate the new state.
                        Err(_) => continue,
                    }
                }
                STATE_HALF_OPEN => {
                    let in_flight = self.half_open_in_flight.fetch_add(1, Ordering::AcqRel);
                    if in_flight >= self.half_open_max_calls {
                        self.half_open_in_flight.fetch_sub(1, Ordering::Release);
                        return Err(ResilienceError::CircuitOpen {
                            failure_count: self.failure_count(),
                        });
                    }
                    break;
                }
                _ => unreachable!("invalid circuit breaker state"),
            }
        }

        let was_half_open = self.state.load(Ordering::Acquire) == STATE_HALF_OPEN;
        let result = operation().await;
        if was_half_open {
            self.half_open_in_flight.fetch_sub(1, Ordering::Release);
        }

        match &result {
            Ok(_) => self.on_success(),
            Err(_) => self.on_failure(),
        }
        result
    }

    fn on_success(&self) {
        match self.state.load(Ordering::Acquire) {
            STATE_HALF_OPEN => {
                if self
                    .state
                    .compare_exchange(
                        STATE_HALF_OPEN,
                        STATE_CLOSED,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    )
                    .is_ok()
                {
                    self.failure_count.store(0, Ordering::Release);
                    self.opened_at_millis.store(0, Ordering::Release);
                    tracing::info!("Circuit breaker: half-open → closed");
                }
            }
            STATE_CLOSED => {
                self.failure_count.store(0, Ordering::Release);
            }
            _ => {}
        }
    }

    fn on_failure(&self) {
        let failures = self.failure_count.fetch_add(1, Ordering::AcqRel) + 1;

        match self.state.load(Ordering::Acquire) {
            STATE_HALF_OPEN => {
                if self
                    .state
                    .compare_exchange(
                        STATE_HALF_OPEN,
                        STATE_OPEN,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    )
                    .is_ok()
                {
                    self.opened_at_millis
                        .store(self.clock.now_millis(), Ordering::Release);
                    tracing::warn!(failures, "Circuit breaker: probe failed, half-open → open");
                }
            }
            STATE_CLOSED if failures >= self.failure_threshold => {
                if self
                    .state
                    .compare_exchange(
                        STATE_CLOSED,
                        STATE_OPEN,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    )
                    .is_ok()
                {
                    self.opened_at_millis
                        .store(self.clock.now_millis(), Ordering::Release);
                    tracing::warn!(failures, "Circuit breaker: closed → open");
                }
            }
            _ => {}
        }
    }
}
