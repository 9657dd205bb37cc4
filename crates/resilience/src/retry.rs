//! Retry policy with exponential backoff and jitter.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Error;
use rand::Rng;

use crate::ResilienceError;

/// Sleep abstraction so retry delays can be observed or skipped in tests.
#[async_trait::async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait::async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Returns immediately; for tests that only care about attempt counts.
pub struct InstantSleeper;

#[async_trait::async_trait]
impl Sleeper for InstantSleeper {
    async fn sleep(&self, _duration: Duration) {}
}

/// Records requested delays without sleeping.
#[derive(Clone, Default)]
pub struct TrackingSleeper {
    calls: Arc<Mutex<Vec<Duration>>>,
}

impl TrackingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Duration> {
        self.calls.lock().expect("sleeper mutex poisoned").clone()
    }
}

#[async_trait::async_trait]
impl Sleeper for TrackingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.calls.lock().expect("sleeper mutex poisoned").push(duration);
    }
}

/// Exponential-backoff retry. Delay for attempt `k` (0-indexed) is
/// `min(base_delay * exponential_base^k, max_delay)` plus a uniform jitter of
/// up to `jitter_fraction` of that delay.
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: usize,
    base_delay: Duration,
    max_delay: Duration,
    exponential_base: f64,
    jitter_fraction: f64,
    should_retry: Arc<dyn Fn(&Error) -> bool + Send + Sync>,
    sleeper: Arc<dyn Sleeper>,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("exponential_base", &self.exponential_base)
            .field("jitter_fraction", &self.jitter_fraction)
            .finish()
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            exponential_base: 2.0,
            jitter_fraction: 0.1,
            should_retry: Arc::new(|_| true),
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// 3 attempts, 1s base, 10s cap. The default for HTTP dependencies.
    pub fn network() -> Self {
        Self::new(3, Duration::from_secs(1), Duration::from_secs(10))
    }

    /// 5 attempts, 0.5s base, 5s cap.
    pub fn aggressive() -> Self {
        Self::new(5, Duration::from_millis(500), Duration::from_secs(5))
    }

    /// 2 attempts, 2s base, 30s cap.
    pub fn conservative() -> Self {
        Self::new(2, Duration::from_secs(2), Duration::from_secs(30))
    }

    pub fn with_exponential_base(mut self, exponential_base: f64) -> Self {
        self.exponential_base = exponential_base;
        self
    }

    pub fn with_jitter_fraction(mut self, jitter_fraction: f64) -> Self {
        self.jitter_fraction = jitter_fraction.max(0.0);
        self
    }

    /// Classify errors as retryable. Defaults to retrying everything.
    pub fn should_retry<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Error) -> bool + Send + Sync + 'static,
    {
        self.should_retry = Arc::new(predicate);
        self
    }

    pub fn with_sleeper<S: Sleeper + 'static>(mut self, sleeper: S) -> Self {
        self.sleeper = Arc::new(sleeper);
        self
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Backoff delay for a 0-indexed attempt, jitter included.
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let exp = self.exponential_base.powi(attempt as i32);
        let raw = self.base_delay.as_secs_f64() * exp;
        let capped = raw.min(self.max_delay.as_secs_f64());

        let jitter = if self.jitter_fraction > 0.0 {
            rand::thread_rng().gen_range(0.0..=capped * self.jitter_fraction)
        } else {
            0.0
        };

        Duration::from_secs_f64(capped + jitter)
    }

    pub async fn execute<T, Fut, Op>(&self, mut operation: Op) -> Result<T, ResilienceError>
    where
        T: Send,
        Fut: Future<Output = Result<T, Error>> + Send,
        Op: FnMut() -> Fut + Send,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if !(self.should_retry)(&e) {
                        return Err(ResilienceError::Fatal(e));
                    }

                    attempt += 1;
                    if attempt >= self.max_attempts {
                        return Err(ResilienceError::RetryExhausted {
                            attempts: attempt,
                            last: e,
                        });
                    }

                    let delay = self.delay_for(attempt - 1);
                    tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, error = %e, "Retrying after backoff");
                    self.sleeper.sleep(delay).await;
                }
            }
        }
    }
}
