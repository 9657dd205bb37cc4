//! Retry and circuit-breaker primitives wrapping every outbound dependency
//! call. The two compose through [`Resilient`]: the breaker gates entry, the
//! retry schedule runs inside it, and only the terminal outcome of the
//! retried call counts toward the breaker.

pub mod circuit_breaker;
pub mod registry;
pub mod retry;

use std::sync::Arc;

use thiserror::Error;

pub use circuit_breaker::{CircuitBreaker, CircuitState, Clock, ManualClock, MonotonicClock};
pub use registry::BreakerRegistry;
pub use retry::{InstantSleeper, RetryPolicy, Sleeper, TokioSleeper, TrackingSleeper};

#[derive(Debug, Error)]
pub enum ResilienceError {
    /// The operation failed with an error classified as non-retryable.
    #[error("{0}")]
    Fatal(anyhow::Error),

    /// Every attempt failed; carries the last failure.
    #[error("retries exhausted after {attempts} attempts: {last}")]
    RetryExhausted { attempts: usize, last: anyhow::Error },

    /// The breaker rejected the call without invoking the dependency.
    #[error("circuit open after {failure_count} consecutive failures")]
    CircuitOpen { failure_count: usize },
}

impl ResilienceError {
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, ResilienceError::CircuitOpen { .. })
    }

    /// The underlying dependency error, if a call was actually made.
    pub fn into_inner(self) -> Option<anyhow::Error> {
        match self {
            ResilienceError::Fatal(e) | ResilienceError::RetryExhausted { last: e, .. } => Some(e),
            ResilienceError::CircuitOpen { .. } => None,
        }
    }
}

/// Retry + breaker composed around one named dependency.
#[derive(Clone)]
pub struct Resilient {
    name: &'static str,
    retry: RetryPolicy,
    breaker: Arc<CircuitBreaker>,
}

impl Resilient {
    pub fn new(name: &'static str, retry: RetryPolicy, breaker: Arc<CircuitBreaker>) -> Self {
        Self {
            name,
            retry,
            breaker,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Run `operation` under the breaker, retrying per the policy inside it.
    /// Individual attempt failures never touch the breaker; one exhausted (or
    /// fatal) call counts as exactly one breaker failure.
    pub async fn execute<T, Fut, Op>(&self, operation: Op) -> Result<T, ResilienceError>
    where
        T: Send,
        Fut: std::future::Future<Output = Result<T, anyhow::Error>> + Send,
        Op: FnMut() -> Fut + Send,
    {
        let result = self
            .breaker
            .execute(|| self.retry.execute(operation))
            .await;

        if let Err(e) = &result {
            match e {
                ResilienceError::CircuitOpen { failure_count } => {
                    tracing::warn!(
                        dependency = self.name,
                        failure_count,
                        "Call rejected: circuit open"
                    );
                }
                ResilienceError::RetryExhausted { attempts, last } => {
                    tracing::warn!(
                        dependency = self.name,
                        attempts,
                        error = %last,
                        "Retries exhausted"
                    );
                }
                ResilienceError::Fatal(err) => {
                    tracing::warn!(dependency = self.name, error = %err, "Non-retryable failure");
                }
            }
        }

        result
    }
}
