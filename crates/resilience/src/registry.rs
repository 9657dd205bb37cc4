//! Named circuit-breaker registry shared by every worker.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::CircuitBreaker;

/// Keyed registry handing out one breaker per dependency name. All callers
/// naming the same dependency share state, so a breaker tripped by the
/// ingest path also guards the query path.
pub struct BreakerRegistry {
    failure_threshold: usize,
    recovery_timeout: Duration,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    pub fn new(failure_threshold: usize, recovery_timeout: Duration) -> Self {
        Self {
            failure_threshold,
            recovery_timeout,
            breakers: RwLock::new(HashMap::new()),
        }
    }

    /// Fetch the breaker for `name`, creating it on first use.
    pub fn get(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self
            .breakers
            .read()
            .expect("breaker registry lock poisoned")
            .get(name)
        {
            return breaker.clone();
        }

        let mut breakers = self
            .breakers
            .write()
            .expect("breaker registry lock poisoned");
        breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(
                    self.failure_threshold,
                    self.recovery_timeout,
                ))
            })
            .clone()
    }
}
