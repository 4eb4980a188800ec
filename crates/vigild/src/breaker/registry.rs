//! Breaker registry: owns and names every circuit breaker instance.

use super::{BreakerObserver, CircuitBreaker, TracingObserver};
use crate::config::BreakerConfig;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use vigil_common::{BreakerHealthResponse, BreakerState};

/// Registry of all circuit breakers in the gateway
pub struct BreakerRegistry {
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
    observer: Arc<dyn BreakerObserver>,
}

impl BreakerRegistry {
    pub fn new() -> Self {
        Self::with_observer(Arc::new(TracingObserver))
    }

    pub fn with_observer(observer: Arc<dyn BreakerObserver>) -> Self {
        Self {
            breakers: RwLock::new(HashMap::new()),
            observer,
        }
    }

    /// Register a breaker for a named dependency. Idempotent per name: a
    /// second registration returns the existing instance.
    pub fn register(&self, name: &str, config: &BreakerConfig) -> Arc<CircuitBreaker> {
        {
            let breakers = self.breakers.read().expect("registry lock poisoned");
            if let Some(existing) = breakers.get(name) {
                return Arc::clone(existing);
            }
        }

        let mut breakers = self.breakers.write().expect("registry lock poisoned");
        // Re-check: another writer may have registered between the locks
        Arc::clone(breakers.entry(name.to_string()).or_insert_with(|| {
            Arc::new(CircuitBreaker::with_observer(
                name,
                config,
                Arc::clone(&self.observer),
            ))
        }))
    }

    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers
            .read()
            .expect("registry lock poisoned")
            .get(name)
            .cloned()
    }

    /// Aggregate health across every registered breaker. Records are deep
    /// copies, never live references.
    pub fn health_snapshot(&self) -> BreakerHealthResponse {
        let breakers = self.breakers.read().expect("registry lock poisoned");

        let mut records: Vec<_> = breakers.values().map(|b| b.record()).collect();
        records.sort_by(|a, b| a.name.cmp(&b.name));

        let count = |state: BreakerState| records.iter().filter(|r| r.state == state).count();

        BreakerHealthResponse {
            closed: count(BreakerState::Closed),
            open: count(BreakerState::Open),
            half_open: count(BreakerState::HalfOpen),
            breakers: records,
        }
    }

    /// All registered breakers, for the stats snapshot task.
    pub fn all(&self) -> Vec<Arc<CircuitBreaker>> {
        self.breakers
            .read()
            .expect("registry lock poisoned")
            .values()
            .cloned()
            .collect()
    }
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
