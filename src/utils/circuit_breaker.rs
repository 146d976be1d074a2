//! Circuit breaker for per-source health.
//!
//! A source that keeps returning `Unavailable` is skipped for a cool-down
//! period instead of burning a full timeout on every request:
//!
//! - **Closed**: normal operation, requests pass through
//! - **Open**: source is failing, requests are skipped
//! - **Half-Open**: cool-down elapsed, the next outcome decides
//!
//! Only health failures count; a `NotFound` is a healthy answer.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::time::Instant;

use crate::config::BreakerConfig;

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct BreakerState {
    consecutive_failures: usize,
    opened_at: Option<Instant>,
}

/// Thread-safe circuit breaker for one source
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    failure_threshold: usize,
    open_duration: Duration,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(name: &str, failure_threshold: usize, open_duration: Duration) -> Self {
        Self {
            name: name.to_string(),
            failure_threshold: failure_threshold.max(1),
            open_duration,
            state: Mutex::new(BreakerState {
                consecutive_failures: 0,
                opened_at: None,
            }),
        }
    }

    pub fn state(&self) -> CircuitState {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match state.opened_at {
            None => CircuitState::Closed,
            Some(since) if since.elapsed() >= self.open_duration => CircuitState::HalfOpen,
            Some(_) => CircuitState::Open,
        }
    }

    /// Whether a request should be sent
    pub fn can_request(&self) -> bool {
        self.state() != CircuitState::Open
    }

    pub fn record_success(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.opened_at.take().is_some() {
            tracing::info!("[circuit-breaker] {}: circuit closed (recovered)", self.name);
        }
        state.consecutive_failures = 0;
    }

    pub fn record_failure(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.consecutive_failures += 1;

        match state.opened_at {
            // half-open trial call failed: restart the cool-down
            Some(since) if since.elapsed() >= self.open_duration => {
                state.opened_at = Some(Instant::now());
                tracing::warn!(
                    "[circuit-breaker] {}: circuit reopened (failure in half-open)",
                    self.name
                );
            }
            Some(_) => {}
            None if state.consecutive_failures >= self.failure_threshold => {
                state.opened_at = Some(Instant::now());
                tracing::warn!(
                    "[circuit-breaker] {}: circuit opened ({} failures)",
                    self.name,
                    state.consecutive_failures
                );
            }
            None => {}
        }
    }

    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.consecutive_failures = 0;
        state.opened_at = None;
    }
}

/// Manager for circuit breakers, one per source
#[derive(Debug)]
pub struct CircuitBreakerManager {
    config: BreakerConfig,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitBreakerManager {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            breakers: RwLock::new(HashMap::new()),
        }
    }

    /// Get or create the breaker for a source
    pub fn get(&self, source_id: &str) -> Arc<CircuitBreaker> {
        {
            let read_guard = self.breakers.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(breaker) = read_guard.get(source_id) {
                return Arc::clone(breaker);
            }
        }

        let mut write_guard = self
            .breakers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(write_guard.entry(source_id.to_string()).or_insert_with(|| {
            Arc::new(CircuitBreaker::new(
                source_id,
                self.config.failure_threshold,
                Duration::from_secs(self.config.open_seconds),
            ))
        }))
    }

    /// Current state of every breaker created so far, sorted by source id
    pub fn snapshot(&self) -> Vec<(String, CircuitState)> {
        let read_guard = self.breakers.read().unwrap_or_else(PoisonError::into_inner);
        let mut states: Vec<_> = read_guard
            .iter()
            .map(|(id, breaker)| (id.clone(), breaker.state()))
            .collect();
        states.sort_by(|a, b| a.0.cmp(&b.0));
        states
    }
}

impl Default for CircuitBreakerManager {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opens_after_threshold() {
        let breaker = CircuitBreaker::new("test", 3, Duration::from_secs(60));
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.can_request());
    }

    #[test]
    fn test_success_resets_failure_count() {
        let breaker = CircuitBreaker::new("test", 2, Duration::from_secs(60));
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_after_cooldown() {
        let breaker = CircuitBreaker::new("test", 1, Duration::from_secs(10));
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(breaker.can_request());

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(10)).await;
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_manager_reuses_breakers() {
        let manager = CircuitBreakerManager::new(BreakerConfig {
            failure_threshold: 1,
            open_seconds: 60,
        });
        manager.get("semantic").record_failure();
        assert_eq!(manager.get("semantic").state(), CircuitState::Open);
        assert_eq!(manager.get("openalex").state(), CircuitState::Closed);

        let snapshot = manager.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0], ("openalex".to_string(), CircuitState::Closed));
    }
}
