use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use trailhead_core::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CircuitState {
    Closed,   // Normal operation
    Open,     // Failure detected, failing fast
    HalfOpen, // Testing if service is back
}

pub struct CircuitBreaker {
    pub name: String,
    state: RwLock<CircuitState>,
    failure_count: AtomicUsize,
    failure_threshold: usize,
    reset_timeout: Duration,
    last_failure: RwLock<Option<Instant>>,
    trial_in_flight: AtomicBool,
}

impl CircuitBreaker {
    pub fn new(name: &str, threshold: usize, timeout: Duration) -> Self {
        Self {
            name: name.to_string(),
            state: RwLock::new(CircuitState::Closed),
            failure_count: AtomicUsize::new(0),
            failure_threshold: threshold.max(1),
            reset_timeout: timeout,
            last_failure: RwLock::new(None),
            trial_in_flight: AtomicBool::new(false),
        }
    }

    pub async fn state(&self) -> CircuitState {
        *self.state.read().await
    }

    pub async fn check(&self) -> bool {
        let state = *self.state.read().await;
        if state == CircuitState::Closed {
            return true;
        }

        if state == CircuitState::Open {
            let last_fail = *self.last_failure.read().await;
            match last_fail {
                Some(instant) if instant.elapsed() > self.reset_timeout => {
                    let mut s = self.state.write().await;
                    if *s == CircuitState::Open {
                        *s = CircuitState::HalfOpen;
                        tracing::info!(circuit = %self.name, "Circuit breaker moving to half-open");
                    }
                }
                _ => return false,
            }
        }

        // Half-open admits a single trial call at a time
        self.trial_in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub async fn record_success(&self) {
        let mut state = self.state.write().await;
        if *state == CircuitState::HalfOpen {
            *state = CircuitState::Closed;
            tracing::info!(circuit = %self.name, "Circuit breaker recovered to closed");
        }
        self.failure_count.store(0, Ordering::SeqCst);
        self.trial_in_flight.store(false, Ordering::SeqCst);
    }

    pub async fn record_failure(&self) {
        let count = self.failure_count.fetch_add(1, Ordering::SeqCst) + 1;
        let mut state = self.state.write().await;

        if count >= self.failure_threshold || *state == CircuitState::HalfOpen {
            *state = CircuitState::Open;
            let mut last = self.last_failure.write().await;
            *last = Some(Instant::now());
            tracing::error!(circuit = %self.name, failures = count, "Circuit breaker tripped to open");
        }
        self.trial_in_flight.store(false, Ordering::SeqCst);
    }

    /// Run `call` through the breaker. Upstream and internal errors count as
    /// failures; an open circuit fails fast without running `call`.
    pub async fn call<T, F>(&self, call: F) -> CoreResult<T>
    where
        F: Future<Output = CoreResult<T>>,
    {
        if !self.check().await {
            return Err(CoreError::UpstreamError(format!("circuit {} is open", self.name)));
        }

        let result = call.await;
        match &result {
            Err(CoreError::UpstreamError(_)) | Err(CoreError::InternalError(_)) => {
                self.record_failure().await
            }
            _ => self.record_success().await,
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn failing() -> CoreResult<()> {
        Err(CoreError::UpstreamError("503".to_string()))
    }

    #[tokio::test]
    async fn test_opens_after_threshold_and_fails_fast() {
        let breaker = CircuitBreaker::new("payments", 3, Duration::from_secs(60));

        for _ in 0..3 {
            assert!(breaker.call(failing()).await.is_err());
        }
        assert_eq!(breaker.state().await, CircuitState::Open);

        let mut ran = false;
        let result = breaker
            .call(async {
                ran = true;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(CoreError::UpstreamError(_))));
        assert!(!ran);
    }

    #[tokio::test]
    async fn test_half_open_trial_recovers() {
        let breaker = CircuitBreaker::new("payments", 1, Duration::from_millis(10));
        let _ = breaker.call(failing()).await;
        assert_eq!(breaker.state().await, CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(20)).await;
        breaker.call(async { Ok(()) }).await.unwrap();
        assert_eq!(breaker.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_half_open_admits_one_trial() {
        let breaker = CircuitBreaker::new("payments", 1, Duration::from_millis(10));
        let _ = breaker.call(failing()).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let mut second_ran = false;
        let (trial, second) = tokio::join!(
            breaker.call(async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(())
            }),
            async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                breaker
                    .call(async {
                        second_ran = true;
                        Ok(())
                    })
                    .await
            },
        );

        assert!(trial.is_ok());
        assert!(matches!(second, Err(CoreError::UpstreamError(_))));
        assert!(!second_ran);
        assert_eq!(breaker.state().await, CircuitState::Closed);

        // Closed again, everyone passes
        assert!(breaker.call(async { Ok(()) }).await.is_ok());
    }

    #[tokio::test]
    async fn test_validation_errors_do_not_trip() {
        let breaker = CircuitBreaker::new("payments", 1, Duration::from_secs(60));
        let _ = breaker
            .call(async { Err::<(), _>(CoreError::validation("amount", "negative")) })
            .await;
        assert_eq!(breaker.state().await, CircuitState::Closed);
    }
}
