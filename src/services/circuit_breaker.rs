//! Circuit breaker guarding calls to the lock backend.
//!
//! States: Closed (pass-through) -> Open (fail fast) -> HalfOpen (single
//! trial) -> Closed | Open. Every admitted call additionally races the
//! operation against a fixed timeout; a timeout counts as a failure.

use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Minimum number of requests in the window before the breaker may trip.
    pub request_volume_threshold: u32,
    /// Failure percentage above which the breaker trips.
    pub error_threshold_percentage: u32,
    /// How long the breaker stays open before admitting a trial call.
    pub sleep_window: Duration,
    /// Per-call timeout; elapsed calls count as failures.
    pub timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            request_volume_threshold: 5,
            error_threshold_percentage: 50,
            sleep_window: Duration::from_secs(5),
            timeout: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Error, Debug)]
pub enum CircuitBreakerError<E> {
    #[error("Circuit breaker is open")]
    Open,

    #[error("Request timed out")]
    Timeout,

    #[error("Operation failed: {0}")]
    Inner(E),
}

#[derive(Debug)]
struct Inner {
    state: State,
    request_count: u32,
    failure_count: u32,
    tripped_at: Option<Instant>,
    trial_in_flight: bool,
}

/// Shared-state breaker scoped to one backend connection for its lifetime.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    config: Arc<CircuitBreakerConfig>,
    inner: Arc<RwLock<Inner>>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config: Arc::new(config),
            inner: Arc::new(RwLock::new(Inner {
                state: State::Closed,
                request_count: 0,
                failure_count: 0,
                tripped_at: None,
                trial_in_flight: false,
            })),
        }
    }

    pub async fn state(&self) -> State {
        self.inner.read().await.state
    }

    /// Runs `operation` through the breaker. While open, fails immediately
    /// without invoking the operation.
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        if !self.admit().await {
            tracing::warn!("Circuit breaker is open, rejecting request");
            return Err(CircuitBreakerError::Open);
        }

        match tokio::time::timeout(self.config.timeout, operation()).await {
            Ok(Ok(value)) => {
                self.on_success().await;
                Ok(value)
            }
            Ok(Err(err)) => {
                self.on_failure().await;
                Err(CircuitBreakerError::Inner(err))
            }
            Err(_) => {
                self.on_failure().await;
                Err(CircuitBreakerError::Timeout)
            }
        }
    }

    /// Decides whether a call may proceed, transitioning Open -> HalfOpen
    /// once the sleep window has elapsed. In HalfOpen exactly one trial is
    /// admitted at a time.
    async fn admit(&self) -> bool {
        let mut inner = self.inner.write().await;

        match inner.state {
            State::Closed => {
                inner.request_count += 1;
                true
            }
            State::Open => {
                let elapsed = inner
                    .tripped_at
                    .map(|t| t.elapsed())
                    .unwrap_or(Duration::ZERO);
                if elapsed < self.config.sleep_window {
                    return false;
                }
                tracing::info!("Circuit breaker half-open, attempting a trial request");
                inner.state = State::HalfOpen;
                inner.trial_in_flight = true;
                true
            }
            State::HalfOpen => {
                if inner.trial_in_flight {
                    return false;
                }
                inner.trial_in_flight = true;
                true
            }
        }
    }

    async fn on_success(&self) {
        let mut inner = self.inner.write().await;
        if inner.state != State::Closed {
            tracing::info!("Circuit breaker reset to closed");
        }
        inner.state = State::Closed;
        inner.request_count = 0;
        inner.failure_count = 0;
        inner.tripped_at = None;
        inner.trial_in_flight = false;
    }

    async fn on_failure(&self) {
        let mut inner = self.inner.write().await;
        inner.trial_in_flight = false;

        if inner.state == State::HalfOpen {
            tracing::warn!("Circuit breaker trial failed, re-opening");
            inner.state = State::Open;
            inner.tripped_at = Some(Instant::now());
            return;
        }

        inner.failure_count += 1;
        let error_rate = inner.failure_count * 100 / inner.request_count.max(1);
        if inner.request_count >= self.config.request_volume_threshold
            && error_rate > self.config.error_threshold_percentage
        {
            tracing::warn!(
                failures = inner.failure_count,
                requests = inner.request_count,
                "Circuit breaker opened"
            );
            inner.state = State::Open;
            inner.tripped_at = Some(Instant::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn test_config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            request_volume_threshold: 5,
            error_threshold_percentage: 50,
            sleep_window: Duration::from_millis(100),
            timeout: Duration::from_millis(50),
        }
    }

    #[tokio::test]
    async fn stays_closed_on_success() {
        let breaker = CircuitBreaker::new(test_config());

        let result = breaker.call(|| async { Ok::<_, String>(42) }).await;

        assert!(result.is_ok());
        assert_eq!(breaker.state().await, State::Closed);
    }

    #[tokio::test]
    async fn stays_closed_below_volume_threshold() {
        let breaker = CircuitBreaker::new(test_config());

        // 4 failures out of 4 requests: 100% error rate but below volume
        for _ in 0..4 {
            let _ = breaker.call(|| async { Err::<i32, _>("error") }).await;
        }

        assert_eq!(breaker.state().await, State::Closed);
    }

    #[tokio::test]
    async fn opens_at_volume_and_error_threshold() {
        let breaker = CircuitBreaker::new(test_config());

        for _ in 0..5 {
            let _ = breaker.call(|| async { Err::<i32, _>("error") }).await;
        }

        assert_eq!(breaker.state().await, State::Open);
    }

    #[tokio::test]
    async fn rejects_without_invoking_operation_while_open() {
        let breaker = CircuitBreaker::new(test_config());

        for _ in 0..5 {
            let _ = breaker.call(|| async { Err::<i32, _>("error") }).await;
        }

        let invocations = AtomicUsize::new(0);
        let result = breaker
            .call(|| async {
                invocations.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(42)
            })
            .await;

        assert!(matches!(result, Err(CircuitBreakerError::Open)));
        assert_eq!(invocations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn timeout_counts_as_failure() {
        let breaker = CircuitBreaker::new(test_config());

        for _ in 0..5 {
            let result = breaker
                .call(|| async {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    Ok::<_, String>(42)
                })
                .await;
            assert!(matches!(result, Err(CircuitBreakerError::Timeout)));
        }

        assert_eq!(breaker.state().await, State::Open);
    }

    #[tokio::test]
    async fn closes_again_after_successful_trial() {
        let breaker = CircuitBreaker::new(test_config());

        for _ in 0..5 {
            let _ = breaker.call(|| async { Err::<i32, _>("error") }).await;
        }
        assert_eq!(breaker.state().await, State::Open);

        tokio::time::sleep(Duration::from_millis(150)).await;

        let result = breaker.call(|| async { Ok::<_, String>(42) }).await;
        assert!(result.is_ok());
        assert_eq!(breaker.state().await, State::Closed);
    }

    #[tokio::test]
    async fn reopens_after_failed_trial() {
        let breaker = CircuitBreaker::new(test_config());

        for _ in 0..5 {
            let _ = breaker.call(|| async { Err::<i32, _>("error") }).await;
        }

        tokio::time::sleep(Duration::from_millis(150)).await;

        let result = breaker.call(|| async { Err::<i32, _>("error") }).await;
        assert!(matches!(result, Err(CircuitBreakerError::Inner(_))));
        assert_eq!(breaker.state().await, State::Open);

        // Freshly re-opened: the sleep window restarts, so calls fail fast
        let result = breaker.call(|| async { Ok::<_, String>(42) }).await;
        assert!(matches!(result, Err(CircuitBreakerError::Open)));
    }

    #[tokio::test]
    async fn half_open_admits_a_single_trial() {
        let breaker = CircuitBreaker::new(test_config());

        for _ in 0..5 {
            let _ = breaker.call(|| async { Err::<i32, _>("error") }).await;
        }

        tokio::time::sleep(Duration::from_millis(150)).await;

        // First caller holds the trial slot; a second concurrent caller is
        // rejected while the trial is still in flight.
        let trial = breaker.call(|| async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            Ok::<_, String>(1)
        });
        let contender = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            breaker.call(|| async { Ok::<_, String>(2) }).await
        };

        let (trial_result, contender_result) = tokio::join!(trial, contender);
        assert!(trial_result.is_ok());
        assert!(matches!(contender_result, Err(CircuitBreakerError::Open)));
    }
}
