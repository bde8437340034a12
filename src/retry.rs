//! Retry management with configurable backoff strategies and per-operation
//! circuit breakers.
//!
//! This is the crate's reliability layer: callers identify an operation with
//! a stable `op_key` (e.g. `"provider:lmstudio"` or `"mcp:filesystem"`) and
//! wrap the call in [`execute_with_retry`]. The manager tracks a circuit
//! breaker per key, retries according to the configured [`RetryStrategy`],
//! and tags the outcome with a [`FailurePattern`] for observability.
//!
//! # Examples
//!
//! ```rust,no_run
//! use local_agent_runtime::retry::{RetryManager, RetryConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = RetryManager::new(RetryConfig::default());
//! let result = manager.execute_with_retry("provider:lmstudio", || async {
//!     Ok::<_, local_agent_runtime::Error>(42)
//! }).await?;
//! # Ok(())
//! # }
//! ```

use crate::{Error, Result};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::sleep;

/// Backoff strategy used to space out retry attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStrategy {
    /// Always wait `base_delay`.
    Fixed,
    /// Wait `base_delay * attempt`.
    Linear,
    /// Wait `base_delay * backoff_multiplier^(attempt - 1)`.
    Exponential,
    /// Wait `base_delay * fib(attempt)`.
    Fibonacci,
}

/// Diagnostic classification of a sequence of failures for one operation key.
///
/// This never changes retry control flow; it is attached to [`RetryResult`]
/// purely for metrics and alerting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePattern {
    /// Isolated failures with no discernible rhythm.
    Transient,
    /// Failures recurring at a slow, fairly regular interval (mean >= 5s).
    Intermittent,
    /// Failures recurring at a fast, fairly regular interval (mean < 5s).
    Persistent,
    /// A burst of consecutive failures with no successes in between.
    Cascading,
    /// Not enough history to classify.
    Unknown,
}

/// Configuration for the retry manager.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub strategy: RetryStrategy,
    pub backoff_multiplier: f64,
    pub jitter: bool,
    pub jitter_factor: f64,

    pub circuit_breaker_threshold: u32,
    pub circuit_breaker_recovery_timeout: Duration,

    /// Minimum attempts before a failure-pattern tag is attempted.
    pub failure_pattern_threshold: usize,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(300),
            strategy: RetryStrategy::Exponential,
            backoff_multiplier: 2.0,
            jitter: true,
            jitter_factor: 0.1,
            circuit_breaker_threshold: 5,
            circuit_breaker_recovery_timeout: Duration::from_secs(300),
            failure_pattern_threshold: 3,
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_strategy(mut self, strategy: RetryStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn with_jitter_factor(mut self, jitter: f64) -> Self {
        self.jitter_factor = jitter.clamp(0.0, 1.0);
        self
    }

    pub fn with_circuit_breaker_threshold(mut self, threshold: u32) -> Self {
        self.circuit_breaker_threshold = threshold;
        self
    }

    fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_secs_f64() * 1000.0;
        let raw_ms = match self.strategy {
            RetryStrategy::Fixed => base_ms,
            RetryStrategy::Linear => base_ms * attempt as f64,
            RetryStrategy::Exponential => {
                base_ms * self.backoff_multiplier.powi(attempt as i32 - 1)
            }
            RetryStrategy::Fibonacci => base_ms * fibonacci(attempt) as f64,
        };

        let mut delay_ms = raw_ms;
        if self.jitter {
            let jitter_range = delay_ms * self.jitter_factor;
            let jitter = rand::random::<f64>() * (2.0 * jitter_range) - jitter_range;
            delay_ms = (delay_ms + jitter).max(0.0);
        }

        let capped_ms = delay_ms.min(self.max_delay.as_secs_f64() * 1000.0);
        Duration::from_millis(capped_ms.max(0.0) as u64)
    }
}

/// `fib(0) = 0, fib(1) = 1`, iterative — matches the retry delay table used
/// by every caller (attempt numbers start at 1).
fn fibonacci(n: u32) -> u64 {
    if n <= 1 {
        return n as u64;
    }
    let (mut a, mut b) = (0u64, 1u64);
    for _ in 2..=n {
        let next = a + b;
        a = b;
        b = next;
    }
    b
}

/// A single attempt recorded within a [`RetryResult`].
#[derive(Debug, Clone)]
pub struct RetryAttempt {
    pub attempt_number: u32,
    pub delay: Duration,
    pub succeeded: bool,
    pub duration: Duration,
    pub error_message: Option<String>,
}

/// Full record of a retried operation.
#[derive(Debug, Clone)]
pub struct RetryResult<T> {
    pub success: bool,
    pub value: Option<T>,
    pub total_attempts: u32,
    pub total_duration: Duration,
    pub attempts: Vec<RetryAttempt>,
    pub failure_pattern: FailurePattern,
    pub correlation_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

struct CircuitBreaker {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
    half_open_attempts: u32,
    total_requests: u64,
    total_failures: u64,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            last_failure: None,
            half_open_attempts: 0,
            total_requests: 0,
            total_failures: 0,
        }
    }
}

/// Point-in-time snapshot of a circuit breaker, safe to expose externally.
#[derive(Debug, Clone)]
pub struct CircuitBreakerInfo {
    pub operation_key: String,
    pub state: &'static str,
    pub failure_count: u32,
    pub total_requests: u64,
    pub total_failures: u64,
}

/// Aggregate counters across all operations tracked by a [`RetryManager`].
#[derive(Debug, Clone, Default)]
pub struct RetryMetrics {
    pub total_operations: u64,
    pub successful_operations: u64,
    pub failed_operations: u64,
    pub retry_operations: u64,
    pub circuit_breaker_trips: u64,
    pub avg_retry_count: f64,
    pub avg_operation_duration: Duration,
}

struct MetricsInner {
    total_operations: u64,
    successful_operations: u64,
    failed_operations: u64,
    retry_operations: u64,
    circuit_breaker_trips: u64,
    avg_retry_count: f64,
    avg_operation_duration_secs: f64,
}

impl Default for MetricsInner {
    fn default() -> Self {
        Self {
            total_operations: 0,
            successful_operations: 0,
            failed_operations: 0,
            retry_operations: 0,
            circuit_breaker_trips: 0,
            avg_retry_count: 0.0,
            avg_operation_duration_secs: 0.0,
        }
    }
}

/// Enterprise-style retry manager: per-key circuit breakers, configurable
/// backoff, and running metrics.
pub struct RetryManager {
    config: RetryConfig,
    breakers: DashMap<String, Mutex<CircuitBreaker>>,
    failure_intervals: DashMap<String, Mutex<Vec<Instant>>>,
    metrics: Mutex<MetricsInner>,
    correlation_counter: std::sync::atomic::AtomicU64,
}

impl RetryManager {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            breakers: DashMap::new(),
            failure_intervals: DashMap::new(),
            metrics: Mutex::new(MetricsInner::default()),
            correlation_counter: std::sync::atomic::AtomicU64::new(0),
        }
    }

    fn generate_correlation_id(&self) -> String {
        let n = self
            .correlation_counter
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        format!("retry-{n:08}")
    }

    fn should_allow_request(&self, op_key: &str) -> bool {
        let entry = self.breakers.entry(op_key.to_string()).or_default();
        let mut cb = entry.lock();
        match cb.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let elapsed = cb
                    .last_failure
                    .map(|t| t.elapsed())
                    .unwrap_or(Duration::MAX);
                if elapsed > self.config.circuit_breaker_recovery_timeout {
                    cb.state = CircuitState::HalfOpen;
                    cb.half_open_attempts = 0;
                    tracing::info!(op_key, "circuit breaker entering half-open state");
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                if cb.half_open_attempts < 3 {
                    cb.half_open_attempts += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    fn update_circuit_breaker(&self, op_key: &str, success: bool) {
        let entry = self.breakers.entry(op_key.to_string()).or_default();
        let mut cb = entry.lock();
        cb.total_requests += 1;

        if success {
            cb.failure_count = 0;
            if cb.state == CircuitState::HalfOpen {
                cb.state = CircuitState::Closed;
                cb.half_open_attempts = 0;
                tracing::info!(op_key, "circuit breaker closed after recovery");
            }
        } else {
            cb.failure_count += 1;
            cb.total_failures += 1;
            cb.last_failure = Some(Instant::now());

            match cb.state {
                CircuitState::Closed => {
                    if cb.failure_count >= self.config.circuit_breaker_threshold {
                        cb.state = CircuitState::Open;
                        self.metrics.lock().circuit_breaker_trips += 1;
                        tracing::warn!(
                            op_key,
                            failures = cb.failure_count,
                            "circuit breaker opened"
                        );
                    }
                }
                CircuitState::HalfOpen => {
                    cb.state = CircuitState::Open;
                    cb.half_open_attempts = 0;
                    tracing::warn!(op_key, "circuit breaker re-opened after failed probe");
                }
                CircuitState::Open => {}
            }
        }
    }

    fn record_failure_interval(&self, op_key: &str) -> FailurePattern {
        let entry = self
            .failure_intervals
            .entry(op_key.to_string())
            .or_default();
        let mut history = entry.lock();
        history.push(Instant::now());
        if history.len() > 50 {
            let overflow = history.len() - 50;
            history.drain(0..overflow);
        }

        if history.len() < self.config.failure_pattern_threshold {
            return FailurePattern::Unknown;
        }

        if history.len() >= 4 {
            let recent = &history[history.len() - 4..];
            let all_consecutive = recent
                .windows(2)
                .all(|w| w[1].duration_since(w[0]) < Duration::from_secs(1));
            if all_consecutive {
                return FailurePattern::Cascading;
            }
        }

        let intervals: Vec<f64> = history
            .windows(2)
            .map(|w| w[1].duration_since(w[0]).as_secs_f64())
            .collect();
        if intervals.is_empty() {
            return FailurePattern::Unknown;
        }

        let mean = intervals.iter().sum::<f64>() / intervals.len() as f64;
        let variance =
            intervals.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / intervals.len() as f64;
        let stdev = variance.sqrt();

        if mean > 0.0 && stdev < mean * 0.2 {
            if mean < 5.0 {
                FailurePattern::Persistent
            } else {
                FailurePattern::Intermittent
            }
        } else {
            FailurePattern::Transient
        }
    }

    /// Run `operation`, retrying on retryable errors per the configured
    /// strategy, honoring this manager's per-`op_key` circuit breaker.
    pub async fn execute_with_retry<F, Fut, T>(&self, op_key: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let result = self.run(op_key, &mut operation).await;
        self.metrics.lock().total_operations += 1;
        match &result.value {
            Some(_) => self.metrics.lock().successful_operations += 1,
            None => self.metrics.lock().failed_operations += 1,
        }
        if result.total_attempts > 1 {
            self.metrics.lock().retry_operations += 1;
        }
        {
            let mut m = self.metrics.lock();
            let n = m.total_operations as f64;
            m.avg_retry_count += (result.total_attempts as f64 - m.avg_retry_count) / n;
            m.avg_operation_duration_secs +=
                (result.total_duration.as_secs_f64() - m.avg_operation_duration_secs) / n;
        }

        match result.value {
            Some(v) => Ok(v),
            None => Err(result
                .attempts
                .last()
                .and_then(|a| a.error_message.clone())
                .map(Error::other)
                .unwrap_or_else(|| {
                    Error::CircuitOpen {
                        operation_key: op_key.to_string(),
                        retry_after_secs: self.config.circuit_breaker_recovery_timeout.as_secs(),
                    }
                })),
        }
    }

    /// Like [`Self::execute_with_retry`] but returns the full [`RetryResult`]
    /// record (attempts, pattern tag, correlation id) instead of unwrapping.
    pub async fn execute_with_retry_detailed<F, Fut, T>(
        &self,
        op_key: &str,
        mut operation: F,
    ) -> RetryResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.run(op_key, &mut operation).await
    }

    async fn run<F, Fut, T>(&self, op_key: &str, operation: &mut F) -> RetryResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let correlation_id = self.generate_correlation_id();
        let start = Instant::now();
        let mut attempts = Vec::new();

        if !self.should_allow_request(op_key) {
            tracing::warn!(op_key, correlation_id, "circuit open, rejecting call");
            return RetryResult {
                success: false,
                value: None,
                total_attempts: 0,
                total_duration: start.elapsed(),
                attempts,
                failure_pattern: FailurePattern::Unknown,
                correlation_id,
            };
        }

        for attempt in 1..=self.config.max_attempts {
            let attempt_start = Instant::now();
            match operation().await {
                Ok(value) => {
                    attempts.push(RetryAttempt {
                        attempt_number: attempt,
                        delay: Duration::ZERO,
                        succeeded: true,
                        duration: attempt_start.elapsed(),
                        error_message: None,
                    });
                    self.update_circuit_breaker(op_key, true);
                    return RetryResult {
                        success: true,
                        value: Some(value),
                        total_attempts: attempt,
                        total_duration: start.elapsed(),
                        attempts,
                        failure_pattern: FailurePattern::Unknown,
                        correlation_id,
                    };
                }
                Err(err) => {
                    let retryable = err.is_retryable();
                    let message = err.to_string();
                    attempts.push(RetryAttempt {
                        attempt_number: attempt,
                        delay: Duration::ZERO,
                        succeeded: false,
                        duration: attempt_start.elapsed(),
                        error_message: Some(message),
                    });

                    if !retryable {
                        self.update_circuit_breaker(op_key, false);
                        let pattern = self.record_failure_interval(op_key);
                        return RetryResult {
                            success: false,
                            value: None,
                            total_attempts: attempt,
                            total_duration: start.elapsed(),
                            attempts,
                            failure_pattern: pattern,
                            correlation_id,
                        };
                    }

                    self.update_circuit_breaker(op_key, false);

                    if attempt < self.config.max_attempts {
                        let delay = self.config.calculate_delay(attempt);
                        if let Some(last) = attempts.last_mut() {
                            last.delay = delay;
                        }
                        tracing::debug!(op_key, correlation_id, attempt, ?delay, "retrying");
                        sleep(delay).await;
                    } else {
                        tracing::error!(op_key, correlation_id, "all retry attempts exhausted");
                    }
                }
            }
        }

        let pattern = self.record_failure_interval(op_key);
        RetryResult {
            success: false,
            value: None,
            total_attempts: self.config.max_attempts,
            total_duration: start.elapsed(),
            attempts,
            failure_pattern: pattern,
            correlation_id,
        }
    }

    /// Snapshot of the current metrics.
    pub fn metrics(&self) -> RetryMetrics {
        let m = self.metrics.lock();
        RetryMetrics {
            total_operations: m.total_operations,
            successful_operations: m.successful_operations,
            failed_operations: m.failed_operations,
            retry_operations: m.retry_operations,
            circuit_breaker_trips: m.circuit_breaker_trips,
            avg_retry_count: m.avg_retry_count,
            avg_operation_duration: Duration::from_secs_f64(m.avg_operation_duration_secs),
        }
    }

    /// Snapshot of a single operation's circuit breaker, if it has been used.
    pub fn circuit_breaker_info(&self, op_key: &str) -> Option<CircuitBreakerInfo> {
        let entry = self.breakers.get(op_key)?;
        let cb = entry.lock();
        Some(CircuitBreakerInfo {
            operation_key: op_key.to_string(),
            state: match cb.state {
                CircuitState::Closed => "closed",
                CircuitState::Open => "open",
                CircuitState::HalfOpen => "half_open",
            },
            failure_count: cb.failure_count,
            total_requests: cb.total_requests,
            total_failures: cb.total_failures,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn fibonacci_matches_known_sequence() {
        assert_eq!(fibonacci(0), 0);
        assert_eq!(fibonacci(1), 1);
        assert_eq!(fibonacci(2), 1);
        assert_eq!(fibonacci(3), 2);
        assert_eq!(fibonacci(4), 3);
        assert_eq!(fibonacci(5), 5);
        assert_eq!(fibonacci(6), 8);
    }

    #[test]
    fn calculate_delay_grows_exponentially_without_jitter() {
        let config = RetryConfig::new()
            .with_base_delay(Duration::from_secs(1))
            .with_backoff_multiplier(2.0)
            .with_jitter_factor(0.0);
        let config = RetryConfig { jitter: false, ..config };

        let d1 = config.calculate_delay(1);
        let d2 = config.calculate_delay(2);
        let d3 = config.calculate_delay(3);
        assert!(d2 > d1);
        assert!(d3 > d2);
    }

    #[test]
    fn calculate_delay_caps_at_max_delay() {
        let config = RetryConfig::new()
            .with_base_delay(Duration::from_secs(100))
            .with_backoff_multiplier(10.0)
            .with_max_delay(Duration::from_secs(5));
        let config = RetryConfig { jitter: false, ..config };
        assert_eq!(config.calculate_delay(5), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn succeeds_on_first_attempt() {
        let manager = RetryManager::new(RetryConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        let result = manager
            .execute_with_retry("test:op", move || {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, Error>(7) }
            })
            .await
            .unwrap();

        assert_eq!(result, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_until_success() {
        let manager = RetryManager::new(
            RetryConfig::new()
                .with_max_attempts(5)
                .with_base_delay(Duration::from_millis(1)),
        );
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        let result = manager
            .execute_with_retry("test:flaky", move || {
                let n = calls_clone.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 3 {
                        Err(Error::timeout())
                    } else {
                        Ok(n)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(result, 3);
    }

    #[tokio::test]
    async fn non_retryable_error_short_circuits() {
        let manager = RetryManager::new(RetryConfig::new().with_max_attempts(5));
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        let result: Result<i32> = manager
            .execute_with_retry("test:bad-input", move || {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                async { Err(Error::validation("bad field")) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn circuit_opens_after_threshold_and_rejects() {
        let manager = RetryManager::new(
            RetryConfig::new()
                .with_max_attempts(1)
                .with_circuit_breaker_threshold(2)
                .with_base_delay(Duration::from_millis(1)),
        );

        for _ in 0..2 {
            let _: Result<i32> = manager
                .execute_with_retry("test:unstable", || async { Err(Error::timeout()) })
                .await;
        }

        let info = manager.circuit_breaker_info("test:unstable").unwrap();
        assert_eq!(info.state, "open");

        let result: Result<i32> = manager
            .execute_with_retry("test:unstable", || async { Ok(1) })
            .await;
        assert!(matches!(result, Err(Error::CircuitOpen { .. })));
    }

    #[tokio::test]
    async fn metrics_track_operations() {
        let manager = RetryManager::new(RetryConfig::new().with_max_attempts(1));
        let _: Result<i32> = manager
            .execute_with_retry("test:metrics", || async { Ok(1) })
            .await;
        let metrics = manager.metrics();
        assert_eq!(metrics.total_operations, 1);
        assert_eq!(metrics.successful_operations, 1);
    }
}
