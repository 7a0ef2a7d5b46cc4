//! Plan execution with timeout racing, retry and fallback
//!
//! Attempts run strictly one at a time. Each attempt races the operation
//! against its timeout and the caller's cancellation token; the loser is
//! dropped and the attempt's own token is cancelled so detached work can
//! stop. Every settled attempt is written to the metrics store.

use crate::assert_invariant;
use crate::config::ExecutorConfig;
use crate::errors::{AggregateFailure, AttemptError, DeliveryError, StrategyFailure};
use crate::invariant_ppt::invariants;
use crate::metrics::MetricsStore;
use crate::timing::{wall_clock_ms, AttemptClock};
use crate::types::{AttemptRecord, ExecutionPlan, Strategy};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Settles one attempt exactly once.
///
/// Only the executor resolves a guard, after its race picks a winner.
/// Resolving cancels the attempt token so detached work can stop; operations
/// observe the outcome through [`AttemptContext::is_abandoned`] and
/// [`AttemptContext::cancellation`].
#[derive(Debug)]
pub(crate) struct AttemptGuard {
    resolved: AtomicBool,
    token: CancellationToken,
}

impl AttemptGuard {
    pub(crate) fn new(token: CancellationToken) -> Self {
        Self {
            resolved: AtomicBool::new(false),
            token,
        }
    }

    /// Returns true only for the first caller
    pub(crate) fn resolve(&self) -> bool {
        let first = self
            .resolved
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if first {
            self.token.cancel();
        }
        first
    }

    pub(crate) fn is_resolved(&self) -> bool {
        self.resolved.load(Ordering::Acquire)
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }
}

/// Handed to the operation factory for every attempt
#[derive(Debug, Clone)]
pub struct AttemptContext {
    pub delivery_id: Uuid,
    pub strategy: String,
    /// 1-based attempt number within the strategy
    pub attempt: u32,
    pub timeout: Duration,
    guard: Arc<AttemptGuard>,
}

impl AttemptContext {
    /// Token cancelled once this attempt is settled or abandoned
    pub fn cancellation(&self) -> CancellationToken {
        self.guard.token().clone()
    }

    /// True once the engine has stopped waiting for this attempt
    pub fn is_abandoned(&self) -> bool {
        self.guard.is_resolved()
    }
}

/// Successful delivery and where it came from
#[derive(Debug, Clone, PartialEq)]
pub struct DeliverySuccess<T> {
    pub value: T,
    pub strategy: String,
    /// Attempt number within the winning strategy
    pub attempt: u32,
    /// Attempts made across all strategies, including the winning one
    pub total_attempts: u32,
    pub delivery_id: Uuid,
}

enum Resolution<T> {
    Succeeded(T),
    Failed(AttemptError),
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct Executor {
    config: ExecutorConfig,
    metrics: Arc<MetricsStore>,
}

impl Executor {
    pub fn new(config: ExecutorConfig, metrics: Arc<MetricsStore>) -> Self {
        Self { config, metrics }
    }

    pub fn metrics(&self) -> &Arc<MetricsStore> {
        &self.metrics
    }

    /// Delay before the retry that follows failed attempt `attempt`
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let ms = self
            .config
            .base_backoff_ms
            .saturating_mul(u64::from(attempt))
            .min(self.config.max_backoff_ms);
        Duration::from_millis(ms)
    }

    /// Run the plan until one attempt succeeds.
    ///
    /// Returns the first success, [`DeliveryError::AggregateFailure`] when
    /// every strategy is exhausted, or [`DeliveryError::Cancelled`] when
    /// `cancel` fires.
    pub async fn execute_with_fallback<T, E, F, Fut>(
        &self,
        plan: &ExecutionPlan,
        cancel: &CancellationToken,
        mut factory: F,
    ) -> Result<DeliverySuccess<T>, DeliveryError>
    where
        F: FnMut(&Strategy, AttemptContext) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        if plan.is_empty() {
            return Err(DeliveryError::NoAvailableStrategy {
                enabled: Vec::new(),
            });
        }

        let delivery_id = Uuid::new_v4();
        let mut failures = Vec::new();
        let mut total_attempts = 0u32;

        log::info!(
            "Delivery {} starting on {} network with plan {:?}",
            delivery_id,
            plan.network,
            plan.names()
        );

        for entry in plan.iter() {
            let strategy = &entry.strategy;
            let timeout = Duration::from_millis(entry.effective_timeout_ms.max(1));
            // Hand-built plans may carry a zero budget; every entry gets one try
            let max_attempts = entry.effective_retries.max(1);
            let mut last_error = None;
            let mut attempts = 0u32;

            for attempt in 1..=max_attempts {
                if cancel.is_cancelled() {
                    return Err(self.cancelled(delivery_id, total_attempts));
                }

                let guard = Arc::new(AttemptGuard::new(cancel.child_token()));
                let context = AttemptContext {
                    delivery_id,
                    strategy: strategy.name.clone(),
                    attempt,
                    timeout,
                    guard: Arc::clone(&guard),
                };

                log::debug!(
                    "Delivery {}: {} attempt {}/{} (timeout {}ms)",
                    delivery_id,
                    strategy.name,
                    attempt,
                    max_attempts,
                    entry.effective_timeout_ms
                );

                let clock = AttemptClock::start();
                let operation = factory(strategy, context);
                let resolution = race_attempt(operation, timeout, cancel, &guard).await;
                let duration_ms = clock.elapsed_ms();

                match resolution {
                    Resolution::Cancelled => {
                        return Err(self.cancelled(delivery_id, total_attempts));
                    }
                    Resolution::Succeeded(value) => {
                        total_attempts += 1;
                        self.metrics.record_attempt(AttemptRecord::success(
                            strategy.name.clone(),
                            attempt,
                            duration_ms,
                            wall_clock_ms(),
                        ));
                        log::info!(
                            "Delivery {} succeeded via {} on attempt {} ({}ms, {} total attempts)",
                            delivery_id,
                            strategy.name,
                            attempt,
                            duration_ms,
                            total_attempts
                        );
                        return Ok(DeliverySuccess {
                            value,
                            strategy: strategy.name.clone(),
                            attempt,
                            total_attempts,
                            delivery_id,
                        });
                    }
                    Resolution::Failed(error) => {
                        total_attempts += 1;
                        attempts = attempt;
                        self.metrics.record_attempt(AttemptRecord::failure(
                            strategy.name.clone(),
                            attempt,
                            duration_ms,
                            wall_clock_ms(),
                            error.kind(),
                            error.to_string(),
                        ));
                        log::warn!(
                            "Delivery {}: {} attempt {}/{} failed: {}",
                            delivery_id,
                            strategy.name,
                            attempt,
                            max_attempts,
                            error
                        );
                        last_error = Some(error);

                        if attempt < max_attempts {
                            let delay = self.backoff_delay(attempt);
                            tokio::select! {
                                biased;
                                _ = cancel.cancelled() => {
                                    return Err(self.cancelled(delivery_id, total_attempts));
                                }
                                _ = tokio::time::sleep(delay) => {}
                            }
                        }
                    }
                }
            }

            if let Some(last_error) = last_error {
                log::warn!(
                    "Delivery {}: {} exhausted after {} attempts, falling back",
                    delivery_id,
                    strategy.name,
                    attempts
                );
                failures.push(StrategyFailure {
                    strategy: strategy.name.clone(),
                    attempts,
                    last_error,
                });
            }
        }

        let failure = AggregateFailure { failures };
        log::error!("Delivery {} failed: {}", delivery_id, failure);
        Err(DeliveryError::AggregateFailure(failure))
    }

    fn cancelled(&self, delivery_id: Uuid, attempts: u32) -> DeliveryError {
        log::info!(
            "Delivery {} cancelled by caller after {} attempts",
            delivery_id,
            attempts
        );
        DeliveryError::Cancelled { attempts }
    }
}

/// Race one operation against its timeout and the caller's cancellation.
/// Cancellation is polled first so an abort is never reported as a result.
async fn race_attempt<T, E, Fut>(
    operation: Fut,
    timeout: Duration,
    cancel: &CancellationToken,
    guard: &AttemptGuard,
) -> Resolution<T>
where
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    let resolution = tokio::select! {
        biased;
        _ = cancel.cancelled() => Resolution::Cancelled,
        result = tokio::time::timeout(timeout, operation) => match result {
            Ok(Ok(value)) => Resolution::Succeeded(value),
            Ok(Err(e)) => Resolution::Failed(AttemptError::Failure(e.to_string())),
            Err(_) => Resolution::Failed(AttemptError::Timeout {
                after_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        },
    };

    let first = guard.resolve();
    assert_invariant!(first, invariants::ATTEMPT_RESOLVED_ONCE, "executor");
    resolution
}
