//! Attempt telemetry
//!
//! Keeps a bounded ring buffer of [`AttemptRecord`]s and an exponential
//! moving average of each strategy's success rate. All mutation happens under
//! one mutex because EMA updates do not commute; readers get copies.

use crate::assert_invariant;
use crate::config::MetricsConfig;
use crate::invariant_ppt::invariants;
use crate::types::{AttemptRecord, ErrorKind};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Success rate assumed for a strategy that has never been observed
pub const INITIAL_SUCCESS_RATE: f64 = 0.5;

// Upfront allocation only; the history grows to its configured size on demand
const PREALLOCATED_HISTORY: usize = 64;

/// Lifetime counters for one strategy. Unlike the history these are never
/// evicted, only cleared by a reset.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StrategyTotals {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub timeouts: u64,
    pub total_duration_ms: u64,
}

impl StrategyTotals {
    pub fn average_duration_ms(&self) -> Option<f64> {
        if self.attempts == 0 {
            None
        } else {
            Some(self.total_duration_ms as f64 / self.attempts as f64)
        }
    }
}

/// Immutable copy of the store at one point in time
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub success_rates: BTreeMap<String, f64>,
    /// Most recent records, oldest first
    pub recent: Vec<AttemptRecord>,
    pub totals: BTreeMap<String, StrategyTotals>,
}

impl MetricsSnapshot {
    pub fn success_rate(&self, strategy: &str) -> Option<f64> {
        self.success_rates.get(strategy).copied()
    }

    pub fn success_rate_or_default(&self, strategy: &str) -> f64 {
        self.success_rate(strategy).unwrap_or(INITIAL_SUCCESS_RATE)
    }
}

#[derive(Debug, Default)]
struct MetricsState {
    history: VecDeque<AttemptRecord>,
    success_rates: BTreeMap<String, f64>,
    totals: BTreeMap<String, StrategyTotals>,
}

#[derive(Debug)]
pub struct MetricsStore {
    config: MetricsConfig,
    state: Mutex<MetricsState>,
}

impl MetricsStore {
    pub fn new(config: MetricsConfig) -> Self {
        Self {
            state: Mutex::new(MetricsState {
                history: VecDeque::with_capacity(config.history_size.min(PREALLOCATED_HISTORY)),
                ..MetricsState::default()
            }),
            config,
        }
    }

    // Every critical section leaves the state consistent, so a poisoned lock
    // still holds usable data.
    fn lock(&self) -> MutexGuard<'_, MetricsState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a record and fold it into the strategy's success rate.
    ///
    /// Returns the updated success rate.
    pub fn record_attempt(&self, record: AttemptRecord) -> f64 {
        let alpha = self.config.alpha;
        let capacity = self.config.history_size;
        let mut state = self.lock();

        let outcome = if record.success { 1.0 } else { 0.0 };
        let old = state
            .success_rates
            .get(&record.strategy_name)
            .copied()
            .unwrap_or(INITIAL_SUCCESS_RATE);
        let updated = (old * (1.0 - alpha) + outcome * alpha).clamp(0.0, 1.0);
        state
            .success_rates
            .insert(record.strategy_name.clone(), updated);

        let totals = state
            .totals
            .entry(record.strategy_name.clone())
            .or_default();
        totals.attempts += 1;
        totals.total_duration_ms = totals.total_duration_ms.saturating_add(record.duration_ms);
        if record.success {
            totals.successes += 1;
        } else {
            totals.failures += 1;
            if record.error_kind == Some(ErrorKind::Timeout) {
                totals.timeouts += 1;
            }
        }

        log::debug!(
            "Recorded {} attempt {} for {}: success rate {:.3} -> {:.3}",
            if record.success { "successful" } else { "failed" },
            record.attempt,
            record.strategy_name,
            old,
            updated
        );

        state.history.push_back(record);
        while state.history.len() > capacity {
            state.history.pop_front();
        }

        assert_invariant!(
            (0.0..=1.0).contains(&updated),
            invariants::SUCCESS_RATE_BOUNDED,
            "metrics"
        );
        assert_invariant!(
            state.history.len() <= capacity,
            invariants::HISTORY_BOUNDED,
            "metrics"
        );

        updated
    }

    pub fn success_rate(&self, strategy: &str) -> Option<f64> {
        self.lock().success_rates.get(strategy).copied()
    }

    /// Copy of the current rates, totals and the last `snapshot_window` records
    pub fn snapshot(&self) -> MetricsSnapshot {
        let state = self.lock();
        let skip = state
            .history
            .len()
            .saturating_sub(self.config.snapshot_window);
        MetricsSnapshot {
            success_rates: state.success_rates.clone(),
            recent: state.history.iter().skip(skip).cloned().collect(),
            totals: state.totals.clone(),
        }
    }

    /// Failure ratio over the most recent `window` records.
    ///
    /// With fewer records than `window` the ratio is taken over the records
    /// that exist; an empty history or a zero window yields 0.
    pub fn error_rate(&self, window: usize) -> f64 {
        let state = self.lock();
        failure_ratio(state.history.iter().rev().take(window))
    }

    /// Failure ratio over the most recent `window` records of one strategy
    pub fn error_rate_for(&self, strategy: &str, window: usize) -> f64 {
        let state = self.lock();
        failure_ratio(
            state
                .history
                .iter()
                .rev()
                .filter(|r| r.strategy_name == strategy)
                .take(window),
        )
    }

    /// Error rate over the configured default window
    pub fn recent_error_rate(&self) -> f64 {
        self.error_rate(self.config.error_rate_window)
    }

    pub fn len(&self) -> usize {
        self.lock().history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().history.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.config.history_size
    }

    /// Forget all history, rates and totals
    pub fn reset(&self) {
        let mut state = self.lock();
        state.history.clear();
        state.success_rates.clear();
        state.totals.clear();
        log::info!("Metrics reset");
    }
}

impl Default for MetricsStore {
    fn default() -> Self {
        Self::new(MetricsConfig::default())
    }
}

fn failure_ratio<'a>(records: impl Iterator<Item = &'a AttemptRecord>) -> f64 {
    let (count, failures) = records.fold((0usize, 0usize), |(count, failures), r| {
        (count + 1, failures + usize::from(!r.success))
    });
    if count == 0 {
        0.0
    } else {
        failures as f64 / count as f64
    }
}
