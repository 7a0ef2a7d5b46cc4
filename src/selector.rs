//! Execution plan construction
//!
//! Combines the catalog, a metrics snapshot and the current environment into
//! an ordered list of strategies with per-call timeout and retry budgets.
//! Selection is pure: identical inputs always produce identical plans.

use crate::assert_invariant;
use crate::catalog::StrategyCatalog;
use crate::config::{ConditionAdjustments, SelectorConfig};
use crate::errors::DeliveryError;
use crate::invariant_ppt::invariants;
use crate::metrics::MetricsSnapshot;
use crate::types::{CapabilitySet, ExecutionPlan, NetworkCondition, PlanEntry, Strategy};
use std::cmp::Ordering;

#[derive(Debug, Clone, Default)]
pub struct Selector {
    config: SelectorConfig,
    adjustments: ConditionAdjustments,
}

/// A strategy with its computed ordering score
#[derive(Debug, Clone, Copy)]
struct Scored<'a> {
    strategy: &'a Strategy,
    score: f64,
}

impl Selector {
    pub fn new(config: SelectorConfig, adjustments: ConditionAdjustments) -> Self {
        Self {
            config,
            adjustments,
        }
    }

    pub fn config(&self) -> &SelectorConfig {
        &self.config
    }

    /// Ordering score for one strategy.
    ///
    /// `success_weight * success_rate + priority_weight * priority_score`,
    /// where `priority_score = (max_priority - priority) / max_priority`.
    /// When every priority is 0 the priority score is 1.0 for all.
    pub fn score(
        &self,
        strategy: &Strategy,
        max_priority: u32,
        snapshot: &MetricsSnapshot,
    ) -> f64 {
        let success_rate = snapshot.success_rate_or_default(&strategy.name);
        let priority_score = if max_priority == 0 {
            1.0
        } else {
            f64::from(max_priority.saturating_sub(strategy.priority)) / f64::from(max_priority)
        };
        self.config.success_weight * success_rate + self.config.priority_weight * priority_score
    }

    /// Build the ordered plan for one delivery
    pub fn select_order(
        &self,
        catalog: &StrategyCatalog,
        capabilities: &CapabilitySet,
        network: NetworkCondition,
        snapshot: &MetricsSnapshot,
    ) -> Result<ExecutionPlan, DeliveryError> {
        let available = catalog.available_for(capabilities);
        if available.is_empty() {
            log::warn!(
                "No strategy satisfies capabilities {:?}",
                capabilities.enabled()
            );
            return Err(DeliveryError::NoAvailableStrategy {
                enabled: capabilities.enabled().into_iter().collect(),
            });
        }

        let max_priority = available.iter().map(|s| s.priority).max().unwrap_or(0);
        let mut scored: Vec<Scored> = available
            .into_iter()
            .map(|strategy| Scored {
                strategy,
                score: self.score(strategy, max_priority, snapshot),
            })
            .collect();

        // Stable: equal scores keep registration order
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

        let ordered = if network == NetworkCondition::Slow {
            self.lightweight_first(scored)
        } else {
            scored.into_iter().map(|s| s.strategy).collect()
        };

        let adjustment = self.adjustments.for_condition(network);
        let entries: Vec<PlanEntry> = ordered
            .into_iter()
            .map(|strategy| {
                let timeout = (strategy.timeout_ms as f64 * adjustment.timeout_multiplier).round();
                let retries = i64::from(strategy.max_retries) + i64::from(adjustment.retry_delta);
                PlanEntry {
                    strategy: strategy.clone(),
                    effective_timeout_ms: (timeout as u64).max(1),
                    effective_retries: retries.clamp(1, i64::from(u32::MAX)) as u32,
                }
            })
            .collect();

        assert_invariant!(
            entries
                .iter()
                .all(|e| e.strategy.is_available(capabilities)),
            invariants::PLAN_ONLY_AVAILABLE,
            "selector"
        );

        let plan = ExecutionPlan::new(network, entries);
        log::debug!("Selected order for {} network: {:?}", network, plan.names());
        Ok(plan)
    }

    /// Configured lightweight order first, then any remaining available
    /// strategies in score order
    fn lightweight_first<'a>(&self, scored: Vec<Scored<'a>>) -> Vec<&'a Strategy> {
        let mut remaining: Vec<&Strategy> = scored.into_iter().map(|s| s.strategy).collect();
        let mut ordered = Vec::with_capacity(remaining.len());

        for name in &self.config.lightweight_order {
            if let Some(pos) = remaining.iter().position(|s| &s.name == name) {
                ordered.push(remaining.remove(pos));
            }
        }
        ordered.extend(remaining);
        ordered
    }
}
