//! Delivery engine facade
//!
//! Owns the catalog, the metrics store and the selector/executor pair, and
//! takes its environment inputs through injected providers instead of
//! global detector state.

use crate::catalog::StrategyCatalog;
use crate::config::EngineConfig;
use crate::errors::DeliveryError;
use crate::executor::{AttemptContext, DeliverySuccess, Executor};
use crate::metrics::{MetricsSnapshot, MetricsStore};
use crate::probe::{CapabilityProvider, NetworkClassifier};
use crate::selector::Selector;
use crate::types::{ExecutionPlan, NetworkSample, Strategy};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct DeliveryEngine {
    config: EngineConfig,
    catalog: StrategyCatalog,
    metrics: Arc<MetricsStore>,
    selector: Selector,
    executor: Executor,
    capabilities: Arc<dyn CapabilityProvider>,
    classifier: Arc<dyn NetworkClassifier>,
}

impl fmt::Debug for DeliveryEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryEngine")
            .field("catalog", &self.catalog)
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

impl DeliveryEngine {
    /// Validate the configuration and register every configured strategy
    pub fn new(
        config: EngineConfig,
        capabilities: Arc<dyn CapabilityProvider>,
        classifier: Arc<dyn NetworkClassifier>,
    ) -> Result<Self, DeliveryError> {
        // Registration reports duplicates and invalid entries with typed errors,
        // so it runs before the general validation pass.
        let catalog = StrategyCatalog::from_strategies(config.strategies.iter().cloned())?;
        config.validate().map_err(DeliveryError::Configuration)?;

        let metrics = Arc::new(MetricsStore::new(config.metrics.clone()));
        let selector = Selector::new(config.selector.clone(), config.network.adjustments.clone());
        let executor = Executor::new(config.executor.clone(), Arc::clone(&metrics));

        log::info!(
            "Delivery engine ready with {} strategies: {:?}",
            catalog.len(),
            catalog.list().iter().map(|s| s.name.as_str()).collect::<Vec<_>>()
        );

        Ok(Self {
            config,
            catalog,
            metrics,
            selector,
            executor,
            capabilities,
            classifier,
        })
    }

    /// Ordered plan for the current environment and metrics
    pub fn plan(&self, sample: &NetworkSample) -> Result<ExecutionPlan, DeliveryError> {
        let capabilities = self.capabilities.capabilities();
        let network = self.classifier.classify(sample);
        let snapshot = self.metrics.snapshot();
        self.selector
            .select_order(&self.catalog, &capabilities, network, &snapshot)
    }

    /// Plan and execute one delivery
    pub async fn deliver<T, E, F, Fut>(
        &self,
        sample: &NetworkSample,
        factory: F,
    ) -> Result<DeliverySuccess<T>, DeliveryError>
    where
        F: FnMut(&Strategy, AttemptContext) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        self.deliver_with_cancel(sample, &CancellationToken::new(), factory)
            .await
    }

    /// Plan and execute one delivery, aborting when `cancel` fires
    pub async fn deliver_with_cancel<T, E, F, Fut>(
        &self,
        sample: &NetworkSample,
        cancel: &CancellationToken,
        factory: F,
    ) -> Result<DeliverySuccess<T>, DeliveryError>
    where
        F: FnMut(&Strategy, AttemptContext) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let plan = self.plan(sample)?;
        self.executor
            .execute_with_fallback(&plan, cancel, factory)
            .await
    }

    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn reset_metrics(&self) {
        self.metrics.reset();
    }

    /// Failure ratio over the configured error-rate window
    pub fn recent_error_rate(&self) -> f64 {
        self.metrics.recent_error_rate()
    }

    pub fn catalog(&self) -> &StrategyCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}
