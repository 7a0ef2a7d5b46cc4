//! Registered delivery strategies
//!
//! Registration order is significant: it is the stable tie-break for
//! selection and the order `available_for` reports.

use crate::assert_invariant;
use crate::errors::DeliveryError;
use crate::invariant_ppt::invariants;
use crate::types::{CapabilitySet, Strategy};
use std::collections::HashSet;

#[derive(Debug, Clone, Default)]
pub struct StrategyCatalog {
    strategies: Vec<Strategy>,
}

impl StrategyCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog, failing on the first invalid or duplicate entry
    pub fn from_strategies<I>(strategies: I) -> Result<Self, DeliveryError>
    where
        I: IntoIterator<Item = Strategy>,
    {
        let mut catalog = Self::new();
        for strategy in strategies {
            catalog.register(strategy)?;
        }
        Ok(catalog)
    }

    pub fn register(&mut self, strategy: Strategy) -> Result<(), DeliveryError> {
        strategy
            .validate()
            .map_err(|reason| DeliveryError::InvalidStrategy {
                name: strategy.name.clone(),
                reason,
            })?;

        if self.get(&strategy.name).is_some() {
            return Err(DeliveryError::DuplicateStrategy(strategy.name));
        }

        log::debug!(
            "Registered strategy {} (priority {}, timeout {}ms, retries {})",
            strategy.name,
            strategy.priority,
            strategy.timeout_ms,
            strategy.max_retries
        );
        self.strategies.push(strategy);

        let unique: HashSet<&str> = self.strategies.iter().map(|s| s.name.as_str()).collect();
        assert_invariant!(
            unique.len() == self.strategies.len(),
            invariants::CATALOG_NAMES_UNIQUE,
            "catalog"
        );
        Ok(())
    }

    /// All strategies in registration order
    pub fn list(&self) -> &[Strategy] {
        &self.strategies
    }

    /// Strategies whose requirements are all enabled, in registration order
    pub fn available_for(&self, capabilities: &CapabilitySet) -> Vec<&Strategy> {
        self.strategies
            .iter()
            .filter(|s| s.is_available(capabilities))
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<&Strategy> {
        self.strategies.iter().find(|s| s.name == name)
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Capability;

    fn sample_catalog() -> StrategyCatalog {
        StrategyCatalog::from_strategies(vec![
            Strategy::new("webrtc", 1, 1000, 2).requires(Capability::WebRtc),
            Strategy::new("proxy", 2, 1000, 2)
                .requires(Capability::Fetch)
                .requires(Capability::MediaSource),
            Strategy::new("direct", 3, 1000, 1).requires(Capability::VideoElement),
        ])
        .unwrap()
    }

    #[test]
    fn test_register_rejects_duplicate() {
        let mut catalog = sample_catalog();
        let err = catalog
            .register(Strategy::new("proxy", 9, 500, 1))
            .unwrap_err();
        assert!(matches!(err, DeliveryError::DuplicateStrategy(ref name) if name == "proxy"));
        assert_eq!(catalog.len(), 3);
    }

    #[test]
    fn test_register_rejects_invalid() {
        let mut catalog = StrategyCatalog::new();
        let err = catalog.register(Strategy::new("hls", 1, 1000, 0)).unwrap_err();
        assert!(matches!(err, DeliveryError::InvalidStrategy { .. }));
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_list_preserves_registration_order() {
        let catalog = sample_catalog();
        let names: Vec<_> = catalog.list().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["webrtc", "proxy", "direct"]);
    }

    #[test]
    fn test_available_for_filters_and_keeps_order() {
        let catalog = sample_catalog();
        let caps = CapabilitySet::new()
            .with(Capability::VideoElement, true)
            .with(Capability::Fetch, true)
            .with(Capability::MediaSource, true)
            .with(Capability::WebRtc, false);

        let names: Vec<_> = catalog
            .available_for(&caps)
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(names, vec!["proxy", "direct"]);
    }

    #[test]
    fn test_available_for_empty_capabilities() {
        let catalog = sample_catalog();
        assert!(catalog.available_for(&CapabilitySet::new()).is_empty());
    }
}
