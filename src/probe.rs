//! Environment inputs injected into the engine
//!
//! Capability detection and network measurement live outside this crate.
//! The engine only sees them through these two traits.

use crate::config::NetworkThresholds;
use crate::types::{CapabilitySet, NetworkCondition, NetworkSample};

/// Supplies the capability set for a selection call
pub trait CapabilityProvider: Send + Sync {
    fn capabilities(&self) -> CapabilitySet;
}

impl<F> CapabilityProvider for F
where
    F: Fn() -> CapabilitySet + Send + Sync,
{
    fn capabilities(&self) -> CapabilitySet {
        self()
    }
}

/// Fixed capability set, for hosts whose environment does not change
#[derive(Debug, Clone, Default)]
pub struct StaticCapabilities(pub CapabilitySet);

impl CapabilityProvider for StaticCapabilities {
    fn capabilities(&self) -> CapabilitySet {
        self.0.clone()
    }
}

/// Maps a raw network sample to a coarse condition
pub trait NetworkClassifier: Send + Sync {
    fn classify(&self, sample: &NetworkSample) -> NetworkCondition;
}

impl<F> NetworkClassifier for F
where
    F: Fn(&NetworkSample) -> NetworkCondition + Send + Sync,
{
    fn classify(&self, sample: &NetworkSample) -> NetworkCondition {
        self(sample)
    }
}

/// Classifier with a fixed signal precedence: connection class label, then
/// measured downlink, then bandwidth estimate. The first usable signal wins;
/// later signals never overwrite it.
#[derive(Debug, Clone, Default)]
pub struct ThresholdClassifier {
    thresholds: NetworkThresholds,
}

impl ThresholdClassifier {
    pub fn new(thresholds: NetworkThresholds) -> Self {
        Self { thresholds }
    }

    fn classify_label(label: &str) -> Option<NetworkCondition> {
        match label.trim().to_ascii_lowercase().as_str() {
            "slow-2g" | "slow_2g" | "2g" => Some(NetworkCondition::Slow),
            "3g" => Some(NetworkCondition::Medium),
            "4g" | "5g" | "wifi" | "ethernet" => Some(NetworkCondition::Fast),
            _ => None,
        }
    }

    fn classify_mbps(&self, mbps: f64) -> Option<NetworkCondition> {
        if !mbps.is_finite() || mbps < 0.0 {
            return None;
        }
        Some(if mbps < self.thresholds.slow_below_mbps {
            NetworkCondition::Slow
        } else if mbps >= self.thresholds.fast_from_mbps {
            NetworkCondition::Fast
        } else {
            NetworkCondition::Medium
        })
    }
}

impl NetworkClassifier for ThresholdClassifier {
    fn classify(&self, sample: &NetworkSample) -> NetworkCondition {
        let condition = sample
            .connection_class
            .as_deref()
            .and_then(Self::classify_label)
            .or_else(|| sample.downlink_mbps.and_then(|d| self.classify_mbps(d)))
            .or_else(|| {
                sample
                    .bandwidth_estimate_kbps
                    .and_then(|kbps| self.classify_mbps(kbps / 1000.0))
            })
            .unwrap_or(NetworkCondition::Unknown);

        log::debug!("Classified network sample {:?} as {}", sample, condition);
        condition
    }
}
