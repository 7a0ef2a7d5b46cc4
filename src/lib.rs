//! CrabStream: adaptive multi-strategy media delivery
//!
//! This crate decides how to deliver media when several transports could do
//! the job (WebRTC, an HTTP proxy, a transcoding pipeline, direct playback)
//! and keeps delivering when some of them fail.
//!
//! # Features
//! - Capability-based strategy filtering
//! - Success-rate (EMA) and priority based ordering
//! - Lightweight-first ordering on slow networks
//! - Per-network-condition timeout and retry budgets
//! - Timeout racing, linear backoff, fallback and caller cancellation
//! - Bounded attempt telemetry feeding future selections
//!
//! # Usage
//! ```rust,ignore
//! use crabstream::{DeliveryEngine, EngineConfig, NetworkSample};
//! use crabstream::probe::{StaticCapabilities, ThresholdClassifier};
//! use crabstream::types::CapabilitySet;
//! use std::sync::Arc;
//!
//! let engine = DeliveryEngine::new(
//!     EngineConfig::load_or_default(),
//!     Arc::new(StaticCapabilities(CapabilitySet::all())),
//!     Arc::new(ThresholdClassifier::default()),
//! )?;
//!
//! let delivered = engine
//!     .deliver(&NetworkSample::default().with_downlink_mbps(3.2), |strategy, ctx| {
//!         open_stream(strategy.name.clone(), ctx)
//!     })
//!     .await?;
//! println!("delivered via {}", delivered.strategy);
//! ```
pub mod catalog;
pub mod config;
pub mod engine;
pub mod errors;
pub mod executor;
pub mod invariant_ppt;
pub mod metrics;
pub mod probe;
pub mod selector;
pub mod timing;
pub mod types;

// Testing utilities - scripted transports for offline testing
pub mod testing;

// Re-exports for convenience
pub use catalog::StrategyCatalog;
pub use config::EngineConfig;
pub use engine::DeliveryEngine;
pub use errors::{AggregateFailure, AttemptError, DeliveryError, StrategyFailure};
pub use executor::{AttemptContext, DeliverySuccess, Executor};
pub use metrics::{MetricsSnapshot, MetricsStore};
pub use selector::Selector;
pub use tokio_util::sync::CancellationToken;
pub use types::{
    AttemptRecord, Capability, CapabilitySet, ErrorKind, ExecutionPlan, NetworkCondition,
    NetworkSample, PlanEntry, Strategy,
};

/// Initialize logging for the delivery engine
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "crabstream=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Get crate information
pub fn get_info() -> CrateInfo {
    CrateInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: DESCRIPTION.to_string(),
    }
}

/// Crate information structure
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CrateInfo {
    pub name: String,
    pub version: String,
    pub description: String,
}

#[cfg(test)]
mod lib_tests {
    use super::*;

    #[test]
    fn test_crate_info() {
        let info = get_info();
        assert_eq!(info.name, "crabstream");
        assert!(!info.version.is_empty());
        assert!(!info.description.is_empty());
    }
}
