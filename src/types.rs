//! Core data types shared by the selector, executor and metrics store.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Environment feature a delivery strategy may depend on.
///
/// The set is closed on purpose: capability checks are plain set membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    WebRtc,
    MediaSource,
    WebCodecs,
    WebSocket,
    Fetch,
    VideoElement,
    HlsNative,
    WebAssembly,
}

impl Capability {
    pub const ALL: [Capability; 8] = [
        Capability::WebRtc,
        Capability::MediaSource,
        Capability::WebCodecs,
        Capability::WebSocket,
        Capability::Fetch,
        Capability::VideoElement,
        Capability::HlsNative,
        Capability::WebAssembly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::WebRtc => "web_rtc",
            Capability::MediaSource => "media_source",
            Capability::WebCodecs => "web_codecs",
            Capability::WebSocket => "web_socket",
            Capability::Fetch => "fetch",
            Capability::VideoElement => "video_element",
            Capability::HlsNative => "hls_native",
            Capability::WebAssembly => "web_assembly",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Capability::ALL
            .iter()
            .copied()
            .find(|cap| cap.as_str() == normalized)
            .ok_or_else(|| format!("unknown capability: {}", s))
    }
}

/// Current mapping of capability tag to availability.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet {
    flags: BTreeMap<Capability, bool>,
}

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every known capability enabled
    pub fn all() -> Self {
        Capability::ALL.iter().map(|cap| (*cap, true)).collect()
    }

    pub fn with(mut self, capability: Capability, enabled: bool) -> Self {
        self.set(capability, enabled);
        self
    }

    pub fn set(&mut self, capability: Capability, enabled: bool) {
        self.flags.insert(capability, enabled);
    }

    pub fn is_enabled(&self, capability: Capability) -> bool {
        self.flags.get(&capability).copied().unwrap_or(false)
    }

    /// Tags currently reported as true
    pub fn enabled(&self) -> BTreeSet<Capability> {
        self.flags
            .iter()
            .filter(|(_, enabled)| **enabled)
            .map(|(cap, _)| *cap)
            .collect()
    }

    /// True iff every required capability is enabled
    pub fn satisfies(&self, required: &BTreeSet<Capability>) -> bool {
        required.iter().all(|cap| self.is_enabled(*cap))
    }
}

impl FromIterator<(Capability, bool)> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = (Capability, bool)>>(iter: I) -> Self {
        Self {
            flags: iter.into_iter().collect(),
        }
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        iter.into_iter().map(|cap| (cap, true)).collect()
    }
}

/// Coarse network quality classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkCondition {
    Slow,
    Medium,
    Fast,
    #[default]
    Unknown,
}

impl NetworkCondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkCondition::Slow => "slow",
            NetworkCondition::Medium => "medium",
            NetworkCondition::Fast => "fast",
            NetworkCondition::Unknown => "unknown",
        }
    }
}

impl fmt::Display for NetworkCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NetworkCondition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "slow" => Ok(NetworkCondition::Slow),
            "medium" => Ok(NetworkCondition::Medium),
            "fast" => Ok(NetworkCondition::Fast),
            "unknown" => Ok(NetworkCondition::Unknown),
            other => Err(format!("unknown network condition: {}", other)),
        }
    }
}

/// Raw network measurement handed to a classifier.
///
/// Fields are listed in precedence order: an explicit connection class wins
/// over a measured downlink, which wins over a bandwidth estimate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkSample {
    /// Connection class label such as `"4g"` or `"slow-2g"`
    pub connection_class: Option<String>,
    /// Measured downlink in megabits per second
    pub downlink_mbps: Option<f64>,
    /// Bandwidth probe estimate in kilobits per second
    pub bandwidth_estimate_kbps: Option<f64>,
}

impl NetworkSample {
    pub fn with_connection_class(mut self, label: impl Into<String>) -> Self {
        self.connection_class = Some(label.into());
        self
    }

    pub fn with_downlink_mbps(mut self, mbps: f64) -> Self {
        self.downlink_mbps = Some(mbps);
        self
    }

    pub fn with_bandwidth_estimate_kbps(mut self, kbps: f64) -> Self {
        self.bandwidth_estimate_kbps = Some(kbps);
        self
    }
}

/// A named way of delivering media
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Strategy {
    pub name: String,
    /// Lower is more preferred
    pub priority: u32,
    pub timeout_ms: u64,
    /// Attempts allowed for this strategy (at least 1)
    pub max_retries: u32,
    #[serde(default)]
    pub required_capabilities: BTreeSet<Capability>,
}

impl Strategy {
    pub fn new(name: impl Into<String>, priority: u32, timeout_ms: u64, max_retries: u32) -> Self {
        Self {
            name: name.into(),
            priority,
            timeout_ms,
            max_retries,
            required_capabilities: BTreeSet::new(),
        }
    }

    pub fn requires(mut self, capability: Capability) -> Self {
        self.required_capabilities.insert(capability);
        self
    }

    pub fn is_available(&self, capabilities: &CapabilitySet) -> bool {
        capabilities.satisfies(&self.required_capabilities)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name must not be empty".to_string());
        }
        if self.timeout_ms == 0 {
            return Err("timeout_ms must be greater than 0".to_string());
        }
        if self.max_retries == 0 {
            return Err("max_retries must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Why an attempt failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Timeout,
    Failure,
}

/// Outcome of a single attempt. Created once by the executor, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub strategy_name: String,
    pub success: bool,
    pub duration_ms: u64,
    /// Wall-clock time the attempt finished, milliseconds since the epoch
    pub timestamp_ms: i64,
    /// 1-based attempt number within its strategy
    pub attempt: u32,
    pub error_kind: Option<ErrorKind>,
    pub error_message: Option<String>,
}

impl AttemptRecord {
    pub fn success(
        strategy_name: impl Into<String>,
        attempt: u32,
        duration_ms: u64,
        timestamp_ms: i64,
    ) -> Self {
        Self {
            strategy_name: strategy_name.into(),
            success: true,
            duration_ms,
            timestamp_ms,
            attempt,
            error_kind: None,
            error_message: None,
        }
    }

    pub fn failure(
        strategy_name: impl Into<String>,
        attempt: u32,
        duration_ms: u64,
        timestamp_ms: i64,
        kind: ErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            strategy_name: strategy_name.into(),
            success: false,
            duration_ms,
            timestamp_ms,
            attempt,
            error_kind: Some(kind),
            error_message: Some(message.into()),
        }
    }
}

/// One step of an execution plan with per-call adjusted budgets
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanEntry {
    pub strategy: Strategy,
    pub effective_timeout_ms: u64,
    pub effective_retries: u32,
}

/// Ordered strategies to try for a single delivery
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionPlan {
    pub network: NetworkCondition,
    pub entries: Vec<PlanEntry>,
}

impl ExecutionPlan {
    pub fn new(network: NetworkCondition, entries: Vec<PlanEntry>) -> Self {
        Self { network, entries }
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.strategy.name.as_str()).collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PlanEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&PlanEntry> {
        self.entries.iter().find(|e| e.strategy.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_parse_accepts_dashes_and_case() {
        assert_eq!("web-rtc".parse::<Capability>(), Ok(Capability::WebRtc));
        assert_eq!("MEDIA_SOURCE".parse::<Capability>(), Ok(Capability::MediaSource));
        assert!("teleport".parse::<Capability>().is_err());
    }

    #[test]
    fn test_capability_set_satisfies() {
        let caps = CapabilitySet::new()
            .with(Capability::Fetch, true)
            .with(Capability::MediaSource, false);

        let mut required = BTreeSet::new();
        assert!(caps.satisfies(&required));

        required.insert(Capability::Fetch);
        assert!(caps.satisfies(&required));

        required.insert(Capability::MediaSource);
        assert!(!caps.satisfies(&required));
    }

    #[test]
    fn test_missing_capability_is_disabled() {
        let caps = CapabilitySet::new();
        assert!(!caps.is_enabled(Capability::WebRtc));
        assert!(caps.enabled().is_empty());
    }

    #[test]
    fn test_strategy_validate() {
        assert!(Strategy::new("direct", 1, 1000, 1).validate().is_ok());
        assert!(Strategy::new("", 1, 1000, 1).validate().is_err());
        assert!(Strategy::new("direct", 1, 0, 1).validate().is_err());
        assert!(Strategy::new("direct", 1, 1000, 0).validate().is_err());
    }

    #[test]
    fn test_network_condition_roundtrip_str() {
        for cond in [
            NetworkCondition::Slow,
            NetworkCondition::Medium,
            NetworkCondition::Fast,
            NetworkCondition::Unknown,
        ] {
            assert_eq!(cond.as_str().parse::<NetworkCondition>(), Ok(cond));
        }
    }
}
