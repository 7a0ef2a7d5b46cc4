use crate::types::{Capability, ErrorKind};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Errors surfaced to callers of the delivery engine
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("No available strategy for capabilities [{}]", join_capabilities(.enabled))]
    NoAvailableStrategy { enabled: Vec<Capability> },

    #[error("Strategy already registered: {0}")]
    DuplicateStrategy(String),

    #[error("Invalid strategy {name}: {reason}")]
    InvalidStrategy { name: String, reason: String },

    #[error(transparent)]
    AggregateFailure(#[from] AggregateFailure),

    #[error("Delivery cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: u32 },

    #[error("Configuration error: {0}")]
    Configuration(String),
}

fn join_capabilities(caps: &[Capability]) -> String {
    caps.iter()
        .map(|c| c.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Failure of a single attempt. Recorded and recovered from, never surfaced
/// on its own.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum AttemptError {
    #[error("timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("{0}")]
    Failure(String),
}

impl AttemptError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AttemptError::Timeout { .. } => ErrorKind::Timeout,
            AttemptError::Failure(_) => ErrorKind::Failure,
        }
    }
}

/// Last known state of one exhausted strategy
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StrategyFailure {
    pub strategy: String,
    pub attempts: u32,
    pub last_error: AttemptError,
}

/// Every strategy in the plan ran out of attempts
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregateFailure {
    pub failures: Vec<StrategyFailure>,
}

impl AggregateFailure {
    pub fn total_attempts(&self) -> u32 {
        self.failures.iter().map(|f| f.attempts).sum()
    }

    pub fn for_strategy(&self, name: &str) -> Option<&StrategyFailure> {
        self.failures.iter().find(|f| f.strategy == name)
    }
}

impl fmt::Display for AggregateFailure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let strategies = self.failures.len();
        if strategies == 1 {
            write!(f, "1 strategy exhausted")?;
        } else {
            write!(f, "All {} strategies exhausted", strategies)?;
        }
        write!(f, " after {}", attempts(self.total_attempts()))?;
        for failure in &self.failures {
            write!(
                f,
                "; {} ({}): {}",
                failure.strategy,
                attempts(failure.attempts),
                failure.last_error
            )?;
        }
        Ok(())
    }
}

fn attempts(n: u32) -> String {
    if n == 1 {
        "1 attempt".to_string()
    } else {
        format!("{} attempts", n)
    }
}

impl std::error::Error for AggregateFailure {}
