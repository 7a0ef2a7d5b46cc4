//! Runtime invariants with a contract log
//!
//! Engine code asserts its invariants through [`assert_invariant!`]. Every
//! check is remembered per thread so contract tests can prove that a code
//! path actually exercised the invariants it is supposed to protect.
//!
//! ```rust,ignore
//! use crabstream::assert_invariant;
//!
//! assert_invariant!(
//!     (0.0..=1.0).contains(&rate),
//!     "Success rate stays within [0, 1]",
//!     "metrics"
//! );
//!
//! #[test]
//! fn contract_metrics() {
//!     crabstream::invariant_ppt::contract_test("metrics", &[
//!         "Success rate stays within [0, 1]",
//!     ]);
//! }
//! ```

use std::cell::RefCell;
use std::collections::HashMap;
use std::thread_local;

thread_local! {
    static INVARIANT_LOG: RefCell<HashMap<String, usize>> = RefCell::new(HashMap::new());
}

/// Assert an invariant and log it for contract testing.
///
/// Panics with the invariant message and optional context when the condition
/// is false.
#[macro_export]
macro_rules! assert_invariant {
    ($condition:expr, $message:expr) => {
        $crate::invariant_ppt::__assert_invariant_impl($condition, $message, None)
    };
    ($condition:expr, $message:expr, $context:expr) => {
        $crate::invariant_ppt::__assert_invariant_impl($condition, $message, Some($context))
    };
}

#[doc(hidden)]
pub fn __assert_invariant_impl(condition: bool, message: &str, context: Option<&str>) {
    INVARIANT_LOG.with(|log| {
        *log.borrow_mut().entry(message.to_string()).or_insert(0) += 1;
    });

    if !condition {
        let ctx = context.unwrap_or("unknown");
        panic!("INVARIANT VIOLATION [{}]: {}", ctx, message);
    }
}

/// Panics unless every listed invariant was checked on this thread.
pub fn contract_test(test_name: &str, required_invariants: &[&str]) {
    let missing: Vec<&str> = INVARIANT_LOG.with(|log| {
        let log = log.borrow();
        required_invariants
            .iter()
            .filter(|inv| !log.contains_key(**inv))
            .copied()
            .collect()
    });

    if !missing.is_empty() {
        panic!(
            "CONTRACT FAILURE [{}]: The following invariants were not checked:\n  - {}",
            test_name,
            missing.join("\n  - ")
        );
    }
}

/// How many times an invariant was checked on this thread
pub fn invariant_check_count(message: &str) -> usize {
    INVARIANT_LOG.with(|log| log.borrow().get(message).copied().unwrap_or(0))
}

/// Clear the invariant log
pub fn clear_invariant_log() {
    INVARIANT_LOG.with(|log| {
        log.borrow_mut().clear();
    });
}

/// Invariant messages asserted by the engine
pub mod invariants {
    pub const SUCCESS_RATE_BOUNDED: &str = "Success rate stays within [0, 1]";
    pub const HISTORY_BOUNDED: &str = "Attempt history never exceeds its capacity";
    pub const CATALOG_NAMES_UNIQUE: &str = "Catalog strategy names are unique";
    pub const PLAN_ONLY_AVAILABLE: &str =
        "Plan contains only strategies whose capabilities are satisfied";
    pub const ATTEMPT_RESOLVED_ONCE: &str = "Each attempt resolves exactly once";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_passes_after_check() {
        clear_invariant_log();
        crate::assert_invariant!(true, "test invariant", "tests");
        contract_test("passes", &["test invariant"]);
        assert_eq!(invariant_check_count("test invariant"), 1);
    }

    #[test]
    #[should_panic(expected = "CONTRACT FAILURE")]
    fn test_contract_fails_when_unchecked() {
        clear_invariant_log();
        contract_test("fails", &["never checked"]);
    }

    #[test]
    #[should_panic(expected = "INVARIANT VIOLATION [tests]")]
    fn test_violation_panics() {
        crate::assert_invariant!(false, "always false", "tests");
    }
}
