//! Testing utilities for CrabStream
//!
//! Provides a scripted transport that plays back per-strategy outcomes, so
//! fallback behaviour can be exercised offline without real media endpoints.

pub mod scripted;

pub use scripted::{ScriptStep, ScriptedTransport};
