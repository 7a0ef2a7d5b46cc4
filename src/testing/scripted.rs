//! Scripted delivery operations
//!
//! Each strategy gets a queue of [`ScriptStep`]s; every attempt pops the next
//! step. An exhausted queue fails the attempt.

use crate::executor::AttemptContext;
use crate::types::Strategy;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptStep {
    Succeed { after_ms: u64 },
    Fail { after_ms: u64, message: String },
    /// Never completes on its own
    Hang,
    /// Succeeds from a detached task that ignores abandonment, so its result
    /// may arrive after the attempt was already settled
    LateSuccess { after_ms: u64 },
    /// Detached work that stops as soon as the attempt is abandoned
    Cooperative { after_ms: u64 },
}

impl ScriptStep {
    pub fn ok() -> Self {
        ScriptStep::Succeed { after_ms: 0 }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        ScriptStep::Fail {
            after_ms: 0,
            message: message.into(),
        }
    }
}

/// Parses `ok`, `fail`, `hang`, `late`, `coop`, each optionally suffixed with
/// `@<ms>` (e.g. `ok@200`, `fail@50`).
impl FromStr for ScriptStep {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (kind, after_ms) = match s.split_once('@') {
            Some((kind, ms)) => {
                let ms = ms
                    .parse::<u64>()
                    .map_err(|e| format!("invalid delay in step '{}': {}", s, e))?;
                (kind, ms)
            }
            None => (s, 0),
        };
        match kind {
            "ok" => Ok(ScriptStep::Succeed { after_ms }),
            "fail" => Ok(ScriptStep::Fail {
                after_ms,
                message: "scripted failure".to_string(),
            }),
            "hang" => Ok(ScriptStep::Hang),
            "late" => Ok(ScriptStep::LateSuccess { after_ms }),
            "coop" => Ok(ScriptStep::Cooperative { after_ms }),
            other => Err(format!("unknown script step: {}", other)),
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    discarded: AtomicUsize,
    cancelled: AtomicUsize,
}

/// Shared, cloneable scripted operation source
#[derive(Debug, Clone, Default)]
pub struct ScriptedTransport {
    scripts: Arc<Mutex<HashMap<String, VecDeque<ScriptStep>>>>,
    calls: Arc<Mutex<Vec<(String, u32)>>>,
    counters: Arc<Counters>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue steps for a strategy, after any already queued
    pub fn with_script<I>(self, strategy: &str, steps: I) -> Self
    where
        I: IntoIterator<Item = ScriptStep>,
    {
        self.push_steps(strategy, steps);
        self
    }

    pub fn push_steps<I>(&self, strategy: &str, steps: I)
    where
        I: IntoIterator<Item = ScriptStep>,
    {
        let mut scripts = self.scripts.lock().unwrap_or_else(PoisonError::into_inner);
        scripts
            .entry(strategy.to_string())
            .or_default()
            .extend(steps);
    }

    /// `(strategy, attempt)` pairs in call order
    pub fn calls(&self) -> Vec<(String, u32)> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Results produced after their attempt had been abandoned
    pub fn discarded_results(&self) -> usize {
        self.counters.discarded.load(Ordering::SeqCst)
    }

    /// Detached operations that observed abandonment and stopped
    pub fn cancelled_operations(&self) -> usize {
        self.counters.cancelled.load(Ordering::SeqCst)
    }

    fn next_step(&self, strategy: &str) -> Option<ScriptStep> {
        self.scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(strategy)
            .and_then(|queue| queue.pop_front())
    }

    /// Operation for one attempt; usable directly as an operation factory
    pub fn operation(
        &self,
        strategy: &Strategy,
        context: AttemptContext,
    ) -> impl Future<Output = Result<String, String>> + Send + 'static {
        let name = strategy.name.clone();
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((name.clone(), context.attempt));
        let step = self.next_step(&name);
        let counters = Arc::clone(&self.counters);

        async move {
            let payload = format!("{}#{}", name, context.attempt);
            match step {
                None => Err(format!("no scripted outcome for {}", name)),
                Some(ScriptStep::Succeed { after_ms }) => {
                    delay(after_ms).await;
                    Ok(payload)
                }
                Some(ScriptStep::Fail { after_ms, message }) => {
                    delay(after_ms).await;
                    Err(message)
                }
                Some(ScriptStep::Hang) => {
                    std::future::pending::<()>().await;
                    Err("unreachable".to_string())
                }
                Some(ScriptStep::LateSuccess { after_ms }) => {
                    let (tx, rx) = oneshot::channel();
                    tokio::spawn(async move {
                        tokio::time::sleep(Duration::from_millis(after_ms)).await;
                        if tx.send(payload).is_err() {
                            counters.discarded.fetch_add(1, Ordering::SeqCst);
                        }
                    });
                    rx.await.map_err(|_| "detached task dropped".to_string())
                }
                Some(ScriptStep::Cooperative { after_ms }) => {
                    let (tx, rx) = oneshot::channel();
                    let token = context.cancellation();
                    tokio::spawn(async move {
                        tokio::select! {
                            _ = token.cancelled() => {
                                counters.cancelled.fetch_add(1, Ordering::SeqCst);
                            }
                            _ = tokio::time::sleep(Duration::from_millis(after_ms)) => {
                                let _ = tx.send(payload);
                            }
                        }
                    });
                    rx.await.map_err(|_| "operation cancelled".to_string())
                }
            }
        }
    }
}

async fn delay(ms: u64) {
    if ms > 0 {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}
