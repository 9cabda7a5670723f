//! Stage trait and stage-level error types
//!
//! A stage is any external collaborator able to compute a bounded score from
//! the pipeline input (and the results of the stages it depends on). Stages
//! are injected per name into the orchestrator.

use crate::types::StageResult;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// Results of a stage's declared dependencies, keyed by stage name
pub type Upstream = HashMap<String, StageResult>;

/// Stage capability: compute a bounded score from an input
///
/// # Example
/// ```rust,ignore
/// use phi_engine::stage::{Stage, StageError, StageOutput, Upstream};
///
/// pub struct ContrastStage;
///
/// #[async_trait::async_trait]
/// impl Stage for ContrastStage {
///     async fn compute(&self, input: &Value, _upstream: &Upstream) -> Result<StageOutput, StageError> {
///         let contrast = input["contrast"].as_f64()
///             .ok_or_else(|| StageError::MissingInput("contrast".into()))?;
///         Ok(StageOutput::new(contrast.clamp(0.0, 1.0)))
///     }
/// }
/// ```
#[async_trait]
pub trait Stage: Send + Sync {
    /// Compute this stage's score
    ///
    /// # Arguments
    /// * `input` - Pipeline input record (shared by every stage in the run)
    /// * `upstream` - Ok results of this stage's dependencies
    ///
    /// # Errors
    /// Any error is recorded as a Failed result; it never aborts the run.
    async fn compute(&self, input: &Value, upstream: &Upstream) -> Result<StageOutput, StageError>;
}

/// Successful stage output before validation
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutput {
    /// Must lie in [0, 1]
    pub score: f64,
    pub payload: Value,
}

impl StageOutput {
    pub fn new(score: f64) -> Self {
        Self {
            score,
            payload: Value::Null,
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }
}

/// Stage computation error
#[derive(Debug, Error)]
pub enum StageError {
    /// Required field absent from the input record
    #[error("Missing input: {0}")]
    MissingInput(String),

    /// Input present but unusable
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Computation itself failed
    #[error("Computation failed: {0}")]
    Computation(String),

    /// Anything else raised by a collaborator
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Stage that reports a score computed ahead of time by an external analyzer
///
/// Reads `input["scores"][name]` and, when present, `input["payloads"][name]`.
#[derive(Debug, Clone)]
pub struct RecordedScoreStage {
    name: String,
}

impl RecordedScoreStage {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl Stage for RecordedScoreStage {
    async fn compute(&self, input: &Value, _upstream: &Upstream) -> Result<StageOutput, StageError> {
        let raw = input
            .get("scores")
            .and_then(|scores| scores.get(&self.name))
            .ok_or_else(|| StageError::MissingInput(format!("scores.{}", self.name)))?;

        let score = raw.as_f64().ok_or_else(|| {
            StageError::InvalidInput(format!("scores.{} is not a number: {}", self.name, raw))
        })?;

        let payload = input
            .get("payloads")
            .and_then(|payloads| payloads.get(&self.name))
            .cloned()
            .unwrap_or(Value::Null);

        Ok(StageOutput::new(score).with_payload(payload))
    }
}

// ============================================================================
// Mock Stages for Testing
// ============================================================================

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// Returns a fixed score after an optional delay and counts invocations
    pub struct MockStage {
        pub score: f64,
        pub delay: Duration,
        pub should_fail: bool,
        pub calls: Arc<AtomicUsize>,
    }

    impl MockStage {
        pub fn new(score: f64) -> Self {
            Self {
                score,
                delay: Duration::ZERO,
                should_fail: false,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        pub fn failing() -> Self {
            Self {
                should_fail: true,
                ..Self::new(0.0)
            }
        }

        pub fn slow(score: f64, delay: Duration) -> Self {
            Self {
                delay,
                ..Self::new(score)
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Stage for MockStage {
        async fn compute(&self, _input: &Value, _upstream: &Upstream) -> Result<StageOutput, StageError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.should_fail {
                Err(StageError::Computation("Mock failure".to_string()))
            } else {
                Ok(StageOutput::new(self.score))
            }
        }
    }

    /// Panics on every call
    pub struct PanickingStage;

    #[async_trait]
    impl Stage for PanickingStage {
        async fn compute(&self, _input: &Value, _upstream: &Upstream) -> Result<StageOutput, StageError> {
            panic!("stage blew up");
        }
    }
}
