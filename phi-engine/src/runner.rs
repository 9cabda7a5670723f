//! Stage Runner
//!
//! Executes a single stage with a timeout and failure isolation. Whatever the
//! stage does (returns an error, panics, hangs, reports an out-of-range
//! score), the runner produces exactly one [`StageResult`] and never returns
//! an error to its caller.
//!
//! # Timeouts
//! The stage computation runs on its own tokio task and races the timeout.
//! When the timeout wins the task is detached, not aborted: it may keep
//! running, but its output is dropped and the recorded result stays
//! `TimedOut`.

use crate::stage::{Stage, Upstream};
use crate::types::{StageResult, StageSpec};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinError;
use tracing::{debug, warn};

/// Reason recorded when a dependency is missing or did not succeed
pub const UNMET_DEPENDENCY: &str = "unmet dependency";

/// Runs one stage per call
#[derive(Debug, Clone, Copy, Default)]
pub struct StageRunner;

impl StageRunner {
    pub fn new() -> Self {
        Self
    }

    /// Run `stage` as configured by `spec`
    ///
    /// # Arguments
    /// * `spec` - Stage configuration (dependencies, timeout)
    /// * `stage` - Stage implementation
    /// * `input` - Pipeline input record
    /// * `upstream` - Finished results, at least those of `spec.depends_on`
    ///
    /// # Returns
    /// The terminal result. If any dependency is absent or not Ok the stage is
    /// not invoked and the result is Failed with reason "unmet dependency".
    pub async fn run(
        &self,
        spec: &StageSpec,
        stage: Arc<dyn Stage>,
        input: Arc<Value>,
        upstream: &Upstream,
    ) -> StageResult {
        let start = Instant::now();

        let unmet: Vec<&str> = spec
            .depends_on
            .iter()
            .filter(|dep| !upstream.get(*dep).is_some_and(StageResult::is_ok))
            .map(String::as_str)
            .collect();

        if !unmet.is_empty() {
            debug!(
                stage = %spec.name,
                unmet = ?unmet,
                "Skipping stage: dependency did not succeed"
            );
            return StageResult::failed(
                &spec.name,
                format!("{}: {}", UNMET_DEPENDENCY, unmet.join(", ")),
                elapsed_ms(start),
            );
        }

        let dependencies: Upstream = spec
            .depends_on
            .iter()
            .filter_map(|dep| upstream.get(dep).map(|r| (dep.clone(), r.clone())))
            .collect();

        let handle = tokio::spawn(async move { stage.compute(&input, &dependencies).await });
        let bound = Duration::from_millis(spec.timeout_ms);

        match tokio::time::timeout(bound, handle).await {
            Err(_) => {
                warn!(
                    stage = %spec.name,
                    timeout_ms = spec.timeout_ms,
                    "Stage timed out, discarding any late result"
                );
                StageResult::timed_out(&spec.name, spec.timeout_ms, elapsed_ms(start))
            }
            Ok(Err(join_error)) => {
                let reason = describe_join_error(join_error);
                warn!(stage = %spec.name, reason = %reason, "Stage task did not complete");
                StageResult::failed(&spec.name, reason, elapsed_ms(start))
            }
            Ok(Ok(Err(e))) => {
                warn!(stage = %spec.name, error = %e, "Stage failed");
                StageResult::failed(&spec.name, e.to_string(), elapsed_ms(start))
            }
            Ok(Ok(Ok(output))) => {
                if !output.score.is_finite() || !(0.0..=1.0).contains(&output.score) {
                    warn!(stage = %spec.name, score = output.score, "Stage returned out-of-range score");
                    return StageResult::failed(
                        &spec.name,
                        format!("invalid score {} (expected [0, 1])", output.score),
                        elapsed_ms(start),
                    );
                }
                let duration_ms = elapsed_ms(start);
                debug!(stage = %spec.name, score = output.score, duration_ms, "Stage succeeded");
                StageResult::ok(&spec.name, output.score, output.payload, duration_ms)
            }
        }
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

fn describe_join_error(error: JoinError) -> String {
    if error.is_panic() {
        let panic = error.into_panic();
        let message = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_string());
        format!("panicked: {}", message)
    } else {
        "cancelled".to_string()
    }
}
