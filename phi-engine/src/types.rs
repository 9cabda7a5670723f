//! Core types shared by the runner, orchestrator and scorer
//!
//! All result values are created fresh per run and never mutated after the
//! run hands them to the caller.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

pub use phi_common::config::StageSpec;

/// Terminal status of one stage in one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StageStatus {
    Ok,
    Failed,
    TimedOut,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageStatus::Ok => write!(f, "Ok"),
            StageStatus::Failed => write!(f, "Failed"),
            StageStatus::TimedOut => write!(f, "TimedOut"),
        }
    }
}

/// Outcome of running one stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    pub stage_name: String,
    pub status: StageStatus,
    /// Score in [0, 1]; present only when `status == Ok`
    pub score: Option<f64>,
    /// Opaque auxiliary data produced by the stage
    pub payload: serde_json::Value,
    pub duration_ms: u64,
    /// Why the stage did not succeed
    pub reason: Option<String>,
}

impl StageResult {
    pub fn ok(
        stage_name: impl Into<String>,
        score: f64,
        payload: serde_json::Value,
        duration_ms: u64,
    ) -> Self {
        Self {
            stage_name: stage_name.into(),
            status: StageStatus::Ok,
            score: Some(score),
            payload,
            duration_ms,
            reason: None,
        }
    }

    pub fn failed(stage_name: impl Into<String>, reason: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            stage_name: stage_name.into(),
            status: StageStatus::Failed,
            score: None,
            payload: serde_json::Value::Null,
            duration_ms,
            reason: Some(reason.into()),
        }
    }

    pub fn timed_out(stage_name: impl Into<String>, timeout_ms: u64, duration_ms: u64) -> Self {
        Self {
            stage_name: stage_name.into(),
            status: StageStatus::TimedOut,
            score: None,
            payload: serde_json::Value::Null,
            duration_ms,
            reason: Some(format!("timed out after {} ms", timeout_ms)),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == StageStatus::Ok
    }
}

/// Discrete outcome derived from the unified score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Decision {
    Reject,
    Hold,
    Accept,
    /// No stage succeeded
    Unknown,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Reject => write!(f, "Reject"),
            Decision::Hold => write!(f, "Hold"),
            Decision::Accept => write!(f, "Accept"),
            Decision::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Result of one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionResult {
    pub run_id: Uuid,
    /// Exactly one entry per configured stage
    pub per_stage: BTreeMap<String, StageResult>,
    /// Weighted mean over successful stages, in [0, 1]
    pub unified_score: f64,
    pub decision: Decision,
    /// True when at least one configured stage is not Ok
    pub degraded: bool,
}

impl FusionResult {
    /// Number of stages that finished Ok
    pub fn ok_count(&self) -> usize {
        self.per_stage.values().filter(|r| r.is_ok()).count()
    }

    /// Names of stages that did not finish Ok, in name order
    pub fn failed_stages(&self) -> Vec<&str> {
        self.per_stage
            .values()
            .filter(|r| !r.is_ok())
            .map(|r| r.stage_name.as_str())
            .collect()
    }
}
