//! phi-engine library interface
//!
//! Decision-fusion and weighted-aggregation engine:
//! - `runner` executes one stage with timeout and failure isolation
//! - `orchestrator` sequences stages by dependency and scores the run
//! - `scorer` turns per-stage results into a unified score and decision
//! - `balance` combines four category metrics into a balance score
//! - `handle` wraps an orchestrator for configuration reload

pub mod balance;
pub mod handle;
pub mod orchestrator;
pub mod runner;
pub mod scorer;
pub mod stage;
pub mod types;

pub use balance::{BalanceAggregator, BalanceResult, Category, CategoryMetric, MetricInput};
pub use handle::PipelineHandle;
pub use orchestrator::{FusionOrchestrator, StageRegistry};
pub use runner::StageRunner;
pub use scorer::{FusionScore, FusionScorer, ScoreBands};
pub use stage::{RecordedScoreStage, Stage, StageError, StageOutput, Upstream};
pub use types::{Decision, FusionResult, StageResult, StageSpec, StageStatus};
