//! Fusion Orchestrator
//!
//! Sequences the configured stages, runs independent stages concurrently and
//! hands the collected results to the [`FusionScorer`].
//!
//! # Architecture
//! - **Construction**: validate specs, bind stage implementations, compute a
//!   topological order. Every configuration fault (duplicate name, unknown or
//!   cyclic dependency, bad weight, missing implementation) is reported here,
//!   before anything runs.
//! - **Run**: stages whose dependencies are all terminal are released onto a
//!   `JoinSet`; each finished stage may release its dependents. A dependent
//!   only ever sees finished upstream results, so concurrency changes timing
//!   but never the outcome.
//! - **Score**: once every stage is terminal the full result map is scored.
//!
//! # Example
//! ```rust,ignore
//! let orchestrator = FusionOrchestrator::new(config.stages, registry, config.scoring)?;
//! let result = orchestrator.run_pipeline(serde_json::json!({"scores": {...}})).await;
//! ```

use crate::runner::{StageRunner, UNMET_DEPENDENCY};
use crate::scorer::{FusionScorer, ScoreBands};
use crate::stage::{Stage, Upstream};
use crate::types::{FusionResult, StageResult, StageSpec};
use phi_common::events::{EventBus, PipelineEvent};
use phi_common::{Error, Result};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Stage implementations keyed by stage name
pub type StageRegistry = HashMap<String, Arc<dyn Stage>>;

/// A configured stage bound to its implementation
struct PlannedStage {
    spec: StageSpec,
    stage: Arc<dyn Stage>,
    /// Indices of stages that list this one in `depends_on`
    dependents: Vec<usize>,
}

/// Pipeline orchestrator
pub struct FusionOrchestrator {
    /// In declaration order
    stages: Vec<PlannedStage>,
    /// Topological order (indices into `stages`)
    order: Vec<usize>,
    weights: HashMap<String, f64>,
    scorer: FusionScorer,
    runner: StageRunner,
    event_bus: Option<EventBus>,
}

impl FusionOrchestrator {
    /// Build an orchestrator for `specs`
    ///
    /// # Arguments
    /// * `specs` - Stage specifications in declaration order
    /// * `registry` - Implementation for every stage name in `specs`
    /// * `bands` - Decision band edges
    ///
    /// # Errors
    /// `Error::Config` for any configuration fault; nothing has run yet.
    pub fn new(specs: Vec<StageSpec>, registry: StageRegistry, bands: ScoreBands) -> Result<Self> {
        bands.validate()?;

        if specs.is_empty() {
            return Err(Error::Config("pipeline has no stages".to_string()));
        }

        let mut index: HashMap<&str, usize> = HashMap::with_capacity(specs.len());
        for (i, spec) in specs.iter().enumerate() {
            spec.validate()?;
            if index.insert(spec.name.as_str(), i).is_some() {
                return Err(Error::Config(format!("duplicate stage name '{}'", spec.name)));
            }
        }

        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); specs.len()];
        for (i, spec) in specs.iter().enumerate() {
            let mut seen = HashSet::new();
            for dep in &spec.depends_on {
                if !seen.insert(dep.as_str()) {
                    return Err(Error::Config(format!(
                        "stage '{}' lists dependency '{}' more than once",
                        spec.name, dep
                    )));
                }
                let dep_index = *index.get(dep.as_str()).ok_or_else(|| {
                    Error::Config(format!(
                        "stage '{}' depends on unknown stage '{}'",
                        spec.name, dep
                    ))
                })?;
                dependents[dep_index].push(i);
            }
        }

        let order = topological_order(&specs, &dependents)?;

        let mut registry = registry;
        let mut stages = Vec::with_capacity(specs.len());
        for (spec, dependents) in specs.into_iter().zip(dependents) {
            let stage = registry.remove(&spec.name).ok_or_else(|| {
                Error::Config(format!("no implementation registered for stage '{}'", spec.name))
            })?;
            stages.push(PlannedStage {
                spec,
                stage,
                dependents,
            });
        }

        let weights = stages
            .iter()
            .map(|s| (s.spec.name.clone(), s.spec.weight))
            .collect();

        debug!(
            order = ?order.iter().map(|&i| stages[i].spec.name.as_str()).collect::<Vec<_>>(),
            "Pipeline planned"
        );

        Ok(Self {
            stages,
            order,
            weights,
            scorer: FusionScorer::new(bands),
            runner: StageRunner::new(),
            event_bus: None,
        })
    }

    /// Publish progress events on `event_bus`
    pub fn with_events(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Stage names in a valid execution order
    pub fn execution_order(&self) -> Vec<&str> {
        self.order
            .iter()
            .map(|&i| self.stages[i].spec.name.as_str())
            .collect()
    }

    /// Stage names in declaration order
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.spec.name.as_str()).collect()
    }

    /// Configured stage specifications in declaration order
    pub fn specs(&self) -> impl Iterator<Item = &StageSpec> {
        self.stages.iter().map(|s| &s.spec)
    }

    pub fn bands(&self) -> ScoreBands {
        self.scorer.bands()
    }

    /// Run every configured stage once and score the outcome
    ///
    /// Never fails: stage failures and timeouts are recorded in the result
    /// and reflected by `degraded`.
    pub async fn run_pipeline(&self, input: Value) -> FusionResult {
        let run_id = Uuid::new_v4();
        let start = Instant::now();
        let input = Arc::new(input);

        info!(%run_id, stages = self.stages.len(), "Pipeline run started");
        self.emit_event(PipelineEvent::PipelineStarted {
            run_id,
            stages: self.stages.len(),
            timestamp: chrono::Utc::now(),
        });

        let mut pending: Vec<usize> = self
            .stages
            .iter()
            .map(|s| s.spec.depends_on.len())
            .collect();
        let mut released = vec![false; self.stages.len()];
        let mut results: BTreeMap<String, StageResult> = BTreeMap::new();
        let mut join_set = JoinSet::new();

        for &i in &self.order {
            if pending[i] == 0 {
                released[i] = true;
                self.release(&mut join_set, run_id, i, &input, &results);
            }
        }

        while let Some(joined) = join_set.join_next().await {
            let (i, result) = match joined {
                Ok(finished) => finished,
                Err(e) => {
                    error!(%run_id, error = %e, "Stage task aborted");
                    continue;
                }
            };

            self.emit_event(PipelineEvent::StageFinished {
                run_id,
                stage: result.stage_name.clone(),
                status: result.status.to_string(),
                score: result.score,
                duration_ms: result.duration_ms,
                timestamp: chrono::Utc::now(),
            });
            results.insert(self.stages[i].spec.name.clone(), result);

            for &dependent in &self.stages[i].dependents {
                pending[dependent] -= 1;
                if pending[dependent] == 0 {
                    released[dependent] = true;
                    self.release(&mut join_set, run_id, dependent, &input, &results);
                }
            }
        }

        // Exactly one result per configured stage, even if a task was lost
        for (i, planned) in self.stages.iter().enumerate() {
            let name = &planned.spec.name;
            if !results.contains_key(name) {
                let reason = if released[i] {
                    "stage task aborted".to_string()
                } else {
                    format!("{}: upstream task aborted", UNMET_DEPENDENCY)
                };
                results.insert(name.clone(), StageResult::failed(name, reason, 0));
            }
        }

        let score = self.scorer.score(&self.weights, &results);
        let duration_ms = start.elapsed().as_millis() as u64;

        info!(
            %run_id,
            unified_score = score.unified_score,
            decision = %score.decision,
            degraded = score.degraded,
            duration_ms,
            "Pipeline run complete"
        );

        self.emit_event(PipelineEvent::PipelineCompleted {
            run_id,
            unified_score: score.unified_score,
            decision: score.decision.to_string(),
            degraded: score.degraded,
            duration_ms,
            timestamp: chrono::Utc::now(),
        });

        FusionResult {
            run_id,
            per_stage: results,
            unified_score: score.unified_score,
            decision: score.decision,
            degraded: score.degraded,
        }
    }

    /// Spawn stage `i`; all of its dependencies are already in `results`
    fn release(
        &self,
        join_set: &mut JoinSet<(usize, StageResult)>,
        run_id: Uuid,
        i: usize,
        input: &Arc<Value>,
        results: &BTreeMap<String, StageResult>,
    ) {
        let planned = &self.stages[i];
        let upstream: Upstream = planned
            .spec
            .depends_on
            .iter()
            .filter_map(|dep| results.get(dep).map(|r| (dep.clone(), r.clone())))
            .collect();

        debug!(%run_id, stage = %planned.spec.name, "Releasing stage");
        self.emit_event(PipelineEvent::StageStarted {
            run_id,
            stage: planned.spec.name.clone(),
            timestamp: chrono::Utc::now(),
        });

        let spec = planned.spec.clone();
        let stage = Arc::clone(&planned.stage);
        let input = Arc::clone(input);
        let runner = self.runner;
        join_set.spawn(async move { (i, runner.run(&spec, stage, input, &upstream).await) });
    }

    /// Emit event if bus configured
    fn emit_event(&self, event: PipelineEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit_lossy(event);
        }
    }
}

/// Kahn's algorithm, seeded in declaration order so the result is stable
fn topological_order(specs: &[StageSpec], dependents: &[Vec<usize>]) -> Result<Vec<usize>> {
    let mut indegree: Vec<usize> = specs.iter().map(|s| s.depends_on.len()).collect();
    let mut queue: VecDeque<usize> = (0..specs.len()).filter(|&i| indegree[i] == 0).collect();
    let mut order = Vec::with_capacity(specs.len());

    while let Some(i) = queue.pop_front() {
        order.push(i);
        for &child in &dependents[i] {
            indegree[child] -= 1;
            if indegree[child] == 0 {
                queue.push_back(child);
            }
        }
    }

    if order.len() != specs.len() {
        let cyclic: Vec<&str> = (0..specs.len())
            .filter(|&i| indegree[i] > 0)
            .map(|i| specs[i].name.as_str())
            .collect();
        return Err(Error::Config(format!(
            "dependency cycle detected among stages: {}",
            cyclic.join(", ")
        )));
    }

    Ok(order)
}
