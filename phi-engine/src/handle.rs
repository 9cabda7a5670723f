//! Reloadable pipeline handle
//!
//! Runs take a snapshot of the active orchestrator and never hold the lock
//! while stages execute, so a reload only waits for other snapshot reads and
//! in-flight runs finish on the configuration they started with.

use crate::orchestrator::{FusionOrchestrator, StageRegistry};
use crate::scorer::ScoreBands;
use crate::types::{FusionResult, StageSpec};
use phi_common::events::EventBus;
use phi_common::Result;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Shared, reloadable access to a [`FusionOrchestrator`]
#[derive(Clone)]
pub struct PipelineHandle {
    registry: StageRegistry,
    event_bus: Option<EventBus>,
    active: Arc<RwLock<Arc<FusionOrchestrator>>>,
}

impl PipelineHandle {
    /// Build the initial orchestrator
    ///
    /// The registry is kept so later reloads can bind the same implementations.
    pub fn new(
        specs: Vec<StageSpec>,
        registry: StageRegistry,
        bands: ScoreBands,
        event_bus: Option<EventBus>,
    ) -> Result<Self> {
        let orchestrator = build(specs, &registry, bands, event_bus.clone())?;
        Ok(Self {
            registry,
            event_bus,
            active: Arc::new(RwLock::new(Arc::new(orchestrator))),
        })
    }

    /// Snapshot of the active orchestrator
    pub async fn current(&self) -> Arc<FusionOrchestrator> {
        Arc::clone(&*self.active.read().await)
    }

    /// Run the pipeline on the active configuration
    pub async fn run(&self, input: Value) -> FusionResult {
        let orchestrator = self.current().await;
        orchestrator.run_pipeline(input).await
    }

    /// Replace the active configuration
    ///
    /// The new orchestrator is fully validated before the swap; on error the
    /// previous configuration stays active.
    pub async fn reload(&self, specs: Vec<StageSpec>, bands: ScoreBands) -> Result<()> {
        let orchestrator = build(specs, &self.registry, bands, self.event_bus.clone())?;
        let stages = orchestrator.stage_names().len();
        *self.active.write().await = Arc::new(orchestrator);
        info!(stages, "Pipeline configuration reloaded");
        Ok(())
    }
}

fn build(
    specs: Vec<StageSpec>,
    registry: &StageRegistry,
    bands: ScoreBands,
    event_bus: Option<EventBus>,
) -> Result<FusionOrchestrator> {
    let bound: StageRegistry = specs
        .iter()
        .filter_map(|spec| {
            registry
                .get(&spec.name)
                .map(|stage| (spec.name.clone(), Arc::clone(stage)))
        })
        .collect();
    let orchestrator = FusionOrchestrator::new(specs, bound, bands)?;
    Ok(match event_bus {
        Some(bus) => orchestrator.with_events(bus),
        None => orchestrator,
    })
}
