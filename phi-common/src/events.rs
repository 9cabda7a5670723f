//! Event types for the PHI event system
//!
//! Pipeline runs and balance cycles publish progress on an [`EventBus`].
//! Emission is lossy: runs never depend on anyone listening.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// PHI event types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// A pipeline run was started
    PipelineStarted {
        run_id: Uuid,
        stages: usize,
        timestamp: DateTime<Utc>,
    },

    /// A stage was released to run (all dependencies terminal)
    StageStarted {
        run_id: Uuid,
        stage: String,
        timestamp: DateTime<Utc>,
    },

    /// A stage reached its terminal status
    StageFinished {
        run_id: Uuid,
        stage: String,
        status: String,
        score: Option<f64>,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// All stages are terminal and the run has been scored
    PipelineCompleted {
        run_id: Uuid,
        unified_score: f64,
        decision: String,
        degraded: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A balance aggregation cycle finished
    BalanceComputed {
        balance_score: f64,
        dominant: Option<String>,
        timestamp: DateTime<Utc>,
    },
}

impl PipelineEvent {
    /// Run this event belongs to, if any
    pub fn run_id(&self) -> Option<Uuid> {
        match self {
            Self::PipelineStarted { run_id, .. }
            | Self::StageStarted { run_id, .. }
            | Self::StageFinished { run_id, .. }
            | Self::PipelineCompleted { run_id, .. } => Some(*run_id),
            Self::BalanceComputed { .. } => None,
        }
    }
}

/// Broadcast bus for [`PipelineEvent`]s
///
/// Cloning the bus shares the underlying channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PipelineEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before slow subscribers lag
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: PipelineEvent,
    ) -> Result<usize, broadcast::error::SendError<PipelineEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: PipelineEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
