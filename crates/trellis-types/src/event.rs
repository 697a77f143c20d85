//! Event types for the Trellis engine event bus.
//!
//! `EngineEvent` is the unified event type broadcast while jobs execute.
//! External persistence layers subscribe to it instead of the engine
//! writing to storage itself. All variants are Clone + Send + Sync for use
//! with tokio broadcast channels.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::job::JobStatus;

/// Events emitted during job execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A job transitioned between lifecycle states.
    JobStatusChanged { job_id: Uuid, status: JobStatus },

    /// A step is about to execute.
    StepStarted {
        job_id: Uuid,
        step_id: Uuid,
        step_index: usize,
        label: String,
    },

    /// A step finished executing.
    StepCompleted {
        job_id: Uuid,
        step_id: Uuid,
        step_index: usize,
        success: bool,
        duration_ms: u64,
    },

    /// Job state changed after a step committed its outputs.
    StateChanged {
        job_id: Uuid,
        variable_count: usize,
    },

    /// A tool executor registration replaced a different executor.
    ExecutorReplaced { tool_id: String },
}
