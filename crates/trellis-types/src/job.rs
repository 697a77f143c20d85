//! Job domain types: the runtime record of executing a workflow once.
//!
//! A `Job` snapshots a workflow's steps and initial state at creation time
//! and accumulates lifecycle transitions, per-step execution history, and
//! mutable variable state as the engine drives it.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::Value;
use crate::variable::{IoType, Variable};
use crate::workflow::WorkflowStep;

// ---------------------------------------------------------------------------
// Status enums
// ---------------------------------------------------------------------------

/// Overall lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Status of an individual step within a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStepStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

// ---------------------------------------------------------------------------
// StepExecutionResult
// ---------------------------------------------------------------------------

/// Record of one execution of one step.
///
/// `inputs` captures the resolved parameter bindings as observed at the
/// moment of execution -- an unresolved binding is recorded as `None` --
/// and is kept for failed runs too, so post-hoc display never has to
/// re-resolve against mutated state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepExecutionResult {
    /// The executed step.
    pub step_id: Uuid,
    /// Whether the step succeeded.
    pub success: bool,
    /// Coerced tool outputs (or evaluation outputs), keyed by output name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<BTreeMap<String, Value>>,
    /// Failure message, present iff `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Resolved parameter bindings captured before execution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inputs: Option<BTreeMap<String, Option<Value>>>,
    /// When execution started.
    pub started_at: DateTime<Utc>,
    /// When execution finished.
    pub completed_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// JobStep and Job
// ---------------------------------------------------------------------------

/// Progress indicator for UI consumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionProgress {
    /// Index of the step the engine is on (or stopped at).
    pub current_step: usize,
    /// Total number of steps in the job.
    pub total_steps: usize,
}

/// A workflow step as snapshotted into a job, plus its execution history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStep {
    /// The snapshotted step definition.
    #[serde(flatten)]
    pub definition: WorkflowStep,
    /// Current status of this step.
    pub status: JobStepStatus,
    /// When the most recent execution started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the most recent execution finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Failure message from the most recent execution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// The most recent execution record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_execution: Option<StepExecutionResult>,
    /// All execution records for this step, oldest first. A step can run
    /// more than once when an evaluation step jumps back over it.
    #[serde(default)]
    pub executions: Vec<StepExecutionResult>,
}

impl JobStep {
    /// Snapshot a workflow step into a pending job step.
    pub fn from_definition(definition: WorkflowStep) -> Self {
        Self {
            definition,
            status: JobStepStatus::Pending,
            started_at: None,
            completed_at: None,
            error_message: None,
            latest_execution: None,
            executions: Vec::new(),
        }
    }
}

/// Runtime record of executing a workflow once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Stable job identifier.
    pub job_id: Uuid,
    /// The workflow this job was created from.
    pub workflow_id: Uuid,
    /// Human-readable name (defaults to the workflow's).
    pub name: String,
    /// Optional longer description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Lifecycle status.
    pub status: JobStatus,
    /// Snapshotted steps with execution history.
    pub steps: Vec<JobStep>,
    /// Mutable variable state.
    #[serde(default)]
    pub state: Vec<Variable>,
    /// Declared input variables (snapshot of the workflow's inputs).
    #[serde(default)]
    pub input_variables: Vec<Variable>,
    /// Step progress.
    pub execution_progress: ExecutionProgress,
    /// Failure message, present when `status` is `Failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// When the job was created.
    pub created_at: DateTime<Utc>,
    /// When the most recent run started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the most recent run finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Look up a state variable by name.
    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.state.iter().find(|v| v.name == name)
    }

    /// Look up a step by its id.
    pub fn step(&self, step_id: Uuid) -> Option<&JobStep> {
        self.steps.iter().find(|s| s.definition.step_id == step_id)
    }

    /// Declared input variables currently present in state.
    pub fn state_inputs(&self) -> impl Iterator<Item = &Variable> {
        self.state.iter().filter(|v| v.io_type == IoType::Input)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
