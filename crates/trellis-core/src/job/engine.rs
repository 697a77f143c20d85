//! The job engine: lifecycle, input validation, the sequential run loop,
//! and between-step cancellation.
//!
//! One job runs at a time per `run_job` call; the loop is a plain sequence
//! of `execute_step` calls, and the only suspension point is the tool
//! executor behind the dispatcher. Step *i* commits its state update,
//! execution record, and status transition strictly before step *i+1*
//! observes state.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use trellis_types::job::{
    ExecutionProgress, Job, JobStatus, JobStep, JobStepStatus, StepExecutionResult,
};
use trellis_types::schema::Value;
use trellis_types::variable::{IoType, Variable, is_engine_managed};
use trellis_types::workflow::{StepType, Workflow, WorkflowStep};
use uuid::Uuid;

use crate::event::EventBus;
use crate::schema::{infer_schema, is_compatible};
use crate::tool::{ToolDispatcher, ToolError, ToolOutputs, ToolRegistry};
use crate::workflow::step::execute_step;
use crate::workflow::validation::{
    check_and_fix_missing_variables, validate_variable_mappings, validate_workflow,
};

// ---------------------------------------------------------------------------
// Constants and options
// ---------------------------------------------------------------------------

/// Absolute iteration cap on the run loop, regardless of `maximum_jumps`.
/// Catches configurations where multiple evaluation steps mutually jump.
pub const SAFETY_CAP: usize = 100;

/// Tunables for a `JobEngine`.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Run-loop iteration cap.
    pub safety_cap: usize,
    /// Event bus channel capacity.
    pub event_capacity: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            safety_cap: SAFETY_CAP,
            event_capacity: 1024,
        }
    }
}

/// How much state a reset clears.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetMode {
    /// Clear output values; preserve inputs and engine bookkeeping.
    /// Used when resuming with the same jump counters.
    Soft,
    /// Soft reset plus removal of all evaluation bookkeeping. The default
    /// for user-initiated restarts.
    Hard,
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors surfaced by the job engine's API.
///
/// Per-step failures (tool errors, mapping validation) do not surface
/// here: they are recorded into the step's execution result and the job's
/// `error_message`, and the returned job carries `JobStatus::Failed`.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The workflow or job is malformed prior to execution.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A required input was not provided.
    #[error("required input '{0}' was not provided")]
    MissingRequiredInput(String),

    /// A provided input does not fit the declared schema.
    #[error("input '{name}' is not compatible with its declared schema")]
    InputTypeMismatch { name: String },

    /// Parameter mappings reference unknown variables or incompatible paths.
    #[error("mapping validation failed: {0}")]
    MappingValidation(String),

    /// A tool executor failed; the message is captured verbatim.
    #[error("tool execution error: {0}")]
    ToolExecution(String),

    /// The run-loop safety cap fired.
    #[error("infinite loop suspected: safety cap of {0} iterations reached")]
    InfiniteLoopSuspected(usize),

    /// A cancel signal was observed between steps.
    #[error("Job cancelled by user")]
    Cancelled,

    /// No job with the given id exists.
    #[error("job not found: {0}")]
    JobNotFound(Uuid),
}

// ---------------------------------------------------------------------------
// JobEngine
// ---------------------------------------------------------------------------

/// In-memory job engine.
///
/// Distinct jobs can run in parallel on distinct engine instances sharing
/// no mutable state; within one engine, each `run_job` call drives exactly
/// one job sequentially.
pub struct JobEngine {
    jobs: DashMap<Uuid, Job>,
    dispatcher: ToolDispatcher,
    event_bus: EventBus,
    cancellation_tokens: DashMap<Uuid, CancellationToken>,
    options: EngineOptions,
}

impl JobEngine {
    /// Create an engine with default options.
    pub fn new(registry: Arc<ToolRegistry>, event_bus: EventBus) -> Self {
        Self::with_options(registry, event_bus, EngineOptions::default())
    }

    /// Create an engine with explicit options.
    pub fn with_options(
        registry: Arc<ToolRegistry>,
        event_bus: EventBus,
        options: EngineOptions,
    ) -> Self {
        Self {
            jobs: DashMap::new(),
            dispatcher: ToolDispatcher::new(registry),
            event_bus,
            cancellation_tokens: DashMap::new(),
            options,
        }
    }

    /// The event bus jobs publish on.
    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// The executor registry behind this engine's dispatcher.
    pub fn registry(&self) -> &Arc<ToolRegistry> {
        self.dispatcher.registry()
    }

    /// Register a tool executor, delegating to the registry.
    pub fn register_tool_executor(
        &self,
        tool_id: impl Into<String>,
        executor: Arc<dyn crate::tool::ToolExecutor>,
    ) {
        self.registry().register(tool_id, executor);
    }

    /// Execute a tool directly through the dispatcher, outside any job.
    pub async fn execute_tool(
        &self,
        tool: &trellis_types::tool::Tool,
        parameters: BTreeMap<String, Option<Value>>,
    ) -> Result<ToolOutputs, ToolError> {
        self.dispatcher.dispatch(tool, parameters).await
    }

    // -----------------------------------------------------------------------
    // Creation and lookup
    // -----------------------------------------------------------------------

    /// Create a job from a workflow: a snapshot of its steps and state.
    pub fn create_job(
        &self,
        workflow: &Workflow,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<Job, EngineError> {
        validate_workflow(workflow).map_err(|e| EngineError::Configuration(e.to_string()))?;

        let job = Job {
            job_id: Uuid::now_v7(),
            workflow_id: workflow.workflow_id,
            name: name.unwrap_or(&workflow.name).to_string(),
            description: description
                .map(str::to_string)
                .or_else(|| workflow.description.clone()),
            status: JobStatus::Pending,
            steps: workflow
                .steps
                .iter()
                .cloned()
                .map(JobStep::from_definition)
                .collect(),
            state: workflow.state.clone(),
            input_variables: workflow
                .state
                .iter()
                .filter(|v| v.io_type == IoType::Input)
                .cloned()
                .collect(),
            execution_progress: ExecutionProgress {
                current_step: 0,
                total_steps: workflow.steps.len(),
            },
            error_message: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        };

        tracing::info!(
            job_id = %job.job_id,
            workflow = workflow.name.as_str(),
            steps = job.steps.len(),
            "job created"
        );
        self.jobs.insert(job.job_id, job.clone());
        Ok(job)
    }

    /// A snapshot of the job with the given id.
    pub fn get_job(&self, job_id: Uuid) -> Option<Job> {
        self.jobs.get(&job_id).map(|entry| entry.value().clone())
    }

    /// Snapshots of all jobs held by this engine.
    pub fn list_jobs(&self) -> Vec<Job> {
        self.jobs.iter().map(|entry| entry.value().clone()).collect()
    }

    // -----------------------------------------------------------------------
    // Input initialization
    // -----------------------------------------------------------------------

    /// Validate provided inputs against declared input variables and fold
    /// them into job state. Output values from prior runs are cleared.
    ///
    /// A declared input is required iff its workflow snapshot carries no
    /// value to fall back on.
    fn initialize_job_with_inputs(
        &self,
        job: &mut Job,
        inputs: &BTreeMap<String, Value>,
    ) -> Result<(), EngineError> {
        for declared in &job.input_variables {
            match inputs.get(&declared.name) {
                None => {
                    if declared.value.is_none() {
                        return Err(EngineError::MissingRequiredInput(declared.name.clone()));
                    }
                }
                Some(value) => {
                    let inferred = infer_schema(value);
                    if !is_compatible(&declared.schema, &inferred) {
                        return Err(EngineError::InputTypeMismatch {
                            name: declared.name.clone(),
                        });
                    }
                }
            }
        }

        for variable in &mut job.state {
            if variable.io_type == IoType::Output {
                variable.value = None;
            }
        }

        for (name, value) in inputs {
            if let Some(variable) = job.state.iter_mut().find(|v| v.name == *name) {
                variable.value = Some(value.clone());
            } else {
                job.state.push(
                    Variable::new(name.clone(), infer_schema(value), IoType::Input)
                        .with_value(value.clone()),
                );
            }
        }

        Ok(())
    }

    // -----------------------------------------------------------------------
    // Run loop
    // -----------------------------------------------------------------------

    /// Run a pending job to completion, failure, or cancellation.
    ///
    /// Step failures produce an `Ok` job with `JobStatus::Failed`; errors
    /// returned here mean the job never entered `running`.
    pub async fn run_job(
        &self,
        job_id: Uuid,
        inputs: &BTreeMap<String, Value>,
    ) -> Result<Job, EngineError> {
        let mut job = self
            .get_job(job_id)
            .ok_or(EngineError::JobNotFound(job_id))?;

        if job.status != JobStatus::Pending {
            return Err(EngineError::Configuration(format!(
                "job is {:?}; reset it before rerunning",
                job.status
            )));
        }

        self.initialize_job_with_inputs(&mut job, inputs)?;
        job.state = check_and_fix_missing_variables(
            job.steps.iter().map(|s| &s.definition),
            &job.state,
        );

        // pending -> running
        job.status = JobStatus::Running;
        job.started_at = Some(Utc::now());
        job.completed_at = None;
        job.error_message = None;
        for step in &mut job.steps {
            step.status = JobStepStatus::Pending;
            step.started_at = None;
            step.completed_at = None;
            step.error_message = None;
            step.latest_execution = None;
            step.executions.clear();
        }
        job.execution_progress = ExecutionProgress {
            current_step: 0,
            total_steps: job.steps.len(),
        };
        self.jobs.insert(job_id, job.clone());
        self.event_bus.job_status_changed(job_id, JobStatus::Running);

        let cancel_token = CancellationToken::new();
        self.cancellation_tokens.insert(job_id, cancel_token.clone());

        let definitions: Vec<WorkflowStep> =
            job.steps.iter().map(|s| s.definition.clone()).collect();
        let total_steps = definitions.len();

        tracing::info!(
            job_id = %job_id,
            steps = total_steps,
            "starting job execution"
        );

        let mut current = 0usize;
        let mut iterations = 0usize;
        let outcome: Result<(), EngineError> = loop {
            if current >= total_steps {
                break Ok(());
            }
            // Cancellation is observed between steps.
            if cancel_token.is_cancelled() {
                break Err(EngineError::Cancelled);
            }
            if iterations >= self.options.safety_cap {
                break Err(EngineError::InfiniteLoopSuspected(self.options.safety_cap));
            }
            iterations += 1;
            job.execution_progress.current_step = current;

            let definition = &definitions[current];
            job.steps[current].status = JobStepStatus::Running;
            job.steps[current].started_at = Some(Utc::now());
            self.event_bus
                .step_started(job_id, definition.step_id, current, &definition.label);

            // Mapping validation gates action steps; problems are step
            // failures, not API errors.
            if definition.step_type == StepType::Action {
                let problems = validate_variable_mappings(definition, &job.state);
                if !problems.is_empty() {
                    let error = EngineError::MappingValidation(problems.join("; "));
                    let now = Utc::now();
                    let result = StepExecutionResult {
                        step_id: definition.step_id,
                        success: false,
                        outputs: None,
                        error: Some(error.to_string()),
                        inputs: None,
                        started_at: now,
                        completed_at: now,
                    };
                    self.record_step(&mut job, current, result);
                    self.jobs.insert(job_id, job.clone());
                    break Err(error);
                }
            }

            let outcome = execute_step(&definitions, &job.state, current, &self.dispatcher).await;

            // A cancel that arrived mid-flight discards the in-flight
            // result: it is not recorded, and the step returns to pending.
            if cancel_token.is_cancelled() {
                job.steps[current].status = JobStepStatus::Pending;
                job.steps[current].started_at = None;
                break Err(EngineError::Cancelled);
            }

            let success = outcome.result.success;
            let step_error = outcome.result.error.clone();
            self.record_step(&mut job, current, outcome.result);
            job.state = outcome.updated_state;
            self.event_bus.state_changed(job_id, job.state.len());
            self.jobs.insert(job_id, job.clone());

            if !success {
                break Err(EngineError::ToolExecution(
                    step_error.unwrap_or_else(|| "step failed".to_string()),
                ));
            }
            current = outcome.next_step_index;
        };

        self.cancellation_tokens.remove(&job_id);
        job.execution_progress.current_step = current.min(total_steps);
        job.completed_at = Some(Utc::now());

        match outcome {
            Ok(()) => {
                job.status = JobStatus::Completed;
                tracing::info!(job_id = %job_id, "job completed");
            }
            Err(error) => {
                job.status = JobStatus::Failed;
                job.error_message = Some(match &error {
                    // Step failures carry the step's own message verbatim.
                    EngineError::ToolExecution(message) => message.clone(),
                    other => other.to_string(),
                });
                tracing::warn!(
                    job_id = %job_id,
                    error = job.error_message.as_deref().unwrap_or_default(),
                    "job failed"
                );
            }
        }

        self.event_bus.job_status_changed(job_id, job.status);
        self.jobs.insert(job_id, job.clone());
        Ok(job)
    }

    /// Append an execution record and settle the step's status.
    fn record_step(&self, job: &mut Job, index: usize, result: StepExecutionResult) {
        let duration_ms = (result.completed_at - result.started_at)
            .num_milliseconds()
            .max(0) as u64;
        let step = &mut job.steps[index];
        step.status = if result.success {
            JobStepStatus::Completed
        } else {
            JobStepStatus::Failed
        };
        step.completed_at = Some(result.completed_at);
        step.error_message = result.error.clone();
        step.latest_execution = Some(result.clone());
        self.event_bus.step_completed(
            job.job_id,
            step.definition.step_id,
            index,
            result.success,
            duration_ms,
        );
        step.executions.push(result);
    }

    // -----------------------------------------------------------------------
    // Cancellation and reset
    // -----------------------------------------------------------------------

    /// Signal a running job to stop. The engine observes the signal
    /// between steps; an in-flight tool call finishes but its result is
    /// discarded.
    pub fn cancel_job(&self, job_id: Uuid) -> Result<(), EngineError> {
        if let Some(entry) = self.cancellation_tokens.get(&job_id) {
            entry.value().cancel();
            tracing::info!(job_id = %job_id, "job cancellation requested");
            return Ok(());
        }
        if self.jobs.contains_key(&job_id) {
            return Err(EngineError::Configuration(
                "job is not running".to_string(),
            ));
        }
        Err(EngineError::JobNotFound(job_id))
    }

    /// Reset a terminal job so it can run again.
    ///
    /// Both modes are idempotent. Soft keeps jump counters and evaluation
    /// snapshots; hard removes them.
    pub fn reset_job(&self, job_id: Uuid, mode: ResetMode) -> Result<Job, EngineError> {
        if self.cancellation_tokens.contains_key(&job_id) {
            return Err(EngineError::Configuration(
                "job is running; cancel it before resetting".to_string(),
            ));
        }
        let mut job = self
            .get_job(job_id)
            .ok_or(EngineError::JobNotFound(job_id))?;

        for variable in &mut job.state {
            if variable.io_type == IoType::Output {
                variable.value = None;
            }
        }
        if mode == ResetMode::Hard {
            job.state.retain(|v| {
                v.io_type != IoType::Evaluation && !is_engine_managed(&v.name)
            });
        }

        job.status = JobStatus::Pending;
        job.error_message = None;
        job.started_at = None;
        job.completed_at = None;
        job.execution_progress.current_step = 0;
        for step in &mut job.steps {
            step.status = JobStepStatus::Pending;
            step.started_at = None;
            step.completed_at = None;
            step.error_message = None;
        }

        tracing::info!(job_id = %job_id, mode = ?mode, "job reset");
        self.jobs.insert(job_id, job.clone());
        self.event_bus.job_status_changed(job_id, JobStatus::Pending);
        Ok(job)
    }
}

impl std::fmt::Debug for JobEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobEngine")
            .field("job_count", &self.jobs.len())
            .field("safety_cap", &self.options.safety_cap)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
