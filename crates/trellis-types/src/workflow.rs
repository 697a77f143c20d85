//! Workflow domain types: the immutable blueprint of steps and variables.
//!
//! A `Workflow` is a blueprint; executing one produces a `Job` (see the
//! `job` module) that snapshots the steps and carries the mutable state.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::Value;
use crate::tool::Tool;
use crate::variable::{EVAL_PREFIX, JUMP_COUNT_PREFIX, Variable};

/// Default jump allowance for an evaluation step.
pub const DEFAULT_MAXIMUM_JUMPS: u32 = 3;

fn default_maximum_jumps() -> u32 {
    DEFAULT_MAXIMUM_JUMPS
}

// ---------------------------------------------------------------------------
// Step kinds and branching configuration
// ---------------------------------------------------------------------------

/// The kind of a workflow step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    /// Invoke a tool.
    Action,
    /// Evaluate conditions and branch.
    Evaluation,
}

/// Comparison applied by a branching condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    Contains,
    NotContains,
}

impl fmt::Display for ConditionOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConditionOperator::Equals => "equals",
            ConditionOperator::NotEquals => "not_equals",
            ConditionOperator::GreaterThan => "greater_than",
            ConditionOperator::LessThan => "less_than",
            ConditionOperator::Contains => "contains",
            ConditionOperator::NotContains => "not_contains",
        };
        f.write_str(name)
    }
}

/// What an evaluation step does when no condition fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultAction {
    /// Proceed to the next step in sequence.
    Continue,
    /// End the workflow.
    End,
}

/// A single branching condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Stable identifier for diagnostics.
    pub condition_id: Uuid,
    /// Dotted variable path whose resolved value is compared.
    pub variable: String,
    /// Comparison operator.
    pub operator: ConditionOperator,
    /// Right-hand side of the comparison.
    pub value: Value,
    /// Step index to jump to when the condition fires; `None` continues.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_step_index: Option<usize>,
}

/// Branching configuration of an evaluation step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Conditions, checked in declared order; the first match wins.
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Applied when no condition fires.
    pub default_action: DefaultAction,
    /// Maximum number of jumps this step may take in a single run.
    #[serde(default = "default_maximum_jumps")]
    pub maximum_jumps: u32,
}

// ---------------------------------------------------------------------------
// WorkflowStep
// ---------------------------------------------------------------------------

/// One ordered unit of work.
///
/// `parameter_mappings` maps a tool parameter name to a dotted variable
/// path; `output_mappings` maps a tool output path (possibly dotted into a
/// structured output) to a state variable name. Both are `BTreeMap`s, so
/// traversal is lexicographic by key and diagnostics are reproducible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    /// Stable step identifier.
    pub step_id: Uuid,
    /// Position in the authored order.
    pub sequence_number: u32,
    /// Action or evaluation.
    pub step_type: StepType,
    /// Short human-readable label.
    pub label: String,
    /// Optional longer description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// The tool invoked by an action step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<Tool>,
    /// Registry key of the tool (kept alongside the embedded descriptor).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_id: Option<String>,
    /// Prompt template for LLM tools, injected at dispatch time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_template_id: Option<String>,
    /// Tool parameter name -> dotted variable path.
    #[serde(default)]
    pub parameter_mappings: BTreeMap<String, String>,
    /// Tool output path -> state variable name.
    #[serde(default)]
    pub output_mappings: BTreeMap<String, String>,
    /// Branching configuration, present on evaluation steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation_config: Option<EvaluationConfig>,
}

impl WorkflowStep {
    /// First 8 characters of the hyphenated step id, used to name
    /// engine-managed bookkeeping variables.
    pub fn short_step_id(&self) -> String {
        self.step_id.to_string().chars().take(8).collect()
    }

    /// Name of the evaluation-snapshot variable for this step.
    pub fn eval_variable_name(&self) -> String {
        format!("{EVAL_PREFIX}{}", self.short_step_id())
    }

    /// Name of the jump-counter variable for this step.
    pub fn jump_count_variable_name(&self) -> String {
        format!("{JUMP_COUNT_PREFIX}{}", self.short_step_id())
    }
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// Authoring status of a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Draft,
    Active,
    Archived,
}

/// Immutable blueprint: ordered steps plus initial variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    /// Stable workflow identifier.
    pub workflow_id: Uuid,
    /// Human-readable workflow name.
    pub name: String,
    /// Optional longer description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Authoring status.
    pub status: WorkflowStatus,
    /// Ordered step definitions.
    pub steps: Vec<WorkflowStep>,
    /// Initial variable state.
    #[serde(default)]
    pub state: Vec<Variable>,
}

impl Workflow {
    /// Look up a state variable by name.
    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.state.iter().find(|v| v.name == name)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
