//! Condition evaluation and jump-count bookkeeping for evaluation steps.
//!
//! Conditions are checked in declared order; the first truthy one wins.
//! Jumps are gated by a per-step counter variable so a misconfigured
//! workflow cannot loop more than `maximum_jumps` times through the same
//! evaluation step.

use serde::{Deserialize, Serialize};
use trellis_types::schema::{Schema, Value};
use trellis_types::variable::{IoType, Variable};
use trellis_types::workflow::{
    Condition, ConditionOperator, DEFAULT_MAXIMUM_JUMPS, DefaultAction, WorkflowStep,
};
use uuid::Uuid;

use crate::path::{self, VariablePath};

// ---------------------------------------------------------------------------
// EvaluationOutcome
// ---------------------------------------------------------------------------

/// What an evaluation step decided to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextAction {
    Continue,
    Jump,
    End,
}

impl NextAction {
    /// Wire form, matching the serde rename.
    pub fn as_str(self) -> &'static str {
        match self {
            NextAction::Continue => "continue",
            NextAction::Jump => "jump",
            NextAction::End => "end",
        }
    }
}

/// Result of evaluating a step's conditions.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationOutcome {
    /// The chosen action.
    pub next_action: NextAction,
    /// Jump target, present iff `next_action` is `Jump`.
    pub target_step_index: Option<usize>,
    /// Why this action was chosen.
    pub reason: String,
}

impl EvaluationOutcome {
    fn action(next_action: NextAction, reason: impl Into<String>) -> Self {
        Self {
            next_action,
            target_step_index: None,
            reason: reason.into(),
        }
    }
}

/// Evaluate a step's conditions against the variable store.
///
/// Jump admission is NOT decided here -- the caller gates the returned
/// target through [`manage_jump_count`].
pub fn evaluate_conditions(step: &WorkflowStep, state: &[Variable]) -> EvaluationOutcome {
    let Some(config) = &step.evaluation_config else {
        return EvaluationOutcome::action(NextAction::Continue, "No evaluation configuration");
    };

    if config.conditions.is_empty() {
        return default_outcome(config.default_action, "No conditions configured");
    }

    for condition in &config.conditions {
        let parsed = match VariablePath::parse(&condition.variable) {
            Ok(parsed) => parsed,
            Err(error) => {
                tracing::debug!(
                    step_id = %step.step_id,
                    condition_id = %condition.condition_id,
                    error = %error,
                    "skipping condition with unparseable variable path"
                );
                continue;
            }
        };
        let resolution = path::resolve(state, &parsed);
        let Some(actual) = resolution.value else {
            tracing::debug!(
                step_id = %step.step_id,
                condition_id = %condition.condition_id,
                variable = condition.variable.as_str(),
                "skipping condition with unresolved variable"
            );
            continue;
        };

        if condition_holds(condition, actual) {
            let reason = format!(
                "condition '{} {} {}' was satisfied",
                condition.variable,
                condition.operator,
                render(&condition.value)
            );
            return match condition.target_step_index {
                Some(target) => EvaluationOutcome {
                    next_action: NextAction::Jump,
                    target_step_index: Some(target),
                    reason,
                },
                None => EvaluationOutcome::action(NextAction::Continue, reason),
            };
        }
    }

    default_outcome(config.default_action, "No condition matched")
}

fn default_outcome(action: DefaultAction, reason: &str) -> EvaluationOutcome {
    match action {
        DefaultAction::Continue => EvaluationOutcome::action(NextAction::Continue, reason),
        DefaultAction::End => EvaluationOutcome::action(NextAction::End, reason),
    }
}

// ---------------------------------------------------------------------------
// Operator semantics
// ---------------------------------------------------------------------------

fn condition_holds(condition: &Condition, actual: &Value) -> bool {
    let expected = &condition.value;
    match condition.operator {
        ConditionOperator::Equals => loosely_equals(actual, expected),
        ConditionOperator::NotEquals => !loosely_equals(actual, expected),
        ConditionOperator::GreaterThan => compare_numeric(actual, expected)
            .map(|(a, b)| a > b)
            .unwrap_or(false),
        ConditionOperator::LessThan => compare_numeric(actual, expected)
            .map(|(a, b)| a < b)
            .unwrap_or(false),
        ConditionOperator::Contains => string_contains(actual, expected),
        ConditionOperator::NotContains => !string_contains(actual, expected),
    }
}

/// Equality with boolean-aware and number-aware string coercion:
/// `"true"` equals `true`, `"5"` equals `5`; everything else is strict.
fn loosely_equals(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    match (a, b) {
        (Value::String(s), Value::Bool(flag)) | (Value::Bool(flag), Value::String(s)) => {
            matches!((s.as_str(), flag), ("true", true) | ("false", false))
        }
        (Value::String(s), Value::Number(n)) | (Value::Number(n), Value::String(s)) => {
            s.trim().parse::<f64>().is_ok_and(|parsed| parsed == *n)
        }
        _ => false,
    }
}

/// Both sides as numbers, parsing strings; anything unparseable fails.
fn compare_numeric(a: &Value, b: &Value) -> Option<(f64, f64)> {
    Some((numeric(a)?, numeric(b)?))
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => Some(*n),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Substring test; defined only for string operands.
fn string_contains(haystack: &Value, needle: &Value) -> bool {
    match (haystack, needle) {
        (Value::String(h), Value::String(n)) => h.contains(n.as_str()),
        _ => false,
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

// ---------------------------------------------------------------------------
// Jump counting
// ---------------------------------------------------------------------------

/// Audit record for a jump decision, stringified into evaluation outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JumpInfo {
    /// Whether the jump was admitted.
    pub is_jump: bool,
    /// Index of the evaluation step.
    pub from_step: usize,
    /// Where execution actually goes next.
    pub to_step: usize,
    /// The admitting condition's reason, or the denial explanation.
    pub reason: String,
}

/// Result of gating a jump through the per-step counter.
#[derive(Debug)]
pub struct JumpDecision {
    /// Counter value after this decision.
    pub jump_count: u32,
    /// Whether the jump was admitted.
    pub can_jump: bool,
    /// State with the counter variable updated (or inserted).
    pub updated_state: Vec<Variable>,
    /// Audit record for this decision.
    pub jump_info: JumpInfo,
}

/// Gate a requested jump through the step's `jump_count_<short>` counter.
///
/// While the counter is below `maximum_jumps` the jump is admitted and the
/// counter increments; otherwise the jump is denied and execution routes to
/// `from + 1`. The counter update is committed into `updated_state` before
/// the caller reads the target.
pub fn manage_jump_count(
    step: &WorkflowStep,
    state: &[Variable],
    from: usize,
    to: usize,
    reason: &str,
) -> JumpDecision {
    let maximum_jumps = step
        .evaluation_config
        .as_ref()
        .map(|config| config.maximum_jumps)
        .unwrap_or(DEFAULT_MAXIMUM_JUMPS);

    let counter_name = step.jump_count_variable_name();
    let current = state
        .iter()
        .find(|v| v.name == counter_name)
        .and_then(|v| v.value.as_ref())
        .and_then(Value::as_number)
        .unwrap_or(0.0) as u32;

    let can_jump = current < maximum_jumps;
    let jump_count = if can_jump { current + 1 } else { current };

    let mut updated_state = state.to_vec();
    let counter_value = Value::Number(jump_count as f64);
    if let Some(variable) = updated_state.iter_mut().find(|v| v.name == counter_name) {
        variable.value = Some(counter_value);
    } else {
        updated_state.push(Variable {
            name: counter_name,
            variable_id: Uuid::now_v7(),
            schema: Schema::number(),
            value: Some(counter_value),
            io_type: IoType::Evaluation,
            description: None,
        });
    }

    let jump_info = JumpInfo {
        is_jump: can_jump,
        from_step: from,
        to_step: if can_jump { to } else { from + 1 },
        reason: if can_jump {
            reason.to_string()
        } else {
            format!("maximum jumps ({maximum_jumps}) reached; continuing to step {}", from + 1)
        },
    };

    if !can_jump {
        tracing::debug!(
            step_id = %step.step_id,
            maximum_jumps,
            "jump denied by counter"
        );
    }

    JumpDecision {
        jump_count,
        can_jump,
        updated_state,
        jump_info,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
