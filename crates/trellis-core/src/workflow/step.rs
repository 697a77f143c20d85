//! Single-step execution: the atomic unit of progress.
//!
//! `execute_step_simple` runs one step against a workflow value and
//! returns the updated state, an execution record, and the index of the
//! next step. It never mutates its arguments; the caller (normally the job
//! engine) owns committing the returned state.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use trellis_types::job::StepExecutionResult;
use trellis_types::schema::Value;
use trellis_types::tool::{PROMPT_TEMPLATE_PARAM, ToolType};
use trellis_types::variable::Variable;
use trellis_types::workflow::{StepType, Workflow, WorkflowStep};

use crate::tool::ToolDispatcher;

use super::binding::{apply_step_outputs, resolved_parameters};
use super::evaluation::{NextAction, evaluate_conditions, manage_jump_count};

/// Outcome of executing a single step.
#[derive(Debug)]
pub struct StepOutcome {
    /// State reflecting every mutation for this step, including jump
    /// counters and evaluation bookkeeping.
    pub updated_state: Vec<Variable>,
    /// The execution record for history.
    pub result: StepExecutionResult,
    /// Index the run loop should execute next.
    pub next_step_index: usize,
}

/// Execute one step of a workflow value.
pub async fn execute_step_simple(
    workflow: &Workflow,
    step_index: usize,
    dispatcher: &ToolDispatcher,
) -> StepOutcome {
    execute_step(&workflow.steps, &workflow.state, step_index, dispatcher).await
}

/// Execute one step against an explicit step list and state.
///
/// The job engine calls this form directly with its snapshotted step
/// definitions.
pub async fn execute_step(
    steps: &[WorkflowStep],
    state: &[Variable],
    step_index: usize,
    dispatcher: &ToolDispatcher,
) -> StepOutcome {
    let started_at = Utc::now();

    let Some(step) = steps.get(step_index) else {
        return StepOutcome {
            updated_state: state.to_vec(),
            result: StepExecutionResult {
                step_id: uuid::Uuid::nil(),
                success: false,
                outputs: None,
                error: Some("Invalid step index".to_string()),
                inputs: None,
                started_at,
                completed_at: Utc::now(),
            },
            next_step_index: step_index + 1,
        };
    };

    // Previous values of this step's outputs must not leak into this run.
    let state = clear_step_outputs(step, state);

    match step.step_type {
        StepType::Evaluation => execute_evaluation_step(step, state, step_index, steps.len()),
        StepType::Action => execute_action_step(step, state, step_index, dispatcher).await,
    }
}

// ---------------------------------------------------------------------------
// Evaluation steps
// ---------------------------------------------------------------------------

fn execute_evaluation_step(
    step: &WorkflowStep,
    state: Vec<Variable>,
    step_index: usize,
    total_steps: usize,
) -> StepOutcome {
    let started_at = Utc::now();
    let outcome = evaluate_conditions(step, &state);

    let mut outputs = BTreeMap::from([
        (
            "next_action".to_string(),
            Value::String(outcome.next_action.as_str().to_string()),
        ),
        ("reason".to_string(), Value::String(outcome.reason.clone())),
    ]);

    let (state, next_step_index) = match (outcome.next_action, outcome.target_step_index) {
        (NextAction::Jump, Some(target)) => {
            // The counter is committed to state before the target is read.
            let decision = manage_jump_count(step, &state, step_index, target, &outcome.reason);
            outputs.insert(
                "target_step_index".to_string(),
                Value::Number(target as f64),
            );
            outputs.insert(
                "max_jumps_reached".to_string(),
                Value::Bool(!decision.can_jump),
            );
            outputs.insert(
                "_jump_info".to_string(),
                Value::String(
                    serde_json::to_string(&decision.jump_info).unwrap_or_default(),
                ),
            );
            let next = decision.jump_info.to_step;
            (decision.updated_state, next)
        }
        (NextAction::End, _) => (state, total_steps),
        _ => (state, step_index + 1),
    };

    match apply_step_outputs(step, &outputs, &state) {
        Ok(updated_state) => StepOutcome {
            updated_state,
            result: StepExecutionResult {
                step_id: step.step_id,
                success: true,
                outputs: Some(outputs),
                error: None,
                inputs: None,
                started_at,
                completed_at: Utc::now(),
            },
            next_step_index,
        },
        Err(error) => StepOutcome {
            updated_state: state,
            result: StepExecutionResult {
                step_id: step.step_id,
                success: false,
                outputs: None,
                error: Some(error.to_string()),
                inputs: None,
                started_at,
                completed_at: Utc::now(),
            },
            next_step_index: step_index + 1,
        },
    }
}

// ---------------------------------------------------------------------------
// Action steps
// ---------------------------------------------------------------------------

async fn execute_action_step(
    step: &WorkflowStep,
    state: Vec<Variable>,
    step_index: usize,
    dispatcher: &ToolDispatcher,
) -> StepOutcome {
    let started_at = Utc::now();

    let Some(tool) = &step.tool else {
        return StepOutcome {
            updated_state: state,
            result: StepExecutionResult {
                step_id: step.step_id,
                success: false,
                outputs: None,
                error: Some("No tool configured for this step".to_string()),
                inputs: None,
                started_at,
                completed_at: Utc::now(),
            },
            next_step_index: step_index + 1,
        };
    };

    let mut parameters = resolved_parameters(step, &state);
    if tool.tool_type == ToolType::Llm {
        if let Some(template_id) = &step.prompt_template_id {
            parameters.insert(
                PROMPT_TEMPLATE_PARAM.to_string(),
                Some(Value::String(template_id.clone())),
            );
        }
    }

    // Captured before execution so the record survives failures.
    let captured_inputs = parameters.clone();

    match dispatcher.dispatch(tool, parameters).await {
        Ok(outputs) => match apply_step_outputs(step, &outputs, &state) {
            Ok(updated_state) => StepOutcome {
                updated_state,
                result: StepExecutionResult {
                    step_id: step.step_id,
                    success: true,
                    outputs: Some(outputs),
                    error: None,
                    inputs: Some(captured_inputs),
                    started_at,
                    completed_at: Utc::now(),
                },
                next_step_index: step_index + 1,
            },
            Err(error) => StepOutcome {
                updated_state: state,
                result: StepExecutionResult {
                    step_id: step.step_id,
                    success: false,
                    outputs: Some(outputs),
                    error: Some(error.to_string()),
                    inputs: Some(captured_inputs),
                    started_at,
                    completed_at: Utc::now(),
                },
                next_step_index: step_index + 1,
            },
        },
        Err(error) => StepOutcome {
            // Failure keeps the post-clear snapshot.
            updated_state: state,
            result: StepExecutionResult {
                step_id: step.step_id,
                success: false,
                outputs: None,
                error: Some(error.to_string()),
                inputs: Some(captured_inputs),
                started_at,
                completed_at: Utc::now(),
            },
            next_step_index: step_index + 1,
        },
    }
}

// ---------------------------------------------------------------------------
// Output clearing
// ---------------------------------------------------------------------------

/// Clear the values of every variable this step writes, plus the
/// evaluation snapshot for evaluation steps. Inputs and jump counters are
/// untouched.
pub fn clear_step_outputs(step: &WorkflowStep, state: &[Variable]) -> Vec<Variable> {
    let eval_name = step.eval_variable_name();
    let mut targets: BTreeSet<&str> = step
        .output_mappings
        .values()
        .map(String::as_str)
        .collect();
    if step.step_type == StepType::Evaluation {
        targets.insert(eval_name.as_str());
    }

    let mut cleared = state.to_vec();
    for variable in &mut cleared {
        if targets.contains(variable.name.as_str()) {
            variable.value = None;
        }
    }
    cleared
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventBus;
    use crate::tool::builtin::{echo_tool, register_builtin_tools};
    use crate::tool::registry::ToolRegistry;
    use std::sync::Arc;
    use trellis_types::schema::Schema;
    use trellis_types::variable::IoType;
    use trellis_types::workflow::{
        Condition, ConditionOperator, DefaultAction, EvaluationConfig, WorkflowStatus,
    };
    use uuid::Uuid;

    fn dispatcher() -> ToolDispatcher {
        let registry = Arc::new(ToolRegistry::new(EventBus::new(4)));
        register_builtin_tools(&registry);
        ToolDispatcher::new(registry)
    }

    fn echo_step(input_path: &str, output_variable: &str) -> WorkflowStep {
        WorkflowStep {
            step_id: Uuid::now_v7(),
            sequence_number: 0,
            step_type: StepType::Action,
            label: "echo".to_string(),
            description: None,
            tool: Some(echo_tool()),
            tool_id: Some("echo".to_string()),
            prompt_template_id: None,
            parameter_mappings: BTreeMap::from([(
                "input".to_string(),
                input_path.to_string(),
            )]),
            output_mappings: BTreeMap::from([(
                "output".to_string(),
                output_variable.to_string(),
            )]),
            evaluation_config: None,
        }
    }

    fn evaluation_step(conditions: Vec<Condition>, maximum_jumps: u32) -> WorkflowStep {
        WorkflowStep {
            step_id: Uuid::now_v7(),
            sequence_number: 1,
            step_type: StepType::Evaluation,
            label: "branch".to_string(),
            description: None,
            tool: None,
            tool_id: None,
            prompt_template_id: None,
            parameter_mappings: BTreeMap::new(),
            output_mappings: BTreeMap::new(),
            evaluation_config: Some(EvaluationConfig {
                conditions,
                default_action: DefaultAction::Continue,
                maximum_jumps,
            }),
        }
    }

    fn workflow(steps: Vec<WorkflowStep>, state: Vec<Variable>) -> Workflow {
        Workflow {
            workflow_id: Uuid::now_v7(),
            name: "test".to_string(),
            description: None,
            status: WorkflowStatus::Active,
            steps,
            state,
        }
    }

    // -----------------------------------------------------------------------
    // Invalid index
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn invalid_index_fails_without_state_change() {
        let wf = workflow(vec![], vec![]);
        let outcome = execute_step_simple(&wf, 3, &dispatcher()).await;
        assert!(!outcome.result.success);
        assert_eq!(outcome.result.error.as_deref(), Some("Invalid step index"));
        assert_eq!(outcome.next_step_index, 4);
        assert!(outcome.updated_state.is_empty());
    }

    // -----------------------------------------------------------------------
    // Action steps
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn action_step_writes_output_and_advances() {
        let state = vec![
            Variable::new("x", Schema::string(), IoType::Input).with_value(Value::from("hi")),
            Variable::new("y", Schema::string(), IoType::Output),
        ];
        let wf = workflow(vec![echo_step("x", "y")], state);
        let outcome = execute_step_simple(&wf, 0, &dispatcher()).await;

        assert!(outcome.result.success);
        assert_eq!(outcome.next_step_index, 1);
        assert_eq!(
            outcome
                .updated_state
                .iter()
                .find(|v| v.name == "y")
                .unwrap()
                .value,
            Some(Value::from("hi"))
        );
        // Inputs were captured at execution time.
        let inputs = outcome.result.inputs.unwrap();
        assert_eq!(inputs.get("input"), Some(&Some(Value::from("hi"))));
        // The workflow argument itself is untouched.
        assert!(wf.state.iter().find(|v| v.name == "y").unwrap().value.is_none());
    }

    #[tokio::test]
    async fn action_without_tool_fails() {
        let mut step = echo_step("x", "y");
        step.tool = None;
        let wf = workflow(
            vec![step],
            vec![Variable::new("y", Schema::string(), IoType::Output)],
        );
        let outcome = execute_step_simple(&wf, 0, &dispatcher()).await;
        assert!(!outcome.result.success);
        assert_eq!(
            outcome.result.error.as_deref(),
            Some("No tool configured for this step")
        );
        assert_eq!(outcome.next_step_index, 1);
    }

    #[tokio::test]
    async fn action_failure_keeps_cleared_state_and_advances() {
        let mut step = echo_step("x", "y");
        // Point at a tool id with no registered executor.
        step.tool.as_mut().unwrap().tool_id = "unregistered".to_string();
        let state = vec![
            Variable::new("x", Schema::string(), IoType::Input).with_value(Value::from("hi")),
            Variable::new("y", Schema::string(), IoType::Output)
                .with_value(Value::from("stale")),
        ];
        let wf = workflow(vec![step], state);
        let outcome = execute_step_simple(&wf, 0, &dispatcher()).await;

        assert!(!outcome.result.success);
        assert!(outcome.result.error.as_deref().unwrap().contains("no executor"));
        // The stale output value was cleared and stays cleared.
        assert!(
            outcome
                .updated_state
                .iter()
                .find(|v| v.name == "y")
                .unwrap()
                .value
                .is_none()
        );
        // Inputs are captured even for failed runs.
        assert!(outcome.result.inputs.is_some());
        assert_eq!(outcome.next_step_index, 1);
    }

    #[tokio::test]
    async fn unresolved_parameter_still_executes() {
        let state = vec![Variable::new("y", Schema::string(), IoType::Output)];
        let wf = workflow(vec![echo_step("ghost", "y")], state);
        let outcome = execute_step_simple(&wf, 0, &dispatcher()).await;
        // The executor saw the null marker and echoed an empty string.
        assert!(outcome.result.success);
        assert_eq!(
            outcome.result.inputs.as_ref().unwrap().get("input"),
            Some(&None)
        );
    }

    // -----------------------------------------------------------------------
    // Evaluation steps
    // -----------------------------------------------------------------------

    fn jump_condition(variable: &str, value: &str, target: usize) -> Condition {
        Condition {
            condition_id: Uuid::now_v7(),
            variable: variable.to_string(),
            operator: ConditionOperator::Equals,
            value: Value::from(value),
            target_step_index: Some(target),
        }
    }

    #[tokio::test]
    async fn evaluation_continue_writes_snapshot() {
        let step = evaluation_step(vec![], 3);
        let eval_name = step.eval_variable_name();
        let wf = workflow(vec![echo_step("x", "y"), step], vec![]);
        let outcome = execute_step_simple(&wf, 1, &dispatcher()).await;

        assert!(outcome.result.success);
        assert_eq!(outcome.next_step_index, 2);
        let snapshot = outcome
            .updated_state
            .iter()
            .find(|v| v.name == eval_name)
            .expect("snapshot should be written");
        let map = snapshot.value.as_ref().unwrap().as_object().unwrap();
        assert_eq!(map.get("next_action"), Some(&Value::from("continue")));
    }

    #[tokio::test]
    async fn evaluation_jump_updates_counter_and_annotates() {
        let step = evaluation_step(vec![jump_condition("y", "again", 0)], 3);
        let counter_name = step.jump_count_variable_name();
        let state = vec![
            Variable::new("y", Schema::string(), IoType::Output)
                .with_value(Value::from("again")),
        ];
        let wf = workflow(vec![echo_step("x", "y"), step], state);
        let outcome = execute_step_simple(&wf, 1, &dispatcher()).await;

        assert_eq!(outcome.next_step_index, 0);
        let outputs = outcome.result.outputs.unwrap();
        assert_eq!(outputs.get("next_action"), Some(&Value::from("jump")));
        assert_eq!(outputs.get("max_jumps_reached"), Some(&Value::from(false)));
        let info = outputs.get("_jump_info").and_then(Value::as_str).unwrap();
        assert!(info.contains("\"to_step\":0"));

        let counter = outcome
            .updated_state
            .iter()
            .find(|v| v.name == counter_name)
            .expect("counter should be committed");
        assert_eq!(counter.value, Some(Value::from(1.0)));
    }

    #[tokio::test]
    async fn evaluation_jump_denied_after_maximum() {
        let step = evaluation_step(vec![jump_condition("y", "again", 0)], 0);
        let state = vec![
            Variable::new("y", Schema::string(), IoType::Output)
                .with_value(Value::from("again")),
        ];
        let wf = workflow(vec![echo_step("x", "y"), step], state);
        let outcome = execute_step_simple(&wf, 1, &dispatcher()).await;

        // maximum_jumps = 0: the first attempted jump is denied.
        assert_eq!(outcome.next_step_index, 2);
        let outputs = outcome.result.outputs.unwrap();
        assert_eq!(outputs.get("max_jumps_reached"), Some(&Value::from(true)));
    }

    #[tokio::test]
    async fn evaluation_end_routes_past_last_step() {
        let mut step = evaluation_step(vec![], 3);
        step.evaluation_config.as_mut().unwrap().default_action = DefaultAction::End;
        let wf = workflow(vec![echo_step("x", "y"), step, echo_step("x", "y")], vec![]);
        let outcome = execute_step_simple(&wf, 1, &dispatcher()).await;
        assert_eq!(outcome.next_step_index, 3);
    }

    // -----------------------------------------------------------------------
    // clear_step_outputs
    // -----------------------------------------------------------------------

    #[test]
    fn clear_only_touches_this_steps_outputs() {
        let step = echo_step("x", "y");
        let state = vec![
            Variable::new("x", Schema::string(), IoType::Input).with_value(Value::from("keep")),
            Variable::new("y", Schema::string(), IoType::Output)
                .with_value(Value::from("stale")),
            Variable::new("z", Schema::string(), IoType::Output)
                .with_value(Value::from("other")),
        ];
        let cleared = clear_step_outputs(&step, &state);
        assert_eq!(cleared[0].value, Some(Value::from("keep")));
        assert!(cleared[1].value.is_none());
        assert_eq!(cleared[2].value, Some(Value::from("other")));
    }

    #[test]
    fn clear_resets_evaluation_snapshot_but_not_counter() {
        let step = evaluation_step(vec![], 3);
        let state = vec![
            Variable::new(step.eval_variable_name(), Schema::string(), IoType::Evaluation)
                .with_value(Value::from("old")),
            Variable::new(
                step.jump_count_variable_name(),
                Schema::number(),
                IoType::Evaluation,
            )
            .with_value(Value::from(2.0)),
        ];
        let cleared = clear_step_outputs(&step, &state);
        assert!(cleared[0].value.is_none());
        assert_eq!(cleared[1].value, Some(Value::from(2.0)));
    }
}
