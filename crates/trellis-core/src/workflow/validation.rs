//! Structural validation and state self-healing.
//!
//! `validate_workflow` rejects malformed blueprints before a job is
//! created; `validate_variable_mappings` gates each action step before it
//! executes; `check_and_fix_missing_variables` creates the output
//! destinations a run needs so output writing always has a target.

use std::collections::BTreeSet;

use trellis_types::schema::Schema;
use trellis_types::tool::{PROMPT_TEMPLATE_PARAM, ToolType};
use trellis_types::variable::{IoType, Variable, is_engine_managed};
use trellis_types::workflow::{StepType, Workflow, WorkflowStep};
use uuid::Uuid;

use crate::path::{self, VariablePath};
use crate::schema::{default_value, is_compatible};

use super::WorkflowError;

// ---------------------------------------------------------------------------
// Workflow validation
// ---------------------------------------------------------------------------

/// Validate structural constraints on a workflow blueprint.
///
/// Checks:
/// - Name is non-empty
/// - All step IDs are unique
/// - All variable names are unique
/// - No user-authored variables in the engine's bookkeeping namespace
/// - Evaluation steps carry no tool; jump targets are within range
///   (a target equal to the step count means "end")
pub fn validate_workflow(workflow: &Workflow) -> Result<(), WorkflowError> {
    if workflow.name.is_empty() {
        return Err(WorkflowError::Validation(
            "workflow name must not be empty".to_string(),
        ));
    }

    let mut seen_steps = BTreeSet::new();
    for step in &workflow.steps {
        if !seen_steps.insert(step.step_id) {
            return Err(WorkflowError::Validation(format!(
                "duplicate step id: '{}'",
                step.step_id
            )));
        }
    }

    let mut seen_variables = BTreeSet::new();
    for variable in &workflow.state {
        if !seen_variables.insert(variable.name.as_str()) {
            return Err(WorkflowError::Validation(format!(
                "duplicate variable name: '{}'",
                variable.name
            )));
        }
        if variable.io_type == IoType::Evaluation || is_engine_managed(&variable.name) {
            return Err(WorkflowError::Validation(format!(
                "variable '{}' uses the engine-managed evaluation namespace",
                variable.name
            )));
        }
    }

    for (index, step) in workflow.steps.iter().enumerate() {
        if step.step_type == StepType::Evaluation {
            if step.tool.is_some() {
                return Err(WorkflowError::Validation(format!(
                    "evaluation step {index} must not carry a tool"
                )));
            }
            if let Some(config) = &step.evaluation_config {
                for condition in &config.conditions {
                    if let Some(target) = condition.target_step_index {
                        if target > workflow.steps.len() {
                            return Err(WorkflowError::Validation(format!(
                                "condition '{}' targets step {target}, past the end of the workflow",
                                condition.condition_id
                            )));
                        }
                    }
                }
            }
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Mapping validation
// ---------------------------------------------------------------------------

/// Validate a step's parameter and output mappings against state.
///
/// Returns the collected problems; an empty vector means the step may
/// execute. Callers surface non-empty results as step failure.
pub fn validate_variable_mappings(step: &WorkflowStep, state: &[Variable]) -> Vec<String> {
    let mut errors = Vec::new();

    let Some(tool) = &step.tool else {
        return errors;
    };

    // Required parameters need a mapping, a default, or (for LLM tools)
    // the step-level prompt template injection.
    for parameter in &tool.signature.parameters {
        if !parameter.required || step.parameter_mappings.contains_key(&parameter.name) {
            continue;
        }
        if parameter.default.is_some() {
            continue;
        }
        let injected = tool.tool_type == ToolType::Llm
            && parameter.name == PROMPT_TEMPLATE_PARAM
            && step.prompt_template_id.is_some();
        if !injected {
            errors.push(format!(
                "required parameter '{}' has no mapping",
                parameter.name
            ));
        }
    }

    // Every mapping must parse, resolve to a known variable, walk its
    // schema, and land on a compatible sub-schema.
    for (parameter_name, mapping) in &step.parameter_mappings {
        let parsed = match VariablePath::parse(mapping) {
            Ok(parsed) => parsed,
            Err(error) => {
                errors.push(format!("parameter '{parameter_name}': {error}"));
                continue;
            }
        };
        let Some(variable) = state.iter().find(|v| v.name == parsed.root_name) else {
            errors.push(format!(
                "parameter '{parameter_name}': unknown variable '{}'",
                parsed.root_name
            ));
            continue;
        };
        let sub_schema = match path::validate_against_schema(&variable.schema, &parsed.prop_path)
        {
            Ok(sub_schema) => sub_schema,
            Err(error) => {
                errors.push(format!("parameter '{parameter_name}': {error}"));
                continue;
            }
        };
        if let Some(parameter) = tool.signature.parameter(parameter_name) {
            if !is_compatible(&parameter.schema, sub_schema) {
                errors.push(format!(
                    "parameter '{parameter_name}': path '{mapping}' is not compatible with the declared schema"
                ));
            }
        }
    }

    // Two output mappings writing the same variable would make the final
    // value depend on traversal order; reject the configuration instead.
    let mut seen_targets = BTreeSet::new();
    for target in step.output_mappings.values() {
        if !seen_targets.insert(target.as_str()) {
            errors.push(format!(
                "output variable '{target}' is written by more than one output mapping"
            ));
        }
    }

    errors
}

// ---------------------------------------------------------------------------
// Self-healing
// ---------------------------------------------------------------------------

/// Create placeholder variables for output-mapping targets missing from
/// state, so output writing always has a destination.
///
/// The schema comes from the matching tool output definition when one is
/// declared (sub-path aware); otherwise a scalar string. The value is the
/// schema's default. Failing instead would prevent schema-authored
/// workflows from running on jobs created before the new outputs existed.
pub fn check_and_fix_missing_variables<'a>(
    steps: impl IntoIterator<Item = &'a WorkflowStep>,
    state: &[Variable],
) -> Vec<Variable> {
    let mut healed = state.to_vec();
    for step in steps {
        for (output_path, variable_name) in &step.output_mappings {
            if healed.iter().any(|v| v.name == *variable_name) {
                continue;
            }
            let schema = output_target_schema(step, output_path).unwrap_or_else(Schema::string);
            tracing::debug!(
                step_id = %step.step_id,
                variable = variable_name.as_str(),
                "creating missing output variable"
            );
            healed.push(Variable {
                name: variable_name.clone(),
                variable_id: Uuid::now_v7(),
                value: Some(default_value(&schema)),
                schema,
                io_type: IoType::Output,
                description: None,
            });
        }
    }
    healed
}

/// The declared schema behind an output mapping path, if the tool declares
/// one.
fn output_target_schema(step: &WorkflowStep, output_path: &str) -> Option<Schema> {
    let parsed = VariablePath::parse(output_path).ok()?;
    let declared = step.tool.as_ref()?.signature.output(&parsed.root_name)?;
    if parsed.is_whole_variable() {
        Some(declared.schema.clone())
    } else {
        path::validate_against_schema(&declared.schema, &parsed.prop_path)
            .ok()
            .cloned()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
