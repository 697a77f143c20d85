//! Parameter binding and output writing.
//!
//! Binding resolves a step's parameter mappings against the variable store;
//! writing routes tool outputs back into state through the step's output
//! mappings. Both return new values and leave their inputs untouched.

use std::collections::BTreeMap;

use trellis_types::schema::Value;
use trellis_types::variable::{IoType, Variable};
use trellis_types::workflow::{StepType, WorkflowStep};
use uuid::Uuid;

use crate::path::{self, VariablePath};
use crate::schema::infer_schema;

use super::WorkflowError;

// ---------------------------------------------------------------------------
// Parameter binding
// ---------------------------------------------------------------------------

/// Resolve a step's parameter mappings against the variable store.
///
/// An unresolvable or undefined path binds `None` -- the engine's marker
/// for "no value", distinct from anything a user can supply. A diagnostic
/// is recorded but binding never aborts; mapping validation is the
/// gatekeeper.
pub fn resolved_parameters(
    step: &WorkflowStep,
    state: &[Variable],
) -> BTreeMap<String, Option<Value>> {
    let mut resolved = BTreeMap::new();
    for (parameter, mapping) in &step.parameter_mappings {
        let value = match VariablePath::parse(mapping) {
            Ok(parsed) => {
                let resolution = path::resolve(state, &parsed);
                if let Some(error) = &resolution.error {
                    tracing::debug!(
                        step_id = %step.step_id,
                        parameter = parameter.as_str(),
                        mapping = mapping.as_str(),
                        error = error.as_str(),
                        "parameter path did not resolve"
                    );
                }
                resolution.value.cloned()
            }
            Err(error) => {
                tracing::debug!(
                    step_id = %step.step_id,
                    parameter = parameter.as_str(),
                    mapping = mapping.as_str(),
                    error = %error,
                    "parameter mapping failed to parse"
                );
                None
            }
        };
        resolved.insert(parameter.clone(), value);
    }
    resolved
}

// ---------------------------------------------------------------------------
// Output writing
// ---------------------------------------------------------------------------

/// Route step outputs into state, producing a new state vector.
///
/// Action steps write each mapped output (optionally a dotted sub-path
/// into a structured output) to its target variable; the targets must
/// already exist (the job engine self-heals state before running).
/// Evaluation steps write a single engine-managed `eval_<short>` variable
/// holding the flat outputs record.
pub fn apply_step_outputs(
    step: &WorkflowStep,
    outputs: &BTreeMap<String, Value>,
    state: &[Variable],
) -> Result<Vec<Variable>, WorkflowError> {
    match step.step_type {
        StepType::Action => {
            let mut updated = state.to_vec();
            for (output_path, variable_name) in &step.output_mappings {
                let parsed = VariablePath::parse(output_path)?;
                let Some(root_value) = outputs.get(&parsed.root_name) else {
                    tracing::debug!(
                        step_id = %step.step_id,
                        output = output_path.as_str(),
                        "tool produced no value for mapped output"
                    );
                    continue;
                };
                let value = if parsed.is_whole_variable() {
                    root_value.clone()
                } else {
                    match path::walk_value(root_value, &parsed.prop_path, &parsed.root_name) {
                        Ok(value) => value.clone(),
                        Err(error) => {
                            tracing::warn!(
                                step_id = %step.step_id,
                                output = output_path.as_str(),
                                error = %error,
                                "output sub-path did not resolve"
                            );
                            continue;
                        }
                    }
                };
                let Some(variable) = updated.iter_mut().find(|v| v.name == *variable_name)
                else {
                    return Err(WorkflowError::UnknownOutputVariable(variable_name.clone()));
                };
                variable.value = Some(value);
            }
            Ok(updated)
        }
        StepType::Evaluation => {
            let mut updated = state.to_vec();
            let name = step.eval_variable_name();
            let snapshot = Value::Object(outputs.clone());
            if let Some(variable) = updated.iter_mut().find(|v| v.name == name) {
                variable.value = Some(snapshot);
            } else {
                updated.push(Variable {
                    name,
                    variable_id: Uuid::now_v7(),
                    schema: infer_schema(&snapshot),
                    value: Some(snapshot),
                    io_type: IoType::Evaluation,
                    description: None,
                });
            }
            Ok(updated)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
