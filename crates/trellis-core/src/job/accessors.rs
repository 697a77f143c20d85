//! Read-only views over a job for host and UI consumption.
//!
//! These accessors never mutate; they resolve against the job's current
//! state, or -- for the historical variants -- against a captured
//! `StepExecutionResult`, which is what post-hoc display must use since
//! state keeps moving after a step runs.

use trellis_types::job::{Job, JobStep, StepExecutionResult};
use trellis_types::schema::Value;
use trellis_types::variable::{IoType, Variable, is_engine_managed};

use crate::path::{self, VariablePath};

/// One row of a mapping view: the mapped name, the path or target it is
/// bound to, and the value as currently (or historically) resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct MappingView {
    /// Parameter name (input views) or output path (output views).
    pub name: String,
    /// The bound variable path (input views) or target variable (outputs).
    pub path: String,
    /// The resolved value, if any.
    pub resolved_value: Option<Value>,
}

// ---------------------------------------------------------------------------
// Variable views
// ---------------------------------------------------------------------------

/// Variables with `io_type = input`.
pub fn input_variables(job: &Job) -> Vec<&Variable> {
    job.state
        .iter()
        .filter(|v| v.io_type == IoType::Input)
        .collect()
}

/// The variables targeted by the LAST step's output mappings, excluding
/// engine bookkeeping.
pub fn final_output_variables(job: &Job) -> Vec<&Variable> {
    let Some(last) = job.steps.last() else {
        return Vec::new();
    };
    job.state
        .iter()
        .filter(|v| {
            !is_engine_managed(&v.name)
                && last
                    .definition
                    .output_mappings
                    .values()
                    .any(|target| *target == v.name)
        })
        .collect()
}

/// All variables except engine bookkeeping.
pub fn all_state_variables(job: &Job) -> Vec<&Variable> {
    job.state
        .iter()
        .filter(|v| !is_engine_managed(&v.name))
        .collect()
}

// ---------------------------------------------------------------------------
// Mapping views against current state
// ---------------------------------------------------------------------------

/// The parameter mappings of a step, resolved against current job state.
pub fn step_input_mappings(job: &Job, step_id: uuid::Uuid) -> Option<Vec<MappingView>> {
    let step = job.step(step_id)?;
    Some(
        step.definition
            .parameter_mappings
            .iter()
            .map(|(parameter, mapping)| MappingView {
                name: parameter.clone(),
                path: mapping.clone(),
                resolved_value: resolve_in_state(&job.state, mapping),
            })
            .collect(),
    )
}

/// The output mappings of a step, with each target's current value.
pub fn step_output_mappings(job: &Job, step_id: uuid::Uuid) -> Option<Vec<MappingView>> {
    let step = job.step(step_id)?;
    Some(
        step.definition
            .output_mappings
            .iter()
            .map(|(output_path, target)| MappingView {
                name: output_path.clone(),
                path: target.clone(),
                resolved_value: job
                    .variable(target)
                    .and_then(|v| v.value.clone()),
            })
            .collect(),
    )
}

fn resolve_in_state(state: &[Variable], mapping: &str) -> Option<Value> {
    let parsed = VariablePath::parse(mapping).ok()?;
    path::resolve(state, &parsed).value.cloned()
}

// ---------------------------------------------------------------------------
// Historical mapping views
// ---------------------------------------------------------------------------

/// The parameter mappings of a step as captured in an execution record.
pub fn step_input_mappings_from(
    step: &JobStep,
    record: &StepExecutionResult,
) -> Vec<MappingView> {
    step.definition
        .parameter_mappings
        .iter()
        .map(|(parameter, mapping)| MappingView {
            name: parameter.clone(),
            path: mapping.clone(),
            resolved_value: record
                .inputs
                .as_ref()
                .and_then(|inputs| inputs.get(parameter))
                .and_then(|value| value.clone()),
        })
        .collect()
}

/// The output mappings of a step resolved against an execution record's
/// captured outputs (sub-path aware).
pub fn step_output_mappings_from(
    step: &JobStep,
    record: &StepExecutionResult,
) -> Vec<MappingView> {
    step.definition
        .output_mappings
        .iter()
        .map(|(output_path, target)| {
            let resolved_value = record.outputs.as_ref().and_then(|outputs| {
                let parsed = VariablePath::parse(output_path).ok()?;
                let root = outputs.get(&parsed.root_name)?;
                if parsed.is_whole_variable() {
                    Some(root.clone())
                } else {
                    path::walk_value(root, &parsed.prop_path, &parsed.root_name)
                        .ok()
                        .cloned()
                }
            });
            MappingView {
                name: output_path.clone(),
                path: target.clone(),
                resolved_value,
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeMap;
    use trellis_types::job::{ExecutionProgress, JobStatus};
    use trellis_types::schema::Schema;
    use trellis_types::workflow::{StepType, WorkflowStep};
    use uuid::Uuid;

    fn step_with_mappings() -> WorkflowStep {
        WorkflowStep {
            step_id: Uuid::now_v7(),
            sequence_number: 0,
            step_type: StepType::Action,
            label: "final".to_string(),
            description: None,
            tool: None,
            tool_id: None,
            prompt_template_id: None,
            parameter_mappings: BTreeMap::from([(
                "input".to_string(),
                "x".to_string(),
            )]),
            output_mappings: BTreeMap::from([(
                "analysis.score".to_string(),
                "y".to_string(),
            )]),
            evaluation_config: None,
        }
    }

    fn job_with(state: Vec<Variable>, steps: Vec<JobStep>) -> Job {
        Job {
            job_id: Uuid::now_v7(),
            workflow_id: Uuid::now_v7(),
            name: "job".to_string(),
            description: None,
            status: JobStatus::Completed,
            execution_progress: ExecutionProgress {
                current_step: steps.len(),
                total_steps: steps.len(),
            },
            steps,
            state,
            input_variables: vec![],
            error_message: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    fn sample_job() -> Job {
        job_with(
            vec![
                Variable::new("x", Schema::string(), IoType::Input)
                    .with_value(Value::from("in")),
                Variable::new("y", Schema::number(), IoType::Output)
                    .with_value(Value::from(7.2)),
                Variable::new("eval_0198aaaa", Schema::string(), IoType::Evaluation)
                    .with_value(Value::from("snapshot")),
                Variable::new("jump_count_0198aaaa", Schema::number(), IoType::Evaluation)
                    .with_value(Value::from(1.0)),
            ],
            vec![JobStep::from_definition(step_with_mappings())],
        )
    }

    // -----------------------------------------------------------------------
    // Variable views
    // -----------------------------------------------------------------------

    #[test]
    fn test_input_variables_filters_by_io_type() {
        let job = sample_job();
        let inputs = input_variables(&job);
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].name, "x");
    }

    #[test]
    fn test_final_outputs_exclude_bookkeeping() {
        let job = sample_job();
        let finals = final_output_variables(&job);
        assert_eq!(finals.len(), 1);
        assert_eq!(finals[0].name, "y");
    }

    #[test]
    fn test_final_outputs_empty_without_steps() {
        let job = job_with(vec![], vec![]);
        assert!(final_output_variables(&job).is_empty());
    }

    #[test]
    fn test_all_state_variables_hides_engine_names() {
        let job = sample_job();
        let names: Vec<_> = all_state_variables(&job)
            .into_iter()
            .map(|v| v.name.as_str())
            .collect();
        assert_eq!(names, vec!["x", "y"]);
    }

    // -----------------------------------------------------------------------
    // Current-state mapping views
    // -----------------------------------------------------------------------

    #[test]
    fn test_step_input_mappings_resolve_current_state() {
        let job = sample_job();
        let step_id = job.steps[0].definition.step_id;
        let views = step_input_mappings(&job, step_id).unwrap();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].name, "input");
        assert_eq!(views[0].path, "x");
        assert_eq!(views[0].resolved_value, Some(Value::from("in")));
    }

    #[test]
    fn test_step_output_mappings_read_targets() {
        let job = sample_job();
        let step_id = job.steps[0].definition.step_id;
        let views = step_output_mappings(&job, step_id).unwrap();
        assert_eq!(views[0].name, "analysis.score");
        assert_eq!(views[0].path, "y");
        assert_eq!(views[0].resolved_value, Some(Value::from(7.2)));
    }

    #[test]
    fn test_unknown_step_yields_none() {
        let job = sample_job();
        assert!(step_input_mappings(&job, Uuid::now_v7()).is_none());
    }

    // -----------------------------------------------------------------------
    // Historical mapping views
    // -----------------------------------------------------------------------

    #[test]
    fn test_historical_views_read_the_record_not_state() {
        let job = sample_job();
        let step = &job.steps[0];
        let record = StepExecutionResult {
            step_id: step.definition.step_id,
            success: true,
            outputs: Some(BTreeMap::from([(
                "analysis".to_string(),
                Value::Object(BTreeMap::from([
                    ("score".to_string(), Value::from(3.5)),
                    ("tag".to_string(), Value::from("old")),
                ])),
            )])),
            error: None,
            inputs: Some(BTreeMap::from([(
                "input".to_string(),
                Some(Value::from("captured")),
            )])),
            started_at: Utc::now(),
            completed_at: Utc::now(),
        };

        let input_views = step_input_mappings_from(step, &record);
        assert_eq!(input_views[0].resolved_value, Some(Value::from("captured")));

        let output_views = step_output_mappings_from(step, &record);
        // Sub-path resolved inside the captured structured output.
        assert_eq!(output_views[0].resolved_value, Some(Value::from(3.5)));
    }

    #[test]
    fn test_historical_views_tolerate_missing_captures() {
        let job = sample_job();
        let step = &job.steps[0];
        let record = StepExecutionResult {
            step_id: step.definition.step_id,
            success: false,
            outputs: None,
            error: Some("boom".to_string()),
            inputs: None,
            started_at: Utc::now(),
            completed_at: Utc::now(),
        };
        assert_eq!(
            step_input_mappings_from(step, &record)[0].resolved_value,
            None
        );
        assert_eq!(
            step_output_mappings_from(step, &record)[0].resolved_value,
            None
        );
    }
}
