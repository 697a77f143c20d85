//! Workflow engine core: pure step semantics against a workflow value.
//!
//! This module contains the stateless "brain" of the engine:
//! - `binding` -- parameter binding and output writing
//! - `evaluation` -- condition evaluation and jump-count bookkeeping
//! - `step` -- single-step execution (`execute_step_simple`)
//! - `validation` -- mapping validation and self-healing of missing variables
//!
//! No operation here mutates its arguments; state updates are returned as
//! new values. The only I/O happens through the tool dispatcher.

use thiserror::Error;

pub mod binding;
pub mod evaluation;
pub mod step;
pub mod validation;

use crate::path::PathError;

/// Errors from pure workflow operations.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Structural validation failure.
    #[error("validation error: {0}")]
    Validation(String),

    /// An output mapping targets a variable missing from state.
    ///
    /// State is self-healed before a run, so this indicates a caller that
    /// skipped `check_and_fix_missing_variables`.
    #[error("unknown output variable '{0}'")]
    UnknownOutputVariable(String),

    /// A dotted path failed to parse or traverse.
    #[error("path error: {0}")]
    Path(#[from] PathError),
}
