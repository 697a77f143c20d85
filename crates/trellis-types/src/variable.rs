//! Named, schema-typed value slots in workflow and job state.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::{Schema, Value};

/// Reserved prefix for engine-written evaluation snapshots.
pub const EVAL_PREFIX: &str = "eval_";

/// Reserved prefix for engine-written jump counters.
pub const JUMP_COUNT_PREFIX: &str = "jump_count_";

/// Whether a variable name belongs to the engine's bookkeeping namespace.
///
/// Bookkeeping variables carry `IoType::Evaluation`; the prefix exists only
/// to keep their names out of the user's way, not to drive behavior.
pub fn is_engine_managed(name: &str) -> bool {
    name.starts_with(EVAL_PREFIX) || name.starts_with(JUMP_COUNT_PREFIX)
}

/// Role of a variable within workflow or job state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IoType {
    /// Supplied by the caller at run start.
    Input,
    /// Written by step output mappings.
    Output,
    /// Engine-managed bookkeeping (jump counters, evaluation snapshots).
    Evaluation,
}

/// A named, schema-typed value slot. `name` is unique within a workflow
/// or job state; `value`, when present, conforms to `schema`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    /// Unique name within the owning state.
    pub name: String,
    /// Stable identifier, assigned on creation.
    pub variable_id: Uuid,
    /// Declared shape of the value.
    pub schema: Schema,
    /// Current value; absent until written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Role of this variable.
    pub io_type: IoType,
    /// Optional human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Variable {
    /// Create a variable with no value.
    pub fn new(name: impl Into<String>, schema: Schema, io_type: IoType) -> Self {
        Self {
            name: name.into(),
            variable_id: Uuid::now_v7(),
            schema,
            value: None,
            io_type,
            description: None,
        }
    }

    /// Builder-style value assignment.
    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
