//! The tool executor contract.
//!
//! An executor is the host-supplied function behind a tool id. Executors
//! are the engine's only suspension point: everything else is pure
//! computation. The trait is dyn-compatible, so async methods return
//! manually boxed futures.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use thiserror::Error;
use trellis_types::schema::Value;

/// Outputs produced by a tool executor, keyed by output name.
pub type ToolOutputs = BTreeMap<String, Value>;

/// Boxed future returned by executor methods.
pub type BoxToolFuture<'a> =
    Pin<Box<dyn Future<Output = Result<ToolOutputs, ToolError>> + Send + 'a>>;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors from tool registration, dispatch, and execution.
#[derive(Debug, Error)]
pub enum ToolError {
    /// No executor is registered for the tool id.
    #[error("no executor registered for tool '{0}'")]
    NoExecutor(String),

    /// An LLM tool was invoked without a prompt template id.
    #[error("llm tool invocation is missing a prompt template id")]
    MissingPromptTemplate,

    /// A produced output could not be coerced to its declared schema.
    #[error("output '{name}' does not match its declared {expected} schema (got {actual})")]
    OutputTypeMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    /// The executor itself failed.
    #[error("tool execution failed: {0}")]
    ExecutionFailed(String),
}

// ---------------------------------------------------------------------------
// Invocation types
// ---------------------------------------------------------------------------

/// Parameters for an LLM tool, repartitioned by the dispatcher.
///
/// Declared file parameters whose bound value carries a file handle are
/// moved into `file_variables` (as bare file ids); everything else stays
/// in `regular_variables`. A `None` value is the engine's marker for a
/// binding that did not resolve.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmInvocation {
    /// Prompt template, consumed as a first-class field.
    pub prompt_template_id: String,
    /// Non-file parameters by name.
    pub regular_variables: BTreeMap<String, Option<Value>>,
    /// File ids by parameter name.
    pub file_variables: BTreeMap<String, String>,
}

/// What an executor receives, shaped per tool type.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolInvocation {
    /// Parameters passed through unchanged.
    Standard {
        parameters: BTreeMap<String, Option<Value>>,
    },
    /// LLM-partitioned parameters.
    Llm(LlmInvocation),
}

impl ToolInvocation {
    /// Look up a resolved parameter value by name.
    ///
    /// For LLM invocations this consults `regular_variables` only; file
    /// parameters are addressed through [`LlmInvocation::file_variables`].
    pub fn parameter(&self, name: &str) -> Option<&Value> {
        match self {
            ToolInvocation::Standard { parameters } => {
                parameters.get(name).and_then(|v| v.as_ref())
            }
            ToolInvocation::Llm(llm) => {
                llm.regular_variables.get(name).and_then(|v| v.as_ref())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Executor trait
// ---------------------------------------------------------------------------

/// A pluggable tool implementation.
///
/// Executors may perform I/O and may fail with any message; the engine
/// captures failures as strings in the step's execution record. Executors
/// must not reach back into job state.
pub trait ToolExecutor: Send + Sync {
    /// Execute the tool with resolved, adapted parameters.
    fn execute(&self, invocation: ToolInvocation) -> BoxToolFuture<'_>;
}

/// Adapter so hosts can register a plain function as an executor.
pub struct FnExecutor<F>(F);

impl<F> FnExecutor<F>
where
    F: Fn(ToolInvocation) -> Result<ToolOutputs, ToolError> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> ToolExecutor for FnExecutor<F>
where
    F: Fn(ToolInvocation) -> Result<ToolOutputs, ToolError> + Send + Sync,
{
    fn execute(&self, invocation: ToolInvocation) -> BoxToolFuture<'_> {
        let result = (self.0)(invocation);
        Box::pin(async move { result })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
