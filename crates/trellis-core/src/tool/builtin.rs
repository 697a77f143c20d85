//! Reference tool set: `echo`, `concatenate`, `search`, `pubmed`, `llm`.
//!
//! These are placeholder executors -- hosts replace `search`, `pubmed`,
//! and `llm` with real backends. `echo` and `concatenate` are complete and
//! are the workhorses of the engine's own tests. Each tool also has a
//! descriptor constructor so callers can drop it into a workflow step.

use std::collections::BTreeMap;

use trellis_types::schema::{Schema, Value};
use trellis_types::tool::{
    PROMPT_TEMPLATE_PARAM, Tool, ToolOutput, ToolParameter, ToolSignature, ToolType,
};

use super::executor::{BoxToolFuture, ToolExecutor, ToolInvocation, ToolOutputs};
use super::registry::ToolRegistry;

pub const ECHO_TOOL_ID: &str = "echo";
pub const CONCATENATE_TOOL_ID: &str = "concatenate";
pub const SEARCH_TOOL_ID: &str = "search";
pub const PUBMED_TOOL_ID: &str = "pubmed";
pub const LLM_TOOL_ID: &str = "llm";

/// Register the full reference set on a registry.
pub fn register_builtin_tools(registry: &ToolRegistry) {
    registry.register(ECHO_TOOL_ID, std::sync::Arc::new(EchoExecutor));
    registry.register(CONCATENATE_TOOL_ID, std::sync::Arc::new(ConcatenateExecutor));
    registry.register(SEARCH_TOOL_ID, std::sync::Arc::new(SearchExecutor));
    registry.register(PUBMED_TOOL_ID, std::sync::Arc::new(PubmedExecutor));
    registry.register(LLM_TOOL_ID, std::sync::Arc::new(LlmPlaceholderExecutor));
}

// ---------------------------------------------------------------------------
// Echo
// ---------------------------------------------------------------------------

/// Returns its `input` parameter as `output`, unchanged.
struct EchoExecutor;

impl ToolExecutor for EchoExecutor {
    fn execute(&self, invocation: ToolInvocation) -> BoxToolFuture<'_> {
        let output = invocation
            .parameter("input")
            .cloned()
            .unwrap_or_else(|| Value::String(String::new()));
        Box::pin(async move {
            let mut outputs = ToolOutputs::new();
            outputs.insert("output".to_string(), output);
            Ok(outputs)
        })
    }
}

/// Descriptor for the echo tool: `input: string -> output: string`.
pub fn echo_tool() -> Tool {
    Tool {
        tool_id: ECHO_TOOL_ID.to_string(),
        name: "Echo".to_string(),
        description: Some("Returns its input unchanged".to_string()),
        tool_type: ToolType::Utility,
        signature: ToolSignature {
            parameters: vec![ToolParameter {
                name: "input".to_string(),
                schema: Schema::string(),
                required: true,
                default: None,
            }],
            outputs: vec![ToolOutput {
                name: "output".to_string(),
                schema: Schema::string(),
            }],
        },
    }
}

// ---------------------------------------------------------------------------
// Concatenate
// ---------------------------------------------------------------------------

/// Joins the string elements of `parts` with `separator` (default "").
struct ConcatenateExecutor;

impl ToolExecutor for ConcatenateExecutor {
    fn execute(&self, invocation: ToolInvocation) -> BoxToolFuture<'_> {
        let separator = invocation
            .parameter("separator")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        let joined = match invocation.parameter("parts") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(&separator),
            Some(Value::String(s)) => s.clone(),
            _ => String::new(),
        };
        Box::pin(async move {
            let mut outputs = ToolOutputs::new();
            outputs.insert("output".to_string(), Value::String(joined));
            Ok(outputs)
        })
    }
}

/// Descriptor for the concatenate tool:
/// `parts: string[], separator?: string -> output: string`.
pub fn concatenate_tool() -> Tool {
    Tool {
        tool_id: CONCATENATE_TOOL_ID.to_string(),
        name: "Concatenate".to_string(),
        description: Some("Joins string parts with a separator".to_string()),
        tool_type: ToolType::Utility,
        signature: ToolSignature {
            parameters: vec![
                ToolParameter {
                    name: "parts".to_string(),
                    schema: Schema::string().into_array(),
                    required: true,
                    default: None,
                },
                ToolParameter {
                    name: "separator".to_string(),
                    schema: Schema::string(),
                    required: false,
                    default: Some(Value::String(String::new())),
                },
            ],
            outputs: vec![ToolOutput {
                name: "output".to_string(),
                schema: Schema::string(),
            }],
        },
    }
}

// ---------------------------------------------------------------------------
// Search placeholders
// ---------------------------------------------------------------------------

// -- Placeholder: hosts register a real web search backend --

struct SearchExecutor;

impl ToolExecutor for SearchExecutor {
    fn execute(&self, invocation: ToolInvocation) -> BoxToolFuture<'_> {
        let query = invocation
            .parameter("query")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        Box::pin(async move {
            tracing::debug!(query = query.as_str(), "running search (placeholder)");
            let mut outputs = ToolOutputs::new();
            outputs.insert(
                "results".to_string(),
                Value::Array(vec![Value::String(format!(
                    "[placeholder] search result for: {query}"
                ))]),
            );
            Ok(outputs)
        })
    }
}

/// Descriptor for the search tool: `query: string -> results: string[]`.
pub fn search_tool() -> Tool {
    Tool {
        tool_id: SEARCH_TOOL_ID.to_string(),
        name: "Search".to_string(),
        description: Some("Web search".to_string()),
        tool_type: ToolType::Search,
        signature: ToolSignature {
            parameters: vec![ToolParameter {
                name: "query".to_string(),
                schema: Schema::string(),
                required: true,
                default: None,
            }],
            outputs: vec![ToolOutput {
                name: "results".to_string(),
                schema: Schema::string().into_array(),
            }],
        },
    }
}

// -- Placeholder: hosts register a real PubMed client --

struct PubmedExecutor;

impl ToolExecutor for PubmedExecutor {
    fn execute(&self, invocation: ToolInvocation) -> BoxToolFuture<'_> {
        let query = invocation
            .parameter("query")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        Box::pin(async move {
            tracing::debug!(query = query.as_str(), "running pubmed search (placeholder)");
            let mut outputs = ToolOutputs::new();
            outputs.insert(
                "results".to_string(),
                Value::Array(vec![Value::String(format!(
                    "[placeholder] pubmed result for: {query}"
                ))]),
            );
            Ok(outputs)
        })
    }
}

/// Descriptor for the pubmed tool: `query: string -> results: string[]`.
pub fn pubmed_tool() -> Tool {
    Tool {
        tool_id: PUBMED_TOOL_ID.to_string(),
        name: "PubMed".to_string(),
        description: Some("PubMed literature search".to_string()),
        tool_type: ToolType::Retrieve,
        signature: ToolSignature {
            parameters: vec![ToolParameter {
                name: "query".to_string(),
                schema: Schema::string(),
                required: true,
                default: None,
            }],
            outputs: vec![ToolOutput {
                name: "results".to_string(),
                schema: Schema::string().into_array(),
            }],
        },
    }
}

// ---------------------------------------------------------------------------
// LLM placeholder
// ---------------------------------------------------------------------------

// -- Placeholder: hosts register a real LLM transport --

struct LlmPlaceholderExecutor;

impl ToolExecutor for LlmPlaceholderExecutor {
    fn execute(&self, invocation: ToolInvocation) -> BoxToolFuture<'_> {
        Box::pin(async move {
            let ToolInvocation::Llm(llm) = invocation else {
                return Err(super::executor::ToolError::ExecutionFailed(
                    "llm executor requires an llm invocation".to_string(),
                ));
            };
            tracing::debug!(
                prompt_template_id = llm.prompt_template_id.as_str(),
                regular = llm.regular_variables.len(),
                files = llm.file_variables.len(),
                "running llm completion (placeholder)"
            );
            let mut outputs = ToolOutputs::new();
            outputs.insert(
                "response".to_string(),
                Value::String(format!(
                    "[placeholder] llm response for template '{}'",
                    llm.prompt_template_id
                )),
            );
            Ok(outputs)
        })
    }
}

/// Descriptor for the llm tool:
/// `prompt_template_id: string, context: string -> response: string`.
pub fn llm_tool() -> Tool {
    Tool {
        tool_id: LLM_TOOL_ID.to_string(),
        name: "LLM".to_string(),
        description: Some("Prompt-template LLM completion".to_string()),
        tool_type: ToolType::Llm,
        signature: ToolSignature {
            parameters: vec![
                ToolParameter {
                    name: PROMPT_TEMPLATE_PARAM.to_string(),
                    schema: Schema::string(),
                    required: true,
                    default: None,
                },
                ToolParameter {
                    name: "context".to_string(),
                    schema: Schema::string(),
                    required: false,
                    default: None,
                },
            ],
            outputs: vec![ToolOutput {
                name: "response".to_string(),
                schema: Schema::string(),
            }],
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
