//! Tool descriptors: external capabilities with declared signatures.
//!
//! A `Tool` describes what a pluggable capability accepts and produces;
//! the executor behind it is registered separately in
//! `trellis-core::tool::ToolRegistry`.

use serde::{Deserialize, Serialize};

use crate::schema::{Schema, Value};

/// Name of the parameter that carries the prompt template for LLM tools.
///
/// The dispatcher consumes it as a first-class field of the LLM invocation
/// instead of passing it through as a regular variable.
pub const PROMPT_TEMPLATE_PARAM: &str = "prompt_template_id";

/// Category of a tool, used by the dispatcher to adapt parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolType {
    Llm,
    Search,
    Retrieve,
    Utility,
}

/// A declared input of a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolParameter {
    /// Parameter name, unique within the signature.
    pub name: String,
    /// Declared shape of the bound value.
    pub schema: Schema,
    /// Whether a mapping for this parameter is mandatory.
    pub required: bool,
    /// Fallback value used when an optional parameter is unmapped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

/// A declared output of a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Output name, unique within the signature.
    pub name: String,
    /// Declared shape of the produced value.
    pub schema: Schema,
}

/// Declared parameters and outputs of a tool.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ToolSignature {
    #[serde(default)]
    pub parameters: Vec<ToolParameter>,
    #[serde(default)]
    pub outputs: Vec<ToolOutput>,
}

impl ToolSignature {
    /// Look up a declared parameter by name.
    pub fn parameter(&self, name: &str) -> Option<&ToolParameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Look up a declared output by name.
    pub fn output(&self, name: &str) -> Option<&ToolOutput> {
        self.outputs.iter().find(|o| o.name == name)
    }
}

/// An external capability with a declared signature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    /// Registry key for the executor behind this tool.
    pub tool_id: String,
    /// Human-readable name.
    pub name: String,
    /// Optional longer description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Category, used for parameter adaptation.
    pub tool_type: ToolType,
    /// Declared parameters and outputs.
    pub signature: ToolSignature,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
