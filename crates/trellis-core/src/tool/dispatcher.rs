//! Tool dispatch: parameter adaptation per tool type and output coercion.
//!
//! The dispatcher sits between the workflow engine's resolved parameter
//! bindings and the registered executor. For LLM tools it repartitions
//! parameters into regular and file variables; for every tool it coerces
//! produced outputs to the declared signature before they reach state.

use std::collections::BTreeMap;
use std::sync::Arc;

use trellis_types::schema::{FileHandle, Schema, Value, ValueType};
use trellis_types::tool::{PROMPT_TEMPLATE_PARAM, Tool, ToolSignature, ToolType};

use super::executor::{LlmInvocation, ToolError, ToolInvocation, ToolOutputs};
use super::registry::ToolRegistry;

/// Dispatches tool calls through the registry with signature-aware
/// parameter adaptation and output coercion.
#[derive(Debug, Clone)]
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    /// The registry behind this dispatcher.
    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Adapt parameters, execute, and coerce outputs.
    pub async fn dispatch(
        &self,
        tool: &Tool,
        parameters: BTreeMap<String, Option<Value>>,
    ) -> Result<ToolOutputs, ToolError> {
        let invocation = build_invocation(tool, parameters)?;
        let raw = self.registry.execute(&tool.tool_id, invocation).await?;
        coerce_outputs(&tool.signature, raw)
    }
}

// ---------------------------------------------------------------------------
// Parameter adaptation
// ---------------------------------------------------------------------------

/// Shape resolved parameters into the invocation an executor receives.
pub(crate) fn build_invocation(
    tool: &Tool,
    mut parameters: BTreeMap<String, Option<Value>>,
) -> Result<ToolInvocation, ToolError> {
    apply_defaults(&tool.signature, &mut parameters);
    join_string_arrays(&tool.signature, &mut parameters);

    match tool.tool_type {
        ToolType::Llm => {
            let prompt_template_id = match parameters.remove(PROMPT_TEMPLATE_PARAM) {
                Some(Some(Value::String(id))) if !id.is_empty() => id,
                _ => return Err(ToolError::MissingPromptTemplate),
            };

            let mut regular_variables = BTreeMap::new();
            let mut file_variables = BTreeMap::new();
            for (name, value) in parameters {
                let declared_file = tool
                    .signature
                    .parameter(&name)
                    .is_some_and(|p| p.schema.value_type == ValueType::File && !p.schema.is_array);
                match (declared_file, value) {
                    (true, Some(Value::File(handle))) => {
                        file_variables.insert(name, handle.file_id);
                    }
                    (_, value) => {
                        regular_variables.insert(name, value);
                    }
                }
            }

            Ok(ToolInvocation::Llm(LlmInvocation {
                prompt_template_id,
                regular_variables,
                file_variables,
            }))
        }
        _ => Ok(ToolInvocation::Standard { parameters }),
    }
}

/// Fill unbound optional parameters from their declared defaults.
fn apply_defaults(signature: &ToolSignature, parameters: &mut BTreeMap<String, Option<Value>>) {
    for parameter in &signature.parameters {
        if let Some(default) = &parameter.default {
            let slot = parameters
                .entry(parameter.name.clone())
                .or_insert(None);
            if slot.is_none() {
                *slot = Some(default.clone());
            }
        }
    }
}

/// Join string arrays bound to scalar-string parameters with newlines.
///
/// This is the binding side of the compatibility allowance in
/// `schema::is_compatible`: the mapping is accepted by validation and the
/// join happens here, once, for every tool type.
fn join_string_arrays(signature: &ToolSignature, parameters: &mut BTreeMap<String, Option<Value>>) {
    for parameter in &signature.parameters {
        if parameter.schema.value_type != ValueType::String || parameter.schema.is_array {
            continue;
        }
        let Some(Some(Value::Array(items))) = parameters.get(&parameter.name) else {
            continue;
        };
        if !items.iter().all(|item| matches!(item, Value::String(_))) {
            continue;
        }
        let joined = items
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join("\n");
        parameters.insert(parameter.name.clone(), Some(Value::String(joined)));
    }
}

// ---------------------------------------------------------------------------
// Output coercion
// ---------------------------------------------------------------------------

/// Coerce raw executor outputs to the declared signature.
///
/// Outputs not listed in the signature are dropped with a debug
/// observation; listed outputs are coerced per their declared schema.
pub(crate) fn coerce_outputs(
    signature: &ToolSignature,
    raw: ToolOutputs,
) -> Result<ToolOutputs, ToolError> {
    let mut coerced = ToolOutputs::new();
    for (name, value) in raw {
        let Some(declared) = signature.output(&name) else {
            tracing::debug!(
                output = name.as_str(),
                "dropping output not present in tool signature"
            );
            continue;
        };
        let value = coerce_value(&name, &declared.schema, value)?;
        coerced.insert(name, value);
    }
    Ok(coerced)
}

fn coerce_value(name: &str, schema: &Schema, value: Value) -> Result<Value, ToolError> {
    if schema.is_array {
        // Singletons are wrapped when an array is declared.
        let items = match value {
            Value::Array(items) => items,
            other => vec![other],
        };
        let element = schema.element();
        let coerced = items
            .into_iter()
            .map(|item| coerce_value(name, &element, item))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(Value::Array(coerced));
    }

    match schema.value_type {
        ValueType::String => Ok(Value::String(stringify(&value))),
        ValueType::Number => match &value {
            Value::Number(n) => Ok(Value::Number(*n)),
            Value::String(s) => s.trim().parse::<f64>().map(Value::Number).map_err(|_| {
                mismatch(name, "number", &value)
            }),
            _ => Err(mismatch(name, "number", &value)),
        },
        ValueType::Boolean => Ok(Value::Bool(truthy(&value))),
        ValueType::Object => match value {
            Value::Object(map) => Ok(Value::Object(map)),
            other => Err(mismatch(name, "object", &other)),
        },
        ValueType::File => match value {
            Value::File(handle) => Ok(Value::File(handle)),
            Value::Object(map) => match map.get("file_id").and_then(Value::as_str) {
                Some(file_id) => Ok(Value::File(FileHandle::new(file_id))),
                None => Err(mismatch(name, "file", &Value::Object(map))),
            },
            other => Err(mismatch(name, "file", &other)),
        },
    }
}

fn mismatch(name: &str, expected: &str, actual: &Value) -> ToolError {
    ToolError::OutputTypeMismatch {
        name: name.to_string(),
        expected: expected.to_string(),
        actual: actual.type_name().to_string(),
    }
}

/// Convert any value to a display string.
fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::File(handle) => handle.file_id.clone(),
        // Objects and arrays render as compact JSON.
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}

/// Truthiness coercion for declared boolean outputs.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => *n != 0.0,
        Value::String(s) => !s.is_empty(),
        Value::File(handle) => !handle.file_id.is_empty(),
        Value::Object(_) | Value::Array(_) => true,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_types::tool::{ToolOutput, ToolParameter};

    fn llm_tool() -> Tool {
        Tool {
            tool_id: "llm".to_string(),
            name: "LLM".to_string(),
            description: None,
            tool_type: ToolType::Llm,
            signature: ToolSignature {
                parameters: vec![
                    ToolParameter {
                        name: "doc".to_string(),
                        schema: Schema::file(),
                        required: true,
                        default: None,
                    },
                    ToolParameter {
                        name: "question".to_string(),
                        schema: Schema::string(),
                        required: true,
                        default: None,
                    },
                    ToolParameter {
                        name: PROMPT_TEMPLATE_PARAM.to_string(),
                        schema: Schema::string(),
                        required: true,
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

    fn utility_tool(parameters: Vec<ToolParameter>, outputs: Vec<ToolOutput>) -> Tool {
        Tool {
            tool_id: "utility".to_string(),
            name: "Utility".to_string(),
            description: None,
            tool_type: ToolType::Utility,
            signature: ToolSignature {
                parameters,
                outputs,
            },
        }
    }

    // -----------------------------------------------------------------------
    // LLM parameter partitioning
    // -----------------------------------------------------------------------

    #[test]
    fn test_llm_partition_separates_files() {
        let tool = llm_tool();
        let parameters = BTreeMap::from([
            (
                "doc".to_string(),
                Some(Value::File(FileHandle {
                    file_id: "f1".to_string(),
                    name: Some("a.pdf".to_string()),
                    mime_type: None,
                    size: None,
                })),
            ),
            ("question".to_string(), Some(Value::from("?"))),
            (
                PROMPT_TEMPLATE_PARAM.to_string(),
                Some(Value::from("t1")),
            ),
        ]);

        let invocation = build_invocation(&tool, parameters).unwrap();
        let ToolInvocation::Llm(llm) = invocation else {
            panic!("expected an llm invocation");
        };
        assert_eq!(llm.prompt_template_id, "t1");
        assert_eq!(llm.file_variables.get("doc"), Some(&"f1".to_string()));
        assert!(!llm.regular_variables.contains_key("doc"));
        assert_eq!(
            llm.regular_variables.get("question"),
            Some(&Some(Value::from("?")))
        );
        assert!(!llm.regular_variables.contains_key(PROMPT_TEMPLATE_PARAM));
    }

    #[test]
    fn test_llm_without_template_fails() {
        let tool = llm_tool();
        let parameters = BTreeMap::from([(
            "question".to_string(),
            Some(Value::from("?")),
        )]);
        let err = build_invocation(&tool, parameters).unwrap_err();
        assert!(matches!(err, ToolError::MissingPromptTemplate));
    }

    #[test]
    fn test_llm_file_param_without_handle_stays_regular() {
        // A declared file parameter bound to a non-file value is not moved.
        let tool = llm_tool();
        let parameters = BTreeMap::from([
            ("doc".to_string(), Some(Value::from("not a file"))),
            (
                PROMPT_TEMPLATE_PARAM.to_string(),
                Some(Value::from("t1")),
            ),
        ]);
        let ToolInvocation::Llm(llm) = build_invocation(&tool, parameters).unwrap() else {
            panic!("expected an llm invocation");
        };
        assert!(llm.file_variables.is_empty());
        assert!(llm.regular_variables.contains_key("doc"));
    }

    // -----------------------------------------------------------------------
    // Standard pass-through and adaptation
    // -----------------------------------------------------------------------

    #[test]
    fn test_standard_tools_pass_through() {
        let tool = utility_tool(vec![], vec![]);
        let parameters = BTreeMap::from([
            ("a".to_string(), Some(Value::from(1.0))),
            ("b".to_string(), None),
        ]);
        let invocation = build_invocation(&tool, parameters.clone()).unwrap();
        assert_eq!(invocation, ToolInvocation::Standard { parameters });
    }

    #[test]
    fn test_string_array_joined_for_scalar_string_param() {
        let tool = utility_tool(
            vec![ToolParameter {
                name: "text".to_string(),
                schema: Schema::string(),
                required: true,
                default: None,
            }],
            vec![],
        );
        let parameters = BTreeMap::from([(
            "text".to_string(),
            Some(Value::Array(vec![
                Value::from("line one"),
                Value::from("line two"),
            ])),
        )]);
        let ToolInvocation::Standard { parameters } =
            build_invocation(&tool, parameters).unwrap()
        else {
            panic!("expected a standard invocation");
        };
        assert_eq!(
            parameters.get("text"),
            Some(&Some(Value::from("line one\nline two")))
        );
    }

    #[test]
    fn test_defaults_fill_unbound_parameters() {
        let tool = utility_tool(
            vec![ToolParameter {
                name: "separator".to_string(),
                schema: Schema::string(),
                required: false,
                default: Some(Value::from(", ")),
            }],
            vec![],
        );
        let ToolInvocation::Standard { parameters } =
            build_invocation(&tool, BTreeMap::new()).unwrap()
        else {
            panic!("expected a standard invocation");
        };
        assert_eq!(parameters.get("separator"), Some(&Some(Value::from(", "))));
    }

    // -----------------------------------------------------------------------
    // Output coercion
    // -----------------------------------------------------------------------

    fn signature_with_output(name: &str, schema: Schema) -> ToolSignature {
        ToolSignature {
            parameters: vec![],
            outputs: vec![ToolOutput {
                name: name.to_string(),
                schema,
            }],
        }
    }

    #[test]
    fn test_unlisted_outputs_dropped() {
        let signature = signature_with_output("kept", Schema::string());
        let raw = BTreeMap::from([
            ("kept".to_string(), Value::from("yes")),
            ("dropped".to_string(), Value::from("no")),
        ]);
        let outputs = coerce_outputs(&signature, raw).unwrap();
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs.get("kept"), Some(&Value::from("yes")));
    }

    #[test]
    fn test_string_coercion_stringifies() {
        let signature = signature_with_output("out", Schema::string());
        let raw = BTreeMap::from([("out".to_string(), Value::from(7.5))]);
        let outputs = coerce_outputs(&signature, raw).unwrap();
        assert_eq!(outputs.get("out"), Some(&Value::from("7.5")));
    }

    #[test]
    fn test_number_coercion_parses_strings() {
        let signature = signature_with_output("out", Schema::number());
        let ok = BTreeMap::from([("out".to_string(), Value::from(" 42 "))]);
        let outputs = coerce_outputs(&signature, ok).unwrap();
        assert_eq!(outputs.get("out"), Some(&Value::from(42.0)));

        let bad = BTreeMap::from([("out".to_string(), Value::from("not a number"))]);
        let err = coerce_outputs(&signature, bad).unwrap_err();
        assert!(matches!(err, ToolError::OutputTypeMismatch { .. }));
    }

    #[test]
    fn test_boolean_coercion_is_truthy() {
        let signature = signature_with_output("out", Schema::boolean());
        for (value, expected) in [
            (Value::from(""), false),
            (Value::from("x"), true),
            (Value::from(0.0), false),
            (Value::from(2.0), true),
            (Value::Array(vec![]), true),
        ] {
            let raw = BTreeMap::from([("out".to_string(), value)]);
            let outputs = coerce_outputs(&signature, raw).unwrap();
            assert_eq!(outputs.get("out"), Some(&Value::Bool(expected)));
        }
    }

    #[test]
    fn test_array_declaration_wraps_singleton() {
        let signature = signature_with_output("out", Schema::string().into_array());
        let raw = BTreeMap::from([("out".to_string(), Value::from("solo"))]);
        let outputs = coerce_outputs(&signature, raw).unwrap();
        assert_eq!(
            outputs.get("out"),
            Some(&Value::Array(vec![Value::from("solo")]))
        );
    }

    #[test]
    fn test_object_output_must_be_object() {
        let signature = signature_with_output(
            "out",
            Schema::object(BTreeMap::from([(
                "score".to_string(),
                Schema::number(),
            )])),
        );
        let bad = BTreeMap::from([("out".to_string(), Value::from("nope"))]);
        let err = coerce_outputs(&signature, bad).unwrap_err();
        assert!(matches!(err, ToolError::OutputTypeMismatch { .. }));
    }

    #[test]
    fn test_file_output_from_handle_shaped_object() {
        let signature = signature_with_output("out", Schema::file());
        let raw = BTreeMap::from([(
            "out".to_string(),
            Value::File(FileHandle::new("f9")),
        )]);
        let outputs = coerce_outputs(&signature, raw).unwrap();
        assert_eq!(
            outputs.get("out").and_then(Value::as_file).map(|h| h.file_id.as_str()),
            Some("f9")
        );
    }
}
