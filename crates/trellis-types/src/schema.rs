//! Schema and value model for data flowing through the engine.
//!
//! A `Schema` is a structural descriptor (scalar, object, file, array-of);
//! a `Value` is the runtime data it describes, expressed as a tagged sum
//! rather than a dynamic "anything" type. Structural validation and
//! default-value synthesis live in `trellis-core::schema`.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ValueType and Schema
// ---------------------------------------------------------------------------

/// Base type of a schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    String,
    Number,
    Boolean,
    Object,
    File,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::String => "string",
            ValueType::Number => "number",
            ValueType::Boolean => "boolean",
            ValueType::Object => "object",
            ValueType::File => "file",
        };
        f.write_str(name)
    }
}

/// Structural descriptor for values flowing through a workflow.
///
/// Arrays are indicated by `is_array` and apply to the base type; `fields`
/// is present iff `value_type` is `Object`. Field order is stable
/// (`BTreeMap`) so serialized schemas and diagnostics are reproducible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// Base type of the described value.
    #[serde(rename = "type")]
    pub value_type: ValueType,
    /// Whether the value is an ordered sequence of the base type.
    #[serde(default)]
    pub is_array: bool,
    /// Field schemas, present iff `value_type` is `Object`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<BTreeMap<String, Schema>>,
    /// Optional format hint (e.g. "date-time" for strings).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Accepted content types for file schemas (e.g. "application/pdf").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_types: Option<Vec<String>>,
}

impl Schema {
    fn scalar_of(value_type: ValueType) -> Self {
        Self {
            value_type,
            is_array: false,
            fields: None,
            format: None,
            content_types: None,
        }
    }

    /// A scalar string schema.
    pub fn string() -> Self {
        Self::scalar_of(ValueType::String)
    }

    /// A scalar number schema.
    pub fn number() -> Self {
        Self::scalar_of(ValueType::Number)
    }

    /// A scalar boolean schema.
    pub fn boolean() -> Self {
        Self::scalar_of(ValueType::Boolean)
    }

    /// A file-handle schema.
    pub fn file() -> Self {
        Self::scalar_of(ValueType::File)
    }

    /// An object schema with the given field schemas.
    pub fn object(fields: BTreeMap<String, Schema>) -> Self {
        Self {
            value_type: ValueType::Object,
            is_array: false,
            fields: Some(fields),
            format: None,
            content_types: None,
        }
    }

    /// Turn this schema into an array of its base type.
    pub fn into_array(mut self) -> Self {
        self.is_array = true;
        self
    }

    /// The element schema of an array schema (or a copy of a scalar one).
    pub fn element(&self) -> Self {
        let mut element = self.clone();
        element.is_array = false;
        element
    }
}

// ---------------------------------------------------------------------------
// FileHandle and Value
// ---------------------------------------------------------------------------

/// Reference to an externally stored file.
///
/// The engine never touches file contents; it only routes handles to tool
/// executors, which resolve `file_id` against the host's storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileHandle {
    /// Host-assigned file identifier.
    pub file_id: String,
    /// Original file name, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// MIME type, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Size in bytes, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl FileHandle {
    /// A handle with just an identifier.
    pub fn new(file_id: impl Into<String>) -> Self {
        Self {
            file_id: file_id.into(),
            name: None,
            mime_type: None,
            size: None,
        }
    }

    /// The handle synthesized for a defaulted file variable.
    pub fn empty() -> Self {
        Self::new("")
    }
}

/// Runtime value: scalar, file handle, object, or ordered sequence.
///
/// There is deliberately no `Null` variant -- absence is expressed with
/// `Option<Value>` so user data can never collide with the engine's
/// "unresolved" marker. `File` is ordered before `Object` so any JSON
/// object carrying a `file_id` field deserializes as a file handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Number(f64),
    String(String),
    File(FileHandle),
    Object(BTreeMap<String, Value>),
    Array(Vec<Value>),
}

impl Value {
    /// The string slice, if this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// The numeric value, if this is a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The boolean, if this is a bool value.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The field map, if this is an object value.
    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    /// The element list, if this is an array value.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// The file handle, if this is a file value.
    pub fn as_file(&self) -> Option<&FileHandle> {
        match self {
            Value::File(handle) => Some(handle),
            _ => None,
        }
    }

    /// Short type name for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::File(_) => "file",
            Value::Object(_) => "object",
            Value::Array(_) => "array",
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<FileHandle> for Value {
    fn from(handle: FileHandle) -> Self {
        Value::File(handle)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
