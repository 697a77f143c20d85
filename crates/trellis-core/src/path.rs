//! Variable path resolver: parse, resolve, validate, and update dotted paths.
//!
//! A path has the form `root.prop1.prop2`; the root names a variable and
//! the remaining segments index into object values. This module is the only
//! place in the engine where a dotted string is split -- every other
//! component goes through `VariablePath`.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;
use trellis_types::schema::{Schema, Value, ValueType};
use trellis_types::variable::Variable;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors from path parsing, resolution, and updates.
#[derive(Debug, Error)]
pub enum PathError {
    /// The path string was empty.
    #[error("empty variable path")]
    Empty,

    /// The path contained an empty segment (e.g. `a..b`).
    #[error("empty segment in path '{0}'")]
    EmptySegment(String),

    /// No variable with the root name exists in the store.
    #[error("unknown variable '{0}'")]
    UnknownVariable(String),

    /// A segment named a field the value does not have.
    #[error("no field '{field}' at '{at}'")]
    NoField { field: String, at: String },

    /// A segment tried to index into a non-object value.
    #[error("cannot traverse '{segment}': value at '{at}' is not an object")]
    NotAnObject { segment: String, at: String },

    /// A segment named a field the schema does not declare.
    #[error("schema has no field '{field}' at '{at}'")]
    SchemaMissingField { field: String, at: String },

    /// A segment tried to walk into a non-object schema.
    #[error("cannot traverse '{segment}': schema at '{at}' is not an object")]
    SchemaNotObject { segment: String, at: String },
}

// ---------------------------------------------------------------------------
// VariablePath
// ---------------------------------------------------------------------------

/// A parsed dotted path: a root variable name plus property segments.
///
/// An empty `prop_path` means whole-variable binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariablePath {
    /// Name of the root variable.
    pub root_name: String,
    /// Property segments below the root, outermost first.
    pub prop_path: Vec<String>,
}

impl VariablePath {
    /// Parse a dotted path string. Empty input and empty segments fail.
    pub fn parse(path: &str) -> Result<Self, PathError> {
        if path.is_empty() {
            return Err(PathError::Empty);
        }
        let mut segments = path.split('.');
        let root_name = segments.next().unwrap_or_default().to_string();
        if root_name.is_empty() {
            return Err(PathError::EmptySegment(path.to_string()));
        }
        let mut prop_path = Vec::new();
        for segment in segments {
            if segment.is_empty() {
                return Err(PathError::EmptySegment(path.to_string()));
            }
            prop_path.push(segment.to_string());
        }
        Ok(Self {
            root_name,
            prop_path,
        })
    }

    /// Whether this path binds the whole variable.
    pub fn is_whole_variable(&self) -> bool {
        self.prop_path.is_empty()
    }
}

impl fmt::Display for VariablePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.root_name)?;
        for segment in &self.prop_path {
            write!(f, ".{segment}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Outcome of resolving a path against a variable store.
///
/// Resolution never fails hard: an invalid path yields `valid_path = false`
/// and a descriptive message, leaving the decision to the caller.
#[derive(Debug)]
pub struct PathResolution<'a> {
    /// The resolved value, if the path led to one.
    pub value: Option<&'a Value>,
    /// Whether every segment of the path was addressable.
    pub valid_path: bool,
    /// Why resolution stopped, when it did.
    pub error: Option<String>,
}

impl<'a> PathResolution<'a> {
    fn found(value: &'a Value) -> Self {
        Self {
            value: Some(value),
            valid_path: true,
            error: None,
        }
    }

    fn absent() -> Self {
        Self {
            value: None,
            valid_path: true,
            error: None,
        }
    }

    fn invalid(error: PathError) -> Self {
        Self {
            value: None,
            valid_path: false,
            error: Some(error.to_string()),
        }
    }
}

/// Resolve a path against a variable store.
///
/// A root variable with no value resolves to `value = None` with
/// `valid_path = true` for whole-variable paths; property segments cannot
/// be walked through an absent value.
pub fn resolve<'a>(variables: &'a [Variable], path: &VariablePath) -> PathResolution<'a> {
    let Some(variable) = variables.iter().find(|v| v.name == path.root_name) else {
        return PathResolution::invalid(PathError::UnknownVariable(path.root_name.clone()));
    };

    let Some(root_value) = variable.value.as_ref() else {
        if path.is_whole_variable() {
            return PathResolution::absent();
        }
        return PathResolution::invalid(PathError::NoField {
            field: path.prop_path[0].clone(),
            at: path.root_name.clone(),
        });
    };

    match walk_value(root_value, &path.prop_path, &path.root_name) {
        Ok(value) => PathResolution::found(value),
        Err(error) => PathResolution::invalid(error),
    }
}

/// Walk property segments into a value, reporting the first failure.
pub fn walk_value<'a>(
    value: &'a Value,
    segments: &[String],
    root: &str,
) -> Result<&'a Value, PathError> {
    let mut current = value;
    let mut at = root.to_string();
    for segment in segments {
        match current {
            Value::Object(map) => match map.get(segment) {
                Some(field) => {
                    current = field;
                    at = format!("{at}.{segment}");
                }
                None => {
                    return Err(PathError::NoField {
                        field: segment.clone(),
                        at,
                    });
                }
            },
            _ => {
                return Err(PathError::NotAnObject {
                    segment: segment.clone(),
                    at,
                });
            }
        }
    }
    Ok(current)
}

// ---------------------------------------------------------------------------
// Schema validation
// ---------------------------------------------------------------------------

/// Walk property segments through a schema tree in parallel with the value
/// walk, returning the sub-schema for the final segment.
pub fn validate_against_schema<'a>(
    schema: &'a Schema,
    prop_path: &[String],
) -> Result<&'a Schema, PathError> {
    let mut current = schema;
    let mut at = String::from("root");
    for segment in prop_path {
        if current.value_type != ValueType::Object || current.is_array {
            return Err(PathError::SchemaNotObject {
                segment: segment.clone(),
                at,
            });
        }
        let field = current
            .fields
            .as_ref()
            .and_then(|fields| fields.get(segment));
        match field {
            Some(field_schema) => {
                current = field_schema;
                at = format!("{at}.{segment}");
            }
            None => {
                return Err(PathError::SchemaMissingField {
                    field: segment.clone(),
                    at,
                });
            }
        }
    }
    Ok(current)
}

// ---------------------------------------------------------------------------
// Updates
// ---------------------------------------------------------------------------

/// Write a value at a nested position, producing a new value graph.
///
/// Pure: the input is not mutated. Intermediate empty objects are created
/// for segments that do not exist yet; traversing an existing non-object
/// value fails.
pub fn set_at_path(
    base: Option<&Value>,
    prop_path: &[String],
    new_value: Value,
) -> Result<Value, PathError> {
    let Some((head, rest)) = prop_path.split_first() else {
        return Ok(new_value);
    };

    match base {
        None => {
            let child = set_at_path(None, rest, new_value)?;
            Ok(Value::Object(BTreeMap::from([(head.clone(), child)])))
        }
        Some(Value::Object(existing)) => {
            let child = set_at_path(existing.get(head), rest, new_value)?;
            let mut map = existing.clone();
            map.insert(head.clone(), child);
            Ok(Value::Object(map))
        }
        Some(other) => Err(PathError::NotAnObject {
            segment: head.clone(),
            at: other.type_name().to_string(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
