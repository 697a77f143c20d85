//! Structural validation, default synthesis, and inference for schemas.
//!
//! These are pure functions over `trellis_types::schema` values. Failures
//! surface as boolean validity, never as errors -- callers that need a
//! message attach their own context.

use std::collections::BTreeMap;

use trellis_types::schema::{FileHandle, Schema, Value, ValueType};

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Whether a value's structure conforms to a schema.
///
/// Arrays require `is_array` and element-wise conformance; objects with
/// declared `fields` must carry exactly the declared fields (missing and
/// extra fields both reject).
pub fn validate(schema: &Schema, value: &Value) -> bool {
    if schema.is_array {
        let Value::Array(items) = value else {
            return false;
        };
        let element = schema.element();
        return items.iter().all(|item| validate(&element, item));
    }

    match (schema.value_type, value) {
        (ValueType::String, Value::String(_)) => true,
        (ValueType::Number, Value::Number(_)) => true,
        (ValueType::Boolean, Value::Bool(_)) => true,
        (ValueType::File, Value::File(_)) => true,
        (ValueType::Object, Value::Object(map)) => match &schema.fields {
            Some(fields) => {
                fields.len() == map.len()
                    && fields.iter().all(|(name, field_schema)| {
                        map.get(name)
                            .is_some_and(|field| validate(field_schema, field))
                    })
            }
            None => true,
        },
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Default synthesis
// ---------------------------------------------------------------------------

/// Synthesize the default value for a schema.
///
/// `""` for strings, `0` for numbers, `false` for booleans, `[]` for any
/// array schema, a recursively-defaulted object for object schemas, and an
/// empty file handle for file schemas.
pub fn default_value(schema: &Schema) -> Value {
    if schema.is_array {
        return Value::Array(Vec::new());
    }
    match schema.value_type {
        ValueType::String => Value::String(String::new()),
        ValueType::Number => Value::Number(0.0),
        ValueType::Boolean => Value::Bool(false),
        ValueType::File => Value::File(FileHandle::empty()),
        ValueType::Object => Value::Object(
            schema
                .fields
                .iter()
                .flatten()
                .map(|(name, field_schema)| (name.clone(), default_value(field_schema)))
                .collect(),
        ),
    }
}

// ---------------------------------------------------------------------------
// Inference
// ---------------------------------------------------------------------------

/// Infer a minimal schema from a value's runtime shape.
///
/// Used when recording ad-hoc outputs. An empty array infers a string
/// array; non-empty arrays take their element schema from the first
/// element.
pub fn infer_schema(value: &Value) -> Schema {
    match value {
        Value::String(_) => Schema::string(),
        Value::Number(_) => Schema::number(),
        Value::Bool(_) => Schema::boolean(),
        Value::File(_) => Schema::file(),
        Value::Object(map) => Schema::object(
            map.iter()
                .map(|(name, field)| (name.clone(), infer_schema(field)))
                .collect::<BTreeMap<_, _>>(),
        ),
        Value::Array(items) => items
            .first()
            .map(infer_schema)
            .unwrap_or_else(Schema::string)
            .into_array(),
    }
}

// ---------------------------------------------------------------------------
// Compatibility
// ---------------------------------------------------------------------------

/// Whether a source schema can bind to a destination schema.
///
/// Types and array-ness must match, with one allowance: a scalar string
/// destination accepts a string-array source (the dispatcher joins the
/// elements with newlines at invocation time). Object destinations require
/// every declared destination field to have a compatible same-named source
/// field; extra source fields are permitted.
pub fn is_compatible(dst: &Schema, src: &Schema) -> bool {
    if dst.value_type == ValueType::String
        && !dst.is_array
        && src.value_type == ValueType::String
        && src.is_array
    {
        return true;
    }

    if dst.value_type != src.value_type || dst.is_array != src.is_array {
        return false;
    }

    if dst.value_type == ValueType::Object {
        if let Some(dst_fields) = &dst.fields {
            let Some(src_fields) = &src.fields else {
                return false;
            };
            return dst_fields.iter().all(|(name, dst_field)| {
                src_fields
                    .get(name)
                    .is_some_and(|src_field| is_compatible(dst_field, src_field))
            });
        }
    }

    true
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
