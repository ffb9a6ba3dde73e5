//! Type-directed JSON decoding
//!
//! JSON carries less type information than a schema does, so decoding looks
//! at the target field type to decide what a string, array or object
//! becomes. Values that cannot be decoded to the wanted type are passed on
//! as-is and rejected by the set pipeline, which reports the field.

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine as _;
use chrono::{DateTime, NaiveDate};
use serde_json::Value as JsonValue;
use std::sync::Arc;

use super::encode::BASE64_PREFIX;
use crate::errors::{ErrorKind, RecordError, RecordResult};
use crate::instance::Instance;
use crate::schema::Mixins;
use crate::template::RecordTemplate;
use crate::types::{AtomicType, TypeExpr};
use crate::value::Value;

/// Whether some top-level alternative of `expr` admits values of `atomic`.
fn admits(expr: &TypeExpr, atomic: AtomicType) -> bool {
    expr.alternatives().into_iter().any(|alt| match alt {
        TypeExpr::Atomic(a) => *a == atomic || *a == AtomicType::Any,
        TypeExpr::TypeVar(_) => true,
        TypeExpr::Literal(values) => values.iter().any(|v| atomic.matches(v)),
        _ => false,
    })
}

fn decode_str(s: &str, expr: &TypeExpr) -> Value {
    if admits(expr, AtomicType::Str) {
        return Value::Str(s.to_string());
    }
    if admits(expr, AtomicType::Bytes) {
        if let Some(encoded) = s.strip_prefix(BASE64_PREFIX) {
            if let Ok(bytes) = URL_SAFE.decode(encoded) {
                return Value::Bytes(bytes);
            }
        }
    }
    if admits(expr, AtomicType::DateTime) {
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Value::DateTime(dt);
        }
    }
    if admits(expr, AtomicType::Date) {
        if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            return Value::Date(d);
        }
    }
    Value::Str(s.to_string())
}

fn decode_key(key: &str, expr: &TypeExpr) -> Value {
    if admits(expr, AtomicType::Str) {
        return Value::Str(key.to_string());
    }
    if admits(expr, AtomicType::Int) {
        if let Ok(i) = key.parse::<i64>() {
            return Value::Int(i);
        }
    }
    if admits(expr, AtomicType::Float) {
        if let Ok(f) = key.parse::<f64>() {
            return Value::Float(f);
        }
    }
    if admits(expr, AtomicType::Bool) {
        match key {
            "true" => return Value::Bool(true),
            "false" => return Value::Bool(false),
            _ => {}
        }
    }
    decode_str(key, expr)
}

/// Decodes `json` towards `expr`. `owner` resolves self-references.
///
/// # Errors
///
/// Only nested record construction fails; every other mismatch is left for
/// the type check.
pub fn decode_value(
    json: &JsonValue,
    expr: &TypeExpr,
    owner: Option<&Arc<RecordTemplate>>,
) -> RecordResult<Value> {
    Ok(match json {
        JsonValue::Null => Value::Null,
        JsonValue::Bool(b) => Value::Bool(*b),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) if admits(expr, AtomicType::Int) || !admits(expr, AtomicType::Float) => Value::Int(i),
            Some(i) => Value::Float(i as f64),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        JsonValue::String(s) => decode_str(s, expr),
        JsonValue::Array(items) => decode_array(items, expr, owner)?,
        JsonValue::Object(_) => decode_object(json, expr, owner)?,
    })
}

fn decode_array(
    items: &[JsonValue],
    expr: &TypeExpr,
    owner: Option<&Arc<RecordTemplate>>,
) -> RecordResult<Value> {
    let each = |element: &TypeExpr| -> RecordResult<Vec<Value>> {
        items.iter().map(|item| decode_value(item, element, owner)).collect()
    };
    for alt in expr.alternatives() {
        match alt {
            TypeExpr::Tuple(elements) if elements.len() == items.len() => {
                return Ok(Value::Tuple(
                    items
                        .iter()
                        .zip(elements)
                        .map(|(item, element)| decode_value(item, element, owner))
                        .collect::<RecordResult<_>>()?,
                ))
            }
            TypeExpr::Set(element) => return Ok(Value::set(each(element)?)),
            TypeExpr::Sequence(element) => return Ok(Value::List(each(element)?)),
            _ => {}
        }
    }
    Ok(Value::List(each(&TypeExpr::any())?))
}

fn decode_object(
    json: &JsonValue,
    expr: &TypeExpr,
    owner: Option<&Arc<RecordTemplate>>,
) -> RecordResult<Value> {
    let mut first_error = None;
    for alt in expr.alternatives() {
        let target = match alt {
            TypeExpr::Record(t) => Some(Arc::clone(t)),
            TypeExpr::SelfRef => owner.cloned(),
            _ => None,
        };
        if let Some(template) = target {
            match decode_instance(&template, json) {
                Ok(inst) => return Ok(Value::Record(Box::new(inst))),
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }
    }

    let JsonValue::Object(obj) = json else {
        return Ok(Value::Null);
    };
    for alt in expr.alternatives() {
        if let TypeExpr::Mapping(key, value) = alt {
            let mut pairs = Vec::with_capacity(obj.len());
            for (k, v) in obj {
                pairs.push((decode_key(k, key), decode_value(v, value, owner)?));
            }
            return Ok(Value::Map(pairs));
        }
    }
    if let Some(err) = first_error {
        return Err(err);
    }
    let mut pairs = Vec::with_capacity(obj.len());
    for (k, v) in obj {
        pairs.push((Value::Str(k.clone()), decode_value(v, &TypeExpr::any(), owner)?));
    }
    Ok(Value::Map(pairs))
}

/// Builds an instance from a JSON object.
///
/// Keys the template has projected away are ignored. Decode failures and
/// construction failures are reported together in one
/// `ClassCreationFailed`.
pub fn decode_instance(template: &Arc<RecordTemplate>, json: &JsonValue) -> RecordResult<Instance> {
    let JsonValue::Object(obj) = json else {
        let found = decode_value(json, &TypeExpr::any(), None)?;
        return Err(RecordError::class_creation_failed(
            template.name(),
            vec![RecordError::field_type(template.name(), &found, "object")],
        ));
    };

    let mut named = Vec::with_capacity(obj.len());
    let mut errors = Vec::new();
    for (key, raw) in obj {
        match template.field(key) {
            Some(field) => match decode_value(raw, field.expr(), Some(template)) {
                Ok(value) => named.push((key.clone(), value)),
                Err(err) => errors.push(err.with_field(key.clone())),
            },
            None if template.knows_field(key) => {}
            None => named.push((key.clone(), decode_value(raw, &TypeExpr::any(), None)?)),
        }
    }

    match template.instantiate(Vec::new(), named) {
        Ok(inst) if errors.is_empty() => Ok(inst),
        Ok(_) => Err(RecordError::class_creation_failed(template.name(), errors)),
        Err(err) => {
            if err.kind() == ErrorKind::ClassCreationFailed {
                errors.extend(err.errors().iter().cloned());
            } else {
                errors.push(err);
            }
            Err(RecordError::class_creation_failed(template.name(), errors))
        }
    }
}

/// Decodes every element of a JSON array; failures are aggregated with
/// their positions.
pub fn decode_many(template: &Arc<RecordTemplate>, json: &JsonValue) -> RecordResult<Vec<Instance>> {
    let JsonValue::Array(items) = json else {
        return Ok(vec![decode_instance(template, json)?]);
    };
    let mut out = Vec::with_capacity(items.len());
    let mut errors = Vec::new();
    for (index, item) in items.iter().enumerate() {
        match decode_instance(template, item) {
            Ok(inst) => out.push(inst),
            Err(err) => errors.push(err.with_field(format!("[{}]", index))),
        }
    }
    if errors.is_empty() {
        Ok(out)
    } else {
        Err(RecordError::class_creation_failed(template.name(), errors))
    }
}

impl RecordTemplate {
    /// JSON constructor of the `json` mixin.
    pub fn from_json(self: &Arc<Self>, json: &JsonValue) -> RecordResult<Instance> {
        if !self.has_mixin(Mixins::JSON) {
            return Err(RecordError::schema_definition(format!(
                "{} does not use the json mixin",
                self.name()
            )));
        }
        decode_instance(self, json)
    }
}
