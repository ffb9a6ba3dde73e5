//! JSON encoding
//!
//! - nested instances encode recursively, skipping `NoJSON` fields
//! - datetimes and dates become ISO-8601 strings
//! - bytes become `base64:<urlsafe>` unless the field has a binary encoder
//! - non-finite floats become null

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine as _;
use serde_json::{Map as JsonMap, Number, Value as JsonValue};

use crate::errors::{RecordError, RecordResult};
use crate::instance::Instance;
use crate::schema::{BinaryEncoder, Mixins};
use crate::types::AnnotationFlags;
use crate::value::Value;

pub(crate) const BASE64_PREFIX: &str = "base64:";

/// Encodes one instance.
pub fn encode_instance(inst: &Instance) -> JsonValue {
    let mut obj = JsonMap::new();
    for (field, value) in inst.template().fields().iter().zip(inst.slots()) {
        if field.has_flag(AnnotationFlags::NO_JSON) {
            continue;
        }
        obj.insert(field.name().to_string(), encode_value(value, field.encoder()));
    }
    JsonValue::Object(obj)
}

/// Encodes a value outside any field context.
pub fn value_to_json(value: &Value) -> JsonValue {
    encode_value(value, None)
}

fn encode_value(value: &Value, encoder: Option<&BinaryEncoder>) -> JsonValue {
    match value {
        Value::Null => JsonValue::Null,
        Value::Bool(b) => JsonValue::Bool(*b),
        Value::Int(i) => JsonValue::Number((*i).into()),
        Value::Float(f) => Number::from_f64(*f).map(JsonValue::Number).unwrap_or(JsonValue::Null),
        Value::Str(s) => JsonValue::String(s.clone()),
        Value::Bytes(bytes) => JsonValue::String(match encoder {
            Some(encode) => encode(bytes.as_slice()),
            None => format!("{}{}", BASE64_PREFIX, URL_SAFE.encode(bytes)),
        }),
        Value::DateTime(dt) => JsonValue::String(dt.to_rfc3339()),
        Value::Date(d) => JsonValue::String(d.format("%Y-%m-%d").to_string()),
        Value::List(items) | Value::Tuple(items) | Value::Set(items) => {
            JsonValue::Array(items.iter().map(|v| encode_value(v, encoder)).collect())
        }
        Value::Map(pairs) => JsonValue::Object(
            pairs
                .iter()
                .map(|(k, v)| (k.key_string(), encode_value(v, encoder)))
                .collect(),
        ),
        Value::Record(inst) => encode_instance(inst),
    }
}

impl Instance {
    /// JSON encoder of the `json` mixin.
    pub fn to_json(&self) -> RecordResult<JsonValue> {
        if !self.template().has_mixin(Mixins::JSON) {
            return Err(RecordError::schema_definition(format!(
                "{} does not use the json mixin",
                self.template().name()
            )));
        }
        Ok(encode_instance(self))
    }
}
