//! Schema loader for JSON declaration documents
//!
//! ```json
//! {
//!   "name": "Item",
//!   "fields": {"foo": "str", "bar": "Annotated[int, Range(0, 256)]"},
//!   "annotations": {"foo": ["NoJSON", {"Range": [0, 10, "closed"]}]},
//!   "defaults": {"bar": 1},
//!   "mixins": ["history"],
//!   "generics": ["T"],
//!   "extends": "Base"
//! }
//! ```
//!
//! A document may also be an array of such objects. Documents are declared
//! in order, so later ones can name earlier ones. Coercions and listeners
//! are programmatic only.

use serde::Deserialize;
use serde_json::{Map as JsonMap, Value as JsonValue};
use std::sync::Arc;

use super::builder::SchemaSpec;
use super::types::Mixins;
use crate::errors::{RecordError, RecordResult};
use crate::observability::{log_event, Event};
use crate::serialize::decode_value;
use crate::template::{RecordTemplate, Registry};
use crate::types::{parse_type_expr, AnnotationMeta, Interval, ParseContext, Range};
use crate::value::Value;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SchemaDocument {
    name: String,
    fields: JsonMap<String, JsonValue>,
    #[serde(default)]
    annotations: JsonMap<String, JsonValue>,
    #[serde(default)]
    defaults: JsonMap<String, JsonValue>,
    #[serde(default)]
    mixins: Vec<String>,
    #[serde(default)]
    generics: Vec<String>,
    #[serde(default)]
    extends: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Documents {
    Many(Vec<SchemaDocument>),
    One(SchemaDocument),
}

fn resolve_global(name: &str) -> Option<Arc<RecordTemplate>> {
    Registry::global().lookup_public(name)
}

/// Declares templates from JSON documents and keeps what it declared.
#[derive(Debug, Default)]
pub struct SchemaLoader {
    templates: Vec<Arc<RecordTemplate>>,
}

impl SchemaLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// One-shot load of a document string.
    pub fn from_json_str(text: &str) -> RecordResult<Vec<Arc<RecordTemplate>>> {
        let mut loader = Self::new();
        loader.load_str(text)?;
        Ok(loader.templates)
    }

    /// Loads every document in `text`; returns how many were declared.
    pub fn load_str(&mut self, text: &str) -> RecordResult<usize> {
        let documents: Documents = serde_json::from_str(text)
            .map_err(|e| RecordError::schema_definition(format!("Invalid schema document: {}", e)))?;
        let documents = match documents {
            Documents::Many(docs) => docs,
            Documents::One(doc) => vec![doc],
        };
        let count = documents.len();
        for document in documents {
            let template = self.declare_document(document)?;
            self.templates.push(template);
        }
        log_event(Event::SchemaLoaded, &[("count", &count.to_string())]);
        Ok(count)
    }

    /// Loads a parsed JSON value.
    pub fn load_value(&mut self, value: &JsonValue) -> RecordResult<usize> {
        self.load_str(&value.to_string())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<RecordTemplate>> {
        self.templates.iter().rev().find(|t| t.name() == name)
    }

    /// Templates in declaration order.
    pub fn templates(&self) -> &[Arc<RecordTemplate>] {
        &self.templates
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    fn declare_document(&self, doc: SchemaDocument) -> RecordResult<Arc<RecordTemplate>> {
        let mut spec = SchemaSpec::new(doc.name.clone());

        if let Some(base_name) = &doc.extends {
            let base = self
                .get(base_name)
                .cloned()
                .or_else(|| resolve_global(base_name))
                .ok_or_else(|| {
                    RecordError::schema_definition(format!(
                        "{} extends unknown template '{}'",
                        doc.name, base_name
                    ))
                })?;
            spec = spec.extends(&base);
        }
        for generic in &doc.generics {
            spec = spec.generic(generic.clone());
        }
        for mixin in &doc.mixins {
            let flag = Mixins::parse_name(mixin).ok_or_else(|| {
                RecordError::schema_definition(format!("unknown mixin '{}'", mixin))
            })?;
            spec = spec.mixin(flag);
        }
        for (name, ty) in &doc.fields {
            let text = ty.as_str().ok_or_else(|| {
                RecordError::schema_definition(format!("type of '{}' must be a string", name))
                    .with_field(name.clone())
            })?;
            spec = spec.field(name.clone(), text);
        }
        for (name, metas) in &doc.annotations {
            let metas = match metas {
                JsonValue::Array(items) => items.clone(),
                single => vec![single.clone()],
            };
            for meta in &metas {
                spec = spec.annotate(name.clone(), parse_meta(name, meta)?);
            }
        }
        for (name, json) in &doc.defaults {
            let value = self.decode_default(&doc, name, json)?;
            spec = spec.default(name.clone(), value);
        }
        spec.declare()
    }

    fn decode_default(&self, doc: &SchemaDocument, name: &str, json: &JsonValue) -> RecordResult<Value> {
        let text = doc
            .fields
            .get(name)
            .and_then(JsonValue::as_str)
            .ok_or_else(|| {
                RecordError::schema_definition(format!("default for unknown field '{}'", name))
                    .with_field(name.to_string())
            })?;
        let ctx = ParseContext {
            self_name: Some(&doc.name),
            type_vars: &doc.generics,
            resolver: &resolve_global,
        };
        let expr = parse_type_expr(text, &ctx)?;
        decode_value(json, &expr, None).map_err(|e| e.with_field(name.to_string()))
    }
}

/// `"NoJSON"` or `{"Range": [lo, hi, openness?]}`.
fn parse_meta(field: &str, json: &JsonValue) -> RecordResult<AnnotationMeta> {
    let invalid = || {
        RecordError::schema_definition(format!("invalid annotation {} on '{}'", json, field))
            .with_field(field.to_string())
    };
    match json {
        JsonValue::String(flag) => AnnotationMeta::parse_flag(flag).ok_or_else(invalid),
        JsonValue::Object(obj) => {
            let args = obj.get("Range").and_then(JsonValue::as_array).ok_or_else(invalid)?;
            let bound = |v: Option<&JsonValue>| -> RecordResult<Value> {
                match v {
                    Some(JsonValue::Number(n)) => match n.as_i64() {
                        Some(i) => Ok(Value::Int(i)),
                        None => n.as_f64().map(Value::Float).ok_or_else(invalid),
                    },
                    _ => Err(invalid()),
                }
            };
            let mut range = Range::new(bound(args.first())?, bound(args.get(1))?);
            if let Some(openness) = args.get(2) {
                let interval = openness.as_str().and_then(Interval::parse).ok_or_else(invalid)?;
                range = range.with_interval(interval);
            }
            Ok(AnnotationMeta::Range(range))
        }
        _ => Err(invalid()),
    }
}
