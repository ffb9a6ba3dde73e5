//! Record error taxonomy
//!
//! Error codes:
//! - INSTRUCT_UNSUPPORTED_TYPE_EXPR (FATAL)
//! - INSTRUCT_SCHEMA_DEFINITION (FATAL)
//! - INSTRUCT_FIELD_TYPE (REJECT)
//! - INSTRUCT_RANGE (REJECT)
//! - INSTRUCT_UNRECOGNIZED_FIELD (REJECT)
//! - INSTRUCT_CLASS_CREATION_FAILED (REJECT)
//! - INSTRUCT_KEY_ERROR (REJECT)
//!
//! Declaration-time errors are fatal: the template is never built.
//! Value errors reject a single set or a single construction.

use serde_json::{Map as JsonMap, Value as JsonValue};
use std::fmt;

use crate::serialize::value_to_json;
use crate::value::Value;

/// Severity levels for record errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The offending value or call is rejected
    Reject,
    /// The template cannot be built
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Reject => write!(f, "REJECT"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Stable error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Type expression construct that the evaluator does not know
    UnsupportedTypeExpr,
    /// Malformed schema: bad coercion map, unknown listener field, bad default
    SchemaDefinition,
    /// Value does not satisfy the field predicate
    FieldType,
    /// Value falls outside a `Range` annotation
    Range,
    /// Constructor received a name that is not a field
    UnrecognizedField,
    /// Constructor collected one or more errors
    ClassCreationFailed,
    /// Item access on a name that is not a retained field
    KeyError,
}

impl ErrorKind {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::UnsupportedTypeExpr => "INSTRUCT_UNSUPPORTED_TYPE_EXPR",
            ErrorKind::SchemaDefinition => "INSTRUCT_SCHEMA_DEFINITION",
            ErrorKind::FieldType => "INSTRUCT_FIELD_TYPE",
            ErrorKind::Range => "INSTRUCT_RANGE",
            ErrorKind::UnrecognizedField => "INSTRUCT_UNRECOGNIZED_FIELD",
            ErrorKind::ClassCreationFailed => "INSTRUCT_CLASS_CREATION_FAILED",
            ErrorKind::KeyError => "INSTRUCT_KEY_ERROR",
        }
    }

    /// Returns the kind name used in the JSON form
    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::UnsupportedTypeExpr => "UnsupportedTypeExpr",
            ErrorKind::SchemaDefinition => "SchemaDefinitionError",
            ErrorKind::FieldType => "FieldTypeError",
            ErrorKind::Range => "RangeError",
            ErrorKind::UnrecognizedField => "UnrecognizedFieldError",
            ErrorKind::ClassCreationFailed => "ClassCreationFailed",
            ErrorKind::KeyError => "KeyError",
        }
    }

    /// Returns the severity level for this kind
    pub fn severity(&self) -> Severity {
        match self {
            ErrorKind::UnsupportedTypeExpr | ErrorKind::SchemaDefinition => Severity::Fatal,
            _ => Severity::Reject,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Record error with full context
#[derive(Debug, Clone)]
pub struct RecordError {
    kind: ErrorKind,
    message: String,
    field: Option<String>,
    value: Option<JsonValue>,
    expected: Option<String>,
    errors: Vec<RecordError>,
}

impl RecordError {
    fn bare(kind: ErrorKind, message: String) -> Self {
        Self {
            kind,
            message,
            field: None,
            value: None,
            expected: None,
            errors: Vec::new(),
        }
    }

    /// Create an unsupported type expression error
    pub fn unsupported_type_expr(expr: impl Into<String>, reason: impl fmt::Display) -> Self {
        let expr = expr.into();
        let mut err = Self::bare(
            ErrorKind::UnsupportedTypeExpr,
            format!("Unsupported type expression '{}': {}", expr, reason),
        );
        err.value = Some(JsonValue::String(expr));
        err
    }

    /// Create a schema definition error
    pub fn schema_definition(message: impl Into<String>) -> Self {
        Self::bare(ErrorKind::SchemaDefinition, message.into())
    }

    /// Create a field type error
    pub fn field_type(field: impl Into<String>, value: &Value, expected: impl Into<String>) -> Self {
        let field = field.into();
        let expected = expected.into();
        let mut err = Self::bare(
            ErrorKind::FieldType,
            format!(
                "Unable to set '{}' to {} ({}): expected {}",
                field,
                value,
                value.type_name(),
                expected
            ),
        );
        err.field = Some(field);
        err.value = Some(value_to_json(value));
        err.expected = Some(expected);
        err
    }

    /// Create a field type error for a coercion transform that failed
    pub fn coercion_failed(
        field: impl Into<String>,
        value: &Value,
        expected: impl Into<String>,
        reason: impl fmt::Display,
    ) -> Self {
        let field = field.into();
        let mut err = Self::field_type(field.clone(), value, expected);
        err.message = format!("Coercion of '{}' from {} failed: {}", field, value, reason);
        err
    }

    /// Create a range error
    pub fn range(field: impl Into<String>, value: &Value, range: impl Into<String>) -> Self {
        let field = field.into();
        let range = range.into();
        let mut err = Self::bare(
            ErrorKind::Range,
            format!("Value {} for '{}' is outside {}", value, field, range),
        );
        err.field = Some(field);
        err.value = Some(value_to_json(value));
        err.expected = Some(range);
        err
    }

    /// Create an unrecognized field error
    pub fn unrecognized_field(template: &str, name: impl Into<String>) -> Self {
        let name = name.into();
        let mut err = Self::bare(
            ErrorKind::UnrecognizedField,
            format!("{} has no field '{}'", template, name),
        );
        err.field = Some(name);
        err
    }

    /// Create a construction failure aggregating every collected error
    pub fn class_creation_failed(template: &str, errors: Vec<RecordError>) -> Self {
        let mut err = Self::bare(
            ErrorKind::ClassCreationFailed,
            format!(
                "Unable to construct {}, encountered {} error{}",
                template,
                errors.len(),
                if errors.len() == 1 { "" } else { "s" }
            ),
        );
        err.errors = errors;
        err
    }

    /// Create a key error
    pub fn key_error(name: impl Into<String>) -> Self {
        let name = name.into();
        let mut err = Self::bare(ErrorKind::KeyError, format!("'{}'", name));
        err.field = Some(name);
        err
    }

    /// Attach the offending field name
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    /// Attach child errors
    pub fn with_children(mut self, errors: Vec<RecordError>) -> Self {
        self.errors.extend(errors);
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn severity(&self) -> Severity {
        self.kind.severity()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn field(&self) -> Option<&str> {
        self.field.as_deref()
    }

    pub fn value(&self) -> Option<&JsonValue> {
        self.value.as_ref()
    }

    pub fn expected(&self) -> Option<&str> {
        self.expected.as_deref()
    }

    /// Child errors (non-empty for `ClassCreationFailed`)
    pub fn errors(&self) -> &[RecordError] {
        &self.errors
    }

    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }

    /// Counts leaf errors of the given kind, descending through aggregates.
    pub fn count_kind(&self, kind: ErrorKind) -> usize {
        if self.errors.is_empty() {
            return usize::from(self.kind == kind);
        }
        self.errors.iter().map(|e| e.count_kind(kind)).sum()
    }

    fn shallow_json(&self) -> JsonMap<String, JsonValue> {
        let mut obj = JsonMap::new();
        obj.insert("kind".into(), JsonValue::String(self.kind.name().into()));
        obj.insert("code".into(), JsonValue::String(self.kind.code().into()));
        obj.insert("message".into(), JsonValue::String(self.message.clone()));
        if let Some(field) = &self.field {
            obj.insert("field".into(), JsonValue::String(field.clone()));
        }
        if let Some(value) = &self.value {
            obj.insert("value".into(), value.clone());
        }
        if let Some(expected) = &self.expected {
            obj.insert("expected".into(), JsonValue::String(expected.clone()));
        }
        obj
    }

    /// Structured JSON form, children nested under `errors`.
    pub fn to_json(&self) -> JsonValue {
        let mut obj = self.shallow_json();
        if !self.errors.is_empty() {
            obj.insert(
                "errors".into(),
                JsonValue::Array(self.errors.iter().map(|e| e.to_json()).collect()),
            );
        }
        JsonValue::Object(obj)
    }

    /// One JSON object per leaf error, each carrying the chain of parent
    /// messages and kinds from the outermost aggregate inwards.
    pub fn to_json_leaves(&self) -> Vec<JsonValue> {
        let mut out = Vec::new();
        let mut parents = Vec::new();
        self.collect_leaves(&mut parents, &mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, parents: &mut Vec<&'a RecordError>, out: &mut Vec<JsonValue>) {
        if self.errors.is_empty() {
            let mut obj = self.shallow_json();
            if !parents.is_empty() {
                obj.insert(
                    "parent_messages".into(),
                    parents
                        .iter()
                        .map(|p| JsonValue::String(p.message.clone()))
                        .collect(),
                );
                obj.insert(
                    "parent_types".into(),
                    parents
                        .iter()
                        .map(|p| JsonValue::String(p.kind.name().into()))
                        .collect(),
                );
            }
            out.push(JsonValue::Object(obj));
            return;
        }
        parents.push(self);
        for child in &self.errors {
            child.collect_leaves(parents, out);
        }
        parents.pop();
    }
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity(), self.kind.code(), self.message)?;
        for child in &self.errors {
            write!(f, "\n  - {}", child.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for RecordError {}

/// Result type for record operations
pub type RecordResult<T> = Result<T, RecordError>;
