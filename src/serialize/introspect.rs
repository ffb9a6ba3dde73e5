//! Structural schema descriptors

use serde_json::{json, Map as JsonMap, Value as JsonValue};

use super::encode::value_to_json;
use crate::schema::FieldSpec;
use crate::template::RecordTemplate;
use crate::types::{AnnotationMeta, AtomicType, TypeExpr};

/// `{"type": "record", "name": ..., "fields": {name: descriptor, ...}}`
pub fn schema_for(template: &RecordTemplate) -> JsonValue {
    let mut fields = JsonMap::new();
    for field in template.fields() {
        fields.insert(field.name().to_string(), describe_field(field, template));
    }
    json!({
        "type": "record",
        "name": template.name(),
        "fields": fields,
    })
}

fn describe_field(field: &FieldSpec, owner: &RecordTemplate) -> JsonValue {
    let mut descriptor = describe(field.expr(), owner);
    if !field.annotations().is_empty() {
        if let JsonValue::Object(obj) = &mut descriptor {
            obj.insert("annotations".into(), annotations_json(field.annotations()));
        }
    }
    descriptor
}

fn annotations_json(metas: &[AnnotationMeta]) -> JsonValue {
    JsonValue::Array(metas.iter().map(|m| JsonValue::String(m.to_string())).collect())
}

fn describe(expr: &TypeExpr, owner: &RecordTemplate) -> JsonValue {
    match expr {
        TypeExpr::Atomic(AtomicType::Any) => json!({"type": "any"}),
        TypeExpr::Atomic(AtomicType::None) => json!({"type": "null"}),
        TypeExpr::Atomic(a) => json!({"type": a.name()}),
        TypeExpr::Union(members) => {
            json!({"oneof": members.iter().map(|m| describe(m, owner)).collect::<Vec<_>>()})
        }
        TypeExpr::Literal(values) => json!({
            "oneof": values.iter().map(|v| json!({"const": value_to_json(v)})).collect::<Vec<_>>()
        }),
        TypeExpr::Sequence(e) => json!({"type": "array", "items": describe(e, owner)}),
        TypeExpr::Set(e) => json!({"type": "set", "items": describe(e, owner)}),
        TypeExpr::Tuple(elements) => json!({
            "type": "tuple",
            "items": elements.iter().map(|e| describe(e, owner)).collect::<Vec<_>>()
        }),
        TypeExpr::Mapping(k, v) => json!({
            "type": "object",
            "keys": describe(k, owner),
            "values": describe(v, owner)
        }),
        TypeExpr::Annotated(inner, metas) => {
            let mut descriptor = describe(inner, owner);
            if let JsonValue::Object(obj) = &mut descriptor {
                obj.insert("annotations".into(), annotations_json(metas));
            }
            descriptor
        }
        TypeExpr::Record(t) => schema_for(t),
        TypeExpr::SelfRef => json!({"type": "record", "name": owner.name(), "self": true}),
        TypeExpr::TypeVar(name) => json!({"type": "any", "typevar": name}),
    }
}
