//! Canonical schema form and shape ids
//!
//! Equal canonical forms mean one template. Closures take part through
//! their `Arc` address, so two declarations sharing a transform collapse
//! while two separately written transforms do not.

use serde_json::{json, Value as JsonValue};
use sha2::{Digest, Sha256};

use super::projection::Projection;
use super::types::{closure_addr, Schema};
use crate::types::TypeExpr;

/// Hex SHA-256 of the compact JSON rendering.
pub fn shape_id(canonical: &JsonValue) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Canonical form of a publicly declared schema.
pub fn declared_form(name: &str, schema: &Schema, parent: Option<&str>) -> JsonValue {
    let fields: Vec<JsonValue> = schema
        .fields()
        .iter()
        .map(|f| {
            json!({
                "name": f.name(),
                "type": f.expr().canonical(),
                "annotations": f.annotations().iter().map(|a| a.to_string()).collect::<Vec<_>>(),
                "default": f.default_value().map(|v| format!("{}:{}", v.type_name(), v)),
                "listeners": f.listeners().iter().map(closure_addr).collect::<Vec<_>>(),
                "on_type_error": f.type_error_handler().map(closure_addr),
                "encoder": f.encoder().map(closure_addr),
            })
        })
        .collect();
    let coercions: Vec<JsonValue> = schema
        .coercions()
        .iter()
        .map(|c| json!([c.fields(), c.accepted().canonical(), c.transform_addr()]))
        .collect();
    let generics: Vec<JsonValue> = schema
        .generics()
        .iter()
        .map(|g| json!([g.name, g.default.as_ref().map(TypeExpr::canonical)]))
        .collect();
    json!({
        "kind": "declared",
        "name": name,
        "parent": parent,
        "fields": fields,
        "coercions": coercions,
        "mixins": schema.mixins().names(),
        "generics": generics,
    })
}

/// Canonical form of `base - skipped`.
pub fn projection_form(base_shape: &str, skipped: &Projection) -> JsonValue {
    json!({
        "kind": "projection",
        "base": base_shape,
        "skip": skipped.to_json(),
    })
}

/// Canonical form of a generic specialisation.
pub fn specialization_form(generic_shape: &str, bindings: &[(String, TypeExpr)]) -> JsonValue {
    json!({
        "kind": "specialization",
        "generic": generic_shape,
        "bindings": bindings
            .iter()
            .map(|(name, expr)| json!([name, expr.canonical()]))
            .collect::<Vec<_>>(),
    })
}
