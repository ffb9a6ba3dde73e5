//! Free-function collaborator surface
//!
//! Thin wrappers over instance, template and serialisation methods, plus
//! the nested-template navigation used by `keys` and `public_class`.

use serde_json::Value as JsonValue;
use std::sync::Arc;

use crate::errors::{RecordError, RecordResult};
use crate::instance::{Instance, LoggedDelta};
use crate::serialize;
use crate::template::{HasTemplate, RecordTemplate};
use crate::value::Value;

/// JSON form of an instance, `NoJSON` fields omitted.
pub fn asjson(inst: &Instance) -> JsonValue {
    serialize::encode_instance(inst)
}

/// Iteration items as a map; nested instances become maps too.
pub fn asdict(inst: &Instance) -> Value {
    Value::Map(
        inst.iter()
            .map(|(k, v)| (Value::from(k), unwrap_records(v, asdict)))
            .collect(),
    )
}

/// Iteration values as a list; nested instances become lists too.
pub fn aslist(inst: &Instance) -> Value {
    Value::List(inst.iter().map(|(_, v)| unwrap_records(v, aslist)).collect())
}

/// Iteration values as a tuple; nested instances become tuples too.
pub fn astuple(inst: &Instance) -> Value {
    Value::Tuple(inst.iter().map(|(_, v)| unwrap_records(v, astuple)).collect())
}

fn unwrap_records(value: &Value, convert: fn(&Instance) -> Value) -> Value {
    match value {
        Value::Record(inst) => convert(inst),
        Value::List(items) => Value::List(items.iter().map(|v| unwrap_records(v, convert)).collect()),
        Value::Tuple(items) => Value::Tuple(items.iter().map(|v| unwrap_records(v, convert)).collect()),
        Value::Set(items) => Value::Set(items.iter().map(|v| unwrap_records(v, convert)).collect()),
        Value::Map(pairs) => Value::Map(
            pairs
                .iter()
                .map(|(k, v)| (k.clone(), unwrap_records(v, convert)))
                .collect(),
        ),
        other => other.clone(),
    }
}

pub fn from_json(template: &Arc<RecordTemplate>, json: &JsonValue) -> RecordResult<Instance> {
    serialize::decode_instance(template, json)
}

/// Decodes a JSON array of objects.
pub fn from_many_json(template: &Arc<RecordTemplate>, json: &JsonValue) -> RecordResult<Vec<Instance>> {
    serialize::decode_many(template, json)
}

/// Follows `path` through nested record fields. A self-referencing field
/// leads back to the current template.
fn navigate(start: &Arc<RecordTemplate>, path: &[&str]) -> RecordResult<Arc<RecordTemplate>> {
    let mut current = Arc::clone(start);
    for name in path {
        let field = current.field(name).ok_or_else(|| RecordError::key_error(*name))?;
        let next = match field.expr().references().into_iter().next() {
            Some(nested) => nested,
            None if field.expr().contains_self_ref() => Arc::clone(&current),
            None => {
                return Err(RecordError::schema_definition(format!(
                    "field '{}' of {} does not refer to a record template",
                    name,
                    current.name()
                ))
                .with_field(*name))
            }
        };
        current = next;
    }
    Ok(current)
}

/// Retained field names of the template reached through `path`.
pub fn keys<T: HasTemplate + ?Sized>(target: &T, path: &[&str]) -> RecordResult<Vec<String>> {
    let template = navigate(target.template(), path)?;
    Ok(template.field_names().into_iter().map(String::from).collect())
}

pub fn values(inst: &Instance) -> Vec<Value> {
    inst.iter().map(|(_, v)| v.clone()).collect()
}

pub fn items(inst: &Instance) -> Vec<(String, Value)> {
    inst.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

/// Governing template of `target`, or of the nested template reached
/// through `path`.
///
/// Without `preserve_subtraction` projections are skipped and the nearest
/// declared or specialised template is returned.
pub fn public_class<T: HasTemplate + ?Sized>(
    target: &T,
    path: &[&str],
    preserve_subtraction: bool,
) -> RecordResult<Arc<RecordTemplate>> {
    let template = navigate(target.template(), path)?;
    if preserve_subtraction {
        Ok(template)
    } else {
        Ok(template.root_arc())
    }
}

pub fn schema_for(template: &RecordTemplate) -> JsonValue {
    serialize::schema_for(template)
}

/// Resets every field to its schema default.
pub fn clear(inst: &mut Instance) {
    inst.clear();
}

pub fn list_changes(inst: &Instance) -> &[LoggedDelta] {
    inst.list_changes()
}

pub fn is_dirty(inst: &Instance) -> bool {
    inst.is_dirty()
}

/// Restores fields (all when empty) to their clean values.
pub fn reset(inst: &mut Instance, fields: &[&str]) -> RecordResult<()> {
    inst.reset(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Projection, SchemaSpec};

    fn nested() -> (Arc<RecordTemplate>, Arc<RecordTemplate>) {
        let item = SchemaSpec::new("ApiItem")
            .field("foo", "str")
            .field("bar", "int")
            .declare()
            .unwrap();
        let container = SchemaSpec::new("ApiContainer")
            .field("baz", "ApiItem")
            .field("name", "str")
            .declare()
            .unwrap();
        (item, container)
    }

    #[test]
    fn test_keys_follow_path() {
        let (_, container) = nested();
        assert_eq!(keys(&container, &[]).unwrap(), vec!["baz", "name"]);
        assert_eq!(keys(&container, &["baz"]).unwrap(), vec!["foo", "bar"]);
        assert!(keys(&container, &["name"]).is_err());
        assert!(keys(&container, &["zzz"]).is_err());
    }

    #[test]
    fn test_public_class_skips_projections() {
        let (item, container) = nested();
        let projected = container
            .subtract(&Projection::new().nested("baz", Projection::of(["foo"])))
            .unwrap();
        assert!(Arc::ptr_eq(&public_class(&projected, &[], false).unwrap(), &container));
        assert!(Arc::ptr_eq(&public_class(&projected, &[], true).unwrap(), &projected));
        let nested_public = public_class(&projected, &["baz"], false).unwrap();
        assert!(Arc::ptr_eq(&nested_public, &item));
        let nested_projection = public_class(&projected, &["baz"], true).unwrap();
        assert_eq!(nested_projection.field_names(), vec!["bar"]);
    }

    #[test]
    fn test_asdict_unwraps_nested() {
        let (item, container) = nested();
        let inner = item.construct([("foo", Value::from("x")), ("bar", Value::Int(1))]).unwrap();
        let outer = container
            .construct([("baz", Value::from(inner)), ("name", Value::from("n"))])
            .unwrap();
        let dict = asdict(&outer);
        assert_eq!(
            dict.get_key("baz").and_then(|b| b.get_key("bar")),
            Some(&Value::Int(1))
        );
        assert_eq!(
            aslist(&outer),
            Value::list([Value::list([Value::from("x"), Value::Int(1)]), Value::from("n")])
        );
    }
}
