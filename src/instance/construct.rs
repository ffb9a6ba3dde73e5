//! Template factory

use std::sync::Arc;

use super::flags::InstanceFlags;
use super::record::Instance;
use crate::config;
use crate::errors::{RecordError, RecordResult};
use crate::observability::{log_event, Event};
use crate::schema::Mixins;
use crate::template::RecordTemplate;
use crate::value::Value;

impl RecordTemplate {
    /// Builds an instance from positional arguments (schema order) then
    /// named arguments.
    ///
    /// Defaults are written first. Every failed assignment is collected
    /// into one `ClassCreationFailed`, unless the template uses the `fast`
    /// mixin or error collection is switched off, in which case the first
    /// failure ends construction.
    pub fn instantiate(
        self: &Arc<Self>,
        positional: Vec<Value>,
        named: Vec<(String, Value)>,
    ) -> RecordResult<Instance> {
        let mut inst = Instance::empty(self);
        inst.insert_flags(InstanceFlags::IN_CONSTRUCTOR);
        inst.write_defaults();

        let stop_early = self.has_mixin(Mixins::FAST) || !config::current().collect_errors;
        let mut errors: Vec<RecordError> = Vec::new();

        let arity = self.fields().len();
        for (index, value) in positional.into_iter().enumerate() {
            if stop_early && !errors.is_empty() {
                break;
            }
            if index >= arity {
                errors.push(RecordError::unrecognized_field(
                    self.name(),
                    format!("<positional {}>", index),
                ));
                continue;
            }
            if let Err(err) = inst.set_at(index, value) {
                errors.push(err);
            }
        }

        for (name, value) in named {
            if stop_early && !errors.is_empty() {
                break;
            }
            match self.index_of(&name) {
                Some(index) => {
                    if let Err(err) = inst.set_at(index, value) {
                        errors.push(err);
                    }
                }
                None => errors.push(RecordError::unrecognized_field(self.name(), name)),
            }
        }

        if !errors.is_empty() {
            log_event(
                Event::ConstructionFailed,
                &[("name", self.name()), ("errors", &errors.len().to_string())],
            );
            return Err(RecordError::class_creation_failed(self.name(), errors));
        }

        inst.finish_construction();
        Ok(inst)
    }

    /// Named arguments only.
    pub fn construct<I, K, V>(self: &Arc<Self>, named: I) -> RecordResult<Instance>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let named = named
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.instantiate(Vec::new(), named)
    }

    /// Positional arguments only.
    pub fn construct_positional<I, V>(self: &Arc<Self>, positional: I) -> RecordResult<Instance>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.instantiate(positional.into_iter().map(Into::into).collect(), Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::schema::SchemaSpec;

    #[test]
    fn test_positional_then_named() {
        let t = SchemaSpec::new("ConstructOrder")
            .field("a", "int")
            .field("b", "int")
            .declare()
            .unwrap();
        let inst = t
            .instantiate(vec![Value::Int(1), Value::Int(2)], vec![("a".into(), Value::Int(9))])
            .unwrap();
        assert_eq!(inst["a"], Value::Int(9));
        assert_eq!(inst["b"], Value::Int(2));
        assert!(inst.flags().contains(InstanceFlags::INITIALIZED));
        assert!(!inst.flags().contains(InstanceFlags::IN_CONSTRUCTOR));
    }

    #[test]
    fn test_errors_are_collected() {
        let t = SchemaSpec::new("ConstructCollect")
            .field("a", "int")
            .field("b", "str")
            .declare()
            .unwrap();
        let err = t
            .instantiate(
                vec![Value::from("x"), Value::Int(2), Value::Int(3)],
                vec![("zzz".into(), Value::Null)],
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ClassCreationFailed);
        assert_eq!(err.errors().len(), 4);
        assert_eq!(err.count_kind(ErrorKind::FieldType), 2);
        assert_eq!(err.count_kind(ErrorKind::UnrecognizedField), 2);
    }

    #[test]
    fn test_fast_mixin_stops_at_first_error() {
        let t = SchemaSpec::new("ConstructFast")
            .field("a", "int")
            .field("b", "int")
            .mixin(Mixins::FAST)
            .declare()
            .unwrap();
        let err = t.construct([("a", "x"), ("b", "y")]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ClassCreationFailed);
        assert_eq!(err.errors().len(), 1);
    }

    #[test]
    fn test_defaults_fill_unset_fields() {
        let t = SchemaSpec::new("ConstructDefaults")
            .field("a", "int")
            .field("tags", "list[str]")
            .default("tags", Value::List(vec![]))
            .declare()
            .unwrap();
        let inst = t.construct([("a", 1)]).unwrap();
        assert_eq!(inst["tags"], Value::List(vec![]));
        assert!(inst.flags().contains(InstanceFlags::DEFAULTS_SET));
    }

    #[test]
    fn test_positional_constructor() {
        let t = SchemaSpec::new("ConstructPositional")
            .field("a", "int")
            .field("b", "str")
            .declare()
            .unwrap();
        let inst = t.construct_positional([Value::Int(1), Value::from("x")]).unwrap();
        assert_eq!(inst["b"], Value::from("x"));
    }
}
