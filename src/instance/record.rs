//! Record instances and the field set pipeline
//!
//! Set order:
//! 1. coercion (when the value satisfies the coercion's accepted type)
//! 2. implicit down-projection of nested instances
//! 3. type check (a type-error handler may swallow the mismatch)
//! 4. range check
//! 5. listeners, skipped while unpickling
//! 6. history
//! 7. store
//!
//! A rejected set leaves the slot untouched. A failing coercion is a type
//! mismatch and reaches the type-error handler. When a listener sets the
//! same field again, that nested write is final and the outer set stops
//! after the listeners.

use std::fmt;
use std::ops::Index;
use std::sync::Arc;

use super::flags::InstanceFlags;
use super::history::{Delta, DeltaState, History, LoggedDelta};
use crate::errors::{RecordError, RecordResult};
use crate::observability::{log_event, Event};
use crate::schema::{FieldSpec, Mixins};
use crate::template::RecordTemplate;
use crate::types::{AnnotationFlags, MatchContext, TypeExpr};
use crate::value::Value;

/// A fixed-shape value governed by a template.
#[derive(Clone)]
pub struct Instance {
    template: Arc<RecordTemplate>,
    slots: Vec<Value>,
    /// Writes through the set path, per slot
    revisions: Vec<u64>,
    flags: InstanceFlags,
    history: Option<History>,
}

impl Instance {
    /// Null slots, no flags. History is allocated only for templates with
    /// the history mixin.
    pub(crate) fn empty(template: &Arc<RecordTemplate>) -> Self {
        Self {
            template: Arc::clone(template),
            slots: vec![Value::Null; template.fields().len()],
            revisions: vec![0; template.fields().len()],
            flags: InstanceFlags::empty(),
            history: template.has_mixin(Mixins::HISTORY).then(History::new),
        }
    }

    pub fn template(&self) -> &Arc<RecordTemplate> {
        &self.template
    }

    pub fn flags(&self) -> InstanceFlags {
        self.flags
    }

    pub(crate) fn insert_flags(&mut self, flags: InstanceFlags) {
        self.flags.insert(flags);
    }

    /// Stored value; `None` only for names that are not retained fields.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.template.index_of(name).map(|i| &self.slots[i])
    }

    /// Like `get`, with a `KeyError` for unknown names.
    pub fn try_get(&self, name: &str) -> RecordResult<&Value> {
        self.get(name).ok_or_else(|| RecordError::key_error(name))
    }

    /// Runs the full set pipeline.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> RecordResult<()> {
        let index = self
            .template
            .index_of(name)
            .ok_or_else(|| RecordError::unrecognized_field(self.template.name(), name))?;
        self.set_at(index, value.into())
    }

    pub(crate) fn set_at(&mut self, index: usize, value: Value) -> RecordResult<()> {
        let template = Arc::clone(&self.template);
        let field = &template.fields()[index];
        let ctx = MatchContext::owned_by(&template);

        let mut value = value;
        if let Some(coercion) = template.schema().coercion_for(field.name()) {
            if coercion.accepts(&value, &ctx) {
                match coercion.apply(&value) {
                    Ok(coerced) => value = coerced,
                    Err(reason) => {
                        let err = RecordError::coercion_failed(field.name(), &value, field.type_name(), reason);
                        return self.type_mismatch(field, &value, err);
                    }
                }
            }
        }

        if !field.check(&value, &ctx) {
            value = adapt(value, field.expr(), &ctx);
        }

        if !field.check(&value, &ctx) {
            let err = RecordError::field_type(field.name(), &value, field.type_name());
            return self.type_mismatch(field, &value, err);
        }

        field.check_ranges(&value)?;

        if !self.flags.contains(InstanceFlags::UNPICKLING) && !field.listeners().is_empty() {
            let old = self.slots[index].clone();
            let revision = self.revisions[index];
            for listener in field.listeners() {
                listener(self, &old, &value);
            }
            if self.revisions[index] != revision {
                return Ok(());
            }
        }

        if !self.flags.contains(InstanceFlags::DISABLE_HISTORY) && !field.has_flag(AnnotationFlags::NO_HISTORY) {
            let state = if self.flags.contains(InstanceFlags::IN_CONSTRUCTOR) {
                DeltaState::Initialized
            } else {
                DeltaState::Update
            };
            let old = &self.slots[index];
            if let Some(history) = self.history.as_mut() {
                if *old != value {
                    history.record(field.name(), state, old.clone(), value.clone());
                }
            }
        }

        self.slots[index] = value;
        self.revisions[index] += 1;
        Ok(())
    }

    /// Offers a rejected value to the field's type-error handler; `err` is
    /// returned unless the handler swallows it.
    fn type_mismatch(&mut self, field: &FieldSpec, value: &Value, err: RecordError) -> RecordResult<()> {
        if let Some(handler) = field.type_error_handler() {
            let handler = Arc::clone(handler);
            if handler(self, value) {
                return Ok(());
            }
        }
        Err(err)
    }

    /// Writes every schema default (null where none is declared), bypassing
    /// listeners, and records a `default` delta per field.
    pub(crate) fn write_defaults(&mut self) {
        let template = Arc::clone(&self.template);
        let record = !self.flags.contains(InstanceFlags::DISABLE_HISTORY);
        for (index, field) in template.fields().iter().enumerate() {
            let value = field.default_value().cloned().unwrap_or(Value::Null);
            if record && !field.has_flag(AnnotationFlags::NO_HISTORY) {
                if let Some(history) = self.history.as_mut() {
                    history.record(field.name(), DeltaState::Default, Value::Null, value.clone());
                }
            }
            self.slots[index] = value;
        }
        self.flags.insert(InstanceFlags::DEFAULTS_SET);
    }

    /// Marks construction finished and seals the history boundary.
    pub(crate) fn finish_construction(&mut self) {
        self.flags
            .remove(InstanceFlags::IN_CONSTRUCTOR | InstanceFlags::UNPICKLING);
        self.flags
            .insert(InstanceFlags::INITIALIZED | InstanceFlags::DEFAULTS_SET);
        if let Some(history) = self.history.as_mut() {
            history.seal();
        }
    }

    /// Copies retained fields into another template of the same family.
    ///
    /// The target must be a projection of this instance's non-projected
    /// template, or one of its ancestors. Listeners and history are not
    /// involved.
    pub fn project(&self, target: &Arc<RecordTemplate>) -> RecordResult<Instance> {
        let same_family = std::ptr::eq(target.root(), self.template.root());
        if !same_family && !self.template.is_derived_from(target) {
            return Err(RecordError::schema_definition(format!(
                "cannot project {} onto {}",
                self.template, target
            )));
        }
        let mut out = Instance::empty(target);
        let ctx = MatchContext::owned_by(target);
        for (index, field) in target.fields().iter().enumerate() {
            let Some(value) = self.get(field.name()) else {
                continue;
            };
            let mut value = value.clone();
            if !field.check(&value, &ctx) {
                value = adapt(value, field.expr(), &ctx);
            }
            if !field.check(&value, &ctx) {
                return Err(RecordError::field_type(field.name(), &value, field.type_name()));
            }
            out.slots[index] = value;
        }
        out.finish_construction();
        Ok(out)
    }

    /// `(name, value)` for every retained field not marked `NoIterable`.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.template
            .fields()
            .iter()
            .zip(&self.slots)
            .filter(|(f, _)| !f.has_flag(AnnotationFlags::NO_ITERABLE))
            .map(|(f, v)| (f.name(), v))
    }

    /// Every retained field, `NoIterable` included.
    pub fn keys(&self) -> Vec<&str> {
        self.template.field_names()
    }

    /// Values in iteration order.
    pub fn values(&self) -> Vec<&Value> {
        self.iter().map(|(_, v)| v).collect()
    }

    pub fn items(&self) -> Vec<(&str, &Value)> {
        self.iter().collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Resets every retained field to its schema default, null where none
    /// is declared. No type checks, listeners or history.
    pub fn clear(&mut self) {
        for index in 0..self.slots.len() {
            self.clear_slot(index);
        }
    }

    /// Resets the named fields to their defaults.
    pub fn clear_fields(&mut self, names: &[&str]) -> RecordResult<()> {
        let indexes = names
            .iter()
            .map(|n| self.template.index_of(n).ok_or_else(|| RecordError::key_error(*n)))
            .collect::<RecordResult<Vec<_>>>()?;
        for index in indexes {
            self.clear_slot(index);
        }
        Ok(())
    }

    fn clear_slot(&mut self, index: usize) {
        self.slots[index] = self.template.fields()[index]
            .default_value()
            .cloned()
            .unwrap_or(Value::Null);
    }

    /// Dict-expansion view, available with the mapping mixin.
    pub fn as_mapping(&self) -> Option<Vec<(&str, &Value)>> {
        self.template
            .has_mixin(Mixins::MAPPING)
            .then(|| self.items())
    }

    // History

    pub fn history(&self) -> Option<&History> {
        self.history.as_ref()
    }

    pub fn changes_for(&self, field: &str) -> &[Delta] {
        self.history
            .as_ref()
            .map(|h| h.changes_for(field))
            .unwrap_or(&[])
    }

    /// Every recorded change in global order.
    pub fn list_changes(&self) -> &[LoggedDelta] {
        self.history.as_ref().map(|h| h.changes()).unwrap_or(&[])
    }

    pub fn is_dirty(&self) -> bool {
        self.history.as_ref().is_some_and(History::is_dirty)
    }

    /// Moves the history boundary to now.
    pub fn mark_clean(&mut self) {
        if let Some(history) = self.history.as_mut() {
            history.seal();
        }
    }

    /// Restores the named fields (all when empty) to their values at the
    /// history boundary and forgets the changes made since.
    pub fn reset(&mut self, fields: &[&str]) -> RecordResult<()> {
        let template = Arc::clone(&self.template);
        let targets: Vec<&str> = if fields.is_empty() {
            template.field_names()
        } else {
            for name in fields {
                if !template.schema().contains(name) {
                    return Err(RecordError::key_error(*name));
                }
            }
            fields.to_vec()
        };
        let Some(history) = self.history.as_mut() else {
            return Ok(());
        };
        let mut restored = 0usize;
        for name in &targets {
            if !history.is_field_dirty(name) {
                continue;
            }
            if let (Some(index), Some(value)) = (template.index_of(name), history.clean_value(name)) {
                self.slots[index] = value.clone();
            }
            history.rewind(name);
            restored += 1;
        }
        log_event(
            Event::HistoryReset,
            &[("name", template.name()), ("fields", &restored.to_string())],
        );
        Ok(())
    }

    /// Runs `f` with history recording suspended.
    pub fn with_history_disabled<R>(&mut self, f: impl FnOnce(&mut Instance) -> R) -> R {
        let was_disabled = self.flags.contains(InstanceFlags::DISABLE_HISTORY);
        self.flags.insert(InstanceFlags::DISABLE_HISTORY);
        let out = f(self);
        if !was_disabled {
            self.flags.remove(InstanceFlags::DISABLE_HISTORY);
        }
        out
    }

    pub(crate) fn slots(&self) -> &[Value] {
        &self.slots
    }
}

/// Projects nested instances whose template belongs to the same family as
/// a record type the expression expects, walking unions and containers.
fn adapt(value: Value, expr: &TypeExpr, ctx: &MatchContext<'_>) -> Value {
    match expr {
        TypeExpr::Record(target) => match &value {
            Value::Record(inst)
                if std::ptr::eq(target.root(), inst.template().root())
                    && !inst.template().is_derived_from(target) =>
            {
                match inst.project(target) {
                    Ok(projected) => Value::Record(Box::new(projected)),
                    Err(_) => value,
                }
            }
            _ => value,
        },
        TypeExpr::Union(members) => {
            for member in members {
                let candidate = adapt(value.clone(), member, ctx);
                if member.matches(&candidate, ctx) {
                    return candidate;
                }
            }
            value
        }
        TypeExpr::Annotated(inner, _) => adapt(value, inner, ctx),
        TypeExpr::Sequence(element) => match value {
            Value::List(items) => Value::List(items.into_iter().map(|v| adapt(v, element, ctx)).collect()),
            other => other,
        },
        TypeExpr::Set(element) => match value {
            Value::Set(items) => Value::Set(items.into_iter().map(|v| adapt(v, element, ctx)).collect()),
            other => other,
        },
        TypeExpr::Tuple(elements) => match value {
            Value::Tuple(items) if items.len() == elements.len() => Value::Tuple(
                items
                    .into_iter()
                    .zip(elements)
                    .map(|(v, e)| adapt(v, e, ctx))
                    .collect(),
            ),
            other => other,
        },
        TypeExpr::Mapping(key, val) => match value {
            Value::Map(pairs) => Value::Map(
                pairs
                    .into_iter()
                    .map(|(k, v)| (adapt(k, key, ctx), adapt(v, val, ctx)))
                    .collect(),
            ),
            other => other,
        },
        _ => value,
    }
}

impl PartialEq for Instance {
    /// Same public class and equal iteration items.
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.template.root(), other.template.root()) && self.iter().eq(other.iter())
    }
}

impl Index<&str> for Instance {
    type Output = Value;

    /// # Panics
    ///
    /// When `name` is not a retained field.
    fn index(&self, name: &str) -> &Value {
        match self.get(name) {
            Some(value) => value,
            None => panic!("{} has no field '{}'", self.template.name(), name),
        }
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.template.has_mixin(Mixins::AUTOREPR) {
            return write!(f, "<{}>", self.template.name());
        }
        write!(f, "{}(", self.template.name())?;
        for (i, (name, value)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", name, value)?;
        }
        write!(f, ")")
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct(self.template.name());
        for (field, value) in self.template.fields().iter().zip(&self.slots) {
            s.field(field.name(), value);
        }
        s.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::schema::SchemaSpec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_rejected_set_leaves_slot() {
        let t = SchemaSpec::new("AccessKeep").field("n", "int").declare().unwrap();
        let mut inst = t.construct([("n", 1)]).unwrap();
        let err = inst.set("n", "x").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FieldType);
        assert_eq!(inst["n"], Value::Int(1));
    }

    #[test]
    fn test_unknown_field_set() {
        let t = SchemaSpec::new("AccessUnknown").field("n", "int").declare().unwrap();
        let mut inst = t.construct::<_, &str, Value>([]).unwrap();
        assert_eq!(inst.set("m", 1).unwrap_err().kind(), ErrorKind::UnrecognizedField);
        assert_eq!(inst.try_get("m").unwrap_err().kind(), ErrorKind::KeyError);
    }

    #[test]
    fn test_listener_sees_old_and_new() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);
        let t = SchemaSpec::new("AccessListen")
            .field("n", "int")
            .field("last", "int | None")
            .listen("n", |inst: &mut Instance, old: &Value, new: &Value| {
                CALLS.fetch_add(1, Ordering::SeqCst);
                if let (Value::Int(_), Value::Int(_)) = (old, new) {
                    let _ = inst.set("last", old.clone());
                }
            })
            .declare()
            .unwrap();
        let mut inst = t.construct([("n", 1)]).unwrap();
        inst.set("n", 2).unwrap();
        assert_eq!(inst["last"], Value::Int(1));
        assert_eq!(CALLS.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_type_error_handler_swallows() {
        let t = SchemaSpec::new("AccessHandler")
            .field("n", "int")
            .field("note", "str | None")
            .on_type_error("n", |inst: &mut Instance, value: &Value| {
                let _ = inst.set("note", format!("rejected {}", value));
                true
            })
            .declare()
            .unwrap();
        let mut inst = t.construct([("n", 1)]).unwrap();
        inst.set("n", "oops").unwrap();
        assert_eq!(inst["n"], Value::Int(1));
        assert_eq!(inst["note"], Value::from("rejected \"oops\""));
    }

    #[test]
    fn test_clear_bypasses_checks() {
        let t = SchemaSpec::new("AccessClear").field("n", "int").field("s", "str").declare().unwrap();
        let mut inst = t.construct([("n", Value::Int(1)), ("s", Value::from("x"))]).unwrap();
        inst.clear_fields(&["s"]).unwrap();
        assert_eq!(inst["s"], Value::Null);
        inst.clear();
        assert_eq!(inst["n"], Value::Null);
        assert!(inst.clear_fields(&["zz"]).is_err());
    }

    #[test]
    fn test_clear_restores_defaults() {
        let t = SchemaSpec::new("AccessClearDefault")
            .field("tags", "list[str]")
            .field("label", "str | None")
            .default("tags", Value::List(vec![]))
            .declare()
            .unwrap();
        let mut inst = t
            .construct([("tags", Value::list(["x"])), ("label", Value::from("l"))])
            .unwrap();
        inst.clear();
        assert_eq!(inst["tags"], Value::List(vec![]));
        assert_eq!(inst["label"], Value::Null);
    }

    #[test]
    fn test_nested_set_from_listener_is_final() {
        let t = SchemaSpec::new("AccessClamp")
            .field("n", "int")
            .listen("n", |inst: &mut Instance, _: &Value, new: &Value| {
                if new.as_int().is_some_and(|n| n > 10) {
                    let _ = inst.set("n", 10);
                }
            })
            .declare()
            .unwrap();
        let mut inst = t.construct([("n", 1)]).unwrap();
        inst.set("n", 50).unwrap();
        assert_eq!(inst["n"], Value::Int(10));
    }

    #[test]
    fn test_autorepr_display() {
        let t = SchemaSpec::new("AccessRepr")
            .field("n", "int")
            .mixin(Mixins::AUTOREPR)
            .declare()
            .unwrap();
        let inst = t.construct([("n", 3)]).unwrap();
        assert_eq!(inst.to_string(), "AccessRepr(n=3)");
        let plain = SchemaSpec::new("AccessPlain").field("n", "int").declare().unwrap();
        assert_eq!(plain.construct([("n", 3)]).unwrap().to_string(), "<AccessPlain>");
    }

    #[test]
    fn test_mapping_view_requires_mixin() {
        let t = SchemaSpec::new("AccessMap")
            .field("n", "int")
            .mixin(Mixins::MAPPING)
            .declare()
            .unwrap();
        let inst = t.construct([("n", 3)]).unwrap();
        assert_eq!(inst.as_mapping().unwrap(), vec![("n", &Value::Int(3))]);
        let plain = SchemaSpec::new("AccessNoMap").field("n", "int").declare().unwrap();
        assert!(plain.construct([("n", 3)]).unwrap().as_mapping().is_none());
    }

    #[test]
    #[should_panic(expected = "has no field")]
    fn test_index_panics_on_unknown() {
        let t = SchemaSpec::new("AccessPanic").field("n", "int").declare().unwrap();
        let inst = t.construct([("n", 3)]).unwrap();
        let _ = &inst["missing"];
    }
}
