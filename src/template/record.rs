//! Record templates
//!
//! A template owns one schema and manufactures instances of it. Templates
//! are shared through `Arc` and never mutated; identity is pointer
//! identity, backed by the registry's canonical shape ids.

use std::fmt;
use std::sync::Arc;

use super::registry::Registry;
use crate::errors::RecordResult;
use crate::observability::{log_event, Event};
use crate::schema::{declared_form, shape_id, FieldSpec, Mixins, Projection, Schema, SchemaSpec};
use crate::types::TypeExpr;

/// How a template came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    /// Explicit declaration
    Declared,
    /// Fields subtracted from a non-projected template
    Projection,
    /// Type variables of a generic template bound
    Specialization,
}

/// Runtime descriptor of a record shape.
pub struct RecordTemplate {
    pub(crate) name: String,
    pub(crate) shape_id: String,
    pub(crate) kind: TemplateKind,
    pub(crate) schema: Schema,
    pub(crate) parent: Option<Arc<RecordTemplate>>,
    pub(crate) bindings: Vec<(String, TypeExpr)>,
}

impl RecordTemplate {
    /// Validates a declaration and registers the template.
    ///
    /// Declaring an identical schema twice yields the same `Arc`.
    pub fn declare(spec: SchemaSpec) -> RecordResult<Arc<RecordTemplate>> {
        let resolved = spec.resolve()?;
        let canonical = declared_form(
            &resolved.name,
            &resolved.schema,
            resolved.base.as_ref().map(|b| b.shape_id()),
        );
        let template = RecordTemplate {
            name: resolved.name,
            shape_id: shape_id(&canonical),
            kind: TemplateKind::Declared,
            schema: resolved.schema,
            parent: resolved.base,
            bindings: Vec::new(),
        };
        let template = Registry::global().insert_public(template);
        log_event(
            Event::TemplateDeclared,
            &[
                ("name", template.name()),
                ("shape_id", &template.shape_id()[..12]),
                ("fields", &template.schema().len().to_string()),
            ],
        );
        Ok(template)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Hex SHA-256 of the canonical form.
    pub fn shape_id(&self) -> &str {
        &self.shape_id
    }

    pub fn kind(&self) -> TemplateKind {
        self.kind
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn fields(&self) -> &[FieldSpec] {
        self.schema.fields()
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.schema.field(name)
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.schema.field_names()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.schema.index_of(name)
    }

    /// Base of a declaration, source of a projection, generic template of
    /// a specialisation.
    pub fn parent(&self) -> Option<&Arc<RecordTemplate>> {
        self.parent.as_ref()
    }

    /// Only explicit declarations are public.
    pub fn is_public(&self) -> bool {
        self.kind == TemplateKind::Declared
    }

    pub fn is_projection(&self) -> bool {
        self.kind == TemplateKind::Projection
    }

    /// Projection accumulated against `root()`.
    pub fn skipped(&self) -> &Projection {
        self.schema.skipped()
    }

    pub fn has_mixin(&self, mixin: Mixins) -> bool {
        self.schema.has_mixin(mixin)
    }

    pub fn mixins(&self) -> Mixins {
        self.schema.mixins()
    }

    /// Type-variable bindings of a specialisation.
    pub fn bindings(&self) -> &[(String, TypeExpr)] {
        &self.bindings
    }

    /// Nearest non-projected template, self included.
    pub fn root(&self) -> &RecordTemplate {
        match (&self.kind, &self.parent) {
            (TemplateKind::Projection, Some(parent)) => parent.root(),
            _ => self,
        }
    }

    /// Owning form of `root()`.
    pub fn root_arc(self: &Arc<Self>) -> Arc<RecordTemplate> {
        match (&self.kind, &self.parent) {
            (TemplateKind::Projection, Some(parent)) => parent.root_arc(),
            _ => Arc::clone(self),
        }
    }

    /// Top of the parent chain.
    pub fn lineage_root(&self) -> &RecordTemplate {
        match &self.parent {
            Some(parent) => parent.lineage_root(),
            None => self,
        }
    }

    /// Whether `other` is this template or one of its ancestors.
    pub fn is_derived_from(&self, other: &RecordTemplate) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        match &self.parent {
            Some(parent) => parent.is_derived_from(other),
            None => false,
        }
    }

    /// Whether the non-projected form of this template declares `name`.
    pub fn knows_field(&self, name: &str) -> bool {
        self.root().schema.contains(name)
    }

    /// Record templates a field's type refers to, in first-seen order.
    pub fn nested_templates(&self, field: &str) -> Vec<Arc<RecordTemplate>> {
        self.field(field)
            .map(|f| f.expr().references())
            .unwrap_or_default()
    }
}

impl fmt::Debug for RecordTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordTemplate")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("shape_id", &&self.shape_id[..12])
            .field("fields", &self.field_names())
            .finish()
    }
}

impl fmt::Display for RecordTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TemplateKind::Projection => write!(f, "{} - {}", self.name, self.skipped()),
            _ => write!(f, "{}", self.name),
        }
    }
}
