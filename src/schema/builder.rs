//! Declarative schema builder
//!
//! `SchemaSpec` collects a declaration; `resolve` validates it and turns it
//! into a `Schema`. Every structural mistake is a `SchemaDefinitionError`
//! raised here, before any template exists.

use regex::Regex;
use std::sync::{Arc, OnceLock};

use super::projection::Projection;
use super::types::{
    BinaryEncoder, Coercion, FieldSpec, Listener, Mixins, Schema, Transform, TypeErrorHandler,
    TypeParam,
};
use crate::errors::{RecordError, RecordResult};
use crate::instance::Instance;
use crate::template::{RecordTemplate, Registry};
use crate::types::{parse_type_expr, AnnotationMeta, MatchContext, ParseContext, TypeExpr};
use crate::value::Value;

/// A field type given either as typing-module text or as a built expression.
#[derive(Debug, Clone)]
pub enum TypeSource {
    Text(String),
    Expr(TypeExpr),
}

impl From<&str> for TypeSource {
    fn from(text: &str) -> Self {
        TypeSource::Text(text.to_string())
    }
}

impl From<String> for TypeSource {
    fn from(text: String) -> Self {
        TypeSource::Text(text)
    }
}

impl From<TypeExpr> for TypeSource {
    fn from(expr: TypeExpr) -> Self {
        TypeSource::Expr(expr)
    }
}

/// Field and template names.
pub(crate) fn is_identifier(name: &str) -> bool {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").ok())
        .as_ref()
        .map_or(false, |re| re.is_match(name))
}

fn resolve_global(name: &str) -> Option<Arc<RecordTemplate>> {
    Registry::global().lookup_public(name)
}

/// Declaration of a record template.
#[derive(Clone)]
pub struct SchemaSpec {
    name: String,
    fields: Vec<(String, TypeSource)>,
    defaults: Vec<(String, Value)>,
    coercions: Vec<(Vec<String>, TypeSource, Transform)>,
    annotations: Vec<(String, AnnotationMeta)>,
    listeners: Vec<(String, Listener)>,
    handlers: Vec<(String, TypeErrorHandler)>,
    encoders: Vec<(String, BinaryEncoder)>,
    mixins: Mixins,
    generics: Vec<TypeParam>,
    base: Option<Arc<RecordTemplate>>,
}

/// A validated declaration, ready to become a template.
pub(crate) struct ResolvedSpec {
    pub name: String,
    pub schema: Schema,
    pub base: Option<Arc<RecordTemplate>>,
}

impl SchemaSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            defaults: Vec::new(),
            coercions: Vec::new(),
            annotations: Vec::new(),
            listeners: Vec::new(),
            handlers: Vec::new(),
            encoders: Vec::new(),
            mixins: Mixins::empty(),
            generics: Vec::new(),
            base: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adds a field. Declaration order is positional order.
    pub fn field(mut self, name: impl Into<String>, ty: impl Into<TypeSource>) -> Self {
        self.fields.push((name.into(), ty.into()));
        self
    }

    pub fn field_expr(self, name: impl Into<String>, expr: TypeExpr) -> Self {
        self.field(name, expr)
    }

    pub fn default(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.defaults.push((name.into(), value.into()));
        self
    }

    /// Registers `transform` for values of type `accepted` assigned to `name`.
    pub fn coerce<F>(self, name: impl Into<String>, accepted: impl Into<TypeSource>, transform: F) -> Self
    where
        F: Fn(&Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.coerce_shared(vec![name.into()], accepted, Arc::new(transform))
    }

    /// One coercion covering several fields.
    pub fn coerce_many<F>(self, names: &[&str], accepted: impl Into<TypeSource>, transform: F) -> Self
    where
        F: Fn(&Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        let names = names.iter().map(|n| n.to_string()).collect();
        self.coerce_shared(names, accepted, Arc::new(transform))
    }

    /// Coercion with an already shared transform.
    pub fn coerce_shared(
        mut self,
        names: Vec<String>,
        accepted: impl Into<TypeSource>,
        transform: Transform,
    ) -> Self {
        self.coercions.push((names, accepted.into(), transform));
        self
    }

    pub fn annotate(mut self, name: impl Into<String>, meta: AnnotationMeta) -> Self {
        self.annotations.push((name.into(), meta));
        self
    }

    /// Listener called with `(instance, old, new)` on every set of `name`.
    pub fn listen<F>(mut self, name: impl Into<String>, listener: F) -> Self
    where
        F: Fn(&mut Instance, &Value, &Value) + Send + Sync + 'static,
    {
        self.listeners.push((name.into(), Arc::new(listener)));
        self
    }

    pub fn on_type_error<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&mut Instance, &Value) -> bool + Send + Sync + 'static,
    {
        self.handlers.push((name.into(), Arc::new(handler)));
        self
    }

    pub fn binary_encoder<F>(mut self, name: impl Into<String>, encoder: F) -> Self
    where
        F: Fn(&[u8]) -> String + Send + Sync + 'static,
    {
        self.encoders.push((name.into(), Arc::new(encoder)));
        self
    }

    pub fn mixin(mut self, mixin: Mixins) -> Self {
        self.mixins |= mixin;
        self
    }

    pub fn generic(mut self, name: impl Into<String>) -> Self {
        self.generics.push(TypeParam {
            name: name.into(),
            default: None,
        });
        self
    }

    pub fn generic_with_default(mut self, name: impl Into<String>, default: TypeExpr) -> Self {
        self.generics.push(TypeParam {
            name: name.into(),
            default: Some(default),
        });
        self
    }

    /// Inherits fields, coercions, annotations, defaults, hooks and mixins.
    pub fn extends(mut self, base: &Arc<RecordTemplate>) -> Self {
        self.base = Some(Arc::clone(base));
        self
    }

    /// Declares the template.
    pub fn declare(self) -> RecordResult<Arc<RecordTemplate>> {
        RecordTemplate::declare(self)
    }

    fn parse_source(&self, source: &TypeSource, generics: &[String]) -> RecordResult<TypeExpr> {
        match source {
            TypeSource::Expr(expr) => Ok(expr.clone()),
            TypeSource::Text(text) => {
                let ctx = ParseContext {
                    self_name: Some(&self.name),
                    type_vars: generics,
                    resolver: &resolve_global,
                };
                parse_type_expr(text, &ctx)
            }
        }
    }

    /// Validates the declaration and builds its schema.
    pub(crate) fn resolve(self) -> RecordResult<ResolvedSpec> {
        if !is_identifier(&self.name) {
            return Err(RecordError::schema_definition(format!(
                "'{}' is not a valid template name",
                self.name
            )));
        }

        let (mut fields, mut coercions, mut mixins, mut generics) = match &self.base {
            Some(base) => {
                let schema = base.schema();
                (
                    schema.fields().to_vec(),
                    schema.coercions().to_vec(),
                    schema.mixins(),
                    schema.generics().to_vec(),
                )
            }
            None => (Vec::new(), Vec::new(), Mixins::empty(), Vec::new()),
        };
        mixins |= self.mixins;

        for param in &self.generics {
            if !is_identifier(&param.name) {
                return Err(RecordError::schema_definition(format!(
                    "'{}' is not a valid type variable name",
                    param.name
                )));
            }
            if generics.iter().any(|g| g.name == param.name) {
                return Err(RecordError::schema_definition(format!(
                    "type variable '{}' declared twice",
                    param.name
                )));
            }
            generics.push(param.clone());
        }
        let generic_names: Vec<String> = generics.iter().map(|g| g.name.clone()).collect();

        let mut own: Vec<&str> = Vec::new();
        for (name, source) in &self.fields {
            if !is_identifier(name) {
                return Err(RecordError::schema_definition(format!(
                    "'{}' is not a valid field name",
                    name
                ))
                .with_field(name.clone()));
            }
            if own.contains(&name.as_str()) {
                return Err(RecordError::schema_definition(format!(
                    "field '{}' declared twice",
                    name
                ))
                .with_field(name.clone()));
            }
            own.push(name);

            let expr = self.parse_source(source, &generic_names)?;
            if !expr.self_refs_guarded() {
                return Err(RecordError::schema_definition(format!(
                    "field '{}' refers to {} without an Optional to end the cycle",
                    name, self.name
                ))
                .with_field(name.clone()));
            }
            if let Some(unbound) = expr.type_vars().into_iter().find(|v| !generic_names.contains(v)) {
                return Err(RecordError::schema_definition(format!(
                    "field '{}' uses undeclared type variable '{}'",
                    name, unbound
                ))
                .with_field(name.clone()));
            }

            match fields.iter().position(|f| f.name() == name) {
                Some(i) => fields[i] = fields[i].with_expr(expr).map_err(|e| e.with_field(name.clone()))?,
                None => fields.push(FieldSpec::new(name.clone(), expr).map_err(|e| e.with_field(name.clone()))?),
            }
        }

        let index_of = |fields: &[FieldSpec], name: &str| -> RecordResult<usize> {
            fields.iter().position(|f| f.name() == name).ok_or_else(|| {
                RecordError::schema_definition(format!("{} has no field '{}'", self.name, name))
                    .with_field(name.to_string())
            })
        };

        for (name, meta) in &self.annotations {
            let i = index_of(&fields, name)?;
            fields[i].push_annotation(meta.clone())?;
        }

        // own coercions take fields away from inherited ones
        let coerced: Vec<&String> = self.coercions.iter().flat_map(|(names, _, _)| names).collect();
        coercions = coercions
            .iter()
            .filter_map(|c| c.retain(|f| !coerced.iter().any(|n| *n == f)))
            .collect();

        for (names, accepted, transform) in &self.coercions {
            if names.is_empty() {
                return Err(RecordError::schema_definition("coercion covers no fields"));
            }
            for name in names {
                index_of(&fields, name)?;
            }
            let accepted = self.parse_source(accepted, &generic_names)?;
            if let Some(taken) = names
                .iter()
                .find(|n| coercions.iter().any(|c| c.covers(n)))
            {
                return Err(RecordError::schema_definition(format!(
                    "field '{}' has more than one coercion",
                    taken
                ))
                .with_field(taken.clone()));
            }
            coercions.push(Coercion::new(names.clone(), accepted, Arc::clone(transform)));
        }

        for (name, listener) in &self.listeners {
            let i = index_of(&fields, name)?;
            fields[i].push_listener(Arc::clone(listener));
        }
        for (name, handler) in &self.handlers {
            let i = index_of(&fields, name)?;
            fields[i].set_type_error_handler(Arc::clone(handler));
        }
        for (name, encoder) in &self.encoders {
            let i = index_of(&fields, name)?;
            fields[i].set_encoder(Arc::clone(encoder));
        }

        for (name, value) in &self.defaults {
            let i = index_of(&fields, name)?;
            let field = &fields[i];
            if !field.check(value, &MatchContext::default()) {
                return Err(RecordError::schema_definition(format!(
                    "default {} for '{}' is not a {}",
                    value,
                    name,
                    field.type_name()
                ))
                .with_field(name.clone()));
            }
            field
                .check_ranges(value)
                .map_err(|e| RecordError::schema_definition(e.message().to_string()).with_field(name.clone()))?;
            fields[i].set_default(value.clone());
        }

        Ok(ResolvedSpec {
            name: self.name.clone(),
            schema: Schema::from_parts(fields, coercions, Projection::new(), mixins, generics),
            base: self.base.clone(),
        })
    }
}
