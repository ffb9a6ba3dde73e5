//! Schema type definitions
//!
//! A `Schema` is immutable once a template owns it. Every projection or
//! specialisation produces a new one.

use bitflags::bitflags;
use std::fmt;
use std::sync::Arc;

use super::projection::Projection;
use crate::errors::{RecordError, RecordResult};
use crate::instance::Instance;
use crate::types::{AnnotationFlags, AnnotationMeta, MatchContext, Predicate, Range, TypeExpr};
use crate::value::Value;

/// Coercion transform. An `Err` is reported as a field type error.
pub type Transform = Arc<dyn Fn(&Value) -> Result<Value, String> + Send + Sync>;
/// Called with `(instance, old, new)` before a value is stored.
pub type Listener = Arc<dyn Fn(&mut Instance, &Value, &Value) + Send + Sync>;
/// Returns true to swallow a type mismatch; the set is then skipped.
pub type TypeErrorHandler = Arc<dyn Fn(&mut Instance, &Value) -> bool + Send + Sync>;
/// Encodes bytes for JSON output in place of `base64:`.
pub type BinaryEncoder = Arc<dyn Fn(&[u8]) -> String + Send + Sync>;

/// Identity of a shared closure, for canonical hashing.
pub(crate) fn closure_addr<T: ?Sized>(f: &Arc<T>) -> usize {
    Arc::as_ptr(f) as *const () as usize
}

bitflags! {
    /// Optional behaviours a template opts into.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Mixins: u8 {
        /// Per-field change history
        const HISTORY = 1 << 0;
        /// `to_json` / `from_json` methods
        const JSON = 1 << 1;
        /// Dict-expansion view
        const MAPPING = 1 << 2;
        /// `Name(field=value, ...)` display
        const AUTOREPR = 1 << 3;
        /// Stop construction at the first error
        const FAST = 1 << 4;
    }
}

impl Mixins {
    const NAMES: [(Mixins, &'static str); 5] = [
        (Mixins::HISTORY, "history"),
        (Mixins::JSON, "json"),
        (Mixins::MAPPING, "mapping"),
        (Mixins::AUTOREPR, "autorepr"),
        (Mixins::FAST, "fast"),
    ];

    pub fn parse_name(name: &str) -> Option<Mixins> {
        let lower = name.to_ascii_lowercase();
        Self::NAMES
            .iter()
            .find(|(_, n)| *n == lower)
            .map(|(flag, _)| *flag)
    }

    /// Lower-case names of the set flags, in declaration order.
    pub fn names(&self) -> Vec<&'static str> {
        Self::NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, n)| *n)
            .collect()
    }
}

/// `(accepted type, transform)` applied before the type check.
#[derive(Clone)]
pub struct Coercion {
    fields: Vec<String>,
    accepted: TypeExpr,
    transform: Transform,
}

impl Coercion {
    /// Field names are sorted and deduplicated.
    pub fn new(fields: Vec<String>, accepted: TypeExpr, transform: Transform) -> Self {
        let mut fields = fields;
        fields.sort();
        fields.dedup();
        Self {
            fields,
            accepted,
            transform,
        }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn accepted(&self) -> &TypeExpr {
        &self.accepted
    }

    pub fn covers(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f == field)
    }

    pub fn accepts(&self, value: &Value, ctx: &MatchContext<'_>) -> bool {
        self.accepted.matches(value, ctx)
    }

    pub fn apply(&self, value: &Value) -> Result<Value, String> {
        (self.transform)(value)
    }

    pub(crate) fn transform_addr(&self) -> usize {
        closure_addr(&self.transform)
    }

    /// The coercion restricted to fields that survive a projection.
    pub(crate) fn retain(&self, keep: impl Fn(&str) -> bool) -> Option<Coercion> {
        let fields: Vec<String> = self.fields.iter().filter(|f| keep(f)).cloned().collect();
        if fields.is_empty() {
            return None;
        }
        Some(Coercion {
            fields,
            accepted: self.accepted.clone(),
            transform: Arc::clone(&self.transform),
        })
    }

    pub(crate) fn with_accepted(&self, accepted: TypeExpr) -> Coercion {
        Coercion {
            fields: self.fields.clone(),
            accepted,
            transform: Arc::clone(&self.transform),
        }
    }
}

impl fmt::Debug for Coercion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coercion")
            .field("fields", &self.fields)
            .field("accepted", &self.accepted)
            .finish()
    }
}

/// One field: its type, metadata and hooks.
#[derive(Clone)]
pub struct FieldSpec {
    name: String,
    expr: TypeExpr,
    predicate: Predicate,
    annotations: Vec<AnnotationMeta>,
    flags: AnnotationFlags,
    default: Option<Value>,
    listeners: Vec<Listener>,
    type_error_handler: Option<TypeErrorHandler>,
    encoder: Option<BinaryEncoder>,
}

impl FieldSpec {
    /// A top-level `Annotated` is unwrapped into the field's annotations.
    pub(crate) fn new(name: impl Into<String>, expr: TypeExpr) -> RecordResult<Self> {
        let (expr, annotations) = expr.split_annotations();
        let predicate = Predicate::compile(&expr)?;
        let mut field = Self {
            name: name.into(),
            expr,
            predicate,
            annotations: Vec::new(),
            flags: AnnotationFlags::empty(),
            default: None,
            listeners: Vec::new(),
            type_error_handler: None,
            encoder: None,
        };
        for meta in annotations {
            field.push_annotation(meta)?;
        }
        Ok(field)
    }

    /// Same field with its type replaced.
    pub(crate) fn with_expr(&self, expr: TypeExpr) -> RecordResult<Self> {
        let (expr, extra) = expr.split_annotations();
        let mut field = self.clone();
        field.predicate = Predicate::compile(&expr)?;
        field.expr = expr;
        for meta in extra {
            field.push_annotation(meta)?;
        }
        Ok(field)
    }

    pub(crate) fn push_annotation(&mut self, meta: AnnotationMeta) -> RecordResult<()> {
        if let AnnotationMeta::Range(range) = &meta {
            if !range.is_well_formed() {
                return Err(RecordError::schema_definition(format!(
                    "range {} on '{}' has unordered bounds",
                    range, self.name
                ))
                .with_field(self.name.clone()));
            }
        }
        if !self.annotations.contains(&meta) {
            self.flags |= AnnotationFlags::from_metas(std::slice::from_ref(&meta));
            self.annotations.push(meta);
        }
        Ok(())
    }

    pub(crate) fn set_default(&mut self, value: Value) {
        self.default = Some(value);
    }

    pub(crate) fn push_listener(&mut self, listener: Listener) {
        self.listeners.push(listener);
    }

    pub(crate) fn set_type_error_handler(&mut self, handler: TypeErrorHandler) {
        self.type_error_handler = Some(handler);
    }

    pub(crate) fn set_encoder(&mut self, encoder: BinaryEncoder) {
        self.encoder = Some(encoder);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn expr(&self) -> &TypeExpr {
        &self.expr
    }

    /// Display name of the field type.
    pub fn type_name(&self) -> &str {
        self.predicate.name()
    }

    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    pub fn annotations(&self) -> &[AnnotationMeta] {
        &self.annotations
    }

    pub fn flags(&self) -> AnnotationFlags {
        self.flags
    }

    pub fn has_flag(&self, flag: AnnotationFlags) -> bool {
        self.flags.contains(flag)
    }

    pub fn ranges(&self) -> impl Iterator<Item = &Range> {
        self.annotations.iter().filter_map(AnnotationMeta::as_range)
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    pub fn listeners(&self) -> &[Listener] {
        &self.listeners
    }

    pub fn type_error_handler(&self) -> Option<&TypeErrorHandler> {
        self.type_error_handler.as_ref()
    }

    pub fn encoder(&self) -> Option<&BinaryEncoder> {
        self.encoder.as_ref()
    }

    pub fn check(&self, value: &Value, ctx: &MatchContext<'_>) -> bool {
        self.predicate.check(value, ctx)
    }

    /// Every range that governs the value's runtime type must contain it.
    pub fn check_ranges(&self, value: &Value) -> RecordResult<()> {
        for range in self.ranges() {
            if range.applies_to(value) && !range.contains(value) {
                return Err(RecordError::range(&self.name, value, range.to_string()));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for FieldSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldSpec")
            .field("name", &self.name)
            .field("type", &self.type_name())
            .field("annotations", &self.annotations)
            .field("default", &self.default)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// A type variable bound by a generic schema.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeParam {
    pub name: String,
    /// Used when a specialisation leaves the variable unbound
    pub default: Option<TypeExpr>,
}

impl TypeParam {
    /// The binding used when none is supplied.
    pub fn fallback(&self) -> TypeExpr {
        self.default.clone().unwrap_or_else(TypeExpr::any)
    }
}

/// Invariant record shape.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: Vec<FieldSpec>,
    coercions: Vec<Coercion>,
    skipped: Projection,
    mixins: Mixins,
    generics: Vec<TypeParam>,
}

impl Schema {
    pub(crate) fn from_parts(
        fields: Vec<FieldSpec>,
        coercions: Vec<Coercion>,
        skipped: Projection,
        mixins: Mixins,
        generics: Vec<TypeParam>,
    ) -> Self {
        let mut coercions = coercions;
        coercions.sort_by(|a, b| a.fields.cmp(&b.fields));
        Self {
            fields,
            coercions,
            skipped,
            mixins,
            generics,
        }
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Coercions, sorted by their field tuples.
    pub fn coercions(&self) -> &[Coercion] {
        &self.coercions
    }

    pub fn coercion_for(&self, field: &str) -> Option<&Coercion> {
        self.coercions.iter().find(|c| c.covers(field))
    }

    pub fn annotations(&self, field: &str) -> &[AnnotationMeta] {
        self.field(field).map(FieldSpec::annotations).unwrap_or(&[])
    }

    /// Projection accumulated from the nearest non-projected ancestor.
    pub fn skipped(&self) -> &Projection {
        &self.skipped
    }

    pub fn mixins(&self) -> Mixins {
        self.mixins
    }

    pub fn has_mixin(&self, mixin: Mixins) -> bool {
        self.mixins.contains(mixin)
    }

    pub fn generics(&self) -> &[TypeParam] {
        &self.generics
    }
}
