//! Type expressions as an explicit tagged tree.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::annotations::AnnotationMeta;
use crate::errors::RecordResult;
use crate::template::RecordTemplate;
use crate::value::Value;

/// Atomic (leaf) types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AtomicType {
    None,
    Bool,
    Int,
    Float,
    Str,
    Bytes,
    DateTime,
    Date,
    Any,
}

impl AtomicType {
    pub fn name(&self) -> &'static str {
        match self {
            AtomicType::None => "None",
            AtomicType::Bool => "bool",
            AtomicType::Int => "int",
            AtomicType::Float => "float",
            AtomicType::Str => "str",
            AtomicType::Bytes => "bytes",
            AtomicType::DateTime => "datetime",
            AtomicType::Date => "date",
            AtomicType::Any => "Any",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "None" | "NoneType" => Some(AtomicType::None),
            "bool" => Some(AtomicType::Bool),
            "int" => Some(AtomicType::Int),
            "float" => Some(AtomicType::Float),
            "str" => Some(AtomicType::Str),
            "bytes" => Some(AtomicType::Bytes),
            "datetime" => Some(AtomicType::DateTime),
            "date" => Some(AtomicType::Date),
            "Any" => Some(AtomicType::Any),
            _ => None,
        }
    }

    /// "value is an instance of T"
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            AtomicType::None => value.is_null(),
            AtomicType::Bool => matches!(value, Value::Bool(_)),
            AtomicType::Int => matches!(value, Value::Int(_)),
            AtomicType::Float => matches!(value, Value::Float(_)),
            AtomicType::Str => matches!(value, Value::Str(_)),
            AtomicType::Bytes => matches!(value, Value::Bytes(_)),
            AtomicType::DateTime => matches!(value, Value::DateTime(_)),
            AtomicType::Date => matches!(value, Value::Date(_)),
            AtomicType::Any => true,
        }
    }
}

/// Context a predicate is evaluated in.
#[derive(Clone, Copy, Default)]
pub struct MatchContext<'a> {
    /// Template owning the field, used to resolve self-references
    pub owner: Option<&'a RecordTemplate>,
}

impl<'a> MatchContext<'a> {
    pub fn owned_by(owner: &'a RecordTemplate) -> Self {
        Self { owner: Some(owner) }
    }
}

/// A type expression.
#[derive(Clone)]
pub enum TypeExpr {
    Atomic(AtomicType),
    /// Flattened, deduplicated alternatives
    Union(Vec<TypeExpr>),
    /// Ordered sequence of elements
    Sequence(Box<TypeExpr>),
    Set(Box<TypeExpr>),
    Mapping(Box<TypeExpr>, Box<TypeExpr>),
    /// Fixed-arity tuple
    Tuple(Vec<TypeExpr>),
    /// Enumerated allowed values
    Literal(Vec<Value>),
    Annotated(Box<TypeExpr>, Vec<AnnotationMeta>),
    /// Instance of a template or of a template derived from it
    Record(Arc<RecordTemplate>),
    /// Reference to the declaring template
    SelfRef,
    /// Type variable; matches anything until bound
    TypeVar(String),
}

impl TypeExpr {
    pub fn none() -> Self {
        TypeExpr::Atomic(AtomicType::None)
    }

    pub fn bool() -> Self {
        TypeExpr::Atomic(AtomicType::Bool)
    }

    pub fn int() -> Self {
        TypeExpr::Atomic(AtomicType::Int)
    }

    pub fn float() -> Self {
        TypeExpr::Atomic(AtomicType::Float)
    }

    pub fn str() -> Self {
        TypeExpr::Atomic(AtomicType::Str)
    }

    pub fn bytes() -> Self {
        TypeExpr::Atomic(AtomicType::Bytes)
    }

    pub fn datetime() -> Self {
        TypeExpr::Atomic(AtomicType::DateTime)
    }

    pub fn date() -> Self {
        TypeExpr::Atomic(AtomicType::Date)
    }

    pub fn any() -> Self {
        TypeExpr::Atomic(AtomicType::Any)
    }

    pub fn list(element: TypeExpr) -> Self {
        TypeExpr::Sequence(Box::new(element))
    }

    pub fn set_of(element: TypeExpr) -> Self {
        TypeExpr::Set(Box::new(element))
    }

    pub fn mapping(key: TypeExpr, value: TypeExpr) -> Self {
        TypeExpr::Mapping(Box::new(key), Box::new(value))
    }

    pub fn tuple(elements: Vec<TypeExpr>) -> Self {
        TypeExpr::Tuple(elements)
    }

    pub fn literal<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        TypeExpr::Literal(values.into_iter().map(Into::into).collect())
    }

    pub fn annotated(inner: TypeExpr, metas: Vec<AnnotationMeta>) -> Self {
        TypeExpr::Annotated(Box::new(inner), metas)
    }

    pub fn record(template: &Arc<RecordTemplate>) -> Self {
        TypeExpr::Record(Arc::clone(template))
    }

    pub fn type_var(name: impl Into<String>) -> Self {
        TypeExpr::TypeVar(name.into())
    }

    /// `Optional(T)` is `Union(T, None)`.
    pub fn optional(inner: TypeExpr) -> Self {
        TypeExpr::union(vec![inner, TypeExpr::none()])
    }

    /// Builds a union, flattening nested unions and dropping duplicates.
    /// A single surviving member is returned unwrapped.
    pub fn union(members: Vec<TypeExpr>) -> Self {
        let mut flat: Vec<TypeExpr> = Vec::new();
        for member in members {
            let parts = match member {
                TypeExpr::Union(inner) => inner,
                other => vec![other],
            };
            for part in parts {
                if !flat.iter().any(|existing| existing.canonical() == part.canonical()) {
                    flat.push(part);
                }
            }
        }
        if flat.len() == 1 {
            flat.remove(0)
        } else {
            TypeExpr::Union(flat)
        }
    }

    /// `self | other`
    pub fn or(self, other: TypeExpr) -> Self {
        TypeExpr::union(vec![self, other])
    }

    /// Human-readable name.
    pub fn display_name(&self) -> String {
        match self {
            TypeExpr::Atomic(a) => a.name().to_string(),
            TypeExpr::Union(members) => members
                .iter()
                .map(|m| m.display_name())
                .collect::<Vec<_>>()
                .join(" | "),
            TypeExpr::Sequence(e) => format!("list[{}]", e.display_name()),
            TypeExpr::Set(e) => format!("set[{}]", e.display_name()),
            TypeExpr::Mapping(k, v) => format!("dict[{}, {}]", k.display_name(), v.display_name()),
            TypeExpr::Tuple(elements) if elements.is_empty() => "tuple[()]".to_string(),
            TypeExpr::Tuple(elements) => format!(
                "tuple[{}]",
                elements
                    .iter()
                    .map(|e| e.display_name())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            TypeExpr::Literal(values) => format!(
                "Literal[{}]",
                values
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            TypeExpr::Annotated(inner, metas) => format!(
                "Annotated[{}, {}]",
                inner.display_name(),
                metas
                    .iter()
                    .map(|m| m.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            TypeExpr::Record(t) => t.name().to_string(),
            TypeExpr::SelfRef => "Self".to_string(),
            TypeExpr::TypeVar(name) => format!("~{}", name),
        }
    }

    /// Identity-bearing form: like the display name, but records are named
    /// by shape id so two distinct templates never collide.
    pub fn canonical(&self) -> String {
        match self {
            TypeExpr::Union(members) => format!(
                "Union[{}]",
                members
                    .iter()
                    .map(|m| m.canonical())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            TypeExpr::Sequence(e) => format!("list[{}]", e.canonical()),
            TypeExpr::Set(e) => format!("set[{}]", e.canonical()),
            TypeExpr::Mapping(k, v) => format!("dict[{}, {}]", k.canonical(), v.canonical()),
            TypeExpr::Tuple(elements) => format!(
                "tuple[{}]",
                elements
                    .iter()
                    .map(|e| e.canonical())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            TypeExpr::Literal(values) => format!(
                "Literal[{}]",
                values
                    .iter()
                    .map(|v| format!("{}:{}", v.type_name(), v))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            TypeExpr::Annotated(inner, metas) => format!(
                "Annotated[{}, {}]",
                inner.canonical(),
                metas
                    .iter()
                    .map(|m| m.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            TypeExpr::Record(t) => format!("@{}", t.shape_id()),
            other => other.display_name(),
        }
    }

    /// Evaluates the predicate, range annotations included.
    pub fn matches(&self, value: &Value, ctx: &MatchContext<'_>) -> bool {
        match self {
            TypeExpr::Atomic(a) => a.matches(value),
            TypeExpr::Union(members) => members.iter().any(|m| m.matches(value, ctx)),
            TypeExpr::Sequence(e) => match value {
                Value::List(items) => items.iter().all(|item| e.matches(item, ctx)),
                _ => false,
            },
            TypeExpr::Set(e) => match value {
                Value::Set(items) => items.iter().all(|item| e.matches(item, ctx)),
                _ => false,
            },
            TypeExpr::Mapping(k, v) => match value {
                Value::Map(pairs) => pairs
                    .iter()
                    .all(|(key, val)| k.matches(key, ctx) && v.matches(val, ctx)),
                _ => false,
            },
            TypeExpr::Tuple(elements) => match value {
                Value::Tuple(items) => {
                    items.len() == elements.len()
                        && items
                            .iter()
                            .zip(elements)
                            .all(|(item, expr)| expr.matches(item, ctx))
                }
                _ => false,
            },
            TypeExpr::Literal(values) => values.contains(value),
            TypeExpr::Annotated(inner, metas) => {
                inner.matches(value, ctx)
                    && metas
                        .iter()
                        .filter_map(AnnotationMeta::as_range)
                        .all(|r| !r.applies_to(value) || r.contains(value))
            }
            TypeExpr::Record(t) => match value {
                Value::Record(inst) => inst.template().is_derived_from(t),
                _ => false,
            },
            TypeExpr::SelfRef => match (value, ctx.owner) {
                (Value::Record(inst), Some(owner)) => {
                    std::ptr::eq(inst.template().lineage_root(), owner.lineage_root())
                }
                _ => false,
            },
            TypeExpr::TypeVar(_) => true,
        }
    }

    /// Whether any top-level alternative accepts the atomic type.
    pub fn accepts_atomic(&self, atomic: AtomicType) -> bool {
        match self {
            TypeExpr::Atomic(a) => *a == atomic || *a == AtomicType::Any,
            TypeExpr::Union(members) => members.iter().any(|m| m.accepts_atomic(atomic)),
            TypeExpr::Annotated(inner, _) => inner.accepts_atomic(atomic),
            TypeExpr::TypeVar(_) => atomic == AtomicType::Any,
            _ => false,
        }
    }

    /// Top-level alternatives with annotations stripped.
    pub fn alternatives(&self) -> Vec<&TypeExpr> {
        match self {
            TypeExpr::Union(members) => members.iter().flat_map(|m| m.alternatives()).collect(),
            TypeExpr::Annotated(inner, _) => inner.alternatives(),
            other => vec![other],
        }
    }

    /// Every record template referenced at any depth, in first-seen order.
    pub fn references(&self) -> Vec<Arc<RecordTemplate>> {
        let mut out: Vec<Arc<RecordTemplate>> = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references(&self, out: &mut Vec<Arc<RecordTemplate>>) {
        match self {
            TypeExpr::Record(t) => {
                if !out.iter().any(|seen| Arc::ptr_eq(seen, t)) {
                    out.push(Arc::clone(t));
                }
            }
            TypeExpr::Union(members) | TypeExpr::Tuple(members) => {
                members.iter().for_each(|m| m.collect_references(out))
            }
            TypeExpr::Sequence(e) | TypeExpr::Set(e) => e.collect_references(out),
            TypeExpr::Mapping(k, v) => {
                k.collect_references(out);
                v.collect_references(out);
            }
            TypeExpr::Annotated(inner, _) => inner.collect_references(out),
            _ => {}
        }
    }

    pub fn contains_self_ref(&self) -> bool {
        match self {
            TypeExpr::SelfRef => true,
            TypeExpr::Union(members) | TypeExpr::Tuple(members) => {
                members.iter().any(|m| m.contains_self_ref())
            }
            TypeExpr::Sequence(e) | TypeExpr::Set(e) => e.contains_self_ref(),
            TypeExpr::Mapping(k, v) => k.contains_self_ref() || v.contains_self_ref(),
            TypeExpr::Annotated(inner, _) => inner.contains_self_ref(),
            _ => false,
        }
    }

    /// A self-reference is acceptable only when an enclosing union admits
    /// `None`, which is what breaks the construction cycle.
    pub fn self_refs_guarded(&self) -> bool {
        self.self_refs_guarded_under(false)
    }

    fn self_refs_guarded_under(&self, guarded: bool) -> bool {
        match self {
            TypeExpr::SelfRef => guarded,
            TypeExpr::Union(members) => {
                let guarded = guarded || members.iter().any(|m| m.accepts_atomic(AtomicType::None));
                members.iter().all(|m| m.self_refs_guarded_under(guarded))
            }
            TypeExpr::Tuple(members) => members.iter().all(|m| m.self_refs_guarded_under(guarded)),
            TypeExpr::Sequence(e) | TypeExpr::Set(e) => e.self_refs_guarded_under(guarded),
            TypeExpr::Mapping(k, v) => {
                k.self_refs_guarded_under(guarded) && v.self_refs_guarded_under(guarded)
            }
            TypeExpr::Annotated(inner, _) => inner.self_refs_guarded_under(guarded),
            _ => true,
        }
    }

    /// Names of unbound type variables, in first-seen order.
    pub fn type_vars(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_type_vars(&mut out);
        out
    }

    fn collect_type_vars(&self, out: &mut Vec<String>) {
        match self {
            TypeExpr::TypeVar(name) => {
                if !out.contains(name) {
                    out.push(name.clone());
                }
            }
            TypeExpr::Union(members) | TypeExpr::Tuple(members) => {
                members.iter().for_each(|m| m.collect_type_vars(out))
            }
            TypeExpr::Sequence(e) | TypeExpr::Set(e) => e.collect_type_vars(out),
            TypeExpr::Mapping(k, v) => {
                k.collect_type_vars(out);
                v.collect_type_vars(out);
            }
            TypeExpr::Annotated(inner, _) => inner.collect_type_vars(out),
            _ => {}
        }
    }

    /// Replaces bound type variables.
    pub fn substitute(&self, bindings: &HashMap<String, TypeExpr>) -> TypeExpr {
        match self {
            TypeExpr::TypeVar(name) => bindings.get(name).cloned().unwrap_or_else(|| self.clone()),
            TypeExpr::Union(members) => {
                TypeExpr::union(members.iter().map(|m| m.substitute(bindings)).collect())
            }
            TypeExpr::Tuple(members) => {
                TypeExpr::Tuple(members.iter().map(|m| m.substitute(bindings)).collect())
            }
            TypeExpr::Sequence(e) => TypeExpr::list(e.substitute(bindings)),
            TypeExpr::Set(e) => TypeExpr::set_of(e.substitute(bindings)),
            TypeExpr::Mapping(k, v) => TypeExpr::mapping(k.substitute(bindings), v.substitute(bindings)),
            TypeExpr::Annotated(inner, metas) => {
                TypeExpr::annotated(inner.substitute(bindings), metas.clone())
            }
            other => other.clone(),
        }
    }

    /// Rewrites every record reference through `f`, walking unions and
    /// containers.
    pub fn map_records<F>(&self, f: &mut F) -> RecordResult<TypeExpr>
    where
        F: FnMut(&Arc<RecordTemplate>) -> RecordResult<Arc<RecordTemplate>>,
    {
        Ok(match self {
            TypeExpr::Record(t) => TypeExpr::Record(f(t)?),
            TypeExpr::Union(members) => TypeExpr::union(
                members
                    .iter()
                    .map(|m| m.map_records(f))
                    .collect::<RecordResult<Vec<_>>>()?,
            ),
            TypeExpr::Tuple(members) => TypeExpr::Tuple(
                members
                    .iter()
                    .map(|m| m.map_records(f))
                    .collect::<RecordResult<Vec<_>>>()?,
            ),
            TypeExpr::Sequence(e) => TypeExpr::list(e.map_records(f)?),
            TypeExpr::Set(e) => TypeExpr::set_of(e.map_records(f)?),
            TypeExpr::Mapping(k, v) => TypeExpr::mapping(k.map_records(f)?, v.map_records(f)?),
            TypeExpr::Annotated(inner, metas) => {
                TypeExpr::annotated(inner.map_records(f)?, metas.clone())
            }
            other => other.clone(),
        })
    }

    /// Replaces every self-reference with `with`.
    pub fn replace_self_ref(&self, with: &TypeExpr) -> TypeExpr {
        match self {
            TypeExpr::SelfRef => with.clone(),
            TypeExpr::Union(members) => {
                TypeExpr::union(members.iter().map(|m| m.replace_self_ref(with)).collect())
            }
            TypeExpr::Tuple(members) => {
                TypeExpr::Tuple(members.iter().map(|m| m.replace_self_ref(with)).collect())
            }
            TypeExpr::Sequence(e) => TypeExpr::list(e.replace_self_ref(with)),
            TypeExpr::Set(e) => TypeExpr::set_of(e.replace_self_ref(with)),
            TypeExpr::Mapping(k, v) => TypeExpr::mapping(k.replace_self_ref(with), v.replace_self_ref(with)),
            TypeExpr::Annotated(inner, metas) => {
                TypeExpr::annotated(inner.replace_self_ref(with), metas.clone())
            }
            other => other.clone(),
        }
    }

    /// Splits a top-level `Annotated` into its inner expression and metadata.
    pub fn split_annotations(self) -> (TypeExpr, Vec<AnnotationMeta>) {
        match self {
            TypeExpr::Annotated(inner, mut metas) => {
                let (inner, mut nested) = inner.split_annotations();
                nested.append(&mut metas);
                (inner, nested)
            }
            other => (other, Vec::new()),
        }
    }
}

impl PartialEq for TypeExpr {
    fn eq(&self, other: &Self) -> bool {
        self.canonical() == other.canonical()
    }
}

impl fmt::Debug for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeExpr({})", self.display_name())
    }
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::annotations::Range;

    fn check(expr: &TypeExpr, value: Value) -> bool {
        expr.matches(&value, &MatchContext::default())
    }

    #[test]
    fn test_union_flattens_and_dedups() {
        let u = TypeExpr::union(vec![
            TypeExpr::str(),
            TypeExpr::union(vec![TypeExpr::int(), TypeExpr::str()]),
        ]);
        assert_eq!(u.display_name(), "str | int");
    }

    #[test]
    fn test_single_member_union_unwraps() {
        assert_eq!(TypeExpr::union(vec![TypeExpr::int(), TypeExpr::int()]), TypeExpr::int());
    }

    #[test]
    fn test_optional_display() {
        assert_eq!(TypeExpr::optional(TypeExpr::str()).display_name(), "str | None");
    }

    #[test]
    fn test_union_predicate() {
        let u = TypeExpr::str().or(TypeExpr::int());
        assert!(check(&u, Value::Int(0)));
        assert!(check(&u, Value::from("s")));
        assert!(!check(&u, Value::Null));
    }

    #[test]
    fn test_sequence_predicate() {
        let l = TypeExpr::list(TypeExpr::int());
        assert!(check(&l, Value::list([1, 2, 3])));
        assert!(check(&l, Value::List(vec![])));
        assert!(!check(&l, Value::list([Value::Int(1), Value::from("x")])));
        assert!(!check(&l, Value::tuple([1])));
    }

    #[test]
    fn test_mapping_predicate() {
        let m = TypeExpr::mapping(TypeExpr::str(), TypeExpr::int());
        assert!(check(&m, Value::map([("a", 1)])));
        assert!(!check(&m, Value::map([("a", "b")])));
    }

    #[test]
    fn test_tuple_arity() {
        let t = TypeExpr::tuple(vec![TypeExpr::int(), TypeExpr::str()]);
        assert!(check(&t, Value::tuple([Value::Int(1), Value::from("a")])));
        assert!(!check(&t, Value::tuple([Value::Int(1)])));
    }

    #[test]
    fn test_literal_predicate() {
        let l = TypeExpr::literal(["a", "b"]);
        assert!(check(&l, Value::from("a")));
        assert!(!check(&l, Value::from("c")));
    }

    #[test]
    fn test_annotated_range_in_predicate() {
        let a = TypeExpr::annotated(
            TypeExpr::int(),
            vec![AnnotationMeta::NoJson, AnnotationMeta::Range(Range::new(0, 10))],
        );
        assert!(check(&a, Value::Int(5)));
        assert!(!check(&a, Value::Int(10)));
        assert!(!check(&a, Value::from("5")));
    }

    #[test]
    fn test_type_var_matches_anything_until_bound() {
        let t = TypeExpr::list(TypeExpr::type_var("T"));
        assert!(check(&t, Value::list([Value::from("x")])));
        let mut bindings = HashMap::new();
        bindings.insert("T".to_string(), TypeExpr::int());
        let bound = t.substitute(&bindings);
        assert_eq!(bound.display_name(), "list[int]");
        assert!(!check(&bound, Value::list([Value::from("x")])));
    }

    #[test]
    fn test_self_ref_guard() {
        assert!(TypeExpr::optional(TypeExpr::SelfRef).self_refs_guarded());
        assert!(!TypeExpr::SelfRef.self_refs_guarded());
        assert!(!TypeExpr::list(TypeExpr::SelfRef).self_refs_guarded());
        assert!(TypeExpr::optional(TypeExpr::list(TypeExpr::SelfRef)).self_refs_guarded());
    }

    #[test]
    fn test_split_annotations() {
        let (inner, metas) = TypeExpr::annotated(TypeExpr::str(), vec![AnnotationMeta::NoPickle])
            .split_annotations();
        assert_eq!(inner, TypeExpr::str());
        assert_eq!(metas, vec![AnnotationMeta::NoPickle]);
    }

    #[test]
    fn test_accepts_atomic() {
        let u = TypeExpr::optional(TypeExpr::bytes());
        assert!(u.accepts_atomic(AtomicType::Bytes));
        assert!(u.accepts_atomic(AtomicType::None));
        assert!(!u.accepts_atomic(AtomicType::Str));
    }
}
