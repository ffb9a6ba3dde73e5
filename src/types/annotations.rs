//! Field annotation metadata.
//!
//! Flags (`NoJSON`, `NoPickle`, `NoIterable`, `NoHistory`) steer
//! serialization, iteration and history. `Range` is the only metadata that
//! takes part in value validation.

use bitflags::bitflags;
use std::cmp::Ordering;
use std::fmt;

use super::expr::AtomicType;
use crate::value::Value;

/// Interval openness for `Range`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Interval {
    /// `[lo, hi)`
    #[default]
    ClosedOpen,
    /// `(lo, hi]`
    OpenClosed,
    /// `[lo, hi]`
    Closed,
    /// `(lo, hi)`
    Open,
}

impl Interval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::ClosedOpen => "closed_open",
            Interval::OpenClosed => "open_closed",
            Interval::Closed => "closed",
            Interval::Open => "open",
        }
    }

    /// Accepts the snake-case names, their upper-case forms and bracket
    /// notation (`"[)"`, `"(]"`, `"[]"`, `"()"`).
    pub fn parse(text: &str) -> Option<Self> {
        match text.to_ascii_lowercase().as_str() {
            "closed_open" | "[)" => Some(Interval::ClosedOpen),
            "open_closed" | "(]" => Some(Interval::OpenClosed),
            "closed" | "[]" => Some(Interval::Closed),
            "open" | "()" => Some(Interval::Open),
            _ => None,
        }
    }

    fn lower_inclusive(&self) -> bool {
        matches!(self, Interval::ClosedOpen | Interval::Closed)
    }

    fn upper_inclusive(&self) -> bool {
        matches!(self, Interval::OpenClosed | Interval::Closed)
    }
}

/// Orders two scalar values of compatible runtime type.
pub(crate) fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Some(x.cmp(y)),
        (Value::Int(x), Value::Float(y)) => (*x as f64).partial_cmp(y),
        (Value::Float(x), Value::Int(y)) => x.partial_cmp(&(*y as f64)),
        (Value::Float(x), Value::Float(y)) => x.partial_cmp(y),
        (Value::Str(x), Value::Str(y)) => Some(x.cmp(y)),
        (Value::DateTime(x), Value::DateTime(y)) => Some(x.cmp(y)),
        (Value::Date(x), Value::Date(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Value range constraint.
#[derive(Debug, Clone, PartialEq)]
pub struct Range {
    lower: Value,
    upper: Value,
    interval: Interval,
    types: Option<Vec<AtomicType>>,
}

impl Range {
    /// A `CLOSED_OPEN` range applying to ints and floats.
    pub fn new(lower: impl Into<Value>, upper: impl Into<Value>) -> Self {
        Self {
            lower: lower.into(),
            upper: upper.into(),
            interval: Interval::ClosedOpen,
            types: None,
        }
    }

    pub fn with_interval(mut self, interval: Interval) -> Self {
        self.interval = interval;
        self
    }

    /// Restricts the runtime types the range applies to.
    pub fn restricted_to(mut self, types: &[AtomicType]) -> Self {
        self.types = Some(types.to_vec());
        self
    }

    pub fn lower(&self) -> &Value {
        &self.lower
    }

    pub fn upper(&self) -> &Value {
        &self.upper
    }

    pub fn interval(&self) -> Interval {
        self.interval
    }

    pub fn types(&self) -> Option<&[AtomicType]> {
        self.types.as_deref()
    }

    /// Whether the range governs values of this runtime type.
    pub fn applies_to(&self, value: &Value) -> bool {
        match &self.types {
            Some(types) => types.iter().any(|t| t.matches(value)),
            None => matches!(value, Value::Int(_) | Value::Float(_)),
        }
    }

    /// Membership test. Values that cannot be ordered against the bounds
    /// are outside the range.
    pub fn contains(&self, value: &Value) -> bool {
        let above = match compare_values(value, &self.lower) {
            Some(Ordering::Greater) => true,
            Some(Ordering::Equal) => self.interval.lower_inclusive(),
            _ => false,
        };
        let below = match compare_values(value, &self.upper) {
            Some(Ordering::Less) => true,
            Some(Ordering::Equal) => self.interval.upper_inclusive(),
            _ => false,
        };
        above && below
    }

    /// Structural sanity: bounds must be ordered.
    pub fn is_well_formed(&self) -> bool {
        matches!(
            compare_values(&self.lower, &self.upper),
            Some(Ordering::Less) | Some(Ordering::Equal)
        )
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let open = if self.interval.lower_inclusive() { '[' } else { '(' };
        let close = if self.interval.upper_inclusive() { ']' } else { ')' };
        write!(f, "{}{}, {}{}", open, self.lower, self.upper, close)
    }
}

/// Metadata attached to a field through `Annotated`.
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationMeta {
    /// Omit from JSON output
    NoJson,
    /// Omit from reducer state
    NoPickle,
    /// Omit from iteration and dict expansion
    NoIterable,
    /// Suppress change recording
    NoHistory,
    /// Reject values outside the interval
    Range(Range),
}

impl AnnotationMeta {
    pub fn name(&self) -> &'static str {
        match self {
            AnnotationMeta::NoJson => "NoJSON",
            AnnotationMeta::NoPickle => "NoPickle",
            AnnotationMeta::NoIterable => "NoIterable",
            AnnotationMeta::NoHistory => "NoHistory",
            AnnotationMeta::Range(_) => "Range",
        }
    }

    pub fn parse_flag(name: &str) -> Option<Self> {
        match name {
            "NoJSON" | "NoJson" => Some(AnnotationMeta::NoJson),
            "NoPickle" => Some(AnnotationMeta::NoPickle),
            "NoIterable" => Some(AnnotationMeta::NoIterable),
            "NoHistory" => Some(AnnotationMeta::NoHistory),
            _ => None,
        }
    }

    pub fn as_range(&self) -> Option<&Range> {
        match self {
            AnnotationMeta::Range(r) => Some(r),
            _ => None,
        }
    }

    fn flag(&self) -> AnnotationFlags {
        match self {
            AnnotationMeta::NoJson => AnnotationFlags::NO_JSON,
            AnnotationMeta::NoPickle => AnnotationFlags::NO_PICKLE,
            AnnotationMeta::NoIterable => AnnotationFlags::NO_ITERABLE,
            AnnotationMeta::NoHistory => AnnotationFlags::NO_HISTORY,
            AnnotationMeta::Range(_) => AnnotationFlags::empty(),
        }
    }
}

impl fmt::Display for AnnotationMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnnotationMeta::Range(r) => write!(
                f,
                "Range({}, {}, {})",
                r.lower,
                r.upper,
                r.interval.as_str()
            ),
            other => write!(f, "{}", other.name()),
        }
    }
}

bitflags! {
    /// Compact view of the flag annotations on one field.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AnnotationFlags: u8 {
        const NO_JSON = 1 << 0;
        const NO_PICKLE = 1 << 1;
        const NO_ITERABLE = 1 << 2;
        const NO_HISTORY = 1 << 3;
    }
}

impl AnnotationFlags {
    /// Union of the flags carried by a list of annotations.
    pub fn from_metas(metas: &[AnnotationMeta]) -> Self {
        metas
            .iter()
            .fold(AnnotationFlags::empty(), |acc, m| acc | m.flag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_open_boundaries() {
        let r = Range::new(0, 256);
        assert!(r.contains(&Value::Int(0)));
        assert!(r.contains(&Value::Int(255)));
        assert!(!r.contains(&Value::Int(256)));
        assert!(!r.contains(&Value::Int(-1)));
    }

    #[test]
    fn test_float_epsilon_boundaries() {
        let r = Range::new(0.0, 1.0);
        assert!(r.contains(&Value::Float(0.0)));
        assert!(!r.contains(&Value::Float(-f64::EPSILON)));
        assert!(r.contains(&Value::Float(1.0 - f64::EPSILON)));
        assert!(!r.contains(&Value::Float(1.0)));
    }

    #[test]
    fn test_other_intervals() {
        let closed = Range::new(1, 3).with_interval(Interval::Closed);
        assert!(closed.contains(&Value::Int(3)));
        let open = Range::new(1, 3).with_interval(Interval::Open);
        assert!(!open.contains(&Value::Int(1)));
        assert!(open.contains(&Value::Int(2)));
        let open_closed = Range::new(1, 3).with_interval(Interval::OpenClosed);
        assert!(!open_closed.contains(&Value::Int(1)));
        assert!(open_closed.contains(&Value::Int(3)));
    }

    #[test]
    fn test_applies_to_numbers_by_default() {
        let r = Range::new(0, 10);
        assert!(r.applies_to(&Value::Int(3)));
        assert!(r.applies_to(&Value::Float(3.5)));
        assert!(!r.applies_to(&Value::from("x")));
    }

    #[test]
    fn test_type_restrictions() {
        let r = Range::new(0, 10).restricted_to(&[AtomicType::Int]);
        assert!(r.applies_to(&Value::Int(3)));
        assert!(!r.applies_to(&Value::Float(3.0)));
    }

    #[test]
    fn test_interval_parse() {
        assert_eq!(Interval::parse("CLOSED_OPEN"), Some(Interval::ClosedOpen));
        assert_eq!(Interval::parse("[]"), Some(Interval::Closed));
        assert_eq!(Interval::parse("sideways"), None);
    }

    #[test]
    fn test_flags_union() {
        let flags = AnnotationFlags::from_metas(&[
            AnnotationMeta::NoJson,
            AnnotationMeta::Range(Range::new(0, 1)),
            AnnotationMeta::NoHistory,
        ]);
        assert!(flags.contains(AnnotationFlags::NO_JSON));
        assert!(flags.contains(AnnotationFlags::NO_HISTORY));
        assert!(!flags.contains(AnnotationFlags::NO_PICKLE));
    }

    #[test]
    fn test_range_display() {
        assert_eq!(Range::new(0, 256).to_string(), "[0, 256)");
    }
}
