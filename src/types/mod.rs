//! Type-expression evaluator
//!
//! A field's type is an explicit `TypeExpr` tree. It compiles to a
//! `Predicate` over `Value`s plus a display name, and can be written
//! either programmatically or in typing-module text.

mod annotations;
mod expr;
mod parser;
mod predicate;

pub use annotations::{AnnotationFlags, AnnotationMeta, Interval, Range};
pub use expr::{AtomicType, MatchContext, TypeExpr};
pub use parser::{parse_type_expr, ParseContext, ParseError};
pub use predicate::Predicate;
