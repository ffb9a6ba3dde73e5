//! Compiled type predicates.
//!
//! Compilation validates the expression tree once, at declaration time, and
//! freezes its display name. Checking is then a plain walk of the tree.

use super::annotations::AnnotationMeta;
use super::expr::{MatchContext, TypeExpr};
use crate::errors::{RecordError, RecordResult};
use crate::value::Value;

/// A `(predicate, display_name)` pair.
#[derive(Debug, Clone)]
pub struct Predicate {
    expr: TypeExpr,
    name: String,
}

impl Predicate {
    /// Validates and compiles a type expression.
    ///
    /// # Errors
    ///
    /// `UnsupportedTypeExpr` for empty unions, empty literals and
    /// malformed ranges.
    pub fn compile(expr: &TypeExpr) -> RecordResult<Self> {
        validate(expr)?;
        Ok(Self {
            expr: expr.clone(),
            name: expr.display_name(),
        })
    }

    pub fn expr(&self) -> &TypeExpr {
        &self.expr
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn check(&self, value: &Value, ctx: &MatchContext<'_>) -> bool {
        self.expr.matches(value, ctx)
    }
}

fn validate(expr: &TypeExpr) -> RecordResult<()> {
    match expr {
        TypeExpr::Union(members) => {
            if members.is_empty() {
                return Err(RecordError::unsupported_type_expr("Union[]", "empty union"));
            }
            members.iter().try_for_each(validate)
        }
        TypeExpr::Literal(values) => {
            if values.is_empty() {
                return Err(RecordError::unsupported_type_expr("Literal[]", "empty literal"));
            }
            Ok(())
        }
        TypeExpr::Tuple(members) => members.iter().try_for_each(validate),
        TypeExpr::Sequence(e) | TypeExpr::Set(e) => validate(e),
        TypeExpr::Mapping(k, v) => {
            validate(k)?;
            validate(v)
        }
        TypeExpr::Annotated(inner, metas) => {
            for meta in metas {
                if let AnnotationMeta::Range(range) = meta {
                    if !range.is_well_formed() {
                        return Err(RecordError::unsupported_type_expr(
                            expr.display_name(),
                            format!("range {} has unordered bounds", range),
                        ));
                    }
                }
            }
            validate(inner)
        }
        _ => Ok(()),
    }
}
