//! Schema algebra: subtraction, intersection and generic specialisation.
//!
//! Every derived template is computed from the nearest non-projected
//! template plus one merged projection tree, so `(T - A) - B` and
//! `T - (A | B)` have the same canonical form and resolve to the same
//! registered `Arc`.

use std::collections::HashMap;
use std::sync::Arc;

use super::record::{RecordTemplate, TemplateKind};
use super::registry::Registry;
use crate::errors::{RecordError, RecordResult};
use crate::observability::{log_event, Event};
use crate::schema::{
    projection_form, shape_id, specialization_form, FieldSpec, KeepNode, KeepSpec, Projection,
    ProjectionNode, Schema,
};
use crate::types::{MatchContext, TypeExpr};

/// Templates a field's type points into; a self-reference points at `owner`.
fn candidates<'a>(owner: &'a RecordTemplate, field: &FieldSpec, refs: &'a [Arc<RecordTemplate>]) -> Vec<&'a RecordTemplate> {
    let mut out: Vec<&RecordTemplate> = refs.iter().map(|t| t.as_ref()).collect();
    if field.expr().contains_self_ref() {
        out.push(owner);
    }
    out
}

fn not_a_record_field(owner: &RecordTemplate, field: &str) -> RecordError {
    RecordError::schema_definition(format!(
        "field '{}' of {} does not refer to a record template",
        field,
        owner.name()
    ))
    .with_field(field.to_string())
}

fn unknown_field(owner: &RecordTemplate, field: &str) -> RecordError {
    RecordError::schema_definition(format!("{} has no field '{}'", owner.name(), field))
        .with_field(field.to_string())
}

/// Names must be declared by the non-projected form of `template`; names
/// that are already projected away are accepted.
fn validate_projection(template: &RecordTemplate, projection: &Projection) -> RecordResult<()> {
    let root = template.root();
    for (name, node) in projection.iter() {
        let field = root.field(name).ok_or_else(|| unknown_field(root, name))?;
        if let ProjectionNode::Nested(sub) = node {
            let refs = field.expr().references();
            let targets = candidates(root, field, &refs);
            if targets.is_empty() {
                return Err(not_a_record_field(root, name));
            }
            if let Some((missing, _)) = sub.iter().find(|(n, _)| !targets.iter().any(|t| t.knows_field(n))) {
                return Err(unknown_field(targets[0], missing));
            }
            for target in targets {
                validate_projection(target, &sub.filtered(|n| target.knows_field(n)))?;
            }
        }
    }
    Ok(())
}

impl RecordTemplate {
    /// `self - projection`.
    ///
    /// Subtracting nothing returns `self`.
    pub fn subtract(self: &Arc<Self>, projection: &Projection) -> RecordResult<Arc<RecordTemplate>> {
        if projection.is_empty() {
            return Ok(Arc::clone(self));
        }
        let root = self.root_arc();
        validate_projection(&root, projection)?;
        derive(&root, self.skipped().merge(projection))
    }

    /// `self & keep`: subtracts everything `keep` does not name.
    pub fn intersect(self: &Arc<Self>, keep: &KeepSpec) -> RecordResult<Arc<RecordTemplate>> {
        let complement = self.complement(keep)?;
        self.subtract(&complement)
    }

    /// Retained fields (recursively) that `keep` leaves out.
    pub fn complement(&self, keep: &KeepSpec) -> RecordResult<Projection> {
        if let Some((missing, _)) = keep.iter().find(|(n, _)| !self.knows_field(n)) {
            return Err(unknown_field(self, missing));
        }
        let mut out = Projection::new();
        for field in self.fields() {
            match keep.get(field.name()) {
                None => out = out.drop(field.name()),
                Some(KeepNode::Keep) => {}
                Some(KeepNode::Nested(sub)) => {
                    let refs = field.expr().references();
                    let targets = candidates(self, field, &refs);
                    if targets.is_empty() {
                        return Err(not_a_record_field(self, field.name()));
                    }
                    if let Some((missing, _)) = sub.iter().find(|(n, _)| !targets.iter().any(|t| t.knows_field(n))) {
                        return Err(unknown_field(targets[0], missing));
                    }
                    let mut nested = Projection::new();
                    for target in targets {
                        let part = target.complement(&sub.filtered(|n| target.knows_field(n)))?;
                        nested = nested.merge(&part);
                    }
                    out = out.nested(field.name(), nested);
                }
            }
        }
        Ok(out)
    }

    /// Binds type variables. Unbound variables take their declared default
    /// or `Any`.
    pub fn specialize(self: &Arc<Self>, bindings: &[(&str, TypeExpr)]) -> RecordResult<Arc<RecordTemplate>> {
        let generics = self.schema().generics();
        if generics.is_empty() {
            return Err(RecordError::schema_definition(format!(
                "{} has no type variables",
                self.name()
            )));
        }
        if let Some((unknown, _)) = bindings
            .iter()
            .find(|(n, _)| !generics.iter().any(|g| g.name == *n))
        {
            return Err(RecordError::schema_definition(format!(
                "{} has no type variable '{}'",
                self.name(),
                unknown
            )));
        }
        let full: Vec<(String, TypeExpr)> = generics
            .iter()
            .map(|g| {
                let bound = bindings
                    .iter()
                    .rev()
                    .find(|(n, _)| *n == g.name)
                    .map(|(_, e)| e.clone())
                    .unwrap_or_else(|| g.fallback());
                (g.name.clone(), bound)
            })
            .collect();
        let id = shape_id(&specialization_form(self.shape_id(), &full));
        let generic = Arc::clone(self);
        let key = id.clone();
        Registry::global().get_or_derive(&key, move || build_specialization(&generic, full, id))
    }
}

fn derive(root: &Arc<RecordTemplate>, skipped: Projection) -> RecordResult<Arc<RecordTemplate>> {
    if skipped.is_empty() {
        return Ok(Arc::clone(root));
    }
    let id = shape_id(&projection_form(root.shape_id(), &skipped));
    let base = Arc::clone(root);
    let key = id.clone();
    Registry::global().get_or_derive(&key, move || build_projection(&base, skipped, id))
}

fn build_projection(root: &Arc<RecordTemplate>, skipped: Projection, id: String) -> RecordResult<RecordTemplate> {
    let mut fields = Vec::with_capacity(root.fields().len());
    for field in root.fields() {
        match skipped.get(field.name()) {
            Some(ProjectionNode::Drop) => {}
            None => fields.push(field.clone()),
            Some(ProjectionNode::Nested(sub)) => {
                let mut expr = field
                    .expr()
                    .map_records(&mut |t| t.subtract(&sub.filtered(|n| t.knows_field(n))))?;
                if expr.contains_self_ref() {
                    let own = root.subtract(&sub.filtered(|n| root.knows_field(n)))?;
                    expr = expr.replace_self_ref(&TypeExpr::Record(own));
                }
                fields.push(field.with_expr(expr)?);
            }
        }
    }
    let coercions = root
        .schema()
        .coercions()
        .iter()
        .filter_map(|c| c.retain(|f| fields.iter().any(|kept| kept.name() == f)))
        .collect();
    let schema = Schema::from_parts(
        fields,
        coercions,
        skipped,
        root.schema().mixins(),
        root.schema().generics().to_vec(),
    );
    log_event(
        Event::TemplateDerived,
        &[
            ("name", root.name()),
            ("shape_id", &id[..12]),
            ("skipped", &schema.skipped().to_string()),
        ],
    );
    Ok(RecordTemplate {
        name: root.name().to_string(),
        shape_id: id,
        kind: TemplateKind::Projection,
        schema,
        parent: Some(Arc::clone(root)),
        bindings: Vec::new(),
    })
}

fn build_specialization(
    generic: &Arc<RecordTemplate>,
    bindings: Vec<(String, TypeExpr)>,
    id: String,
) -> RecordResult<RecordTemplate> {
    let map: HashMap<String, TypeExpr> = bindings.iter().cloned().collect();
    let mut fields = Vec::with_capacity(generic.fields().len());
    for field in generic.fields() {
        let specialised = field.with_expr(field.expr().substitute(&map))?;
        if let Some(default) = specialised.default_value() {
            if !specialised.check(default, &MatchContext::default()) {
                return Err(RecordError::schema_definition(format!(
                    "default {} for '{}' is not a {}",
                    default,
                    field.name(),
                    specialised.type_name()
                ))
                .with_field(field.name().to_string()));
            }
        }
        fields.push(specialised);
    }
    let coercions = generic
        .schema()
        .coercions()
        .iter()
        .map(|c| c.with_accepted(c.accepted().substitute(&map)))
        .collect();
    let name = format!(
        "{}[{}]",
        generic.name(),
        bindings
            .iter()
            .map(|(_, e)| e.display_name())
            .collect::<Vec<_>>()
            .join(", ")
    );
    log_event(Event::TemplateSpecialized, &[("name", &name), ("shape_id", &id[..12])]);
    Ok(RecordTemplate {
        name,
        shape_id: id,
        kind: TemplateKind::Specialization,
        schema: Schema::from_parts(fields, coercions, Projection::new(), generic.schema().mixins(), Vec::new()),
        parent: Some(Arc::clone(generic)),
        bindings,
    })
}
