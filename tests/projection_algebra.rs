//! Projection Algebra Tests
//!
//! Subtraction and intersection of templates:
//! - Derived templates are canonical: equal projections share one `Arc`
//! - Composition and idempotence identities
//! - Nested projections rewrite field types
//! - Instances of a full template are projected on assignment
//! - Errors for names the template does not declare

use std::sync::{Arc, OnceLock};

use instruct::api;
use instruct::template::TemplateKind;
use instruct::{ErrorKind, KeepSpec, Projection, RecordTemplate, SchemaSpec, Value};
use proptest::prelude::*;

// =============================================================================
// Helper Functions
// =============================================================================

const TOP: [&str; 5] = ["f0", "f1", "f2", "f3", "item"];
const NESTED: [&str; 3] = ["x", "y", "z"];

fn item() -> &'static Arc<RecordTemplate> {
    static ITEM: OnceLock<Arc<RecordTemplate>> = OnceLock::new();
    ITEM.get_or_init(|| {
        SchemaSpec::new("AlgebraItem")
            .field("x", "int")
            .field("y", "str")
            .field("z", "float | None")
            .declare()
            .unwrap()
    })
}

fn wide() -> &'static Arc<RecordTemplate> {
    static WIDE: OnceLock<Arc<RecordTemplate>> = OnceLock::new();
    WIDE.get_or_init(|| {
        item();
        SchemaSpec::new("AlgebraWide")
            .field("f0", "int")
            .field("f1", "str")
            .field("f2", "list[int]")
            .field("f3", "bool")
            .field("item", "AlgebraItem")
            .declare()
            .unwrap()
    })
}

fn names_in(mask: u8, names: &[&'static str]) -> Vec<&'static str> {
    names
        .iter()
        .enumerate()
        .filter(|(i, _)| mask & (1 << i) != 0)
        .map(|(_, n)| *n)
        .collect()
}

fn projection_from(top: u8, nested: u8) -> Projection {
    let dropped = names_in(top, &TOP);
    let mut p = Projection::of(dropped.iter().copied());
    if !dropped.contains(&"item") {
        p = p.nested("item", Projection::of(names_in(nested, &NESTED)));
    }
    p
}

fn keep_from(top: u8, nested: Option<u8>) -> KeepSpec {
    let mut k = KeepSpec::of(names_in(top, &TOP).into_iter().filter(|n| *n != "item"));
    if top & (1 << 4) != 0 {
        k = match nested {
            Some(mask) => k.nested("item", KeepSpec::of(names_in(mask, &NESTED))),
            None => k.keep("item"),
        };
    }
    k
}

// =============================================================================
// Identity Tests
// =============================================================================

/// Subtracting nothing returns the same template.
#[test]
fn test_empty_subtraction_is_identity() {
    let t = wide();
    let same = t.subtract(&Projection::new()).unwrap();
    assert!(Arc::ptr_eq(t, &same));
}

/// Intersecting with every key returns the same template.
#[test]
fn test_full_intersection_is_identity() {
    let t = wide();
    let same = t.intersect(&KeepSpec::of(TOP)).unwrap();
    assert!(Arc::ptr_eq(t, &same));
}

/// Repeating a subtraction is a no-op.
#[test]
fn test_subtraction_is_idempotent() {
    let t = wide();
    let p = Projection::of(["f1"]);
    let once = t.subtract(&p).unwrap();
    let twice = once.subtract(&p).unwrap();
    assert!(Arc::ptr_eq(&once, &twice));
}

/// Intersection is expressible as subtraction of the complement.
#[test]
fn test_intersection_matches_subtraction() {
    let t = wide();
    let kept = t.intersect(&KeepSpec::of(["f0", "f3"])).unwrap();
    let removed = t.subtract(&Projection::of(["f1", "f2", "item"])).unwrap();
    assert!(Arc::ptr_eq(&kept, &removed));
    assert_eq!(kept.field_names(), vec!["f0", "f3"]);
}

/// Nested keeps translate to nested drops.
#[test]
fn test_nested_intersection() {
    let t = wide();
    let kept = t
        .intersect(&KeepSpec::of(["f0"]).nested("item", KeepSpec::of(["x"])))
        .unwrap();
    let removed = t
        .subtract(
            &Projection::of(["f1", "f2", "f3"]).nested("item", Projection::of(["y", "z"])),
        )
        .unwrap();
    assert!(Arc::ptr_eq(&kept, &removed));
    assert_eq!(api::keys(&kept, &["item"]).unwrap(), vec!["x".to_string()]);
}

// =============================================================================
// Derived Template Shape
// =============================================================================

/// A projection keeps its name, points at its public parent and is not
/// itself public.
#[test]
fn test_projection_metadata() {
    let t = wide();
    let derived = t.subtract(&Projection::of(["f0"])).unwrap();
    let again = derived.subtract(&Projection::of(["f1"])).unwrap();

    assert_eq!(derived.name(), "AlgebraWide");
    assert_eq!(derived.kind(), TemplateKind::Projection);
    assert!(!derived.is_public());
    assert!(Arc::ptr_eq(again.parent().unwrap(), t));
    assert!(again.is_derived_from(t));
    assert!(!t.is_derived_from(&again));
    assert!(again.skipped().drops("f0") && again.skipped().drops("f1"));
    assert_ne!(derived.shape_id(), t.shape_id());
}

/// Nested subtraction rewrites the field type to the projected template.
#[test]
fn test_nested_subtraction_rewrites_field_type() {
    let t = wide();
    let derived = t
        .subtract(&Projection::new().nested("item", Projection::of(["y"])))
        .unwrap();
    let nested = derived.nested_templates("item");
    assert_eq!(nested.len(), 1);
    assert_eq!(nested[0].field_names(), vec!["x", "z"]);
    assert!(nested[0].is_derived_from(item()));
    assert!(Arc::ptr_eq(
        &api::public_class(&derived, &["item"], false).unwrap(),
        item()
    ));
    assert!(Arc::ptr_eq(
        &api::public_class(&derived, &["item"], true).unwrap(),
        &nested[0]
    ));
}

/// Nested projections reach inside containers and optionals.
#[test]
fn test_nested_subtraction_through_containers() {
    let part = SchemaSpec::new("AlgebraPart")
        .field("id", "int")
        .field("secret", "str")
        .declare()
        .unwrap();
    let holder = SchemaSpec::new("AlgebraHolder")
        .field("parts", "list[AlgebraPart]")
        .field("spare", "Optional[AlgebraPart]")
        .declare()
        .unwrap();

    let public = holder
        .subtract(
            &Projection::new()
                .nested("parts", Projection::of(["secret"]))
                .nested("spare", Projection::of(["secret"])),
        )
        .unwrap();
    let parts = public.nested_templates("parts");
    let spare = public.nested_templates("spare");
    assert!(Arc::ptr_eq(&parts[0], &spare[0]));
    assert_eq!(parts[0].field_names(), vec!["id"]);

    let full = part.construct([("id", Value::Int(1)), ("secret", Value::from("s"))]).unwrap();
    let inst = public
        .construct([("parts", Value::list([full.clone()])), ("spare", Value::from(full))])
        .unwrap();
    let json = api::asjson(&inst);
    assert_eq!(json["parts"][0], serde_json::json!({"id": 1}));
    assert_eq!(json["spare"], serde_json::json!({"id": 1}));
}

/// Nested projection of a self-referencing field applies to the reference.
#[test]
fn test_nested_subtraction_of_self_reference() {
    let node = SchemaSpec::new("AlgebraNode")
        .field("value", "int")
        .field("label", "str")
        .field("next", "AlgebraNode | None")
        .declare()
        .unwrap();
    let derived = node
        .subtract(&Projection::new().nested("next", Projection::of(["label"])))
        .unwrap();
    let nested = derived.nested_templates("next");
    assert_eq!(nested.len(), 1);
    assert_eq!(nested[0].field_names(), vec!["value", "next"]);
}

// =============================================================================
// Implicit Down-Projection
// =============================================================================

/// Assigning a full instance to a projected field projects it.
#[test]
fn test_assignment_projects_full_instance() {
    let t = wide();
    let derived = t
        .subtract(&Projection::new().nested("item", Projection::of(["y"])))
        .unwrap();
    let full = item()
        .construct([("x", Value::Int(1)), ("y", Value::from("drop me")), ("z", Value::Null)])
        .unwrap();

    let mut inst = derived.construct(Vec::<(&str, Value)>::new()).unwrap();
    inst.set("item", full).unwrap();

    let nested = inst["item"].as_record().unwrap();
    assert!(Arc::ptr_eq(nested.template(), &derived.nested_templates("item")[0]));
    assert!(nested.get("y").is_none());
    assert_eq!(nested["x"], Value::Int(1));
}

/// An instance can be projected explicitly onto a projection or back onto
/// an ancestor, but not onto an unrelated template.
#[test]
fn test_explicit_projection() {
    let t = wide();
    let full = t.construct([("f0", Value::Int(5)), ("f1", Value::from("a"))]).unwrap();
    let narrow = t.subtract(&Projection::of(["f1", "f2", "f3", "item"])).unwrap();

    let projected = full.project(&narrow).unwrap();
    assert_eq!(projected.keys(), vec!["f0"]);
    assert_eq!(projected["f0"], Value::Int(5));

    let widened = projected.project(t).unwrap();
    assert_eq!(widened["f0"], Value::Int(5));
    assert!(widened["f1"].is_null());

    assert!(full.project(item()).is_err());
}

// =============================================================================
// Error Tests
// =============================================================================

/// Unknown names are rejected at the top level and below.
#[test]
fn test_unknown_names_rejected() {
    let t = wide();
    let err = t.subtract(&Projection::of(["nope"])).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SchemaDefinition);
    assert_eq!(err.field(), Some("nope"));

    let err = t
        .subtract(&Projection::new().nested("item", Projection::of(["nope"])))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SchemaDefinition);

    let err = t.intersect(&KeepSpec::of(["nope"])).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SchemaDefinition);
}

/// A nested subtree under a scalar field is an error.
#[test]
fn test_nested_on_scalar_rejected() {
    let t = wide();
    let err = t
        .subtract(&Projection::new().nested("f0", Projection::of(["x"])))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SchemaDefinition);
    assert_eq!(err.field(), Some("f0"));
}

/// Names already projected away may be named again.
#[test]
fn test_projected_names_are_lenient() {
    let t = wide();
    let derived = t.subtract(&Projection::of(["f0"])).unwrap();
    let again = derived.subtract(&Projection::of(["f0", "f1"])).unwrap();
    assert_eq!(again.field_names(), vec!["f2", "f3", "item"]);
    assert!(derived.intersect(&KeepSpec::of(["f0", "f2"])).is_ok());
}

// =============================================================================
// Property Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        failure_persistence: None,
        ..ProptestConfig::default()
    })]

    /// `(T - A) - B` and `T - (A | B)` are the same template.
    #[test]
    fn test_subtraction_composes(a_top in 0u8..32, a_nested in 0u8..8, b_top in 0u8..32, b_nested in 0u8..8) {
        let t = wide();
        let a = projection_from(a_top, a_nested);
        let b = projection_from(b_top, b_nested);

        let stepwise = t.subtract(&a).unwrap().subtract(&b).unwrap();
        let direct = t.subtract(&a.merge(&b)).unwrap();
        prop_assert!(Arc::ptr_eq(&stepwise, &direct));
    }

    /// `(T & K1) & K2` and `T & (K1 ∩ K2)` are the same template.
    #[test]
    fn test_intersection_composes(
        k1_top in 0u8..32,
        k1_nested in proptest::option::of(0u8..8),
        k2_top in 0u8..32,
        k2_nested in proptest::option::of(0u8..8),
    ) {
        let t = wide();
        let k1 = keep_from(k1_top, k1_nested);
        let k2 = keep_from(k2_top, k2_nested);

        let stepwise = t.intersect(&k1).unwrap().intersect(&k2).unwrap();
        let direct = t.intersect(&k1.intersect(&k2)).unwrap();
        prop_assert!(Arc::ptr_eq(&stepwise, &direct));
    }

    /// Retained fields are exactly the ones not dropped, in declaration order.
    #[test]
    fn test_subtraction_retains_complement(top in 0u8..32) {
        let t = wide();
        let dropped = names_in(top, &TOP);
        let derived = t.subtract(&Projection::of(dropped.iter().copied())).unwrap();
        let expected: Vec<&str> = TOP.iter().copied().filter(|n| !dropped.contains(n)).collect();
        prop_assert_eq!(derived.field_names(), expected);
    }
}
