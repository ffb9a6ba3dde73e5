//! History Mixin Tests
//!
//! Change tracking on instances of templates using the history mixin:
//! - Construction records default and initialization deltas
//! - Later assignments record update deltas, undone ones are pruned
//! - Dirty tracking against the clean boundary
//! - Reset and mark-clean
//! - Suppression via NoHistory and the disabled-history scope

use instruct::api;
use instruct::instance::DeltaState;
use instruct::{Instance, Mixins, SchemaSpec, Value};

// =============================================================================
// Helper Functions
// =============================================================================

fn tracked(name: &str) -> std::sync::Arc<instruct::RecordTemplate> {
    SchemaSpec::new(name)
        .field("name", "str")
        .field("count", "int")
        .default("count", 0)
        .mixin(Mixins::HISTORY)
        .declare()
        .unwrap()
}

fn states(inst: &Instance, field: &str) -> Vec<DeltaState> {
    inst.changes_for(field).iter().map(|d| d.state).collect()
}

// =============================================================================
// Construction Tests
// =============================================================================

/// Defaults are recorded first, explicit arguments second.
#[test]
fn test_construction_deltas() {
    let t = tracked("HistoryConstruct");
    let inst = t.construct([("name", "a")]).unwrap();

    assert_eq!(states(&inst, "name"), vec![DeltaState::Default, DeltaState::Initialized]);
    assert_eq!(states(&inst, "count"), vec![DeltaState::Default]);
    assert_eq!(inst.changes_for("count")[0].new, Value::Int(0));
    assert!(!inst.is_dirty());
}

/// An argument equal to the default records nothing beyond the default.
#[test]
fn test_argument_equal_to_default_not_recorded() {
    let t = tracked("HistorySameAsDefault");
    let inst = t.construct([("name", Value::from("a")), ("count", Value::Int(0))]).unwrap();
    assert_eq!(states(&inst, "count"), vec![DeltaState::Default]);
}

/// Templates without the mixin keep no history at all.
#[test]
fn test_no_mixin_no_history() {
    let t = SchemaSpec::new("HistoryNone").field("a", "int").declare().unwrap();
    let mut inst = t.construct([("a", 1)]).unwrap();
    inst.set("a", 2).unwrap();
    assert!(inst.history().is_none());
    assert!(api::list_changes(&inst).is_empty());
    assert!(!api::is_dirty(&inst));
}

// =============================================================================
// Update Tests
// =============================================================================

/// Assignments after construction are updates and make the instance dirty.
#[test]
fn test_updates_are_dirty() {
    let t = tracked("HistoryUpdate");
    let mut inst = t.construct([("name", "a")]).unwrap();
    inst.set("count", 5).unwrap();

    assert!(inst.is_dirty());
    assert!(inst.history().unwrap().is_field_dirty("count"));
    assert!(!inst.history().unwrap().is_field_dirty("name"));
    let last = inst.changes_for("count").last().unwrap();
    assert_eq!(last.state, DeltaState::Update);
    assert_eq!(last.old, Value::Int(0));
    assert_eq!(last.new, Value::Int(5));
}

/// Setting a field to its current value records nothing.
#[test]
fn test_same_value_not_recorded() {
    let t = tracked("HistorySame");
    let mut inst = t.construct([("name", "a")]).unwrap();
    inst.set("name", "a").unwrap();
    assert!(!inst.is_dirty());
}

/// Indexes grow across fields in assignment order.
#[test]
fn test_log_is_ordered() {
    let t = tracked("HistoryOrder");
    let mut inst = t.construct([("name", "a")]).unwrap();
    inst.set("count", 1).unwrap();
    inst.set("name", "b").unwrap();
    inst.set("count", 2).unwrap();

    let log = inst.list_changes();
    let indexes: Vec<usize> = log.iter().map(|e| e.delta.index).collect();
    assert!(indexes.windows(2).all(|w| w[0] < w[1]));
    let tail: Vec<&str> = log.iter().rev().take(3).map(|e| e.key.as_str()).collect();
    assert_eq!(tail, vec!["count", "name", "count"]);
    assert!(log.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
}

/// Undoing an update removes it from both views.
#[test]
fn test_undo_prunes_update() {
    let t = tracked("HistoryPrune");
    let mut inst = t.construct([("name", "a")]).unwrap();
    let before = inst.list_changes().len();
    inst.set("count", 9).unwrap();
    inst.set("count", 0).unwrap();

    assert_eq!(inst.list_changes().len(), before);
    assert_eq!(states(&inst, "count"), vec![DeltaState::Default]);
    assert!(!inst.is_dirty());
}

// =============================================================================
// Reset And Clean Tests
// =============================================================================

/// Reset restores the value at the boundary and forgets later changes.
#[test]
fn test_reset_all() {
    let t = tracked("HistoryReset");
    let mut inst = t.construct([("name", "a")]).unwrap();
    inst.set("name", "b").unwrap();
    inst.set("count", 3).unwrap();

    api::reset(&mut inst, &[]).unwrap();
    assert_eq!(inst["name"], Value::from("a"));
    assert_eq!(inst["count"], Value::Int(0));
    assert!(!inst.is_dirty());
}

/// Reset of one field leaves the others alone.
#[test]
fn test_reset_single_field() {
    let t = tracked("HistoryResetOne");
    let mut inst = t.construct([("name", "a")]).unwrap();
    inst.set("name", "b").unwrap();
    inst.set("count", 3).unwrap();

    inst.reset(&["count"]).unwrap();
    assert_eq!(inst["count"], Value::Int(0));
    assert_eq!(inst["name"], Value::from("b"));
    assert!(inst.is_dirty());
}

/// Reset of an unknown field is a key error.
#[test]
fn test_reset_unknown_field() {
    let t = tracked("HistoryResetUnknown");
    let mut inst = t.construct([("name", "a")]).unwrap();
    let err = inst.reset(&["missing"]).unwrap_err();
    assert_eq!(err.kind(), instruct::ErrorKind::KeyError);
}

/// Mark-clean moves the boundary; reset then returns to the new state.
#[test]
fn test_mark_clean_moves_boundary() {
    let t = tracked("HistoryMarkClean");
    let mut inst = t.construct([("name", "a")]).unwrap();
    inst.set("name", "b").unwrap();
    inst.mark_clean();
    assert!(!inst.is_dirty());

    inst.set("name", "c").unwrap();
    assert!(inst.is_dirty());
    inst.reset(&[]).unwrap();
    assert_eq!(inst["name"], Value::from("b"));
}

/// Changes sealed by mark-clean are not pruned by a later revert.
#[test]
fn test_revert_after_mark_clean_is_dirty() {
    let t = tracked("HistorySealedRevert");
    let mut inst = t.construct([("name", "a")]).unwrap();
    inst.set("name", "b").unwrap();
    inst.mark_clean();

    inst.set("name", "a").unwrap();
    assert!(inst.is_dirty());
    assert_eq!(
        states(&inst, "name"),
        vec![
            DeltaState::Default,
            DeltaState::Initialized,
            DeltaState::Update,
            DeltaState::Update
        ]
    );

    inst.reset(&[]).unwrap();
    assert_eq!(inst["name"], Value::from("b"));
    assert!(!inst.is_dirty());
}

// =============================================================================
// Suppression Tests
// =============================================================================

/// NoHistory fields are never recorded.
#[test]
fn test_no_history_field() {
    let t = SchemaSpec::new("HistoryNoHistoryField")
        .field("tracked", "int")
        .field("untracked", "Annotated[int, NoHistory]")
        .mixin(Mixins::HISTORY)
        .declare()
        .unwrap();
    let mut inst = t.construct([("tracked", 1), ("untracked", 1)]).unwrap();
    inst.set("untracked", 2).unwrap();

    assert!(inst.changes_for("untracked").is_empty());
    assert!(!inst.is_dirty());
}

/// Assignments inside the disabled scope leave no trace.
#[test]
fn test_disabled_scope() {
    let t = tracked("HistoryDisabled");
    let mut inst = t.construct([("name", "a")]).unwrap();
    inst.with_history_disabled(|i| i.set("count", 4)).unwrap();

    assert_eq!(inst["count"], Value::Int(4));
    assert!(!inst.is_dirty());
    inst.set("count", 5).unwrap();
    assert!(inst.is_dirty());
}

/// Clearing bypasses history.
#[test]
fn test_clear_not_recorded() {
    let t = tracked("HistoryClear");
    let mut inst = t.construct([("name", "a")]).unwrap();
    api::clear(&mut inst);
    assert!(inst["name"].is_null());
    assert!(!inst.is_dirty());
}

/// A cloned instance carries an independent copy of the history.
#[test]
fn test_clone_copies_history() {
    let t = tracked("HistoryClone");
    let original = t.construct([("name", "a")]).unwrap();
    let mut copy = original.clone();
    copy.set("name", "z").unwrap();

    assert!(copy.is_dirty());
    assert!(!original.is_dirty());
}
