//! Runtime Configuration Tests
//!
//! The process-wide configuration is shared by every test in a binary, so
//! this file holds a single test that walks through the settings in order
//! and restores the default at the end.

use instruct::config::{self, LogSink, RuntimeConfig};
use instruct::observability::{drain_captured, Severity};
use instruct::{ErrorKind, Mixins, Projection, SchemaLoader, SchemaSpec};
use serde_json::Value as JsonValue;

fn events_for(lines: &[String], name: &str) -> Vec<JsonValue> {
    lines
        .iter()
        .filter_map(|line| serde_json::from_str::<JsonValue>(line).ok())
        .filter(|v| v["name"] == name || v["event"] == "SCHEMA_LOADED")
        .collect()
}

fn event_names(events: &[JsonValue]) -> Vec<String> {
    events
        .iter()
        .filter_map(|v| v["event"].as_str().map(String::from))
        .collect()
}

/// Logging captures lifecycle events as JSON lines, and error collection
/// can be switched off.
#[test]
fn test_runtime_configuration() {
    // =========================================================================
    // Captured structured logging
    // =========================================================================
    config::install(RuntimeConfig::verbose().with_sink(LogSink::Memory));
    drain_captured();

    let t = SchemaSpec::new("ConfigLogged")
        .field("a", "int")
        .field("b", "int")
        .mixin(Mixins::HISTORY)
        .declare()
        .unwrap();
    let narrow = t.subtract(&Projection::of(["b"])).unwrap();
    let again = t.subtract(&Projection::of(["b"])).unwrap();
    assert!(std::sync::Arc::ptr_eq(&narrow, &again));
    assert!(t.construct([("a", "x")]).is_err());
    let mut inst = t.construct([("a", 1)]).unwrap();
    inst.set("a", 2).unwrap();
    inst.reset(&[]).unwrap();
    SchemaLoader::from_json_str(r#"{"name": "ConfigLoaded", "fields": {"x": "int"}}"#).unwrap();

    let lines = drain_captured();
    let events = events_for(&lines, "ConfigLogged");
    let names = event_names(&events);
    for expected in [
        "TEMPLATE_DECLARED",
        "TEMPLATE_DERIVED",
        "REGISTRY_HIT",
        "CONSTRUCTION_FAILED",
        "HISTORY_RESET",
        "SCHEMA_LOADED",
    ] {
        assert!(names.iter().any(|n| n == expected), "missing {} in {:?}", expected, names);
    }

    let failed = events
        .iter()
        .find(|v| v["event"] == "CONSTRUCTION_FAILED")
        .unwrap();
    assert_eq!(failed["severity"], "WARN");
    assert_eq!(failed["errors"], "1");

    for line in &lines {
        assert!(line.starts_with("{\"event\":\""), "{}", line);
    }

    // =========================================================================
    // Threshold
    // =========================================================================
    config::install(
        RuntimeConfig::default()
            .with_sink(LogSink::Memory)
            .with_threshold(Severity::Error),
    );
    drain_captured();
    assert!(t.construct([("a", "x")]).is_err());
    assert!(drain_captured().is_empty());

    // =========================================================================
    // Error collection off
    // =========================================================================
    config::install(RuntimeConfig::quiet().with_collect_errors(false));
    let err = t.construct([("a", "x"), ("b", "y")]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ClassCreationFailed);
    assert_eq!(err.errors().len(), 1);

    config::install(RuntimeConfig::quiet());
    let err = t.construct([("a", "x"), ("b", "y")]).unwrap_err();
    assert_eq!(err.errors().len(), 2);

    config::install(RuntimeConfig::default());
}
