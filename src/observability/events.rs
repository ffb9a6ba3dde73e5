//! Observable record-runtime events
//!
//! Events are explicit and typed.

use std::fmt;

use super::logger::Severity;

/// Observable events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Declaration
    /// Public template declared
    TemplateDeclared,
    /// Projection template built
    TemplateDerived,
    /// Generic template specialised
    TemplateSpecialized,
    /// Schema documents loaded from JSON
    SchemaLoaded,

    // Registry
    /// Canonical shape already registered
    RegistryHit,
    /// Dead weak entries dropped
    RegistryPruned,

    // Instances
    /// Constructor rejected its arguments
    ConstructionFailed,
    /// History reset to initial values
    HistoryReset,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::TemplateDeclared => "TEMPLATE_DECLARED",
            Event::TemplateDerived => "TEMPLATE_DERIVED",
            Event::TemplateSpecialized => "TEMPLATE_SPECIALIZED",
            Event::SchemaLoaded => "SCHEMA_LOADED",
            Event::RegistryHit => "REGISTRY_HIT",
            Event::RegistryPruned => "REGISTRY_PRUNED",
            Event::ConstructionFailed => "CONSTRUCTION_FAILED",
            Event::HistoryReset => "HISTORY_RESET",
        }
    }

    /// Severity the event is logged at
    pub fn severity(&self) -> Severity {
        match self {
            Event::TemplateDeclared | Event::SchemaLoaded => Severity::Info,
            Event::ConstructionFailed => Severity::Warn,
            _ => Severity::Trace,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
