//! Observability for the record runtime
//!
//! - Structured JSON-line logging
//! - Typed lifecycle events
//!
//! Observability is read-only: nothing here changes what a declaration or
//! a set does, and a failed write is ignored.
//!
//! ```ignore
//! use instruct::observability::{log_event, Event};
//!
//! log_event(Event::TemplateDeclared, &[("name", "Point")]);
//! ```

mod events;
mod logger;

pub use events::Event;
pub use logger::{drain_captured, Logger, Severity};

/// Log a lifecycle event at its default severity
pub fn log_event(event: Event, fields: &[(&str, &str)]) {
    Logger::log(event.severity(), event.as_str(), fields);
}
