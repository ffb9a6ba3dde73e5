//! instruct - schema-driven records with typed fields
//!
//! Declared templates, projection algebra, validated setters, JSON
//! serialisation and optional change history.

pub mod api;
pub mod config;
pub mod errors;
pub mod instance;
pub mod observability;
pub mod schema;
pub mod serialize;
pub mod template;
pub mod types;
pub mod value;

pub use errors::{ErrorKind, RecordError, RecordResult};
pub use instance::{Instance, InstanceFlags, Reduced};
pub use schema::{KeepSpec, Mixins, Projection, SchemaLoader, SchemaSpec};
pub use template::{HasTemplate, RecordTemplate, Registry};
pub use types::{AnnotationMeta, Interval, Range, TypeExpr};
pub use value::Value;
