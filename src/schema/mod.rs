//! Schema model
//!
//! A schema is the immutable description of a record shape: ordered fields
//! with their types, annotations and hooks, the coercion table, mixins,
//! type variables and the projection it was derived by.
//!
//! # Invariants
//!
//! - Field names are unique identifiers not starting with an underscore
//! - Coercion, annotation, default and hook keys name existing fields
//! - A field is covered by at most one coercion
//! - Self-references sit under a union that admits `None`

mod builder;
mod canonical;
mod loader;
mod projection;
mod types;

pub use builder::{SchemaSpec, TypeSource};
pub use canonical::{declared_form, projection_form, shape_id, specialization_form};
pub use loader::SchemaLoader;
pub use projection::{KeepNode, KeepSpec, Projection, ProjectionNode};
pub use types::{
    BinaryEncoder, Coercion, FieldSpec, Listener, Mixins, Schema, Transform, TypeErrorHandler,
    TypeParam,
};
