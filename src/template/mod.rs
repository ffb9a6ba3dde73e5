//! Record templates, schema algebra and the global registry
//!
//! # Identity
//!
//! - Equal canonical forms resolve to one `Arc<RecordTemplate>`
//! - Public declarations act as identity barriers for `public_class`
//! - Projections always hang off the nearest non-projected template

mod algebra;
mod record;
mod registry;

pub use record::{RecordTemplate, TemplateKind};
pub use registry::{Registry, RegistryStats};

use std::sync::Arc;

use crate::instance::Instance;

/// Anything that is governed by a template.
pub trait HasTemplate {
    fn template(&self) -> &Arc<RecordTemplate>;
}

impl HasTemplate for Arc<RecordTemplate> {
    fn template(&self) -> &Arc<RecordTemplate> {
        self
    }
}

impl HasTemplate for Instance {
    fn template(&self) -> &Arc<RecordTemplate> {
        Instance::template(self)
    }
}
