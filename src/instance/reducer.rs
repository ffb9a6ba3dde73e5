//! Reducer: a reconstructible snapshot of an instance
//!
//! State holds every retained field not marked `NoPickle`. Reconstruction
//! starts from null slots and replays the state through the set path with
//! listeners bypassed.

use std::sync::Arc;

use super::flags::InstanceFlags;
use super::record::Instance;
use crate::errors::{RecordError, RecordResult};
use crate::template::RecordTemplate;
use crate::types::AnnotationFlags;
use crate::value::Value;

/// `(template, args, kwargs, state)`
#[derive(Debug, Clone)]
pub struct Reduced {
    pub template: Arc<RecordTemplate>,
    pub shape_id: String,
    pub args: Vec<Value>,
    pub kwargs: Vec<(String, Value)>,
    pub state: Vec<(String, Value)>,
}

impl Instance {
    pub fn reduce(&self) -> Reduced {
        let state = self
            .template()
            .fields()
            .iter()
            .zip(self.slots())
            .filter(|(f, _)| !f.has_flag(AnnotationFlags::NO_PICKLE))
            .map(|(f, v)| (f.name().to_string(), v.clone()))
            .collect();
        Reduced {
            template: Arc::clone(self.template()),
            shape_id: self.template().shape_id().to_string(),
            args: Vec::new(),
            kwargs: Vec::new(),
            state,
        }
    }
}

impl Reduced {
    pub fn reconstruct(&self) -> RecordResult<Instance> {
        let mut inst = Instance::empty(&self.template);
        inst.insert_flags(InstanceFlags::IN_CONSTRUCTOR | InstanceFlags::UNPICKLING);
        let mut errors = Vec::new();
        for (name, value) in &self.state {
            if let Err(err) = inst.set(name, value.clone()) {
                errors.push(err);
            }
        }
        if !errors.is_empty() {
            return Err(RecordError::class_creation_failed(self.template.name(), errors));
        }
        inst.finish_construction();
        Ok(inst)
    }
}
