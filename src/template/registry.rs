//! # Template Registry
//!
//! Process-wide map of canonical shape id -> template. Public templates are
//! held strongly; projections and specialisations are held weakly and
//! dropped once no instance, field type or caller keeps them alive.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, PoisonError, RwLock, Weak};

use super::record::RecordTemplate;
use crate::errors::RecordResult;
use crate::observability::{log_event, Event};

/// Point-in-time registry counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegistryStats {
    /// Public templates registered
    pub declared: usize,
    /// Derived templates still alive
    pub derived_live: usize,
    /// Lookups answered by an existing entry
    pub hits: u64,
    /// Dead weak entries removed
    pub pruned: u64,
}

/// Registry of record templates
#[derive(Debug, Default)]
pub struct Registry {
    /// Public templates by shape id
    public: RwLock<HashMap<String, Arc<RecordTemplate>>>,

    /// Latest public template by name
    by_name: RwLock<HashMap<String, Arc<RecordTemplate>>>,

    /// Derived templates by shape id
    derived: RwLock<HashMap<String, Weak<RecordTemplate>>>,

    hits: AtomicU64,
    pruned: AtomicU64,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry
    pub fn global() -> &'static Registry {
        static GLOBAL: OnceLock<Registry> = OnceLock::new();
        GLOBAL.get_or_init(Registry::new)
    }

    /// Any live template with this shape id
    pub fn lookup(&self, shape_id: &str) -> Option<Arc<RecordTemplate>> {
        let public = self.public.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(t) = public.get(shape_id) {
            return Some(Arc::clone(t));
        }
        drop(public);
        self.derived
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(shape_id)
            .and_then(Weak::upgrade)
    }

    /// Most recently declared public template with this name
    pub fn lookup_public(&self, name: &str) -> Option<Arc<RecordTemplate>> {
        self.by_name
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Register a public template, or return the one already holding its
    /// shape id
    pub(crate) fn insert_public(&self, template: RecordTemplate) -> Arc<RecordTemplate> {
        let registered = {
            let mut public = self.public.write().unwrap_or_else(PoisonError::into_inner);
            match public.get(template.shape_id()) {
                Some(existing) => {
                    self.record_hit(existing.name());
                    Arc::clone(existing)
                }
                None => {
                    let template = Arc::new(template);
                    public.insert(template.shape_id().to_string(), Arc::clone(&template));
                    template
                }
            }
        };
        self.by_name
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(registered.name().to_string(), Arc::clone(&registered));
        registered
    }

    /// Return the live derived template for `shape_id`, building it with
    /// `build` on a miss.
    ///
    /// `build` runs without any lock held, so it may derive further
    /// templates. If another caller registered the shape meanwhile, theirs
    /// wins.
    pub(crate) fn get_or_derive<F>(&self, shape_id: &str, build: F) -> RecordResult<Arc<RecordTemplate>>
    where
        F: FnOnce() -> RecordResult<RecordTemplate>,
    {
        if let Some(existing) = self.live_derived(shape_id) {
            self.record_hit(existing.name());
            return Ok(existing);
        }

        let built = Arc::new(build()?);

        let mut derived = self.derived.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = derived.get(shape_id).and_then(Weak::upgrade) {
            return Ok(existing);
        }
        let before = derived.len();
        derived.retain(|_, entry| entry.strong_count() > 0);
        let pruned = before - derived.len();
        derived.insert(shape_id.to_string(), Arc::downgrade(&built));
        drop(derived);

        if pruned > 0 {
            self.pruned.fetch_add(pruned as u64, Ordering::Relaxed);
            log_event(Event::RegistryPruned, &[("count", &pruned.to_string())]);
        }
        Ok(built)
    }

    fn live_derived(&self, shape_id: &str) -> Option<Arc<RecordTemplate>> {
        self.derived
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(shape_id)
            .and_then(Weak::upgrade)
    }

    fn record_hit(&self, name: &str) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        log_event(Event::RegistryHit, &[("name", name)]);
    }

    /// Counter snapshot
    pub fn stats(&self) -> RegistryStats {
        let declared = self.public.read().map(|m| m.len()).unwrap_or(0);
        let derived_live = self
            .derived
            .read()
            .map(|m| m.values().filter(|w| w.strong_count() > 0).count())
            .unwrap_or(0);
        RegistryStats {
            declared,
            derived_live,
            hits: self.hits.load(Ordering::Relaxed),
            pruned: self.pruned.load(Ordering::Relaxed),
        }
    }
}
