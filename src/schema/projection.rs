//! Projection trees
//!
//! A `Projection` names what to drop: leaves drop a field, subtrees recurse
//! into the record template a field refers to. A `KeepSpec` names what to
//! keep, in the same shape. Both are ordered maps so their JSON form is
//! canonical.

use serde_json::{Map as JsonMap, Value as JsonValue};
use std::collections::BTreeMap;
use std::fmt;

use crate::errors::{RecordError, RecordResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectionNode {
    /// Remove the field
    Drop,
    /// Recurse into the nested template
    Nested(Projection),
}

/// Fields to subtract from a template.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Projection {
    nodes: BTreeMap<String, ProjectionNode>,
}

impl Projection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every listed field.
    pub fn of<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        names.into_iter().fold(Self::new(), |p, name| p.drop(name))
    }

    /// Adds a dropped field.
    pub fn drop(mut self, name: impl Into<String>) -> Self {
        self.nodes.insert(name.into(), ProjectionNode::Drop);
        self
    }

    /// Adds a nested subtree; an empty subtree is a no-op.
    pub fn nested(self, name: impl Into<String>, sub: Projection) -> Self {
        if sub.is_empty() {
            return self;
        }
        let mut single = Projection::new();
        single.nodes.insert(name.into(), ProjectionNode::Nested(sub));
        self.merge(&single)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn get(&self, name: &str) -> Option<&ProjectionNode> {
        self.nodes.get(name)
    }

    pub fn drops(&self, name: &str) -> bool {
        matches!(self.nodes.get(name), Some(ProjectionNode::Drop))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ProjectionNode)> {
        self.nodes.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Union of two projections. Dropping a field absorbs any subtree under it.
    pub fn merge(&self, other: &Projection) -> Projection {
        let mut nodes = self.nodes.clone();
        for (name, node) in &other.nodes {
            let merged = match (nodes.remove(name), node) {
                (None, node) => node.clone(),
                (Some(ProjectionNode::Drop), _) | (_, ProjectionNode::Drop) => ProjectionNode::Drop,
                (Some(ProjectionNode::Nested(a)), ProjectionNode::Nested(b)) => {
                    ProjectionNode::Nested(a.merge(b))
                }
            };
            nodes.insert(name.clone(), merged);
        }
        Projection { nodes }
    }

    /// The entries whose names satisfy `keep`.
    pub fn filtered(&self, keep: impl Fn(&str) -> bool) -> Projection {
        Projection {
            nodes: self
                .nodes
                .iter()
                .filter(|(name, _)| keep(name))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    /// `{"dropped": null, "nested": {...}}`
    pub fn to_json(&self) -> JsonValue {
        let mut obj = JsonMap::new();
        for (name, node) in &self.nodes {
            let value = match node {
                ProjectionNode::Drop => JsonValue::Null,
                ProjectionNode::Nested(sub) => sub.to_json(),
            };
            obj.insert(name.clone(), value);
        }
        JsonValue::Object(obj)
    }

    /// Accepts a name, an array of names, or an object whose `null` values
    /// drop and whose array/object values recurse.
    pub fn from_json(value: &JsonValue) -> RecordResult<Projection> {
        match value {
            JsonValue::String(name) => Ok(Projection::new().drop(name.clone())),
            JsonValue::Array(items) => items.iter().try_fold(Projection::new(), |p, item| match item {
                JsonValue::String(name) => Ok(p.drop(name.clone())),
                other => Err(RecordError::schema_definition(format!(
                    "projection entries must be field names, got {}",
                    other
                ))),
            }),
            JsonValue::Object(obj) => obj.iter().try_fold(Projection::new(), |p, (name, v)| match v {
                JsonValue::Null => Ok(p.drop(name.clone())),
                nested => Ok(p.nested(name.clone(), Projection::from_json(nested)?)),
            }),
            other => Err(RecordError::schema_definition(format!(
                "invalid projection {}",
                other
            ))),
        }
    }
}

impl fmt::Display for Projection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeepNode {
    /// Keep the field whole
    Keep,
    /// Keep the field, restricted to these nested fields
    Nested(KeepSpec),
}

/// Fields to keep when intersecting a template.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KeepSpec {
    nodes: BTreeMap<String, KeepNode>,
}

impl KeepSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps a single field.
    pub fn field(name: impl Into<String>) -> Self {
        Self::new().keep(name)
    }

    /// Keeps every listed field.
    pub fn of<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        names.into_iter().fold(Self::new(), |k, name| k.keep(name))
    }

    pub fn keep(mut self, name: impl Into<String>) -> Self {
        self.nodes.insert(name.into(), KeepNode::Keep);
        self
    }

    pub fn nested(mut self, name: impl Into<String>, sub: KeepSpec) -> Self {
        self.nodes.insert(name.into(), KeepNode::Nested(sub));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&KeepNode> {
        self.nodes.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &KeepNode)> {
        self.nodes.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// The entries whose names satisfy `keep`.
    pub fn filtered(&self, keep: impl Fn(&str) -> bool) -> KeepSpec {
        KeepSpec {
            nodes: self
                .nodes
                .iter()
                .filter(|(name, _)| keep(name))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    /// Fields kept by both specs.
    pub fn intersect(&self, other: &KeepSpec) -> KeepSpec {
        let mut nodes = BTreeMap::new();
        for (name, a) in &self.nodes {
            let Some(b) = other.nodes.get(name) else {
                continue;
            };
            let node = match (a, b) {
                (KeepNode::Keep, KeepNode::Keep) => KeepNode::Keep,
                (KeepNode::Keep, nested @ KeepNode::Nested(_))
                | (nested @ KeepNode::Nested(_), KeepNode::Keep) => nested.clone(),
                (KeepNode::Nested(x), KeepNode::Nested(y)) => KeepNode::Nested(x.intersect(y)),
            };
            nodes.insert(name.clone(), node);
        }
        KeepSpec { nodes }
    }

    pub fn to_json(&self) -> JsonValue {
        let mut obj = JsonMap::new();
        for (name, node) in &self.nodes {
            let value = match node {
                KeepNode::Keep => JsonValue::Null,
                KeepNode::Nested(sub) => sub.to_json(),
            };
            obj.insert(name.clone(), value);
        }
        JsonValue::Object(obj)
    }

    /// Same shapes as `Projection::from_json`, read as fields to keep.
    pub fn from_json(value: &JsonValue) -> RecordResult<KeepSpec> {
        match value {
            JsonValue::String(name) => Ok(KeepSpec::field(name.clone())),
            JsonValue::Array(items) => items.iter().try_fold(KeepSpec::new(), |k, item| match item {
                JsonValue::String(name) => Ok(k.keep(name.clone())),
                other => Err(RecordError::schema_definition(format!(
                    "keep entries must be field names, got {}",
                    other
                ))),
            }),
            JsonValue::Object(obj) => obj.iter().try_fold(KeepSpec::new(), |k, (name, v)| match v {
                JsonValue::Null => Ok(k.keep(name.clone())),
                nested => Ok(k.nested(name.clone(), KeepSpec::from_json(nested)?)),
            }),
            other => Err(RecordError::schema_definition(format!("invalid keep spec {}", other))),
        }
    }
}

impl fmt::Display for KeepSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}
