//! Shared namespace
//!
//! The namespace is the root object activators publish exports into and the
//! resolver probes to decide whether a capability is already available.

use serde_json::{Map, Value};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

use crate::loader::descriptor::CapabilityPath;

/// Read-only view used by the resolver
pub trait NamespaceProbe {
    /// Value at `path`, if every segment exists and the final value is not `null`
    fn lookup(&self, path: &CapabilityPath) -> Option<Value>;

    /// Check whether `path` is present
    fn is_present(&self, path: &CapabilityPath) -> bool {
        self.lookup(path).is_some()
    }
}

/// Cloneable handle to the shared namespace root
#[derive(Debug, Clone)]
pub struct Namespace {
    root: Arc<RwLock<Value>>,
}

impl Namespace {
    /// Create an empty namespace
    pub fn new() -> Self {
        Self::from_value(Value::Object(Map::new()))
    }

    /// Create a namespace from an existing root object
    ///
    /// Non-object roots are replaced by an empty object.
    pub fn from_value(root: Value) -> Self {
        let root = match root {
            Value::Object(_) => root,
            _ => Value::Object(Map::new()),
        };
        Self {
            root: Arc::new(RwLock::new(root)),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Value> {
        self.root.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Value> {
        self.root.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Define `value` at `path`, creating intermediate objects
    ///
    /// Intermediate non-object values are overwritten.
    pub fn define(&self, path: &CapabilityPath, value: Value) {
        let mut root = self.write();
        let mut node = &mut *root;
        let (last, parents) = match path.segments().split_last() {
            Some(split) => split,
            None => return,
        };
        for segment in parents {
            node = child_object(node).entry(segment.clone()).or_insert(Value::Null);
        }
        child_object(node).insert(last.clone(), value);
        debug!("Defined {} in namespace", path);
    }

    /// Deep-merge an object of exports into the root
    pub fn merge(&self, exports: Value) {
        let mut root = self.write();
        merge_value(&mut root, exports);
    }

    /// Remove the value at `path`, returning it
    pub fn remove(&self, path: &CapabilityPath) -> Option<Value> {
        let mut root = self.write();
        let (last, parents) = path.segments().split_last()?;
        let mut node = &mut *root;
        for segment in parents {
            node = node.as_object_mut()?.get_mut(segment)?;
        }
        node.as_object_mut()?.remove(last)
    }

    /// Copy of the whole namespace
    pub fn snapshot(&self) -> Value {
        self.read().clone()
    }
}

impl Default for Namespace {
    fn default() -> Self {
        Self::new()
    }
}

impl NamespaceProbe for Namespace {
    fn lookup(&self, path: &CapabilityPath) -> Option<Value> {
        let root = self.read();
        let mut node = &*root;
        for segment in path.segments() {
            node = node.as_object()?.get(segment)?;
        }
        if node.is_null() {
            return None;
        }
        Some(node.clone())
    }
}

/// Coerce `node` into an object and return its map
fn child_object(node: &mut Value) -> &mut Map<String, Value> {
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    match node {
        Value::Object(map) => map,
        _ => unreachable!("node was just made an object"),
    }
}

fn merge_value(target: &mut Value, incoming: Value) {
    match (target, incoming) {
        (Value::Object(target), Value::Object(incoming)) => {
            for (key, value) in incoming {
                let replacement = match target.get_mut(&key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        merge_value(existing, value);
                        None
                    }
                    _ => Some(value),
                };
                if let Some(value) = replacement {
                    target.insert(key, value);
                }
            }
        }
        (target, incoming) => *target = incoming,
    }
}
