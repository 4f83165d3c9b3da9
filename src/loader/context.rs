//! Resolution requests and suspended resolution state
//!
//! A `ResolutionContext` is the saved frame of one partially completed
//! `resolve` call. It is moved between the pending queue, the in-flight
//! table and the resolver loop until its continuation fires.

use serde_json::Value;
use std::collections::VecDeque;
use std::fmt;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::loader::descriptor::Dependency;
use crate::loader::namespace::NamespaceProbe;
use crate::loader::traits::LoaderError;

/// Outcome delivered to a continuation
pub type ResolveOutcome = Result<Resolution, LoaderError>;

/// Callback form of a continuation
pub type ResolveCallback = Box<dyn FnOnce(ResolveOutcome) + Send + 'static>;

/// Where the outcome of a resolution goes
pub enum Continuation {
    /// Deliver through a oneshot channel (used by `LoaderHandle::resolve`)
    Channel(oneshot::Sender<ResolveOutcome>),
    /// Invoke a callback
    Callback(ResolveCallback),
}

impl Continuation {
    /// Deliver the outcome; consuming `self` makes delivery at-most-once
    pub fn fire(self, outcome: ResolveOutcome) {
        match self {
            Continuation::Channel(tx) => {
                // Receiver may have been dropped; nobody is waiting then.
                let _ = tx.send(outcome);
            }
            Continuation::Callback(callback) => callback(outcome),
        }
    }
}

impl fmt::Debug for Continuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Continuation::Channel(_) => f.write_str("Continuation::Channel"),
            Continuation::Callback(_) => f.write_str("Continuation::Callback"),
        }
    }
}

/// A fresh resolution request
#[derive(Debug)]
pub struct ResolveRequest {
    pub dependencies: Vec<Dependency>,
    pub args: Vec<Value>,
    pub continuation: Continuation,
}

impl ResolveRequest {
    pub fn new(dependencies: Vec<Dependency>, args: Vec<Value>, continuation: Continuation) -> Self {
        Self {
            dependencies,
            args,
            continuation,
        }
    }
}

/// Input to one resolver step
#[derive(Debug)]
pub enum Attempt {
    /// A top-level call entering the resolver
    Fresh(ResolveRequest),
    /// A suspended context continuing after a resource finished activating
    Resumption(ResolutionContext),
}

/// Saved state of one partially completed resolution
#[derive(Debug)]
pub struct ResolutionContext {
    id: Uuid,
    remaining: VecDeque<Dependency>,
    requested: Vec<Dependency>,
    args: Vec<Value>,
    continuation: Continuation,
}

impl ResolutionContext {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Descriptors not yet attempted
    pub fn remaining(&self) -> usize {
        self.remaining.len()
    }

    pub(crate) fn next_dependency(&mut self) -> Option<Dependency> {
        self.remaining.pop_front()
    }

    /// Build the continuation payload from the namespace
    ///
    /// Every requested descriptor carrying a capability contributes the
    /// value found at its path, in request order.
    pub(crate) fn resolution(&self, probe: &dyn NamespaceProbe) -> ResolveOutcome {
        let mut exports = Vec::new();
        for dependency in &self.requested {
            if let Some(capability) = dependency.capability() {
                let value = probe.lookup(capability).ok_or_else(|| LoaderError::Unresolvable {
                    capability: capability.to_string(),
                    resource: dependency.resource().to_string(),
                })?;
                exports.push(value);
            }
        }
        Ok(Resolution {
            args: self.args.clone(),
            exports,
        })
    }

    /// Fire the continuation, consuming the context
    pub fn finish(self, outcome: ResolveOutcome) {
        self.continuation.fire(outcome);
    }
}

impl From<ResolveRequest> for ResolutionContext {
    fn from(request: ResolveRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            remaining: request.dependencies.iter().cloned().collect(),
            requested: request.dependencies,
            args: request.args,
            continuation: request.continuation,
        }
    }
}

/// Arguments handed to a continuation
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// Caller-supplied arguments, forwarded untouched
    pub args: Vec<Value>,
    /// Resolved namespace values, one per guarded descriptor
    pub exports: Vec<Value>,
}

impl Resolution {
    /// Full argument list: caller arguments followed by resolved exports
    pub fn arguments(&self) -> Vec<Value> {
        self.args.iter().chain(self.exports.iter()).cloned().collect()
    }

    pub fn export(&self, index: usize) -> Option<&Value> {
        self.exports.get(index)
    }
}
