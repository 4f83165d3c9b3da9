//! Resolution state machine
//!
//! `ResolverState` holds the in-flight table and the pending queue and turns
//! resolution attempts and activation completions into effects. It performs
//! no I/O itself: the loader actor executes the `Effect`s it returns, which
//! keeps every transition synchronous and testable.

use std::collections::{HashMap, VecDeque};
use tracing::{debug, warn};

use crate::config::RescanPolicy;
use crate::loader::context::{Attempt, ResolutionContext, ResolveOutcome};
use crate::loader::descriptor::{Dependency, ResourceName};
use crate::loader::namespace::NamespaceProbe;
use crate::loader::traits::{ActivationError, LoaderError};

/// Identifies one activation of a resource
///
/// A completion is only accepted when its token matches the current
/// in-flight entry, so activations abandoned by `reset` cannot complete a
/// later activation of the same name.
pub type ActivationToken = u64;

/// Work the caller must carry out after a transition
#[derive(Debug)]
pub enum Effect {
    /// Start activating a resource that was just marked in flight
    Activate {
        resource: ResourceName,
        token: ActivationToken,
    },
    /// A context is done; fire its continuation with `outcome`
    Complete {
        context: ResolutionContext,
        outcome: ResolveOutcome,
    },
}

/// A context suspended on the descriptor it could not satisfy yet
#[derive(Debug)]
struct Suspended {
    dependency: Dependency,
    context: ResolutionContext,
}

/// Owner of a running activation
#[derive(Debug)]
struct InFlight {
    token: ActivationToken,
    owner: Suspended,
}

/// In-flight table plus pending queue
#[derive(Debug)]
pub struct ResolverState {
    /// Resource name -> the context that triggered its activation
    in_flight: HashMap<ResourceName, InFlight>,
    /// Contexts blocked on a resource another context is activating
    pending: VecDeque<Suspended>,
    policy: RescanPolicy,
    /// Never reset, so tokens stay unique for the lifetime of the state
    next_token: ActivationToken,
}

impl ResolverState {
    pub fn new(policy: RescanPolicy) -> Self {
        Self {
            in_flight: HashMap::new(),
            pending: VecDeque::new(),
            policy,
            next_token: 0,
        }
    }

    /// Run one resolution attempt as far as it can go without waiting
    pub fn submit(&mut self, attempt: Attempt, probe: &dyn NamespaceProbe) -> Vec<Effect> {
        let mut effects = Vec::new();
        let context = match attempt {
            Attempt::Fresh(request) => {
                let context = ResolutionContext::from(request);
                debug!(
                    "Resolving context {} ({} dependencies)",
                    context.id(),
                    context.remaining()
                );
                context
            }
            Attempt::Resumption(context) => context,
        };
        self.advance(context, probe, &mut effects);
        effects
    }

    /// Record the end of a resource activation
    ///
    /// On success the owning context resumes; on failure the owner and every
    /// context queued on the same resource complete with the error.
    /// Completions whose token does not match the in-flight entry are
    /// ignored.
    pub fn activation_finished(
        &mut self,
        resource: &ResourceName,
        token: ActivationToken,
        result: Result<(), ActivationError>,
        probe: &dyn NamespaceProbe,
    ) -> Vec<Effect> {
        let mut effects = Vec::new();
        match self.in_flight.get(resource) {
            Some(entry) if entry.token == token => {}
            Some(entry) => {
                warn!(
                    "Ignoring stale completion of {} (activation {}, current {})",
                    resource, token, entry.token
                );
                return effects;
            }
            None => {
                warn!("Activation of {} finished but it is not in flight", resource);
                return effects;
            }
        }
        let owner = match self.in_flight.remove(resource) {
            Some(entry) => entry.owner,
            None => return effects,
        };

        match result {
            Ok(()) => {
                debug!("Activation of {} finished", resource);
                self.resume(owner, probe, &mut effects);
            }
            Err(error) => {
                warn!("Activation of {} failed: {}", resource, error);
                let failure = LoaderError::ActivationFailed {
                    resource: resource.to_string(),
                    source: error,
                };
                effects.push(Effect::Complete {
                    context: owner.context,
                    outcome: Err(failure.clone()),
                });
                let (failed, kept): (VecDeque<_>, VecDeque<_>) = self
                    .pending
                    .drain(..)
                    .partition(|waiting| waiting.dependency.resource() == resource);
                self.pending = kept;
                for waiting in failed {
                    effects.push(Effect::Complete {
                        context: waiting.context,
                        outcome: Err(failure.clone()),
                    });
                }
            }
        }

        if self.policy == RescanPolicy::Full {
            self.drain_ready(probe, &mut effects);
        }
        effects
    }

    /// Drain the remaining descriptors of `context`
    ///
    /// Returns `true` when the context completed.
    fn advance(
        &mut self,
        mut context: ResolutionContext,
        probe: &dyn NamespaceProbe,
        effects: &mut Vec<Effect>,
    ) -> bool {
        while let Some(dependency) = context.next_dependency() {
            if let Some(capability) = dependency.capability() {
                if probe.is_present(capability) {
                    debug!("{} already available", capability);
                    continue;
                }
            }

            let resource = dependency.resource().clone();
            if self.in_flight.contains_key(&resource) {
                debug!(
                    "{} is already loading; queueing context {}",
                    resource,
                    context.id()
                );
                self.pending.push_back(Suspended {
                    dependency,
                    context,
                });
                return false;
            }

            let token = self.next_token;
            self.next_token += 1;
            self.in_flight.insert(
                resource.clone(),
                InFlight {
                    token,
                    owner: Suspended {
                        dependency,
                        context,
                    },
                },
            );
            effects.push(Effect::Activate { resource, token });
            return false;
        }

        let outcome = context.resolution(probe);
        debug!("Context {} resolved", context.id());
        effects.push(Effect::Complete { context, outcome });

        if self.policy == RescanPolicy::TailOnly {
            self.rescan_tail(probe, effects);
        }
        true
    }

    /// Continue a suspended context once its resource is no longer in flight
    fn resume(&mut self, suspended: Suspended, probe: &dyn NamespaceProbe, effects: &mut Vec<Effect>) {
        let Suspended {
            dependency,
            context,
        } = suspended;

        if let Some(capability) = dependency.capability() {
            if !probe.is_present(capability) {
                warn!(
                    "{} still missing after activating {}",
                    capability,
                    dependency.resource()
                );
                effects.push(Effect::Complete {
                    context,
                    outcome: Err(LoaderError::Unresolvable {
                        capability: capability.to_string(),
                        resource: dependency.resource().to_string(),
                    }),
                });
                return;
            }
        }

        self.advance(context, probe, effects);
    }

    /// Resume every queued context whose resource finished, oldest first
    fn drain_ready(&mut self, probe: &dyn NamespaceProbe, effects: &mut Vec<Effect>) {
        // Resuming never shrinks the in-flight table, so entries found not
        // ready here stay not ready for the rest of the loop.
        while let Some(index) = self
            .pending
            .iter()
            .position(|waiting| !self.in_flight.contains_key(waiting.dependency.resource()))
        {
            if let Some(waiting) = self.pending.remove(index) {
                self.resume(waiting, probe, effects);
            }
        }
    }

    /// Resume only the newest queued context, if its resource finished
    fn rescan_tail(&mut self, probe: &dyn NamespaceProbe, effects: &mut Vec<Effect>) {
        let tail_ready = match self.pending.back() {
            Some(waiting) => !self.in_flight.contains_key(waiting.dependency.resource()),
            None => false,
        };
        if !tail_ready {
            return;
        }
        if let Some(waiting) = self.pending.pop_back() {
            self.resume(waiting, probe, effects);
        }
    }

    /// Abandon all outstanding work, returning the dropped contexts
    pub fn reset(&mut self) -> Vec<ResolutionContext> {
        let mut dropped: Vec<ResolutionContext> =
            self.in_flight.drain().map(|(_, entry)| entry.owner.context).collect();
        dropped.extend(self.pending.drain(..).map(|waiting| waiting.context));
        dropped
    }

    /// True when nothing is loading and nothing is queued
    pub fn is_idle(&self) -> bool {
        self.in_flight.is_empty() && self.pending.is_empty()
    }

    pub fn is_in_flight(&self, resource: &ResourceName) -> bool {
        self.in_flight.contains_key(resource)
    }

    /// Names currently in flight, sorted
    pub fn in_flight(&self) -> Vec<ResourceName> {
        let mut names: Vec<ResourceName> = self.in_flight.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

impl Default for ResolverState {
    fn default() -> Self {
        Self::new(RescanPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::context::{Continuation, ResolveRequest};
    use crate::loader::descriptor::CapabilityPath;
    use crate::loader::namespace::Namespace;
    use serde_json::{json, Value};
    use tokio::sync::oneshot;

    fn fresh(deps: &[&str], args: Vec<Value>) -> (Attempt, oneshot::Receiver<ResolveOutcome>) {
        let (tx, rx) = oneshot::channel();
        let dependencies = deps.iter().map(|d| Dependency::parse(d).unwrap()).collect();
        let request = ResolveRequest::new(dependencies, args, Continuation::Channel(tx));
        (Attempt::Fresh(request), rx)
    }

    fn name(n: &str) -> ResourceName {
        ResourceName::new(n).unwrap()
    }

    fn define(ns: &Namespace, path: &str, value: Value) {
        ns.define(&CapabilityPath::parse(path).unwrap().unwrap(), value);
    }

    /// Report the current activation of `resource` as finished
    fn complete(
        state: &mut ResolverState,
        resource: &str,
        result: Result<(), ActivationError>,
        ns: &Namespace,
    ) -> Vec<Effect> {
        let token = state.in_flight[&name(resource)].token;
        state.activation_finished(&name(resource), token, result, ns)
    }

    /// Fire completions the way the actor does and count activations
    fn apply(effects: Vec<Effect>) -> Vec<ResourceName> {
        let mut activated = Vec::new();
        for effect in effects {
            match effect {
                Effect::Activate { resource, .. } => activated.push(resource),
                Effect::Complete { context, outcome } => context.finish(outcome),
            }
        }
        activated
    }

    #[test]
    fn test_empty_list_completes_immediately() {
        let ns = Namespace::new();
        let mut state = ResolverState::default();
        let (attempt, mut rx) = fresh(&[], vec![json!("arg")]);

        let activated = apply(state.submit(attempt, &ns));

        assert!(activated.is_empty());
        let resolution = rx.try_recv().unwrap().unwrap();
        assert_eq!(resolution.arguments(), vec![json!("arg")]);
        assert!(state.is_idle());
    }

    #[test]
    fn test_satisfied_dependencies_resolve_in_order() {
        let ns = Namespace::from_value(json!({"A": 1, "B": {"C": 2}, "D": 3}));
        let mut state = ResolverState::default();
        let (attempt, mut rx) = fresh(&["D:d", "B.C:b", "A:a"], vec![json!(0)]);

        let activated = apply(state.submit(attempt, &ns));

        assert!(activated.is_empty());
        let resolution = rx.try_recv().unwrap().unwrap();
        assert_eq!(resolution.arguments(), vec![json!(0), json!(3), json!(2), json!(1)]);
    }

    #[test]
    fn test_duplicate_resource_activated_once() {
        let ns = Namespace::new();
        let mut state = ResolverState::default();
        let (first, mut rx1) = fresh(&["X:x"], vec![]);
        let (second, mut rx2) = fresh(&["X:x"], vec![]);

        let mut activated = apply(state.submit(first, &ns));
        activated.extend(apply(state.submit(second, &ns)));

        assert_eq!(activated, vec![name("x")]);
        assert_eq!(state.pending_len(), 1);

        define(&ns, "X", json!("ready"));
        let activated = apply(complete(&mut state, "x", Ok(()), &ns));

        assert!(activated.is_empty());
        assert_eq!(rx1.try_recv().unwrap().unwrap().exports, vec![json!("ready")]);
        assert_eq!(rx2.try_recv().unwrap().unwrap().exports, vec![json!("ready")]);
        assert!(state.is_idle());
    }

    #[test]
    fn test_pending_queue_drain_full_scan() {
        let ns = Namespace::new();
        let mut state = ResolverState::new(RescanPolicy::Full);
        let (a, mut rx_a) = fresh(&["X:x", "Y:y"], vec![]);
        let (b, mut rx_b) = fresh(&["X:x"], vec![]);

        assert_eq!(apply(state.submit(a, &ns)), vec![name("x")]);
        assert!(apply(state.submit(b, &ns)).is_empty());

        define(&ns, "X", json!(1));
        let activated = apply(complete(&mut state, "x", Ok(()), &ns));

        assert_eq!(activated, vec![name("y")]);
        assert!(rx_a.try_recv().is_err());
        assert_eq!(rx_b.try_recv().unwrap().unwrap().exports, vec![json!(1)]);

        define(&ns, "Y", json!(2));
        apply(complete(&mut state, "y", Ok(()), &ns));

        assert_eq!(rx_a.try_recv().unwrap().unwrap().exports, vec![json!(1), json!(2)]);
        assert!(state.is_idle());
    }

    #[test]
    fn test_pending_queue_drain_tail_only() {
        let ns = Namespace::new();
        let mut state = ResolverState::new(RescanPolicy::TailOnly);
        let (a, mut rx_a) = fresh(&["X:x", "Y:y"], vec![]);
        let (b, mut rx_b) = fresh(&["X:x"], vec![]);

        apply(state.submit(a, &ns));
        apply(state.submit(b, &ns));

        define(&ns, "X", json!(1));
        assert_eq!(
            apply(complete(&mut state, "x", Ok(()), &ns)),
            vec![name("y")]
        );
        // B only gets re-examined once some context completes.
        assert!(rx_b.try_recv().is_err());
        assert_eq!(state.pending_len(), 1);

        define(&ns, "Y", json!(2));
        apply(complete(&mut state, "y", Ok(()), &ns));

        assert!(rx_a.try_recv().unwrap().is_ok());
        assert!(rx_b.try_recv().unwrap().is_ok());
        assert!(state.is_idle());
    }

    #[test]
    fn test_bare_dependency_satisfied_by_activation() {
        let ns = Namespace::new();
        let mut state = ResolverState::default();
        let (attempt, mut rx) = fresh(&["plain"], vec![json!("x")]);

        assert_eq!(apply(state.submit(attempt, &ns)), vec![name("plain")]);
        apply(complete(&mut state, "plain", Ok(()), &ns));

        let resolution = rx.try_recv().unwrap().unwrap();
        assert_eq!(resolution.arguments(), vec![json!("x")]);
        assert!(resolution.exports.is_empty());
    }

    #[test]
    fn test_activation_failure_reaches_owner_and_waiters() {
        let ns = Namespace::new();
        let mut state = ResolverState::default();
        let (a, mut rx_a) = fresh(&["X:x"], vec![]);
        let (b, mut rx_b) = fresh(&["X:x"], vec![]);
        let (c, mut rx_c) = fresh(&["Z:z"], vec![]);
        apply(state.submit(a, &ns));
        apply(state.submit(b, &ns));
        apply(state.submit(c, &ns));

        let failure = ActivationError::NotFound("x.json".to_string());
        apply(complete(&mut state, "x", Err(failure.clone()), &ns));

        let expected = LoaderError::ActivationFailed {
            resource: "x".to_string(),
            source: failure,
        };
        assert_eq!(rx_a.try_recv().unwrap().unwrap_err(), expected);
        assert_eq!(rx_b.try_recv().unwrap().unwrap_err(), expected);
        assert!(rx_c.try_recv().is_err());
        assert!(state.is_in_flight(&name("z")));
    }

    #[test]
    fn test_missing_capability_after_activation_is_unresolvable() {
        let ns = Namespace::new();
        let mut state = ResolverState::default();
        let (attempt, mut rx) = fresh(&["Never.There:x"], vec![]);

        apply(state.submit(attempt, &ns));
        apply(complete(&mut state, "x", Ok(()), &ns));

        assert!(matches!(
            rx.try_recv().unwrap(),
            Err(LoaderError::Unresolvable { ref capability, .. }) if capability == "Never.There"
        ));
        assert!(state.is_idle());
    }

    #[test]
    fn test_unknown_completion_ignored() {
        let ns = Namespace::new();
        let mut state = ResolverState::default();
        assert!(state
            .activation_finished(&name("ghost"), 0, Ok(()), &ns)
            .is_empty());
    }

    #[test]
    fn test_stale_completion_after_reset_ignored() {
        let ns = Namespace::new();
        let mut state = ResolverState::default();
        let (first, _rx_first) = fresh(&["x"], vec![]);
        apply(state.submit(first, &ns));
        let stale = state.in_flight[&name("x")].token;
        state.reset();

        let (second, mut rx_second) = fresh(&["x"], vec![]);
        assert_eq!(apply(state.submit(second, &ns)), vec![name("x")]);

        let effects = state.activation_finished(&name("x"), stale, Ok(()), &ns);
        assert!(effects.is_empty());
        assert!(state.is_in_flight(&name("x")));
        assert!(rx_second.try_recv().is_err());

        // A third request still waits on the running activation.
        let (third, _rx_third) = fresh(&["x"], vec![]);
        assert!(apply(state.submit(third, &ns)).is_empty());
        assert_eq!(state.pending_len(), 1);

        apply(complete(&mut state, "x", Ok(()), &ns));
        assert!(rx_second.try_recv().unwrap().is_ok());
        assert!(state.is_idle());
    }

    #[test]
    fn test_reset_returns_outstanding_contexts() {
        let ns = Namespace::new();
        let mut state = ResolverState::default();
        let (a, _rx_a) = fresh(&["X:x"], vec![]);
        let (b, _rx_b) = fresh(&["X:x"], vec![]);
        apply(state.submit(a, &ns));
        apply(state.submit(b, &ns));

        let dropped = state.reset();

        assert_eq!(dropped.len(), 2);
        assert!(state.is_idle());
        assert!(state.in_flight().is_empty());
    }
}
