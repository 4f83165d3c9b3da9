//! Dependency-driven resource loader
//!
//! Resolves lists of dependencies by activating each backing resource at
//! most once, then hands the caller's continuation its arguments followed by
//! the resolved namespace values, in request order.
//!
//! ## Architecture
//!
//! - **Single owner**: one task owns the in-flight table and the pending queue
//! - **Pure transitions**: `ResolverState` turns attempts and completions into effects
//! - **Activator seam**: how a resource becomes available is behind `ResourceActivator`
//! - **Explicit failures**: failed activations and missing capabilities reach the continuation
//! - **No-conflict**: a registered loader detaches itself once all work drains

pub mod activator;
pub mod address;
pub mod context;
pub mod descriptor;
pub mod diagnostics;
pub mod manager;
pub mod namespace;
pub mod no_conflict;
pub mod resolver;
pub mod traits;

pub use activator::{FileActivator, StaticActivator};
#[cfg(feature = "http")]
pub use activator::HttpActivator;
pub use address::{AddressOptions, ResourceAddress};
pub use context::{Continuation, Resolution, ResolveOutcome};
pub use descriptor::{CapabilityPath, Dependency, DependencySpec, ResourceName};
pub use diagnostics::DiagnosticSink;
pub use manager::{LoaderBuilder, LoaderHandle, LoaderStatus, WeakLoaderHandle};
pub use namespace::{Namespace, NamespaceProbe};
pub use no_conflict::{NoConflict, RegistrationSlot};
pub use resolver::ResolverState;
pub use traits::{ActivationError, LoaderError, ResourceActivator};
