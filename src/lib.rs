//! require-loader - dependency-driven dynamic resource loader
//!
//! Given a list of dependencies, the loader activates the backing resource of
//! each one exactly once, parks duplicate requests while a resource is in
//! flight, and invokes the caller's continuation only after every dependency
//! is satisfied.
//!
//! ## Design Principles
//!
//! 1. **At-most-once activation**: concurrent requests for a resource share one activation
//! 2. **Ordered results**: resolved values follow the original request order
//! 3. **Actor-owned state**: no locks around the in-flight table or pending queue
//! 4. **Fail loudly**: activation failures and missing capabilities are errors, not hangs
//!
//! ```rust,no_run
//! use require_loader::{Dependency, LoaderConfig, LoaderHandle};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let loader = LoaderHandle::spawn(LoaderConfig {
//!     base_path: Some("resources".to_string()),
//!     ..Default::default()
//! })?;
//! let resolution = loader
//!     .resolve(vec![Dependency::guarded("jQuery", "jquery-1.8.2")?], vec![])
//!     .await?;
//! println!("{:?}", resolution.exports);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod loader;
pub mod utils;

pub use config::{LoaderConfig, LoggingConfig, RescanPolicy};
pub use loader::{
    ActivationError, CapabilityPath, Dependency, DependencySpec, LoaderBuilder, LoaderError,
    LoaderHandle, LoaderStatus, Namespace, NamespaceProbe, RegistrationSlot, Resolution,
    ResourceActivator, ResourceName,
};
