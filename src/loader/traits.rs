//! Loader traits and error types
//!
//! Defines the activator seam the loader drives and the errors surfaced to
//! resolution continuations.

use async_trait::async_trait;
use thiserror::Error;

use crate::loader::address::ResourceAddress;
use crate::loader::namespace::Namespace;

/// Resource activator trait
///
/// An activator makes a named resource's exports available in the shared
/// namespace. The loader guarantees it is called at most once per resource
/// while that resource is in flight, and always from a spawned task, never
/// from inside a `resolve` call.
#[async_trait]
pub trait ResourceActivator: Send + Sync {
    /// Activate the resource at `address`, publishing its exports into `namespace`.
    async fn activate(
        &self,
        address: &ResourceAddress,
        namespace: &Namespace,
    ) -> Result<(), ActivationError>;
}

/// Errors raised while activating a single resource
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ActivationError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Failed to parse resource: {0}")]
    Parse(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Resource exports must be an object: {0}")]
    InvalidExports(String),

    #[error("Activation timed out after {0} ms")]
    Timeout(u64),
}

/// Loader errors delivered to continuations and callers
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LoaderError {
    #[error("Loader misconfiguration: {0}")]
    Misconfiguration(String),

    #[error("Activation of {resource} failed: {source}")]
    ActivationFailed {
        resource: String,
        #[source]
        source: ActivationError,
    },

    #[error("{capability} is unavailable after activating {resource}")]
    Unresolvable { capability: String, resource: String },

    #[error("Resolution abandoned by loader reset")]
    Reset,

    #[error("Loader has stopped")]
    Stopped,
}

impl From<std::io::Error> for ActivationError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::NotFound {
            ActivationError::NotFound(e.to_string())
        } else {
            ActivationError::Io(e.to_string())
        }
    }
}

impl From<serde_json::Error> for ActivationError {
    fn from(e: serde_json::Error) -> Self {
        ActivationError::Parse(e.to_string())
    }
}

impl From<toml::de::Error> for ActivationError {
    fn from(e: toml::de::Error) -> Self {
        ActivationError::Parse(e.to_string())
    }
}

impl From<anyhow::Error> for LoaderError {
    fn from(e: anyhow::Error) -> Self {
        LoaderError::Misconfiguration(e.to_string())
    }
}
