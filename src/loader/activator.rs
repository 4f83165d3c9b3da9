//! Resource activators
//!
//! Activators fetch a resource's exports and publish them into the shared
//! namespace. Each resource is a JSON (or TOML) document whose top-level
//! object is deep-merged into the namespace root.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use crate::loader::address::ResourceAddress;
use crate::loader::namespace::Namespace;
use crate::loader::traits::{ActivationError, ResourceActivator};

/// Parse resource contents, choosing TOML for `.toml` locations
fn parse_exports(location: &str, contents: &str) -> Result<Value, ActivationError> {
    let exports: Value = if location.ends_with(".toml") {
        let table: toml::Value = toml::from_str(contents)?;
        serde_json::to_value(table)?
    } else {
        serde_json::from_str(contents)?
    };
    if !exports.is_object() {
        return Err(ActivationError::InvalidExports(location.to_string()));
    }
    Ok(exports)
}

/// Activator reading resources from the local filesystem
#[derive(Debug, Clone, Default)]
pub struct FileActivator;

impl FileActivator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ResourceActivator for FileActivator {
    async fn activate(
        &self,
        address: &ResourceAddress,
        namespace: &Namespace,
    ) -> Result<(), ActivationError> {
        let path = address.path();
        let path = path.strip_prefix("file://").unwrap_or(path);
        debug!("Reading resource {} from {}", address.resource(), path);

        let contents = tokio::fs::read_to_string(path).await?;
        let exports = parse_exports(path, &contents)?;
        namespace.merge(exports);
        Ok(())
    }
}

/// Activator serving exports from an in-memory table
///
/// Useful for embedding resources in a binary and for tests.
#[derive(Debug, Clone, Default)]
pub struct StaticActivator {
    resources: HashMap<String, Value>,
    latency: Option<Duration>,
}

impl StaticActivator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the exports published when `resource` activates
    pub fn with_resource(mut self, resource: &str, exports: Value) -> Self {
        self.resources.insert(resource.to_string(), exports);
        self
    }

    /// Delay every activation by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }
}

#[async_trait]
impl ResourceActivator for StaticActivator {
    async fn activate(
        &self,
        address: &ResourceAddress,
        namespace: &Namespace,
    ) -> Result<(), ActivationError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let exports = self
            .resources
            .get(address.resource().as_str())
            .ok_or_else(|| ActivationError::NotFound(address.location().to_string()))?;
        if !exports.is_object() {
            return Err(ActivationError::InvalidExports(address.location().to_string()));
        }
        namespace.merge(exports.clone());
        Ok(())
    }
}

/// Activator fetching resources over HTTP(S), falling back to the
/// filesystem for local locations
#[cfg(feature = "http")]
#[derive(Debug, Clone, Default)]
pub struct HttpActivator {
    client: reqwest::Client,
    local: FileActivator,
}

#[cfg(feature = "http")]
impl HttpActivator {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl ResourceActivator for HttpActivator {
    async fn activate(
        &self,
        address: &ResourceAddress,
        namespace: &Namespace,
    ) -> Result<(), ActivationError> {
        if !address.is_remote() {
            return self.local.activate(address, namespace).await;
        }
        debug!("Fetching resource {} from {}", address.resource(), address);

        let response = self
            .client
            .get(address.location())
            .send()
            .await
            .map_err(|e| ActivationError::Http(e.to_string()))?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ActivationError::NotFound(address.location().to_string()));
        }
        if !status.is_success() {
            return Err(ActivationError::Http(format!(
                "{} returned {}",
                address.location(),
                status
            )));
        }
        let body = response
            .text()
            .await
            .map_err(|e| ActivationError::Http(e.to_string()))?;
        let exports = parse_exports(address.path(), &body)?;
        namespace.merge(exports);
        Ok(())
    }
}
