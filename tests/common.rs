//! Shared fixtures for loader integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Semaphore;

use require_loader::loader::{ActivationError, Namespace, ResourceActivator, ResourceAddress};
use require_loader::{Dependency, LoaderBuilder, LoaderConfig, LoaderHandle};

/// Activator that records every call and can hold activations until released
#[derive(Clone, Default)]
pub struct RecordingActivator {
    exports: HashMap<String, Value>,
    failing: HashSet<String>,
    calls: Arc<Mutex<Vec<String>>>,
    gate: Option<Arc<Semaphore>>,
    delay: Option<Duration>,
}

impl RecordingActivator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `exports` when `resource` activates
    pub fn with_resource(mut self, resource: &str, exports: Value) -> Self {
        self.exports.insert(resource.to_string(), exports);
        self
    }

    /// Make activation of `resource` fail
    pub fn failing(mut self, resource: &str) -> Self {
        self.failing.insert(resource.to_string());
        self
    }

    /// Hold every activation until `release` is called
    pub fn gated(mut self) -> Self {
        self.gate = Some(Arc::new(Semaphore::new(0)));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Let `count` held activations proceed
    pub fn release(&self, count: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(count);
        }
    }

    /// Resources activated so far, in call order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, resource: &str) -> usize {
        self.calls().iter().filter(|r| r.as_str() == resource).count()
    }
}

#[async_trait]
impl ResourceActivator for RecordingActivator {
    async fn activate(
        &self,
        address: &ResourceAddress,
        namespace: &Namespace,
    ) -> Result<(), ActivationError> {
        let resource = address.resource().to_string();
        self.calls.lock().unwrap().push(resource.clone());

        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.contains(&resource) {
            return Err(ActivationError::Io(format!("{} is broken", resource)));
        }
        if let Some(exports) = self.exports.get(&resource) {
            namespace.merge(exports.clone());
        }
        Ok(())
    }
}

/// Spawn a loader around `activator` with default configuration
pub fn spawn_loader(activator: RecordingActivator) -> LoaderHandle {
    spawn_with_config(activator, LoaderConfig::default())
}

pub fn spawn_with_config(activator: RecordingActivator, config: LoaderConfig) -> LoaderHandle {
    LoaderBuilder::new(config)
        .activator(activator)
        .spawn()
        .expect("loader should spawn")
}

/// Parse dependency tokens (`Cap.Path:resource` or `resource`)
pub fn deps(tokens: &[&str]) -> Vec<Dependency> {
    tokens
        .iter()
        .map(|t| Dependency::parse(t).expect("valid dependency"))
        .collect()
}

/// Temporary directory of JSON resources
pub struct ResourceDir {
    pub temp_dir: TempDir,
}

impl ResourceDir {
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Write `exports` as `<name>.json`
    pub fn write(&self, name: &str, exports: &Value) -> PathBuf {
        let path = self.path().join(format!("{}.json", name));
        std::fs::write(&path, serde_json::to_string(exports).unwrap()).expect("write resource");
        path
    }
}
