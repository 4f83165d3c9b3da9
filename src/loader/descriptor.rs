//! Dependency descriptors
//!
//! A dependency names the resource to activate and, optionally, the dotted
//! namespace path whose presence proves the resource is already loaded.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::loader::traits::LoaderError;

/// Logical name of a loadable resource (never empty)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceName(String);

impl ResourceName {
    /// Create a resource name, rejecting empty or blank names
    pub fn new(name: impl Into<String>) -> Result<Self, LoaderError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(LoaderError::Misconfiguration(
                "Resource name cannot be empty".to_string(),
            ));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Dot-separated path into the namespace, e.g. `jQuery.Tools`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CapabilityPath(Vec<String>);

impl CapabilityPath {
    /// Parse a dotted path
    ///
    /// Returns `Ok(None)` for the empty string, which means "no capability".
    pub fn parse(path: &str) -> Result<Option<Self>, LoaderError> {
        if path.is_empty() {
            return Ok(None);
        }
        let segments: Vec<String> = path.split('.').map(str::to_string).collect();
        if segments.iter().any(|s| s.trim().is_empty()) {
            return Err(LoaderError::Misconfiguration(format!(
                "Malformed capability path: {:?}",
                path
            )));
        }
        Ok(Some(Self(segments)))
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for CapabilityPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

/// A single dependency of a resolution request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    capability: Option<CapabilityPath>,
    resource: ResourceName,
}

impl Dependency {
    /// Dependency satisfied as soon as `resource` finishes activating
    pub fn bare(resource: &str) -> Result<Self, LoaderError> {
        Ok(Self {
            capability: None,
            resource: ResourceName::new(resource)?,
        })
    }

    /// Dependency satisfied once `capability` is present in the namespace
    pub fn guarded(capability: &str, resource: &str) -> Result<Self, LoaderError> {
        let capability = CapabilityPath::parse(capability)?.ok_or_else(|| {
            LoaderError::Misconfiguration(format!(
                "Guarded dependency on {} needs a capability path",
                resource
            ))
        })?;
        Ok(Self {
            capability: Some(capability),
            resource: ResourceName::new(resource)?,
        })
    }

    /// Build from a `(capability, resource)` pair; an empty capability means bare
    pub fn from_pair(capability: &str, resource: &str) -> Result<Self, LoaderError> {
        Ok(Self {
            capability: CapabilityPath::parse(capability)?,
            resource: ResourceName::new(resource)?,
        })
    }

    /// Parse the command-line form: `Capability.Path:resource` or `resource`
    pub fn parse(token: &str) -> Result<Self, LoaderError> {
        if token.contains("://") {
            return Self::bare(token);
        }
        match token.split_once(':') {
            Some((capability, resource)) => Self::from_pair(capability, resource),
            None => Self::bare(token),
        }
    }

    pub fn capability(&self) -> Option<&CapabilityPath> {
        self.capability.as_ref()
    }

    pub fn resource(&self) -> &ResourceName {
        &self.resource
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.capability {
            Some(capability) => write!(f, "{}:{}", capability, self.resource),
            None => write!(f, "{}", self.resource),
        }
    }
}

/// Serialized dependency form: `"resource"` or `["Capability.Path", "resource"]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencySpec {
    Bare(String),
    Pair(String, String),
}

impl TryFrom<DependencySpec> for Dependency {
    type Error = LoaderError;

    fn try_from(spec: DependencySpec) -> Result<Self, Self::Error> {
        match spec {
            DependencySpec::Bare(resource) => Dependency::bare(&resource),
            DependencySpec::Pair(capability, resource) => {
                Dependency::from_pair(&capability, &resource)
            }
        }
    }
}

impl From<&Dependency> for DependencySpec {
    fn from(dependency: &Dependency) -> Self {
        match &dependency.capability {
            Some(capability) => {
                DependencySpec::Pair(capability.to_string(), dependency.resource.to_string())
            }
            None => DependencySpec::Bare(dependency.resource.to_string()),
        }
    }
}

/// Convert a list of serialized specs, failing on the first malformed entry
pub fn parse_specs(specs: Vec<DependencySpec>) -> Result<Vec<Dependency>, LoaderError> {
    specs.into_iter().map(Dependency::try_from).collect()
}
