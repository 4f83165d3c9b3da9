//! Resource address construction
//!
//! Turns a logical resource name into the location an activator loads from.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::loader::descriptor::ResourceName;

/// Schemes that mark a resource name as absolute
pub const ABSOLUTE_SCHEMES: &[&str] = &["http://", "https://", "file://"];

/// Address options derived from the loader configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressOptions {
    base_path: String,
    extension: String,
    append_timestamp: bool,
}

impl AddressOptions {
    /// Create options, normalizing `base_path` to end with exactly one `/`
    pub fn new(base_path: &str, extension: &str, append_timestamp: bool) -> Self {
        Self {
            base_path: normalize_base_path(base_path),
            extension: extension.trim_start_matches('.').to_string(),
            append_timestamp,
        }
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }
}

/// Normalize a base path so it ends with exactly one separator
///
/// An empty base path stays empty (names are then used as given).
pub fn normalize_base_path(base_path: &str) -> String {
    if base_path.is_empty() {
        return String::new();
    }
    let trimmed = base_path.trim_end_matches('/');
    format!("{}/", trimmed)
}

/// Whether a resource name carries a recognized scheme
pub fn is_absolute(name: &str) -> bool {
    ABSOLUTE_SCHEMES.iter().any(|scheme| name.starts_with(scheme))
}

/// Fully built resource location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceAddress {
    resource: ResourceName,
    location: String,
}

impl ResourceAddress {
    /// Build the address of `resource` under `options`
    pub fn build(resource: &ResourceName, options: &AddressOptions) -> Self {
        let name = resource.as_str();
        let mut location = if is_absolute(name) {
            name.to_string()
        } else {
            format!("{}{}", options.base_path, name)
        };

        if !options.extension.is_empty() {
            let suffix = format!(".{}", options.extension);
            if !location.ends_with(&suffix) {
                location.push_str(&suffix);
            }
        }

        if options.append_timestamp {
            let millis = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis())
                .unwrap_or(0);
            location.push_str(&format!("?timestamp={}", millis));
        }

        Self {
            resource: resource.clone(),
            location,
        }
    }

    pub fn resource(&self) -> &ResourceName {
        &self.resource
    }

    /// Full location including any cache-busting query
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Location without the query string
    pub fn path(&self) -> &str {
        self.location
            .split_once('?')
            .map(|(path, _)| path)
            .unwrap_or(&self.location)
    }

    /// Whether the location should be fetched over HTTP
    pub fn is_remote(&self) -> bool {
        self.location.starts_with("http://") || self.location.starts_with("https://")
    }
}

impl fmt::Display for ResourceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.location)
    }
}
