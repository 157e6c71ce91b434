//! Container identifiers and registry-scope keys.

use std::fmt;
use std::sync::Arc;

use crate::descriptors::InterfaceType;

/// Opaque identifier of a container instance.
///
/// Cheap to clone; combined with a deployment id it forms the [`RegistryKey`]
/// used by proxy/reference resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerId(Arc<str>);

impl ContainerId {
    pub fn new(id: impl AsRef<str>) -> Self {
        ContainerId(Arc::from(id.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Default for ContainerId {
    fn default() -> Self {
        ContainerId::new("Default Singleton Container")
    }
}

/// Registry-scope key: container id plus deployment id.
///
/// # Examples
///
/// ```rust
/// use ferrous_singleton::{ContainerId, RegistryKey};
///
/// let key = RegistryKey::new(ContainerId::new("singletons"), "Counter");
/// assert_eq!(key.to_string(), "singletons/Counter");
/// assert_eq!(key.deployment_id(), "Counter");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegistryKey {
    container_id: ContainerId,
    deployment_id: String,
}

impl RegistryKey {
    pub fn new(container_id: ContainerId, deployment_id: impl Into<String>) -> Self {
        Self {
            container_id,
            deployment_id: deployment_id.into(),
        }
    }

    pub fn container_id(&self) -> &ContainerId {
        &self.container_id
    }

    pub fn deployment_id(&self) -> &str {
        &self.deployment_id
    }
}

impl fmt::Display for RegistryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.container_id, self.deployment_id)
    }
}

/// Reference descriptor handed out by home-interface `create*` methods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyRef {
    pub key: RegistryKey,
    pub interface_type: InterfaceType,
    pub interface_class: String,
}
