//! Deployment registry.

use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::Mutex;

use crate::deployment::Deployment;
use crate::error::{ContainerError, ContainerResult};

/// Deployments keyed by id, guarded by a single mutex.
///
/// `register`, `remove` are the only mutation points. Registration order is
/// kept so that container shutdown can tear deployments down in reverse.
#[derive(Default)]
pub struct DeploymentRegistry {
    inner: Mutex<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    by_id: AHashMap<String, Arc<Deployment>>,
    order: Vec<String>,
}

impl DeploymentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a deployment; ids are unique within a registry.
    pub fn register(&self, deployment: Arc<Deployment>) -> ContainerResult<()> {
        let mut inner = self.inner.lock();
        let id = deployment.id().to_string();
        if inner.by_id.contains_key(&id) {
            return Err(ContainerError::DuplicateDeployment(id));
        }
        inner.order.push(id.clone());
        inner.by_id.insert(id, deployment);
        Ok(())
    }

    pub fn lookup(&self, id: &str) -> Option<Arc<Deployment>> {
        self.inner.lock().by_id.get(id).cloned()
    }

    /// All deployments in registration order.
    pub fn list(&self) -> Vec<Arc<Deployment>> {
        let inner = self.inner.lock();
        inner
            .order
            .iter()
            .filter_map(|id| inner.by_id.get(id).cloned())
            .collect()
    }

    pub fn remove(&self, id: &str) -> Option<Arc<Deployment>> {
        let mut inner = self.inner.lock();
        let removed = inner.by_id.remove(id);
        if removed.is_some() {
            inner.order.retain(|existing| existing != id);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.inner.lock().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
