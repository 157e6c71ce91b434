//! The singleton instance and the manager that creates and destroys it.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use ahash::AHashMap;
use once_cell::sync::OnceCell;

use crate::context::SessionContext;
use crate::deployment::Bean;
use crate::interceptor::{ChainKind, Interceptor, InterceptorStack};
use crate::lock::InstanceLock;

mod manager;

pub use manager::InstanceManager;

/// The one object backing a deployment, with its interceptors and lock.
///
/// Created on first access, never replaced, destroyed only when the
/// deployment is torn down.
pub struct SingletonInstance {
    bean: Arc<Bean>,
    bean_class: String,
    interceptors: AHashMap<String, Arc<dyn Interceptor>>,
    own_interceptor: Option<Arc<dyn Interceptor>>,
    lock: InstanceLock,
    session: Arc<SessionContext>,
    destroyed: AtomicBool,
    created_at: Instant,
}

impl SingletonInstance {
    pub fn bean(&self) -> &(dyn Any + Send + Sync) {
        &*self.bean
    }

    /// The bean as its concrete type.
    pub fn bean_as<B: Any>(&self) -> Option<&B> {
        self.bean.downcast_ref::<B>()
    }

    pub fn interceptor(&self, name: &str) -> Option<&Arc<dyn Interceptor>> {
        self.interceptors.get(name)
    }

    pub fn interceptor_count(&self) -> usize {
        self.interceptors.len()
    }

    pub fn lock(&self) -> &InstanceLock {
        &self.lock
    }

    pub fn session(&self) -> &Arc<SessionContext> {
        &self.session
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub(crate) fn bean_handle(&self) -> &Arc<Bean> {
        &self.bean
    }

    /// Resolves interceptor names to this instance's interceptor objects.
    ///
    /// The bean class name resolves to the bean itself when it intercepts.
    pub(crate) fn stack(&self, names: &[String], kind: ChainKind) -> InterceptorStack {
        let mut stack = InterceptorStack::new(kind);
        for name in names {
            let handle = if *name == self.bean_class {
                self.own_interceptor.as_ref()
            } else {
                self.interceptors.get(name)
            };
            if let Some(handle) = handle {
                stack.push(handle.clone());
            }
        }
        stack
    }
}

impl fmt::Debug for SingletonInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.interceptors.keys().collect();
        names.sort();
        f.debug_struct("SingletonInstance")
            .field("bean_class", &self.bean_class)
            .field("interceptors", &names)
            .field("lock", &self.lock)
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

/// Per-deployment container data: the slot the instance lives in.
///
/// Construction through the cell is serialized, so concurrent first callers
/// all observe the same instance. A failed construction leaves it empty.
#[derive(Default)]
pub(crate) struct SingletonData {
    instance: OnceCell<Arc<SingletonInstance>>,
}

impl SingletonData {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn get(&self) -> Option<&Arc<SingletonInstance>> {
        self.instance.get()
    }
}
