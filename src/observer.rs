//! Observers for container lifecycle and invocation events.
//!
//! Observers are called synchronously on the thread that produced the event,
//! so implementations should stay cheap. Every hook has an empty default.

use std::sync::Arc;
use std::time::Duration;

use crate::descriptors::{InterfaceType, LockType};

/// How a business invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationOutcome {
    Success,
    ApplicationException,
    SystemException,
    /// The call never reached the bean (lock timeout, denied, bad method)
    Rejected,
}

/// Identifies one business invocation in observer callbacks.
#[derive(Debug, Clone, Copy)]
pub struct InvocationEvent<'a> {
    pub deployment_id: &'a str,
    pub method: &'a str,
    pub interface_type: InterfaceType,
    pub lock_type: Option<LockType>,
}

/// Container event hooks.
///
/// # Examples
///
/// ```rust
/// use ferrous_singleton::{ContainerObserver, InvocationEvent, InvocationOutcome};
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::time::Duration;
///
/// #[derive(Default)]
/// struct FailureCounter(AtomicUsize);
///
/// impl ContainerObserver for FailureCounter {
///     fn invocation_completed(&self, _event: &InvocationEvent<'_>, outcome: InvocationOutcome, _elapsed: Duration) {
///         if outcome != InvocationOutcome::Success {
///             self.0.fetch_add(1, Ordering::Relaxed);
///         }
///     }
/// }
/// ```
pub trait ContainerObserver: Send + Sync {
    fn deployed(&self, _deployment_id: &str) {}

    fn undeployed(&self, _deployment_id: &str) {}

    /// The singleton finished construction, post-construct included.
    fn instance_created(&self, _deployment_id: &str, _elapsed: Duration) {}

    fn instance_creation_failed(&self, _deployment_id: &str, _message: &str) {}

    fn instance_destroyed(&self, _deployment_id: &str) {}

    fn invocation_completed(&self, _event: &InvocationEvent<'_>, _outcome: InvocationOutcome, _elapsed: Duration) {}

    fn lock_timeout(&self, _event: &InvocationEvent<'_>, _waited: Duration) {}

    fn async_submitted(&self, _deployment_id: &str, _method: &str) {}
}

#[derive(Default, Clone)]
pub(crate) struct Observers {
    observers: Vec<Arc<dyn ContainerObserver>>,
}

impl Observers {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(&mut self, observer: Arc<dyn ContainerObserver>) {
        self.observers.push(observer);
    }

    #[inline]
    pub(crate) fn has_observers(&self) -> bool {
        !self.observers.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.observers.len()
    }

    #[inline]
    pub(crate) fn deployed(&self, deployment_id: &str) {
        for observer in &self.observers {
            observer.deployed(deployment_id);
        }
    }

    #[inline]
    pub(crate) fn undeployed(&self, deployment_id: &str) {
        for observer in &self.observers {
            observer.undeployed(deployment_id);
        }
    }

    #[inline]
    pub(crate) fn instance_created(&self, deployment_id: &str, elapsed: Duration) {
        for observer in &self.observers {
            observer.instance_created(deployment_id, elapsed);
        }
    }

    #[inline]
    pub(crate) fn instance_creation_failed(&self, deployment_id: &str, message: &str) {
        for observer in &self.observers {
            observer.instance_creation_failed(deployment_id, message);
        }
    }

    #[inline]
    pub(crate) fn instance_destroyed(&self, deployment_id: &str) {
        for observer in &self.observers {
            observer.instance_destroyed(deployment_id);
        }
    }

    #[inline]
    pub(crate) fn invocation_completed(&self, event: &InvocationEvent<'_>, outcome: InvocationOutcome, elapsed: Duration) {
        for observer in &self.observers {
            observer.invocation_completed(event, outcome, elapsed);
        }
    }

    #[inline]
    pub(crate) fn lock_timeout(&self, event: &InvocationEvent<'_>, waited: Duration) {
        for observer in &self.observers {
            observer.lock_timeout(event, waited);
        }
    }

    #[inline]
    pub(crate) fn async_submitted(&self, deployment_id: &str, method: &str) {
        for observer in &self.observers {
            observer.async_submitted(deployment_id, method);
        }
    }
}

/// Emits every event through `tracing`.
#[derive(Debug, Clone)]
pub struct TracingObserver {
    target: &'static str,
}

impl TracingObserver {
    pub fn new() -> Self {
        Self { target: "ferrous_singleton" }
    }

    /// Tags events with a custom `observer` field.
    pub fn with_target(target: &'static str) -> Self {
        Self { target }
    }
}

impl Default for TracingObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerObserver for TracingObserver {
    fn deployed(&self, deployment_id: &str) {
        tracing::info!(observer = self.target, deployment_id, "deployed");
    }

    fn undeployed(&self, deployment_id: &str) {
        tracing::info!(observer = self.target, deployment_id, "undeployed");
    }

    fn instance_created(&self, deployment_id: &str, elapsed: Duration) {
        tracing::info!(observer = self.target, deployment_id, ?elapsed, "singleton instance created");
    }

    fn instance_creation_failed(&self, deployment_id: &str, message: &str) {
        tracing::error!(observer = self.target, deployment_id, message, "singleton construction failed");
    }

    fn instance_destroyed(&self, deployment_id: &str) {
        tracing::info!(observer = self.target, deployment_id, "singleton instance destroyed");
    }

    fn invocation_completed(&self, event: &InvocationEvent<'_>, outcome: InvocationOutcome, elapsed: Duration) {
        tracing::debug!(
            observer = self.target,
            deployment_id = event.deployment_id,
            method = event.method,
            interface = %event.interface_type,
            lock = ?event.lock_type,
            ?outcome,
            ?elapsed,
            "invocation completed"
        );
    }

    fn lock_timeout(&self, event: &InvocationEvent<'_>, waited: Duration) {
        tracing::warn!(
            observer = self.target,
            deployment_id = event.deployment_id,
            method = event.method,
            lock = ?event.lock_type,
            ?waited,
            "lock wait expired"
        );
    }

    fn async_submitted(&self, deployment_id: &str, method: &str) {
        tracing::trace!(observer = self.target, deployment_id, method, "asynchronous call submitted");
    }
}
