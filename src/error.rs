//! Error types for the singleton container.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::descriptors::{InterfaceType, LockType};
use crate::operation::Operation;

/// Boxed error returned by bean methods, interceptors and lifecycle callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Container errors
///
/// Represents everything a caller of [`SingletonContainer`](crate::SingletonContainer)
/// can observe besides a business result: configuration problems, security
/// denials, lock timeouts, application exceptions propagated unmodified, and
/// system exceptions wrapped so their cause is not the direct failure type.
///
/// # Examples
///
/// ```rust
/// use ferrous_singleton::{ContainerError, LockType};
/// use std::time::Duration;
///
/// let unknown = ContainerError::UnknownDeployment("Counter".to_string());
/// assert_eq!(unknown.to_string(), "Deployment not found: Counter");
///
/// let timeout = ContainerError::ConcurrentAccessTimeout {
///     deployment_id: "Counter".to_string(),
///     method: "reset".to_string(),
///     lock_type: LockType::Write,
///     waited: Duration::from_millis(50),
/// };
/// assert!(timeout.is_timeout());
/// ```
#[derive(Debug, Error)]
pub enum ContainerError {
    /// No deployment registered under the id
    #[error("Deployment not found: {0}")]
    UnknownDeployment(String),
    /// A deployment with the same id is already registered
    #[error("Deployment already registered: {0}")]
    DuplicateDeployment(String),
    /// The deployment is registered but has no container data attached
    #[error("Deployment is not deployed in this container: {0}")]
    NotDeployed(String),
    /// The interface class is not declared by the deployment
    #[error("Interface {interface_class} is not declared by deployment {deployment_id}")]
    UnknownInterface {
        deployment_id: String,
        interface_class: String,
    },
    /// No run method matches the called interface method
    #[error("No run method for {interface_class}.{method} in deployment {deployment_id}")]
    NoSuchMethod {
        deployment_id: String,
        interface_class: String,
        method: String,
    },
    /// Caller failed the authorization check
    #[error("Access denied to {method} on {interface_type} interface")]
    AccessDenied {
        method: String,
        interface_type: InterfaceType,
    },
    /// The bounded lock wait expired
    #[error("Unable to acquire {lock_type} lock for {deployment_id}.{method} within {waited:?}")]
    ConcurrentAccessTimeout {
        deployment_id: String,
        method: String,
        lock_type: LockType,
        waited: Duration,
    },
    /// A context operation was called from a phase that does not allow it
    #[error("{operation} is not allowed during {phase}")]
    IllegalState {
        operation: &'static str,
        phase: Operation,
    },
    /// The method requires a caller transaction and none exists
    #[error("Method {method} requires a caller transaction")]
    TransactionRequired { method: String },
    /// Business-declared failure, propagated as thrown
    #[error("{0}")]
    Application(BoxError),
    /// Unexpected failure inside the bean or its interceptor chain
    #[error("System exception in deployment {deployment_id}: {message}")]
    System {
        deployment_id: String,
        message: String,
        source: BoxError,
    },
    /// Invalid container or deployment configuration
    #[error("Configuration error: {0}")]
    Config(String),
    /// The call's arguments do not fit the called view
    #[error("Invalid call arguments: {0}")]
    InvalidArguments(String),
    /// A returned value was not of the type the caller asked for
    #[error("Result is not a {expected}")]
    ResultTypeMismatch { expected: &'static str },
    /// The asynchronous worker pool no longer accepts work
    #[error("Asynchronous pool is shut down")]
    PoolShutdown,
}

impl ContainerError {
    /// Wraps an unexpected failure as a system exception.
    pub fn system(deployment_id: impl Into<String>, message: impl Into<String>, source: BoxError) -> Self {
        ContainerError::System {
            deployment_id: deployment_id.into(),
            message: message.into(),
            source,
        }
    }

    /// Returns true for wrapped system exceptions.
    pub fn is_system(&self) -> bool {
        matches!(self, ContainerError::System { .. })
    }

    /// Returns true for propagated application exceptions.
    pub fn is_application(&self) -> bool {
        matches!(self, ContainerError::Application(_))
    }

    /// Returns true when the bounded lock wait expired.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ContainerError::ConcurrentAccessTimeout { .. })
    }

    /// Returns true for authorization failures.
    pub fn is_access_denied(&self) -> bool {
        matches!(self, ContainerError::AccessDenied { .. })
    }

    /// Downcasts a propagated application exception to its concrete type.
    pub fn application_error<E>(&self) -> Option<&E>
    where
        E: std::error::Error + 'static,
    {
        match self {
            ContainerError::Application(err) => err.downcast_ref::<E>(),
            _ => None,
        }
    }
}

/// Result type for container operations
pub type ContainerResult<T> = Result<T, ContainerError>;

/// Marks a returned error as a system exception regardless of deployment metadata.
///
/// Construction failures wrapped in a `SystemException` are unwrapped to their
/// cause before being reported.
#[derive(Debug)]
pub struct SystemException(pub BoxError);

impl SystemException {
    pub fn new(err: impl Into<BoxError>) -> Self {
        SystemException(err.into())
    }

    pub fn into_inner(self) -> BoxError {
        self.0
    }
}

impl fmt::Display for SystemException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for SystemException {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&*self.0)
    }
}

/// A panic that unwound out of bean code, captured as an error.
#[derive(Debug, Error)]
#[error("bean code panicked: {message}")]
pub struct PanicError {
    pub message: String,
}

impl PanicError {
    pub(crate) fn from_payload(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        PanicError { message }
    }
}

/// Strips `SystemException` wrappers so the cause is what gets reported.
pub(crate) fn unwrap_target(err: BoxError) -> BoxError {
    let mut err = err;
    loop {
        match err.downcast::<SystemException>() {
            Ok(wrapper) => err = (*wrapper).into_inner(),
            Err(other) => return other,
        }
    }
}
