//! Deployment metadata enums: interface views, lock types, transaction attributes.

use std::fmt;

/// The view through which a call reaches the singleton.
///
/// Business views dispatch to the bean; EJB 2.x home and component views are
/// short-circuited by the container, and `Timeout` marks container-initiated
/// timer callbacks, which bypass authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterfaceType {
    BusinessLocal,
    BusinessRemote,
    LocalBean,
    Home,
    LocalHome,
    EjbObject,
    EjbLocalObject,
    ServiceEndpoint,
    Timeout,
}

impl InterfaceType {
    /// Home views create references but never touch the instance.
    pub fn is_home(self) -> bool {
        matches!(self, InterfaceType::Home | InterfaceType::LocalHome)
    }

    /// EJB 2.x component views.
    pub fn is_component(self) -> bool {
        matches!(self, InterfaceType::EjbObject | InterfaceType::EjbLocalObject)
    }

    pub fn is_business(self) -> bool {
        matches!(
            self,
            InterfaceType::BusinessLocal | InterfaceType::BusinessRemote | InterfaceType::LocalBean
        )
    }

    /// The component view a home interface's `create*` methods hand out.
    pub fn object_view(self) -> InterfaceType {
        match self {
            InterfaceType::Home => InterfaceType::EjbObject,
            InterfaceType::LocalHome => InterfaceType::EjbLocalObject,
            other => other,
        }
    }
}

impl fmt::Display for InterfaceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InterfaceType::BusinessLocal => "business-local",
            InterfaceType::BusinessRemote => "business-remote",
            InterfaceType::LocalBean => "local-bean",
            InterfaceType::Home => "home",
            InterfaceType::LocalHome => "local-home",
            InterfaceType::EjbObject => "ejb-object",
            InterfaceType::EjbLocalObject => "ejb-local-object",
            InterfaceType::ServiceEndpoint => "service-endpoint",
            InterfaceType::Timeout => "timeout",
        };
        f.write_str(name)
    }
}

/// Per-method concurrency attribute.
///
/// WRITE holders exclude every other holder; READ holders only exclude writers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LockType {
    Read,
    #[default]
    Write,
}

impl fmt::Display for LockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockType::Read => f.write_str("READ"),
            LockType::Write => f.write_str("WRITE"),
        }
    }
}

/// Who is responsible for serializing access to the instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConcurrencyManagement {
    /// The container acquires READ/WRITE locks around every business call
    #[default]
    Container,
    /// The bean handles its own thread-safety; the container never blocks
    Bean,
}

/// Per-method transaction attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TransactionAttribute {
    #[default]
    Required,
    RequiresNew,
    Mandatory,
    Supports,
    NotSupported,
    Never,
    /// Bean-managed transactions: the container never begins one
    BeanManaged,
}

impl fmt::Display for TransactionAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionAttribute::Required => "Required",
            TransactionAttribute::RequiresNew => "RequiresNew",
            TransactionAttribute::Mandatory => "Mandatory",
            TransactionAttribute::Supports => "Supports",
            TransactionAttribute::NotSupported => "NotSupported",
            TransactionAttribute::Never => "Never",
            TransactionAttribute::BeanManaged => "BeanManaged",
        };
        f.write_str(name)
    }
}

/// Classification of a failure raised by bean code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionType {
    /// Business-declared failure; `rollback` forces the transaction to roll back
    Application { rollback: bool },
    /// Unexpected runtime failure; always rolls back
    System,
}

impl ExceptionType {
    pub fn is_system(self) -> bool {
        matches!(self, ExceptionType::System)
    }
}
