//! Call phases and the context operations each phase allows.

use std::fmt;

/// The phase a call context is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Field/property injection during construction
    Injection,
    PostConstruct,
    /// Legacy create callback
    Create,
    Business,
    /// Business call that arrived through a service endpoint
    BusinessWs,
    Timeout,
    PreDestroy,
}

impl Operation {
    /// The context operations allowed while in this phase.
    pub fn allowed(self) -> AllowedOperations {
        use ContextOperation::*;
        match self {
            Operation::Injection => AllowedOperations::of(&[Lookup]),
            Operation::PostConstruct | Operation::Create | Operation::PreDestroy => {
                AllowedOperations::of(&[Lookup, BusinessObject, ContextData, RollbackOnly])
            }
            Operation::Business | Operation::BusinessWs | Operation::Timeout => AllowedOperations::all(),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Injection => "INJECTION",
            Operation::PostConstruct => "POST_CONSTRUCT",
            Operation::Create => "CREATE",
            Operation::Business => "BUSINESS",
            Operation::BusinessWs => "BUSINESS_WS",
            Operation::Timeout => "TIMEOUT",
            Operation::PreDestroy => "PRE_DESTROY",
        };
        f.write_str(name)
    }
}

/// Operations a bean may perform on its session context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ContextOperation {
    CallerPrincipal = 0,
    CallerInRole = 1,
    Lookup = 2,
    BusinessObject = 3,
    ContextData = 4,
    RollbackOnly = 5,
    MessageContext = 6,
}

impl ContextOperation {
    pub fn name(self) -> &'static str {
        match self {
            ContextOperation::CallerPrincipal => "getCallerPrincipal",
            ContextOperation::CallerInRole => "isCallerInRole",
            ContextOperation::Lookup => "lookup",
            ContextOperation::BusinessObject => "getBusinessObject",
            ContextOperation::ContextData => "getContextData",
            ContextOperation::RollbackOnly => "setRollbackOnly",
            ContextOperation::MessageContext => "getMessageContext",
        }
    }

    const fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

/// Set of [`ContextOperation`]s allowed in a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AllowedOperations(u8);

impl AllowedOperations {
    pub const fn none() -> Self {
        AllowedOperations(0)
    }

    pub const fn all() -> Self {
        AllowedOperations(0x7f)
    }

    pub fn of(ops: &[ContextOperation]) -> Self {
        AllowedOperations(ops.iter().fold(0, |acc, op| acc | op.bit()))
    }

    pub fn contains(self, op: ContextOperation) -> bool {
        self.0 & op.bit() != 0
    }
}
