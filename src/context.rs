//! Per-call context and the session context exposed to beans.
//!
//! The call context is an explicit value created at call entry and threaded
//! through every step of the critical path; there is no thread-local state.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use ahash::AHashMap;

use crate::deployment::Deployment;
use crate::descriptors::InterfaceType;
use crate::environment::{EnvValue, EnvironmentLookup};
use crate::error::{ContainerError, ContainerResult};
use crate::key::{ContainerId, ProxyRef, RegistryKey};
use crate::operation::{AllowedOperations, ContextOperation, Operation};
use crate::security::{Principal, SecurityService};

/// Call-scoped state: deployment, primary key, current phase and what the
/// phase allows.
pub struct InvocationContext {
    deployment: Arc<Deployment>,
    primary_key: Option<String>,
    interface_type: InterfaceType,
    method: Option<String>,
    operation: Operation,
    allowed: AllowedOperations,
    rollback_only: bool,
    data: AHashMap<String, String>,
}

impl InvocationContext {
    pub fn new(deployment: Arc<Deployment>, primary_key: Option<String>, interface_type: InterfaceType) -> Self {
        Self {
            deployment,
            primary_key,
            interface_type,
            method: None,
            operation: Operation::Business,
            allowed: Operation::Business.allowed(),
            rollback_only: false,
            data: AHashMap::new(),
        }
    }

    pub fn deployment(&self) -> &Arc<Deployment> {
        &self.deployment
    }

    pub fn deployment_id(&self) -> &str {
        self.deployment.id()
    }

    /// Always `None` for singletons; kept for the shared call shape.
    pub fn primary_key(&self) -> Option<&str> {
        self.primary_key.as_deref()
    }

    pub fn interface_type(&self) -> InterfaceType {
        self.interface_type
    }

    pub fn method(&self) -> Option<&str> {
        self.method.as_deref()
    }

    pub(crate) fn set_method(&mut self, method: impl Into<String>) {
        self.method = Some(method.into());
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn allowed(&self) -> AllowedOperations {
        self.allowed
    }

    /// Fails with `IllegalState` when the current phase disallows `op`.
    pub fn check(&self, op: ContextOperation) -> ContainerResult<()> {
        if self.allowed.contains(op) {
            Ok(())
        } else {
            Err(ContainerError::IllegalState {
                operation: op.name(),
                phase: self.operation,
            })
        }
    }

    /// Switches to `operation` until the returned guard drops, which restores
    /// the previous phase on every exit path.
    pub fn enter(&mut self, operation: Operation) -> PhaseGuard<'_> {
        let saved = (self.operation, self.allowed);
        self.operation = operation;
        self.allowed = operation.allowed();
        PhaseGuard { context: self, saved }
    }

    pub fn is_rollback_only(&self) -> bool {
        self.rollback_only
    }

    pub(crate) fn mark_rollback_only(&mut self) {
        self.rollback_only = true;
    }

    /// Interceptor-shared data for this call.
    pub fn data(&self) -> &AHashMap<String, String> {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut AHashMap<String, String> {
        &mut self.data
    }
}

/// Restores the caller's phase and allowed operations on drop.
pub struct PhaseGuard<'a> {
    context: &'a mut InvocationContext,
    saved: (Operation, AllowedOperations),
}

impl Deref for PhaseGuard<'_> {
    type Target = InvocationContext;

    fn deref(&self) -> &InvocationContext {
        self.context
    }
}

impl DerefMut for PhaseGuard<'_> {
    fn deref_mut(&mut self) -> &mut InvocationContext {
        self.context
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        let (operation, allowed) = self.saved;
        self.context.operation = operation;
        self.context.allowed = allowed;
    }
}

/// Principal/role queries and environment access for bean code.
///
/// Bound into each deployment's environment under [`SessionContext::JNDI_NAME`]
/// the first time the instance is created.
pub struct SessionContext {
    container_id: ContainerId,
    security: Arc<dyn SecurityService>,
}

impl SessionContext {
    pub const JNDI_NAME: &'static str = "comp/EJBContext";

    pub fn new(container_id: ContainerId, security: Arc<dyn SecurityService>) -> Self {
        Self { container_id, security }
    }

    pub fn caller_principal(&self, ctx: &InvocationContext) -> ContainerResult<Principal> {
        ctx.check(ContextOperation::CallerPrincipal)?;
        Ok(self.security.caller_principal())
    }

    pub fn is_caller_in_role(&self, ctx: &InvocationContext, role: &str) -> ContainerResult<bool> {
        ctx.check(ContextOperation::CallerInRole)?;
        Ok(self.security.is_caller_in_role(role))
    }

    pub fn lookup(&self, ctx: &InvocationContext, name: &str) -> ContainerResult<Option<EnvValue>> {
        ctx.check(ContextOperation::Lookup)?;
        Ok(ctx.deployment().environment().lookup(name))
    }

    /// A reference to the singleton through the call's business view.
    pub fn business_object(&self, ctx: &InvocationContext, interface_class: &str) -> ContainerResult<ProxyRef> {
        ctx.check(ContextOperation::BusinessObject)?;
        let deployment = ctx.deployment();
        let interface_type = deployment.interface_type(interface_class).ok_or_else(|| {
            ContainerError::UnknownInterface {
                deployment_id: deployment.id().to_string(),
                interface_class: interface_class.to_string(),
            }
        })?;
        Ok(ProxyRef {
            key: RegistryKey::new(self.container_id.clone(), deployment.id()),
            interface_type,
            interface_class: interface_class.to_string(),
        })
    }

    pub fn set_rollback_only(&self, ctx: &mut InvocationContext) -> ContainerResult<()> {
        ctx.check(ContextOperation::RollbackOnly)?;
        ctx.mark_rollback_only();
        Ok(())
    }

    pub fn rollback_only(&self, ctx: &InvocationContext) -> ContainerResult<bool> {
        ctx.check(ContextOperation::RollbackOnly)?;
        Ok(ctx.is_rollback_only())
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("container_id", &self.container_id)
            .finish()
    }
}

/// Web-service view of the session context.
#[derive(Debug, Clone)]
pub struct WebServiceContext {
    session: Arc<SessionContext>,
}

impl WebServiceContext {
    pub const JNDI_NAME: &'static str = "comp/WebServiceContext";

    pub fn new(session: Arc<SessionContext>) -> Self {
        Self { session }
    }

    pub fn user_principal(&self, ctx: &InvocationContext) -> ContainerResult<Principal> {
        self.session.caller_principal(ctx)
    }

    pub fn is_user_in_role(&self, ctx: &InvocationContext, role: &str) -> ContainerResult<bool> {
        self.session.is_caller_in_role(ctx, role)
    }

    pub fn session(&self) -> &Arc<SessionContext> {
        &self.session
    }
}
