//! Transaction collaborator.
//!
//! The container drives a [`TransactionManager`] around every business call:
//! `create_policy` before the interceptor chain runs, one of the two
//! exception handlers when the chain fails, and `after_invoke` on every exit
//! path.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::context::InvocationContext;
use crate::descriptors::TransactionAttribute;
use crate::error::{BoxError, ContainerError, ContainerResult};

/// Per-call transaction state created from a method's transaction attribute.
pub trait TransactionPolicy: Send + fmt::Debug {
    fn attribute(&self) -> TransactionAttribute;
    /// True when the policy began a transaction of its own.
    fn is_new_transaction(&self) -> bool;
    fn set_rollback_only(&mut self);
    fn is_rollback_only(&self) -> bool;
}

pub trait TransactionManager: Send + Sync {
    fn create_policy(
        &self,
        attribute: TransactionAttribute,
        context: &InvocationContext,
    ) -> ContainerResult<Box<dyn TransactionPolicy>>;

    /// Completes the policy: commit, or roll back when marked rollback-only.
    fn after_invoke(&self, policy: Box<dyn TransactionPolicy>, context: &InvocationContext) -> ContainerResult<()>;

    /// System exceptions always force rollback.
    fn handle_system_exception(
        &self,
        policy: &mut dyn TransactionPolicy,
        error: &BoxError,
        context: &InvocationContext,
    );

    /// Application exceptions roll back only when flagged to.
    fn handle_application_exception(&self, policy: &mut dyn TransactionPolicy, error: &BoxError, rollback: bool);
}

/// Local transaction bookkeeping without an external resource manager.
#[derive(Debug, Default)]
pub struct LocalTransactionManager {
    next_id: AtomicU64,
    begun: AtomicU64,
    committed: AtomicU64,
    rolled_back: AtomicU64,
}

#[derive(Debug)]
struct LocalPolicy {
    attribute: TransactionAttribute,
    transaction: Option<u64>,
    rollback_only: bool,
}

impl TransactionPolicy for LocalPolicy {
    fn attribute(&self) -> TransactionAttribute {
        self.attribute
    }

    fn is_new_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    fn set_rollback_only(&mut self) {
        self.rollback_only = true;
    }

    fn is_rollback_only(&self) -> bool {
        self.rollback_only
    }
}

impl LocalTransactionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begun(&self) -> u64 {
        self.begun.load(Ordering::SeqCst)
    }

    pub fn committed(&self) -> u64 {
        self.committed.load(Ordering::SeqCst)
    }

    pub fn rolled_back(&self) -> u64 {
        self.rolled_back.load(Ordering::SeqCst)
    }
}

impl TransactionManager for LocalTransactionManager {
    fn create_policy(
        &self,
        attribute: TransactionAttribute,
        context: &InvocationContext,
    ) -> ContainerResult<Box<dyn TransactionPolicy>> {
        let transaction = match attribute {
            TransactionAttribute::Required | TransactionAttribute::RequiresNew => {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
                self.begun.fetch_add(1, Ordering::SeqCst);
                tracing::trace!(deployment_id = context.deployment_id(), tx = id, %attribute, "begin");
                Some(id)
            }
            TransactionAttribute::Mandatory => {
                return Err(ContainerError::TransactionRequired {
                    method: context.method().unwrap_or_default().to_string(),
                });
            }
            TransactionAttribute::Supports
            | TransactionAttribute::NotSupported
            | TransactionAttribute::Never
            | TransactionAttribute::BeanManaged => None,
        };
        Ok(Box::new(LocalPolicy {
            attribute,
            transaction,
            rollback_only: false,
        }))
    }

    fn after_invoke(&self, policy: Box<dyn TransactionPolicy>, context: &InvocationContext) -> ContainerResult<()> {
        if !policy.is_new_transaction() {
            return Ok(());
        }
        if policy.is_rollback_only() {
            self.rolled_back.fetch_add(1, Ordering::SeqCst);
            tracing::debug!(deployment_id = context.deployment_id(), "transaction rolled back");
        } else {
            self.committed.fetch_add(1, Ordering::SeqCst);
            tracing::trace!(deployment_id = context.deployment_id(), "transaction committed");
        }
        Ok(())
    }

    fn handle_system_exception(
        &self,
        policy: &mut dyn TransactionPolicy,
        error: &BoxError,
        context: &InvocationContext,
    ) {
        tracing::debug!(
            deployment_id = context.deployment_id(),
            error = %error,
            "marking transaction rollback-only after system exception"
        );
        policy.set_rollback_only();
    }

    fn handle_application_exception(&self, policy: &mut dyn TransactionPolicy, _error: &BoxError, rollback: bool) {
        if rollback {
            policy.set_rollback_only();
        }
    }
}
