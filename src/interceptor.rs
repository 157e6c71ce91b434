//! Interceptor chains.
//!
//! A chain is an ordered list of interceptor handles built once per call and
//! ending in a target: the business method for around-invoke chains, the
//! bean's own callbacks for lifecycle chains. Each handle decides whether and
//! when to [`proceed`](Next::proceed).

use std::any::Any;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::context::{InvocationContext, SessionContext};
use crate::error::{BoxError, ContainerResult};
use crate::environment::EnvValue;
use crate::operation::ContextOperation;
use crate::security::Principal;
use crate::value::{Args, BeanResult};
use crate::webservice::ServiceMessage;

/// Interceptor capability.
///
/// Every hook defaults to proceeding, so implementors override only the
/// phases they care about.
///
/// # Examples
///
/// ```rust
/// use ferrous_singleton::{Interceptor, Invocation, Next, BeanResult};
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// #[derive(Default)]
/// struct CallCounter(AtomicUsize);
///
/// impl Interceptor for CallCounter {
///     fn around_invoke(&self, inv: &mut Invocation<'_>, next: Next<'_>) -> BeanResult {
///         self.0.fetch_add(1, Ordering::SeqCst);
///         next.proceed(inv)
///     }
/// }
/// ```
pub trait Interceptor: Send + Sync + 'static {
    fn around_invoke(&self, inv: &mut Invocation<'_>, next: Next<'_>) -> BeanResult {
        next.proceed(inv)
    }

    fn post_construct(&self, inv: &mut Invocation<'_>, next: Next<'_>) -> BeanResult {
        next.proceed(inv)
    }

    fn pre_destroy(&self, inv: &mut Invocation<'_>, next: Next<'_>) -> BeanResult {
        next.proceed(inv)
    }
}

/// Which hook a chain drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainKind {
    AroundInvoke,
    PostConstruct,
    PreDestroy,
}

type Target<'c> = &'c (dyn Fn(&mut Invocation<'_>) -> BeanResult + 'c);

/// The remainder of a chain, handed to each interceptor.
pub struct Next<'c> {
    links: &'c [Arc<dyn Interceptor>],
    kind: ChainKind,
    target: Target<'c>,
}

impl<'c> Next<'c> {
    /// Runs the next interceptor, or the target once the chain is exhausted.
    pub fn proceed(self, inv: &mut Invocation<'_>) -> BeanResult {
        match self.links.split_first() {
            Some((head, rest)) => {
                let next = Next {
                    links: rest,
                    kind: self.kind,
                    target: self.target,
                };
                match self.kind {
                    ChainKind::AroundInvoke => head.around_invoke(inv, next),
                    ChainKind::PostConstruct => head.post_construct(inv, next),
                    ChainKind::PreDestroy => head.pre_destroy(inv, next),
                }
            }
            None => (self.target)(inv),
        }
    }

    pub fn kind(&self) -> ChainKind {
        self.kind
    }

    /// Interceptors still ahead of the target.
    pub fn remaining(&self) -> usize {
        self.links.len()
    }
}

/// Ordered interceptor handles for one call.
pub struct InterceptorStack {
    links: SmallVec<[Arc<dyn Interceptor>; 4]>,
    kind: ChainKind,
}

impl InterceptorStack {
    pub fn new(kind: ChainKind) -> Self {
        Self {
            links: SmallVec::new(),
            kind,
        }
    }

    pub fn push(&mut self, interceptor: Arc<dyn Interceptor>) {
        self.links.push(interceptor);
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn invoke(&self, inv: &mut Invocation<'_>, target: &dyn Fn(&mut Invocation<'_>) -> BeanResult) -> BeanResult {
        Next {
            links: &self.links,
            kind: self.kind,
            target,
        }
        .proceed(inv)
    }
}

/// What interceptors and bean methods see of the call in progress.
pub struct Invocation<'a> {
    context: &'a mut InvocationContext,
    session: &'a SessionContext,
    method: &'a str,
    args: Args,
    message: Option<ServiceMessage>,
}

impl<'a> Invocation<'a> {
    pub(crate) fn new(
        context: &'a mut InvocationContext,
        session: &'a SessionContext,
        method: &'a str,
        args: Args,
        message: Option<ServiceMessage>,
    ) -> Self {
        Self {
            context,
            session,
            method,
            args,
            message,
        }
    }

    /// The run method, or the callback phase name for lifecycle chains.
    pub fn method(&self) -> &str {
        self.method
    }

    pub fn context(&self) -> &InvocationContext {
        self.context
    }

    pub fn context_mut(&mut self) -> &mut InvocationContext {
        self.context
    }

    pub fn session(&self) -> &SessionContext {
        self.session
    }

    pub fn args(&self) -> &Args {
        &self.args
    }

    pub fn args_mut(&mut self) -> &mut Args {
        &mut self.args
    }

    pub fn set_args(&mut self, args: Args) {
        self.args = args;
    }

    /// Borrows argument `index` as a `T`.
    pub fn arg<T: Any>(&self, index: usize) -> Result<&T, BoxError> {
        self.args.get(index)
    }

    /// The service-endpoint message context, for calls that arrived through one.
    pub fn message(&self) -> ContainerResult<Option<&ServiceMessage>> {
        self.context.check(ContextOperation::MessageContext)?;
        Ok(self.message.as_ref())
    }

    pub fn caller_principal(&self) -> ContainerResult<Principal> {
        self.session.caller_principal(self.context)
    }

    pub fn is_caller_in_role(&self, role: &str) -> ContainerResult<bool> {
        self.session.is_caller_in_role(self.context, role)
    }

    pub fn lookup(&self, name: &str) -> ContainerResult<Option<EnvValue>> {
        self.session.lookup(self.context, name)
    }

    pub fn set_rollback_only(&mut self) -> ContainerResult<()> {
        self.session.set_rollback_only(self.context)
    }

    pub fn rollback_only(&self) -> ContainerResult<bool> {
        self.session.rollback_only(self.context)
    }
}
