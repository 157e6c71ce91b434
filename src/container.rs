//! The container façade: deployment lifecycle and invocation dispatch.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crate::config::ContainerConfig;
use crate::context::InvocationContext;
use crate::deployment::{Deployment, MethodDef};
use crate::descriptors::{ConcurrencyManagement, ExceptionType, InterfaceType};
use crate::error::{unwrap_target, ContainerError, ContainerResult};
use crate::instance::InstanceManager;
use crate::interceptor::{ChainKind, Interceptor, Invocation};
use crate::internal::catch_panic;
use crate::key::{ContainerId, ProxyRef, RegistryKey};
use crate::observer::{ContainerObserver, InvocationEvent, InvocationOutcome, Observers};
use crate::operation::Operation;
use crate::pool::{async_pair, AsyncResult, WorkerPool};
use crate::registry::DeploymentRegistry;
use crate::security::{MethodRef, PermitAll, SecurityService};
use crate::transaction::{LocalTransactionManager, TransactionManager};
use crate::value::{Args, Value};
use crate::webservice::{ParameterUnmarshaller, ServiceMessage};

/// Component-view methods that never reach the instance.
const COMPONENT_METHODS: &[&str] = &[
    "remove",
    "getHandle",
    "getPrimaryKey",
    "isIdentical",
    "getEJBHome",
    "getEJBLocalHome",
];

/// What an invocation produced.
#[derive(Debug)]
pub enum Outcome {
    /// A synchronous call finished; `None` for calls without a value
    Returned(Option<Value>),
    /// An asynchronous call was queued
    Submitted(AsyncResult),
}

impl Outcome {
    pub fn is_submitted(&self) -> bool {
        matches!(self, Outcome::Submitted(_))
    }

    /// The returned value, waiting first if the call was asynchronous.
    pub fn wait(self) -> ContainerResult<Option<Value>> {
        match self {
            Outcome::Returned(value) => Ok(value),
            Outcome::Submitted(result) => result.wait(),
        }
    }

    pub fn into_async(self) -> Option<AsyncResult> {
        match self {
            Outcome::Submitted(result) => Some(result),
            Outcome::Returned(_) => None,
        }
    }
}

/// Singleton container.
///
/// Hosts singleton deployments: each gets exactly one instance, constructed
/// lazily (or at deploy time for startup beans), guarded by a read/write lock
/// with a bounded wait, and torn down on undeploy. Cloning is cheap and every
/// clone drives the same container.
///
/// # Examples
///
/// ```rust
/// use ferrous_singleton::{DeploymentBuilder, MethodOptions, SingletonContainer};
/// use std::sync::atomic::{AtomicU64, Ordering};
///
/// #[derive(Default)]
/// struct Counter(AtomicU64);
///
/// let deployment = DeploymentBuilder::new("Counter", || Ok(Counter::default()))
///     .business_local("CounterLocal")
///     .method("increment", MethodOptions::write(), |bean: &Counter, _inv| {
///         Ok(bean.0.fetch_add(1, Ordering::SeqCst) + 1)
///     })
///     .method("current", MethodOptions::read(), |bean: &Counter, _inv| {
///         Ok(bean.0.load(Ordering::SeqCst))
///     })
///     .build()
///     .unwrap();
///
/// let container = SingletonContainer::builder().build().unwrap();
/// container.deploy(deployment).unwrap();
///
/// container.call::<u64>("Counter", "CounterLocal", "increment", Default::default()).unwrap();
/// let current = container.call::<u64>("Counter", "CounterLocal", "current", Default::default()).unwrap();
/// assert_eq!(current, 1);
/// container.shutdown();
/// ```
#[derive(Clone)]
pub struct SingletonContainer {
    inner: Arc<ContainerInner>,
}

struct ContainerInner {
    id: ContainerId,
    config: ContainerConfig,
    registry: DeploymentRegistry,
    instances: InstanceManager,
    security: Arc<dyn SecurityService>,
    transactions: Arc<dyn TransactionManager>,
    observers: Observers,
    pool: WorkerPool,
}

/// Builder for [`SingletonContainer`].
pub struct ContainerBuilder {
    id: ContainerId,
    config: ContainerConfig,
    security: Arc<dyn SecurityService>,
    transactions: Arc<dyn TransactionManager>,
    observers: Observers,
}

impl ContainerBuilder {
    fn new() -> Self {
        Self {
            id: ContainerId::default(),
            config: ContainerConfig::default(),
            security: Arc::new(PermitAll),
            transactions: Arc::new(LocalTransactionManager::new()),
            observers: Observers::new(),
        }
    }

    pub fn container_id(mut self, id: ContainerId) -> Self {
        self.id = id;
        self
    }

    pub fn config(mut self, config: ContainerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn security(mut self, security: Arc<dyn SecurityService>) -> Self {
        self.security = security;
        self
    }

    pub fn transactions(mut self, transactions: Arc<dyn TransactionManager>) -> Self {
        self.transactions = transactions;
        self
    }

    pub fn observer(mut self, observer: Arc<dyn ContainerObserver>) -> Self {
        self.observers.add(observer);
        self
    }

    /// Validates the configuration and starts the container.
    ///
    /// Pool threads are started on demand, so building is cheap.
    pub fn build(self) -> ContainerResult<SingletonContainer> {
        self.config.validate()?;
        let instances = InstanceManager::with_observers(self.id.clone(), self.security.clone(), self.observers.clone());
        tracing::debug!(container_id = %self.id, observers = self.observers.len(), "singleton container started");
        Ok(SingletonContainer {
            inner: Arc::new(ContainerInner {
                pool: WorkerPool::new(self.config.pool.clone()),
                id: self.id,
                config: self.config,
                registry: DeploymentRegistry::new(),
                instances,
                security: self.security,
                transactions: self.transactions,
                observers: self.observers,
            }),
        })
    }
}

/// Owned description of one call, so it can cross to a pool thread.
struct Call {
    deployment: Arc<Deployment>,
    interface_type: InterfaceType,
    interface_class: String,
    method: String,
    args: Args,
    primary_key: Option<String>,
}

impl SingletonContainer {
    pub fn builder() -> ContainerBuilder {
        ContainerBuilder::new()
    }

    pub fn container_id(&self) -> &ContainerId {
        &self.inner.id
    }

    pub fn config(&self) -> &ContainerConfig {
        &self.inner.config
    }

    pub fn deployment(&self, deployment_id: &str) -> Option<Arc<Deployment>> {
        self.inner.registry.lookup(deployment_id)
    }

    /// Deployments in registration order.
    pub fn deployments(&self) -> Vec<Arc<Deployment>> {
        self.inner.registry.list()
    }

    pub fn instance_manager(&self) -> &InstanceManager {
        &self.inner.instances
    }

    /// Registers and deploys a deployment.
    ///
    /// Startup singletons are constructed before this returns; if that fails
    /// the deployment is rolled back and the construction error returned.
    pub fn deploy(&self, deployment: Deployment) -> ContainerResult<Arc<Deployment>> {
        let inner = &*self.inner;
        let deployment = Arc::new(deployment);
        inner.registry.register(deployment.clone())?;
        if let Err(err) = inner.instances.deploy(&deployment) {
            inner.registry.remove(deployment.id());
            return Err(err);
        }

        if deployment.is_startup() {
            let mut ctx = lifecycle_context(&deployment);
            if let Err(err) = inner.instances.get_instance(&mut ctx) {
                tracing::error!(deployment_id = deployment.id(), error = %err, "startup singleton failed; deployment rolled back");
                inner.instances.undeploy(&deployment);
                inner.registry.remove(deployment.id());
                return Err(err);
            }
        }

        tracing::info!(container_id = %inner.id, deployment_id = deployment.id(), "deployed singleton");
        inner.observers.deployed(deployment.id());
        Ok(deployment)
    }

    /// Destroys the instance, if any, and removes the deployment.
    pub fn undeploy(&self, deployment_id: &str) -> ContainerResult<()> {
        let inner = &*self.inner;
        let deployment = inner
            .registry
            .remove(deployment_id)
            .ok_or_else(|| ContainerError::UnknownDeployment(deployment_id.to_string()))?;

        if let Some(instance) = inner.instances.existing_instance(&deployment) {
            let mut ctx = lifecycle_context(&deployment);
            inner.instances.free_instance(&mut ctx, &instance);
        }
        inner.instances.undeploy(&deployment);

        tracing::info!(container_id = %inner.id, deployment_id, "undeployed singleton");
        inner.observers.undeployed(deployment_id);
        Ok(())
    }

    /// Undeploys everything in reverse registration order, then drains the
    /// asynchronous pool. Returns false if pool threads were still busy when
    /// the close timeout ran out.
    pub fn shutdown(&self) -> bool {
        for deployment in self.deployments().into_iter().rev() {
            if let Err(err) = self.undeploy(deployment.id()) {
                tracing::warn!(deployment_id = deployment.id(), error = %err, "undeploy during shutdown failed");
            }
        }
        let drained = self.inner.pool.shutdown(self.inner.config.close_timeout);
        if !drained {
            tracing::warn!(
                container_id = %self.inner.id,
                timeout = ?self.inner.config.close_timeout,
                "asynchronous pool did not drain before the close timeout"
            );
        }
        drained
    }

    /// Invokes `method` on `interface_class` of a deployment.
    ///
    /// `interface_type` is inferred from the deployment's declared interfaces
    /// when not given. Asynchronous methods return [`Outcome::Submitted`]
    /// right away; everything else runs on the calling thread.
    pub fn invoke(
        &self,
        deployment_id: &str,
        interface_type: Option<InterfaceType>,
        interface_class: &str,
        method: &str,
        args: Args,
        primary_key: Option<String>,
    ) -> ContainerResult<Outcome> {
        let deployment = self
            .deployment(deployment_id)
            .ok_or_else(|| ContainerError::UnknownDeployment(deployment_id.to_string()))?;
        let interface_type = match interface_type {
            Some(interface_type) => interface_type,
            None => deployment
                .interface_type(interface_class)
                .ok_or_else(|| ContainerError::UnknownInterface {
                    deployment_id: deployment_id.to_string(),
                    interface_class: interface_class.to_string(),
                })?,
        };

        if let Some(value) = self.home_or_component(&deployment, interface_type, interface_class, method)? {
            return Ok(Outcome::Returned(value));
        }

        let run_method = resolve(&deployment, interface_class, method)?;
        let call = Call {
            interface_type,
            interface_class: interface_class.to_string(),
            method: method.to_string(),
            args,
            primary_key,
            deployment: deployment.clone(),
        };

        if run_method.is_asynchronous() {
            return self.submit(call, run_method.name()).map(Outcome::Submitted);
        }
        self.dispatch(call).map(Outcome::Returned)
    }

    /// Invokes a business method and downcasts its result.
    ///
    /// Methods returning `()` are read back as `()`. Asynchronous methods are
    /// waited on.
    pub fn call<R: Any>(&self, deployment_id: &str, interface_class: &str, method: &str, args: Args) -> ContainerResult<R> {
        let value = self
            .invoke(deployment_id, None, interface_class, method, args, None)?
            .wait()?
            .unwrap_or_else(|| Box::new(()));
        value
            .downcast::<R>()
            .map(|boxed| *boxed)
            .map_err(|_| ContainerError::ResultTypeMismatch {
                expected: std::any::type_name::<R>(),
            })
    }

    /// Delivers a timer expiration to the deployment's timeout method.
    ///
    /// Timer callbacks bypass authorization. `info` is the method's only
    /// argument.
    pub fn fire_timeout<T: Any + Send>(&self, deployment_id: &str, info: T) -> ContainerResult<()> {
        let deployment = self
            .deployment(deployment_id)
            .ok_or_else(|| ContainerError::UnknownDeployment(deployment_id.to_string()))?;
        let method = deployment
            .timeout_method()
            .ok_or_else(|| ContainerError::NoSuchMethod {
                deployment_id: deployment_id.to_string(),
                interface_class: deployment.bean_class().to_string(),
                method: "<timeout>".to_string(),
            })?
            .to_string();
        self.invoke(
            deployment_id,
            Some(InterfaceType::Timeout),
            deployment.bean_class(),
            &method,
            Args::new().with(info),
            None,
        )?;
        Ok(())
    }

    #[cfg(feature = "diagnostics")]
    pub fn to_debug_string(&self) -> String {
        let mut s = String::new();
        s.push_str(&format!("=== Singleton Container: {} ===\n", self.inner.id));
        for deployment in self.deployments() {
            let instance = self.inner.instances.existing_instance(&deployment);
            s.push_str(&format!(
                "  {} ({}): startup={} concurrency={:?} instance={}\n",
                deployment.id(),
                deployment.bean_class(),
                deployment.is_startup(),
                deployment.concurrency_management(),
                match &instance {
                    Some(instance) if instance.is_destroyed() => "destroyed",
                    Some(_) => "ready",
                    None => "pending",
                }
            ));
            let mut methods: Vec<_> = deployment.methods().collect();
            methods.sort_by(|a, b| a.name().cmp(b.name()));
            for method in methods {
                s.push_str(&format!(
                    "    {}: lock={} tx={} async={}\n",
                    method.name(),
                    method.lock_type(),
                    method.transaction_attribute(),
                    method.is_asynchronous()
                ));
            }
        }
        s.push_str(&format!(
            "Pool: threads={} queued={}\n",
            self.inner.pool.threads(),
            self.inner.pool.queued()
        ));
        s
    }

    /// Handles home-view calls and the component-view lifecycle methods,
    /// none of which touch the instance.
    fn home_or_component(
        &self,
        deployment: &Deployment,
        interface_type: InterfaceType,
        interface_class: &str,
        method: &str,
    ) -> ContainerResult<Option<Option<Value>>> {
        let intercepted = interface_type.is_home() || (interface_type.is_component() && COMPONENT_METHODS.contains(&method));
        if !intercepted {
            return Ok(None);
        }
        self.authorize(deployment, interface_type, interface_class, method)?;

        if interface_type.is_home() && method.starts_with("create") {
            let object_view = interface_type.object_view();
            let object_class = deployment
                .interfaces()
                .find(|(_, declared)| *declared == object_view)
                .map(|(class, _)| class)
                .unwrap_or(interface_class);
            let proxy = ProxyRef {
                key: RegistryKey::new(self.inner.id.clone(), deployment.id()),
                interface_type: object_view,
                interface_class: object_class.to_string(),
            };
            return Ok(Some(Some(Box::new(proxy))));
        }
        tracing::trace!(deployment_id = deployment.id(), method, %interface_type, "view method handled by container");
        Ok(Some(None))
    }

    fn authorize(
        &self,
        deployment: &Deployment,
        interface_type: InterfaceType,
        interface_class: &str,
        method: &str,
    ) -> ContainerResult<()> {
        let method_ref = MethodRef {
            deployment_id: deployment.id(),
            interface_class,
            method,
        };
        if self.inner.security.is_caller_authorized(&method_ref, interface_type) {
            return Ok(());
        }
        tracing::debug!(deployment_id = deployment.id(), method, %interface_type, "caller not authorized");
        Err(ContainerError::AccessDenied {
            method: method.to_string(),
            interface_type,
        })
    }

    fn submit(&self, call: Call, method: &str) -> ContainerResult<AsyncResult> {
        let deployment_id = call.deployment.id().to_string();
        let (completer, result) = async_pair();
        let container = self.clone();
        self.inner.pool.execute(move || {
            completer.running();
            let outcome = container.dispatch(call);
            completer.complete(outcome);
        })?;
        tracing::trace!(deployment_id = %deployment_id, method, "asynchronous call queued");
        self.inner.observers.async_submitted(&deployment_id, method);
        Ok(result)
    }

    /// The synchronous critical section: authorize, resolve the instance,
    /// take the lock, run the chain under a transaction policy.
    fn dispatch(&self, call: Call) -> ContainerResult<Option<Value>> {
        let inner = &*self.inner;
        let started = Instant::now();
        let Call {
            deployment,
            interface_type,
            interface_class,
            method: call_method,
            args,
            primary_key,
        } = call;

        let method = resolve(&deployment, &interface_class, &call_method)?;
        let lock_type = method.lock_type();
        let event = InvocationEvent {
            deployment_id: deployment.id(),
            method: method.name(),
            interface_type,
            lock_type: (deployment.concurrency_management() == ConcurrencyManagement::Container).then_some(lock_type),
        };
        let reject = |err: ContainerError| {
            inner
                .observers
                .invocation_completed(&event, InvocationOutcome::Rejected, started.elapsed());
            err
        };

        if interface_type != InterfaceType::Timeout {
            self.authorize(&deployment, interface_type, &interface_class, &call_method)
                .map_err(reject)?;
        }
        let (args, message, unmarshaller) = if interface_type == InterfaceType::ServiceEndpoint {
            split_service_call(args).map_err(reject)?
        } else {
            (args, None, None)
        };

        let mut ctx = InvocationContext::new(deployment.clone(), primary_key, interface_type);
        ctx.set_method(method.name());
        let instance = inner.instances.get_instance(&mut ctx).map_err(reject)?;

        let timeout = method
            .access_timeout()
            .or_else(|| deployment.access_timeout())
            .unwrap_or(inner.config.access_timeout);
        let Some(guard) = instance.lock().try_acquire(lock_type, timeout) else {
            tracing::warn!(
                deployment_id = deployment.id(),
                method = method.name(),
                lock = %lock_type,
                ?timeout,
                "timed out waiting for the instance lock"
            );
            inner.observers.lock_timeout(&event, timeout);
            return Err(reject(ContainerError::ConcurrentAccessTimeout {
                deployment_id: deployment.id().to_string(),
                method: method.name().to_string(),
                lock_type,
                waited: timeout,
            }));
        };

        let operation = match interface_type {
            InterfaceType::Timeout => Operation::Timeout,
            InterfaceType::ServiceEndpoint => Operation::BusinessWs,
            _ => Operation::Business,
        };
        let mut phase = ctx.enter(operation);
        let mut policy = inner
            .transactions
            .create_policy(method.transaction_attribute(), &phase)
            .map_err(reject)?;

        let mut stack = instance.stack(method.interceptor_chain(), ChainKind::AroundInvoke);
        if let Some(unmarshaller) = unmarshaller {
            stack.push(unmarshaller);
        }
        let handler = method.handler();
        let bean = instance.bean_handle();
        let result = catch_panic(|| {
            let mut inv = Invocation::new(&mut phase, instance.session(), method.name(), args, message);
            stack.invoke(&mut inv, &|inv| handler(&**bean, inv))
        });

        let (result, outcome) = match result {
            Ok(value) => (Ok(value), InvocationOutcome::Success),
            Err(err) => match deployment.classify(&err) {
                ExceptionType::System => {
                    let err = unwrap_target(err);
                    inner.transactions.handle_system_exception(policy.as_mut(), &err, &phase);
                    tracing::error!(
                        deployment_id = deployment.id(),
                        method = method.name(),
                        error = %err,
                        "system exception in business method"
                    );
                    let message = format!("{} failed", method.name());
                    (
                        Err(ContainerError::system(deployment.id(), message, err)),
                        InvocationOutcome::SystemException,
                    )
                }
                ExceptionType::Application { rollback } => {
                    inner
                        .transactions
                        .handle_application_exception(policy.as_mut(), &err, rollback);
                    tracing::debug!(
                        deployment_id = deployment.id(),
                        method = method.name(),
                        rollback,
                        error = %err,
                        "application exception"
                    );
                    (Err(ContainerError::Application(err)), InvocationOutcome::ApplicationException)
                }
            },
        };

        if phase.is_rollback_only() {
            policy.set_rollback_only();
        }
        let completed = inner.transactions.after_invoke(policy, &phase);
        drop(phase);
        drop(guard);
        inner.observers.invocation_completed(&event, outcome, started.elapsed());

        let value = result?;
        completed?;
        Ok(value)
    }
}

impl fmt::Debug for SingletonContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingletonContainer")
            .field("id", &self.inner.id)
            .field("deployments", &self.inner.registry.len())
            .field("pool", &self.inner.pool)
            .finish()
    }
}

impl Drop for ContainerInner {
    fn drop(&mut self) {
        if !self.registry.is_empty() {
            tracing::warn!(
                container_id = %self.id,
                deployments = self.registry.len(),
                "singleton container dropped with live deployments; call shutdown() to run pre-destroy callbacks"
            );
        }
    }
}

fn resolve<'d>(deployment: &'d Deployment, interface_class: &str, method: &str) -> ContainerResult<&'d MethodDef> {
    deployment
        .run_method(interface_class, method)
        .ok_or_else(|| ContainerError::NoSuchMethod {
            deployment_id: deployment.id().to_string(),
            interface_class: interface_class.to_string(),
            method: method.to_string(),
        })
}

/// Context for container-driven lifecycle work outside a business call.
fn lifecycle_context(deployment: &Arc<Deployment>) -> InvocationContext {
    InvocationContext::new(deployment.clone(), None, InterfaceType::LocalBean)
}

type ServiceCall = (Args, Option<ServiceMessage>, Option<Arc<dyn Interceptor>>);

/// Splits a service-endpoint call into its message context and unmarshaller.
///
/// The first argument must be a message context of either flavor; the second,
/// if present, is the interceptor that decodes it.
fn split_service_call(mut args: Args) -> ContainerResult<ServiceCall> {
    let raw = args
        .take_raw(0)
        .ok_or_else(|| ContainerError::InvalidArguments("service-endpoint call without a message context".to_string()))?;
    let message = ServiceMessage::from_value(raw)
        .map_err(|_| ContainerError::InvalidArguments("first argument is not a message context".to_string()))?;
    let unmarshaller = match args.take_raw(0) {
        Some(raw) => *raw.downcast::<Arc<dyn Interceptor>>().map_err(|_| {
            ContainerError::InvalidArguments("second argument is not an unmarshalling interceptor".to_string())
        })?,
        None => ParameterUnmarshaller::handle(),
    };
    Ok((args, Some(message), Some(unmarshaller)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deployment::{DeploymentBuilder, MethodOptions};
    use crate::error::{BoxError, SystemException};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Ledger {
        entries: AtomicUsize,
    }

    #[derive(Debug)]
    struct Overdrawn;

    impl fmt::Display for Overdrawn {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("overdrawn")
        }
    }

    impl std::error::Error for Overdrawn {}

    fn ledger(id: &str) -> Deployment {
        DeploymentBuilder::new(id, || Ok(Ledger::default()))
            .business_local("LedgerLocal")
            .home("LedgerHome")
            .component("LedgerObject")
            .method("post", MethodOptions::write(), |bean: &Ledger, _inv| {
                Ok(bean.entries.fetch_add(1, Ordering::SeqCst) + 1)
            })
            .method("count", MethodOptions::read(), |bean: &Ledger, _inv| {
                Ok(bean.entries.load(Ordering::SeqCst))
            })
            .method("overdraw", MethodOptions::write(), |_: &Ledger, _inv| -> Result<(), BoxError> {
                Err(Box::new(Overdrawn))
            })
            .method("corrupt", MethodOptions::write(), |_: &Ledger, _inv| -> Result<(), BoxError> {
                Err(Box::new(SystemException::new(Overdrawn)))
            })
            .build()
            .unwrap()
    }

    fn container() -> SingletonContainer {
        SingletonContainer::builder().build().unwrap()
    }

    #[test]
    fn calls_share_one_instance() {
        let container = container();
        container.deploy(ledger("L")).unwrap();
        assert_eq!(container.call::<usize>("L", "LedgerLocal", "post", Args::new()).unwrap(), 1);
        assert_eq!(container.call::<usize>("L", "LedgerLocal", "post", Args::new()).unwrap(), 2);
        assert_eq!(container.call::<usize>("L", "LedgerLocal", "count", Args::new()).unwrap(), 2);
        assert!(container.shutdown());
    }

    #[test]
    fn unknown_targets_are_reported() {
        let container = container();
        container.deploy(ledger("L")).unwrap();

        let err = container.call::<usize>("Nope", "LedgerLocal", "post", Args::new()).unwrap_err();
        assert!(matches!(err, ContainerError::UnknownDeployment(_)));
        let err = container.call::<usize>("L", "Missing", "post", Args::new()).unwrap_err();
        assert!(matches!(err, ContainerError::UnknownInterface { .. }));
        let err = container.call::<usize>("L", "LedgerLocal", "audit", Args::new()).unwrap_err();
        assert!(matches!(err, ContainerError::NoSuchMethod { .. }));
        let err = container.call::<String>("L", "LedgerLocal", "count", Args::new()).unwrap_err();
        assert!(matches!(err, ContainerError::ResultTypeMismatch { .. }));
    }

    #[test]
    fn failures_are_classified() {
        let container = container();
        container.deploy(ledger("L")).unwrap();

        let err = container.call::<()>("L", "LedgerLocal", "overdraw", Args::new()).unwrap_err();
        assert!(err.is_application());
        assert!(err.application_error::<Overdrawn>().is_some());

        let err = container.call::<()>("L", "LedgerLocal", "corrupt", Args::new()).unwrap_err();
        assert!(err.is_system());

        // A system exception does not discard the instance.
        assert_eq!(container.call::<usize>("L", "LedgerLocal", "post", Args::new()).unwrap(), 1);
    }

    #[test]
    fn home_create_returns_a_component_reference() {
        let container = container();
        container.deploy(ledger("L")).unwrap();

        let proxy = container
            .call::<ProxyRef>("L", "LedgerHome", "create", Args::new())
            .unwrap();
        assert_eq!(proxy.interface_type, InterfaceType::EjbObject);
        assert_eq!(proxy.interface_class, "LedgerObject");
        assert_eq!(proxy.key.deployment_id(), "L");

        container.call::<()>("L", "LedgerObject", "remove", Args::new()).unwrap();
        assert!(container.instance_manager().existing_instance(&container.deployment("L").unwrap()).is_none());
    }

    #[test]
    fn undeploy_frees_the_instance() {
        let container = container();
        let deployment = container.deploy(ledger("L")).unwrap();
        container.call::<usize>("L", "LedgerLocal", "post", Args::new()).unwrap();
        let instance = container.instance_manager().existing_instance(&deployment).unwrap();

        container.undeploy("L").unwrap();
        assert!(instance.is_destroyed());
        assert!(container.deployment("L").is_none());
        assert!(matches!(container.undeploy("L"), Err(ContainerError::UnknownDeployment(_))));
    }

    #[test]
    fn malformed_service_calls_are_rejected() {
        let err = split_service_call(Args::new()).err().unwrap();
        assert!(matches!(err, ContainerError::InvalidArguments(_)));
        let err = split_service_call(Args::new().with(7u8)).err().unwrap();
        assert!(matches!(err, ContainerError::InvalidArguments(_)));
    }
}
