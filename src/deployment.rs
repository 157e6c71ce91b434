//! Deployment metadata and the builder that registers bean code.
//!
//! A [`Deployment`] is the static table the container dispatches from: how to
//! construct the bean, which interceptors wrap which methods, each method's
//! lock and transaction attributes, and which error types are system or
//! application exceptions. Everything is registered through
//! [`DeploymentBuilder`] as closures; nothing is discovered at runtime.

use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use ahash::AHashMap;
use parking_lot::RwLock;

use crate::config::{parse_duration, TimeUnit};
use crate::descriptors::{ConcurrencyManagement, ExceptionType, InterfaceType, LockType, TransactionAttribute};
use crate::environment::{inject_all, EnvValue, Environment, EnvironmentLookup, Injection};
use crate::error::{BoxError, ContainerError, ContainerResult, PanicError, SystemException};
use crate::instance::SingletonData;
use crate::interceptor::{Interceptor, Invocation};
use crate::value::{into_value, BeanResult};

/// A constructed bean, type-erased.
pub(crate) type Bean = dyn Any + Send + Sync;

/// Business method or lifecycle callback bound to the bean type.
pub(crate) type Handler = Arc<dyn Fn(&Bean, &mut Invocation<'_>) -> BeanResult + Send + Sync>;

type Construct = Box<dyn Fn() -> Result<Box<Bean>, BoxError> + Send + Sync>;
type Inject = Box<dyn Fn(&mut Bean, &dyn EnvironmentLookup, &str) -> Result<(), BoxError> + Send + Sync>;
type OwnInterceptor = fn(Arc<Bean>) -> Option<Arc<dyn Interceptor>>;
type BuildInterceptor =
    Box<dyn Fn(&dyn EnvironmentLookup, &str) -> Result<Arc<dyn Interceptor>, BoxError> + Send + Sync>;

/// Deployment property naming the lock wait.
pub const ACCESS_TIMEOUT_PROPERTY: &str = "AccessTimeout";
/// Older spelling of [`ACCESS_TIMEOUT_PROPERTY`], consulted when it is absent.
pub const TIMEOUT_PROPERTY: &str = "Timeout";

/// Attributes of a business method.
///
/// # Examples
///
/// ```rust
/// use ferrous_singleton::{MethodOptions, LockType, TransactionAttribute};
/// use std::time::Duration;
///
/// let opts = MethodOptions::read()
///     .transaction(TransactionAttribute::Supports)
///     .access_timeout(Duration::from_millis(250));
/// assert_eq!(opts.lock_type(), LockType::Read);
/// assert!(!opts.is_asynchronous());
/// ```
#[derive(Debug, Clone, Default)]
pub struct MethodOptions {
    lock_type: LockType,
    transaction: TransactionAttribute,
    asynchronous: bool,
    access_timeout: Option<Duration>,
    interceptors: Vec<String>,
    exclude_class_interceptors: bool,
}

impl MethodOptions {
    /// WRITE-locked, `Required` transaction, synchronous.
    pub fn write() -> Self {
        Self::default()
    }

    pub fn read() -> Self {
        Self {
            lock_type: LockType::Read,
            ..Self::default()
        }
    }

    pub fn lock(mut self, lock_type: LockType) -> Self {
        self.lock_type = lock_type;
        self
    }

    /// Dispatch through the worker pool; the caller gets an [`AsyncResult`](crate::AsyncResult).
    pub fn asynchronous(mut self) -> Self {
        self.asynchronous = true;
        self
    }

    pub fn transaction(mut self, attribute: TransactionAttribute) -> Self {
        self.transaction = attribute;
        self
    }

    /// Overrides the deployment and container lock wait for this method.
    pub fn access_timeout(mut self, timeout: Duration) -> Self {
        self.access_timeout = Some(timeout);
        self
    }

    /// Appends a method-level interceptor, by registered name.
    pub fn interceptor(mut self, name: impl Into<String>) -> Self {
        self.interceptors.push(name.into());
        self
    }

    pub fn exclude_class_interceptors(mut self) -> Self {
        self.exclude_class_interceptors = true;
        self
    }

    pub fn lock_type(&self) -> LockType {
        self.lock_type
    }

    pub fn is_asynchronous(&self) -> bool {
        self.asynchronous
    }
}

/// A registered business method.
pub struct MethodDef {
    name: String,
    options: MethodOptions,
    /// Around-invoke chain, by interceptor name, class-level first.
    chain: Vec<String>,
    handler: Handler,
}

impl MethodDef {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn lock_type(&self) -> LockType {
        self.options.lock_type
    }

    pub fn transaction_attribute(&self) -> TransactionAttribute {
        self.options.transaction
    }

    pub fn is_asynchronous(&self) -> bool {
        self.options.asynchronous
    }

    pub fn access_timeout(&self) -> Option<Duration> {
        self.options.access_timeout
    }

    /// Names of the interceptors wrapping this method, outermost first.
    pub fn interceptor_chain(&self) -> &[String] {
        &self.chain
    }

    pub(crate) fn handler(&self) -> &Handler {
        &self.handler
    }
}

impl fmt::Debug for MethodDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDef")
            .field("name", &self.name)
            .field("options", &self.options)
            .field("chain", &self.chain)
            .finish()
    }
}

/// An interceptor class: a name, a factory and its injection table.
pub struct InterceptorDef {
    name: String,
    build: BuildInterceptor,
}

impl InterceptorDef {
    pub fn new<I, F>(name: impl Into<String>, factory: F, injections: Vec<Injection<I>>) -> Self
    where
        I: Interceptor,
        F: Fn() -> Result<I, BoxError> + Send + Sync + 'static,
    {
        let build: BuildInterceptor = Box::new(move |env, deployment_id| {
            let mut interceptor = factory()?;
            inject_all(&mut interceptor, &injections, env, deployment_id)?;
            Ok(Arc::new(interceptor) as Arc<dyn Interceptor>)
        });
        Self {
            name: name.into(),
            build,
        }
    }

    /// An interceptor needing no injection, built from `Default`.
    pub fn of<I: Interceptor + Default>(name: impl Into<String>) -> Self {
        Self::new(name, || Ok(I::default()), Vec::new())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn build(&self, env: &dyn EnvironmentLookup, deployment_id: &str) -> Result<Arc<dyn Interceptor>, BoxError> {
        (self.build)(env, deployment_id)
    }
}

impl fmt::Debug for InterceptorDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorDef").field("name", &self.name).finish()
    }
}

struct ExceptionRule {
    matches: fn(&(dyn std::error::Error + Send + Sync + 'static)) -> bool,
    kind: ExceptionType,
}

fn is_type<E: std::error::Error + 'static>(err: &(dyn std::error::Error + Send + Sync + 'static)) -> bool {
    err.is::<E>()
}

/// Immutable deployment metadata, shared by the registry and every call.
pub struct Deployment {
    id: String,
    bean_class: String,
    construct: Construct,
    inject: Inject,
    own_interceptor: Option<OwnInterceptor>,
    interfaces: AHashMap<String, InterfaceType>,
    method_map: AHashMap<(String, String), String>,
    methods: AHashMap<String, MethodDef>,
    interceptor_defs: Vec<InterceptorDef>,
    lifecycle_chain: Vec<String>,
    post_construct: Vec<Handler>,
    pre_destroy: Vec<Handler>,
    ejb_create: Option<Handler>,
    timeout_method: Option<String>,
    exception_rules: Vec<ExceptionRule>,
    access_timeout: Option<Duration>,
    properties: AHashMap<String, String>,
    environment: Arc<Environment>,
    concurrency: ConcurrencyManagement,
    startup: bool,
    container_data: RwLock<Option<Arc<SingletonData>>>,
}

impl Deployment {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Class name of the bean; an interceptor entry with this name is the bean itself.
    pub fn bean_class(&self) -> &str {
        &self.bean_class
    }

    pub fn environment(&self) -> &Arc<Environment> {
        &self.environment
    }

    /// The view an interface class was declared as.
    pub fn interface_type(&self, interface_class: &str) -> Option<InterfaceType> {
        self.interfaces.get(interface_class).copied()
    }

    /// Declared interface classes and their views.
    pub fn interfaces(&self) -> impl Iterator<Item = (&str, InterfaceType)> {
        self.interfaces.iter().map(|(class, ty)| (class.as_str(), *ty))
    }

    /// Resolves the bean method an interface method call runs.
    ///
    /// An explicit [`map_method`](DeploymentBuilder::map_method) entry wins;
    /// otherwise the bean method with the same name is used.
    pub fn run_method(&self, interface_class: &str, method: &str) -> Option<&MethodDef> {
        let mapped = self
            .method_map
            .get(&(interface_class.to_string(), method.to_string()))
            .map(String::as_str)
            .unwrap_or(method);
        self.methods.get(mapped)
    }

    pub fn method(&self, name: &str) -> Option<&MethodDef> {
        self.methods.get(name)
    }

    pub fn methods(&self) -> impl Iterator<Item = &MethodDef> {
        self.methods.values()
    }

    pub fn timeout_method(&self) -> Option<&str> {
        self.timeout_method.as_deref()
    }

    /// Deployment-level lock wait, from `access_timeout` or the
    /// `AccessTimeout`/`Timeout` properties.
    pub fn access_timeout(&self) -> Option<Duration> {
        self.access_timeout
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn concurrency_management(&self) -> ConcurrencyManagement {
        self.concurrency
    }

    /// Startup singletons are constructed when deployed rather than on first call.
    pub fn is_startup(&self) -> bool {
        self.startup
    }

    /// Classifies a failure raised by bean code.
    ///
    /// Panics and [`SystemException`] wrappers are always SYSTEM, as are
    /// container errors that bean code passed through (an application error
    /// from a nested call keeps its own classification). Registered rules are
    /// consulted next, first match wins; anything else is an APPLICATION
    /// exception that leaves the transaction alone.
    pub fn classify(&self, err: &BoxError) -> ExceptionType {
        if err.is::<SystemException>() || err.is::<PanicError>() {
            return ExceptionType::System;
        }
        if let Some(container_error) = err.downcast_ref::<ContainerError>() {
            return match container_error {
                ContainerError::Application(inner) => self.classify(inner),
                _ => ExceptionType::System,
            };
        }
        self.exception_rules
            .iter()
            .find(|rule| (rule.matches)(&**err))
            .map(|rule| rule.kind)
            .unwrap_or(ExceptionType::Application { rollback: false })
    }

    pub(crate) fn construct_bean(&self) -> Result<Box<Bean>, BoxError> {
        (self.construct)()
    }

    pub(crate) fn inject_bean(&self, bean: &mut Bean) -> Result<(), BoxError> {
        (self.inject)(bean, self.environment.as_ref(), &self.id)
    }

    pub(crate) fn own_interceptor(&self, bean: &Arc<Bean>) -> Option<Arc<dyn Interceptor>> {
        self.own_interceptor.and_then(|adapt| adapt(bean.clone()))
    }

    pub(crate) fn interceptor_defs(&self) -> &[InterceptorDef] {
        &self.interceptor_defs
    }

    /// Class-level interceptors run around lifecycle callbacks, bean excluded.
    pub(crate) fn lifecycle_chain(&self) -> &[String] {
        &self.lifecycle_chain
    }

    pub(crate) fn post_construct_callbacks(&self) -> &[Handler] {
        &self.post_construct
    }

    pub(crate) fn pre_destroy_callbacks(&self) -> &[Handler] {
        &self.pre_destroy
    }

    pub(crate) fn ejb_create_callback(&self) -> Option<&Handler> {
        self.ejb_create.as_ref()
    }

    pub(crate) fn container_data(&self) -> Option<Arc<SingletonData>> {
        self.container_data.read().clone()
    }

    pub(crate) fn set_container_data(&self, data: Option<Arc<SingletonData>>) -> Option<Arc<SingletonData>> {
        std::mem::replace(&mut *self.container_data.write(), data)
    }
}

impl fmt::Debug for Deployment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut methods: Vec<_> = self.methods.keys().collect();
        methods.sort();
        f.debug_struct("Deployment")
            .field("id", &self.id)
            .field("bean_class", &self.bean_class)
            .field("methods", &methods)
            .field("concurrency", &self.concurrency)
            .field("startup", &self.startup)
            .field("deployed", &self.container_data.read().is_some())
            .finish()
    }
}

struct PendingMethod {
    name: String,
    options: MethodOptions,
    handler: Handler,
}

/// Builds a [`Deployment`] for bean type `B`.
///
/// # Examples
///
/// ```rust
/// use ferrous_singleton::{DeploymentBuilder, MethodOptions};
/// use std::sync::atomic::{AtomicU64, Ordering};
///
/// #[derive(Default)]
/// struct Counter(AtomicU64);
///
/// let deployment = DeploymentBuilder::<Counter>::new("Counter", || Ok(Counter::default()))
///     .business_local("CounterLocal")
///     .method("increment", MethodOptions::write(), |bean: &Counter, _inv| {
///         Ok(bean.0.fetch_add(1, Ordering::SeqCst) + 1)
///     })
///     .method("get", MethodOptions::read(), |bean: &Counter, _inv| {
///         Ok(bean.0.load(Ordering::SeqCst))
///     })
///     .build()
///     .unwrap();
///
/// assert_eq!(deployment.id(), "Counter");
/// assert!(deployment.run_method("CounterLocal", "get").is_some());
/// ```
pub struct DeploymentBuilder<B> {
    id: String,
    bean_class: String,
    construct: Construct,
    injections: Vec<Injection<B>>,
    own_interceptor: Option<OwnInterceptor>,
    interfaces: AHashMap<String, InterfaceType>,
    method_map: AHashMap<(String, String), String>,
    methods: Vec<PendingMethod>,
    interceptor_defs: Vec<InterceptorDef>,
    class_interceptors: Vec<String>,
    post_construct: Vec<Handler>,
    pre_destroy: Vec<Handler>,
    ejb_create: Option<Handler>,
    timeout_method: Option<String>,
    exception_rules: Vec<ExceptionRule>,
    access_timeout: Option<Duration>,
    properties: AHashMap<String, String>,
    env_entries: Vec<(String, EnvValue)>,
    environment_parent: Option<Arc<dyn EnvironmentLookup>>,
    concurrency: ConcurrencyManagement,
    startup: bool,
    _bean: PhantomData<fn() -> B>,
}

fn bind_handler<B, R, F>(f: F) -> Handler
where
    B: Send + Sync + 'static,
    R: Any + Send,
    F: Fn(&B, &mut Invocation<'_>) -> Result<R, BoxError> + Send + Sync + 'static,
{
    Arc::new(move |bean: &Bean, inv: &mut Invocation<'_>| {
        let bean = bean
            .downcast_ref::<B>()
            .ok_or_else(|| format!("bean is not a {}", std::any::type_name::<B>()))?;
        f(bean, inv).map(into_value)
    })
}

fn adapt_own<B: Interceptor>(bean: Arc<Bean>) -> Option<Arc<dyn Interceptor>> {
    bean.downcast::<B>().ok().map(|bean| bean as Arc<dyn Interceptor>)
}

impl<B: Send + Sync + 'static> DeploymentBuilder<B> {
    pub fn new<F>(id: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Result<B, BoxError> + Send + Sync + 'static,
    {
        let construct: Construct = Box::new(move || factory().map(|bean| Box::new(bean) as Box<Bean>));
        Self {
            id: id.into(),
            bean_class: std::any::type_name::<B>().to_string(),
            construct,
            injections: Vec::new(),
            own_interceptor: None,
            interfaces: AHashMap::new(),
            method_map: AHashMap::new(),
            methods: Vec::new(),
            interceptor_defs: Vec::new(),
            class_interceptors: Vec::new(),
            post_construct: Vec::new(),
            pre_destroy: Vec::new(),
            ejb_create: None,
            timeout_method: None,
            exception_rules: Vec::new(),
            access_timeout: None,
            properties: AHashMap::new(),
            env_entries: Vec::new(),
            environment_parent: None,
            concurrency: ConcurrencyManagement::Container,
            startup: false,
            _bean: PhantomData,
        }
    }

    /// Renames the bean class used to recognise the bean in interceptor lists.
    pub fn bean_class(mut self, name: impl Into<String>) -> Self {
        self.bean_class = name.into();
        self
    }

    pub fn interface(mut self, interface_class: impl Into<String>, interface_type: InterfaceType) -> Self {
        self.interfaces.insert(interface_class.into(), interface_type);
        self
    }

    pub fn business_local(self, interface_class: impl Into<String>) -> Self {
        self.interface(interface_class, InterfaceType::BusinessLocal)
    }

    pub fn business_remote(self, interface_class: impl Into<String>) -> Self {
        self.interface(interface_class, InterfaceType::BusinessRemote)
    }

    /// No-interface view.
    pub fn local_bean(self, interface_class: impl Into<String>) -> Self {
        self.interface(interface_class, InterfaceType::LocalBean)
    }

    pub fn home(self, interface_class: impl Into<String>) -> Self {
        self.interface(interface_class, InterfaceType::Home)
    }

    pub fn local_home(self, interface_class: impl Into<String>) -> Self {
        self.interface(interface_class, InterfaceType::LocalHome)
    }

    pub fn component(self, interface_class: impl Into<String>) -> Self {
        self.interface(interface_class, InterfaceType::EjbObject)
    }

    pub fn local_component(self, interface_class: impl Into<String>) -> Self {
        self.interface(interface_class, InterfaceType::EjbLocalObject)
    }

    pub fn service_endpoint(self, interface_class: impl Into<String>) -> Self {
        self.interface(interface_class, InterfaceType::ServiceEndpoint)
    }

    /// Registers a business method.
    pub fn method<R, F>(mut self, name: impl Into<String>, options: MethodOptions, f: F) -> Self
    where
        R: Any + Send,
        F: Fn(&B, &mut Invocation<'_>) -> Result<R, BoxError> + Send + Sync + 'static,
    {
        self.methods.push(PendingMethod {
            name: name.into(),
            options,
            handler: bind_handler(f),
        });
        self
    }

    /// Routes `interface_class.method` to a bean method with a different name.
    pub fn map_method(
        mut self,
        interface_class: impl Into<String>,
        method: impl Into<String>,
        bean_method: impl Into<String>,
    ) -> Self {
        self.method_map
            .insert((interface_class.into(), method.into()), bean_method.into());
        self
    }

    /// Registers an interceptor class without attaching it anywhere.
    pub fn interceptor(mut self, def: InterceptorDef) -> Self {
        self.interceptor_defs.push(def);
        self
    }

    /// Registers an interceptor class and wraps every method with it.
    pub fn class_interceptor(mut self, def: InterceptorDef) -> Self {
        self.class_interceptors.push(def.name.clone());
        self.interceptor_defs.push(def);
        self
    }

    /// Injection entry applied to the bean after construction.
    pub fn inject(mut self, injection: Injection<B>) -> Self {
        self.injections.push(injection);
        self
    }

    pub fn env_entry(mut self, name: impl Into<String>, value: EnvValue) -> Self {
        self.env_entries.push((name.into(), value));
        self
    }

    /// Names missing from the deployment environment are looked up here.
    pub fn environment_parent(mut self, parent: Arc<dyn EnvironmentLookup>) -> Self {
        self.environment_parent = Some(parent);
        self
    }

    pub fn post_construct<F>(mut self, f: F) -> Self
    where
        F: Fn(&B, &mut Invocation<'_>) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.post_construct.push(bind_handler(f));
        self
    }

    pub fn pre_destroy<F>(mut self, f: F) -> Self
    where
        F: Fn(&B, &mut Invocation<'_>) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.pre_destroy.push(bind_handler(f));
        self
    }

    /// Legacy create callback, run after post-construct.
    pub fn ejb_create<F>(mut self, f: F) -> Self
    where
        F: Fn(&B, &mut Invocation<'_>) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.ejb_create = Some(bind_handler(f));
        self
    }

    /// Business method invoked by [`fire_timeout`](crate::SingletonContainer::fire_timeout).
    pub fn timeout_method(mut self, name: impl Into<String>) -> Self {
        self.timeout_method = Some(name.into());
        self
    }

    /// Treats `E` as an application exception.
    pub fn application_exception<E: std::error::Error + 'static>(mut self, rollback: bool) -> Self {
        self.exception_rules.push(ExceptionRule {
            matches: is_type::<E>,
            kind: ExceptionType::Application { rollback },
        });
        self
    }

    /// Treats `E` as a system exception.
    pub fn system_exception<E: std::error::Error + 'static>(mut self) -> Self {
        self.exception_rules.push(ExceptionRule {
            matches: is_type::<E>,
            kind: ExceptionType::System,
        });
        self
    }

    pub fn access_timeout(mut self, timeout: Duration) -> Self {
        self.access_timeout = Some(timeout);
        self
    }

    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn concurrency(mut self, management: ConcurrencyManagement) -> Self {
        self.concurrency = management;
        self
    }

    pub fn startup(mut self, startup: bool) -> Self {
        self.startup = startup;
        self
    }

    pub fn build(self) -> ContainerResult<Deployment> {
        let known: HashSet<&str> = self.interceptor_defs.iter().map(|d| d.name.as_str()).collect();
        let is_known = |name: &str| name == self.bean_class || known.contains(name);

        for name in &self.class_interceptors {
            if !is_known(name) {
                return Err(ContainerError::Config(format!(
                    "deployment {}: unknown class interceptor {}",
                    self.id, name
                )));
            }
        }

        let access_timeout = match self.access_timeout {
            Some(timeout) => Some(timeout),
            None => self
                .properties
                .get(ACCESS_TIMEOUT_PROPERTY)
                .or_else(|| self.properties.get(TIMEOUT_PROPERTY))
                .map(|raw| parse_duration(raw, TimeUnit::Millis))
                .transpose()?,
        };

        let mut methods = AHashMap::with_capacity(self.methods.len());
        for pending in self.methods {
            if let Some(unknown) = pending.options.interceptors.iter().find(|n| !is_known(n)) {
                return Err(ContainerError::Config(format!(
                    "deployment {}: method {} names unknown interceptor {}",
                    self.id, pending.name, unknown
                )));
            }
            let mut chain = Vec::new();
            if !pending.options.exclude_class_interceptors {
                chain.extend(self.class_interceptors.iter().cloned());
            }
            chain.extend(pending.options.interceptors.iter().cloned());
            if self.own_interceptor.is_some() && !chain.contains(&self.bean_class) {
                chain.push(self.bean_class.clone());
            }
            let name = pending.name.clone();
            let def = MethodDef {
                name: pending.name,
                options: pending.options,
                chain,
                handler: pending.handler,
            };
            if methods.insert(name.clone(), def).is_some() {
                return Err(ContainerError::Config(format!(
                    "deployment {}: method {} registered twice",
                    self.id, name
                )));
            }
        }

        for (key, target) in &self.method_map {
            if !methods.contains_key(target) {
                return Err(ContainerError::Config(format!(
                    "deployment {}: {}.{} maps to unknown method {}",
                    self.id, key.0, key.1, target
                )));
            }
        }
        if let Some(timeout) = &self.timeout_method {
            if !methods.contains_key(timeout) {
                return Err(ContainerError::Config(format!(
                    "deployment {}: unknown timeout method {}",
                    self.id, timeout
                )));
            }
        }

        let environment = match self.environment_parent {
            Some(parent) => Environment::with_parent(parent),
            None => Environment::new(),
        };
        for (name, value) in self.env_entries {
            environment.bind(name, value)?;
        }

        let lifecycle_chain = self
            .class_interceptors
            .iter()
            .filter(|name| **name != self.bean_class)
            .cloned()
            .collect();

        let injections = self.injections;
        let inject: Inject = Box::new(move |bean, env, deployment_id| {
            let bean = bean
                .downcast_mut::<B>()
                .ok_or_else(|| format!("bean is not a {}", std::any::type_name::<B>()))?;
            inject_all(bean, &injections, env, deployment_id)
        });

        tracing::debug!(
            deployment_id = %self.id,
            methods = methods.len(),
            interceptors = self.interceptor_defs.len(),
            "deployment built"
        );

        Ok(Deployment {
            id: self.id,
            bean_class: self.bean_class,
            construct: self.construct,
            inject,
            own_interceptor: self.own_interceptor,
            interfaces: self.interfaces,
            method_map: self.method_map,
            methods,
            interceptor_defs: self.interceptor_defs,
            lifecycle_chain,
            post_construct: self.post_construct,
            pre_destroy: self.pre_destroy,
            ejb_create: self.ejb_create,
            timeout_method: self.timeout_method,
            exception_rules: self.exception_rules,
            access_timeout,
            properties: self.properties,
            environment: Arc::new(environment),
            concurrency: self.concurrency,
            startup: self.startup,
            container_data: RwLock::new(None),
        })
    }
}

impl<B: Interceptor> DeploymentBuilder<B> {
    /// The bean's own around-invoke hook runs innermost in every method's chain.
    pub fn bean_interceptor(mut self) -> Self {
        self.own_interceptor = Some(adapt_own::<B>);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use thiserror::Error;

    struct Bean;

    #[derive(Debug, Error)]
    #[error("insufficient funds")]
    struct Insufficient;

    #[derive(Debug, Error)]
    #[error("ledger corrupted")]
    struct Corrupted;

    #[derive(Debug, Error)]
    #[error("other")]
    struct Other;

    #[derive(Default)]
    struct Audit;
    impl Interceptor for Audit {}

    fn builder() -> DeploymentBuilder<Bean> {
        DeploymentBuilder::new("Ledger", || Ok(Bean))
    }

    fn boxed(err: impl std::error::Error + Send + Sync + 'static) -> BoxError {
        Box::new(err)
    }

    #[test]
    fn classification_follows_registered_rules() {
        let d = builder()
            .application_exception::<Insufficient>(true)
            .system_exception::<Corrupted>()
            .build()
            .unwrap();

        assert_eq!(
            d.classify(&boxed(Insufficient)),
            ExceptionType::Application { rollback: true }
        );
        assert_eq!(d.classify(&boxed(Corrupted)), ExceptionType::System);
        assert_eq!(d.classify(&boxed(Other)), ExceptionType::Application { rollback: false });
        assert_eq!(
            d.classify(&boxed(SystemException::new(Other))),
            ExceptionType::System
        );
        assert_eq!(
            d.classify(&boxed(ContainerError::Application(boxed(Insufficient)))),
            ExceptionType::Application { rollback: true }
        );
        assert_eq!(
            d.classify(&boxed(ContainerError::UnknownDeployment("X".into()))),
            ExceptionType::System
        );
    }

    #[test]
    fn run_method_prefers_explicit_mapping() {
        let d = builder()
            .business_local("LedgerLocal")
            .method("balance", MethodOptions::read(), |_b: &Bean, _inv| Ok(1u32))
            .method("total", MethodOptions::read(), |_b: &Bean, _inv| Ok(2u32))
            .map_method("LedgerLocal", "balance", "total")
            .build()
            .unwrap();

        assert_eq!(d.run_method("LedgerLocal", "balance").unwrap().name(), "total");
        assert_eq!(d.run_method("Other", "balance").unwrap().name(), "balance");
        assert!(d.run_method("LedgerLocal", "missing").is_none());
        assert_eq!(d.interface_type("LedgerLocal"), Some(InterfaceType::BusinessLocal));
    }

    #[test]
    fn chains_put_class_interceptors_first() {
        let d = builder()
            .class_interceptor(InterceptorDef::of::<Audit>("audit"))
            .interceptor(InterceptorDef::of::<Audit>("trace"))
            .method("a", MethodOptions::write().interceptor("trace"), |_b: &Bean, _inv| Ok(()))
            .method(
                "b",
                MethodOptions::write().exclude_class_interceptors(),
                |_b: &Bean, _inv| Ok(()),
            )
            .build()
            .unwrap();

        assert_eq!(d.method("a").unwrap().interceptor_chain(), ["audit", "trace"]);
        assert!(d.method("b").unwrap().interceptor_chain().is_empty());
        assert_eq!(d.lifecycle_chain(), ["audit"]);
    }

    #[test]
    fn access_timeout_falls_back_to_timeout_property() {
        let d = builder().property("Timeout", "250").build().unwrap();
        assert_eq!(d.access_timeout(), Some(Duration::from_millis(250)));

        let d = builder()
            .property("AccessTimeout", "2 seconds")
            .property("Timeout", "250")
            .build()
            .unwrap();
        assert_eq!(d.access_timeout(), Some(Duration::from_secs(2)));

        assert!(builder().property("AccessTimeout", "soon").build().is_err());
    }

    #[test]
    fn invalid_references_are_rejected() {
        assert!(builder()
            .method("a", MethodOptions::write().interceptor("missing"), |_b: &Bean, _inv| Ok(()))
            .build()
            .is_err());
        assert!(builder().timeout_method("tick").build().is_err());
        assert!(builder().map_method("I", "a", "b").build().is_err());
        assert!(builder()
            .method("a", MethodOptions::write(), |_b: &Bean, _inv| Ok(()))
            .method("a", MethodOptions::read(), |_b: &Bean, _inv| Ok(()))
            .build()
            .is_err());
    }
}
