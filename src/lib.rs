//! # ferrous-singleton
//!
//! A container for singleton components: one shared instance per deployment,
//! guarded by read/write locks with bounded waits, with interceptor chains,
//! lifecycle callbacks and asynchronous dispatch.
//!
//! ## Features
//!
//! - **Exactly one instance**: constructed on first use (or at deploy time for
//!   startup singletons) no matter how many threads race for it
//! - **Container-managed concurrency**: READ methods overlap, WRITE methods are
//!   exclusive, and every wait is bounded by an access timeout
//! - **Interceptors**: around-invoke, post-construct and pre-destroy chains
//! - **Exception classification**: application failures propagate as thrown,
//!   system failures are wrapped and force transaction rollback
//! - **Asynchronous methods**: queued on a bounded worker pool, with a handle
//!   that can be waited on or awaited
//!
//! ## Quick Start
//!
//! ```rust
//! use ferrous_singleton::{Args, DeploymentBuilder, MethodOptions, SingletonContainer};
//! use parking_lot::RwLock;
//!
//! #[derive(Default)]
//! struct Catalog {
//!     items: RwLock<Vec<String>>,
//! }
//!
//! let deployment = DeploymentBuilder::new("Catalog", || Ok(Catalog::default()))
//!     .business_local("CatalogLocal")
//!     .method("add", MethodOptions::write(), |bean: &Catalog, inv| {
//!         let item: &String = inv.arg(0)?;
//!         bean.items.write().push(item.clone());
//!         Ok(())
//!     })
//!     .method("size", MethodOptions::read(), |bean: &Catalog, _inv| {
//!         Ok(bean.items.read().len())
//!     })
//!     .build()
//!     .unwrap();
//!
//! let container = SingletonContainer::builder().build().unwrap();
//! container.deploy(deployment).unwrap();
//!
//! container
//!     .call::<()>("Catalog", "CatalogLocal", "add", Args::new().with("lamp".to_string()))
//!     .unwrap();
//! let size = container.call::<usize>("Catalog", "CatalogLocal", "size", Args::new()).unwrap();
//! assert_eq!(size, 1);
//! container.shutdown();
//! ```
//!
//! ## Lock Types
//!
//! Methods default to WRITE. A WRITE call waits for every in-flight call to
//! finish; READ calls share the instance with each other. When the wait
//! exceeds the method's access timeout the call fails with
//! [`ContainerError::ConcurrentAccessTimeout`] and never reaches the bean.
//!
//! ```rust
//! use ferrous_singleton::{DeploymentBuilder, MethodOptions, SingletonContainer, ContainerError};
//! use std::time::Duration;
//!
//! struct Slow;
//!
//! let deployment = DeploymentBuilder::new("Slow", || Ok(Slow))
//!     .business_local("SlowLocal")
//!     .access_timeout(Duration::from_millis(20))
//!     .method("work", MethodOptions::write(), |_: &Slow, _inv| {
//!         std::thread::sleep(Duration::from_millis(200));
//!         Ok(())
//!     })
//!     .build()
//!     .unwrap();
//!
//! let container = SingletonContainer::builder().build().unwrap();
//! container.deploy(deployment).unwrap();
//!
//! let background = container.clone();
//! let worker = std::thread::spawn(move || {
//!     background.call::<()>("Slow", "SlowLocal", "work", Default::default())
//! });
//! std::thread::sleep(Duration::from_millis(50));
//!
//! let err = container.call::<()>("Slow", "SlowLocal", "work", Default::default()).unwrap_err();
//! assert!(matches!(err, ContainerError::ConcurrentAccessTimeout { .. }));
//! worker.join().unwrap().unwrap();
//! container.shutdown();
//! ```
//!
//! ## Observability
//!
//! Every component logs through `tracing`. Register a [`TracingObserver`] or
//! a [`MetricsCollector`] on the builder for per-invocation events.

pub mod config;
pub mod container;
pub mod context;
pub mod deployment;
pub mod descriptors;
pub mod environment;
pub mod error;
pub mod instance;
pub mod interceptor;
pub mod key;
pub mod lock;
pub mod metrics;
pub mod observer;
pub mod operation;
pub mod pool;
pub mod registry;
pub mod security;
pub mod transaction;
pub mod value;
pub mod webservice;

mod internal;

pub use container::{ContainerBuilder, Outcome, SingletonContainer};
pub use context::{InvocationContext, PhaseGuard, SessionContext, WebServiceContext};
pub use deployment::{Deployment, DeploymentBuilder, InterceptorDef, MethodDef, MethodOptions};
pub use descriptors::{ConcurrencyManagement, ExceptionType, InterfaceType, LockType, TransactionAttribute};
pub use environment::{EnvValue, Environment, EnvironmentLookup, Injection, InjectionDescriptor, InjectionError};
pub use error::{BoxError, ContainerError, ContainerResult, PanicError, SystemException};
pub use instance::{InstanceManager, SingletonInstance};
pub use interceptor::{ChainKind, Interceptor, InterceptorStack, Invocation, Next};
pub use key::{ContainerId, ProxyRef, RegistryKey};
pub use lock::{InstanceLock, LockGuard};
pub use metrics::{ContainerMetrics, MetricsCollector, TimingStats};
pub use observer::{ContainerObserver, InvocationEvent, InvocationOutcome, TracingObserver};
pub use operation::{AllowedOperations, ContextOperation, Operation};
pub use pool::{AsyncResult, AsyncState, WorkerPool};
pub use registry::DeploymentRegistry;
pub use security::{MethodRef, PermitAll, Principal, RoleBasedSecurity, SecurityService};
pub use transaction::{LocalTransactionManager, TransactionManager, TransactionPolicy};
pub use value::{Args, BeanResult, Value};
pub use webservice::{JaxRpcMessageContext, JaxWsMessageContext, MessageContext, ParameterUnmarshaller, ServiceMessage};
