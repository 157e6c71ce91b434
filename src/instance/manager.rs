use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use ahash::AHashMap;
use parking_lot::Mutex;

use super::{SingletonData, SingletonInstance};
use crate::context::{InvocationContext, SessionContext, WebServiceContext};
use crate::deployment::{Bean, Deployment, Handler};
use crate::environment::{EnvValue, EnvironmentLookup};
use crate::error::{unwrap_target, BoxError, ContainerError, ContainerResult};
use crate::interceptor::{ChainKind, Invocation};
use crate::internal::catch_panic;
use crate::key::ContainerId;
use crate::lock::InstanceLock;
use crate::observer::Observers;
use crate::operation::Operation;
use crate::security::SecurityService;
use crate::value::Args;

/// Produces the instance backing each deployment and tears it down.
pub struct InstanceManager {
    container_id: ContainerId,
    security: Arc<dyn SecurityService>,
    observers: Observers,
    /// Guards the lookup-or-bind of the context objects only.
    bind_lock: Mutex<()>,
}

impl InstanceManager {
    pub fn new(container_id: ContainerId, security: Arc<dyn SecurityService>) -> Self {
        Self::with_observers(container_id, security, Observers::new())
    }

    pub(crate) fn with_observers(
        container_id: ContainerId,
        security: Arc<dyn SecurityService>,
        observers: Observers,
    ) -> Self {
        Self {
            container_id,
            security,
            observers,
            bind_lock: Mutex::new(()),
        }
    }

    /// Attaches empty container data to the deployment.
    pub fn deploy(&self, deployment: &Deployment) -> ContainerResult<()> {
        if deployment.container_data().is_some() {
            return Err(ContainerError::DuplicateDeployment(deployment.id().to_string()));
        }
        deployment.set_container_data(Some(Arc::new(SingletonData::new())));
        Ok(())
    }

    /// Detaches container data. The instance, if any, is not destroyed here.
    pub fn undeploy(&self, deployment: &Deployment) {
        deployment.set_container_data(None);
    }

    /// The instance, if it has been constructed.
    pub fn existing_instance(&self, deployment: &Deployment) -> Option<Arc<SingletonInstance>> {
        deployment.container_data().and_then(|data| data.get().cloned())
    }

    /// Returns the deployment's instance, constructing it on first access.
    ///
    /// Concurrent first callers block until one construction finishes and all
    /// receive the same instance. On failure nothing is cached, so the next
    /// call constructs again.
    pub fn get_instance(&self, ctx: &mut InvocationContext) -> ContainerResult<Arc<SingletonInstance>> {
        let deployment = ctx.deployment().clone();
        let data = deployment
            .container_data()
            .ok_or_else(|| ContainerError::NotDeployed(deployment.id().to_string()))?;

        let instance = data
            .instance
            .get_or_try_init(|| self.create_instance(&deployment, ctx))?
            .clone();
        if instance.is_destroyed() {
            return Err(ContainerError::NotDeployed(deployment.id().to_string()));
        }
        Ok(instance)
    }

    /// Runs the pre-destroy chain once; later calls do nothing.
    ///
    /// Failures are logged and swallowed.
    pub fn free_instance(&self, ctx: &mut InvocationContext, instance: &SingletonInstance) {
        let deployment = ctx.deployment().clone();
        if instance.destroyed.swap(true, Ordering::SeqCst) {
            tracing::debug!(deployment_id = deployment.id(), "instance already destroyed");
            return;
        }

        let result = catch_panic(|| {
            let mut phase = ctx.enter(Operation::PreDestroy);
            run_lifecycle(
                &deployment,
                instance,
                &mut phase,
                ChainKind::PreDestroy,
                deployment.pre_destroy_callbacks(),
            )
        });
        if let Err(err) = result {
            let err = unwrap_target(err);
            tracing::error!(deployment_id = deployment.id(), error = %err, "pre-destroy callback failed");
        }
        self.observers.instance_destroyed(deployment.id());
    }

    fn create_instance(&self, deployment: &Arc<Deployment>, ctx: &mut InvocationContext) -> ContainerResult<Arc<SingletonInstance>> {
        let started = Instant::now();
        let session = self.bind_contexts(deployment);

        match catch_panic(|| construct(deployment, session, ctx)) {
            Ok(instance) => {
                let elapsed = started.elapsed();
                tracing::info!(deployment_id = deployment.id(), ?elapsed, "singleton instance created");
                self.observers.instance_created(deployment.id(), elapsed);
                Ok(Arc::new(instance))
            }
            Err(err) => {
                let err = unwrap_target(err);
                tracing::error!(deployment_id = deployment.id(), error = %err, "cannot construct singleton instance");
                self.observers.instance_creation_failed(deployment.id(), &err.to_string());
                Err(ContainerError::system(
                    deployment.id(),
                    "cannot construct singleton instance",
                    err,
                ))
            }
        }
    }

    /// Looks up or creates and binds the session and web-service contexts.
    fn bind_contexts(&self, deployment: &Deployment) -> Arc<SessionContext> {
        let _guard = self.bind_lock.lock();
        let env = deployment.environment();
        if let Some(existing) = env
            .lookup(SessionContext::JNDI_NAME)
            .and_then(|value| value.downcast::<SessionContext>())
        {
            return existing;
        }

        let session = Arc::new(SessionContext::new(self.container_id.clone(), self.security.clone()));
        env.rebind(SessionContext::JNDI_NAME, EnvValue::shared(session.clone()));
        env.rebind(
            WebServiceContext::JNDI_NAME,
            EnvValue::typed(WebServiceContext::new(session.clone())),
        );
        session
    }
}

fn construct(
    deployment: &Deployment,
    session: Arc<SessionContext>,
    ctx: &mut InvocationContext,
) -> Result<SingletonInstance, BoxError> {
    let (bean, interceptors) = {
        let _phase = ctx.enter(Operation::Injection);
        let mut bean = deployment.construct_bean()?;
        deployment.inject_bean(&mut *bean)?;

        let env: &dyn EnvironmentLookup = deployment.environment().as_ref();
        let mut interceptors = AHashMap::new();
        for def in deployment.interceptor_defs() {
            if def.name() == deployment.bean_class() {
                continue;
            }
            interceptors.insert(def.name().to_string(), def.build(env, deployment.id())?);
        }
        (Arc::<Bean>::from(bean), interceptors)
    };

    let instance = SingletonInstance {
        own_interceptor: deployment.own_interceptor(&bean),
        bean,
        bean_class: deployment.bean_class().to_string(),
        interceptors,
        lock: InstanceLock::for_concurrency(deployment.concurrency_management()),
        session,
        destroyed: AtomicBool::new(false),
        created_at: Instant::now(),
    };

    {
        let mut phase = ctx.enter(Operation::PostConstruct);
        run_lifecycle(
            deployment,
            &instance,
            &mut phase,
            ChainKind::PostConstruct,
            deployment.post_construct_callbacks(),
        )?;
    }

    if let Some(create) = deployment.ejb_create_callback() {
        let mut phase = ctx.enter(Operation::Create);
        let mut inv = Invocation::new(&mut phase, instance.session(), "ejbCreate", Args::new(), None);
        create(instance.bean(), &mut inv)?;
    }

    Ok(instance)
}

fn run_lifecycle(
    deployment: &Deployment,
    instance: &SingletonInstance,
    ctx: &mut InvocationContext,
    kind: ChainKind,
    callbacks: &[Handler],
) -> Result<(), BoxError> {
    let stack = instance.stack(deployment.lifecycle_chain(), kind);
    let phase = match kind {
        ChainKind::PreDestroy => "PreDestroy",
        _ => "PostConstruct",
    };
    let mut inv = Invocation::new(ctx, instance.session(), phase, Args::new(), None);
    let bean = instance.bean_handle();
    stack.invoke(&mut inv, &|inv| {
        for callback in callbacks {
            callback(&**bean, inv)?;
        }
        Ok(None)
    })?;
    Ok(())
}
