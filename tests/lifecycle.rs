/// Lifecycle integration tests
///
/// Construction, injection, post-construct and pre-destroy ordering, startup
/// singletons and the behaviour of a deployment after it is torn down.

use ferrous_singleton::{
    Args, BeanResult, ContainerError, ContextOperation, DeploymentBuilder, EnvValue, Injection, InterceptorDef,
    Interceptor, InterfaceType, Invocation, InvocationContext, MethodOptions, Next, SingletonContainer,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

type Journal = Arc<Mutex<Vec<String>>>;

#[derive(Default)]
struct Inventory {
    warehouse: String,
    capacity: u32,
    journal: Option<Journal>,
}

impl Inventory {
    fn note(&self, entry: impl Into<String>) {
        if let Some(journal) = &self.journal {
            journal.lock().push(entry.into());
        }
    }
}

struct Trace {
    journal: Journal,
}

impl Interceptor for Trace {
    fn post_construct(&self, inv: &mut Invocation<'_>, next: Next<'_>) -> BeanResult {
        self.journal.lock().push("trace:post-construct".to_string());
        next.proceed(inv)
    }

    fn pre_destroy(&self, inv: &mut Invocation<'_>, next: Next<'_>) -> BeanResult {
        self.journal.lock().push("trace:pre-destroy".to_string());
        next.proceed(inv)
    }
}

fn inventory(journal: &Journal) -> DeploymentBuilder<Inventory> {
    let trace_journal = journal.clone();
    DeploymentBuilder::new("Inventory", || Ok(Inventory::default()))
        .business_local("InventoryLocal")
        .env_entry("warehouse", EnvValue::text("north"))
        .env_entry("capacity", EnvValue::text("250"))
        .env_entry("journal", EnvValue::typed(journal.clone()))
        .inject(Injection::value("warehouse", "warehouse", |bean: &mut Inventory, v: String| {
            bean.warehouse = v
        }))
        .inject(Injection::value("capacity", "capacity", |bean: &mut Inventory, v: u32| bean.capacity = v))
        .inject(Injection::shared("journal", "journal", |bean: &mut Inventory, v: Arc<Journal>| {
            bean.journal = Some((*v).clone())
        }))
        .inject(Injection::value("unbound", "not/bound", |bean: &mut Inventory, v: u32| bean.capacity += v))
        .class_interceptor(InterceptorDef::new(
            "Trace",
            move || Ok(Trace { journal: trace_journal.clone() }),
            Vec::new(),
        ))
        .post_construct(|bean: &Inventory, inv| {
            bean.note(format!("post-construct:{}", bean.warehouse));
            // Caller identity is not available during construction.
            assert!(inv.caller_principal().is_err());
            assert!(inv.lookup("warehouse")?.is_some());
            Ok(())
        })
        .ejb_create(|bean: &Inventory, _inv| {
            bean.note("ejb-create");
            Ok(())
        })
        .pre_destroy(|bean: &Inventory, _inv| {
            bean.note("pre-destroy");
            Ok(())
        })
        .method("describe", MethodOptions::read(), |bean: &Inventory, _inv| {
            bean.note("describe");
            Ok(format!("{}:{}", bean.warehouse, bean.capacity))
        })
}

#[test]
fn test_construction_runs_once_in_order() {
    let journal: Journal = Arc::new(Mutex::new(Vec::new()));
    let container = SingletonContainer::builder().build().unwrap();
    container.deploy(inventory(&journal).build().unwrap()).unwrap();

    // Lazy: nothing is constructed at deploy time.
    assert!(journal.lock().is_empty());

    let first: String = container.call("Inventory", "InventoryLocal", "describe", Args::new()).unwrap();
    let second: String = container.call("Inventory", "InventoryLocal", "describe", Args::new()).unwrap();
    assert_eq!(first, "north:250");
    assert_eq!(first, second);

    container.undeploy("Inventory").unwrap();
    assert_eq!(
        *journal.lock(),
        vec![
            "trace:post-construct",
            "post-construct:north",
            "ejb-create",
            "describe",
            "describe",
            "trace:pre-destroy",
            "pre-destroy",
        ]
    );
    container.shutdown();
}

#[test]
fn test_startup_singleton_is_constructed_at_deploy() {
    let journal: Journal = Arc::new(Mutex::new(Vec::new()));
    let container = SingletonContainer::builder().build().unwrap();
    let deployment = container.deploy(inventory(&journal).startup(true).build().unwrap()).unwrap();

    assert!(container.instance_manager().existing_instance(&deployment).is_some());
    assert_eq!(journal.lock()[1], "post-construct:north");
    container.shutdown();
}

#[test]
fn test_failed_startup_rolls_the_deployment_back() {
    let container = SingletonContainer::builder().build().unwrap();
    let deployment = DeploymentBuilder::new("Broken", || Ok(Inventory::default()))
        .business_local("BrokenLocal")
        .startup(true)
        .post_construct(|_: &Inventory, _inv| Err("schema missing".into()))
        .build()
        .unwrap();

    let err = container.deploy(deployment).unwrap_err();
    assert!(err.is_system());
    assert!(err.to_string().contains("cannot construct singleton instance"));
    assert!(container.deployment("Broken").is_none());
}

#[test]
fn test_failed_construction_is_retried_on_next_call() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();
    let deployment = DeploymentBuilder::new("Flaky", move || {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            Err("database not ready".into())
        } else {
            Ok(Inventory::default())
        }
    })
    .business_local("FlakyLocal")
    .method("ping", MethodOptions::read(), |_: &Inventory, _inv| Ok(()))
    .build()
    .unwrap();

    let container = SingletonContainer::builder().build().unwrap();
    container.deploy(deployment).unwrap();

    let err = container.call::<()>("Flaky", "FlakyLocal", "ping", Args::new()).unwrap_err();
    assert!(err.is_system());
    container.call::<()>("Flaky", "FlakyLocal", "ping", Args::new()).unwrap();
    container.call::<()>("Flaky", "FlakyLocal", "ping", Args::new()).unwrap();
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    container.shutdown();
}

#[test]
fn test_construction_panic_becomes_a_system_error() {
    let deployment = DeploymentBuilder::new("Panicky", || -> Result<Inventory, _> { panic!("boom") })
        .business_local("PanickyLocal")
        .method("ping", MethodOptions::read(), |_: &Inventory, _inv| Ok(()))
        .build()
        .unwrap();

    let container = SingletonContainer::builder().build().unwrap();
    container.deploy(deployment).unwrap();
    let err = container.call::<()>("Panicky", "PanickyLocal", "ping", Args::new()).unwrap_err();
    match err {
        ContainerError::System { source, .. } => assert!(source.to_string().contains("boom")),
        other => panic!("expected a system error, got {:?}", other),
    }
}

#[test]
fn test_pre_destroy_failure_is_swallowed() {
    let destroyed = Arc::new(AtomicBool::new(false));
    let flag = destroyed.clone();
    let deployment = DeploymentBuilder::new("Grumpy", || Ok(Inventory::default()))
        .business_local("GrumpyLocal")
        .method("ping", MethodOptions::read(), |_: &Inventory, _inv| Ok(()))
        .pre_destroy(move |_: &Inventory, _inv| {
            flag.store(true, Ordering::SeqCst);
            Err("refusing to close".into())
        })
        .build()
        .unwrap();

    let container = SingletonContainer::builder().build().unwrap();
    container.deploy(deployment).unwrap();
    container.call::<()>("Grumpy", "GrumpyLocal", "ping", Args::new()).unwrap();

    container.undeploy("Grumpy").unwrap();
    assert!(destroyed.load(Ordering::SeqCst));
}

#[test]
fn test_destroyed_instance_is_not_resurrected() {
    let journal: Journal = Arc::new(Mutex::new(Vec::new()));
    let container = SingletonContainer::builder().build().unwrap();
    let deployment = container.deploy(inventory(&journal).build().unwrap()).unwrap();
    container.call::<String>("Inventory", "InventoryLocal", "describe", Args::new()).unwrap();

    container.undeploy("Inventory").unwrap();
    let err = container
        .call::<String>("Inventory", "InventoryLocal", "describe", Args::new())
        .unwrap_err();
    assert!(matches!(err, ContainerError::UnknownDeployment(_)));

    let mut ctx = InvocationContext::new(deployment.clone(), None, InterfaceType::BusinessLocal);
    let err = container.instance_manager().get_instance(&mut ctx).unwrap_err();
    assert!(matches!(err, ContainerError::NotDeployed(_)));
}

#[test]
fn test_shutdown_tears_down_in_reverse_order() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let container = SingletonContainer::builder().build().unwrap();
    for id in ["first", "second", "third"] {
        let order = order.clone();
        let deployment = DeploymentBuilder::new(id, || Ok(Inventory::default()))
            .business_local("Local")
            .startup(true)
            .pre_destroy(move |_: &Inventory, _inv| {
                order.lock().push(id);
                Ok(())
            })
            .build()
            .unwrap();
        container.deploy(deployment).unwrap();
    }

    assert!(container.shutdown());
    assert_eq!(*order.lock(), vec!["third", "second", "first"]);
    assert!(container.deployments().is_empty());
}

#[test]
fn test_business_phase_allows_every_context_operation() {
    let deployment = DeploymentBuilder::new("Phases", || Ok(Inventory::default()))
        .business_local("PhasesLocal")
        .method("allowed", MethodOptions::read(), |_: &Inventory, inv| {
            let ctx = inv.context();
            Ok(ctx.allowed().contains(ContextOperation::CallerPrincipal)
                && ctx.allowed().contains(ContextOperation::RollbackOnly)
                && inv.caller_principal()?.name() == "guest")
        })
        .build()
        .unwrap();

    let container = SingletonContainer::builder().build().unwrap();
    container.deploy(deployment).unwrap();
    assert!(container.call::<bool>("Phases", "PhasesLocal", "allowed", Args::new()).unwrap());
    container.shutdown();
}
