/// Asynchronous dispatch tests
///
/// Asynchronous methods return a handle immediately and run once on a pool
/// thread, under the same lock and exception rules as synchronous calls.

use ferrous_singleton::config::{ContainerConfig, PoolConfig};
use ferrous_singleton::{
    Args, AsyncState, ContainerError, DeploymentBuilder, MethodOptions, MetricsCollector, Outcome, SingletonContainer,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

#[derive(Default)]
struct Mailer {
    sent: AtomicUsize,
    threads: Mutex<Vec<ThreadId>>,
}

fn mailer() -> DeploymentBuilder<Mailer> {
    DeploymentBuilder::new("Mailer", || Ok(Mailer::default()))
        .business_local("MailerLocal")
        .method("send", MethodOptions::write().asynchronous(), |bean: &Mailer, inv| {
            let delay: &u64 = inv.arg(0)?;
            thread::sleep(Duration::from_millis(*delay));
            bean.threads.lock().push(thread::current().id());
            Ok(bean.sent.fetch_add(1, Ordering::SeqCst) + 1)
        })
        .method("bounce", MethodOptions::write().asynchronous(), |_: &Mailer, _inv| -> Result<(), _> {
            Err("mailbox full".into())
        })
        .method("sent", MethodOptions::read(), |bean: &Mailer, _inv| {
            Ok(bean.sent.load(Ordering::SeqCst))
        })
}

fn container() -> SingletonContainer {
    let config = ContainerConfig {
        pool: PoolConfig {
            max_threads: 2,
            ..PoolConfig::default()
        },
        ..ContainerConfig::default()
    };
    SingletonContainer::builder().config(config).build().unwrap()
}

#[test]
fn test_async_call_returns_before_the_method_finishes() {
    let container = container();
    container.deploy(mailer().build().unwrap()).unwrap();

    let started = Instant::now();
    let outcome = container
        .invoke("Mailer", None, "MailerLocal", "send", Args::new().with(200u64), None)
        .unwrap();
    assert!(started.elapsed() < Duration::from_millis(150));
    assert!(outcome.is_submitted());

    let handle = outcome.into_async().unwrap();
    assert!(!handle.is_done());
    assert_eq!(handle.wait_for::<usize>().unwrap(), Some(1));
    container.shutdown();
}

#[test]
fn test_async_call_runs_exactly_once_on_a_pool_thread() {
    let container = container();
    container.deploy(mailer().build().unwrap()).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            container
                .invoke("Mailer", None, "MailerLocal", "send", Args::new().with(5u64), None)
                .unwrap()
                .into_async()
                .unwrap()
        })
        .collect();
    for handle in handles {
        handle.wait().unwrap();
    }

    assert_eq!(container.call::<usize>("Mailer", "MailerLocal", "sent", Args::new()).unwrap(), 4);
    let deployment = container.deployment("Mailer").unwrap();
    let instance = container.instance_manager().existing_instance(&deployment).unwrap();
    let threads = instance.bean_as::<Mailer>().unwrap().threads.lock().clone();
    assert_eq!(threads.len(), 4);
    assert!(threads.iter().all(|id| *id != thread::current().id()));
    container.shutdown();
}

#[test]
fn test_async_failure_surfaces_through_the_handle() {
    let container = container();
    container.deploy(mailer().build().unwrap()).unwrap();

    let handle = container
        .invoke("Mailer", None, "MailerLocal", "bounce", Args::new(), None)
        .unwrap()
        .into_async()
        .unwrap();
    match handle.wait_timeout(Duration::from_secs(5)) {
        Ok(result) => {
            let err = result.unwrap_err();
            assert!(err.is_application());
            assert_eq!(err.to_string(), "mailbox full");
        }
        Err(handle) => panic!("asynchronous call still {:?} after 5s", handle.state()),
    }
    container.shutdown();
}

#[test]
fn test_call_waits_for_async_methods() {
    let container = container();
    container.deploy(mailer().build().unwrap()).unwrap();

    let sent: usize = container
        .call("Mailer", "MailerLocal", "send", Args::new().with(10u64))
        .unwrap();
    assert_eq!(sent, 1);
    container.shutdown();
}

#[test]
fn test_observers_see_async_submissions() {
    let metrics = Arc::new(MetricsCollector::new());
    let container = SingletonContainer::builder().observer(metrics.clone()).build().unwrap();
    container.deploy(mailer().build().unwrap()).unwrap();

    let handle = container
        .invoke("Mailer", None, "MailerLocal", "send", Args::new().with(1u64), None)
        .unwrap()
        .into_async()
        .unwrap();
    handle.wait().unwrap();

    let totals = metrics.snapshot();
    assert_eq!(totals.async_submitted, 1);
    assert_eq!(totals.invocations, 1);
    container.shutdown();
}

#[test]
fn test_submissions_after_shutdown_are_refused() {
    let container = container();
    container.deploy(mailer().build().unwrap()).unwrap();
    container.shutdown();

    container.deploy(mailer().build().unwrap()).unwrap();
    let err = container
        .invoke("Mailer", None, "MailerLocal", "send", Args::new().with(1u64), None)
        .unwrap_err();
    assert!(matches!(err, ContainerError::PoolShutdown));
}

#[tokio::test]
async fn test_async_result_can_be_awaited() {
    let container = container();
    container.deploy(mailer().build().unwrap()).unwrap();

    let outcome = container
        .invoke("Mailer", None, "MailerLocal", "send", Args::new().with(20u64), None)
        .unwrap();
    let handle = match outcome {
        Outcome::Submitted(handle) => handle,
        Outcome::Returned(_) => panic!("send is asynchronous"),
    };
    assert_ne!(handle.state(), AsyncState::Failed);

    let value = handle.await.unwrap().unwrap();
    assert_eq!(*value.downcast::<usize>().unwrap(), 1);
    container.shutdown();
}
