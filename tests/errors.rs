/// Exception handling, transactions and security tests

use ferrous_singleton::{
    Args, ContainerError, DeploymentBuilder, InterfaceType, LocalTransactionManager, MethodOptions, Principal,
    ProxyRef, RoleBasedSecurity, SingletonContainer, SystemException, TransactionAttribute,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("account {0} is overdrawn")]
struct Overdrawn(u32);

#[derive(Debug, Error)]
#[error("audit trail rejected the entry")]
struct AuditRejected;

#[derive(Debug, Error)]
#[error("ledger checksum mismatch")]
struct Corrupted;

#[derive(Default)]
struct Bank {
    transfers: AtomicUsize,
}

fn bank() -> DeploymentBuilder<Bank> {
    let required = || MethodOptions::write().transaction(TransactionAttribute::Required);
    DeploymentBuilder::new("Bank", || Ok(Bank::default()))
        .business_local("BankLocal")
        .application_exception::<AuditRejected>(true)
        .system_exception::<Corrupted>()
        .method("transfer", required(), |bean: &Bank, _inv| {
            Ok(bean.transfers.fetch_add(1, Ordering::SeqCst) + 1)
        })
        .method("overdraw", required(), |_: &Bank, _inv| -> Result<(), _> { Err(Overdrawn(7).into()) })
        .method("audit", required(), |_: &Bank, _inv| -> Result<(), _> { Err(AuditRejected.into()) })
        .method("checksum", required(), |_: &Bank, _inv| -> Result<(), _> { Err(Corrupted.into()) })
        .method("explode", required(), |_: &Bank, _inv| -> Result<(), _> { panic!("vault door jammed") })
        .method("wrapped", required(), |_: &Bank, _inv| -> Result<(), _> {
            Err(SystemException::new(Overdrawn(1)).into())
        })
        .method("abandon", required(), |_: &Bank, inv| {
            inv.set_rollback_only()?;
            Ok(inv.rollback_only()?)
        })
        .method(
            "settle",
            MethodOptions::write().transaction(TransactionAttribute::Mandatory),
            |_: &Bank, _inv| Ok(()),
        )
        .method("tick", MethodOptions::write(), |bean: &Bank, inv| {
            let info: &String = inv.arg(0)?;
            assert_eq!(info, "nightly");
            bean.transfers.fetch_add(100, Ordering::SeqCst);
            Ok(())
        })
        .timeout_method("tick")
}

fn container_with(transactions: Arc<LocalTransactionManager>) -> SingletonContainer {
    SingletonContainer::builder().transactions(transactions).build().unwrap()
}

#[test]
fn test_application_exception_propagates_unchanged() {
    let tx = Arc::new(LocalTransactionManager::new());
    let container = container_with(tx.clone());
    container.deploy(bank().build().unwrap()).unwrap();

    let err = container.call::<()>("Bank", "BankLocal", "overdraw", Args::new()).unwrap_err();
    assert!(err.is_application());
    assert_eq!(err.application_error::<Overdrawn>().unwrap().0, 7);
    assert_eq!(err.to_string(), "account 7 is overdrawn");

    // No rollback flag: the transaction still commits.
    assert_eq!(tx.begun(), 1);
    assert_eq!(tx.committed(), 1);
    assert_eq!(tx.rolled_back(), 0);
    container.shutdown();
}

#[test]
fn test_flagged_application_exception_rolls_back() {
    let tx = Arc::new(LocalTransactionManager::new());
    let container = container_with(tx.clone());
    container.deploy(bank().build().unwrap()).unwrap();

    let err = container.call::<()>("Bank", "BankLocal", "audit", Args::new()).unwrap_err();
    assert!(err.application_error::<AuditRejected>().is_some());
    assert_eq!(tx.rolled_back(), 1);
    assert_eq!(tx.committed(), 0);
    container.shutdown();
}

#[test]
fn test_system_exceptions_are_wrapped_and_roll_back() {
    let tx = Arc::new(LocalTransactionManager::new());
    let container = container_with(tx.clone());
    container.deploy(bank().build().unwrap()).unwrap();

    for method in ["checksum", "explode", "wrapped"] {
        let err = container.call::<()>("Bank", "BankLocal", method, Args::new()).unwrap_err();
        assert!(err.is_system(), "{} should be a system exception", method);
        assert!(err.application_error::<Overdrawn>().is_none());
    }
    assert_eq!(tx.rolled_back(), 3);

    // The instance stays in service after system exceptions.
    assert_eq!(container.call::<usize>("Bank", "BankLocal", "transfer", Args::new()).unwrap(), 1);
    assert_eq!(tx.committed(), 1);
    container.shutdown();
}

#[test]
fn test_wrapped_system_exception_exposes_its_cause() {
    let container = container_with(Arc::new(LocalTransactionManager::new()));
    container.deploy(bank().build().unwrap()).unwrap();

    let err = container.call::<()>("Bank", "BankLocal", "wrapped", Args::new()).unwrap_err();
    match err {
        ContainerError::System { source, deployment_id, .. } => {
            assert_eq!(deployment_id, "Bank");
            assert!(source.downcast_ref::<Overdrawn>().is_some());
        }
        other => panic!("expected a system error, got {:?}", other),
    }
    container.shutdown();
}

#[test]
fn test_set_rollback_only_marks_the_transaction() {
    let tx = Arc::new(LocalTransactionManager::new());
    let container = container_with(tx.clone());
    container.deploy(bank().build().unwrap()).unwrap();

    assert!(container.call::<bool>("Bank", "BankLocal", "abandon", Args::new()).unwrap());
    assert_eq!(tx.rolled_back(), 1);
    container.shutdown();
}

#[test]
fn test_mandatory_without_caller_transaction_is_rejected() {
    let container = container_with(Arc::new(LocalTransactionManager::new()));
    container.deploy(bank().build().unwrap()).unwrap();

    let err = container.call::<()>("Bank", "BankLocal", "settle", Args::new()).unwrap_err();
    assert!(matches!(err, ContainerError::TransactionRequired { ref method } if method == "settle"));
    container.shutdown();
}

#[test]
fn test_unauthorized_caller_is_denied_before_the_bean_runs() {
    let security = Arc::new(
        RoleBasedSecurity::new()
            .permit("Bank", "transfer", ["teller"])
            .deny_all("Bank", "tick"),
    );
    let container = SingletonContainer::builder().security(security.clone()).build().unwrap();
    container.deploy(bank().build().unwrap()).unwrap();

    let err = container.call::<usize>("Bank", "BankLocal", "transfer", Args::new()).unwrap_err();
    assert!(err.is_access_denied());
    match err {
        ContainerError::AccessDenied { method, interface_type } => {
            assert_eq!(method, "transfer");
            assert_eq!(interface_type, InterfaceType::BusinessLocal);
        }
        other => panic!("expected access denied, got {:?}", other),
    }

    security.run_as(Principal::new("alice"), ["teller"]);
    assert_eq!(container.call::<usize>("Bank", "BankLocal", "transfer", Args::new()).unwrap(), 1);

    security.logout();
    let err = container.call::<()>("Bank", "BankLocal", "tick", Args::new().with("nightly".to_string()));
    assert!(err.unwrap_err().is_access_denied());
    container.shutdown();
}

#[test]
fn test_timer_callbacks_bypass_authorization() {
    let security = Arc::new(RoleBasedSecurity::new().deny_all("Bank", "tick"));
    let container = SingletonContainer::builder().security(security).build().unwrap();
    container.deploy(bank().build().unwrap()).unwrap();

    container.fire_timeout("Bank", "nightly".to_string()).unwrap();
    container.fire_timeout("Bank", "nightly".to_string()).unwrap();

    let deployment = container.deployment("Bank").unwrap();
    let instance = container.instance_manager().existing_instance(&deployment).unwrap();
    assert_eq!(instance.bean_as::<Bank>().unwrap().transfers.load(Ordering::SeqCst), 200);
    container.shutdown();
}

#[test]
fn test_timer_without_timeout_method_is_an_error() {
    let container = SingletonContainer::builder().build().unwrap();
    let deployment = DeploymentBuilder::new("Plain", || Ok(Bank::default()))
        .business_local("PlainLocal")
        .build()
        .unwrap();
    container.deploy(deployment).unwrap();

    let err = container.fire_timeout("Plain", ()).unwrap_err();
    assert!(matches!(err, ContainerError::NoSuchMethod { .. }));
    container.shutdown();
}

#[test]
fn test_home_and_component_views_never_touch_the_instance() {
    let constructed = Arc::new(AtomicUsize::new(0));
    let counter = constructed.clone();
    let deployment = DeploymentBuilder::new("Legacy", move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(Bank::default())
    })
    .home("LegacyHome")
    .local_home("LegacyLocalHome")
    .component("LegacyObject")
    .local_component("LegacyLocalObject")
    .method("transfer", MethodOptions::write(), |bean: &Bank, _inv| {
        Ok(bean.transfers.fetch_add(1, Ordering::SeqCst) + 1)
    })
    .build()
    .unwrap();

    let container = SingletonContainer::builder().build().unwrap();
    container.deploy(deployment).unwrap();

    let remote: ProxyRef = container.call("Legacy", "LegacyHome", "create", Args::new()).unwrap();
    assert_eq!(remote.interface_type, InterfaceType::EjbObject);
    assert_eq!(remote.interface_class, "LegacyObject");

    let local: ProxyRef = container.call("Legacy", "LegacyLocalHome", "createLedger", Args::new()).unwrap();
    assert_eq!(local.interface_type, InterfaceType::EjbLocalObject);
    assert_eq!(local.interface_class, "LegacyLocalObject");

    for method in ["remove", "getHandle", "getPrimaryKey", "isIdentical", "getEJBHome"] {
        container.call::<()>("Legacy", "LegacyObject", method, Args::new()).unwrap();
    }
    container.call::<()>("Legacy", "LegacyLocalObject", "getEJBLocalHome", Args::new()).unwrap();
    assert_eq!(constructed.load(Ordering::SeqCst), 0);

    // Business methods through a component view still dispatch.
    assert_eq!(container.call::<usize>("Legacy", "LegacyObject", "transfer", Args::new()).unwrap(), 1);
    assert_eq!(constructed.load(Ordering::SeqCst), 1);
    container.shutdown();
}

#[test]
fn test_nested_application_error_keeps_its_classification() {
    let tx = Arc::new(LocalTransactionManager::new());
    let container = container_with(tx.clone());
    container.deploy(bank().build().unwrap()).unwrap();

    let facade = DeploymentBuilder::new("Facade", || Ok(()))
        .business_local("FacadeLocal")
        .method("forward", MethodOptions::read(), |_: &(), inv| -> Result<(), _> {
            let container: &SingletonContainer = inv.arg(0)?;
            container.call::<()>("Bank", "BankLocal", "overdraw", Args::new())?;
            Ok(())
        })
        .build()
        .unwrap();
    container.deploy(facade).unwrap();

    let err = container
        .call::<()>("Facade", "FacadeLocal", "forward", Args::new().with(container.clone()))
        .unwrap_err();
    assert!(err.is_application());
    container.shutdown();
}

#[test]
fn test_unchecked_methods_ignore_role_requirements() {
    let security = Arc::new(
        RoleBasedSecurity::new()
            .permit("Bank", "transfer", ["teller"])
            .unchecked("Bank", "transfer")
            .permit("Bank", "abandon", ["auditor"])
            .unchecked("Bank", "settle")
            .deny_all("Bank", "settle"),
    );
    let container = SingletonContainer::builder().security(security).build().unwrap();
    container.deploy(bank().build().unwrap()).unwrap();

    assert_eq!(container.call::<usize>("Bank", "BankLocal", "transfer", Args::new()).unwrap(), 1);
    assert!(container
        .call::<bool>("Bank", "BankLocal", "abandon", Args::new())
        .unwrap_err()
        .is_access_denied());
    // Exclusion wins over unchecked.
    assert!(container
        .call::<()>("Bank", "BankLocal", "settle", Args::new())
        .unwrap_err()
        .is_access_denied());
    container.shutdown();
}

#[test]
fn test_run_as_identity_is_shared_across_threads() {
    use ferrous_singleton::SecurityService;

    let security = Arc::new(RoleBasedSecurity::new());
    let other = security.clone();
    std::thread::spawn(move || other.run_as(Principal::new("batch"), ["operator"]))
        .join()
        .unwrap();

    assert_eq!(security.caller_principal().name(), "batch");
    assert!(security.is_caller_in_role("operator"));
    security.logout();
    assert_eq!(security.caller_principal().name(), "guest");
}
