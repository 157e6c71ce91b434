/// Property-based tests for instance locking
///
/// Whatever mix of READ and WRITE callers runs against an instance, a writer
/// is never inside the bean together with anyone else.

use ferrous_singleton::{ConcurrencyManagement, InstanceLock, LockType};
use proptest::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

fn lock_type() -> impl Strategy<Value = LockType> {
    prop_oneof![Just(LockType::Read), Just(LockType::Write)]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn writers_are_always_alone(callers in prop::collection::vec(lock_type(), 2..8)) {
        let lock = InstanceLock::for_concurrency(ConcurrencyManagement::Container);
        let readers = AtomicUsize::new(0);
        let writers = AtomicUsize::new(0);
        let violated = AtomicBool::new(false);

        thread::scope(|s| {
            for lock_type in &callers {
                let (lock, readers, writers, violated) = (&lock, &readers, &writers, &violated);
                s.spawn(move || {
                    let guard = lock.try_acquire(*lock_type, Duration::from_secs(10));
                    assert!(guard.is_some());
                    match lock_type {
                        LockType::Read => {
                            readers.fetch_add(1, Ordering::SeqCst);
                            if writers.load(Ordering::SeqCst) != 0 {
                                violated.store(true, Ordering::SeqCst);
                            }
                            thread::sleep(Duration::from_millis(2));
                            readers.fetch_sub(1, Ordering::SeqCst);
                        }
                        LockType::Write => {
                            let before = writers.fetch_add(1, Ordering::SeqCst);
                            if before != 0 || readers.load(Ordering::SeqCst) != 0 {
                                violated.store(true, Ordering::SeqCst);
                            }
                            thread::sleep(Duration::from_millis(2));
                            writers.fetch_sub(1, Ordering::SeqCst);
                        }
                    }
                    drop(guard);
                });
            }
        });

        prop_assert!(!violated.load(Ordering::SeqCst));
        prop_assert!(!lock.is_locked());
    }

    #[test]
    fn guard_reports_the_requested_lock_type(lock_type in lock_type()) {
        let managed = InstanceLock::for_concurrency(ConcurrencyManagement::Container);
        let guard = managed.try_acquire(lock_type, Duration::ZERO).unwrap();
        prop_assert_eq!(guard.lock_type(), Some(lock_type));
        drop(guard);

        let unmanaged = InstanceLock::for_concurrency(ConcurrencyManagement::Bean);
        let guard = unmanaged.try_acquire(lock_type, Duration::ZERO).unwrap();
        prop_assert_eq!(guard.lock_type(), None);
    }
}
