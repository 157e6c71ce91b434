#![no_main]

use ferrous_singleton::{Args, DeploymentBuilder, LockType, MethodOptions, SingletonContainer};
use libfuzzer_sys::fuzz_target;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Default)]
struct Tally {
    reads: AtomicUsize,
    writes: AtomicUsize,
}

fuzz_target!(|data: &[u8]| {
    if data.is_empty() || data.len() > 64 {
        return;
    }

    let deployment = DeploymentBuilder::new("Tally", || Ok(Tally::default()))
        .business_local("TallyLocal")
        .access_timeout(Duration::from_secs(5))
        .method("read", MethodOptions::read(), |bean: &Tally, _inv| {
            Ok(bean.reads.fetch_add(1, Ordering::SeqCst))
        })
        .method("write", MethodOptions::write(), |bean: &Tally, _inv| {
            Ok(bean.writes.fetch_add(1, Ordering::SeqCst))
        })
        .build()
        .unwrap();
    let container = SingletonContainer::builder().build().unwrap();
    container.deploy(deployment).unwrap();

    let schedule: Vec<LockType> = data
        .iter()
        .map(|byte| if byte % 2 == 0 { LockType::Read } else { LockType::Write })
        .collect();

    std::thread::scope(|s| {
        for chunk in schedule.chunks(8) {
            let container = &container;
            s.spawn(move || {
                for lock_type in chunk {
                    let method = match lock_type {
                        LockType::Read => "read",
                        LockType::Write => "write",
                    };
                    container.call::<usize>("Tally", "TallyLocal", method, Args::new()).unwrap();
                }
            });
        }
    });

    let reads = schedule.iter().filter(|t| **t == LockType::Read).count();
    let deployment = container.deployment("Tally").unwrap();
    let instance = container.instance_manager().existing_instance(&deployment).unwrap();
    let tally = instance.bean_as::<Tally>().unwrap();
    assert_eq!(tally.reads.load(Ordering::SeqCst), reads);
    assert_eq!(tally.writes.load(Ordering::SeqCst), schedule.len() - reads);
    container.shutdown();
});
