//! Concurrent reconciliation tests.
//!
//! Requests race on one shared store; afterwards the graph must look as if
//! they ran one at a time.

use std::sync::{Arc, Barrier};
use std::thread;

use contactgraph::{
    check_invariants, ContactStore, InMemoryContactStore, Reconciler, ReconcilerConfig, ReconcileRuntime, RuntimeConfig,
};

fn setup() -> (Arc<InMemoryContactStore>, Arc<Reconciler>) {
    let store = Arc::new(InMemoryContactStore::new());
    let config = ReconcilerConfig {
        max_attempts: 50,
        ..ReconcilerConfig::default()
    };
    let reconciler = Reconciler::with_config(store.clone(), config).unwrap();
    (store, Arc::new(reconciler))
}

fn s(v: &str) -> Option<String> {
    Some(v.to_string())
}

fn assert_single_primary(store: &InMemoryContactStore) {
    let contacts = store.all_contacts().unwrap();
    assert!(check_invariants(&contacts).is_empty());
    assert_eq!(contacts.iter().filter(|c| c.is_primary()).count(), 1);
}

/// Runs `requests` on one thread each, released together.
fn race(reconciler: &Arc<Reconciler>, requests: Vec<(Option<String>, Option<String>)>) {
    let barrier = Arc::new(Barrier::new(requests.len()));
    let handles: Vec<_> = requests
        .into_iter()
        .map(|(email, phone)| {
            let reconciler = Arc::clone(reconciler);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                reconciler.reconcile(email, phone)
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap().unwrap();
    }
}

#[test]
fn test_identical_first_requests_create_one_primary() {
    for _ in 0..10 {
        let (store, r) = setup();
        race(&r, (0..16).map(|_| (s("doc@hillvalley.edu"), s("88"))).collect());

        assert_eq!(store.len().unwrap(), 1);
        assert_single_primary(&store);
    }
}

#[test]
fn test_overlapping_first_requests_form_one_cluster() {
    let (store, r) = setup();
    // Each request shares a value with the next one.
    let requests = (0..12)
        .map(|i| (Some(format!("user{i}@x")), Some(format!("{}", i / 2))))
        .chain((0..6).map(|i| (Some(format!("user{}@x", 2 * i + 1)), Some(format!("{}", i + 1)))))
        .collect();
    race(&r, requests);

    assert_single_primary(&store);
    let view = r.reconcile(s("user0@x"), None).unwrap();
    assert_eq!(view.size(), store.len().unwrap());
}

#[test]
fn test_concurrent_bridges_leave_one_primary() {
    let (store, r) = setup();
    let ids: Vec<_> = (0..8)
        .map(|i| r.reconcile(Some(format!("p{i}@x")), Some(format!("{i}"))).unwrap().primary_id)
        .collect();

    // Bridge every neighbouring pair at once.
    race(
        &r,
        (0..7).map(|i| (Some(format!("p{i}@x")), Some(format!("{}", i + 1)))).collect(),
    );

    assert_single_primary(&store);
    let view = r.reconcile(s("p7@x"), None).unwrap();
    assert_eq!(view.primary_id, ids[0]);
    assert_eq!(view.secondary_ids, ids[1..].to_vec());
    assert_eq!(store.len().unwrap(), 8);
}

#[test]
fn test_runtime_workers_share_the_store_safely() {
    let (store, r) = setup();
    let reconciler = Arc::try_unwrap(r).unwrap();
    let runtime = ReconcileRuntime::new(
        reconciler,
        RuntimeConfig {
            workers: 4,
            queue_capacity: 64,
        },
    )
    .unwrap();

    let handles: Vec<_> = (0..40)
        .map(|i| {
            runtime
                .submit(contactgraph::ReconcileRequest::new(
                    Some(format!("w{}@x", i % 5)),
                    Some(format!("{}", i % 4)),
                ))
                .unwrap()
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let contacts = store.all_contacts().unwrap();
    assert!(check_invariants(&contacts).is_empty());
    assert_eq!(contacts.iter().filter(|c| c.is_primary()).count(), 1);
}
