//! Contract Test: Concurrent reservations
//!
//! Many deployments share one address table. The store's unique index is
//! the only authority on availability.
//!
//! Constraints verified:
//! - Concurrent explicit reservations of one address: exactly one wins
//! - Concurrent dynamic allocations never hand out the same address
//! - A lost save is retried against fresh state and never surfaces
//!
//! If this test fails, two instances can end up sharing an address.

mod common;

use std::collections::HashSet;
use std::sync::Arc;

use common::*;
use netplace_core::reservation::NetworkReservation;
use netplace_core::store::MemoryRecordStore;
use netplace_core::traits::IpRecordStore;
use netplace_core::{DatabaseIpRepo, Error, InMemoryIpRepo, IpRepo};

async fn race_for_one_address(repo: Arc<dyn IpRepo>) -> (usize, usize) {
    let mut handles = Vec::new();
    for n in 0..16 {
        let repo = repo.clone();
        handles.push(tokio::spawn(async move {
            let reservation = NetworkReservation::new_static(instance(&format!("vm-{}", n)), "private", ip("10.0.0.5"));
            repo.add(&reservation).await
        }));
    }

    let (mut won, mut in_use) = (0, 0);
    for handle in handles {
        match handle.await.expect("task completes") {
            Ok(()) => won += 1,
            Err(Error::AlreadyInUse(_)) => in_use += 1,
            Err(other) => panic!("unexpected error: {}", other),
        }
    }
    (won, in_use)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn exactly_one_explicit_reservation_wins_in_shared_store() {
    let repo = Arc::new(DatabaseIpRepo::new(Arc::new(MemoryRecordStore::new()), task()));
    assert_eq!(race_for_one_address(repo).await, (1, 15));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn exactly_one_explicit_reservation_wins_in_memory() {
    let repo = Arc::new(InMemoryIpRepo::new());
    assert_eq!(race_for_one_address(repo).await, (1, 15));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_dynamic_allocations_are_unique() {
    let store = Arc::new(MemoryRecordStore::new());
    let subnet = Arc::new(private_subnet());

    let mut handles = Vec::new();
    for deployment in 0..4 {
        // Each deployment has its own repo over the shared store
        let repo = DatabaseIpRepo::new(store.clone(), task());
        let subnet = subnet.clone();
        handles.push(tokio::spawn(async move {
            let mut ips = Vec::new();
            for n in 0..10 {
                let id = format!("d{}-vm-{}", deployment, n);
                let reservation = NetworkReservation::new_dynamic(instance(&id), "private");
                let address = repo
                    .allocate_dynamic_ip(&reservation, &subnet)
                    .await
                    .expect("store available")
                    .expect("subnet has room");
                ips.push(address);
            }
            ips
        }));
    }

    let mut seen = HashSet::new();
    for handle in handles {
        for address in handle.await.expect("task completes") {
            assert!(seen.insert(address), "address {} handed out twice", address);
            assert_ne!(address.ip(), ip("10.0.0.5"));
        }
    }
    assert_eq!(seen.len(), 40);
    assert_eq!(store.len().await, 40);
}

#[tokio::test]
async fn lost_dynamic_race_retries_on_next_address() {
    let store = Arc::new(ConflictInjectingStore::new(1, "vm-other"));
    let repo = DatabaseIpRepo::new(store.clone(), task());

    let reservation = NetworkReservation::new_dynamic(instance("vm-1"), "private");
    let allocated = repo
        .allocate_dynamic_ip(&reservation, &private_subnet())
        .await
        .unwrap();

    assert_eq!(allocated, Some(cidr("10.0.0.3/32")));
    assert_eq!(store.injected(), 1);

    let winner = store.find(cidr("10.0.0.2/32"), "private").await.unwrap().unwrap();
    assert_eq!(winner.instance_id, "vm-other");
    let mine = store.find(cidr("10.0.0.3/32"), "private").await.unwrap().unwrap();
    assert_eq!(mine.instance_id, "vm-1");
}

#[tokio::test]
async fn lost_explicit_race_is_already_in_use() {
    let store = Arc::new(ConflictInjectingStore::new(1, "vm-other"));
    let repo = DatabaseIpRepo::new(store, task());

    let reservation = NetworkReservation::new_static(instance("vm-1"), "private", ip("10.0.0.5"));
    let err = repo.add(&reservation).await.unwrap_err();
    assert!(matches!(err, Error::AlreadyInUse(_)));
    assert!(err.to_string().contains("vm-other"));
}
