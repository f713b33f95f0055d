//! Shared fixtures for the integration suites.

#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use house_sync::{
    DispatcherConfig, HouseService, InMemoryReplicaStore, InMemorySourceStore, ReplicaApplier,
    SyncEvent,
};

/// Install a test subscriber once. Set `RUST_LOG=house_sync=debug` to see output.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Dispatcher settings small enough for tests.
pub fn fast_config(max_retries: u32) -> DispatcherConfig {
    DispatcherConfig {
        poll_interval_ms: 5,
        batch_size: 50,
        max_retries,
        publish_timeout_ms: 1_000,
    }
}

/// Source side: a store and a house service writing to it.
pub struct Registry {
    pub store: InMemorySourceStore,
    pub service: HouseService<InMemorySourceStore>,
}

impl Registry {
    pub fn new() -> Self {
        let store = InMemorySourceStore::new();
        Self {
            service: HouseService::new(store.clone()),
            store,
        }
    }

    pub fn shared_store(&self) -> Arc<InMemorySourceStore> {
        Arc::new(self.store.clone())
    }
}

/// Replica side: a store and the applier writing to it.
pub fn replica() -> (InMemoryReplicaStore, ReplicaApplier<InMemoryReplicaStore>) {
    let store = InMemoryReplicaStore::new();
    (store.clone(), ReplicaApplier::new(store))
}

pub fn apply_all(applier: &ReplicaApplier<InMemoryReplicaStore>, events: &[SyncEvent]) {
    for event in events {
        applier.apply(event).unwrap();
    }
}

/// Poll `condition` until it holds or two seconds pass.
pub async fn eventually<F, Fut>(mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..400 {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}
