//! Dispatcher retry bookkeeping, ordering and lifecycle.

mod support;

use house_sync::{
    Dispatcher, DispatcherConfig, HouseInput, PublishError, RecordingPublisher, SourceStore,
    SyncEvent,
};

use support::{eventually, fast_config, Registry};

fn seeded(houses: usize) -> Registry {
    let registry = Registry::new();
    for i in 0..houses {
        registry
            .service
            .create_house(HouseInput::new(format!("house {i}"), 40.0))
            .unwrap();
    }
    registry
}

#[tokio::test]
async fn delivery_is_eventually_at_least_once() {
    support::init_tracing();
    let registry = seeded(3);
    let publisher = RecordingPublisher::new();
    publisher.fail_next(4, PublishError::ConnectionFailed("broker down".into()));

    let dispatcher =
        Dispatcher::new(registry.shared_store(), publisher.clone()).with_config(fast_config(5));

    let mut cycles = 0;
    while registry.store.pending_count(5).unwrap() > 0 {
        dispatcher.run_cycle().await.unwrap();
        cycles += 1;
        assert!(cycles < 10, "records never delivered");
    }

    let records = registry.store.outbox_records().unwrap();
    assert!(records.iter().all(|record| record.delivered));
    assert!(records.iter().all(|record| record.last_error.is_none()));
    assert_eq!(publisher.published().len(), 3);
    assert_eq!(publisher.attempts(), 7);
}

#[tokio::test]
async fn retry_cap_excludes_record_from_scans() {
    let registry = seeded(1);
    let publisher = RecordingPublisher::new();
    publisher.fail_always(PublishError::Rejected {
        status: 500,
        body: "boom".into(),
    });
    let dispatcher =
        Dispatcher::new(registry.shared_store(), publisher.clone()).with_config(fast_config(3));

    let mut exhausted = 0;
    for _ in 0..6 {
        exhausted += dispatcher.run_cycle().await.unwrap().exhausted;
    }

    assert_eq!(exhausted, 1);
    assert_eq!(publisher.attempts(), 3);
    assert_eq!(registry.store.pending_count(3).unwrap(), 0);

    let stuck = registry.store.stuck_records(3).unwrap();
    assert_eq!(stuck.len(), 1);
    assert_eq!(stuck[0].retry_count, 3);
    assert!(!stuck[0].delivered);
    assert!(stuck[0].last_error.as_deref().unwrap().contains("500"));
}

#[tokio::test]
async fn reset_retries_requeues_a_stuck_record() {
    let registry = seeded(1);
    let publisher = RecordingPublisher::new();
    publisher.fail_always(PublishError::Other("down".into()));
    let dispatcher =
        Dispatcher::new(registry.shared_store(), publisher.clone()).with_config(fast_config(1));

    dispatcher.run_cycle().await.unwrap();
    let stuck = registry.store.stuck_records(1).unwrap();
    assert_eq!(stuck.len(), 1);

    publisher.recover();
    registry.store.reset_retries(stuck[0].id).unwrap();
    assert_eq!(dispatcher.run_cycle().await.unwrap().delivered, 1);
    assert!(registry.store.stuck_records(1).unwrap().is_empty());
}

#[tokio::test]
async fn batch_size_bounds_a_cycle_and_keeps_creation_order() {
    let registry = seeded(5);
    let publisher = RecordingPublisher::new();
    let dispatcher = Dispatcher::new(registry.shared_store(), publisher.clone()).with_config(
        DispatcherConfig {
            batch_size: 2,
            ..fast_config(5)
        },
    );

    let report = dispatcher.run_cycle().await.unwrap();
    assert_eq!((report.scanned, report.delivered), (2, 2));
    assert_eq!(registry.store.pending_count(5).unwrap(), 3);

    dispatcher.run_cycle().await.unwrap();
    dispatcher.run_cycle().await.unwrap();

    let ids: Vec<i64> = publisher
        .published()
        .iter()
        .map(SyncEvent::entity_id)
        .collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn failed_record_does_not_block_the_rest_of_the_batch() {
    let registry = seeded(3);
    let publisher = RecordingPublisher::new();
    publisher.fail_next(1, PublishError::ConnectionFailed("reset".into()));
    let dispatcher =
        Dispatcher::new(registry.shared_store(), publisher.clone()).with_config(fast_config(5));

    let report = dispatcher.run_cycle().await.unwrap();
    assert_eq!((report.delivered, report.failed), (2, 1));

    let first = registry.store.outbox_record(1).unwrap().unwrap();
    assert!(!first.delivered);
    assert_eq!(first.retry_count, 1);

    dispatcher.run_cycle().await.unwrap();
    let ids: Vec<i64> = publisher
        .published()
        .iter()
        .map(SyncEvent::entity_id)
        .collect();
    assert_eq!(ids, vec![2, 3, 1]);
}

#[tokio::test]
async fn spawned_dispatcher_picks_up_new_records_and_reports_stats() {
    support::init_tracing();
    let registry = Registry::new();
    let publisher = RecordingPublisher::new();
    let handle = Dispatcher::new(registry.shared_store(), publisher.clone())
        .with_config(fast_config(5))
        .spawn();

    registry
        .service
        .create_house(HouseInput::new("Lakeview", 120.0))
        .unwrap();
    registry
        .service
        .create_house(HouseInput::new("Hillside", 90.0))
        .unwrap();

    let delivered = eventually(|| {
        let publisher = publisher.clone();
        async move { publisher.published().len() == 2 }
    })
    .await;
    assert!(delivered);

    let stats = handle.stop().await;
    assert_eq!(stats.delivered, 2);
    assert_eq!(stats.failed, 0);
    assert!(stats.cycles >= 1);
}

#[tokio::test]
async fn independent_dispatchers_do_not_share_state() {
    let first = seeded(1);
    let second = seeded(2);
    let (p1, p2) = (RecordingPublisher::new(), RecordingPublisher::new());

    let d1 = Dispatcher::new(first.shared_store(), p1.clone()).with_config(fast_config(5));
    let d2 = Dispatcher::new(second.shared_store(), p2.clone()).with_config(fast_config(5));
    let (r1, r2) = tokio::join!(d1.run_cycle(), d2.run_cycle());

    assert_eq!(r1.unwrap().delivered, 1);
    assert_eq!(r2.unwrap().delivered, 2);
    assert_eq!((p1.published().len(), p2.published().len()), (1, 2));
}
