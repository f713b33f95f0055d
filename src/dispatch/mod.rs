//! Dispatcher - drains the outbox into a publisher.
//!
//! Each cycle scans a batch of deliverable records (oldest first) and hands
//! them to the publisher one at a time. The outcome of every record is
//! written back before the next one is attempted:
//!
//! - success marks the record delivered;
//! - failure bumps `retry_count` and stores the error. Once the count reaches
//!   `max_retries` the record drops out of future scans and is reported as
//!   exhausted.
//!
//! Nothing is ever deleted, so a crash mid-batch only causes redelivery.

mod handle;

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::DispatcherConfig;
use crate::error::StoreError;
use crate::outbox::OutboxRecord;
use crate::publish::{PublishError, Publisher};
use crate::source::SourceStore;

pub use handle::{DispatcherHandle, DispatcherStats};

/// Outcome of a single dispatch cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    /// Records returned by the scan.
    pub scanned: usize,
    pub delivered: usize,
    /// Failed attempts, including the ones that exhausted a record.
    pub failed: usize,
    /// Records whose retry budget ran out during this cycle.
    pub exhausted: usize,
}

impl CycleReport {
    pub fn is_idle(&self) -> bool {
        self.scanned == 0
    }
}

pub struct Dispatcher<S, P> {
    store: Arc<S>,
    publisher: P,
    config: DispatcherConfig,
}

impl<S, P> Dispatcher<S, P>
where
    S: SourceStore,
    P: Publisher,
{
    pub fn new(store: Arc<S>, publisher: P) -> Self {
        Self {
            store,
            publisher,
            config: DispatcherConfig::default(),
        }
    }

    /// Zero batch sizes, retry caps or timings would stall delivery, so they
    /// are raised to 1 with a warning.
    pub fn with_config(mut self, config: DispatcherConfig) -> Self {
        if let Err(err) = config.validate() {
            warn!(error = %err, "invalid dispatcher config, zero settings raised to 1");
        }
        self.config = config.clamped();
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Run one scan-and-deliver pass.
    ///
    /// Only a failed scan is returned as an error. A record whose outcome
    /// cannot be written back is logged and left as it was; it will be picked
    /// up again by a later scan.
    pub async fn run_cycle(&self) -> Result<CycleReport, StoreError> {
        let records = self
            .store
            .scan_outbox(self.config.batch_size, self.config.max_retries)?;

        let mut report = CycleReport {
            scanned: records.len(),
            ..CycleReport::default()
        };

        for record in records {
            let id = record.id;
            if let Err(err) = self.dispatch(record, &mut report).await {
                error!(record_id = id, error = %err, "failed to record delivery outcome");
            }
        }

        if !report.is_idle() {
            debug!(
                scanned = report.scanned,
                delivered = report.delivered,
                failed = report.failed,
                exhausted = report.exhausted,
                "dispatch cycle finished"
            );
        }
        Ok(report)
    }

    async fn dispatch(
        &self,
        record: OutboxRecord,
        report: &mut CycleReport,
    ) -> Result<(), StoreError> {
        match self.publish(&record).await {
            Ok(()) => {
                self.store.mark_delivered(record.id, Utc::now())?;
                report.delivered += 1;
                debug!(record_id = record.id, event_type = %record.event_type, "record delivered");
            }
            Err(err) => {
                let updated = self.store.mark_failed(record.id, &err.to_string())?;
                report.failed += 1;
                if updated.is_exhausted(self.config.max_retries) {
                    report.exhausted += 1;
                    error!(
                        record_id = updated.id,
                        event_type = %updated.event_type,
                        retry_count = updated.retry_count,
                        error = %err,
                        "record exhausted its retries and will no longer be dispatched"
                    );
                } else {
                    warn!(
                        record_id = updated.id,
                        event_type = %updated.event_type,
                        retry_count = updated.retry_count,
                        error = %err,
                        "delivery failed"
                    );
                }
            }
        }
        Ok(())
    }

    async fn publish(&self, record: &OutboxRecord) -> Result<(), PublishError> {
        let event = record
            .decode()
            .map_err(|err| PublishError::SerializationFailed(err.to_string()))?;

        let timeout = self.config.publish_timeout();
        match tokio::time::timeout(timeout, self.publisher.publish(&event)).await {
            Ok(result) => result,
            Err(_) => Err(PublishError::Timeout(timeout)),
        }
    }

    /// Run cycles until `shutdown` is cancelled, sleeping `poll_interval`
    /// between them. Cancellation is observed between cycles and while
    /// sleeping; a cycle in progress finishes its current record first.
    pub async fn run(&self, shutdown: CancellationToken) -> DispatcherStats {
        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            batch_size = self.config.batch_size,
            max_retries = self.config.max_retries,
            "dispatcher started"
        );

        let mut stats = DispatcherStats::default();
        while !shutdown.is_cancelled() {
            stats.cycles += 1;
            match self.run_cycle().await {
                Ok(report) => stats.absorb(&report),
                Err(err) => error!(error = %err, "outbox scan failed"),
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.config.poll_interval()) => {}
            }
        }

        info!(
            cycles = stats.cycles,
            delivered = stats.delivered,
            failed = stats.failed,
            exhausted = stats.exhausted,
            "dispatcher stopped"
        );
        stats
    }
}

impl<S, P> Dispatcher<S, P>
where
    S: SourceStore + 'static,
    P: Publisher + 'static,
{
    /// Move the dispatcher onto a tokio task.
    pub fn spawn(self) -> DispatcherHandle {
        DispatcherHandle::spawn(self)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::event::SyncEvent;
    use crate::model::HouseInput;
    use crate::publish::RecordingPublisher;
    use crate::source::InMemorySourceStore;
    use crate::writer::HouseService;

    fn seeded(houses: usize) -> Arc<InMemorySourceStore> {
        let store = InMemorySourceStore::new();
        let service = HouseService::new(store.clone());
        for i in 0..houses {
            service
                .create_house(HouseInput::new(format!("house {i}"), 10.0))
                .unwrap();
        }
        Arc::new(store)
    }

    fn config(max_retries: u32) -> DispatcherConfig {
        DispatcherConfig {
            poll_interval_ms: 10,
            batch_size: 50,
            max_retries,
            publish_timeout_ms: 50,
        }
    }

    #[tokio::test]
    async fn delivers_in_creation_order() {
        let store = seeded(3);
        let publisher = RecordingPublisher::new();
        let dispatcher = Dispatcher::new(store.clone(), publisher.clone()).with_config(config(5));

        let report = dispatcher.run_cycle().await.unwrap();
        assert_eq!(report.scanned, 3);
        assert_eq!(report.delivered, 3);

        let ids: Vec<i64> = publisher.published().iter().map(SyncEvent::entity_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(store.outbox_records().unwrap().iter().all(|r| r.delivered));

        let report = dispatcher.run_cycle().await.unwrap();
        assert!(report.is_idle());
    }

    #[tokio::test]
    async fn failure_is_recorded_and_retried() {
        let store = seeded(1);
        let publisher = RecordingPublisher::new();
        publisher.fail_next(1, PublishError::ConnectionFailed("refused".into()));
        let dispatcher = Dispatcher::new(store.clone(), publisher.clone()).with_config(config(5));

        let report = dispatcher.run_cycle().await.unwrap();
        assert_eq!((report.delivered, report.failed), (0, 1));

        let record = store.outbox_record(1).unwrap().unwrap();
        assert_eq!(record.retry_count, 1);
        assert!(record.last_error.unwrap().contains("refused"));

        let report = dispatcher.run_cycle().await.unwrap();
        assert_eq!(report.delivered, 1);
        let record = store.outbox_record(1).unwrap().unwrap();
        assert!(record.delivered);
        assert!(record.last_error.is_none());
    }

    #[tokio::test]
    async fn zero_settings_do_not_stall_delivery() {
        let store = seeded(2);
        let publisher = RecordingPublisher::new();
        let dispatcher = Dispatcher::new(store.clone(), publisher.clone()).with_config(
            DispatcherConfig {
                batch_size: 0,
                max_retries: 0,
                ..config(5)
            },
        );
        assert_eq!(dispatcher.config().batch_size, 1);
        assert_eq!(dispatcher.config().max_retries, 1);

        assert_eq!(dispatcher.run_cycle().await.unwrap().delivered, 1);
        assert_eq!(dispatcher.run_cycle().await.unwrap().delivered, 1);
        assert_eq!(publisher.published().len(), 2);
    }

    #[tokio::test]
    async fn exhausted_records_leave_the_scan_set() {
        let store = seeded(1);
        let publisher = RecordingPublisher::new();
        publisher.fail_always(PublishError::Other("down".into()));
        let dispatcher = Dispatcher::new(store.clone(), publisher.clone()).with_config(config(2));

        assert_eq!(dispatcher.run_cycle().await.unwrap().exhausted, 0);
        assert_eq!(dispatcher.run_cycle().await.unwrap().exhausted, 1);
        assert!(dispatcher.run_cycle().await.unwrap().is_idle());

        assert_eq!(publisher.attempts(), 2);
        assert_eq!(store.stuck_records(2).unwrap().len(), 1);
    }

    struct Hanging;

    #[async_trait]
    impl Publisher for Hanging {
        async fn publish(&self, _event: &SyncEvent) -> Result<(), PublishError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn hung_publish_times_out() {
        let store = seeded(1);
        let dispatcher = Dispatcher::new(store.clone(), Hanging).with_config(config(5));

        let report = dispatcher.run_cycle().await.unwrap();
        assert_eq!(report.failed, 1);
        let record = store.outbox_record(1).unwrap().unwrap();
        assert!(record.last_error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn run_stops_on_cancel() {
        let store = seeded(2);
        let publisher = RecordingPublisher::new();
        let dispatcher = Dispatcher::new(store, publisher.clone()).with_config(config(5));
        let token = CancellationToken::new();

        let stopper = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            stopper.cancel();
        });

        let stats = dispatcher.run(token).await;
        assert!(stats.cycles >= 1);
        assert_eq!(stats.delivered, 2);
        assert_eq!(publisher.published().len(), 2);
    }
}
