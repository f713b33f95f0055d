use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::{ApplyOutcome, ReplicaApplier};
use crate::bus::{BusError, Subscription};
use crate::replica::ReplicaStore;

/// What one drain pass did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    pub applied: usize,
    pub discarded: usize,
    /// Nacked for redelivery after a transient failure.
    pub retried: usize,
}

impl DrainReport {
    pub fn handled(&self) -> usize {
        self.applied + self.discarded + self.retried
    }
}

/// Feeds bus subscriptions into a [`ReplicaApplier`].
///
/// Ready messages from all subscriptions are applied in message-id order,
/// which is publish order across topics. A room created before its house is
/// deleted is therefore applied before the delete cascades.
///
/// Messages are acked once applied or discarded. A transient store failure
/// nacks the message and ends the pass, so nothing published after it is
/// applied first. The bus redelivers it on a later pass and parks it after
/// too many attempts.
///
/// Bus messages carry typed events, so there is no malformed case here;
/// undecodable input is only possible on the envelope path.
pub struct BusConsumer<R> {
    applier: ReplicaApplier<R>,
    subscriptions: Vec<Subscription>,
}

impl<R: ReplicaStore> BusConsumer<R> {
    pub fn new(applier: ReplicaApplier<R>) -> Self {
        Self {
            applier,
            subscriptions: Vec::new(),
        }
    }

    pub fn with_subscription(mut self, subscription: Subscription) -> Self {
        self.subscriptions.push(subscription);
        self
    }

    pub fn applier(&self) -> &ReplicaApplier<R> {
        &self.applier
    }

    /// Handle every ready message on every subscription, oldest first.
    pub fn drain(&self) -> Result<DrainReport, BusError> {
        let mut report = DrainReport::default();
        while let Some(subscription) = self.next_ready()? {
            let Some(message) = subscription.poll()? else {
                continue;
            };
            match self.applier.apply(&message.event) {
                Ok(ApplyOutcome::Applied) => {
                    subscription.ack(message.id)?;
                    report.applied += 1;
                }
                Ok(ApplyOutcome::Discarded) => {
                    subscription.ack(message.id)?;
                    report.discarded += 1;
                }
                Err(err) => {
                    warn!(
                        topic = subscription.topic(),
                        message_id = message.id,
                        delivery_count = message.delivery_count,
                        error = %err,
                        "apply failed, message will be redelivered"
                    );
                    subscription.nack(message.id, &err.to_string())?;
                    report.retried += 1;
                    break;
                }
            }
        }
        Ok(report)
    }

    /// The subscription holding the lowest ready message id.
    fn next_ready(&self) -> Result<Option<&Subscription>, BusError> {
        let mut next: Option<(u64, &Subscription)> = None;
        for subscription in &self.subscriptions {
            if let Some(id) = subscription.peek_id()? {
                if next.map_or(true, |(lowest, _)| id < lowest) {
                    next = Some((id, subscription));
                }
            }
        }
        Ok(next.map(|(_, subscription)| subscription))
    }

    /// Drain every `poll_interval` until `shutdown` is cancelled.
    pub async fn run(&self, poll_interval: Duration, shutdown: CancellationToken) {
        info!(subscriptions = self.subscriptions.len(), "bus consumer started");
        loop {
            if let Err(err) = self.drain() {
                error!(error = %err, "bus drain failed");
            }
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }
        info!("bus consumer stopped");
    }
}
