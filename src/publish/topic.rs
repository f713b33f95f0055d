use async_trait::async_trait;

use super::{PublishError, Publisher};
use crate::bus::MessageBus;
use crate::event::SyncEvent;

/// Publishes each event onto the topic of its entity type.
pub struct TopicPublisher<B> {
    bus: B,
}

impl<B: MessageBus> TopicPublisher<B> {
    pub fn new(bus: B) -> Self {
        Self { bus }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
}

#[async_trait]
impl<B: MessageBus> Publisher for TopicPublisher<B> {
    async fn publish(&self, event: &SyncEvent) -> Result<(), PublishError> {
        let topic = event.entity_type().topic();
        self.bus
            .publish(topic, event.clone())
            .map(|_| ())
            .map_err(|err| PublishError::ConnectionFailed(err.to_string()))
    }
}
