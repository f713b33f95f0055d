//! Publishers - hand one event to a transport.
//!
//! Two transports share one trait so the dispatcher never knows which is in use:
//!
//! - [`TopicPublisher`] publishes onto the entity type's topic of a message bus.
//! - [`HttpPublisher`] POSTs a [`SyncEnvelope`] straight to the replica's sync
//!   endpoint; any non-2xx answer is a failed delivery.
//!
//! Every [`PublishError`] is retryable: the dispatcher records it on the
//! outbox row and tries again next cycle.
//!
//! [`SyncEnvelope`]: crate::event::SyncEnvelope

#[cfg(feature = "http")]
mod http;
mod recording;
#[cfg(feature = "bus")]
mod topic;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[cfg(all(feature = "bus", feature = "http"))]
use crate::config::{ConfigError, TransportConfig};
use crate::event::SyncEvent;

#[cfg(feature = "http")]
pub use http::HttpPublisher;
pub use recording::RecordingPublisher;
#[cfg(feature = "bus")]
pub use topic::TopicPublisher;

/// Delivery failure reported to the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("serialization failed: {0}")]
    SerializationFailed(String),

    #[error("rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("publish timed out after {0:?}")]
    Timeout(Duration),

    #[error("publish error: {0}")]
    Other(String),
}

/// Deliver one event to a transport.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, event: &SyncEvent) -> Result<(), PublishError>;
}

#[async_trait]
impl<P: Publisher + ?Sized> Publisher for Arc<P> {
    async fn publish(&self, event: &SyncEvent) -> Result<(), PublishError> {
        (**self).publish(event).await
    }
}

/// Build the publisher selected by the deployment's transport configuration.
#[cfg(all(feature = "bus", feature = "http"))]
pub fn from_config(
    transport: &TransportConfig,
    bus: Option<crate::bus::InMemoryTopicBus>,
    timeout: Duration,
) -> Result<Arc<dyn Publisher>, ConfigError> {
    match transport {
        TransportConfig::Topic => {
            let bus = bus.ok_or_else(|| {
                ConfigError::Invalid("topic transport requires a message bus".into())
            })?;
            Ok(Arc::new(TopicPublisher::new(bus)))
        }
        TransportConfig::Http { endpoint } => {
            let publisher = HttpPublisher::new(endpoint.clone(), timeout)
                .map_err(|err| ConfigError::Invalid(err.to_string()))?;
            Ok(Arc::new(publisher))
        }
    }
}
