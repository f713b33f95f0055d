use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::{PublishError, Publisher};
use crate::event::{SyncEnvelope, SyncEvent};

/// POSTs each event as a [`SyncEnvelope`] to a fixed sync endpoint.
///
/// There is no broker in between, so nothing queues or redelivers on the
/// remote side; a non-2xx answer leaves the outbox row for the next cycle.
pub struct HttpPublisher {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpPublisher {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, PublishError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| PublishError::Other(err.to_string()))?;
        Ok(Self::with_client(client, endpoint))
    }

    pub fn with_client(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Publisher for HttpPublisher {
    async fn publish(&self, event: &SyncEvent) -> Result<(), PublishError> {
        let envelope = SyncEnvelope::from_event(event)
            .map_err(|err| PublishError::SerializationFailed(err.to_string()))?;

        let response = self
            .client
            .post(&self.endpoint)
            .json(&envelope)
            .send()
            .await
            .map_err(|err| PublishError::ConnectionFailed(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            debug!(endpoint = %self.endpoint, event_type = %envelope.event_type, "envelope accepted");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(PublishError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}
