use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::{EventError, SyncEvent};

/// One row of the outbox table: a domain event awaiting or having completed delivery.
///
/// `event_type` and `payload` are written once, in the same transaction as the
/// mutation they describe, and never change afterwards. Only the delivery
/// bookkeeping fields are updated by the dispatcher.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OutboxRecord {
    pub id: u64,
    pub event_type: String,
    pub payload: String,
    pub created_at: DateTime<Utc>,
    pub delivered: bool,
    pub delivered_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub last_error: Option<String>,
}

impl OutboxRecord {
    pub fn new(id: u64, entry: OutboxEntry, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            event_type: entry.event_type,
            payload: entry.payload,
            created_at,
            delivered: false,
            delivered_at: None,
            retry_count: 0,
            last_error: None,
        }
    }

    /// Eligible for the next dispatcher scan.
    pub fn is_pending(&self, max_retries: u32) -> bool {
        !self.delivered && self.retry_count < max_retries
    }

    /// Undelivered and out of retries; no scan will pick it up again.
    pub fn is_exhausted(&self, max_retries: u32) -> bool {
        !self.delivered && self.retry_count >= max_retries
    }

    pub fn decode(&self) -> Result<SyncEvent, EventError> {
        SyncEvent::decode(&self.event_type, &self.payload)
    }

    pub(crate) fn mark_delivered(&mut self, at: DateTime<Utc>) {
        self.delivered = true;
        self.delivered_at = Some(at);
        self.last_error = None;
    }

    pub(crate) fn mark_failed(&mut self, error: &str) {
        self.retry_count = self.retry_count.saturating_add(1);
        self.last_error = Some(error.to_string());
    }
}

/// An outbox row that has not been inserted yet.
#[derive(Clone, Debug, PartialEq)]
pub struct OutboxEntry {
    pub event_type: String,
    pub payload: String,
}

impl OutboxEntry {
    pub fn for_event(event: &SyncEvent) -> Result<Self, EventError> {
        Ok(Self {
            event_type: event.kind().as_str().to_string(),
            payload: event.payload()?,
        })
    }
}
