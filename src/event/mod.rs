//! Domain events - the contract between the house registry and its replicas.
//!
//! Every mutation of a replicated entity produces exactly one [`SyncEvent`].
//! The set of variants is closed, so every consumer matches exhaustively:
//!
//! ```text
//!             House            Room
//!          ┌──────────────┬──────────────┐
//! Created  │ HouseSnapshot│ RoomSnapshot │
//! Updated  │ HouseSnapshot│ RoomSnapshot │
//! Deleted  │ HouseRemoved │ RoomRemoved  │
//!          └──────────────┴──────────────┘
//! ```
//!
//! On the outbox the event is stored as an `event_type` discriminator plus the
//! JSON of the variant's payload. Over HTTP it travels inside a
//! [`SyncEnvelope`].

mod envelope;
mod payload;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::EntityType;

pub use envelope::SyncEnvelope;
pub use payload::{HouseRemoved, HouseSnapshot, RoomRemoved, RoomSnapshot};

/// Error raised while encoding or decoding events.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("unknown event type: {0}")]
    UnknownEventType(String),

    #[error("unknown entity type: {0}")]
    UnknownEntityType(String),

    #[error("event {event_type} does not belong to entity {entity_type}")]
    EntityMismatch {
        event_type: String,
        entity_type: String,
    },

    #[error("event serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EventError {
    /// True when the producer is newer than this consumer and the event
    /// should be skipped rather than treated as broken.
    pub fn is_unknown(&self) -> bool {
        matches!(
            self,
            EventError::UnknownEventType(_) | EventError::UnknownEntityType(_)
        )
    }
}

/// Discriminator stored in the outbox `event_type` column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    HouseCreated,
    HouseUpdated,
    HouseDeleted,
    RoomCreated,
    RoomUpdated,
    RoomDeleted,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::HouseCreated,
        EventKind::HouseUpdated,
        EventKind::HouseDeleted,
        EventKind::RoomCreated,
        EventKind::RoomUpdated,
        EventKind::RoomDeleted,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::HouseCreated => "HouseCreated",
            EventKind::HouseUpdated => "HouseUpdated",
            EventKind::HouseDeleted => "HouseDeleted",
            EventKind::RoomCreated => "RoomCreated",
            EventKind::RoomUpdated => "RoomUpdated",
            EventKind::RoomDeleted => "RoomDeleted",
        }
    }

    pub fn entity_type(self) -> EntityType {
        match self {
            EventKind::HouseCreated | EventKind::HouseUpdated | EventKind::HouseDeleted => {
                EntityType::House
            }
            EventKind::RoomCreated | EventKind::RoomUpdated | EventKind::RoomDeleted => {
                EntityType::Room
            }
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| EventError::UnknownEventType(s.to_string()))
    }
}

/// A replicated mutation of a house or room.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "eventType", content = "data")]
pub enum SyncEvent {
    HouseCreated(HouseSnapshot),
    HouseUpdated(HouseSnapshot),
    HouseDeleted(HouseRemoved),
    RoomCreated(RoomSnapshot),
    RoomUpdated(RoomSnapshot),
    RoomDeleted(RoomRemoved),
}

impl SyncEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            SyncEvent::HouseCreated(_) => EventKind::HouseCreated,
            SyncEvent::HouseUpdated(_) => EventKind::HouseUpdated,
            SyncEvent::HouseDeleted(_) => EventKind::HouseDeleted,
            SyncEvent::RoomCreated(_) => EventKind::RoomCreated,
            SyncEvent::RoomUpdated(_) => EventKind::RoomUpdated,
            SyncEvent::RoomDeleted(_) => EventKind::RoomDeleted,
        }
    }

    pub fn entity_type(&self) -> EntityType {
        self.kind().entity_type()
    }

    /// Identifier of the house or room this event is about.
    pub fn entity_id(&self) -> i64 {
        match self {
            SyncEvent::HouseCreated(h) | SyncEvent::HouseUpdated(h) => h.house_id,
            SyncEvent::HouseDeleted(h) => h.house_id,
            SyncEvent::RoomCreated(r) | SyncEvent::RoomUpdated(r) => r.room_id,
            SyncEvent::RoomDeleted(r) => r.room_id,
        }
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            SyncEvent::HouseCreated(h) | SyncEvent::HouseUpdated(h) => h.occurred_at,
            SyncEvent::HouseDeleted(h) => h.occurred_at,
            SyncEvent::RoomCreated(r) | SyncEvent::RoomUpdated(r) => r.occurred_at,
            SyncEvent::RoomDeleted(r) => r.occurred_at,
        }
    }

    /// JSON of the variant payload, without the discriminator.
    pub fn data(&self) -> Result<serde_json::Value, EventError> {
        let value = match self {
            SyncEvent::HouseCreated(h) | SyncEvent::HouseUpdated(h) => serde_json::to_value(h)?,
            SyncEvent::HouseDeleted(h) => serde_json::to_value(h)?,
            SyncEvent::RoomCreated(r) | SyncEvent::RoomUpdated(r) => serde_json::to_value(r)?,
            SyncEvent::RoomDeleted(r) => serde_json::to_value(r)?,
        };
        Ok(value)
    }

    /// Serialized payload as stored in the outbox `payload` column.
    pub fn payload(&self) -> Result<String, EventError> {
        Ok(serde_json::to_string(&self.data()?)?)
    }

    /// Rebuild an event from its outbox discriminator and payload text.
    pub fn decode(event_type: &str, payload: &str) -> Result<Self, EventError> {
        let kind: EventKind = event_type.parse()?;
        Self::from_data(kind, serde_json::from_str(payload)?)
    }

    /// Rebuild an event from a discriminator and an already-parsed payload.
    pub fn from_data(kind: EventKind, data: serde_json::Value) -> Result<Self, EventError> {
        let event = match kind {
            EventKind::HouseCreated => SyncEvent::HouseCreated(serde_json::from_value(data)?),
            EventKind::HouseUpdated => SyncEvent::HouseUpdated(serde_json::from_value(data)?),
            EventKind::HouseDeleted => SyncEvent::HouseDeleted(serde_json::from_value(data)?),
            EventKind::RoomCreated => SyncEvent::RoomCreated(serde_json::from_value(data)?),
            EventKind::RoomUpdated => SyncEvent::RoomUpdated(serde_json::from_value(data)?),
            EventKind::RoomDeleted => SyncEvent::RoomDeleted(serde_json::from_value(data)?),
        };
        Ok(event)
    }
}
