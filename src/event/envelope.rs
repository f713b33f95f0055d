use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{EventError, EventKind, SyncEvent};
use crate::model::EntityType;

/// Generic envelope POSTed to the replica's sync endpoint.
///
/// `event_type` and `entity_type` stay plain strings so that a consumer can
/// recognise and skip events it does not know yet instead of rejecting the
/// whole body.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncEnvelope {
    pub event_type: String,
    pub entity_type: String,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl SyncEnvelope {
    pub fn from_event(event: &SyncEvent) -> Result<Self, EventError> {
        Ok(Self {
            event_type: event.kind().as_str().to_string(),
            entity_type: event.entity_type().as_str().to_string(),
            data: event.data()?,
            timestamp: event.occurred_at(),
        })
    }

    /// Decode the typed event carried by this envelope.
    pub fn to_event(&self) -> Result<SyncEvent, EventError> {
        let kind: EventKind = self.event_type.parse()?;
        let declared = match self.entity_type.as_str() {
            "House" => EntityType::House,
            "Room" => EntityType::Room,
            other => return Err(EventError::UnknownEntityType(other.to_string())),
        };
        if kind.entity_type() != declared {
            return Err(EventError::EntityMismatch {
                event_type: self.event_type.clone(),
                entity_type: self.entity_type.clone(),
            });
        }
        SyncEvent::from_data(kind, self.data.clone())
    }
}
