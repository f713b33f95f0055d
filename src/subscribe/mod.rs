//! Subscriber side - apply delivered events to the replica.
//!
//! Both transports end in the same [`ReplicaApplier`]:
//!
//! - [`BusConsumer`] drains a topic subscription;
//! - [`http::router`] serves the envelope sync endpoint.
//!
//! Applying is idempotent. Created/Updated upsert by source identifier and
//! overwrite unconditionally (last write wins); Deleted removes the row and
//! its children and is a no-op when the row is already gone. Events a
//! consumer does not recognise are logged and discarded.

#[cfg(feature = "bus")]
mod consumer;
#[cfg(feature = "http")]
pub mod http;

use thiserror::Error;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::event::{EventError, SyncEnvelope, SyncEvent};
use crate::replica::{HouseReplica, ReplicaStore, RoomReplica};

#[cfg(feature = "bus")]
pub use consumer::{BusConsumer, DrainReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The replica now reflects the event.
    Applied,
    /// The event was not recognised and was skipped.
    Discarded,
}

impl ApplyOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            ApplyOutcome::Applied => "applied",
            ApplyOutcome::Discarded => "discarded",
        }
    }
}

#[derive(Debug, Error)]
pub enum ApplyError {
    /// The event can never be applied; redelivering it will not help.
    #[error("malformed event: {0}")]
    Malformed(#[source] EventError),

    /// The replica store failed; the transport should present the event again.
    #[error("replica store failed: {0}")]
    Store(#[from] StoreError),
}

impl ApplyError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ApplyError::Store(_))
    }
}

/// Applies sync events to a replica store.
#[derive(Clone)]
pub struct ReplicaApplier<R> {
    store: R,
}

impl<R: ReplicaStore> ReplicaApplier<R> {
    pub fn new(store: R) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &R {
        &self.store
    }

    pub fn apply(&self, event: &SyncEvent) -> Result<ApplyOutcome, ApplyError> {
        match event {
            SyncEvent::HouseCreated(house) | SyncEvent::HouseUpdated(house) => {
                self.store.upsert_house(HouseReplica {
                    id: house.house_id,
                    name: house.name.clone(),
                    address: house.address.clone(),
                    area: house.area,
                })?;
            }
            SyncEvent::RoomCreated(room) | SyncEvent::RoomUpdated(room) => {
                self.store.upsert_room(RoomReplica {
                    id: room.room_id,
                    house_id: room.house_id,
                    name: room.name.clone(),
                    area: room.area,
                })?;
            }
            SyncEvent::HouseDeleted(house) => {
                if !self.store.delete_house(house.house_id)? {
                    debug!(house_id = house.house_id, "house already absent from replica");
                }
            }
            SyncEvent::RoomDeleted(room) => {
                if !self.store.delete_room(room.room_id)? {
                    debug!(room_id = room.room_id, "room already absent from replica");
                }
            }
        }

        debug!(
            event_type = %event.kind(),
            entity_id = event.entity_id(),
            "event applied to replica"
        );
        Ok(ApplyOutcome::Applied)
    }

    /// Decode and apply an envelope. Unknown event or entity types are
    /// discarded; data that does not fit a known type is malformed.
    pub fn apply_envelope(&self, envelope: &SyncEnvelope) -> Result<ApplyOutcome, ApplyError> {
        match envelope.to_event() {
            Ok(event) => self.apply(&event),
            Err(err) if err.is_unknown() => {
                warn!(
                    event_type = %envelope.event_type,
                    entity_type = %envelope.entity_type,
                    "discarding unrecognised sync event"
                );
                Ok(ApplyOutcome::Discarded)
            }
            Err(err) => Err(ApplyError::Malformed(err)),
        }
    }
}
