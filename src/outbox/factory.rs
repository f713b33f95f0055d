use chrono::{DateTime, Utc};

use crate::event::{EventError, HouseRemoved, HouseSnapshot, RoomRemoved, RoomSnapshot, SyncEvent};
use crate::model::{House, Room};

use super::record::OutboxEntry;

/// A typed event together with the outbox row that will carry it.
#[derive(Clone, Debug, PartialEq)]
pub struct StagedEvent {
    pub event: SyncEvent,
    pub entry: OutboxEntry,
}

impl StagedEvent {
    fn stage(event: SyncEvent) -> Result<Self, EventError> {
        let entry = OutboxEntry::for_event(&event)?;
        Ok(Self { event, entry })
    }
}

/// Turns a committed-to-be change into a staged event. No I/O.
///
/// Serialization failures are programmer errors and are returned as-is; the
/// writer rolls the surrounding transaction back.
pub struct EventFactory;

impl EventFactory {
    pub fn house_created(house: &House, at: DateTime<Utc>) -> Result<StagedEvent, EventError> {
        StagedEvent::stage(SyncEvent::HouseCreated(HouseSnapshot::of(house, at)))
    }

    pub fn house_updated(house: &House, at: DateTime<Utc>) -> Result<StagedEvent, EventError> {
        StagedEvent::stage(SyncEvent::HouseUpdated(HouseSnapshot::of(house, at)))
    }

    pub fn house_deleted(house_id: i64, at: DateTime<Utc>) -> Result<StagedEvent, EventError> {
        StagedEvent::stage(SyncEvent::HouseDeleted(HouseRemoved {
            house_id,
            occurred_at: at,
        }))
    }

    pub fn room_created(room: &Room, at: DateTime<Utc>) -> Result<StagedEvent, EventError> {
        StagedEvent::stage(SyncEvent::RoomCreated(RoomSnapshot::of(room, at)))
    }

    pub fn room_updated(room: &Room, at: DateTime<Utc>) -> Result<StagedEvent, EventError> {
        StagedEvent::stage(SyncEvent::RoomUpdated(RoomSnapshot::of(room, at)))
    }

    pub fn room_deleted(room: &Room, at: DateTime<Utc>) -> Result<StagedEvent, EventError> {
        StagedEvent::stage(SyncEvent::RoomDeleted(RoomRemoved {
            room_id: room.id,
            house_id: room.house_id,
            occurred_at: at,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;

    fn lakeview() -> House {
        House {
            id: 7,
            name: "Lakeview".into(),
            address: Some("1 Shore Rd".into()),
            area: 120.0,
        }
    }

    #[test]
    fn house_created_snapshots_all_fields() {
        let at = Utc::now();
        let staged = EventFactory::house_created(&lakeview(), at).unwrap();

        assert_eq!(staged.entry.event_type, "HouseCreated");
        match &staged.event {
            SyncEvent::HouseCreated(snapshot) => {
                assert_eq!(snapshot.house_id, 7);
                assert_eq!(snapshot.name, "Lakeview");
                assert_eq!(snapshot.address.as_deref(), Some("1 Shore Rd"));
                assert_eq!(snapshot.occurred_at, at);
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(
            SyncEvent::decode(&staged.entry.event_type, &staged.entry.payload).unwrap(),
            staged.event
        );
    }

    #[test]
    fn deletions_carry_only_identifiers() {
        let at = Utc::now();
        let room = Room {
            id: 3,
            house_id: 7,
            name: "Kitchen".into(),
            area: 12.5,
        };

        let staged = EventFactory::room_deleted(&room, at).unwrap();
        assert_eq!(staged.event.kind(), EventKind::RoomDeleted);
        let payload: serde_json::Value = serde_json::from_str(&staged.entry.payload).unwrap();
        assert_eq!(payload["roomId"], 3);
        assert_eq!(payload["houseId"], 7);
        assert!(payload.get("name").is_none());

        let staged = EventFactory::house_deleted(7, at).unwrap();
        assert_eq!(staged.entry.event_type, "HouseDeleted");
    }

    #[test]
    fn one_operation_per_transition() {
        let at = Utc::now();
        let house = lakeview();
        let room = Room {
            id: 1,
            house_id: 7,
            name: "Den".into(),
            area: 9.0,
        };

        let kinds: Vec<EventKind> = vec![
            EventFactory::house_created(&house, at).unwrap(),
            EventFactory::house_updated(&house, at).unwrap(),
            EventFactory::house_deleted(house.id, at).unwrap(),
            EventFactory::room_created(&room, at).unwrap(),
            EventFactory::room_updated(&room, at).unwrap(),
            EventFactory::room_deleted(&room, at).unwrap(),
        ]
        .into_iter()
        .map(|staged| staged.event.kind())
        .collect();

        assert_eq!(kinds, EventKind::ALL.to_vec());
    }
}
