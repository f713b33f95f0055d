use chrono::Utc;
use tracing::info;

use super::{DomainError, TransactionalWriter, WriteError};
use crate::model::{EntityType, House, HouseInput, Room, RoomInput};
use crate::outbox::EventFactory;
use crate::source::{SourceStore, Transaction};

/// House registry operations. Every mutation goes through the transactional
/// writer, so each one leaves exactly one outbox record behind.
pub struct HouseService<S> {
    writer: TransactionalWriter<S>,
}

impl<S: SourceStore> HouseService<S> {
    pub fn new(store: S) -> Self {
        Self {
            writer: TransactionalWriter::new(store),
        }
    }

    pub fn store(&self) -> &S {
        self.writer.store()
    }

    pub fn get_house(&self, id: i64) -> Result<House, WriteError> {
        self.store()
            .house(id)
            .map_err(WriteError::Store)?
            .ok_or_else(|| not_found(EntityType::House, id).into())
    }

    pub fn get_room(&self, id: i64) -> Result<Room, WriteError> {
        self.store()
            .room(id)
            .map_err(WriteError::Store)?
            .ok_or_else(|| not_found(EntityType::Room, id).into())
    }

    pub fn create_house(&self, input: HouseInput) -> Result<House, WriteError> {
        validate(&input.name, input.area)?;
        let committed = self.writer.execute(|tx| {
            let house = input.clone().into_house(tx.next_house_id());
            tx.put_house(house.clone());
            let staged = EventFactory::house_created(&house, Utc::now())?;
            Ok((house, vec![staged]))
        })?;
        info!(house_id = committed.value.id, "house created");
        Ok(committed.value)
    }

    pub fn update_house(&self, id: i64, input: HouseInput) -> Result<House, WriteError> {
        validate(&input.name, input.area)?;
        let committed = self.writer.execute(|tx| {
            if tx.house(id).is_none() {
                return Err(not_found(EntityType::House, id));
            }
            let house = input.clone().into_house(id);
            tx.put_house(house.clone());
            let staged = EventFactory::house_updated(&house, Utc::now())?;
            Ok((house, vec![staged]))
        })?;
        info!(house_id = id, "house updated");
        Ok(committed.value)
    }

    /// Delete a house and its rooms. A single `HouseDeleted` event is emitted;
    /// replicas cascade to rooms on their side.
    pub fn delete_house(&self, id: i64) -> Result<(), WriteError> {
        let committed = self.writer.execute(|tx| {
            if tx.remove_house(id).is_none() {
                return Err(not_found(EntityType::House, id));
            }
            let rooms = tx.rooms_of(id);
            for room in &rooms {
                tx.remove_room(room.id);
            }
            let staged = EventFactory::house_deleted(id, Utc::now())?;
            Ok((rooms.len(), vec![staged]))
        })?;
        info!(house_id = id, rooms = committed.value, "house deleted");
        Ok(())
    }

    pub fn create_room(&self, input: RoomInput) -> Result<Room, WriteError> {
        validate(&input.name, input.area)?;
        let committed = self.writer.execute(|tx| {
            if tx.house(input.house_id).is_none() {
                return Err(DomainError::HouseNotFound(input.house_id));
            }
            let room = input.clone().into_room(tx.next_room_id());
            tx.put_room(room.clone());
            let staged = EventFactory::room_created(&room, Utc::now())?;
            Ok((room, vec![staged]))
        })?;
        info!(room_id = committed.value.id, house_id = committed.value.house_id, "room created");
        Ok(committed.value)
    }

    pub fn update_room(&self, id: i64, input: RoomInput) -> Result<Room, WriteError> {
        validate(&input.name, input.area)?;
        let committed = self.writer.execute(|tx| {
            if tx.room(id).is_none() {
                return Err(not_found(EntityType::Room, id));
            }
            if tx.house(input.house_id).is_none() {
                return Err(DomainError::HouseNotFound(input.house_id));
            }
            let room = input.clone().into_room(id);
            tx.put_room(room.clone());
            let staged = EventFactory::room_updated(&room, Utc::now())?;
            Ok((room, vec![staged]))
        })?;
        info!(room_id = id, "room updated");
        Ok(committed.value)
    }

    pub fn delete_room(&self, id: i64) -> Result<(), WriteError> {
        self.writer.execute(|tx| {
            let room = tx
                .remove_room(id)
                .ok_or_else(|| not_found(EntityType::Room, id))?;
            let staged = EventFactory::room_deleted(&room, Utc::now())?;
            Ok(((), vec![staged]))
        })?;
        info!(room_id = id, "room deleted");
        Ok(())
    }
}

fn not_found(entity: EntityType, id: i64) -> DomainError {
    DomainError::NotFound { entity, id }
}

fn validate(name: &str, area: f64) -> Result<(), DomainError> {
    if name.trim().is_empty() {
        return Err(DomainError::InvalidInput("name must not be blank".into()));
    }
    if !area.is_finite() || area < 0.0 {
        return Err(DomainError::InvalidInput(format!("area {area} is not valid")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::InMemorySourceStore;

    fn service() -> HouseService<InMemorySourceStore> {
        HouseService::new(InMemorySourceStore::new())
    }

    fn event_types(service: &HouseService<InMemorySourceStore>) -> Vec<String> {
        service
            .store()
            .outbox_records()
            .unwrap()
            .into_iter()
            .map(|record| record.event_type)
            .collect()
    }

    #[test]
    fn every_mutation_leaves_one_outbox_record() {
        let service = service();

        let house = service
            .create_house(HouseInput::new("Lakeview", 120.0).with_address("1 Shore Rd"))
            .unwrap();
        service
            .update_house(house.id, HouseInput::new("Lakeview Manor", 130.0))
            .unwrap();
        let room = service
            .create_room(RoomInput::new(house.id, "Kitchen", 14.0))
            .unwrap();
        service
            .update_room(room.id, RoomInput::new(house.id, "Big Kitchen", 18.0))
            .unwrap();
        service.delete_room(room.id).unwrap();
        service.delete_house(house.id).unwrap();

        assert_eq!(
            event_types(&service),
            vec![
                "HouseCreated",
                "HouseUpdated",
                "RoomCreated",
                "RoomUpdated",
                "RoomDeleted",
                "HouseDeleted"
            ]
        );
    }

    #[test]
    fn missing_entities_write_nothing() {
        let service = service();

        let err = service
            .update_house(99, HouseInput::new("Nowhere", 1.0))
            .unwrap_err();
        assert!(matches!(
            err,
            WriteError::Domain(DomainError::NotFound {
                entity: EntityType::House,
                id: 99
            })
        ));

        let err = service
            .create_room(RoomInput::new(99, "Attic", 5.0))
            .unwrap_err();
        assert!(matches!(err, WriteError::Domain(DomainError::HouseNotFound(99))));

        assert!(service.delete_room(5).is_err());

        let err = service.create_house(HouseInput::new("  ", 1.0)).unwrap_err();
        assert!(matches!(err, WriteError::Domain(DomainError::InvalidInput(_))));

        assert!(event_types(&service).is_empty());
    }

    #[test]
    fn deleting_a_house_removes_its_rooms() {
        let service = service();
        let house = service.create_house(HouseInput::new("A", 10.0)).unwrap();
        let other = service.create_house(HouseInput::new("B", 10.0)).unwrap();
        service.create_room(RoomInput::new(house.id, "r1", 1.0)).unwrap();
        service.create_room(RoomInput::new(house.id, "r2", 1.0)).unwrap();
        let kept = service.create_room(RoomInput::new(other.id, "r3", 1.0)).unwrap();

        service.delete_house(house.id).unwrap();

        let rooms = service.store().rooms().unwrap();
        assert_eq!(rooms, vec![kept]);
        assert!(service.get_house(house.id).is_err());
        assert_eq!(event_types(&service).last().map(String::as_str), Some("HouseDeleted"));
    }
}
