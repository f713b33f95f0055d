use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use super::{HouseReplica, Reading, ReplicaStore, RoomReplica};
use crate::error::StoreError;

#[derive(Default)]
struct Tables {
    houses: BTreeMap<i64, HouseReplica>,
    rooms: BTreeMap<i64, RoomReplica>,
    readings: BTreeMap<u64, Reading>,
    next_reading_id: u64,
}

impl Tables {
    fn drop_readings_of(&mut self, room_id: i64) {
        self.readings.retain(|_, reading| reading.room_id != room_id);
    }
}

/// Replica store kept in memory. Clones share the same tables.
///
/// `set_unavailable(true)` makes every call fail with
/// [`StoreError::Unavailable`], which the subscriber treats as transient.
#[derive(Clone, Default)]
pub struct InMemoryReplicaStore {
    tables: Arc<RwLock<Tables>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryReplicaStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn houses(&self) -> Result<Vec<HouseReplica>, StoreError> {
        Ok(self.read()?.houses.values().cloned().collect())
    }

    pub fn rooms(&self) -> Result<Vec<RoomReplica>, StoreError> {
        Ok(self.read()?.rooms.values().cloned().collect())
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("replica store offline".into()));
        }
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.check()?;
        self.tables
            .read()
            .map_err(|_| StoreError::LockPoisoned("replica read"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.check()?;
        self.tables
            .write()
            .map_err(|_| StoreError::LockPoisoned("replica write"))
    }
}

impl ReplicaStore for InMemoryReplicaStore {
    fn upsert_house(&self, house: HouseReplica) -> Result<(), StoreError> {
        self.write()?.houses.insert(house.id, house);
        Ok(())
    }

    fn upsert_room(&self, room: RoomReplica) -> Result<(), StoreError> {
        self.write()?.rooms.insert(room.id, room);
        Ok(())
    }

    fn delete_house(&self, id: i64) -> Result<bool, StoreError> {
        let mut tables = self.write()?;
        let existed = tables.houses.remove(&id).is_some();

        let room_ids: Vec<i64> = tables
            .rooms
            .values()
            .filter(|room| room.house_id == id)
            .map(|room| room.id)
            .collect();
        for room_id in room_ids {
            tables.rooms.remove(&room_id);
            tables.drop_readings_of(room_id);
        }
        Ok(existed)
    }

    fn delete_room(&self, id: i64) -> Result<bool, StoreError> {
        let mut tables = self.write()?;
        let existed = tables.rooms.remove(&id).is_some();
        tables.drop_readings_of(id);
        Ok(existed)
    }

    fn house(&self, id: i64) -> Result<Option<HouseReplica>, StoreError> {
        Ok(self.read()?.houses.get(&id).cloned())
    }

    fn room(&self, id: i64) -> Result<Option<RoomReplica>, StoreError> {
        Ok(self.read()?.rooms.get(&id).cloned())
    }

    fn rooms_for_house(&self, house_id: i64) -> Result<Vec<RoomReplica>, StoreError> {
        Ok(self
            .read()?
            .rooms
            .values()
            .filter(|room| room.house_id == house_id)
            .cloned()
            .collect())
    }

    fn record_reading(
        &self,
        room_id: i64,
        temperature: f64,
        recorded_at: DateTime<Utc>,
    ) -> Result<Reading, StoreError> {
        let mut tables = self.write()?;
        tables.next_reading_id += 1;
        let reading = Reading {
            id: tables.next_reading_id,
            room_id,
            temperature,
            recorded_at,
        };
        tables.readings.insert(reading.id, reading.clone());
        Ok(reading)
    }

    fn readings_for_room(&self, room_id: i64) -> Result<Vec<Reading>, StoreError> {
        Ok(self
            .read()?
            .readings
            .values()
            .filter(|reading| reading.room_id == room_id)
            .cloned()
            .collect())
    }
}
