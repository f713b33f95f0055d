//! Replica tables held by the consuming (temperature) service.
//!
//! House and room rows are a read-only projection of the house registry;
//! only the subscriber writes them. Readings belong to the consuming service
//! itself and are keyed by room, so deleting a room (or its house) removes
//! them too.

mod in_memory;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

pub use in_memory::InMemoryReplicaStore;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HouseReplica {
    pub id: i64,
    pub name: String,
    pub address: Option<String>,
    pub area: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomReplica {
    pub id: i64,
    pub house_id: i64,
    pub name: String,
    pub area: f64,
}

/// A temperature reading taken in a room.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    pub id: u64,
    pub room_id: i64,
    pub temperature: f64,
    pub recorded_at: DateTime<Utc>,
}

/// Upsert/delete-by-identifier storage for replica rows.
///
/// Upserts overwrite unconditionally. Deletes of absent rows succeed and
/// report `false`.
pub trait ReplicaStore: Send + Sync {
    fn upsert_house(&self, house: HouseReplica) -> Result<(), StoreError>;

    fn upsert_room(&self, room: RoomReplica) -> Result<(), StoreError>;

    /// Remove a house, its rooms and their readings. Returns whether the house existed.
    fn delete_house(&self, id: i64) -> Result<bool, StoreError>;

    /// Remove a room and its readings. Returns whether the room existed.
    fn delete_room(&self, id: i64) -> Result<bool, StoreError>;

    fn house(&self, id: i64) -> Result<Option<HouseReplica>, StoreError>;

    fn room(&self, id: i64) -> Result<Option<RoomReplica>, StoreError>;

    fn rooms_for_house(&self, house_id: i64) -> Result<Vec<RoomReplica>, StoreError>;

    fn record_reading(
        &self,
        room_id: i64,
        temperature: f64,
        recorded_at: DateTime<Utc>,
    ) -> Result<Reading, StoreError>;

    fn readings_for_room(&self, room_id: i64) -> Result<Vec<Reading>, StoreError>;
}
