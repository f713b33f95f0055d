use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{House, Room};

/// Full state of a house at the moment it was created or updated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HouseSnapshot {
    pub house_id: i64,
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    pub area: f64,
    pub occurred_at: DateTime<Utc>,
}

/// Identifier of a removed house.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HouseRemoved {
    pub house_id: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Full state of a room, including its owning house.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub room_id: i64,
    pub house_id: i64,
    pub name: String,
    pub area: f64,
    pub occurred_at: DateTime<Utc>,
}

/// Identifiers of a removed room.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomRemoved {
    pub room_id: i64,
    pub house_id: i64,
    pub occurred_at: DateTime<Utc>,
}

impl HouseSnapshot {
    pub fn of(house: &House, occurred_at: DateTime<Utc>) -> Self {
        Self {
            house_id: house.id,
            name: house.name.clone(),
            address: house.address.clone(),
            area: house.area,
            occurred_at,
        }
    }
}

impl RoomSnapshot {
    pub fn of(room: &Room, occurred_at: DateTime<Utc>) -> Self {
        Self {
            room_id: room.id,
            house_id: room.house_id,
            name: room.name.clone(),
            area: room.area,
            occurred_at,
        }
    }
}
