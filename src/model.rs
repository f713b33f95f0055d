//! Source-of-record rows owned by the house registry.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which replicated entity an event describes. Also selects the bus topic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityType {
    House,
    Room,
}

impl EntityType {
    /// Topic carrying every mutation of this entity type.
    pub fn topic(self) -> &'static str {
        match self {
            EntityType::House => "houses",
            EntityType::Room => "rooms",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EntityType::House => "House",
            EntityType::Room => "Room",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct House {
    pub id: i64,
    pub name: String,
    pub address: Option<String>,
    pub area: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub id: i64,
    pub house_id: i64,
    pub name: String,
    pub area: f64,
}

/// Mutable fields of a house, as submitted by a caller.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HouseInput {
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    pub area: f64,
}

/// Mutable fields of a room, as submitted by a caller.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoomInput {
    pub house_id: i64,
    pub name: String,
    pub area: f64,
}

impl HouseInput {
    pub fn new(name: impl Into<String>, area: f64) -> Self {
        Self {
            name: name.into(),
            address: None,
            area,
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub(crate) fn into_house(self, id: i64) -> House {
        House {
            id,
            name: self.name,
            address: self.address,
            area: self.area,
        }
    }
}

impl RoomInput {
    pub fn new(house_id: i64, name: impl Into<String>, area: f64) -> Self {
        Self {
            house_id,
            name: name.into(),
            area,
        }
    }

    pub(crate) fn into_room(self, id: i64) -> Room {
        Room {
            id,
            house_id: self.house_id,
            name: self.name,
            area: self.area,
        }
    }
}
