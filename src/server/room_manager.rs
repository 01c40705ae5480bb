//! Room registry for the chat server
//!
//! The set of rooms is fixed when the server starts and never changes while
//! it runs, so the registry needs no locking and is shared as a plain `Arc`.

use std::collections::BTreeMap;

use crate::error::{ChatError, Result};

/// Room identifier as typed by clients after `/r`
pub type RoomId = u32;

/// Room every session starts in
pub const DEFAULT_ROOM: RoomId = 0;

/// A chat room
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Room {
    /// Room ID
    pub id: RoomId,
    /// Display name
    pub name: String,
}

impl Room {
    pub fn new(id: RoomId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// Immutable set of valid rooms, ordered by id
#[derive(Debug, Clone)]
pub struct RoomRegistry {
    rooms: BTreeMap<RoomId, Room>,
}

impl RoomRegistry {
    /// Build a registry. It must contain [`DEFAULT_ROOM`] and no duplicate ids.
    pub fn new<I, S>(rooms: I) -> Result<Self>
    where
        I: IntoIterator<Item = (RoomId, S)>,
        S: Into<String>,
    {
        let mut map = BTreeMap::new();
        for (id, name) in rooms {
            if map.insert(id, Room::new(id, name)).is_some() {
                return Err(ChatError::config(format!("Duplicate room id {}", id)));
            }
        }

        if !map.contains_key(&DEFAULT_ROOM) {
            return Err(ChatError::config(format!(
                "Room registry must contain the default room {}",
                DEFAULT_ROOM
            )));
        }

        Ok(Self { rooms: map })
    }

    /// The standard rooms: Main, Movies, Sports and Crafts
    pub fn standard() -> Self {
        let rooms = [(0, "Main"), (1, "Movies"), (2, "Sports"), (3, "Crafts")]
            .into_iter()
            .map(|(id, name)| (id, Room::new(id, name)))
            .collect();
        Self { rooms }
    }

    /// Get a room by ID
    pub fn get(&self, id: RoomId) -> Option<&Room> {
        self.rooms.get(&id)
    }

    pub fn contains(&self, id: RoomId) -> bool {
        self.rooms.contains_key(&id)
    }

    /// Display name of a room, `"?"` for ids outside the registry.
    /// Sessions only ever hold registered ids.
    pub fn name(&self, id: RoomId) -> &str {
        self.rooms.get(&id).map(|r| r.name.as_str()).unwrap_or("?")
    }

    /// Rooms in id order
    pub fn iter(&self) -> impl Iterator<Item = &Room> {
        self.rooms.values()
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
