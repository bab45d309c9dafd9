use std::collections::BTreeMap;
use std::io;
use std::path::Path;

use crate::limits::*;
use crate::model::Room;

/// Read-only room lookup consumed by the engine.
pub trait RoomCatalog: Send + Sync {
    fn get(&self, room_id: &str) -> Option<Room>;

    fn list(&self) -> Vec<Room>;

    fn exists(&self, room_id: &str) -> bool {
        self.get(room_id).is_some()
    }
}

/// Fixed set of rooms, typically loaded once at startup from a JSON file:
///
/// ```json
/// [{ "id": "R1", "name": "Ada Lovelace" }]
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    rooms: BTreeMap<String, Room>,
}

impl StaticCatalog {
    pub fn new(rooms: impl IntoIterator<Item = Room>) -> io::Result<Self> {
        let mut map = BTreeMap::new();
        for room in rooms {
            if room.id.is_empty() {
                return Err(invalid("room id must not be empty".into()));
            }
            if room.id.len() > MAX_ROOM_ID_LEN {
                return Err(invalid(format!("room id too long: {}", room.id)));
            }
            if room.name.len() > MAX_ROOM_NAME_LEN {
                return Err(invalid(format!("room name too long: {}", room.id)));
            }
            if map.contains_key(&room.id) {
                return Err(invalid(format!("duplicate room id: {}", room.id)));
            }
            map.insert(room.id.clone(), room);
        }
        if map.len() > MAX_ROOMS {
            return Err(invalid(format!("too many rooms: {}", map.len())));
        }
        Ok(Self { rooms: map })
    }

    pub fn from_json(json: &str) -> io::Result<Self> {
        let rooms: Vec<Room> =
            serde_json::from_str(json).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Self::new(rooms)
    }

    pub fn load(path: &Path) -> io::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

impl RoomCatalog for StaticCatalog {
    fn get(&self, room_id: &str) -> Option<Room> {
        self.rooms.get(room_id).cloned()
    }

    fn list(&self) -> Vec<Room> {
        self.rooms.values().cloned().collect()
    }

    fn exists(&self, room_id: &str) -> bool {
        self.rooms.contains_key(room_id)
    }
}

fn invalid(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}
