use std::collections::{HashMap, HashSet};

use crate::history::HistoryRing;

/// Prefix of rooms synthesized by the pairing queue. The `private-<CODE>`
/// convention for user-shareable rooms is client-side labeling only; the
/// relay does not interpret it.
pub const RANDOM_ROOM_PREFIX: &str = "random-";

pub fn is_random_room(name: &str) -> bool {
    name.starts_with(RANDOM_ROOM_PREFIX)
}

struct Room {
    members: HashSet<String>,
    history: HistoryRing,
}

/// Owns every room's member set and history ring. Rooms are created lazily
/// on first join and never destroyed; an emptied room behaves identically to
/// a never-created one on the next join.
pub struct RoomTable {
    rooms: HashMap<String, Room>,
    history_capacity: usize,
}

impl RoomTable {
    pub fn new(history_capacity: usize) -> Self {
        RoomTable {
            rooms: HashMap::new(),
            history_capacity,
        }
    }

    fn room_entry(&mut self, name: &str) -> &mut Room {
        let capacity = self.history_capacity;
        self.rooms.entry(name.to_string()).or_insert_with(|| Room {
            members: HashSet::new(),
            history: HistoryRing::new(capacity),
        })
    }

    /// Returns `true` if the connection was not already a member.
    pub fn join(&mut self, conn: &str, room: &str) -> bool {
        self.room_entry(room).members.insert(conn.to_string())
    }

    /// Returns `true` if the connection was a member. Leaving an unknown
    /// room or a room one never joined is a no-op.
    pub fn leave(&mut self, conn: &str, room: &str) -> bool {
        self.rooms
            .get_mut(room)
            .is_some_and(|r| r.members.remove(conn))
    }

    pub fn contains(&self, room: &str, conn: &str) -> bool {
        self.rooms.get(room).is_some_and(|r| r.members.contains(conn))
    }

    /// Authoritative member set at call time.
    pub fn members(&self, room: &str) -> Vec<String> {
        self.rooms
            .get(room)
            .map(|r| r.members.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Every room the connection is currently joined to, for the disconnect
    /// cascade.
    pub fn rooms_of(&self, conn: &str) -> Vec<String> {
        self.rooms
            .iter()
            .filter(|(_, room)| room.members.contains(conn))
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn history(&self, room: &str) -> Option<&HistoryRing> {
        self.rooms.get(room).map(|r| &r.history)
    }

    pub fn history_mut(&mut self, room: &str) -> Option<&mut HistoryRing> {
        self.rooms.get_mut(room).map(|r| &mut r.history)
    }
}
