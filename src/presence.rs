use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::messages::User;

pub fn epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as i64)
}

#[derive(Debug, Clone)]
struct PresenceEntry {
    user: User,
    last_active: i64,
    typing: bool,
    typing_room: Option<String>,
}

/// Maps live connections to their bound user and activity metadata. Sole
/// writer of `online` and `last_seen` on the user records it hands out.
pub struct PresenceRegistry {
    entries: HashMap<String, PresenceEntry>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        PresenceRegistry {
            entries: HashMap::new(),
        }
    }

    /// Binds `user` to the connection, overwriting any previous binding
    /// (last login wins). Returns the stamped snapshot.
    pub fn login(&mut self, conn: &str, mut user: User) -> User {
        let now = epoch_ms();
        user.online = true;
        user.last_seen = now;
        self.entries.insert(
            conn.to_string(),
            PresenceEntry {
                user: user.clone(),
                last_active: now,
                typing: false,
                typing_room: None,
            },
        );
        user
    }

    /// Unbinds the connection and returns the offline-stamped user, or
    /// `None` if nothing was bound (idempotent).
    pub fn disconnect(&mut self, conn: &str) -> Option<User> {
        let mut entry = self.entries.remove(conn)?;
        entry.user.online = false;
        entry.user.last_seen = epoch_ms();
        Some(entry.user)
    }

    /// Updates typing metadata and returns the bound user's id for the room
    /// notification. No-op when the connection has no bound user.
    pub fn set_typing(&mut self, conn: &str, room: &str, is_typing: bool) -> Option<String> {
        let entry = self.entries.get_mut(conn)?;
        entry.typing = is_typing;
        entry.typing_room = is_typing.then(|| room.to_string());
        entry.last_active = epoch_ms();
        Some(entry.user.id.clone())
    }

    /// Refreshes activity on any inbound event; feeds the idle sweep.
    pub fn touch(&mut self, conn: &str) {
        if let Some(entry) = self.entries.get_mut(conn) {
            entry.last_active = epoch_ms();
        }
    }

    pub fn user_of(&self, conn: &str) -> Option<User> {
        self.entries.get(conn).map(|e| e.user.clone())
    }

    pub fn online_users(&self) -> Vec<User> {
        self.entries.values().map(|e| e.user.clone()).collect()
    }

    /// Connections whose last activity is older than `timeout_ms`.
    pub fn idle_connections(&self, timeout_ms: i64) -> Vec<String> {
        let cutoff = epoch_ms() - timeout_ms;
        self.entries
            .iter()
            .filter(|(_, entry)| entry.last_active < cutoff)
            .map(|(conn, _)| conn.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str) -> User {
        User {
            id: id.into(),
            name: id.to_uppercase(),
            photo_url: None,
            online: false,
            last_seen: 0,
        }
    }

    #[test]
    fn login_stamps_online_and_last_seen() {
        let mut registry = PresenceRegistry::new();
        let stamped = registry.login("c1", user("u1"));
        assert!(stamped.online);
        assert!(stamped.last_seen > 0);
        assert_eq!(registry.online_users().len(), 1);
    }

    #[test]
    fn second_login_on_same_connection_overwrites() {
        let mut registry = PresenceRegistry::new();
        registry.login("c1", user("u1"));
        registry.login("c1", user("u2"));
        let online = registry.online_users();
        assert_eq!(online.len(), 1);
        assert_eq!(online[0].id, "u2");
    }

    #[test]
    fn disconnect_is_idempotent() {
        let mut registry = PresenceRegistry::new();
        registry.login("c1", user("u1"));
        let gone = registry.disconnect("c1").unwrap();
        assert!(!gone.online);
        assert!(registry.disconnect("c1").is_none());
        assert!(registry.online_users().is_empty());
    }

    #[test]
    fn typing_without_binding_is_noop() {
        let mut registry = PresenceRegistry::new();
        assert!(registry.set_typing("c1", "general", true).is_none());
    }

    #[test]
    fn idle_sweep_finds_stale_connections() {
        let mut registry = PresenceRegistry::new();
        registry.login("c1", user("u1"));
        assert!(registry.idle_connections(60_000).is_empty());
        // Zero timeout flags everything not touched in this same millisecond
        // tick; force staleness instead of sleeping.
        registry.entries.get_mut("c1").unwrap().last_active = epoch_ms() - 120_000;
        assert_eq!(registry.idle_connections(60_000), vec!["c1".to_string()]);
    }
}
