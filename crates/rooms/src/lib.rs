//! In-process session and room bookkeeping.
//!
//! Pure data, no I/O: the gateway owns the sockets; this crate only tracks
//! which session belongs to which user and when it was last active. The
//! state is ephemeral — a crash loses nothing clients can't recover by
//! reconnecting.

use std::{
    collections::{HashMap, HashSet},
    sync::RwLock,
    time::{Duration, Instant},
};

use tracing::info;

/// Sessions idle longer than this are eligible for the reaper sweep.
pub const SESSION_TIMEOUT: Duration = Duration::from_secs(120);

/// A user's WebSocket session.
#[derive(Debug, Clone)]
pub struct UserSession {
    pub sid: String,
    pub user_id: String,
    pub last_activity: Instant,
}

#[derive(Default)]
struct Inner {
    /// sid → session.
    sessions: HashMap<String, UserSession>,
    /// user_id → sids. A user can hold several concurrent sessions.
    user_sids: HashMap<String, HashSet<String>>,
}

/// Tracks which session belongs to which user.
///
/// All operations are O(1) over the session or user key and safe under
/// concurrent access from per-connection tasks.
#[derive(Default)]
pub struct RoomManager {
    inner: RwLock<Inner>,
}

impl RoomManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session for a user.
    pub fn add_session(&self, sid: &str, user_id: &str) -> UserSession {
        let session = UserSession {
            sid: sid.to_string(),
            user_id: user_id.to_string(),
            last_activity: Instant::now(),
        };
        let mut inner = self.write();
        inner.sessions.insert(sid.to_string(), session.clone());
        inner
            .user_sids
            .entry(user_id.to_string())
            .or_default()
            .insert(sid.to_string());
        info!(sid, user_id, "session added");
        session
    }

    /// Remove a session. Returns the removed session if it existed.
    pub fn remove_session(&self, sid: &str) -> Option<UserSession> {
        let mut inner = self.write();
        let session = inner.sessions.remove(sid)?;
        if let Some(sids) = inner.user_sids.get_mut(&session.user_id) {
            sids.remove(sid);
            if sids.is_empty() {
                inner.user_sids.remove(&session.user_id);
            }
        }
        info!(sid, user_id = %session.user_id, "session removed");
        Some(session)
    }

    /// User id bound to a session, if any.
    pub fn get_user_id(&self, sid: &str) -> Option<String> {
        self.read().sessions.get(sid).map(|s| s.user_id.clone())
    }

    /// All session ids held by a user.
    pub fn get_user_sids(&self, user_id: &str) -> Vec<String> {
        self.read()
            .user_sids
            .get(user_id)
            .map(|sids| sids.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// True if the user has at least one live session.
    pub fn is_user_connected(&self, user_id: &str) -> bool {
        self.read()
            .user_sids
            .get(user_id)
            .is_some_and(|sids| !sids.is_empty())
    }

    /// Touch the activity timestamp for a session.
    pub fn update_activity(&self, sid: &str) {
        if let Some(session) = self.write().sessions.get_mut(sid) {
            session.last_activity = Instant::now();
        }
    }

    /// Sessions idle longer than [`SESSION_TIMEOUT`].
    pub fn timed_out_sessions(&self) -> Vec<UserSession> {
        let now = Instant::now();
        self.read()
            .sessions
            .values()
            .filter(|s| now.duration_since(s.last_activity) > SESSION_TIMEOUT)
            .cloned()
            .collect()
    }

    pub fn session_count(&self) -> usize {
        self.read().sessions.len()
    }

    /// Personal room a user's sessions join for direct notifications.
    pub fn user_room(user_id: &str) -> String {
        format!("user:{user_id}")
    }

    /// Room both participants of a chat join.
    pub fn chat_room(chat_id: &str) -> String {
        format!("chat:{chat_id}")
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        // A poisoned lock means a panicked writer; the map is still
        // structurally sound, so recover the guard.
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_remove_session() {
        let rooms = RoomManager::new();
        rooms.add_session("s1", "u1");

        assert_eq!(rooms.get_user_id("s1").as_deref(), Some("u1"));
        assert!(rooms.is_user_connected("u1"));
        assert_eq!(rooms.session_count(), 1);

        let removed = rooms.remove_session("s1").unwrap();
        assert_eq!(removed.user_id, "u1");
        assert!(!rooms.is_user_connected("u1"));
        assert!(rooms.get_user_id("s1").is_none());
    }

    #[test]
    fn remove_unknown_session_is_none() {
        let rooms = RoomManager::new();
        assert!(rooms.remove_session("nope").is_none());
    }

    #[test]
    fn multi_device_user_keeps_remaining_session() {
        let rooms = RoomManager::new();
        rooms.add_session("s1", "u1");
        rooms.add_session("s2", "u1");

        let mut sids = rooms.get_user_sids("u1");
        sids.sort();
        assert_eq!(sids, vec!["s1", "s2"]);

        rooms.remove_session("s1");
        assert!(rooms.is_user_connected("u1"));
        assert_eq!(rooms.get_user_sids("u1"), vec!["s2"]);
    }

    #[test]
    fn activity_update_prevents_timeout() {
        let rooms = RoomManager::new();
        rooms.add_session("s1", "u1");
        rooms.update_activity("s1");
        assert!(rooms.timed_out_sessions().is_empty());
    }

    #[test]
    fn room_names() {
        assert_eq!(RoomManager::user_room("u1"), "user:u1");
        assert_eq!(RoomManager::chat_room("c1"), "chat:c1");
    }
}
