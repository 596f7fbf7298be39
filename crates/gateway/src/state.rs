use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Instant,
};

use {
    dashmap::DashMap,
    tokio::sync::{Mutex, RwLock, mpsc},
    tokio_util::sync::CancellationToken,
};

use {accord_archive::ChatArchive, accord_rooms::RoomManager, accord_store::ChatStore};

use crate::auth::AuthConfig;

// ── Connected client ─────────────────────────────────────────────────────────

/// A WebSocket client currently connected to the gateway.
#[derive(Debug)]
pub struct ConnectedClient {
    pub sid: String,
    /// Channel feeding this client's write loop with serialized frames.
    pub sender: mpsc::UnboundedSender<String>,
    /// Cancelling this token closes the connection (used by the idle reaper).
    pub cancel: CancellationToken,
    pub connected_at: Instant,
}

impl ConnectedClient {
    /// Send a serialized JSON frame to this client. Returns false if the
    /// write loop is gone.
    pub fn send(&self, frame: &str) -> bool {
        self.sender.send(frame.to_string()).is_ok()
    }
}

// ── Gateway state ────────────────────────────────────────────────────────────

/// Shared gateway runtime state, wrapped in `Arc` for use across tasks.
pub struct GatewayState {
    /// All connected WebSocket clients, keyed by session id.
    pub clients: RwLock<HashMap<String, ConnectedClient>>,
    /// Room membership: room name → session ids. Personal rooms are named
    /// `user:{id}`, chat rooms `chat:{id}`.
    pub rooms: RwLock<HashMap<String, HashSet<String>>>,
    /// Session → user bookkeeping.
    pub room_manager: RoomManager,
    /// Active chat state.
    pub store: ChatStore,
    /// Durable archive + identity/catch-up queries.
    pub archive: ChatArchive,
    /// JWT validation config.
    pub auth: AuthConfig,
    /// Per-chat locks serializing proposal transitions. Two concurrent
    /// accepts on one pending proposal must resolve to exactly one winner.
    chat_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl GatewayState {
    pub fn new(store: ChatStore, archive: ChatArchive, auth: AuthConfig) -> Arc<Self> {
        Arc::new(Self {
            clients: RwLock::new(HashMap::new()),
            rooms: RwLock::new(HashMap::new()),
            room_manager: RoomManager::new(),
            store,
            archive,
            auth,
            chat_locks: DashMap::new(),
        })
    }

    // ── Clients ──────────────────────────────────────────────────────────

    pub async fn register_client(&self, client: ConnectedClient) {
        let sid = client.sid.clone();
        self.clients.write().await.insert(sid, client);
    }

    /// Remove a client and its room memberships. Returns the removed client.
    pub async fn remove_client(&self, sid: &str) -> Option<ConnectedClient> {
        self.rooms.write().await.retain(|_, members| {
            members.remove(sid);
            !members.is_empty()
        });
        self.clients.write().await.remove(sid)
    }

    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Cancel a client's connection. The reaper uses this for idle sessions;
    /// the connection task does its own cleanup on the way out.
    pub async fn close_client(&self, sid: &str) {
        if let Some(client) = self.clients.read().await.get(sid) {
            client.cancel.cancel();
        }
    }

    // ── Rooms ────────────────────────────────────────────────────────────

    pub async fn enter_room(&self, sid: &str, room: &str) {
        self.rooms
            .write()
            .await
            .entry(room.to_string())
            .or_default()
            .insert(sid.to_string());
    }

    pub async fn leave_room(&self, sid: &str, room: &str) {
        let mut rooms = self.rooms.write().await;
        if let Some(members) = rooms.get_mut(room) {
            members.remove(sid);
            if members.is_empty() {
                rooms.remove(room);
            }
        }
    }

    /// Current members of a room.
    pub async fn room_members(&self, room: &str) -> Vec<String> {
        self.rooms
            .read()
            .await
            .get(room)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    // ── Per-chat serialization ───────────────────────────────────────────

    /// Lock guarding proposal read-modify-write cycles for one chat.
    pub fn chat_lock(&self, chat_id: &str) -> Arc<Mutex<()>> {
        self.chat_locks
            .entry(chat_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the lock entry once a chat is deleted so the map doesn't grow
    /// with dead chats.
    pub fn release_chat_lock(&self, chat_id: &str) {
        self.chat_locks.remove(chat_id);
    }
}
