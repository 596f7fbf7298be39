//! Room-scoped event emission.
//!
//! Every server push is an [`EventFrame`] serialized once and fanned out to
//! the sessions in a room. Personal rooms (`user:{id}`) give multi-device
//! fan-out for free: emit-to-user is just emit-to-room on the user's room,
//! never a single-session special case.

use std::sync::Arc;

use {accord_protocol::EventFrame, accord_rooms::RoomManager, tracing::debug};

use crate::state::GatewayState;

#[derive(Default)]
pub struct EmitOpts<'a> {
    /// Session to exclude (e.g. the typing sender does not hear itself).
    pub skip_sid: Option<&'a str>,
}

/// Emit an event to every session in a room.
pub async fn emit_to_room(
    state: &Arc<GatewayState>,
    room: &str,
    event: &str,
    payload: serde_json::Value,
    opts: EmitOpts<'_>,
) {
    let frame = EventFrame::new(event, payload);
    let json = match serde_json::to_string(&frame) {
        Ok(j) => j,
        Err(e) => {
            tracing::warn!(event, error = %e, "failed to serialize event frame");
            return;
        },
    };

    let members = state.room_members(room).await;
    debug!(event, room, members = members.len(), "emitting to room");

    let clients = state.clients.read().await;
    for sid in &members {
        if opts.skip_sid == Some(sid.as_str()) {
            continue;
        }
        if let Some(client) = clients.get(sid) {
            // Best-effort: a closed write loop just means the client is on
            // its way out; it recovers state on reconnect.
            client.send(&json);
        }
    }
}

/// Emit an event to all of a user's sessions via their personal room.
pub async fn emit_to_user(
    state: &Arc<GatewayState>,
    user_id: &str,
    event: &str,
    payload: serde_json::Value,
) {
    emit_to_room(
        state,
        &RoomManager::user_room(user_id),
        event,
        payload,
        EmitOpts::default(),
    )
    .await;
}

/// Emit an event to a single session.
pub async fn emit_to_sid(
    state: &Arc<GatewayState>,
    sid: &str,
    event: &str,
    payload: serde_json::Value,
) -> bool {
    let frame = EventFrame::new(event, payload);
    let Ok(json) = serde_json::to_string(&frame) else {
        return false;
    };
    state
        .clients
        .read()
        .await
        .get(sid)
        .is_some_and(|client| client.send(&json))
}
