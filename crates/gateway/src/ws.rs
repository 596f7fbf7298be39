use std::{net::SocketAddr, sync::Arc};

use {
    axum::extract::ws::{Message, WebSocket},
    futures::{SinkExt, stream::StreamExt},
    tokio::sync::mpsc,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use {
    accord_protocol::{
        ClientFrame, ConnectParams, ErrorShape, HANDSHAKE_TIMEOUT_MS, MAX_PAYLOAD_BYTES,
        RequestFrame, ResponseFrame, error_codes, events,
    },
    accord_rooms::RoomManager,
};

use crate::{
    auth,
    broadcast::emit_to_sid,
    methods::{MethodContext, MethodRegistry},
    state::{ConnectedClient, GatewayState},
};

/// Handle a single WebSocket connection through its full lifecycle:
/// handshake (with auth) → message loop → cleanup.
pub async fn handle_connection(
    socket: WebSocket,
    state: Arc<GatewayState>,
    methods: Arc<MethodRegistry>,
    remote_addr: SocketAddr,
) {
    let sid = uuid::Uuid::new_v4().to_string();
    info!(sid, remote_ip = %remote_addr.ip(), "ws: new connection");

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (client_tx, mut client_rx) = mpsc::unbounded_channel::<String>();

    // Write loop: forwards frames from the client_tx channel to the socket.
    let write_sid = sid.clone();
    let write_handle = tokio::spawn(async move {
        while let Some(msg) = client_rx.recv().await {
            if ws_tx.send(Message::Text(msg.into())).await.is_err() {
                debug!(sid = %write_sid, "ws: write loop closed");
                break;
            }
        }
    });

    let reject = |request_id: &str, code: &str, message: &str| {
        let err = ResponseFrame::err(request_id, ErrorShape::new(code, message));
        if let Ok(json) = serde_json::to_string(&err) {
            let _ = client_tx.send(json);
        }
    };

    // ── Handshake phase ──────────────────────────────────────────────────

    let connect_result = match tokio::time::timeout(
        std::time::Duration::from_millis(HANDSHAKE_TIMEOUT_MS),
        wait_for_connect(&mut ws_rx),
    )
    .await
    {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => {
            warn!(sid, error = %e, "ws: handshake failed");
            drop(client_tx);
            write_handle.abort();
            return;
        },
        Err(_) => {
            warn!(sid, "ws: handshake timeout");
            drop(client_tx);
            write_handle.abort();
            return;
        },
    };

    let (request_id, params) = connect_result;

    // Connections without a valid token are rejected here — no
    // unauthenticated session ever exists.
    let token = params
        .auth
        .as_ref()
        .and_then(|a| a.token.clone())
        .filter(|t| !t.is_empty());
    let Some(token) = token else {
        warn!(sid, "ws: rejected, no token provided");
        reject(
            &request_id,
            error_codes::AUTH_REQUIRED,
            "authentication required",
        );
        drop(client_tx);
        write_handle.abort();
        return;
    };

    let Some(subject) = auth::validate_token(&token, &state.auth) else {
        warn!(sid, "ws: rejected, invalid token");
        reject(
            &request_id,
            error_codes::INVALID_TOKEN,
            "invalid or expired token",
        );
        drop(client_tx);
        write_handle.abort();
        return;
    };

    // Resolve identity-provider subject → internal user id.
    let user_id = match state.archive.resolve_subject(&subject).await {
        Ok(Some(user_id)) => user_id,
        Ok(None) => {
            warn!(sid, subject, "ws: rejected, subject not in users table");
            reject(&request_id, error_codes::USER_NOT_FOUND, "user not found");
            drop(client_tx);
            write_handle.abort();
            return;
        },
        Err(e) => {
            warn!(sid, error = %e, "ws: rejected, identity lookup failed");
            reject(
                &request_id,
                error_codes::STORE_UNAVAILABLE,
                "identity lookup failed",
            );
            drop(client_tx);
            write_handle.abort();
            return;
        },
    };

    // ── Session setup ────────────────────────────────────────────────────

    let cancel = CancellationToken::new();
    state
        .register_client(ConnectedClient {
            sid: sid.clone(),
            sender: client_tx.clone(),
            cancel: cancel.clone(),
            connected_at: std::time::Instant::now(),
        })
        .await;
    state.room_manager.add_session(&sid, &user_id);
    state
        .enter_room(&sid, &RoomManager::user_room(&user_id))
        .await;

    // Rejoin active chats so brief disconnects lose nothing.
    let active_chats = match state.store.get_user_active_chats(&user_id).await {
        Ok(chats) => chats,
        Err(e) => {
            warn!(sid, user_id, error = %e, "ws: active-chat lookup failed");
            Vec::new()
        },
    };
    for chat_id in &active_chats {
        state
            .enter_room(&sid, &RoomManager::chat_room(chat_id))
            .await;
    }

    let ok = ResponseFrame::ok(&request_id, serde_json::json!({ "status": "connected" }));
    if let Ok(json) = serde_json::to_string(&ok) {
        let _ = client_tx.send(json);
    }
    emit_to_sid(
        &state,
        &sid,
        events::AUTHENTICATED,
        serde_json::json!({
            "userId": user_id,
            "activeChats": active_chats,
        }),
    )
    .await;

    let connection_count = state.client_count().await;
    info!(
        sid,
        user_id,
        active_chats = active_chats.len(),
        connections = connection_count,
        "ws: authenticated"
    );

    if let Err(e) = state.store.record_in_app(&user_id).await {
        warn!(user_id, error = %e, "ws: in-app presence not recorded");
    }

    // Catch-up: deliver any chat requests the user missed while offline.
    // Failures here are logged but never abort the handshake.
    match state.archive.get_pending_chat_requests(&user_id).await {
        Ok(cards) => {
            let mut delivered = 0;
            for card in cards {
                let Ok(payload) = serde_json::to_value(&card) else {
                    continue;
                };
                if emit_to_sid(&state, &sid, events::CHAT_REQUEST_RECEIVED, payload).await {
                    delivered += 1;
                }
            }
            if delivered > 0 {
                info!(user_id, delivered, "ws: pending chat requests delivered");
            }
        },
        Err(e) => warn!(user_id, error = %e, "ws: pending request catch-up failed"),
    }

    // ── Message loop ─────────────────────────────────────────────────────

    loop {
        let msg = tokio::select! {
            _ = cancel.cancelled() => {
                info!(sid, "ws: connection cancelled");
                break;
            }
            msg = ws_rx.next() => msg,
        };
        let Some(msg) = msg else { break };

        let text = match msg {
            Ok(Message::Text(t)) => t.to_string(),
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!(sid, error = %e, "ws: read error");
                break;
            },
        };

        if text.len() > MAX_PAYLOAD_BYTES {
            warn!(sid, size = text.len(), "ws: payload too large");
            emit_to_sid(
                &state,
                &sid,
                events::ERROR,
                serde_json::json!({ "message": "payload too large", "maxBytes": MAX_PAYLOAD_BYTES }),
            )
            .await;
            continue;
        }

        let frame: ClientFrame = match serde_json::from_str(&text) {
            Ok(f) => f,
            Err(e) => {
                warn!(sid, error = %e, "ws: invalid frame");
                emit_to_sid(
                    &state,
                    &sid,
                    events::ERROR,
                    serde_json::json!({ "message": "invalid frame" }),
                )
                .await;
                continue;
            },
        };

        state.room_manager.update_activity(&sid);

        let ClientFrame::Request(req) = frame;
        let ctx = MethodContext {
            request_id: req.id.clone(),
            method: req.method.clone(),
            params: req.params.unwrap_or(serde_json::Value::Null),
            sid: sid.clone(),
            state: Arc::clone(&state),
        };
        let response = methods.dispatch(ctx).await;
        if let Ok(json) = serde_json::to_string(&response) {
            let _ = client_tx.send(json);
        }
    }

    // ── Cleanup ──────────────────────────────────────────────────────────
    // No KV mutation on disconnect: chats persist across brief drops.

    state.room_manager.remove_session(&sid);
    let duration = state
        .remove_client(&sid)
        .await
        .map(|c| c.connected_at.elapsed())
        .unwrap_or_default();

    info!(sid, user_id, duration_secs = duration.as_secs(), "ws: connection closed");

    drop(client_tx);
    write_handle.abort();
}

/// Wait for the first `connect` request frame.
async fn wait_for_connect(
    rx: &mut futures::stream::SplitStream<WebSocket>,
) -> Result<(String, ConnectParams), String> {
    while let Some(msg) = rx.next().await {
        let text = match msg {
            Ok(Message::Text(t)) => t.to_string(),
            Ok(Message::Close(_)) => return Err("connection closed before handshake".into()),
            Ok(_) => continue,
            Err(e) => return Err(format!("read error before handshake: {e}")),
        };

        let frame: ClientFrame =
            serde_json::from_str(&text).map_err(|e| format!("invalid handshake frame: {e}"))?;
        let ClientFrame::Request(RequestFrame { id, method, params }) = frame;
        if method != "connect" {
            return Err(format!("first message must be 'connect', got '{method}'"));
        }
        let params: ConnectParams =
            serde_json::from_value(params.unwrap_or(serde_json::Value::Null))
                .map_err(|e| format!("invalid connect params: {e}"))?;
        return Ok((id, params));
    }
    Err("connection closed before handshake".into())
}
