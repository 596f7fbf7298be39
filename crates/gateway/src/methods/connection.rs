//! Session-scoped methods: joining chat rooms and heartbeats.

use {
    accord_protocol::error_codes,
    accord_rooms::RoomManager,
    serde_json::json,
    tracing::{info, warn},
};

use super::{MethodRegistry, require_participant, store_error};

pub(super) fn register(reg: &mut MethodRegistry) {
    // join_chat: enter the chat room and return the initial state snapshot.
    reg.register(
        "join_chat",
        Box::new(|ctx| {
            Box::pin(async move {
                let user_id = ctx.user_id()?;
                let chat_id = ctx.require_str(
                    "chatId",
                    error_codes::MISSING_CHAT_ID,
                    "Missing chatId",
                )?;
                require_participant(&ctx.state, &chat_id, &user_id).await?;

                ctx.state
                    .enter_room(&ctx.sid, &RoomManager::chat_room(&chat_id))
                    .await;
                ctx.state.room_manager.update_activity(&ctx.sid);

                let messages = ctx
                    .state
                    .store
                    .get_messages(&chat_id, 0, -1)
                    .await
                    .map_err(store_error)?;
                let positions = ctx
                    .state
                    .store
                    .get_all_agreed_positions(&chat_id)
                    .await
                    .map_err(store_error)?;

                let metadata = ctx
                    .state
                    .store
                    .get_chat_metadata(&chat_id)
                    .await
                    .map_err(store_error)?;
                let other_user_connected = metadata.is_some_and(|meta| {
                    meta.participant_ids
                        .iter()
                        .any(|id| id != &user_id && ctx.state.room_manager.is_user_connected(id))
                });

                info!(
                    user_id,
                    chat_id,
                    other_user_connected,
                    messages = messages.len(),
                    "user joined chat"
                );

                Ok(json!({
                    "status": "joined",
                    "chatId": chat_id,
                    "messages": messages,
                    "agreedPositions": positions,
                    "otherUserConnected": other_user_connected,
                }))
            })
        }),
    );

    // ping: heartbeat — touches activity and refreshes in-app presence.
    reg.register(
        "ping",
        Box::new(|ctx| {
            Box::pin(async move {
                ctx.state.room_manager.update_activity(&ctx.sid);

                if let Ok(user_id) = ctx.user_id() {
                    if let Err(e) = ctx.state.store.record_in_app(&user_id).await {
                        warn!(user_id, error = %e, "failed to refresh in-app presence");
                    }
                }

                Ok(json!({ "type": "pong" }))
            })
        }),
    );
}
