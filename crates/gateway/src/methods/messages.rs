//! Message, typing, and read-receipt methods.

use {
    accord_protocol::{error_codes, events},
    accord_rooms::RoomManager,
    accord_store::MessageType,
    serde_json::json,
    tracing::debug,
};

use crate::broadcast::{EmitOpts, emit_to_room};

use super::{MethodRegistry, require_participant, store_error};

/// Shape a stored message the way clients see it on the wire.
fn message_payload(chat_id: &str, msg: &accord_store::ChatMessage) -> serde_json::Value {
    json!({
        "id": msg.id,
        "chatLogId": chat_id,
        "sender": msg.sender_id,
        "type": msg.r#type,
        "content": msg.content,
        "sendTime": msg.timestamp,
    })
}

pub(super) fn register(reg: &mut MethodRegistry) {
    // message: persist, then broadcast to the chat room. The persisted copy
    // is the canonical order; the broadcast (sender included) echoes it.
    reg.register(
        "message",
        Box::new(|ctx| {
            Box::pin(async move {
                let user_id = ctx.user_id()?;
                ctx.state.room_manager.update_activity(&ctx.sid);

                let chat_id = ctx.require_str(
                    "chatId",
                    error_codes::MISSING_CHAT_ID,
                    "Missing chatId",
                )?;
                let content = ctx.require_str(
                    "content",
                    error_codes::MISSING_CONTENT,
                    "Missing content",
                )?;
                let message_type = ctx
                    .params
                    .get("messageType")
                    .and_then(|v| serde_json::from_value::<MessageType>(v.clone()).ok())
                    .unwrap_or_default();

                require_participant(&ctx.state, &chat_id, &user_id).await?;

                let msg = ctx
                    .state
                    .store
                    .add_message(&chat_id, &user_id, message_type, &content)
                    .await
                    .map_err(store_error)?;

                emit_to_room(
                    &ctx.state,
                    &RoomManager::chat_room(&chat_id),
                    events::MESSAGE,
                    message_payload(&chat_id, &msg),
                    EmitOpts::default(),
                )
                .await;

                debug!(message_id = %msg.id, chat_id, user_id, "message sent");
                Ok(json!({ "status": "sent", "messageId": msg.id }))
            })
        }),
    );

    // get_messages: history slice, inclusive range, end = -1 means last.
    reg.register(
        "get_messages",
        Box::new(|ctx| {
            Box::pin(async move {
                let user_id = ctx.user_id()?;
                let chat_id = ctx.require_str(
                    "chatId",
                    error_codes::MISSING_CHAT_ID,
                    "Missing chatId",
                )?;
                require_participant(&ctx.state, &chat_id, &user_id).await?;

                let start = ctx.params.get("start").and_then(|v| v.as_i64()).unwrap_or(0);
                let end = ctx.params.get("end").and_then(|v| v.as_i64()).unwrap_or(-1);

                let messages = ctx
                    .state
                    .store
                    .get_messages(&chat_id, start as isize, end as isize)
                    .await
                    .map_err(store_error)?;

                let messages: Vec<_> = messages
                    .iter()
                    .map(|m| message_payload(&chat_id, m))
                    .collect();
                Ok(json!({ "status": "ok", "messages": messages }))
            })
        }),
    );

    // typing: ephemeral — broadcast with the sender excluded, nothing stored.
    reg.register(
        "typing",
        Box::new(|ctx| {
            Box::pin(async move {
                let user_id = ctx.user_id()?;
                let chat_id = ctx.require_str(
                    "chatId",
                    error_codes::MISSING_CHAT_ID,
                    "Missing chatId",
                )?;
                let is_typing = ctx
                    .params
                    .get("isTyping")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);

                require_participant(&ctx.state, &chat_id, &user_id).await?;

                emit_to_room(
                    &ctx.state,
                    &RoomManager::chat_room(&chat_id),
                    events::TYPING,
                    json!({
                        "chatId": chat_id,
                        "userId": user_id,
                        "isTyping": is_typing,
                    }),
                    EmitOpts {
                        skip_sid: Some(&ctx.sid),
                    },
                )
                .await;

                Ok(json!({ "status": "ok" }))
            })
        }),
    );

    // mark_read: broadcast-only; clients are the source of truth for read
    // state and deduplicate on their side.
    reg.register(
        "mark_read",
        Box::new(|ctx| {
            Box::pin(async move {
                let user_id = ctx.user_id()?;
                let chat_id = ctx.require_str(
                    "chatId",
                    error_codes::MISSING_CHAT_ID,
                    "Missing chatId",
                )?;
                let message_id = ctx.require_str(
                    "messageId",
                    error_codes::MISSING_MESSAGE_ID,
                    "Missing messageId",
                )?;

                emit_to_room(
                    &ctx.state,
                    &RoomManager::chat_room(&chat_id),
                    events::READ_RECEIPT,
                    json!({
                        "chatId": chat_id,
                        "userId": user_id,
                        "messageId": message_id,
                    }),
                    EmitOpts::default(),
                )
                .await;

                debug!(user_id, chat_id, message_id, "read receipt broadcast");
                Ok(json!({ "status": "ok" }))
            })
        }),
    );
}
