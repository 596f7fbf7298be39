//! Chat lifecycle: start, unilateral exit, and request relay.

use {
    accord_archive::EndType,
    accord_protocol::{ErrorShape, error_codes, events},
    accord_rooms::RoomManager,
    serde_json::json,
    tracing::{info, warn},
};

use crate::broadcast::{EmitOpts, emit_to_room, emit_to_user};

use super::{MethodRegistry, store_error};

pub(super) fn register(reg: &mut MethodRegistry) {
    // start_chat: the direct-start path (the usual path is the pub/sub
    // chat_accepted event). Creates the archival row first so the chat id
    // exists before any KV state does.
    reg.register(
        "start_chat",
        Box::new(|ctx| {
            Box::pin(async move {
                let user_id = ctx.user_id()?;
                let chat_request_id = ctx.require_str(
                    "chatRequestId",
                    error_codes::MISSING_REQUEST_ID,
                    "Missing chatRequestId",
                )?;

                let chat_id = match ctx.state.archive.create_chat_log(&chat_request_id).await {
                    Ok(id) => id,
                    Err(e) => {
                        warn!(chat_request_id, error = %e, "chat_log creation failed");
                        return Err(ErrorShape::new(
                            error_codes::CREATE_FAILED,
                            "Failed to create chat",
                        ));
                    },
                };

                let participants = ctx
                    .state
                    .archive
                    .get_chat_participants(&chat_id)
                    .await
                    .ok()
                    .flatten()
                    .ok_or_else(|| {
                        ErrorShape::new(
                            error_codes::PARTICIPANTS_NOT_FOUND,
                            "Could not find chat participants",
                        )
                    })?;

                ctx.state
                    .store
                    .create_chat(&chat_id, &participants)
                    .await
                    .map_err(store_error)?;

                let chat_room = RoomManager::chat_room(&chat_id);
                for participant_id in &participants {
                    for sid in ctx.state.room_manager.get_user_sids(participant_id) {
                        ctx.state.enter_room(&sid, &chat_room).await;
                    }
                }

                emit_to_room(
                    &ctx.state,
                    &chat_room,
                    events::STATUS,
                    json!({
                        "chatId": chat_id,
                        "status": "active",
                        "participants": participants,
                    }),
                    EmitOpts::default(),
                )
                .await;

                info!(chat_id, user_id, participants = ?participants, "chat started");
                Ok(json!({
                    "status": "started",
                    "chatId": chat_id,
                    "participants": participants,
                }))
            })
        }),
    );

    // exit_chat: unilateral termination. Export is the gate — if archival
    // fails the chat stays fully live and the client sees EXPORT_FAILED.
    reg.register(
        "exit_chat",
        Box::new(|ctx| {
            Box::pin(async move {
                let user_id = ctx.user_id()?;
                let chat_id = ctx.require_str(
                    "chatId",
                    error_codes::MISSING_CHAT_ID,
                    "Missing chatId",
                )?;

                let metadata = ctx
                    .state
                    .store
                    .get_chat_metadata(&chat_id)
                    .await
                    .map_err(store_error)?;
                let Some(metadata) = metadata.filter(|m| m.is_participant(&user_id)) else {
                    return Err(ErrorShape::new(
                        error_codes::NOT_PARTICIPANT,
                        "Not a participant in this chat",
                    ));
                };

                // Exit is a terminal transition too: take the chat lock so
                // it cannot interleave with an in-flight proposal accept.
                let lock = ctx.state.chat_lock(&chat_id);
                let _guard = lock.lock().await;

                let mut export_data = ctx
                    .state
                    .store
                    .get_chat_export_data(&chat_id)
                    .await
                    .map_err(store_error)?;
                export_data.ended_by_user_id = Some(user_id.clone());

                if let Err(e) = ctx
                    .state
                    .archive
                    .export_chat(&chat_id, &export_data, EndType::UserExit)
                    .await
                {
                    warn!(chat_id, error = %e, "exit export failed, chat stays live");
                    return Err(ErrorShape::new(
                        error_codes::EXPORT_FAILED,
                        "Failed to export chat",
                    ));
                }

                // Tell the peer this user left, then close the room out.
                if let Some(other_user_id) = metadata.peer_of(&user_id) {
                    emit_to_user(
                        &ctx.state,
                        other_user_id,
                        events::STATUS,
                        json!({
                            "chatId": chat_id,
                            "status": "user_left",
                            "userId": user_id,
                        }),
                    )
                    .await;
                }

                let chat_room = RoomManager::chat_room(&chat_id);
                emit_to_room(
                    &ctx.state,
                    &chat_room,
                    events::STATUS,
                    json!({
                        "chatId": chat_id,
                        "status": "ended",
                        "endType": "user_exit",
                    }),
                    EmitOpts::default(),
                )
                .await;

                for participant_id in &metadata.participant_ids {
                    for sid in ctx.state.room_manager.get_user_sids(participant_id) {
                        ctx.state.leave_room(&sid, &chat_room).await;
                    }
                }

                ctx.state
                    .store
                    .delete_chat(&chat_id)
                    .await
                    .map_err(store_error)?;
                ctx.state.release_chat_lock(&chat_id);

                info!(chat_id, user_id, "chat ended by user exit");
                Ok(json!({ "status": "ended", "chatId": chat_id }))
            })
        }),
    );

    // notify_chat_request: relay a request notification to the target
    // user's personal room. Only authenticated sessions reach this point;
    // in practice the REST API is the caller.
    reg.register(
        "notify_chat_request",
        Box::new(|ctx| {
            Box::pin(async move {
                let sender_user_id = ctx.user_id()?;
                let target_user_id = ctx.require_str(
                    "userId",
                    error_codes::MISSING_USER_ID,
                    "Missing userId",
                )?;

                emit_to_user(
                    &ctx.state,
                    &target_user_id,
                    events::CHAT_REQUEST_RECEIVED,
                    json!({
                        "requestId": ctx.params.get("requestId"),
                        "initiator": ctx.params.get("initiator"),
                        "position": ctx.params.get("position"),
                        "createdTime": ctx.params.get("createdTime"),
                    }),
                )
                .await;

                info!(target_user_id, sender_user_id, "chat request notification relayed");
                Ok(json!({ "status": "notified" }))
            })
        }),
    );
}
