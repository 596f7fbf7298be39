//! Bridges pub/sub bus events into client-facing pushes.
//!
//! The REST API owns chat-request acceptance; this side only materializes
//! the resulting chat in the KV store and tells both users. A missed event
//! here is recoverable: the reconnect path re-surfaces active chats and
//! pending requests.

use std::sync::Arc;

use {
    async_trait::async_trait,
    serde_json::json,
    tracing::{error, info},
};

use {
    accord_bus::{BusEvent, BusHandler},
    accord_protocol::{
        ChatAccepted, ChatRequestReceived, ChatRequestResponse, RequestResponse, events,
    },
    accord_rooms::RoomManager,
};

use crate::{broadcast::emit_to_user, state::GatewayState};

pub struct GatewayEvents {
    state: Arc<GatewayState>,
}

impl GatewayEvents {
    pub fn new(state: Arc<GatewayState>) -> Arc<Self> {
        Arc::new(Self { state })
    }

    /// Set up the chat in the KV store, pull both users' sessions into the
    /// chat room, and notify each side with their role.
    async fn on_chat_accepted(&self, event: ChatAccepted) {
        if event.chat_log_id.is_empty()
            || event.initiator_user_id.is_empty()
            || event.responder_user_id.is_empty()
        {
            error!(?event, "invalid chat_accepted event");
            return;
        }

        let chat_id = event.chat_log_id.as_str();
        let participants = vec![
            event.initiator_user_id.clone(),
            event.responder_user_id.clone(),
        ];

        if let Err(e) = self.state.store.create_chat(chat_id, &participants).await {
            error!(chat_id, error = %e, "failed to create chat from chat_accepted");
            return;
        }

        let chat_room = RoomManager::chat_room(chat_id);
        for user_id in &participants {
            for sid in self.state.room_manager.get_user_sids(user_id) {
                self.state.enter_room(&sid, &chat_room).await;
            }
        }

        // Each side hears about the chat in their personal room with their
        // role: the initiator's request was accepted, the responder accepted.
        emit_to_user(
            &self.state,
            &event.initiator_user_id,
            events::CHAT_STARTED,
            json!({
                "chatId": chat_id,
                "otherUserId": event.responder_user_id,
                "positionStatement": event.position_statement,
                "role": "initiator",
            }),
        )
        .await;
        emit_to_user(
            &self.state,
            &event.responder_user_id,
            events::CHAT_STARTED,
            json!({
                "chatId": chat_id,
                "otherUserId": event.initiator_user_id,
                "positionStatement": event.position_statement,
                "role": "responder",
            }),
        )
        .await;

        info!(chat_id, participants = ?participants, "chat set up from chat_accepted");
    }

    async fn on_chat_request_response(&self, event: ChatRequestResponse) {
        match event.response {
            RequestResponse::Accepted => {
                emit_to_user(
                    &self.state,
                    &event.initiator_user_id,
                    events::CHAT_REQUEST_ACCEPTED,
                    json!({
                        "requestId": event.request_id,
                        "chatLogId": event.chat_log_id,
                    }),
                )
                .await;
            },
            RequestResponse::Dismissed => {
                emit_to_user(
                    &self.state,
                    &event.initiator_user_id,
                    events::CHAT_REQUEST_DECLINED,
                    json!({ "requestId": event.request_id }),
                )
                .await;
            },
        }
    }

    async fn on_chat_request_received(&self, event: ChatRequestReceived) {
        // The envelope is the card plus routing fields; strip the
        // discriminator before relaying.
        let mut card = event.card;
        if let Some(obj) = card.as_object_mut() {
            obj.remove("event");
        }
        emit_to_user(
            &self.state,
            &event.user_id,
            events::CHAT_REQUEST_RECEIVED,
            card,
        )
        .await;
    }
}

#[async_trait]
impl BusHandler for GatewayEvents {
    async fn on_event(&self, event: BusEvent) {
        match event {
            BusEvent::ChatAccepted(e) => self.on_chat_accepted(e).await,
            BusEvent::ChatRequestResponse(e) => self.on_chat_request_response(e).await,
            BusEvent::ChatRequestReceived(e) => self.on_chat_request_received(e).await,
        }
    }
}
