use {
    chrono::Utc,
    redis::{AsyncCommands, aio::ConnectionManager},
    tracing::{debug, info},
};

use crate::{
    error::{Context, Error, Result},
    keys,
    types::{
        AgreedPosition, ChatExportData, ChatMessage, ChatMetadata, ClosureProposal, MessageType,
        ProposalStatus,
    },
};

/// Redis-backed store for active chat state.
///
/// Cheap to clone: the underlying connection manager multiplexes one
/// connection and reconnects on its own. All chat keys are written with the
/// configured TTL, refreshed on every write.
#[derive(Clone)]
pub struct ChatStore {
    con: ConnectionManager,
    ttl_secs: i64,
}

impl ChatStore {
    /// Connect to Redis and verify the connection with a ping.
    pub async fn connect(url: &str, ttl_secs: u64) -> Result<Self> {
        info!(url, "connecting to kv store");
        let client = redis::Client::open(url)?;
        let mut con = ConnectionManager::new(client).await?;
        let _: () = redis::cmd("PING").query_async(&mut con).await?;
        info!("kv store connected");
        Ok(Self {
            con,
            ttl_secs: ttl_secs as i64,
        })
    }

    /// Fresh handle onto the multiplexed connection.
    pub(crate) fn connection(&self) -> ConnectionManager {
        self.con.clone()
    }

    // ── Chat metadata ────────────────────────────────────────────────────

    /// Create a new chat. Idempotent only when called again with the same
    /// participants.
    pub async fn create_chat(
        &self,
        chat_id: &str,
        participant_ids: &[String],
    ) -> Result<ChatMetadata> {
        if let Some(existing) = self.get_chat_metadata(chat_id).await? {
            if existing.participant_ids == participant_ids {
                return Ok(existing);
            }
            return Err(Error::message(format!(
                "chat {chat_id} already exists with different participants"
            )));
        }

        let metadata = ChatMetadata {
            chat_id: chat_id.to_string(),
            participant_ids: participant_ids.to_vec(),
            start_time: Utc::now(),
        };

        let mut con = self.con.clone();
        let key = keys::metadata(chat_id);
        let fields = [
            ("chatId", metadata.chat_id.clone()),
            (
                "participantIds",
                serde_json::to_string(&metadata.participant_ids)?,
            ),
            ("startTime", metadata.start_time.to_rfc3339()),
        ];
        let _: () = con.hset_multiple(&key, &fields).await?;

        // Metadata is in; everything past this point rolls forward.
        let followup: Result<()> = async {
            let _: () = con.expire(&key, self.ttl_secs).await?;
            for user_id in participant_ids {
                let _: () = con.sadd(keys::user_active_chats(user_id), chat_id).await?;
            }
            Ok(())
        }
        .await;
        if let Err(e) = followup {
            return Err(Error::degraded(format!(
                "create_chat {chat_id} partially written: {e}"
            )));
        }

        info!(chat_id, participants = ?participant_ids, "chat created");
        Ok(metadata)
    }

    pub async fn get_chat_metadata(&self, chat_id: &str) -> Result<Option<ChatMetadata>> {
        let mut con = self.con.clone();
        let data: std::collections::HashMap<String, String> =
            con.hgetall(keys::metadata(chat_id)).await?;
        if data.is_empty() {
            return Ok(None);
        }

        let chat_id = data
            .get("chatId")
            .cloned()
            .unwrap_or_else(|| chat_id.to_string());
        let participant_ids = match data.get("participantIds") {
            Some(raw) => serde_json::from_str(raw)
                .with_context(|| format!("corrupt participantIds for chat {chat_id}"))?,
            None => Vec::new(),
        };
        let start_time = data
            .get("startTime")
            .and_then(|raw| raw.parse().ok())
            .unwrap_or_else(Utc::now);

        Ok(Some(ChatMetadata {
            chat_id,
            participant_ids,
            start_time,
        }))
    }

    /// Chat ids the user currently participates in.
    pub async fn get_user_active_chats(&self, user_id: &str) -> Result<Vec<String>> {
        let mut con = self.con.clone();
        let chats: Vec<String> = con.smembers(keys::user_active_chats(user_id)).await?;
        Ok(chats)
    }

    /// Authorization check used by every participant-bound operation.
    pub async fn is_chat_participant(&self, chat_id: &str, user_id: &str) -> Result<bool> {
        Ok(self
            .get_chat_metadata(chat_id)
            .await?
            .is_some_and(|meta| meta.is_participant(user_id)))
    }

    // ── Messages ─────────────────────────────────────────────────────────

    /// Append a message and refresh the list TTL. Returns the persisted
    /// message with its generated id and timestamp.
    pub async fn add_message(
        &self,
        chat_id: &str,
        sender_id: &str,
        message_type: MessageType,
        content: &str,
    ) -> Result<ChatMessage> {
        let message = ChatMessage::new(sender_id, message_type, content);

        let mut con = self.con.clone();
        let key = keys::messages(chat_id);
        let _: () = con.rpush(&key, serde_json::to_string(&message)?).await?;
        let _: () = con.expire(&key, self.ttl_secs).await?;

        debug!(chat_id, message_id = %message.id, "message stored");
        Ok(message)
    }

    /// Slice of the message list in insertion order. Range is inclusive at
    /// both ends; `end = -1` means the last message.
    pub async fn get_messages(
        &self,
        chat_id: &str,
        start: isize,
        end: isize,
    ) -> Result<Vec<ChatMessage>> {
        let mut con = self.con.clone();
        let raw: Vec<String> = con.lrange(keys::messages(chat_id), start, end).await?;
        raw.iter()
            .map(|m| serde_json::from_str(m).with_context(|| format!("corrupt message in chat {chat_id}")))
            .collect()
    }

    // ── Agreed positions ─────────────────────────────────────────────────

    /// Write a new `pending` proposal. Content length is the caller's
    /// responsibility; the adapter trusts it.
    pub async fn add_agreed_position(
        &self,
        chat_id: &str,
        proposer_id: &str,
        content: &str,
        is_closure: bool,
        parent_id: Option<&str>,
    ) -> Result<AgreedPosition> {
        let position = AgreedPosition::new(proposer_id, content, is_closure, parent_id);

        let mut con = self.con.clone();
        let key = keys::positions(chat_id);
        let _: () = con
            .hset(&key, &position.id, serde_json::to_string(&position)?)
            .await?;
        let _: () = con.expire(&key, self.ttl_secs).await?;

        Ok(position)
    }

    pub async fn get_agreed_position(
        &self,
        chat_id: &str,
        position_id: &str,
    ) -> Result<Option<AgreedPosition>> {
        let mut con = self.con.clone();
        let raw: Option<String> = con.hget(keys::positions(chat_id), position_id).await?;
        match raw {
            Some(raw) => {
                let position = serde_json::from_str(&raw)
                    .with_context(|| format!("corrupt proposal {position_id} in chat {chat_id}"))?;
                Ok(Some(position))
            },
            None => Ok(None),
        }
    }

    pub async fn get_all_agreed_positions(&self, chat_id: &str) -> Result<Vec<AgreedPosition>> {
        let mut con = self.con.clone();
        let raw: std::collections::HashMap<String, String> =
            con.hgetall(keys::positions(chat_id)).await?;
        raw.values()
            .map(|p| serde_json::from_str(p).with_context(|| format!("corrupt proposal in chat {chat_id}")))
            .collect()
    }

    /// Transition a proposal out of `pending`. The caller serializes
    /// concurrent transitions per chat; the adapter still refuses to touch a
    /// proposal that already left `pending`.
    pub async fn update_agreed_position_status(
        &self,
        chat_id: &str,
        position_id: &str,
        status: ProposalStatus,
    ) -> Result<Option<AgreedPosition>> {
        let Some(mut position) = self.get_agreed_position(chat_id, position_id).await? else {
            return Ok(None);
        };
        if position.status != ProposalStatus::Pending {
            return Err(Error::message(format!(
                "proposal {position_id} is {:?}, not pending",
                position.status
            )));
        }
        position.status = status;

        let mut con = self.con.clone();
        let _: () = con
            .hset(
                keys::positions(chat_id),
                position_id,
                serde_json::to_string(&position)?,
            )
            .await?;

        Ok(Some(position))
    }

    // ── Closure proposal ─────────────────────────────────────────────────

    /// Overwrite the closure singleton. Only one closure can be current.
    pub async fn set_closure_proposal(
        &self,
        chat_id: &str,
        proposer_id: &str,
        content: &str,
    ) -> Result<ClosureProposal> {
        let proposal = ClosureProposal::new(proposer_id, content);

        let mut con = self.con.clone();
        let _: () = con
            .set_ex(
                keys::closure(chat_id),
                serde_json::to_string(&proposal)?,
                self.ttl_secs as u64,
            )
            .await?;

        Ok(proposal)
    }

    pub async fn get_closure_proposal(&self, chat_id: &str) -> Result<Option<ClosureProposal>> {
        let mut con = self.con.clone();
        let raw: Option<String> = con.get(keys::closure(chat_id)).await?;
        match raw {
            Some(raw) => {
                let proposal = serde_json::from_str(&raw)
                    .with_context(|| format!("corrupt closure proposal in chat {chat_id}"))?;
                Ok(Some(proposal))
            },
            None => Ok(None),
        }
    }

    pub async fn clear_closure_proposal(&self, chat_id: &str) -> Result<()> {
        let mut con = self.con.clone();
        let _: () = con.del(keys::closure(chat_id)).await?;
        Ok(())
    }

    // ── Export / cleanup ─────────────────────────────────────────────────

    /// Assemble the full snapshot handed to the archival exporter.
    pub async fn get_chat_export_data(&self, chat_id: &str) -> Result<ChatExportData> {
        let messages = self.get_messages(chat_id, 0, -1).await?;
        let agreed_positions = self.get_all_agreed_positions(chat_id).await?;
        let agreed_closure = self.get_closure_proposal(chat_id).await?;
        let metadata = self.get_chat_metadata(chat_id).await?;

        Ok(ChatExportData {
            messages,
            agreed_positions,
            agreed_closure,
            metadata,
            export_time: Utc::now(),
            ended_by_user_id: None,
        })
    }

    /// Remove every key belonging to a chat and drop the chat from each
    /// participant's active set. Idempotent.
    pub async fn delete_chat(&self, chat_id: &str) -> Result<()> {
        let metadata = self.get_chat_metadata(chat_id).await?;

        let mut con = self.con.clone();
        let _: () = con
            .del(&[
                keys::messages(chat_id),
                keys::positions(chat_id),
                keys::closure(chat_id),
                keys::metadata(chat_id),
            ])
            .await?;

        if let Some(metadata) = metadata {
            for user_id in &metadata.participant_ids {
                let removed: std::result::Result<(), redis::RedisError> =
                    con.srem(keys::user_active_chats(user_id), chat_id).await;
                if let Err(e) = removed {
                    return Err(Error::degraded(format!(
                        "delete_chat {chat_id}: active-chat set for {user_id} not updated: {e}"
                    )));
                }
            }
        }

        info!(chat_id, "chat deleted from kv store");
        Ok(())
    }
}
