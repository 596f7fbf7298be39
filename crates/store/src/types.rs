//! Chat state records as they are stored in Redis and exported to the
//! archive. All wire-facing field names are camelCase; the export snapshot
//! field order is an external contract read by the admin UI and post-chat
//! analytics, so fields here stay in declaration order.

use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    uuid::Uuid,
};

/// What kind of chat message this is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    #[default]
    Text,
    AgreedPositionProposal,
    AgreedClosureProposal,
    System,
}

/// A chat message. Append-only: never edited or removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub sender_id: String,
    pub r#type: MessageType,
    pub content: String,
    /// Reference to a proposal id, for proposal-carrying messages.
    pub target_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(sender_id: &str, message_type: MessageType, content: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sender_id: sender_id.to_string(),
            r#type: message_type,
            content: content.to_string(),
            target_id: None,
            timestamp: Utc::now(),
        }
    }
}

/// Lifecycle of an agreed-position proposal. Only `pending` may transition;
/// every other status is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Pending,
    Accepted,
    Rejected,
    Modified,
}

/// A statement one party offers as common ground.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgreedPosition {
    pub id: String,
    pub proposer_id: String,
    pub content: String,
    /// Set when this proposal was created as a modification of another.
    pub parent_id: Option<String>,
    pub status: ProposalStatus,
    pub is_closure: bool,
    pub timestamp: DateTime<Utc>,
}

impl AgreedPosition {
    pub fn new(proposer_id: &str, content: &str, is_closure: bool, parent_id: Option<&str>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            proposer_id: proposer_id.to_string(),
            content: content.to_string(),
            parent_id: parent_id.map(str::to_string),
            status: ProposalStatus::Pending,
            is_closure,
            timestamp: Utc::now(),
        }
    }
}

/// The closure singleton: at most one per chat, overwritten by each new
/// closure propose/modify, cleared on rejection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClosureProposal {
    pub id: String,
    pub proposer_id: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ClosureProposal {
    pub fn new(proposer_id: &str, content: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            proposer_id: proposer_id.to_string(),
            content: content.to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// Identity of an active chat: who is in it and when it started.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMetadata {
    pub chat_id: String,
    pub participant_ids: Vec<String>,
    pub start_time: DateTime<Utc>,
}

impl ChatMetadata {
    pub fn is_participant(&self, user_id: &str) -> bool {
        self.participant_ids.iter().any(|id| id == user_id)
    }

    /// The other participant of a two-party chat.
    pub fn peer_of(&self, user_id: &str) -> Option<&str> {
        self.participant_ids
            .iter()
            .find(|id| *id != user_id)
            .map(String::as_str)
    }
}

/// Flat snapshot written to the archive's `log` column on termination.
///
/// Field names and order are an external contract — do not rename.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatExportData {
    pub messages: Vec<ChatMessage>,
    pub agreed_positions: Vec<AgreedPosition>,
    pub agreed_closure: Option<ClosureProposal>,
    pub metadata: Option<ChatMetadata>,
    pub export_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_by_user_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_serializes_camel_case() {
        let msg = ChatMessage::new("u1", MessageType::Text, "hi");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["senderId"], "u1");
        assert_eq!(json["type"], "text");
        assert_eq!(json["content"], "hi");
        assert!(json["targetId"].is_null());
    }

    #[test]
    fn proposal_starts_pending() {
        let pos = AgreedPosition::new("u1", "common ground", false, None);
        assert_eq!(pos.status, ProposalStatus::Pending);
        assert!(pos.parent_id.is_none());

        let json = serde_json::to_value(&pos).unwrap();
        assert_eq!(json["status"], "pending");
        assert_eq!(json["isClosure"], false);
    }

    #[test]
    fn modification_links_parent() {
        let original = AgreedPosition::new("u1", "first", true, None);
        let modified = AgreedPosition::new("u2", "refined", true, Some(&original.id));
        assert_eq!(modified.parent_id.as_deref(), Some(original.id.as_str()));
        assert!(modified.is_closure);
    }

    #[test]
    fn metadata_peer_lookup() {
        let meta = ChatMetadata {
            chat_id: "c1".into(),
            participant_ids: vec!["u1".into(), "u2".into()],
            start_time: Utc::now(),
        };
        assert!(meta.is_participant("u1"));
        assert!(!meta.is_participant("u3"));
        assert_eq!(meta.peer_of("u1"), Some("u2"));
        assert_eq!(meta.peer_of("u3"), Some("u1"));
    }

    #[test]
    fn export_round_trip_is_byte_identical() {
        let export = ChatExportData {
            messages: vec![ChatMessage::new("u1", MessageType::Text, "hi")],
            agreed_positions: vec![AgreedPosition::new("u2", "agree", false, None)],
            agreed_closure: Some(ClosureProposal::new("u1", "done")),
            metadata: Some(ChatMetadata {
                chat_id: "c1".into(),
                participant_ids: vec!["u1".into(), "u2".into()],
                start_time: Utc::now(),
            }),
            export_time: Utc::now(),
            ended_by_user_id: None,
        };

        let first = serde_json::to_string(&export).unwrap();
        let reparsed: ChatExportData = serde_json::from_str(&first).unwrap();
        let second = serde_json::to_string(&reparsed).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn export_omits_absent_ended_by() {
        let export = ChatExportData {
            messages: vec![],
            agreed_positions: vec![],
            agreed_closure: None,
            metadata: None,
            export_time: Utc::now(),
            ended_by_user_id: None,
        };
        let json = serde_json::to_value(&export).unwrap();
        assert!(json.get("endedByUserId").is_none());
        assert!(json["messages"].is_array());
    }
}
