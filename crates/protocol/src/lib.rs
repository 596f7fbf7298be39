//! Chat-server WebSocket/RPC protocol definitions.
//!
//! All communication uses JSON text frames over WebSocket.
//!
//! Frame types:
//! - `ClientFrame::Request` — client → server call (each carries an id the
//!   server answers with a matching `ResponseFrame`, the "ack")
//! - `ResponseFrame`        — server → client call result
//! - `EventFrame`           — server → client push (broadcasts, direct emits)
//!
//! The first request on a connection must be `connect` with `auth.token`
//! set; everything else is rejected until the handshake completes.

use serde::{Deserialize, Serialize};

// ── Constants ────────────────────────────────────────────────────────────────

pub const MAX_PAYLOAD_BYTES: usize = 65_536; // 64 KB
pub const HANDSHAKE_TIMEOUT_MS: u64 = 10_000; // 10s

/// Longest agreed-position proposal a client may submit, in characters.
pub const MAX_PROPOSAL_CHARS: usize = 1_000;

/// Pub/sub channel the REST API publishes chat events on.
pub const CHAT_EVENTS_CHANNEL: &str = "chat:events";

// ── Error codes ──────────────────────────────────────────────────────────────

pub mod error_codes {
    // Handshake
    pub const AUTH_REQUIRED: &str = "AUTH_REQUIRED";
    pub const INVALID_TOKEN: &str = "INVALID_TOKEN";
    pub const USER_NOT_FOUND: &str = "USER_NOT_FOUND";

    // Operation-level
    pub const NOT_AUTHENTICATED: &str = "NOT_AUTHENTICATED";
    pub const MISSING_CHAT_ID: &str = "MISSING_CHAT_ID";
    pub const MISSING_CONTENT: &str = "MISSING_CONTENT";
    pub const MISSING_MESSAGE_ID: &str = "MISSING_MESSAGE_ID";
    pub const MISSING_PROPOSAL_ID: &str = "MISSING_PROPOSAL_ID";
    pub const MISSING_REQUEST_ID: &str = "MISSING_REQUEST_ID";
    pub const MISSING_USER_ID: &str = "MISSING_USER_ID";
    pub const NOT_PARTICIPANT: &str = "NOT_PARTICIPANT";
    pub const INVALID_ACTION: &str = "INVALID_ACTION";
    pub const CONTENT_TOO_LONG: &str = "CONTENT_TOO_LONG";
    pub const PROPOSAL_NOT_FOUND: &str = "PROPOSAL_NOT_FOUND";
    pub const PROPOSAL_NOT_PENDING: &str = "PROPOSAL_NOT_PENDING";
    pub const CANNOT_ACCEPT_OWN: &str = "CANNOT_ACCEPT_OWN";
    pub const CANNOT_REJECT_OWN: &str = "CANNOT_REJECT_OWN";
    pub const CANNOT_MODIFY_OWN: &str = "CANNOT_MODIFY_OWN";
    pub const CREATE_FAILED: &str = "CREATE_FAILED";
    pub const PARTICIPANTS_NOT_FOUND: &str = "PARTICIPANTS_NOT_FOUND";
    pub const EXPORT_FAILED: &str = "EXPORT_FAILED";
    pub const STORE_UNAVAILABLE: &str = "STORE_UNAVAILABLE";
    pub const UNKNOWN_METHOD: &str = "UNKNOWN_METHOD";
}

// ── Event names ──────────────────────────────────────────────────────────────

pub mod events {
    pub const AUTHENTICATED: &str = "authenticated";
    pub const CHAT_REQUEST_RECEIVED: &str = "chat_request_received";
    pub const CHAT_REQUEST_ACCEPTED: &str = "chat_request_accepted";
    pub const CHAT_REQUEST_DECLINED: &str = "chat_request_declined";
    pub const CHAT_STARTED: &str = "chat_started";
    pub const MESSAGE: &str = "message";
    pub const TYPING: &str = "typing";
    pub const READ_RECEIPT: &str = "read_receipt";
    pub const AGREED_POSITION: &str = "agreed_position";
    pub const STATUS: &str = "status";
    pub const ERROR: &str = "error";
}

// ── Error shape ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorShape {
    pub code: String,
    pub message: String,
}

impl ErrorShape {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

// ── Frames ───────────────────────────────────────────────────────────────────

/// Discriminated union of frames the server accepts from clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientFrame {
    #[serde(rename = "req")]
    Request(RequestFrame),
}

/// Client → server call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestFrame {
    pub id: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

/// Server → client call result (the ack).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseFrame {
    pub r#type: String, // always "res"
    pub id: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorShape>,
}

impl ResponseFrame {
    pub fn ok(id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            r#type: "res".into(),
            id: id.into(),
            ok: true,
            payload: Some(payload),
            error: None,
        }
    }

    pub fn err(id: impl Into<String>, error: ErrorShape) -> Self {
        Self {
            r#type: "res".into(),
            id: id.into(),
            ok: false,
            payload: None,
            error: Some(error),
        }
    }
}

/// Server → client push event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventFrame {
    pub r#type: String, // always "event"
    pub event: String,
    pub payload: serde_json::Value,
}

impl EventFrame {
    pub fn new(event: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            r#type: "event".into(),
            event: event.into(),
            payload,
        }
    }
}

// ── Connect handshake ────────────────────────────────────────────────────────

/// Parameters sent by the client in the initial `connect` request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<ConnectAuth>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectAuth {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

// ── Pub/sub envelopes ────────────────────────────────────────────────────────

/// Events the REST API publishes on [`CHAT_EVENTS_CHANNEL`].
///
/// The envelope is a JSON object with a required `event` discriminator.
/// Unknown discriminators are not an error — the subscriber logs and skips
/// them — so parsing happens in two steps (see `accord-bus`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatAccepted {
    pub chat_log_id: String,
    pub chat_request_id: String,
    pub initiator_user_id: String,
    pub responder_user_id: String,
    #[serde(default)]
    pub position_statement: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequestResponse {
    pub request_id: String,
    pub response: RequestResponse,
    pub initiator_user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_log_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestResponse {
    Accepted,
    Dismissed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequestReceived {
    pub user_id: String,
    /// Card payload relayed to the target user verbatim.
    #[serde(flatten)]
    pub card: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_frame_round_trip() {
        let json = r#"{"type":"req","id":"1","method":"ping","params":{}}"#;
        let frame: ClientFrame = serde_json::from_str(json).unwrap();
        let ClientFrame::Request(req) = frame;
        assert_eq!(req.id, "1");
        assert_eq!(req.method, "ping");
    }

    #[test]
    fn response_frame_error_shape() {
        let res = ResponseFrame::err("7", ErrorShape::new("MISSING_CHAT_ID", "Missing chatId"));
        let json = serde_json::to_value(&res).unwrap();
        assert_eq!(json["type"], "res");
        assert_eq!(json["ok"], false);
        assert_eq!(json["error"]["code"], "MISSING_CHAT_ID");
        assert!(json.get("payload").is_none());
    }

    #[test]
    fn chat_accepted_parses_camel_case() {
        let json = r#"{
            "event": "chat_accepted",
            "chatLogId": "C1",
            "chatRequestId": "R1",
            "initiatorUserId": "U1",
            "responderUserId": "U2",
            "positionStatement": "X"
        }"#;
        let event: ChatAccepted = serde_json::from_str(json).unwrap();
        assert_eq!(event.chat_log_id, "C1");
        assert_eq!(event.responder_user_id, "U2");
        assert_eq!(event.position_statement, "X");
    }

    #[test]
    fn chat_request_response_optional_chat_log() {
        let json = r#"{"requestId":"R1","response":"dismissed","initiatorUserId":"U1"}"#;
        let event: ChatRequestResponse = serde_json::from_str(json).unwrap();
        assert_eq!(event.response, RequestResponse::Dismissed);
        assert!(event.chat_log_id.is_none());
    }
}
