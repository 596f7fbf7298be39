//! Inter-service event bus subscriber.
//!
//! The REST API publishes chat events on a single Redis pub/sub channel;
//! this crate owns the long-lived listener task that consumes them. The
//! listener never takes the process down: transport failures reconnect with
//! exponential backoff, malformed messages are logged and dropped, and a
//! cancellation token shuts the task down cleanly.

use std::{sync::Arc, time::Duration};

use {
    async_trait::async_trait,
    futures::StreamExt,
    thiserror::Error,
    tokio::task::JoinHandle,
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
};

use accord_protocol::{
    CHAT_EVENTS_CHANNEL, ChatAccepted, ChatRequestReceived, ChatRequestResponse,
};

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum Error {
    #[error("pub/sub transport error: {0}")]
    Transport(#[from] redis::RedisError),
}

pub type Result<T> = std::result::Result<T, Error>;

// ── Events ───────────────────────────────────────────────────────────────────

/// A recognized event from the `chat:events` channel.
#[derive(Debug, Clone, PartialEq)]
pub enum BusEvent {
    ChatAccepted(ChatAccepted),
    ChatRequestResponse(ChatRequestResponse),
    ChatRequestReceived(ChatRequestReceived),
}

/// Parse a raw channel payload.
///
/// `Ok(None)` means a well-formed envelope with an event type this service
/// does not handle — skipped, never fatal. `Err` means malformed JSON.
pub fn parse_event(raw: &str) -> std::result::Result<Option<BusEvent>, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_str(raw)?;
    let Some(kind) = value.get("event").and_then(|v| v.as_str()).map(str::to_string) else {
        return Ok(None);
    };

    let event = match kind.as_str() {
        "chat_accepted" => BusEvent::ChatAccepted(serde_json::from_value(value)?),
        "chat_request_response" => BusEvent::ChatRequestResponse(serde_json::from_value(value)?),
        "chat_request_received" => BusEvent::ChatRequestReceived(serde_json::from_value(value)?),
        _ => return Ok(None),
    };
    Ok(Some(event))
}

/// Receiver for dispatched bus events.
#[async_trait]
pub trait BusHandler: Send + Sync {
    async fn on_event(&self, event: BusEvent);
}

// ── Subscriber ───────────────────────────────────────────────────────────────

/// Subscribes to [`CHAT_EVENTS_CHANNEL`] and dispatches events to a handler.
pub struct Subscriber {
    redis_url: String,
}

impl Subscriber {
    pub fn new(redis_url: impl Into<String>) -> Self {
        Self {
            redis_url: redis_url.into(),
        }
    }

    /// Spawn the background listener task. The task runs until `cancel` is
    /// triggered; it survives any transport failure by reconnecting.
    pub fn spawn(self, handler: Arc<dyn BusHandler>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.listen(handler, cancel).await })
    }

    async fn listen(self, handler: Arc<dyn BusHandler>, cancel: CancellationToken) {
        let mut backoff = INITIAL_BACKOFF;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("pub/sub listener cancelled");
                    return;
                }
                result = self.run_subscription(&handler, &mut backoff) => {
                    match result {
                        Ok(()) => info!("pub/sub stream ended, reconnecting"),
                        Err(e) => {
                            warn!(error = %e, delay_s = backoff.as_secs(), "pub/sub listener error, reconnecting after delay");
                        },
                    }
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("pub/sub listener cancelled");
                    return;
                }
                _ = tokio::time::sleep(backoff) => {}
            }
            backoff = next_backoff(backoff);
        }
    }

    /// One subscription lifetime: connect, subscribe, pump messages until
    /// the stream breaks.
    async fn run_subscription(
        &self,
        handler: &Arc<dyn BusHandler>,
        backoff: &mut Duration,
    ) -> Result<()> {
        let client = redis::Client::open(self.redis_url.as_str())?;
        let mut pubsub = client.get_async_pubsub().await?;
        pubsub.subscribe(CHAT_EVENTS_CHANNEL).await?;
        info!(channel = CHAT_EVENTS_CHANNEL, "subscribed to event bus");

        let mut stream = pubsub.on_message();
        while let Some(msg) = stream.next().await {
            // Any delivered message proves the transport is healthy again.
            *backoff = INITIAL_BACKOFF;

            let payload: String = match msg.get_payload() {
                Ok(p) => p,
                Err(e) => {
                    warn!(error = %e, "undecodable pub/sub payload, skipping");
                    continue;
                },
            };

            match parse_event(&payload) {
                Ok(Some(event)) => {
                    debug!(?event, "dispatching bus event");
                    handler.on_event(event).await;
                },
                Ok(None) => warn!(payload, "unknown pub/sub event, skipping"),
                Err(e) => error!(error = %e, "invalid JSON in pub/sub message, skipping"),
            }
        }
        Ok(())
    }
}

fn next_backoff(current: Duration) -> Duration {
    (current * 2).min(MAX_BACKOFF)
}

#[cfg(test)]
mod tests {
    use {super::*, accord_protocol::RequestResponse};

    #[test]
    fn parses_chat_accepted() {
        let raw = r#"{
            "event": "chat_accepted",
            "chatLogId": "C1",
            "chatRequestId": "R1",
            "initiatorUserId": "U1",
            "responderUserId": "U2",
            "positionStatement": "X"
        }"#;
        let Some(BusEvent::ChatAccepted(event)) = parse_event(raw).unwrap() else {
            panic!("expected chat_accepted");
        };
        assert_eq!(event.chat_log_id, "C1");
        assert_eq!(event.initiator_user_id, "U1");
    }

    #[test]
    fn parses_chat_request_response() {
        let raw = r#"{
            "event": "chat_request_response",
            "requestId": "R1",
            "response": "accepted",
            "initiatorUserId": "U1",
            "chatLogId": "C1"
        }"#;
        let Some(BusEvent::ChatRequestResponse(event)) = parse_event(raw).unwrap() else {
            panic!("expected chat_request_response");
        };
        assert_eq!(event.response, RequestResponse::Accepted);
        assert_eq!(event.chat_log_id.as_deref(), Some("C1"));
    }

    #[test]
    fn parses_chat_request_received_with_card_payload() {
        let raw = r#"{
            "event": "chat_request_received",
            "userId": "U2",
            "type": "chat_request",
            "data": {"id": "R1"}
        }"#;
        let Some(BusEvent::ChatRequestReceived(event)) = parse_event(raw).unwrap() else {
            panic!("expected chat_request_received");
        };
        assert_eq!(event.user_id, "U2");
        assert_eq!(event.card["data"]["id"], "R1");
    }

    #[test]
    fn unknown_event_is_skipped_not_fatal() {
        let raw = r#"{"event": "user_banned", "userId": "U1"}"#;
        assert_eq!(parse_event(raw).unwrap(), None);
    }

    #[test]
    fn missing_discriminator_is_skipped() {
        assert_eq!(parse_event(r#"{"foo": 1}"#).unwrap(), None);
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(parse_event("{not json").is_err());
    }

    #[test]
    fn backoff_doubles_to_a_cap() {
        let mut delay = INITIAL_BACKOFF;
        let mut observed = Vec::new();
        for _ in 0..8 {
            observed.push(delay.as_secs());
            delay = next_backoff(delay);
        }
        assert_eq!(observed, vec![1, 2, 4, 8, 16, 32, 60, 60]);
    }
}
