use std::{collections::HashMap, future::Future, pin::Pin, sync::Arc};

use tracing::{debug, warn};

use accord_protocol::{ErrorShape, ResponseFrame, error_codes};

use crate::state::GatewayState;

mod connection;
mod lifecycle;
mod messages;
mod proposals;

// ── Types ────────────────────────────────────────────────────────────────────

/// Context passed to every method handler.
pub struct MethodContext {
    pub request_id: String,
    pub method: String,
    pub params: serde_json::Value,
    pub sid: String,
    pub state: Arc<GatewayState>,
}

impl MethodContext {
    /// The authenticated user behind this session. Sessions only exist after
    /// a successful handshake, but the idle reaper may have removed one out
    /// from under an in-flight request.
    pub fn user_id(&self) -> Result<String, ErrorShape> {
        self.state.room_manager.get_user_id(&self.sid).ok_or_else(|| {
            ErrorShape::new(error_codes::NOT_AUTHENTICATED, "Not authenticated")
        })
    }

    /// Required string param with a per-field error code.
    pub fn require_str(&self, key: &str, code: &str, message: &str) -> Result<String, ErrorShape> {
        self.params
            .get(key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or_else(|| ErrorShape::new(code, message))
    }

    pub fn optional_str(&self, key: &str) -> Option<String> {
        self.params
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }
}

/// The result a method handler produces: the ack payload or a typed error.
pub type MethodResult = Result<serde_json::Value, ErrorShape>;

/// A boxed async method handler.
pub type HandlerFn =
    Box<dyn Fn(MethodContext) -> Pin<Box<dyn Future<Output = MethodResult> + Send>> + Send + Sync>;

// ── Shared helpers ───────────────────────────────────────────────────────────

/// KV failures are transient dependency errors, surfaced per-operation.
pub(crate) fn store_error(e: accord_store::Error) -> ErrorShape {
    ErrorShape::new(error_codes::STORE_UNAVAILABLE, e.to_string())
}

/// Authorize a participant-bound operation.
pub(crate) async fn require_participant(
    state: &Arc<GatewayState>,
    chat_id: &str,
    user_id: &str,
) -> Result<(), ErrorShape> {
    let is_participant = state
        .store
        .is_chat_participant(chat_id, user_id)
        .await
        .map_err(store_error)?;
    if is_participant {
        Ok(())
    } else {
        Err(ErrorShape::new(
            error_codes::NOT_PARTICIPANT,
            "Not a participant in this chat",
        ))
    }
}

// ── Method registry ──────────────────────────────────────────────────────────

pub struct MethodRegistry {
    handlers: HashMap<String, HandlerFn>,
}

impl Default for MethodRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MethodRegistry {
    pub fn new() -> Self {
        let mut reg = Self {
            handlers: HashMap::new(),
        };
        connection::register(&mut reg);
        messages::register(&mut reg);
        proposals::register(&mut reg);
        lifecycle::register(&mut reg);
        reg
    }

    pub fn register(&mut self, method: impl Into<String>, handler: HandlerFn) {
        self.handlers.insert(method.into(), handler);
    }

    pub async fn dispatch(&self, ctx: MethodContext) -> ResponseFrame {
        let method = ctx.method.clone();
        let request_id = ctx.request_id.clone();
        let sid = ctx.sid.clone();

        let Some(handler) = self.handlers.get(&method) else {
            warn!(method, sid, "unknown method");
            return ResponseFrame::err(
                &request_id,
                ErrorShape::new(
                    error_codes::UNKNOWN_METHOD,
                    format!("unknown method: {method}"),
                ),
            );
        };

        debug!(method, request_id, sid, "dispatching method");
        match handler(ctx).await {
            Ok(payload) => ResponseFrame::ok(&request_id, payload),
            Err(err) => {
                warn!(method, request_id, code = %err.code, msg = %err.message, "method error");
                ResponseFrame::err(&request_id, err)
            },
        }
    }

    pub fn method_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_carries_the_full_event_surface() {
        let reg = MethodRegistry::new();
        let names = reg.method_names();
        for method in [
            "agreed_position",
            "exit_chat",
            "get_messages",
            "join_chat",
            "mark_read",
            "message",
            "notify_chat_request",
            "ping",
            "start_chat",
            "typing",
        ] {
            assert!(names.iter().any(|n| n == method), "missing {method}");
        }
    }
}
