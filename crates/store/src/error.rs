use {accord_common::FromMessage, thiserror::Error};

#[derive(Debug, Error)]
pub enum Error {
    /// The KV backend could not be reached. Transient: callers surface this
    /// as an operation-level error and the client retries.
    #[error("kv store unavailable: {0}")]
    Unavailable(#[from] redis::RedisError),

    /// A multi-key write landed partially. The adapter rolled forward as far
    /// as it could; the remaining keys will expire on their own TTL.
    #[error("kv store degraded: {context}")]
    Degraded { context: String },

    /// A stored value failed to decode.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn degraded(context: impl Into<String>) -> Self {
        Self::Degraded {
            context: context.into(),
        }
    }
}

impl FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message { message }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

accord_common::impl_context!();
