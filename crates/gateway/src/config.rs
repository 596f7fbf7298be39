//! Runtime configuration, sourced from the environment by the CLI.

/// Default bind address.
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8002;

/// Backup TTL on active-chat keys: chats normally export and delete on
/// termination, this only bounds leakage after a crash.
pub const DEFAULT_MESSAGE_TTL_SECS: u64 = 86_400;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub redis_url: String,
    pub jwt_secret: String,
    pub jwt_algorithm: String,
    pub message_ttl_secs: u64,
}

impl Config {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
