//! Shared error plumbing used across the accord chat-server crates.

pub mod error;

pub use error::FromMessage;
