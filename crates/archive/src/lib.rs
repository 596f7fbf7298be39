//! Archival exporter: the durable, relational side of a chat's life.
//!
//! Active chats live in the KV store; when one terminates, its full snapshot
//! is written to the `chat_log` table here. Once `export_chat` succeeds the
//! KV copy may be deleted — never before. The exporter also resolves
//! identity-provider subjects to internal user ids and answers the
//! catch-up query for chat requests a user missed while offline.

pub mod cards;
pub mod error;

mod exporter;

pub use {
    cards::Card,
    error::{Error, Result},
    exporter::{ChatArchive, EndType},
};
