//! Typed KV-store adapter for active chat state.
//!
//! Everything a live chat needs — messages, agreed-position proposals, the
//! closure singleton, metadata, per-user active-chat sets — lives in Redis
//! under the keyspace described in [`keys`]. Every chat key carries a TTL so
//! a crashed chat that never exported cannot leak. The relational archive
//! (`accord-archive`) is the durable copy; this store is authoritative only
//! while the chat is active.

pub mod error;
pub mod keys;
pub mod presence;
pub mod types;

mod chat;

pub use {
    chat::ChatStore,
    error::{Error, Result},
    presence::{Availability, DeliveryContext, Presence},
    types::{
        AgreedPosition, ChatExportData, ChatMessage, ChatMetadata, ClosureProposal, MessageType,
        ProposalStatus,
    },
};
