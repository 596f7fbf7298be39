//! WebSocket gateway for the chat server.
//!
//! Owns the connection lifecycle: JWT handshake, per-session rooms, the
//! method registry every client request dispatches through, room-scoped
//! broadcast, and the pub/sub glue that turns REST-side events into client
//! pushes. One HTTP route (`GET /health`) exists for orchestration probes;
//! everything else is the WebSocket at `GET /ws`.

pub mod auth;
pub mod broadcast;
pub mod config;
pub mod events;
pub mod methods;
pub mod server;
pub mod state;
pub mod ws;

pub use {
    config::Config,
    state::{ConnectedClient, GatewayState},
};
