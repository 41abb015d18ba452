//! Orbit broker library.
//!
//! Owns the pseudo-terminal processes behind each WebSocket connection, the
//! connection registry, message routing, and the assistant question flow.
//! The `orbit` binary wires these together behind an axum server.

pub mod api;
pub mod assistant;
pub mod config;
pub mod pty;
pub mod session;
pub mod ws;
