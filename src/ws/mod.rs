//! WebSocket layer: connection handling, message routing, subscriptions.
//!
//! The WebSocket endpoint at `/ws` streams [`crate::domain::LedgerEvent`]s
//! for the loans a client has subscribed to.

pub mod connection;
pub mod handler;
pub mod messages;
pub mod subscription;
