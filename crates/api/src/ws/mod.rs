//! WebSocket infrastructure for live script output.
//!
//! Provides the session hub and the HTTP upgrade handler used by Axum
//! routes.

mod handler;
pub mod hub;

pub use handler::ws_handler;
pub use hub::{ConnectionHub, HubError, HubEvent};
