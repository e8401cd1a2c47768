//! Request extractors shared by the script handlers.
//!
//! - [`auth::ApiToken`] -- Resolves the Bearer token to a token definition.
//! - [`auth::CallerIp`] -- The peer address of the connection, when known.

pub mod auth;
