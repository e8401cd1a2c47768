//! Domain logic for running predefined shell scripts on behalf of callers.
//!
//! Nothing here knows about HTTP; the API crate drives these modules.

pub mod access;
pub mod config;
pub mod definitions;
pub mod error;
pub mod execution;
pub mod invocation;
pub mod lock;
pub mod model;
pub mod process;
pub mod redact;
pub mod staging;
pub mod transform;
pub mod types;
