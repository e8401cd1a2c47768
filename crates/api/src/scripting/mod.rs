//! Script invocation service.
//!
//! The [`orchestrator::ScriptOrchestrator`] ties the core pipeline stages
//! to the connection hub and the configured lock store.

pub mod orchestrator;

pub use orchestrator::{InvocationRequest, ScriptOrchestrator};
