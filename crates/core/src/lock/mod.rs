//! Concurrency locks for scripts.

pub mod service;
pub mod store;

pub use service::{LockService, ScriptLock};
pub use store::{FileStateStore, MemoryStateStore, StateStore, StoreError};
