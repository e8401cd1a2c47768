use indexmap::IndexMap;
use serde::Serialize;

use crate::lock::store::StoreError;
use crate::process::ProcessError;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Aggregated validation messages keyed by the offending identifier
/// (variable name, file key, or raw entry text).
///
/// Keys keep the order in which they were first reported so payloads follow
/// the script's declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(IndexMap<String, Vec<String>>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one message under `key`, appending to earlier messages.
    pub fn add(&mut self, key: impl Into<String>, message: impl Into<String>) {
        self.0.entry(key.into()).or_default().push(message.into());
    }

    /// Move every message from `other` into `self`.
    pub fn merge(&mut self, other: ValidationErrors) {
        for (key, messages) in other.0 {
            self.0.entry(key).or_default().extend(messages);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.0.get(key).map(Vec::as_slice)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// `Ok(value)` when nothing was recorded, otherwise the aggregated failure.
    pub fn into_result<T>(self, value: T) -> Result<T, InvocationError> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(InvocationError::Validation(self))
        }
    }
}

/// Failures that abort an invocation before a result can be produced.
///
/// A nonzero exit code of the executed script is deliberately absent: it is
/// reported through [`ExecutionResult`](crate::execution::ExecutionResult).
#[derive(Debug, thiserror::Error)]
pub enum InvocationError {
    #[error("Validation failed for {} field(s)", .0.len())]
    Validation(ValidationErrors),

    #[error("Script '{0}' not found")]
    ScriptNotFound(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Script '{script}' is locked, try again later")]
    Locked { script: String },

    #[error("File preprocessing failed for '{file}' with exit code {exit_code}")]
    Preprocessing {
        file: String,
        exit_code: i32,
        errors: Vec<String>,
    },

    #[error("Invocation cancelled")]
    Cancelled,

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Process error: {0}")]
    Process(ProcessError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ProcessError> for InvocationError {
    fn from(err: ProcessError) -> Self {
        match err {
            ProcessError::Cancelled => Self::Cancelled,
            other => Self::Process(other),
        }
    }
}

pub type InvocationResult<T> = Result<T, InvocationError>;
