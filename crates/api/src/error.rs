use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{json, Value};
use shellgate_core::error::{CoreError, InvocationError};

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] and [`InvocationError`] for domain errors and adds
/// HTTP-specific variants. Implements [`IntoResponse`] to produce consistent
/// JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `shellgate_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A failure of the invoke pipeline.
    #[error(transparent)]
    Invocation(#[from] InvocationError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut extra = serde_json::Map::new();

        let (status, code, message) = match &self {
            AppError::Core(core) => classify_core_error(core),

            AppError::Invocation(err) => match err {
                InvocationError::Validation(errors) => {
                    extra.insert("errors".into(), json!(errors));
                    (
                        StatusCode::BAD_REQUEST,
                        "VALIDATION_ERROR",
                        "Invocation is invalid".to_string(),
                    )
                }
                InvocationError::ScriptNotFound(_) => {
                    (StatusCode::NOT_FOUND, "NOT_FOUND", err.to_string())
                }
                InvocationError::AccessDenied(msg) => {
                    (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone())
                }
                InvocationError::Locked { .. } => {
                    (StatusCode::LOCKED, "LOCKED", err.to_string())
                }
                InvocationError::Preprocessing {
                    file,
                    exit_code,
                    errors,
                } => {
                    extra.insert("file".into(), json!(file));
                    extra.insert("exit_code".into(), json!(exit_code));
                    extra.insert("errors".into(), json!(errors));
                    (
                        StatusCode::UNPROCESSABLE_ENTITY,
                        "PREPROCESSING_FAILED",
                        err.to_string(),
                    )
                }
                InvocationError::Cancelled => (
                    StatusCode::REQUEST_TIMEOUT,
                    "REQUEST_TIMEOUT",
                    err.to_string(),
                ),
                InvocationError::Core(core) => classify_core_error(core),
                InvocationError::Store(_)
                | InvocationError::Process(_)
                | InvocationError::Io(_) => {
                    tracing::error!(error = %err, "Invocation failed");
                    internal()
                }
            },

            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                internal()
            }
        };

        let mut body = serde_json::Map::new();
        body.insert("error".into(), Value::String(message));
        body.insert("code".into(), Value::String(code.to_string()));
        body.extend(extra);

        (status, axum::Json(Value::Object(body))).into_response()
    }
}

fn classify_core_error(core: &CoreError) -> (StatusCode, &'static str, String) {
    match core {
        CoreError::NotFound { entity, id } => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{entity} with id {id} not found"),
        ),
        CoreError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
        CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
        CoreError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone()),
        CoreError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone()),
        CoreError::Internal(msg) => {
            tracing::error!(error = %msg, "Internal core error");
            internal()
        }
    }
}

fn internal() -> (StatusCode, &'static str, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}
