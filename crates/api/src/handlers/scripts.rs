//! Handlers for invoking scripts.
//!
//! Both endpoints authenticate with the Bearer token, assemble an
//! [`InvocationRequest`] and run it through the orchestrator on a separate
//! task. A dropped request cancels the invocation; cleanup still runs to
//! completion on that task.

use std::sync::Arc;

use axum::extract::{Multipart, Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use shellgate_core::execution::ExecutionResult;
use shellgate_core::invocation::{RawInvocation, UploadedFile};
use shellgate_core::types::SessionId;
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::{ApiToken, CallerIp};
use crate::response::DataResponse;
use crate::scripting::InvocationRequest;
use crate::state::AppState;

/// Request body for `POST /scripts/{name}/invoke`.
#[derive(Debug, Default, Deserialize)]
pub struct InvokeScriptBody {
    #[serde(default)]
    pub variables: Vec<String>,
    #[serde(default)]
    pub secret_variables: Vec<String>,
    #[serde(default)]
    pub environment_variables: Vec<String>,
    #[serde(default)]
    pub websocket_session_id: Option<SessionId>,
}

/// POST /api/v1/scripts/{name}/invoke
pub async fn invoke_script(
    State(state): State<AppState>,
    Path(name): Path<String>,
    auth: ApiToken,
    CallerIp(caller_ip): CallerIp,
    headers: HeaderMap,
    Json(body): Json<InvokeScriptBody>,
) -> AppResult<Json<DataResponse<ExecutionResult>>> {
    let raw = RawInvocation {
        script_name: name,
        variables: body.variables,
        secret_variables: body.secret_variables,
        environment_variables: body.environment_variables,
        files: Vec::new(),
        websocket_session_id: body.websocket_session_id,
    };

    let request = InvocationRequest {
        raw,
        uploads: Vec::new(),
        token_id: auth.id,
        token: auth.token,
        caller_ip,
        correlation_id: request_id(&headers),
    };
    run_invocation(&state, request).await
}

/// POST /api/v1/scripts/{name}/upload
///
/// Multipart fields:
/// - `variables`, `secret_variables`, `environment_variables`: repeated
///   `name=value` text fields
/// - `files`: repeated `key=filename` descriptors
/// - `websocket_session_id`: optional session id
/// - `file`: file parts, matched to descriptors by their file name
pub async fn upload_script(
    State(state): State<AppState>,
    Path(name): Path<String>,
    auth: ApiToken,
    CallerIp(caller_ip): CallerIp,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> AppResult<Json<DataResponse<ExecutionResult>>> {
    let mut raw = RawInvocation {
        script_name: name,
        ..Default::default()
    };
    let mut uploads = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid multipart body: {e}")))?
    {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "variables" | "secret_variables" | "environment_variables" | "files"
            | "websocket_session_id" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Invalid field '{field_name}': {e}")))?;
                match field_name.as_str() {
                    "variables" => raw.variables.push(value),
                    "secret_variables" => raw.secret_variables.push(value),
                    "environment_variables" => raw.environment_variables.push(value),
                    "files" => raw.files.push(value),
                    _ => {
                        let id = value.trim().parse::<SessionId>().map_err(|_| {
                            AppError::BadRequest("websocket_session_id must be a UUID".into())
                        })?;
                        raw.websocket_session_id = Some(id);
                    }
                }
            }
            "file" => {
                let file_name = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| AppError::BadRequest("File part without a file name".into()))?;
                let content = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Failed to read '{file_name}': {e}")))?;
                uploads.push(UploadedFile {
                    file_name,
                    content: content.to_vec(),
                });
            }
            other => {
                tracing::debug!(field = %other, "Ignoring unknown multipart field");
            }
        }
    }

    let request = InvocationRequest {
        raw,
        uploads,
        token_id: auth.id,
        token: auth.token,
        caller_ip,
        correlation_id: request_id(&headers),
    };
    run_invocation(&state, request).await
}

/// Run the invocation on its own task, cancelling it if this future is
/// dropped.
async fn run_invocation(
    state: &AppState,
    request: InvocationRequest,
) -> AppResult<Json<DataResponse<ExecutionResult>>> {
    let cancel = CancellationToken::new();
    let _cancel_on_drop = cancel.clone().drop_guard();

    let orchestrator = Arc::clone(&state.orchestrator);
    let task = tokio::spawn(async move { orchestrator.invoke(request, cancel).await });

    let result = task
        .await
        .map_err(|e| AppError::InternalError(format!("Invocation task failed: {e}")))??;

    Ok(Json(DataResponse { data: result }))
}

fn request_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
