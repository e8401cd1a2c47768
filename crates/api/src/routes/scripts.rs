//! Route definitions for script invocation endpoints.

use axum::extract::DefaultBodyLimit;
use axum::routing::post;
use axum::Router;

use crate::handlers::scripts;
use crate::state::AppState;

/// Upper bound for multipart upload bodies.
const MAX_UPLOAD_BYTES: usize = 256 * 1024 * 1024;

/// Routes mounted at `/scripts`.
///
/// All routes require a Bearer token (enforced by handler extractors).
///
/// ```text
/// POST   /{name}/invoke              -> invoke_script (JSON)
/// POST   /{name}/upload              -> upload_script (multipart)
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{name}/invoke", post(scripts::invoke_script))
        .route(
            "/{name}/upload",
            post(scripts::upload_script).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
}
