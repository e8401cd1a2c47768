pub mod health;
pub mod scripts;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /ws/{session_id}                                 WebSocket listener
///
/// /scripts/{name}/invoke                           invoke with JSON body
/// /scripts/{name}/upload                           invoke with multipart files
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/ws/{session_id}", get(ws::ws_handler))
        .nest("/scripts", scripts::router())
}
