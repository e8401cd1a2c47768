#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use shellgate_core::config::{ExecutionConfig, RendezvousConfig};
use shellgate_core::lock::MemoryStateStore;
use shellgate_core::process::SystemProcessRunner;
use tempfile::TempDir;
use tower::ServiceExt;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use shellgate_api::config::ServerConfig;
use shellgate_api::routes;
use shellgate_api::state::AppState;

/// Bearer value of the token every test app is seeded with.
pub const TEST_TOKEN: &str = "test-token";

/// A router plus the temporary directories backing it.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub scripts_dir: TempDir,
    pub tokens_dir: TempDir,
    pub temp_dir: TempDir,
}

impl TestApp {
    /// Write `{scripts_dir}/{name}.json`.
    pub fn add_script(&self, name: &str, definition: serde_json::Value) {
        write_json(self.scripts_dir.path(), name, &definition);
    }

    /// Write `{tokens_dir}/{id}.json`.
    pub fn add_token(&self, id: &str, definition: serde_json::Value) {
        write_json(self.tokens_dir.path(), id, &definition);
    }

    /// Number of entries left under the working-directory root.
    pub fn leftover_working_dirs(&self) -> usize {
        std::fs::read_dir(self.temp_dir.path()).unwrap().count()
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }
}

fn write_json(dir: &Path, name: &str, value: &serde_json::Value) {
    std::fs::write(
        dir.join(format!("{name}.json")),
        serde_json::to_vec_pretty(value).unwrap(),
    )
    .unwrap();
}

/// Build a test `ServerConfig` pointing at the given directories.
pub fn test_config(scripts_dir: &Path, tokens_dir: &Path, temp_dir: &Path) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        scripts_dir: scripts_dir.to_path_buf(),
        tokens_dir: tokens_dir.to_path_buf(),
        state_dir: None,
        execution: ExecutionConfig {
            temp_root: temp_dir.to_path_buf(),
            ..Default::default()
        },
        rendezvous: RendezvousConfig {
            attach_timeout: Duration::from_secs(2),
            poll_interval: Duration::from_millis(10),
        },
    }
}

/// Build the full application over fresh temporary directories, seeded with
/// an unrestricted [`TEST_TOKEN`].
pub fn build_test_app() -> TestApp {
    let scripts_dir = tempfile::tempdir().unwrap();
    let tokens_dir = tempfile::tempdir().unwrap();
    let temp_dir = tempfile::tempdir().unwrap();

    let config = test_config(scripts_dir.path(), tokens_dir.path(), temp_dir.path());
    let state = AppState::new(
        config,
        Arc::new(MemoryStateStore::new()),
        Arc::new(SystemProcessRunner),
    );

    let app = TestApp {
        router: build_router(state.clone()),
        state,
        scripts_dir,
        tokens_dir,
        temp_dir,
    };
    app.add_token(TEST_TOKEN, serde_json::json!({ "name": "test" }));
    app
}

/// The binary's router and layer stack over `state`, with a short timeout
/// and a fixed CORS origin.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(["http://localhost:5173".parse().unwrap()])
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600));

    let request_id_header = HeaderName::from_static("x-request-id");

    Router::new()
        .merge(routes::health::router())
        .nest("/api/v1", routes::api_routes())
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(30),
        ))
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .layer(cors)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

/// `POST /api/v1/scripts/{script}/invoke` with a JSON body.
pub fn invoke(script: &str, token: Option<&str>, body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(format!("/api/v1/scripts/{script}/invoke"))
        .header(CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
    }
    builder
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

pub const BOUNDARY: &str = "shellgate-test-boundary";

/// One part of a multipart body.
pub enum Part<'a> {
    Text(&'a str, &'a str),
    File {
        field: &'a str,
        file_name: &'a str,
        content: &'a [u8],
    },
}

/// `POST /api/v1/scripts/{script}/upload` with a multipart body.
pub fn upload(script: &str, token: &str, parts: &[Part<'_>]) -> Request<Body> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                        .as_bytes(),
                );
            }
            Part::File {
                field,
                file_name,
                content,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(content);
                body.extend_from_slice(b"\r\n");
            }
        }
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri(format!("/api/v1/scripts/{script}/upload"))
        .header(
            CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .header(AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::from(body))
        .unwrap()
}

/// Collect a response body and parse it as JSON.
pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
