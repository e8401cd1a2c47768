//! Bearer-token authentication extractor for Axum handlers.

use std::net::{IpAddr, SocketAddr};

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;
use shellgate_core::error::CoreError;
use shellgate_core::model::Token;

use crate::error::AppError;
use crate::state::AppState;

/// Token definition resolved from `Authorization: Bearer <token-id>`.
///
/// ```ignore
/// async fn my_handler(auth: ApiToken) -> AppResult<Json<()>> {
///     tracing::info!(token = %auth.token.name, "handling request");
///     Ok(Json(()))
/// }
/// ```
#[derive(Debug, Clone)]
pub struct ApiToken {
    /// The bearer value the token was loaded by.
    pub id: String,
    pub token: Token,
}

impl FromRequestParts<AppState> for ApiToken {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                AppError::Core(CoreError::Unauthorized(
                    "Missing Authorization header".into(),
                ))
            })?;

        let id = auth_header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                AppError::Core(CoreError::Unauthorized(
                    "Invalid Authorization format. Expected: Bearer <token>".into(),
                ))
            })?;

        let token = state.tokens.load(id).await?.ok_or_else(|| {
            AppError::Core(CoreError::Unauthorized("Unknown token".into()))
        })?;

        Ok(ApiToken {
            id: id.to_string(),
            token,
        })
    }
}

/// Peer IP of the connection; `None` when the server runs without
/// connect info (e.g. in-process tests).
#[derive(Debug, Clone, Copy)]
pub struct CallerIp(pub Option<IpAddr>);

impl<S: Send + Sync> FromRequestParts<S> for CallerIp {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ip = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());
        Ok(CallerIp(ip))
    }
}
