use axum::{
    async_trait,
    extract::{FromRequestParts, State},
    http::{request::Parts, Request},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::error::AppError;
use crate::AppState;

pub const USER_ID_HEADER: &str = "x-user-id";

/// Requires `Authorization: Bearer <ADMIN_API_KEY>`.
pub async fn admin_auth<B>(
    State(state): State<AppState>,
    req: Request<B>,
    next: Next<B>,
) -> Result<Response, AppError> {
    let expected = state.config.admin_api_key.as_str();
    let authorized = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map_or(false, |key| !expected.is_empty() && key == expected);

    if authorized {
        Ok(next.run(req).await)
    } else {
        tracing::warn!(uri = %req.uri(), "admin request with missing or invalid API key");
        Err(AppError::Unauthorized("invalid admin API key".to_string()))
    }
}

/// Caller identity injected by the upstream gateway in `X-User-Id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentUser(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|h| h.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized("missing X-User-Id header".to_string()))?;

        Uuid::parse_str(raw.trim())
            .map(CurrentUser)
            .map_err(|_| AppError::Unauthorized("X-User-Id must be a UUID".to_string()))
    }
}
