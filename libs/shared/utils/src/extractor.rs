use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request},
    middleware::Next,
    response::Response,
};

use shared_config::AppConfig;
use shared_models::auth::AuthUser;
use shared_models::error::CoreError;

use crate::jwt::validate_token;

/// Bearer-token middleware for the synchronous API. The validated user is
/// inserted into request extensions for handlers to pick up.
pub async fn auth_middleware(
    State(config): State<Arc<AppConfig>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, CoreError> {
    let token = bearer_token(request.headers())
        .ok_or_else(|| CoreError::Unauthenticated("missing bearer token".to_string()))?;

    let user = validate_token(&token, &config.jwt_secret).map_err(CoreError::Unauthenticated)?;

    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get("Authorization")?.to_str().ok()?;
    value
        .strip_prefix("Bearer ")
        .map(|token| token.to_string())
}

/// Out-of-band identity check for a channel connection, before the upgrade.
/// Browsers cannot set headers on WebSocket requests, so a `token` query
/// parameter is accepted alongside the Authorization header. Fails closed.
pub fn authenticate_connection(
    headers: &HeaderMap,
    query_token: Option<&str>,
    config: &AppConfig,
) -> Result<AuthUser, CoreError> {
    let token = bearer_token(headers)
        .or_else(|| query_token.map(|t| t.to_string()))
        .ok_or_else(|| CoreError::Unauthenticated("missing credential".to_string()))?;

    validate_token(&token, &config.jwt_secret).map_err(CoreError::Unauthenticated)
}
