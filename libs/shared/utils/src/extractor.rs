use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, Request},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use shared_config::AppConfig;
use shared_models::auth::{Actor, User};
use shared_models::error::AppError;

use crate::jwt::validate_token;

/// Validates the bearer token and stores the `User` (and its `Actor`, when the role is known)
/// in the request extensions.
pub async fn auth_middleware(
    State(config): State<Arc<AppConfig>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let auth_value = request
        .headers()
        .get(AUTHORIZATION)
        .ok_or_else(|| AppError::Auth("Missing authorization header".to_string()))?
        .to_str()
        .map_err(|_| AppError::Auth("Invalid authorization header format".to_string()))?;

    let token = auth_value
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Auth("Invalid authorization header format".to_string()))?;

    let user = validate_token(token, &config.supabase_jwt_secret).map_err(|e| {
        warn!("Rejected bearer token: {}", e);
        AppError::Auth(e.to_string())
    })?;

    if let Some(actor) = user.actor() {
        request.extensions_mut().insert(actor);
    }
    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}

/// The role-bearing identity for a validated user; unknown roles may not act.
pub fn require_actor(user: &User) -> Result<Actor, AppError> {
    user.actor()
        .ok_or_else(|| AppError::Forbidden("User has no recognised role".to_string()))
}
