use std::sync::Arc;

use axum::{
    Router,
    routing::get,
    middleware,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn doctor_routes(state: Arc<AppConfig>) -> Router {
    // Public routes (no authentication required)
    let public_routes = Router::new()
        .route("/bookable", get(handlers::list_bookable_doctors))
        .route("/{doctor_id}", get(handlers::get_doctor_public));

    // Protected routes (authentication required)
    let protected_routes = Router::new()
        .route("/{doctor_id}/working-hours", get(handlers::get_doctor_schedule))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
