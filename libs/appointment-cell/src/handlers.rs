// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::extractor::require_actor;

use crate::models::{
    AppointmentError, AvailabilityQuery, BookAppointmentRequest, ListAppointmentsQuery, TransitionRequest,
};
use crate::services::booking::AppointmentBookingService;
use crate::services::management::AppointmentManagementService;

pub fn appointment_error_response(e: AppointmentError) -> AppError {
    match e {
        AppointmentError::InvalidDoctor => AppError::NotFound(e.to_string()),
        AppointmentError::NotFound => AppError::NotFound("Appointment not found".to_string()),
        AppointmentError::UpstreamUnavailable(msg) => AppError::ServiceUnavailable(msg),
        AppointmentError::InvalidTransition { .. } | AppointmentError::SlotUnavailable => {
            AppError::Conflict(e.to_string())
        }
        AppointmentError::Forbidden(msg) => AppError::Forbidden(msg),
        AppointmentError::ValidationFailed(msg) => AppError::ValidationError(msg),
        AppointmentError::Storage(msg) => AppError::Internal(msg),
    }
}

#[axum::debug_handler]
pub async fn check_availability(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<Value>, AppError> {
    let booking_service = AppointmentBookingService::new(&state, auth.token());

    let availability = booking_service
        .check_availability(query)
        .await
        .map_err(appointment_error_response)?;

    Ok(Json(json!(availability)))
}

#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let actor = require_actor(&user)?;
    let booking_service = AppointmentBookingService::new(&state, auth.token());

    let appointment = booking_service
        .book_appointment(request, &actor)
        .await
        .map_err(appointment_error_response)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment requested"
    })))
}

#[axum::debug_handler]
pub async fn list_my_appointments(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<ListAppointmentsQuery>,
) -> Result<Json<Value>, AppError> {
    let actor = require_actor(&user)?;
    let booking_service = AppointmentBookingService::new(&state, auth.token());

    let page = booking_service
        .list_mine(&actor, query)
        .await
        .map_err(appointment_error_response)?;

    Ok(Json(json!(page)))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let actor = require_actor(&user)?;
    let booking_service = AppointmentBookingService::new(&state, auth.token());

    let appointment = booking_service
        .get_appointment(appointment_id, &actor)
        .await
        .map_err(appointment_error_response)?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn get_selectable_statuses(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let actor = require_actor(&user)?;
    let management_service = AppointmentManagementService::new(&state, auth.token());

    let (appointment, statuses) = management_service
        .selectable_statuses(appointment_id, &actor)
        .await
        .map_err(appointment_error_response)?;

    Ok(Json(json!({
        "appointment_id": appointment.id,
        "current_status": appointment.status,
        "selectable_statuses": statuses
    })))
}

#[axum::debug_handler]
pub async fn update_appointment_status(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<TransitionRequest>,
) -> Result<Json<Value>, AppError> {
    let actor = require_actor(&user)?;
    let management_service = AppointmentManagementService::new(&state, auth.token());
    let (status, payload) = request.into_parts();

    let appointment = management_service
        .transition(appointment_id, status, payload, &actor)
        .await
        .map_err(appointment_error_response)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": format!("Appointment {}", appointment.status)
    })))
}
