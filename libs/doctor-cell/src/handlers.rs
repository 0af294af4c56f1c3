use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use chrono::NaiveDate;
use headers::{authorization::Bearer, Authorization};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::DoctorError;
use crate::services::{AvailabilityService, DoctorDirectory, SupabaseDoctorDirectory};

#[derive(Debug, Deserialize)]
pub struct ScheduleQuery {
    pub date: NaiveDate,
}

pub fn doctor_error_response(e: DoctorError) -> AppError {
    match e {
        DoctorError::NotFound => AppError::NotFound("Doctor not found".to_string()),
        DoctorError::Inactive => AppError::BadRequest(e.to_string()),
        DoctorError::ValidationError(msg) => AppError::ValidationError(msg),
        DoctorError::Unavailable(msg) => AppError::ServiceUnavailable(msg),
        DoctorError::Directory(msg) => AppError::Internal(msg),
    }
}

#[axum::debug_handler]
pub async fn list_bookable_doctors(
    State(config): State<Arc<AppConfig>>,
) -> Result<Json<Value>, AppError> {
    let directory = SupabaseDoctorDirectory::new(&config, None);

    let doctors = directory
        .list_bookable_doctors()
        .await
        .map_err(doctor_error_response)?;

    Ok(Json(json!({
        "doctors": doctors,
        "total": doctors.len()
    })))
}

#[axum::debug_handler]
pub async fn get_doctor_public(
    State(config): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let directory = SupabaseDoctorDirectory::new(&config, None);

    let doctor = directory
        .get_doctor(doctor_id)
        .await
        .map_err(doctor_error_response)?;

    Ok(Json(json!({
        "doctor": doctor.summary(),
        "is_bookable": doctor.is_bookable()
    })))
}

#[axum::debug_handler]
pub async fn get_doctor_schedule(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<ScheduleQuery>,
) -> Result<Json<Value>, AppError> {
    debug!("User {} requested schedule of doctor {}", user.id, doctor_id);

    let directory = Arc::new(SupabaseDoctorDirectory::new(&config, Some(auth.token())));
    directory
        .get_doctor(doctor_id)
        .await
        .map_err(doctor_error_response)?;

    let schedule = AvailabilityService::new(directory)
        .get_schedule(doctor_id, query.date)
        .await
        .map_err(doctor_error_response)?;

    Ok(Json(json!(schedule)))
}
