// libs/appointment-cell/src/models.rs
use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use doctor_cell::models::DoctorError;
use shared_database::DatabaseError;
use shared_models::auth::{Actor, ActorRole};

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: i32,
    pub status: AppointmentStatus,
    pub reason_for_visit: Option<String>,
    pub cancellation_reason: Option<String>,
    pub completion_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn scheduled_end(&self) -> DateTime<Utc> {
        self.scheduled_at + Duration::minutes(self.duration_minutes as i64)
    }

    /// Half-open overlap with `[start, end)`.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        start < self.scheduled_end() && end > self.scheduled_at
    }

    /// Patients see their own appointments, doctors the ones assigned to them,
    /// staff and admins everything.
    pub fn is_accessible_by(&self, actor: &Actor) -> bool {
        match actor.role {
            ActorRole::Patient => self.patient_id.to_string() == actor.actor_id,
            ActorRole::Doctor => self.doctor_id.to_string() == actor.actor_id,
            ActorRole::Staff | ActorRole::Admin => true,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Requested,
    Confirmed,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    pub fn all() -> [AppointmentStatus; 5] {
        [
            AppointmentStatus::Requested,
            AppointmentStatus::Confirmed,
            AppointmentStatus::Completed,
            AppointmentStatus::Cancelled,
            AppointmentStatus::NoShow,
        ]
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Completed | AppointmentStatus::Cancelled | AppointmentStatus::NoShow
        )
    }

    /// Requested and confirmed appointments hold their slot.
    pub fn occupies_slot(&self) -> bool {
        matches!(self, AppointmentStatus::Requested | AppointmentStatus::Confirmed)
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Requested => write!(f, "requested"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::NoShow => write!(f, "no_show"),
        }
    }
}

/// Fields needed to persist a new appointment; the store assigns id and timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentDraft {
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: i32,
    pub reason_for_visit: Option<String>,
}

/// Partial update written after a status transition. `None` clears the column.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppointmentPatch {
    pub status: AppointmentStatus,
    pub cancellation_reason: Option<String>,
    pub completion_notes: Option<String>,
}

impl From<&Appointment> for AppointmentPatch {
    fn from(appointment: &Appointment) -> Self {
        Self {
            status: appointment.status,
            cancellation_reason: appointment.cancellation_reason.clone(),
            completion_notes: appointment.completion_notes.clone(),
        }
    }
}

/// Side data supplied with a status transition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransitionPayload {
    pub cancellation_reason: Option<String>,
    pub completion_notes: Option<String>,
}

impl TransitionPayload {
    pub fn cancellation(reason: &str) -> Self {
        Self {
            cancellation_reason: Some(reason.to_string()),
            completion_notes: None,
        }
    }

    pub fn completion(notes: &str) -> Self {
        Self {
            cancellation_reason: None,
            completion_notes: Some(notes.to_string()),
        }
    }
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    pub doctor_id: Uuid,
    /// Required when staff book on a patient's behalf; patients book for themselves.
    pub patient_id: Option<Uuid>,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub duration_minutes: Option<i32>,
    pub reason_for_visit: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRequest {
    pub status: AppointmentStatus,
    pub cancellation_reason: Option<String>,
    pub completion_notes: Option<String>,
}

impl TransitionRequest {
    pub fn into_parts(self) -> (AppointmentStatus, TransitionPayload) {
        (
            self.status,
            TransitionPayload {
                cancellation_reason: self.cancellation_reason,
                completion_notes: self.completion_notes,
            },
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityQuery {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub duration_minutes: Option<i32>,
    /// Echoed back so a client can drop responses to superseded requests.
    pub generation: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AvailabilityResponse {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub duration_minutes: i32,
    pub slots: Vec<NaiveTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppointmentFilters {
    pub status: Option<AppointmentStatus>,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
}

impl AppointmentFilters {
    pub fn matches(&self, appointment: &Appointment) -> bool {
        let date = appointment.scheduled_at.date_naive();
        self.status.map_or(true, |s| appointment.status == s)
            && self.from_date.map_or(true, |from| date >= from)
            && self.to_date.map_or(true, |to| date <= to)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListAppointmentsQuery {
    pub status: Option<AppointmentStatus>,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// Whose appointments a listing covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppointmentOwner {
    Patient(Uuid),
    Doctor(Uuid),
    Everyone,
}

impl AppointmentOwner {
    /// Patients list their own appointments, doctors their assigned ones, staff and admins all.
    pub fn for_actor(actor: &Actor) -> Result<Self, AppointmentError> {
        match actor.role {
            ActorRole::Patient => Ok(AppointmentOwner::Patient(actor_uuid(actor)?)),
            ActorRole::Doctor => Ok(AppointmentOwner::Doctor(actor_uuid(actor)?)),
            ActorRole::Staff | ActorRole::Admin => Ok(AppointmentOwner::Everyone),
        }
    }
}

pub fn actor_uuid(actor: &Actor) -> Result<Uuid, AppointmentError> {
    Uuid::parse_str(&actor.actor_id)
        .map_err(|_| AppointmentError::Forbidden(format!("Actor id {} is not a valid user id", actor.actor_id)))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentPage {
    pub items: Vec<Appointment>,
    pub page: u32,
    pub total_pages: u32,
    pub total_count: u64,
}

impl AppointmentPage {
    pub fn total_pages_for(total_count: u64, limit: u32) -> u32 {
        if limit == 0 {
            return 0;
        }
        total_count.div_ceil(limit as u64) as u32
    }
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AppointmentError {
    #[error("Doctor does not exist or is not accepting appointments")]
    InvalidDoctor,

    #[error("Scheduling backend unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Cannot move appointment from {from} to {to}")]
    InvalidTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Appointment not found")]
    NotFound,

    #[error("Requested time slot is not available")]
    SlotUnavailable,

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<DoctorError> for AppointmentError {
    fn from(e: DoctorError) -> Self {
        match e {
            DoctorError::NotFound | DoctorError::Inactive => AppointmentError::InvalidDoctor,
            DoctorError::Unavailable(msg) => AppointmentError::UpstreamUnavailable(msg),
            DoctorError::ValidationError(msg) => AppointmentError::ValidationFailed(msg),
            DoctorError::Directory(msg) => AppointmentError::Storage(msg),
        }
    }
}

impl From<DatabaseError> for AppointmentError {
    fn from(e: DatabaseError) -> Self {
        if e.is_unavailable() {
            return AppointmentError::UpstreamUnavailable(e.to_string());
        }
        match e {
            DatabaseError::NotFound(_) => AppointmentError::NotFound,
            DatabaseError::Auth(msg) => AppointmentError::Forbidden(msg),
            other => AppointmentError::Storage(other.to_string()),
        }
    }
}

// ==============================================================================
// VALIDATION MODELS
// ==============================================================================

#[derive(Debug, Clone)]
pub struct AppointmentValidationRules {
    pub default_duration_minutes: i32,
    pub max_duration_minutes: i32,
    pub max_reason_length: usize,
    pub max_note_length: usize,
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Default for AppointmentValidationRules {
    fn default() -> Self {
        Self {
            default_duration_minutes: 30,
            max_duration_minutes: 240,
            max_reason_length: 500,
            max_note_length: 2000,
            default_page_size: 10,
            max_page_size: 100,
        }
    }
}

impl AppointmentValidationRules {
    pub fn with_default_duration(default_duration_minutes: i32) -> Self {
        Self {
            default_duration_minutes,
            ..Self::default()
        }
    }

    pub fn resolve_duration(&self, requested: Option<i32>) -> Result<i32, AppointmentError> {
        let duration = requested.unwrap_or(self.default_duration_minutes);
        if duration <= 0 {
            return Err(AppointmentError::ValidationFailed(
                "Duration must be a positive number of minutes".to_string(),
            ));
        }
        if duration > self.max_duration_minutes {
            return Err(AppointmentError::ValidationFailed(format!(
                "Duration cannot exceed {} minutes",
                self.max_duration_minutes
            )));
        }
        Ok(duration)
    }

    /// Trims free text; blank input is treated as absent.
    pub fn bounded_text(
        &self,
        field: &str,
        value: Option<&str>,
        max_length: usize,
    ) -> Result<Option<String>, AppointmentError> {
        let trimmed = match value.map(str::trim) {
            Some(v) if !v.is_empty() => v,
            _ => return Ok(None),
        };
        if trimmed.chars().count() > max_length {
            return Err(AppointmentError::ValidationFailed(format!(
                "{} cannot exceed {} characters",
                field, max_length
            )));
        }
        Ok(Some(trimmed.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn appointment_at(hour: u32, minutes: i32) -> Appointment {
        let at = Utc.with_ymd_and_hms(2030, 1, 7, hour, 0, 0).unwrap();
        Appointment {
            id: Uuid::new_v4(),
            doctor_id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            scheduled_at: at,
            duration_minutes: minutes,
            status: AppointmentStatus::Requested,
            reason_for_visit: None,
            cancellation_reason: None,
            completion_notes: None,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn test_overlap_is_half_open() {
        let apt = appointment_at(10, 30);
        let at = |h, m| Utc.with_ymd_and_hms(2030, 1, 7, h, m, 0).unwrap();

        assert!(apt.overlaps(at(10, 0), at(10, 30)));
        assert!(apt.overlaps(at(9, 45), at(10, 15)));
        assert!(!apt.overlaps(at(10, 30), at(11, 0)));
        assert!(!apt.overlaps(at(9, 30), at(10, 0)));
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(serde_json::to_value(AppointmentStatus::NoShow).unwrap(), "no_show");
        assert_eq!(
            serde_json::from_value::<AppointmentStatus>(serde_json::json!("requested")).unwrap(),
            AppointmentStatus::Requested
        );
        assert_eq!(AppointmentStatus::Cancelled.to_string(), "cancelled");
    }

    #[test]
    fn test_access_rules() {
        let apt = appointment_at(10, 30);
        let patient = Actor::new(apt.patient_id.to_string(), ActorRole::Patient);
        let other_patient = Actor::new(Uuid::new_v4().to_string(), ActorRole::Patient);
        let doctor = Actor::new(apt.doctor_id.to_string(), ActorRole::Doctor);
        let other_doctor = Actor::new(Uuid::new_v4().to_string(), ActorRole::Doctor);
        let staff = Actor::new("staff-1", ActorRole::Staff);

        assert!(apt.is_accessible_by(&patient));
        assert!(!apt.is_accessible_by(&other_patient));
        assert!(apt.is_accessible_by(&doctor));
        assert!(!apt.is_accessible_by(&other_doctor));
        assert!(apt.is_accessible_by(&staff));
    }

    #[test]
    fn test_duration_rules() {
        let rules = AppointmentValidationRules::default();
        assert_eq!(rules.resolve_duration(None), Ok(30));
        assert_eq!(rules.resolve_duration(Some(45)), Ok(45));
        assert!(rules.resolve_duration(Some(0)).is_err());
        assert!(rules.resolve_duration(Some(600)).is_err());
    }

    #[test]
    fn test_bounded_text() {
        let rules = AppointmentValidationRules::default();
        assert_eq!(rules.bounded_text("reason", Some("   "), 10), Ok(None));
        assert_eq!(rules.bounded_text("reason", Some(" cough "), 10), Ok(Some("cough".to_string())));
        assert!(rules.bounded_text("reason", Some("x".repeat(11).as_str()), 10).is_err());
    }

    #[test]
    fn test_owner_for_actor() {
        let patient_id = Uuid::new_v4();
        let patient = Actor::new(patient_id.to_string(), ActorRole::Patient);
        assert_eq!(AppointmentOwner::for_actor(&patient), Ok(AppointmentOwner::Patient(patient_id)));

        let admin = Actor::new("not-a-uuid", ActorRole::Admin);
        assert_eq!(AppointmentOwner::for_actor(&admin), Ok(AppointmentOwner::Everyone));

        let broken = Actor::new("not-a-uuid", ActorRole::Doctor);
        assert!(matches!(AppointmentOwner::for_actor(&broken), Err(AppointmentError::Forbidden(_))));
    }

    #[test]
    fn test_total_pages() {
        assert_eq!(AppointmentPage::total_pages_for(0, 10), 0);
        assert_eq!(AppointmentPage::total_pages_for(10, 10), 1);
        assert_eq!(AppointmentPage::total_pages_for(11, 10), 2);
    }

    #[test]
    fn test_filters_match_date_range() {
        let apt = appointment_at(10, 30);
        let day = NaiveDate::from_ymd_opt(2030, 1, 7).unwrap();

        let in_range = AppointmentFilters {
            status: Some(AppointmentStatus::Requested),
            from_date: Some(day),
            to_date: Some(day),
        };
        assert!(in_range.matches(&apt));

        let after = AppointmentFilters {
            from_date: day.succ_opt(),
            ..Default::default()
        };
        assert!(!after.matches(&apt));
    }
}
