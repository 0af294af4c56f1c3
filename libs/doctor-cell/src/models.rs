use chrono::{NaiveDate, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use shared_database::DatabaseError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Doctor {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub specialty: String,
    pub is_available: bool,
    pub is_verified: bool,
    pub timezone: Option<String>,
}

impl Doctor {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Only verified doctors who are currently taking patients can be booked.
    pub fn is_bookable(&self) -> bool {
        self.is_available && self.is_verified
    }

    pub fn summary(&self) -> DoctorSummary {
        DoctorSummary {
            id: self.id,
            full_name: self.full_name(),
            specialty: self.specialty.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DoctorSummary {
    pub id: Uuid,
    pub full_name: String,
    pub specialty: String,
}

/// A recurring working window for one weekday (0 = Sunday .. 6 = Saturday).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkingHours {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub day_of_week: i32,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    #[serde(default)]
    pub buffer_minutes: i32,
    pub is_available: bool,
}

impl WorkingHours {
    pub fn new(doctor_id: Uuid, day_of_week: i32, start_time: NaiveTime, end_time: NaiveTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            doctor_id,
            day_of_week,
            start_time,
            end_time,
            buffer_minutes: 0,
            is_available: true,
        }
    }

    pub fn validate(&self) -> Result<(), DoctorError> {
        if !(0..=6).contains(&self.day_of_week) {
            return Err(DoctorError::ValidationError(
                "Day of week must be between 0 (Sunday) and 6 (Saturday)".to_string(),
            ));
        }
        if self.start_time >= self.end_time {
            return Err(DoctorError::ValidationError(
                "Start time must be before end time".to_string(),
            ));
        }
        if self.buffer_minutes < 0 {
            return Err(DoctorError::ValidationError(
                "Buffer minutes cannot be negative".to_string(),
            ));
        }
        Ok(())
    }

    pub(crate) fn start_minute(&self) -> i64 {
        (self.start_time.num_seconds_from_midnight() / 60) as i64
    }

    pub(crate) fn end_minute(&self) -> i64 {
        (self.end_time.num_seconds_from_midnight() / 60) as i64
    }
}

/// A per-date exception to the weekly schedule (vacation, sick day).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityOverride {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub override_date: NaiveDate,
    pub is_available: bool,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorScheduleResponse {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub working_hours: Vec<WorkingHours>,
    pub day_override: Option<AvailabilityOverride>,
}

#[derive(Error, Debug)]
pub enum DoctorError {
    #[error("Doctor not found")]
    NotFound,

    #[error("Doctor is not accepting appointments")]
    Inactive,

    #[error("Doctor directory unavailable: {0}")]
    Unavailable(String),

    #[error("Doctor directory error: {0}")]
    Directory(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl From<DatabaseError> for DoctorError {
    fn from(e: DatabaseError) -> Self {
        if e.is_unavailable() {
            return DoctorError::Unavailable(e.to_string());
        }
        match e {
            DatabaseError::NotFound(_) => DoctorError::NotFound,
            other => DoctorError::Directory(other.to_string()),
        }
    }
}
