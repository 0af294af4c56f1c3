// libs/doctor-cell/src/services/directory.rs
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Method;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::SupabaseClient;

use crate::models::{AvailabilityOverride, Doctor, DoctorError, DoctorSummary, WorkingHours};

/// Read access to doctors and their configured schedules.
#[async_trait]
pub trait DoctorDirectory: Send + Sync {
    async fn list_bookable_doctors(&self) -> Result<Vec<DoctorSummary>, DoctorError>;

    /// Fails with `DoctorError::NotFound` when the id does not resolve.
    async fn get_doctor(&self, doctor_id: Uuid) -> Result<Doctor, DoctorError>;

    /// Working windows for a weekday, ordered by start time.
    async fn working_hours(&self, doctor_id: Uuid, day_of_week: i32) -> Result<Vec<WorkingHours>, DoctorError>;

    async fn override_for(&self, doctor_id: Uuid, date: NaiveDate) -> Result<Option<AvailabilityOverride>, DoctorError>;
}

pub struct SupabaseDoctorDirectory {
    supabase: SupabaseClient,
    auth_token: Option<String>,
}

impl SupabaseDoctorDirectory {
    pub fn new(config: &AppConfig, auth_token: Option<&str>) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            auth_token: auth_token.map(str::to_string),
        }
    }

    async fn fetch<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, DoctorError> {
        let rows: Vec<T> = self
            .supabase
            .request(Method::GET, path, self.auth_token.as_deref(), None)
            .await?;
        Ok(rows)
    }
}

#[async_trait]
impl DoctorDirectory for SupabaseDoctorDirectory {
    async fn list_bookable_doctors(&self) -> Result<Vec<DoctorSummary>, DoctorError> {
        debug!("Listing bookable doctors");

        let doctors: Vec<Doctor> = self
            .fetch("/rest/v1/doctors?is_available=eq.true&is_verified=eq.true&order=last_name.asc,first_name.asc")
            .await?;

        Ok(doctors.iter().map(Doctor::summary).collect())
    }

    async fn get_doctor(&self, doctor_id: Uuid) -> Result<Doctor, DoctorError> {
        debug!("Fetching doctor: {}", doctor_id);

        let path = format!("/rest/v1/doctors?id=eq.{}", doctor_id);
        self.fetch::<Doctor>(&path)
            .await?
            .into_iter()
            .next()
            .ok_or(DoctorError::NotFound)
    }

    async fn working_hours(&self, doctor_id: Uuid, day_of_week: i32) -> Result<Vec<WorkingHours>, DoctorError> {
        let path = format!(
            "/rest/v1/doctor_working_hours?doctor_id=eq.{}&day_of_week=eq.{}&order=start_time.asc",
            doctor_id, day_of_week
        );
        self.fetch(&path).await
    }

    async fn override_for(&self, doctor_id: Uuid, date: NaiveDate) -> Result<Option<AvailabilityOverride>, DoctorError> {
        let path = format!(
            "/rest/v1/doctor_availability_overrides?doctor_id=eq.{}&override_date=eq.{}",
            doctor_id, date
        );
        let overrides: Vec<AvailabilityOverride> = self.fetch(&path).await?;

        if overrides.len() > 1 {
            warn!("Multiple availability overrides for doctor {} on {}, using the first", doctor_id, date);
        }
        Ok(overrides.into_iter().next())
    }
}

/// Directory held in memory, for local runs and tests.
#[derive(Default)]
pub struct InMemoryDoctorDirectory {
    doctors: RwLock<HashMap<Uuid, Doctor>>,
    hours: RwLock<Vec<WorkingHours>>,
    overrides: RwLock<Vec<AvailabilityOverride>>,
    offline: RwLock<bool>,
}

impl InMemoryDoctorDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_doctor(&self, doctor: Doctor) {
        self.doctors.write().await.insert(doctor.id, doctor);
    }

    pub async fn add_working_hours(&self, hours: WorkingHours) -> Result<(), DoctorError> {
        hours.validate()?;
        self.hours.write().await.push(hours);
        Ok(())
    }

    pub async fn add_override(&self, day_override: AvailabilityOverride) {
        self.overrides.write().await.push(day_override);
    }

    /// Simulate the backing store being unreachable.
    pub async fn set_offline(&self, offline: bool) {
        *self.offline.write().await = offline;
    }

    async fn ensure_online(&self) -> Result<(), DoctorError> {
        if *self.offline.read().await {
            return Err(DoctorError::Unavailable("directory offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl DoctorDirectory for InMemoryDoctorDirectory {
    async fn list_bookable_doctors(&self) -> Result<Vec<DoctorSummary>, DoctorError> {
        self.ensure_online().await?;

        let doctors = self.doctors.read().await;
        let mut bookable: Vec<&Doctor> = doctors.values().filter(|d| d.is_bookable()).collect();
        bookable.sort_by(|a, b| {
            (a.last_name.as_str(), a.first_name.as_str()).cmp(&(b.last_name.as_str(), b.first_name.as_str()))
        });

        Ok(bookable.into_iter().map(Doctor::summary).collect())
    }

    async fn get_doctor(&self, doctor_id: Uuid) -> Result<Doctor, DoctorError> {
        self.ensure_online().await?;
        self.doctors
            .read()
            .await
            .get(&doctor_id)
            .cloned()
            .ok_or(DoctorError::NotFound)
    }

    async fn working_hours(&self, doctor_id: Uuid, day_of_week: i32) -> Result<Vec<WorkingHours>, DoctorError> {
        self.ensure_online().await?;

        let mut windows: Vec<WorkingHours> = self
            .hours
            .read()
            .await
            .iter()
            .filter(|h| h.doctor_id == doctor_id && h.day_of_week == day_of_week)
            .cloned()
            .collect();
        windows.sort_by_key(|h| h.start_time);
        Ok(windows)
    }

    async fn override_for(&self, doctor_id: Uuid, date: NaiveDate) -> Result<Option<AvailabilityOverride>, DoctorError> {
        self.ensure_online().await?;
        Ok(self
            .overrides
            .read()
            .await
            .iter()
            .find(|o| o.doctor_id == doctor_id && o.override_date == date)
            .cloned())
    }
}
