// libs/appointment-cell/src/services/store.rs
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, NaiveTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Method;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::SupabaseClient;

use crate::models::{
    Appointment, AppointmentDraft, AppointmentError, AppointmentFilters, AppointmentOwner,
    AppointmentPage, AppointmentPatch, AppointmentStatus,
};

/// Persistence for appointments. Appointments are never deleted.
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    /// Persist a new appointment in `Requested`.
    async fn create(&self, draft: AppointmentDraft) -> Result<Appointment, AppointmentError>;

    async fn update(&self, appointment_id: Uuid, patch: AppointmentPatch) -> Result<Appointment, AppointmentError>;

    async fn get_by_id(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError>;

    /// One page of an owner's appointments, newest first. `page` is 1-based.
    async fn list_mine(
        &self,
        owner: &AppointmentOwner,
        filters: &AppointmentFilters,
        page: u32,
        limit: u32,
    ) -> Result<AppointmentPage, AppointmentError>;

    /// Requested and confirmed appointments of a doctor starting on `date` (UTC).
    async fn list_active_for_doctor(&self, doctor_id: Uuid, date: NaiveDate) -> Result<Vec<Appointment>, AppointmentError>;
}

fn day_bounds(date: NaiveDate) -> (chrono::DateTime<Utc>, chrono::DateTime<Utc>) {
    let start = date.and_time(NaiveTime::MIN).and_utc();
    (start, start + Duration::days(1))
}

pub struct SupabaseAppointmentStore {
    supabase: SupabaseClient,
    auth_token: Option<String>,
}

impl SupabaseAppointmentStore {
    pub fn new(config: &AppConfig, auth_token: Option<&str>) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            auth_token: auth_token.map(str::to_string),
        }
    }

    fn representation_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));
        headers
    }

    fn list_path(owner: &AppointmentOwner, filters: &AppointmentFilters, page: u32, limit: u32) -> String {
        let mut query_parts = Vec::new();

        match owner {
            AppointmentOwner::Patient(id) => query_parts.push(format!("patient_id=eq.{}", id)),
            AppointmentOwner::Doctor(id) => query_parts.push(format!("doctor_id=eq.{}", id)),
            AppointmentOwner::Everyone => {}
        }

        if let Some(status) = filters.status {
            query_parts.push(format!("status=eq.{}", status));
        }
        if let Some(from) = filters.from_date {
            let (start, _) = day_bounds(from);
            query_parts.push(format!("scheduled_at=gte.{}", urlencoding::encode(&start.to_rfc3339())));
        }
        if let Some(to) = filters.to_date {
            let (_, end) = day_bounds(to);
            query_parts.push(format!("scheduled_at=lt.{}", urlencoding::encode(&end.to_rfc3339())));
        }

        let offset = (page.saturating_sub(1) as u64) * limit as u64;
        query_parts.push("order=scheduled_at.desc".to_string());
        query_parts.push(format!("limit={}", limit));
        query_parts.push(format!("offset={}", offset));

        format!("/rest/v1/appointments?{}", query_parts.join("&"))
    }
}

#[async_trait]
impl AppointmentStore for SupabaseAppointmentStore {
    async fn create(&self, draft: AppointmentDraft) -> Result<Appointment, AppointmentError> {
        debug!("Creating appointment for patient {} with doctor {}", draft.patient_id, draft.doctor_id);

        let now = Utc::now();
        let body = json!({
            "doctor_id": draft.doctor_id,
            "patient_id": draft.patient_id,
            "scheduled_at": draft.scheduled_at.to_rfc3339(),
            "duration_minutes": draft.duration_minutes,
            "status": AppointmentStatus::Requested,
            "reason_for_visit": draft.reason_for_visit,
            "created_at": now.to_rfc3339(),
            "updated_at": now.to_rfc3339(),
        });

        let created: Vec<Appointment> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/appointments",
                self.auth_token.as_deref(),
                Some(body),
                Some(Self::representation_headers()),
            )
            .await?;

        let appointment = created
            .into_iter()
            .next()
            .ok_or_else(|| AppointmentError::Storage("Insert returned no rows".to_string()))?;

        info!("Appointment {} created", appointment.id);
        Ok(appointment)
    }

    async fn update(&self, appointment_id: Uuid, patch: AppointmentPatch) -> Result<Appointment, AppointmentError> {
        debug!("Updating appointment {} to {}", appointment_id, patch.status);

        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let body = json!({
            "status": patch.status,
            "cancellation_reason": patch.cancellation_reason,
            "completion_notes": patch.completion_notes,
            "updated_at": Utc::now().to_rfc3339(),
        });

        let updated: Vec<Appointment> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                self.auth_token.as_deref(),
                Some(body),
                Some(Self::representation_headers()),
            )
            .await?;

        updated.into_iter().next().ok_or(AppointmentError::NotFound)
    }

    async fn get_by_id(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let rows: Vec<Appointment> = self
            .supabase
            .request(Method::GET, &path, self.auth_token.as_deref(), None)
            .await?;

        rows.into_iter().next().ok_or(AppointmentError::NotFound)
    }

    async fn list_mine(
        &self,
        owner: &AppointmentOwner,
        filters: &AppointmentFilters,
        page: u32,
        limit: u32,
    ) -> Result<AppointmentPage, AppointmentError> {
        let path = Self::list_path(owner, filters, page, limit);
        let (items, total): (Vec<Appointment>, Option<u64>) = self
            .supabase
            .request_with_count(&path, self.auth_token.as_deref())
            .await?;

        let total_count = total.unwrap_or(items.len() as u64);
        Ok(AppointmentPage {
            items,
            page,
            total_pages: AppointmentPage::total_pages_for(total_count, limit),
            total_count,
        })
    }

    async fn list_active_for_doctor(&self, doctor_id: Uuid, date: NaiveDate) -> Result<Vec<Appointment>, AppointmentError> {
        let (start, end) = day_bounds(date);
        // Start one day early so appointments running past midnight are still seen.
        let path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&status=in.(requested,confirmed)&scheduled_at=gte.{}&scheduled_at=lt.{}&order=scheduled_at.asc",
            doctor_id,
            urlencoding::encode(&(start - Duration::days(1)).to_rfc3339()),
            urlencoding::encode(&end.to_rfc3339()),
        );

        let rows: Vec<Appointment> = self
            .supabase
            .request(Method::GET, &path, self.auth_token.as_deref(), None)
            .await?;

        Ok(rows.into_iter().filter(|a| a.status.occupies_slot()).collect())
    }
}

/// Store held in memory, for local runs and tests.
#[derive(Default)]
pub struct InMemoryAppointmentStore {
    appointments: RwLock<HashMap<Uuid, Appointment>>,
    offline: RwLock<bool>,
}

impl InMemoryAppointmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an existing appointment as-is.
    pub async fn insert(&self, appointment: Appointment) {
        self.appointments.write().await.insert(appointment.id, appointment);
    }

    pub async fn set_offline(&self, offline: bool) {
        *self.offline.write().await = offline;
    }

    async fn ensure_online(&self) -> Result<(), AppointmentError> {
        if *self.offline.read().await {
            return Err(AppointmentError::UpstreamUnavailable("appointment store offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl AppointmentStore for InMemoryAppointmentStore {
    async fn create(&self, draft: AppointmentDraft) -> Result<Appointment, AppointmentError> {
        self.ensure_online().await?;

        let now = Utc::now();
        let appointment = Appointment {
            id: Uuid::new_v4(),
            doctor_id: draft.doctor_id,
            patient_id: draft.patient_id,
            scheduled_at: draft.scheduled_at,
            duration_minutes: draft.duration_minutes,
            status: AppointmentStatus::Requested,
            reason_for_visit: draft.reason_for_visit,
            cancellation_reason: None,
            completion_notes: None,
            created_at: now,
            updated_at: now,
        };

        self.appointments.write().await.insert(appointment.id, appointment.clone());
        Ok(appointment)
    }

    async fn update(&self, appointment_id: Uuid, patch: AppointmentPatch) -> Result<Appointment, AppointmentError> {
        self.ensure_online().await?;

        let mut appointments = self.appointments.write().await;
        let appointment = appointments.get_mut(&appointment_id).ok_or(AppointmentError::NotFound)?;
        appointment.status = patch.status;
        appointment.cancellation_reason = patch.cancellation_reason;
        appointment.completion_notes = patch.completion_notes;
        appointment.updated_at = Utc::now();

        Ok(appointment.clone())
    }

    async fn get_by_id(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.ensure_online().await?;
        self.appointments
            .read()
            .await
            .get(&appointment_id)
            .cloned()
            .ok_or(AppointmentError::NotFound)
    }

    async fn list_mine(
        &self,
        owner: &AppointmentOwner,
        filters: &AppointmentFilters,
        page: u32,
        limit: u32,
    ) -> Result<AppointmentPage, AppointmentError> {
        self.ensure_online().await?;

        let appointments = self.appointments.read().await;
        let mut matching: Vec<Appointment> = appointments
            .values()
            .filter(|a| match owner {
                AppointmentOwner::Patient(id) => a.patient_id == *id,
                AppointmentOwner::Doctor(id) => a.doctor_id == *id,
                AppointmentOwner::Everyone => true,
            })
            .filter(|a| filters.matches(a))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.scheduled_at.cmp(&a.scheduled_at));

        let total_count = matching.len() as u64;
        let offset = page.saturating_sub(1) as usize * limit as usize;
        let items = matching.into_iter().skip(offset).take(limit as usize).collect();

        Ok(AppointmentPage {
            items,
            page,
            total_pages: AppointmentPage::total_pages_for(total_count, limit),
            total_count,
        })
    }

    async fn list_active_for_doctor(&self, doctor_id: Uuid, date: NaiveDate) -> Result<Vec<Appointment>, AppointmentError> {
        self.ensure_online().await?;

        let (start, end) = day_bounds(date);
        let mut active: Vec<Appointment> = self
            .appointments
            .read()
            .await
            .values()
            .filter(|a| a.doctor_id == doctor_id && a.status.occupies_slot() && a.overlaps(start, end))
            .cloned()
            .collect();
        active.sort_by_key(|a| a.scheduled_at);
        Ok(active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::{DateTime, TimeZone};
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use shared_utils::test_utils::{MockSupabaseResponses, TestConfig};

    fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 1, day, hour, minute, 0).unwrap()
    }

    fn draft(doctor_id: Uuid, patient_id: Uuid, scheduled_at: DateTime<Utc>) -> AppointmentDraft {
        AppointmentDraft {
            doctor_id,
            patient_id,
            scheduled_at,
            duration_minutes: 30,
            reason_for_visit: None,
        }
    }

    #[tokio::test]
    async fn test_in_memory_create_and_update() {
        let store = InMemoryAppointmentStore::new();
        let created = store.create(draft(Uuid::new_v4(), Uuid::new_v4(), at(7, 10, 0))).await.unwrap();
        assert_eq!(created.status, AppointmentStatus::Requested);

        let updated = store
            .update(
                created.id,
                AppointmentPatch {
                    status: AppointmentStatus::Confirmed,
                    cancellation_reason: None,
                    completion_notes: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.status, AppointmentStatus::Confirmed);
        assert_eq!(store.get_by_id(created.id).await.unwrap().status, AppointmentStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_in_memory_missing_appointment() {
        let store = InMemoryAppointmentStore::new();
        assert_matches!(store.get_by_id(Uuid::new_v4()).await, Err(AppointmentError::NotFound));
    }

    #[tokio::test]
    async fn test_in_memory_pagination() {
        let store = InMemoryAppointmentStore::new();
        let patient_id = Uuid::new_v4();
        for hour in 8..13 {
            store.create(draft(Uuid::new_v4(), patient_id, at(7, hour, 0))).await.unwrap();
        }
        store.create(draft(Uuid::new_v4(), Uuid::new_v4(), at(7, 9, 0))).await.unwrap();

        let owner = AppointmentOwner::Patient(patient_id);
        let page = store.list_mine(&owner, &AppointmentFilters::default(), 2, 2).await.unwrap();

        assert_eq!(page.total_count, 5);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.page, 2);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].scheduled_at, at(7, 10, 0));
    }

    #[tokio::test]
    async fn test_in_memory_active_excludes_terminal() {
        let store = InMemoryAppointmentStore::new();
        let doctor_id = Uuid::new_v4();
        let kept = store.create(draft(doctor_id, Uuid::new_v4(), at(7, 9, 0))).await.unwrap();
        let cancelled = store.create(draft(doctor_id, Uuid::new_v4(), at(7, 10, 0))).await.unwrap();
        store.create(draft(doctor_id, Uuid::new_v4(), at(8, 10, 0))).await.unwrap();
        store
            .update(
                cancelled.id,
                AppointmentPatch {
                    status: AppointmentStatus::Cancelled,
                    cancellation_reason: Some("Schedule conflict".to_string()),
                    completion_notes: None,
                },
            )
            .await
            .unwrap();

        let date = NaiveDate::from_ymd_opt(2030, 1, 7).unwrap();
        let active = store.list_active_for_doctor(doctor_id, date).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, kept.id);
    }

    #[tokio::test]
    async fn test_supabase_list_mine_reads_count() {
        let mock_server = MockServer::start().await;
        let config = TestConfig::with_supabase_url(&mock_server.uri()).to_app_config();
        let patient_id = Uuid::new_v4();

        Mock::given(method("GET"))
            .and(path("/rest/v1/appointments"))
            .and(query_param("patient_id", format!("eq.{}", patient_id)))
            .and(query_param("limit", "1"))
            .and(query_param("offset", "0"))
            .and(header("Prefer", "count=exact"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Range", "0-0/3")
                    .set_body_json(json!([MockSupabaseResponses::appointment_row(
                        &Uuid::new_v4().to_string(),
                        &patient_id.to_string(),
                        &Uuid::new_v4().to_string(),
                        at(7, 9, 0),
                        "requested",
                    )])),
            )
            .mount(&mock_server)
            .await;

        let store = SupabaseAppointmentStore::new(&config, Some("token"));
        let page = store
            .list_mine(&AppointmentOwner::Patient(patient_id), &AppointmentFilters::default(), 1, 1)
            .await
            .unwrap();

        assert_eq!(page.total_count, 3);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.items.len(), 1);
    }

    #[tokio::test]
    async fn test_supabase_update_of_missing_row() {
        let mock_server = MockServer::start().await;
        let config = TestConfig::with_supabase_url(&mock_server.uri()).to_app_config();

        Mock::given(method("PATCH"))
            .and(path("/rest/v1/appointments"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&mock_server)
            .await;

        let store = SupabaseAppointmentStore::new(&config, Some("token"));
        let result = store
            .update(
                Uuid::new_v4(),
                AppointmentPatch {
                    status: AppointmentStatus::Confirmed,
                    cancellation_reason: None,
                    completion_notes: None,
                },
            )
            .await;
        assert_matches!(result, Err(AppointmentError::NotFound));
    }

    #[tokio::test]
    async fn test_supabase_outage_is_upstream_unavailable() {
        let config = TestConfig::with_supabase_url("http://127.0.0.1:1").to_app_config();
        let store = SupabaseAppointmentStore::new(&config, None);

        let result = store
            .list_active_for_doctor(Uuid::new_v4(), NaiveDate::from_ymd_opt(2030, 1, 7).unwrap())
            .await;
        assert_matches!(result, Err(AppointmentError::UpstreamUnavailable(_)));
    }

    #[test]
    fn test_list_path_filters() {
        let doctor_id = Uuid::new_v4();
        let filters = AppointmentFilters {
            status: Some(AppointmentStatus::Confirmed),
            from_date: NaiveDate::from_ymd_opt(2030, 1, 7),
            to_date: None,
        };
        let path = SupabaseAppointmentStore::list_path(&AppointmentOwner::Doctor(doctor_id), &filters, 3, 10);

        assert!(path.contains(&format!("doctor_id=eq.{}", doctor_id)));
        assert!(path.contains("status=eq.confirmed"));
        assert!(path.contains("scheduled_at=gte.2030-01-07T00%3A00%3A00%2B00%3A00"));
        assert!(path.ends_with("limit=10&offset=20"));
    }
}
