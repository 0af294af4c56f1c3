// libs/appointment-cell/src/services/booking.rs
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use doctor_cell::models::DoctorSummary;
use doctor_cell::services::{DoctorDirectory, SupabaseDoctorDirectory};
use shared_config::AppConfig;
use shared_models::auth::{Actor, ActorRole};

use crate::models::{
    actor_uuid, Appointment, AppointmentDraft, AppointmentError, AppointmentFilters, AppointmentOwner,
    AppointmentPage, AppointmentValidationRules, AvailabilityQuery, AvailabilityResponse,
    BookAppointmentRequest, ListAppointmentsQuery,
};
use crate::services::availability::AvailabilityResolver;
use crate::services::store::{AppointmentStore, SupabaseAppointmentStore};

/// Patient-facing flow: pick a doctor, resolve slots, request an appointment, review bookings.
pub struct AppointmentBookingService {
    directory: Arc<dyn DoctorDirectory>,
    store: Arc<dyn AppointmentStore>,
    resolver: AvailabilityResolver,
    validation_rules: AppointmentValidationRules,
}

impl AppointmentBookingService {
    pub fn new(config: &AppConfig, auth_token: &str) -> Self {
        let directory: Arc<dyn DoctorDirectory> = Arc::new(SupabaseDoctorDirectory::new(config, Some(auth_token)));
        let store: Arc<dyn AppointmentStore> = Arc::new(SupabaseAppointmentStore::new(config, Some(auth_token)));
        let rules = AppointmentValidationRules::with_default_duration(config.default_appointment_duration_minutes);

        Self::with_collaborators(directory, store, rules, config.upstream_timeout())
    }

    pub fn with_collaborators(
        directory: Arc<dyn DoctorDirectory>,
        store: Arc<dyn AppointmentStore>,
        validation_rules: AppointmentValidationRules,
        timeout: StdDuration,
    ) -> Self {
        let resolver = AvailabilityResolver::new(Arc::clone(&directory), Arc::clone(&store), timeout)
            .with_rules(validation_rules.clone());

        Self {
            directory,
            store,
            resolver,
            validation_rules,
        }
    }

    pub async fn list_bookable_doctors(&self) -> Result<Vec<DoctorSummary>, AppointmentError> {
        Ok(self.directory.list_bookable_doctors().await?)
    }

    pub async fn check_availability(&self, query: AvailabilityQuery) -> Result<AvailabilityResponse, AppointmentError> {
        let mut response = self
            .resolver
            .resolve_availability(query.doctor_id, query.date, query.duration_minutes)
            .await?;
        response.generation = query.generation;
        Ok(response)
    }

    pub async fn book_appointment(
        &self,
        request: BookAppointmentRequest,
        actor: &Actor,
    ) -> Result<Appointment, AppointmentError> {
        self.book_appointment_at(request, actor, Utc::now()).await
    }

    /// Create a `Requested` appointment in a slot the resolver currently offers.
    pub async fn book_appointment_at(
        &self,
        request: BookAppointmentRequest,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<Appointment, AppointmentError> {
        let patient_id = self.resolve_patient(&request, actor)?;
        let duration = self.validation_rules.resolve_duration(request.duration_minutes)?;
        let reason_for_visit = self.validation_rules.bounded_text(
            "reason_for_visit",
            request.reason_for_visit.as_deref(),
            self.validation_rules.max_reason_length,
        )?;

        let scheduled_at = request.date.and_time(request.time).and_utc();
        if scheduled_at < now {
            return Err(AppointmentError::ValidationFailed(
                "Appointment time cannot be in the past".to_string(),
            ));
        }

        debug!(
            "Booking doctor {} for patient {} at {} ({} min)",
            request.doctor_id, patient_id, scheduled_at, duration
        );

        let availability = self
            .resolver
            .resolve_availability_at(request.doctor_id, request.date, Some(duration), now)
            .await?;

        if !availability.slots.contains(&request.time) {
            warn!("Slot {} on {} is not free for doctor {}", request.time, request.date, request.doctor_id);
            return Err(AppointmentError::SlotUnavailable);
        }

        let appointment = self
            .store
            .create(AppointmentDraft {
                doctor_id: request.doctor_id,
                patient_id,
                scheduled_at,
                duration_minutes: duration,
                reason_for_visit,
            })
            .await?;

        info!("Appointment {} requested by {}", appointment.id, actor.actor_id);
        Ok(appointment)
    }

    pub async fn get_appointment(&self, appointment_id: Uuid, actor: &Actor) -> Result<Appointment, AppointmentError> {
        let appointment = self.store.get_by_id(appointment_id).await?;

        if !appointment.is_accessible_by(actor) {
            warn!("Actor {} denied access to appointment {}", actor.actor_id, appointment_id);
            return Err(AppointmentError::Forbidden(
                "Not authorized to view this appointment".to_string(),
            ));
        }
        Ok(appointment)
    }

    pub async fn list_mine(&self, actor: &Actor, query: ListAppointmentsQuery) -> Result<AppointmentPage, AppointmentError> {
        let owner = AppointmentOwner::for_actor(actor)?;
        let page = query.page.unwrap_or(1).max(1);
        let limit = query
            .limit
            .unwrap_or(self.validation_rules.default_page_size)
            .clamp(1, self.validation_rules.max_page_size);

        if let (Some(from), Some(to)) = (query.from_date, query.to_date) {
            if from > to {
                return Err(AppointmentError::ValidationFailed(
                    "from_date must not be after to_date".to_string(),
                ));
            }
        }

        let filters = AppointmentFilters {
            status: query.status,
            from_date: query.from_date,
            to_date: query.to_date,
        };

        self.store.list_mine(&owner, &filters, page, limit).await
    }

    fn resolve_patient(&self, request: &BookAppointmentRequest, actor: &Actor) -> Result<Uuid, AppointmentError> {
        match actor.role {
            ActorRole::Patient => {
                let own_id = actor_uuid(actor)?;
                match request.patient_id {
                    Some(requested) if requested != own_id => Err(AppointmentError::Forbidden(
                        "Patients can only book appointments for themselves".to_string(),
                    )),
                    _ => Ok(own_id),
                }
            }
            ActorRole::Staff | ActorRole::Admin => request.patient_id.ok_or_else(|| {
                AppointmentError::ValidationFailed("patient_id is required when booking on behalf of a patient".to_string())
            }),
            ActorRole::Doctor => Err(AppointmentError::Forbidden(
                "Doctors cannot request appointments".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::{NaiveDate, NaiveTime, TimeZone};

    use doctor_cell::models::{Doctor, WorkingHours};
    use doctor_cell::services::InMemoryDoctorDirectory;

    use crate::models::AppointmentStatus;
    use crate::services::store::InMemoryAppointmentStore;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2030, 1, 7).unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2029, 12, 1, 8, 0, 0).unwrap()
    }

    struct Fixture {
        doctor_id: Uuid,
        patient: Actor,
        store: Arc<InMemoryAppointmentStore>,
        service: AppointmentBookingService,
    }

    async fn fixture() -> Fixture {
        let doctor_id = Uuid::new_v4();
        let directory = Arc::new(InMemoryDoctorDirectory::new());
        directory
            .add_doctor(Doctor {
                id: doctor_id,
                first_name: "Ada".to_string(),
                last_name: "Byrne".to_string(),
                specialty: "General Practice".to_string(),
                is_available: true,
                is_verified: true,
                timezone: None,
            })
            .await;
        directory
            .add_working_hours(WorkingHours::new(doctor_id, 1, t(9, 0), t(10, 0)))
            .await
            .unwrap();

        let store = Arc::new(InMemoryAppointmentStore::new());
        let service = AppointmentBookingService::with_collaborators(
            directory,
            store.clone(),
            AppointmentValidationRules::default(),
            StdDuration::from_secs(5),
        );

        Fixture {
            doctor_id,
            patient: Actor::new(Uuid::new_v4().to_string(), ActorRole::Patient),
            store,
            service,
        }
    }

    fn request(doctor_id: Uuid, time: NaiveTime) -> BookAppointmentRequest {
        BookAppointmentRequest {
            doctor_id,
            patient_id: None,
            date: monday(),
            time,
            duration_minutes: None,
            reason_for_visit: Some("  Follow-up  ".to_string()),
        }
    }

    #[tokio::test]
    async fn test_patient_books_free_slot() {
        let f = fixture().await;
        let appointment = f
            .service
            .book_appointment_at(request(f.doctor_id, t(9, 30)), &f.patient, now())
            .await
            .unwrap();

        assert_eq!(appointment.status, AppointmentStatus::Requested);
        assert_eq!(appointment.patient_id.to_string(), f.patient.actor_id);
        assert_eq!(appointment.duration_minutes, 30);
        assert_eq!(appointment.reason_for_visit.as_deref(), Some("Follow-up"));
    }

    #[tokio::test]
    async fn test_booked_slot_disappears_and_cannot_be_rebooked() {
        let f = fixture().await;
        f.service
            .book_appointment_at(request(f.doctor_id, t(9, 0)), &f.patient, now())
            .await
            .unwrap();

        let second = f
            .service
            .book_appointment_at(request(f.doctor_id, t(9, 0)), &f.patient, now())
            .await;
        assert_eq!(second, Err(AppointmentError::SlotUnavailable));
    }

    #[tokio::test]
    async fn test_off_grid_time_is_unavailable() {
        let f = fixture().await;
        let result = f
            .service
            .book_appointment_at(request(f.doctor_id, t(9, 10)), &f.patient, now())
            .await;
        assert_eq!(result, Err(AppointmentError::SlotUnavailable));
    }

    #[tokio::test]
    async fn test_past_time_rejected() {
        let f = fixture().await;
        let later = monday().and_time(t(9, 45)).and_utc();
        let result = f
            .service
            .book_appointment_at(request(f.doctor_id, t(9, 30)), &f.patient, later)
            .await;
        assert_matches!(result, Err(AppointmentError::ValidationFailed(_)));
    }

    #[tokio::test]
    async fn test_patient_cannot_book_for_someone_else() {
        let f = fixture().await;
        let mut req = request(f.doctor_id, t(9, 0));
        req.patient_id = Some(Uuid::new_v4());

        let result = f.service.book_appointment_at(req, &f.patient, now()).await;
        assert_matches!(result, Err(AppointmentError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_staff_books_on_behalf() {
        let f = fixture().await;
        let staff = Actor::new(Uuid::new_v4().to_string(), ActorRole::Staff);

        let missing = f.service.book_appointment_at(request(f.doctor_id, t(9, 0)), &staff, now()).await;
        assert_matches!(missing, Err(AppointmentError::ValidationFailed(_)));

        let patient_id = Uuid::new_v4();
        let mut req = request(f.doctor_id, t(9, 0));
        req.patient_id = Some(patient_id);
        let appointment = f.service.book_appointment_at(req, &staff, now()).await.unwrap();
        assert_eq!(appointment.patient_id, patient_id);
    }

    #[tokio::test]
    async fn test_doctor_cannot_book() {
        let f = fixture().await;
        let doctor = Actor::new(f.doctor_id.to_string(), ActorRole::Doctor);
        let result = f.service.book_appointment_at(request(f.doctor_id, t(9, 0)), &doctor, now()).await;
        assert_matches!(result, Err(AppointmentError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_unknown_doctor_is_invalid() {
        let f = fixture().await;
        let result = f
            .service
            .book_appointment_at(request(Uuid::new_v4(), t(9, 0)), &f.patient, now())
            .await;
        assert_eq!(result, Err(AppointmentError::InvalidDoctor));
    }

    #[tokio::test]
    async fn test_get_and_list_respect_ownership() {
        let f = fixture().await;
        let booked = f
            .service
            .book_appointment_at(request(f.doctor_id, t(9, 0)), &f.patient, now())
            .await
            .unwrap();

        assert!(f.service.get_appointment(booked.id, &f.patient).await.is_ok());

        let stranger = Actor::new(Uuid::new_v4().to_string(), ActorRole::Patient);
        assert_matches!(
            f.service.get_appointment(booked.id, &stranger).await,
            Err(AppointmentError::Forbidden(_))
        );
        assert_eq!(
            f.service.list_mine(&stranger, ListAppointmentsQuery::default()).await.unwrap().total_count,
            0
        );

        let doctor = Actor::new(f.doctor_id.to_string(), ActorRole::Doctor);
        let page = f.service.list_mine(&doctor, ListAppointmentsQuery::default()).await.unwrap();
        assert_eq!(page.total_count, 1);
        assert_eq!(page.page, 1);
        assert_eq!(f.store.get_by_id(booked.id).await.unwrap().id, page.items[0].id);
    }

    #[tokio::test]
    async fn test_list_rejects_inverted_range() {
        let f = fixture().await;
        let query = ListAppointmentsQuery {
            from_date: Some(monday()),
            to_date: monday().pred_opt(),
            ..Default::default()
        };
        assert_matches!(
            f.service.list_mine(&f.patient, query).await,
            Err(AppointmentError::ValidationFailed(_))
        );
    }
}
