// libs/appointment-cell/src/services/availability.rs
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use tracing::{debug, error, warn};
use uuid::Uuid;

use doctor_cell::services::{AvailabilityService, DoctorDirectory};

use crate::models::{Appointment, AppointmentError, AvailabilityResponse, AppointmentValidationRules};
use crate::services::selection::{ResolutionTicket, ResolvedSlots};
use crate::services::store::AppointmentStore;

/// Bookable start times for a doctor on a date: the working grid minus occupied and past slots.
pub struct AvailabilityResolver {
    directory: Arc<dyn DoctorDirectory>,
    store: Arc<dyn AppointmentStore>,
    rules: AppointmentValidationRules,
    timeout: StdDuration,
}

impl AvailabilityResolver {
    pub fn new(
        directory: Arc<dyn DoctorDirectory>,
        store: Arc<dyn AppointmentStore>,
        timeout: StdDuration,
    ) -> Self {
        Self {
            directory,
            store,
            rules: AppointmentValidationRules::default(),
            timeout,
        }
    }

    pub fn with_rules(mut self, rules: AppointmentValidationRules) -> Self {
        self.rules = rules;
        self
    }

    pub async fn resolve_availability(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        duration_minutes: Option<i32>,
    ) -> Result<AvailabilityResponse, AppointmentError> {
        self.resolve_availability_at(doctor_id, date, duration_minutes, Utc::now()).await
    }

    /// Same as `resolve_availability` with an explicit clock.
    pub async fn resolve_availability_at(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        duration_minutes: Option<i32>,
        now: DateTime<Utc>,
    ) -> Result<AvailabilityResponse, AppointmentError> {
        let duration = self.rules.resolve_duration(duration_minutes)?;

        if date < now.date_naive() {
            return Err(AppointmentError::ValidationFailed(format!(
                "Cannot look up availability for past date {}",
                date
            )));
        }

        debug!("Resolving availability for doctor {} on {} ({} min)", doctor_id, date, duration);

        let (grid, booked) = tokio::time::timeout(self.timeout, self.load(doctor_id, date, duration))
            .await
            .map_err(|_| {
                error!("Availability lookup for doctor {} timed out after {:?}", doctor_id, self.timeout);
                AppointmentError::UpstreamUnavailable("Availability lookup timed out".to_string())
            })??;

        let slots = free_slots(date, &grid, &booked, duration, now);
        debug!("Doctor {} has {} free slots on {}", doctor_id, slots.len(), date);

        Ok(AvailabilityResponse {
            doctor_id,
            date,
            duration_minutes: duration,
            slots,
            generation: None,
        })
    }

    /// Resolve on behalf of a slot selection; the ticket travels back with the result.
    pub async fn resolve_ticket(&self, ticket: ResolutionTicket, now: DateTime<Utc>) -> ResolvedSlots {
        let result = self
            .resolve_availability_at(ticket.doctor_id, ticket.date, ticket.duration_minutes, now)
            .await
            .map(|mut response| {
                response.generation = Some(ticket.generation);
                response
            });

        ResolvedSlots { ticket, result }
    }

    async fn load(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        duration: i32,
    ) -> Result<(Vec<NaiveTime>, Vec<Appointment>), AppointmentError> {
        let doctor = self.directory.get_doctor(doctor_id).await?;
        if !doctor.is_bookable() {
            warn!("Doctor {} is not accepting appointments", doctor_id);
            return Err(AppointmentError::InvalidDoctor);
        }

        let grid = AvailabilityService::new(Arc::clone(&self.directory))
            .working_grid(doctor_id, date, duration)
            .await?;

        if grid.is_empty() {
            return Ok((grid, Vec::new()));
        }

        let booked = self.store.list_active_for_doctor(doctor_id, date).await?;
        Ok((grid, booked))
    }
}

/// Grid slots whose `[start, start + duration)` is clear of every occupying appointment
/// and that do not start before `now`.
pub fn free_slots(
    date: NaiveDate,
    grid: &[NaiveTime],
    booked: &[Appointment],
    duration_minutes: i32,
    now: DateTime<Utc>,
) -> Vec<NaiveTime> {
    let length = Duration::minutes(duration_minutes as i64);

    grid.iter()
        .copied()
        .filter(|time| {
            let start = date.and_time(*time).and_utc();
            let end = start + length;

            start >= now
                && !booked
                    .iter()
                    .any(|a| a.status.occupies_slot() && a.overlaps(start, end))
        })
        .collect()
}
