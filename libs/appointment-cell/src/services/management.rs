// libs/appointment-cell/src/services/management.rs
use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::Actor;

use crate::models::{Appointment, AppointmentError, AppointmentPatch, AppointmentStatus, TransitionPayload};
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::store::{AppointmentStore, SupabaseAppointmentStore};

/// Status changes on existing appointments, driven by the lifecycle table.
pub struct AppointmentManagementService {
    store: Arc<dyn AppointmentStore>,
    lifecycle_service: AppointmentLifecycleService,
}

impl AppointmentManagementService {
    pub fn new(config: &AppConfig, auth_token: &str) -> Self {
        Self::with_store(Arc::new(SupabaseAppointmentStore::new(config, Some(auth_token))))
    }

    pub fn with_store(store: Arc<dyn AppointmentStore>) -> Self {
        Self {
            store,
            lifecycle_service: AppointmentLifecycleService::new(),
        }
    }

    /// Load, check access, apply the transition and persist it. Last write wins.
    pub async fn transition(
        &self,
        appointment_id: Uuid,
        requested_status: AppointmentStatus,
        payload: TransitionPayload,
        actor: &Actor,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Actor {} requests {} for appointment {}", actor.actor_id, requested_status, appointment_id);

        let appointment = self.load_accessible(appointment_id, actor).await?;
        let updated = self
            .lifecycle_service
            .apply_transition(&appointment, requested_status, &payload, actor)?;

        let saved = self.store.update(appointment_id, AppointmentPatch::from(&updated)).await?;

        if !saved.status.occupies_slot() && appointment.status.occupies_slot() {
            info!(
                "Appointment {} released its slot at {} for doctor {}",
                saved.id, saved.scheduled_at, saved.doctor_id
            );
        }
        Ok(saved)
    }

    /// Statuses the actor could move this appointment to next.
    pub async fn selectable_statuses(
        &self,
        appointment_id: Uuid,
        actor: &Actor,
    ) -> Result<(Appointment, Vec<AppointmentStatus>), AppointmentError> {
        let appointment = self.load_accessible(appointment_id, actor).await?;
        let statuses = self
            .lifecycle_service
            .selectable_statuses(appointment.status, actor.role);
        Ok((appointment, statuses))
    }

    async fn load_accessible(&self, appointment_id: Uuid, actor: &Actor) -> Result<Appointment, AppointmentError> {
        let appointment = self.store.get_by_id(appointment_id).await?;

        if !appointment.is_accessible_by(actor) {
            warn!("Actor {} denied access to appointment {}", actor.actor_id, appointment_id);
            return Err(AppointmentError::Forbidden(
                "Not authorized to manage this appointment".to_string(),
            ));
        }
        Ok(appointment)
    }
}
