// libs/appointment-cell/src/services/lifecycle.rs
use tracing::{debug, info, warn};

use shared_models::auth::{Actor, ActorRole};

use crate::models::{
    Appointment, AppointmentError, AppointmentStatus, AppointmentValidationRules, TransitionPayload,
};

/// Which roles may take an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermittedActors {
    Clinician,
    ClinicianOrPatient,
}

impl PermittedActors {
    pub fn allows(&self, role: ActorRole) -> bool {
        match self {
            PermittedActors::Clinician => role.is_clinician(),
            PermittedActors::ClinicianOrPatient => role.is_clinician() || role == ActorRole::Patient,
        }
    }
}

/// Whether a payload field may, must, or must not accompany an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRule {
    Forbidden,
    Optional,
    Required,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionRule {
    pub from: AppointmentStatus,
    pub to: AppointmentStatus,
    pub actors: PermittedActors,
    pub cancellation_reason: FieldRule,
    pub completion_notes: FieldRule,
}

use AppointmentStatus::{Cancelled, Completed, Confirmed, NoShow, Requested};

/// Every permitted status change. Anything absent here is rejected.
pub const TRANSITIONS: [TransitionRule; 6] = [
    TransitionRule {
        from: Requested,
        to: Confirmed,
        actors: PermittedActors::Clinician,
        cancellation_reason: FieldRule::Forbidden,
        completion_notes: FieldRule::Forbidden,
    },
    TransitionRule {
        from: Requested,
        to: Cancelled,
        actors: PermittedActors::ClinicianOrPatient,
        cancellation_reason: FieldRule::Required,
        completion_notes: FieldRule::Forbidden,
    },
    TransitionRule {
        from: Requested,
        to: NoShow,
        actors: PermittedActors::Clinician,
        cancellation_reason: FieldRule::Optional,
        completion_notes: FieldRule::Forbidden,
    },
    TransitionRule {
        from: Confirmed,
        to: Completed,
        actors: PermittedActors::Clinician,
        cancellation_reason: FieldRule::Forbidden,
        completion_notes: FieldRule::Optional,
    },
    TransitionRule {
        from: Confirmed,
        to: Cancelled,
        actors: PermittedActors::ClinicianOrPatient,
        cancellation_reason: FieldRule::Required,
        completion_notes: FieldRule::Forbidden,
    },
    TransitionRule {
        from: Confirmed,
        to: NoShow,
        actors: PermittedActors::Clinician,
        cancellation_reason: FieldRule::Optional,
        completion_notes: FieldRule::Forbidden,
    },
];

pub fn find_rule(from: AppointmentStatus, to: AppointmentStatus) -> Option<&'static TransitionRule> {
    TRANSITIONS.iter().find(|rule| rule.from == from && rule.to == to)
}

pub struct AppointmentLifecycleService {
    rules: AppointmentValidationRules,
}

impl Default for AppointmentLifecycleService {
    fn default() -> Self {
        Self::new()
    }
}

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self {
            rules: AppointmentValidationRules::default(),
        }
    }

    pub fn with_rules(rules: AppointmentValidationRules) -> Self {
        Self { rules }
    }

    /// Validate that a status transition is allowed
    pub fn validate_status_transition(
        &self,
        current_status: AppointmentStatus,
        new_status: AppointmentStatus,
    ) -> Result<&'static TransitionRule, AppointmentError> {
        debug!("Validating status transition from {} to {}", current_status, new_status);

        find_rule(current_status, new_status).ok_or_else(|| {
            warn!("Invalid status transition attempted: {} -> {}", current_status, new_status);
            AppointmentError::InvalidTransition {
                from: current_status,
                to: new_status,
            }
        })
    }

    /// Get all valid next statuses for a given current status
    pub fn get_valid_transitions(&self, current_status: AppointmentStatus) -> Vec<AppointmentStatus> {
        TRANSITIONS
            .iter()
            .filter(|rule| rule.from == current_status)
            .map(|rule| rule.to)
            .collect()
    }

    /// Next statuses a given role may select, as offered by booking and management views alike.
    pub fn selectable_statuses(&self, current_status: AppointmentStatus, role: ActorRole) -> Vec<AppointmentStatus> {
        TRANSITIONS
            .iter()
            .filter(|rule| rule.from == current_status && rule.actors.allows(role))
            .map(|rule| rule.to)
            .collect()
    }

    /// Check edge, then actor, then payload. On success the returned appointment carries the
    /// new status, the field belonging to it, and no fields of other terminal states.
    pub fn apply_transition(
        &self,
        appointment: &Appointment,
        requested_status: AppointmentStatus,
        payload: &TransitionPayload,
        actor: &Actor,
    ) -> Result<Appointment, AppointmentError> {
        let rule = self.validate_status_transition(appointment.status, requested_status)?;

        if !rule.actors.allows(actor.role) {
            warn!(
                "Actor {} ({}) may not move appointment {} to {}",
                actor.actor_id, actor.role, appointment.id, requested_status
            );
            return Err(AppointmentError::Forbidden(format!(
                "A {} cannot move an appointment to {}",
                actor.role, requested_status
            )));
        }

        let cancellation_reason = self.check_field(
            "cancellation_reason",
            rule.cancellation_reason,
            payload.cancellation_reason.as_deref(),
            requested_status,
        )?;
        let completion_notes = self.check_field(
            "completion_notes",
            rule.completion_notes,
            payload.completion_notes.as_deref(),
            requested_status,
        )?;

        let mut updated = appointment.clone();
        updated.status = requested_status;
        updated.cancellation_reason = cancellation_reason;
        updated.completion_notes = completion_notes;

        info!(
            "Appointment {} transitioned {} -> {} by {}",
            appointment.id, appointment.status, requested_status, actor.actor_id
        );
        Ok(updated)
    }

    fn check_field(
        &self,
        field: &str,
        rule: FieldRule,
        value: Option<&str>,
        target: AppointmentStatus,
    ) -> Result<Option<String>, AppointmentError> {
        let value = self.rules.bounded_text(field, value, self.rules.max_note_length)?;

        match (rule, value) {
            (FieldRule::Required, None) => Err(AppointmentError::ValidationFailed(format!(
                "{} is required when moving to {}",
                field, target
            ))),
            (FieldRule::Forbidden, Some(_)) => Err(AppointmentError::ValidationFailed(format!(
                "{} is not allowed when moving to {}",
                field, target
            ))),
            (FieldRule::Forbidden, None) => Ok(None),
            (_, value) => Ok(value),
        }
    }
}
