// libs/appointment-cell/src/services/selection.rs
use chrono::{NaiveDate, NaiveTime};
use tracing::debug;
use uuid::Uuid;

use crate::models::{AppointmentError, AvailabilityResponse};

/// Parameters a booking form has collected so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotQuery {
    pub doctor_id: Option<Uuid>,
    pub date: Option<NaiveDate>,
    pub duration_minutes: Option<i32>,
}

/// A resolution request stamped with the generation it was issued for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionTicket {
    pub generation: u64,
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub duration_minutes: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct ResolvedSlots {
    pub ticket: ResolutionTicket,
    pub result: Result<AvailabilityResponse, AppointmentError>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SlotListState {
    /// Doctor or date not chosen yet.
    #[default]
    Idle,
    Loading,
    Ready(Vec<NaiveTime>),
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    Discarded,
}

/// Tracks the current slot query of one booking flow. Every parameter change bumps the
/// generation and clears the chosen time; results for older generations are dropped.
#[derive(Debug, Default)]
pub struct SlotSelection {
    generation: u64,
    query: SlotQuery,
    state: SlotListState,
    selected_time: Option<NaiveTime>,
}

impl SlotSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn query(&self) -> &SlotQuery {
        &self.query
    }

    pub fn state(&self) -> &SlotListState {
        &self.state
    }

    pub fn selected_time(&self) -> Option<NaiveTime> {
        self.selected_time
    }

    /// Slots currently on offer; empty unless the last resolution succeeded.
    pub fn slots(&self) -> &[NaiveTime] {
        match &self.state {
            SlotListState::Ready(slots) => slots.as_slice(),
            _ => &[],
        }
    }

    /// Replace the query. Returns a ticket to resolve when the query changed and is complete.
    pub fn update_parameters(&mut self, query: SlotQuery) -> Option<ResolutionTicket> {
        if query == self.query {
            return None;
        }

        self.query = query;
        self.generation += 1;
        self.selected_time = None;
        debug!("Slot query changed, generation {}", self.generation);

        self.issue_ticket()
    }

    pub fn set_doctor(&mut self, doctor_id: Uuid) -> Option<ResolutionTicket> {
        let query = SlotQuery {
            doctor_id: Some(doctor_id),
            ..self.query.clone()
        };
        self.update_parameters(query)
    }

    pub fn set_date(&mut self, date: NaiveDate) -> Option<ResolutionTicket> {
        let query = SlotQuery {
            date: Some(date),
            ..self.query.clone()
        };
        self.update_parameters(query)
    }

    /// Re-issue the current query after a failure. Nothing retries on its own.
    pub fn retry(&mut self) -> Option<ResolutionTicket> {
        self.generation += 1;
        self.selected_time = None;
        self.issue_ticket()
    }

    /// Apply a finished resolution if it still belongs to the current generation.
    pub fn apply(&mut self, resolved: ResolvedSlots) -> ApplyOutcome {
        if resolved.ticket.generation != self.generation {
            debug!(
                "Discarding stale slots for generation {} (current {})",
                resolved.ticket.generation, self.generation
            );
            return ApplyOutcome::Discarded;
        }

        self.state = match resolved.result {
            Ok(response) => SlotListState::Ready(response.slots),
            Err(e) => SlotListState::Failed(e.to_string()),
        };
        ApplyOutcome::Applied
    }

    /// Choose a start time from the slots on offer.
    pub fn select_time(&mut self, time: NaiveTime) -> Result<(), AppointmentError> {
        if !self.slots().contains(&time) {
            return Err(AppointmentError::ValidationFailed(format!(
                "{} is not one of the available slots",
                time.format("%H:%M")
            )));
        }
        self.selected_time = Some(time);
        Ok(())
    }

    fn issue_ticket(&mut self) -> Option<ResolutionTicket> {
        match (self.query.doctor_id, self.query.date) {
            (Some(doctor_id), Some(date)) => {
                self.state = SlotListState::Loading;
                Some(ResolutionTicket {
                    generation: self.generation,
                    doctor_id,
                    date,
                    duration_minutes: self.query.duration_minutes,
                })
            }
            _ => {
                self.state = SlotListState::Idle;
                None
            }
        }
    }
}
