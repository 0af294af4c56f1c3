// libs/doctor-cell/src/services/availability.rs
use std::sync::Arc;

use chrono::{Datelike, NaiveDate, NaiveTime};
use tracing::debug;
use uuid::Uuid;

use crate::models::{AvailabilityOverride, DoctorError, DoctorScheduleResponse, WorkingHours};
use crate::services::directory::DoctorDirectory;

const MINUTES_PER_DAY: i64 = 24 * 60;

/// Computes a doctor's theoretical slot grid from the configured schedule.
/// Booked appointments are not considered here; the appointment cell removes them.
pub struct AvailabilityService {
    directory: Arc<dyn DoctorDirectory>,
}

impl AvailabilityService {
    pub fn new(directory: Arc<dyn DoctorDirectory>) -> Self {
        Self { directory }
    }

    /// Working windows and any override that apply to one date.
    pub async fn get_schedule(&self, doctor_id: Uuid, date: NaiveDate) -> Result<DoctorScheduleResponse, DoctorError> {
        debug!("Loading schedule for doctor {} on {}", doctor_id, date);

        let working_hours = self.directory.working_hours(doctor_id, day_of_week(date)).await?;
        let day_override = self.directory.override_for(doctor_id, date).await?;

        Ok(DoctorScheduleResponse {
            doctor_id,
            date,
            working_hours,
            day_override,
        })
    }

    /// Slot start times for `date` before any bookings are subtracted.
    pub async fn working_grid(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        duration_minutes: i32,
    ) -> Result<Vec<NaiveTime>, DoctorError> {
        if duration_minutes <= 0 {
            return Err(DoctorError::ValidationError(
                "Duration must be a positive number of minutes".to_string(),
            ));
        }

        let schedule = self.get_schedule(doctor_id, date).await?;
        let grid = calculate_grid(
            &schedule.working_hours,
            schedule.day_override.as_ref(),
            duration_minutes as i64,
        );

        debug!("Doctor {} has {} grid slots on {}", doctor_id, grid.len(), date);
        Ok(grid)
    }
}

/// 0 = Sunday .. 6 = Saturday, matching the stored `day_of_week` column.
pub fn day_of_week(date: NaiveDate) -> i32 {
    date.weekday().num_days_from_sunday() as i32
}

/// Lay slots of `duration_minutes` back to back (plus each window's buffer) inside every
/// available window. A slot must end by the window's end. Result is ascending and unique.
pub fn calculate_grid(
    windows: &[WorkingHours],
    day_override: Option<&AvailabilityOverride>,
    duration_minutes: i64,
) -> Vec<NaiveTime> {
    if duration_minutes <= 0 {
        return Vec::new();
    }

    if let Some(entry) = day_override {
        if !entry.is_available {
            debug!("Override on {} marks doctor unavailable", entry.override_date);
            return Vec::new();
        }
    }

    let mut starts: Vec<i64> = Vec::new();

    for window in windows.iter().filter(|w| w.is_available) {
        let step = duration_minutes + window.buffer_minutes.max(0) as i64;
        let end = window.end_minute();
        let mut cursor = window.start_minute();

        while cursor + duration_minutes <= end {
            starts.push(cursor);
            cursor += step;
        }
    }

    starts.sort_unstable();
    starts.dedup();

    starts
        .into_iter()
        .filter(|m| *m < MINUTES_PER_DAY)
        .filter_map(|m| NaiveTime::from_num_seconds_from_midnight_opt((m * 60) as u32, 0))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Doctor;
    use crate::services::directory::InMemoryDoctorDirectory;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn window(start: NaiveTime, end: NaiveTime) -> WorkingHours {
        WorkingHours::new(Uuid::nil(), 1, start, end)
    }

    #[test]
    fn test_grid_fills_window_back_to_back() {
        let grid = calculate_grid(&[window(t(9, 0), t(11, 0))], None, 30);
        assert_eq!(grid, vec![t(9, 0), t(9, 30), t(10, 0), t(10, 30)]);
    }

    #[test]
    fn test_grid_drops_partial_trailing_slot() {
        let grid = calculate_grid(&[window(t(9, 0), t(10, 15))], None, 30);
        assert_eq!(grid, vec![t(9, 0), t(9, 30)]);
    }

    #[test]
    fn test_grid_respects_buffer() {
        let mut w = window(t(9, 0), t(11, 0));
        w.buffer_minutes = 15;
        let grid = calculate_grid(&[w], None, 30);
        assert_eq!(grid, vec![t(9, 0), t(9, 45), t(10, 30)]);
    }

    #[test]
    fn test_grid_merges_windows_in_order() {
        let grid = calculate_grid(
            &[window(t(14, 0), t(15, 0)), window(t(9, 0), t(10, 0))],
            None,
            30,
        );
        assert_eq!(grid, vec![t(9, 0), t(9, 30), t(14, 0), t(14, 30)]);
    }

    #[test]
    fn test_grid_skips_unavailable_windows_and_days() {
        let mut closed = window(t(9, 0), t(10, 0));
        closed.is_available = false;
        assert!(calculate_grid(&[closed], None, 30).is_empty());

        let day_off = AvailabilityOverride {
            id: Uuid::new_v4(),
            doctor_id: Uuid::nil(),
            override_date: NaiveDate::from_ymd_opt(2030, 1, 7).unwrap(),
            is_available: false,
            reason: Some("Conference".to_string()),
        };
        assert!(calculate_grid(&[window(t(9, 0), t(10, 0))], Some(&day_off), 30).is_empty());
    }

    #[test]
    fn test_day_of_week_starts_on_sunday() {
        // 2030-01-06 is a Sunday
        assert_eq!(day_of_week(NaiveDate::from_ymd_opt(2030, 1, 6).unwrap()), 0);
        assert_eq!(day_of_week(NaiveDate::from_ymd_opt(2030, 1, 7).unwrap()), 1);
        assert_eq!(day_of_week(NaiveDate::from_ymd_opt(2030, 1, 12).unwrap()), 6);
    }

    #[tokio::test]
    async fn test_working_grid_from_directory() {
        let directory = Arc::new(InMemoryDoctorDirectory::new());
        let doctor_id = Uuid::new_v4();
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

        let service = AvailabilityService::new(directory);
        let monday = NaiveDate::from_ymd_opt(2030, 1, 7).unwrap();
        let tuesday = NaiveDate::from_ymd_opt(2030, 1, 8).unwrap();

        assert_eq!(service.working_grid(doctor_id, monday, 30).await.unwrap(), vec![t(9, 0), t(9, 30)]);
        assert!(service.working_grid(doctor_id, tuesday, 30).await.unwrap().is_empty());
        assert!(service.working_grid(doctor_id, monday, 0).await.is_err());
    }
}
