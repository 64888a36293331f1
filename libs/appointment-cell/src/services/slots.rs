// libs/appointment-cell/src/services/slots.rs
use std::sync::Arc;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use tracing::debug;
use uuid::Uuid;

use clinic_cell::models::OperatingHours;
use clinic_cell::services::OperatingHoursStore;
use shared_utils::clock::{at_day_offset, Clock};

use crate::models::{AppointmentError, Slot, SlotState};

/// Lazy, restartable sequence of the slots of one clinic day.
///
/// Cloning yields an independent iterator from the same position, so the
/// sequence can be walked more than once without re-reading the hours.
#[derive(Debug, Clone)]
pub struct DaySlots {
    day: NaiveDate,
    closed: bool,
    cursor: i64,
    close: i64,
    step: i64,
    break_window: Option<(i64, i64)>,
    now: DateTime<Utc>,
}

impl DaySlots {
    pub fn day(&self) -> NaiveDate {
        self.day
    }

    /// No slots because the clinic does not open on this day.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn state_of(&self, start: i64, end: i64) -> SlotState {
        if let Some((break_start, break_end)) = self.break_window {
            if start < break_end && break_start < end {
                return SlotState::Break;
            }
        }
        if at_day_offset(self.day, start) < self.now {
            return SlotState::Past;
        }
        SlotState::Available
    }
}

impl Iterator for DaySlots {
    type Item = Slot;

    fn next(&mut self) -> Option<Slot> {
        if self.step <= 0 || self.cursor + self.step > self.close {
            return None;
        }
        let (start, end) = (self.cursor, self.cursor + self.step);
        self.cursor = end;
        Some(Slot::from_offsets(self.day, start, end, self.state_of(start, end)))
    }
}

/// Slots for `day` under `hours`, every `granularity_minutes`, judged against `now`.
///
/// Candidates start at opening time; the last one ending after closing is
/// dropped. A slot overlapping the break is `Break` even when it is also in
/// the past. Every slot of a day before today is `Past`.
pub fn day_slots(
    hours: &OperatingHours,
    day: NaiveDate,
    granularity_minutes: i64,
    now: DateTime<Utc>,
) -> DaySlots {
    let (cursor, close, closed) = match hours.open_window() {
        Some((open, close)) => (open, close, false),
        None => (0, 0, true),
    };

    DaySlots {
        day,
        closed,
        cursor,
        close,
        step: granularity_minutes,
        break_window: hours.break_window(),
        now,
    }
}

/// Derives slots from the clinic's stored hours and the injected clock.
#[derive(Clone)]
pub struct SlotGenerator {
    hours: Arc<dyn OperatingHoursStore>,
    clock: Arc<dyn Clock>,
}

impl SlotGenerator {
    pub fn new(hours: Arc<dyn OperatingHoursStore>, clock: Arc<dyn Clock>) -> Self {
        Self { hours, clock }
    }

    pub async fn generate(
        &self,
        clinic_id: Uuid,
        day: NaiveDate,
        granularity_minutes: i64,
    ) -> Result<DaySlots, AppointmentError> {
        if granularity_minutes <= 0 {
            return Err(AppointmentError::ValidationError(format!(
                "Slot granularity must be positive, got {}",
                granularity_minutes
            )));
        }

        let hours = self.hours.get(clinic_id, day.weekday()).await?;
        debug!("Generating {}-minute slots for clinic {} on {}", granularity_minutes, clinic_id, day);
        Ok(day_slots(&hours, day, granularity_minutes, self.clock.now()))
    }
}
