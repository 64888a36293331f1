// libs/appointment-cell/src/services/availability.rs
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use futures::future::try_join_all;
use tracing::debug;
use uuid::Uuid;

use shared_utils::clock::{at_wall_clock, Clock};

use crate::models::{AppointmentError, OutOfHoursReason, Slot, SlotState};
use crate::policy::PolicyRules;
use crate::services::ledger::{windows_overlap, BookingLedger};
use crate::services::slots::{DaySlots, SlotGenerator};

/// Answers "can this window be booked" from hours, breaks, the clock and the ledger.
pub struct AvailabilityResolver {
    slots: SlotGenerator,
    ledger: Arc<dyn BookingLedger>,
    clock: Arc<dyn Clock>,
    policy: PolicyRules,
}

impl AvailabilityResolver {
    pub fn new(
        slots: SlotGenerator,
        ledger: Arc<dyn BookingLedger>,
        clock: Arc<dyn Clock>,
        policy: PolicyRules,
    ) -> Self {
        Self {
            slots,
            ledger,
            clock,
            policy,
        }
    }

    /// Checks `[start, start + duration)` against hours, breaks and the clock.
    ///
    /// The window must be covered by a contiguous run of available slots.
    /// Windows need not be grid-aligned, but the slots they touch must all
    /// be bookable, so a 30-minute visit at 10:15 needs both 10:00 and 10:30.
    pub async fn check_bookable_window(
        &self,
        clinic_id: Uuid,
        start: DateTime<Utc>,
        duration_minutes: i32,
    ) -> Result<(), AppointmentError> {
        if duration_minutes <= 0 {
            return Err(AppointmentError::ValidationError(format!(
                "Appointment duration must be positive, got {} minutes",
                duration_minutes
            )));
        }
        if start <= self.clock.now() {
            return Err(AppointmentError::OutOfHours(OutOfHoursReason::InThePast));
        }

        let end = start + Duration::minutes(i64::from(duration_minutes));
        let last_day = (end - Duration::nanoseconds(1)).date_naive();

        let mut cursor = start;
        let mut day = start.date_naive();
        while day <= last_day {
            let slots = self
                .slots
                .generate(clinic_id, day, self.policy.slot_granularity_minutes)
                .await?;
            cursor = cover(slots, cursor, end)?;
            if cursor >= end {
                return Ok(());
            }
            day = day
                .succ_opt()
                .ok_or_else(|| AppointmentError::ValidationError("Date out of range".to_string()))?;
        }

        Err(AppointmentError::OutOfHours(OutOfHoursReason::OutsideOpeningHours))
    }

    /// True iff the window is bookable and no active appointment in scope overlaps it.
    pub async fn is_free(
        &self,
        clinic_id: Uuid,
        staff_id: Option<Uuid>,
        start: DateTime<Utc>,
        duration_minutes: i32,
    ) -> Result<bool, AppointmentError> {
        match self.check_bookable_window(clinic_id, start, duration_minutes).await {
            Ok(()) => {}
            Err(AppointmentError::OutOfHours(reason)) => {
                debug!("Window at {} is not bookable: {}", start, reason);
                return Ok(false);
            }
            Err(e) => return Err(e),
        }

        let end = start + Duration::minutes(i64::from(duration_minutes));
        let conflicts = self
            .ledger
            .active_overlapping(clinic_id, staff_id, start, end, None)
            .await?;
        Ok(conflicts.is_empty())
    }

    /// Calendar view for `from..=to`; slots overlapping an active appointment
    /// in scope of `staff_id` are marked `Booked`.
    pub async fn slots_in_range(
        &self,
        clinic_id: Uuid,
        staff_id: Option<Uuid>,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Slot>, AppointmentError> {
        let days = self.days_in_range(from, to)?;

        let generated = try_join_all(days.iter().map(|&day| {
            self.slots
                .generate(clinic_id, day, self.policy.slot_granularity_minutes)
        }))
        .await?;

        let range_start = at_wall_clock(from, NaiveTime::MIN);
        let range_end = at_wall_clock(to, NaiveTime::MIN) + Duration::days(1);
        let booked = self
            .ledger
            .active_overlapping(clinic_id, staff_id, range_start, range_end, None)
            .await?;

        Ok(generated
            .into_iter()
            .flatten()
            .map(|mut slot| {
                if slot.state == SlotState::Available
                    && booked.iter().any(|a| {
                        windows_overlap(a.scheduled_at, a.scheduled_end_time(), slot.start_at(), slot.end_at())
                    })
                {
                    slot.state = SlotState::Booked;
                }
                slot
            })
            .collect())
    }

    /// Only the slots still open for booking.
    pub async fn free_slots(
        &self,
        clinic_id: Uuid,
        staff_id: Option<Uuid>,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Slot>, AppointmentError> {
        Ok(self
            .slots_in_range(clinic_id, staff_id, from, to)
            .await?
            .into_iter()
            .filter(Slot::is_available)
            .collect())
    }

    fn days_in_range(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<NaiveDate>, AppointmentError> {
        if to < from {
            return Err(AppointmentError::ValidationError(format!(
                "Range end {} is before its start {}",
                to, from
            )));
        }
        let span = (to - from).num_days() + 1;
        if span > self.policy.max_calendar_range_days {
            return Err(AppointmentError::ValidationError(format!(
                "Calendar range is limited to {} days, got {}",
                self.policy.max_calendar_range_days, span
            )));
        }
        Ok(from.iter_days().take(span as usize).collect())
    }
}

/// Walks one day's slots from `cursor` towards `end`.
///
/// Returns the cursor where the covered run stops. A run may only continue
/// into the next day when it reaches midnight.
fn cover(slots: DaySlots, mut cursor: DateTime<Utc>, end: DateTime<Utc>) -> Result<DateTime<Utc>, AppointmentError> {
    if slots.is_closed() {
        return Err(AppointmentError::OutOfHours(OutOfHoursReason::ClosedDay));
    }
    let next_midnight = at_wall_clock(slots.day(), NaiveTime::MIN) + Duration::days(1);

    for slot in slots {
        if slot.end_at() <= cursor {
            continue;
        }
        if slot.start_at() > cursor {
            break;
        }
        match slot.state {
            SlotState::Available | SlotState::Booked => {}
            SlotState::Break => return Err(AppointmentError::OutOfHours(OutOfHoursReason::DuringBreak)),
            SlotState::Past => return Err(AppointmentError::OutOfHours(OutOfHoursReason::InThePast)),
        }
        cursor = slot.end_at();
        if cursor >= end {
            return Ok(cursor);
        }
    }

    if cursor == next_midnight {
        Ok(cursor)
    } else {
        Err(AppointmentError::OutOfHours(OutOfHoursReason::OutsideOpeningHours))
    }
}
