// libs/clinic-cell/src/models.rs
use chrono::{NaiveTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};

use shared_utils::clock::{minutes_of_day, MINUTES_PER_DAY};

/// Monday-first order used for every weekly listing.
pub const WEEK: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

// ==============================================================================
// OPERATING HOURS
// ==============================================================================

/// Declared hours for one weekday of one clinic.
///
/// Times are wall-clock. On an open day a `closing_time` (or `break_end`) of
/// `00:00` means midnight at the end of the day, so `00:00`–`00:00` declares a
/// clinic that never closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatingHours {
    pub is_closed: bool,
    pub opening_time: Option<NaiveTime>,
    pub closing_time: Option<NaiveTime>,
    pub break_start: Option<NaiveTime>,
    pub break_end: Option<NaiveTime>,
}

impl OperatingHours {
    pub fn closed() -> Self {
        Self {
            is_closed: true,
            opening_time: None,
            closing_time: None,
            break_start: None,
            break_end: None,
        }
    }

    pub fn open(opening_time: NaiveTime, closing_time: NaiveTime) -> Self {
        Self {
            is_closed: false,
            opening_time: Some(opening_time),
            closing_time: Some(closing_time),
            break_start: None,
            break_end: None,
        }
    }

    pub fn around_the_clock() -> Self {
        Self::open(NaiveTime::MIN, NaiveTime::MIN)
    }

    pub fn with_break(mut self, break_start: NaiveTime, break_end: NaiveTime) -> Self {
        self.break_start = Some(break_start);
        self.break_end = Some(break_end);
        self
    }

    /// `[opening, closing)` in minutes since midnight; `None` on a closed day.
    pub fn open_window(&self) -> Option<(i64, i64)> {
        if self.is_closed {
            return None;
        }
        match (self.opening_time, self.closing_time) {
            (Some(open), Some(close)) => Some((minutes_of_day(open), end_minutes(close))),
            _ => None,
        }
    }

    /// `[break_start, break_end)` in minutes since midnight.
    pub fn break_window(&self) -> Option<(i64, i64)> {
        match (self.break_start, self.break_end) {
            (Some(start), Some(end)) if !self.is_closed => {
                Some((minutes_of_day(start), end_minutes(end)))
            }
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<(), ClinicError> {
        if self.is_closed {
            if self.opening_time.is_some()
                || self.closing_time.is_some()
                || self.break_start.is_some()
                || self.break_end.is_some()
            {
                return Err(ClinicError::InvalidHours(
                    "A closed day cannot declare opening, closing or break times".to_string(),
                ));
            }
            return Ok(());
        }

        let (opening, closing) = match (self.opening_time, self.closing_time) {
            (Some(opening), Some(closing)) => (opening, closing),
            _ => {
                return Err(ClinicError::InvalidHours(
                    "An open day needs both an opening and a closing time".to_string(),
                ))
            }
        };

        for time in [Some(opening), Some(closing), self.break_start, self.break_end]
            .into_iter()
            .flatten()
        {
            if time.second() != 0 || time.nanosecond() != 0 {
                return Err(ClinicError::InvalidHours(format!(
                    "Times must be whole minutes, got {}",
                    time
                )));
            }
        }

        let (open_min, close_min) = (minutes_of_day(opening), end_minutes(closing));
        if open_min >= close_min {
            return Err(ClinicError::InvalidHours(format!(
                "Opening time {} must be before closing time {}",
                opening.format("%H:%M"),
                closing.format("%H:%M")
            )));
        }

        match (self.break_start, self.break_end) {
            (None, None) => Ok(()),
            (Some(start), Some(end)) => {
                let (start_min, end_min) = (minutes_of_day(start), end_minutes(end));
                if start_min >= end_min {
                    return Err(ClinicError::InvalidHours(format!(
                        "Break start {} must be before break end {}",
                        start.format("%H:%M"),
                        end.format("%H:%M")
                    )));
                }
                if start_min < open_min || end_min > close_min {
                    return Err(ClinicError::InvalidHours(
                        "Break must lie within opening hours".to_string(),
                    ));
                }
                Ok(())
            }
            _ => Err(ClinicError::InvalidHours(
                "Break needs both a start and an end time".to_string(),
            )),
        }
    }
}

fn end_minutes(time: NaiveTime) -> i64 {
    if time == NaiveTime::MIN {
        MINUTES_PER_DAY
    } else {
        minutes_of_day(time)
    }
}

/// Hours for a single weekday, as listed and seeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayHours {
    pub weekday: Weekday,
    #[serde(flatten)]
    pub hours: OperatingHours,
}

/// Onboarding template: weekdays 08:00-17:00 with a 12:00-13:00 lunch break,
/// Saturday mornings, closed on Sunday.
pub fn default_week() -> Vec<DayHours> {
    let time = |h: u32| NaiveTime::from_hms_opt(h, 0, 0).unwrap_or(NaiveTime::MIN);
    let weekday_hours = OperatingHours::open(time(8), time(17)).with_break(time(12), time(13));

    WEEK.iter()
        .map(|&weekday| {
            let hours = match weekday {
                Weekday::Sat => OperatingHours::open(time(9), time(13)),
                Weekday::Sun => OperatingHours::closed(),
                _ => weekday_hours,
            };
            DayHours { weekday, hours }
        })
        .collect()
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeedHoursRequest {
    /// Registration-provided hours; the default template when absent.
    pub days: Option<Vec<DayHours>>,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum ClinicError {
    #[error("Invalid operating hours: {0}")]
    InvalidHours(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}
