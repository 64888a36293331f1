//! Single source of "now" for the scheduling engine.
//!
//! Clinic days are timezone-naive: the calendar day and wall-clock time of an
//! instant are read straight off its UTC representation.

use std::sync::Mutex;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Timelike, Utc};

pub const MINUTES_PER_DAY: i64 = 24 * 60;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to an instant; moves only when told to.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn at(date: NaiveDate, time: NaiveTime) -> Self {
        Self::new(at_wall_clock(date, time))
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// The instant a wall-clock time falls on for a given clinic day.
pub fn at_wall_clock(date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    date.and_time(time).and_utc()
}

/// Start of the clinic day plus `minutes`; `MINUTES_PER_DAY` is the next midnight.
pub fn at_day_offset(date: NaiveDate, minutes: i64) -> DateTime<Utc> {
    at_wall_clock(date, NaiveTime::MIN) + Duration::minutes(minutes)
}

/// Minutes since midnight, ignoring seconds.
pub fn minutes_of_day(time: NaiveTime) -> i64 {
    i64::from(time.hour()) * 60 + i64::from(time.minute())
}

/// Signed time left until `target`. Negative once `target` has passed.
///
/// Cutoff checks compare this duration directly against the policy window
/// instead of rounding to whole hours.
pub fn time_until(now: DateTime<Utc>, target: DateTime<Utc>) -> Duration {
    target - now
}
