// libs/appointment-cell/src/models.rs
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use clinic_cell::models::ClinicError;
use shared_utils::clock::at_wall_clock;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: Uuid,
    pub clinic_id: Uuid,
    pub staff_id: Option<Uuid>,
    pub owner_id: Uuid,
    /// The pet being seen.
    pub subject_id: Uuid,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: i32,
    pub status: AppointmentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_disputed: bool,
    pub dispute_reason: Option<String>,
    pub disputed_at: Option<DateTime<Utc>>,
    pub actual_cost: Option<f64>,
    pub cancellation_reason: Option<String>,
    pub cancelled_by: Option<CancelledBy>,
    #[serde(default)]
    pub reschedule_count: i32,
}

impl Appointment {
    /// Calculate the scheduled end time based on scheduled_at and duration
    pub fn scheduled_end_time(&self) -> DateTime<Utc> {
        self.scheduled_at + Duration::minutes(self.duration_minutes as i64)
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    /// Pending, confirmed and in-progress appointments occupy their slot.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Pending | AppointmentStatus::Confirmed | AppointmentStatus::InProgress
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::InProgress => "in_progress",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::NoShow => "no_show",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppointmentStatus {
    type Err = AppointmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AppointmentStatus::Pending),
            "confirmed" => Ok(AppointmentStatus::Confirmed),
            "in_progress" => Ok(AppointmentStatus::InProgress),
            "completed" => Ok(AppointmentStatus::Completed),
            "cancelled" => Ok(AppointmentStatus::Cancelled),
            "no_show" => Ok(AppointmentStatus::NoShow),
            other => Err(AppointmentError::ValidationError(format!(
                "Unknown appointment status: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CancelledBy {
    Owner,
    Clinic,
    Admin,
}

impl CancelledBy {
    /// Only owners are held to the cancellation cutoff.
    pub fn is_subject_to_cutoff(&self) -> bool {
        matches!(self, CancelledBy::Owner)
    }
}

// ==============================================================================
// SLOT MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SlotState {
    Available,
    Booked,
    Break,
    Past,
}

/// A candidate window of a clinic day. Derived on every query, never stored.
///
/// `end` wraps to `00:00` for the last slot of a clinic open until midnight;
/// use `end_at` for arithmetic.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Slot {
    pub day: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub state: SlotState,
}

impl Slot {
    /// Builds a slot from minute offsets since the start of `day`.
    pub fn from_offsets(day: NaiveDate, start_minutes: i64, end_minutes: i64, state: SlotState) -> Self {
        let time_at = |offset: i64| {
            NaiveTime::MIN
                .overflowing_add_signed(Duration::minutes(offset))
                .0
        };
        Self {
            day,
            start: time_at(start_minutes),
            end: time_at(end_minutes),
            state,
        }
    }

    pub fn start_at(&self) -> DateTime<Utc> {
        at_wall_clock(self.day, self.start)
    }

    pub fn end_at(&self) -> DateTime<Utc> {
        let end = at_wall_clock(self.day, self.end);
        if self.end > self.start {
            end
        } else {
            end + Duration::days(1)
        }
    }

    pub fn is_available(&self) -> bool {
        self.state == SlotState::Available
    }
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    pub clinic_id: Uuid,
    pub staff_id: Option<Uuid>,
    pub owner_id: Uuid,
    pub subject_id: Uuid,
    pub scheduled_at: DateTime<Utc>,
    /// Policy default when absent.
    pub duration_minutes: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleAppointmentRequest {
    pub new_scheduled_at: DateTime<Utc>,
    #[serde(default)]
    pub initiated_by_owner: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelAppointmentRequest {
    pub cancelled_by: CancelledBy,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompleteAppointmentRequest {
    pub actual_cost: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisputeAppointmentRequest {
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotQuery {
    pub from: NaiveDate,
    pub to: Option<NaiveDate>,
    pub staff_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityQuery {
    pub start: DateTime<Utc>,
    pub duration_minutes: Option<i32>,
    pub staff_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentRangeQuery {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

/// Why a requested window cannot be booked against the clinic's hours.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutOfHoursReason {
    ClosedDay,
    OutsideOpeningHours,
    DuringBreak,
    InThePast,
}

impl fmt::Display for OutOfHoursReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            OutOfHoursReason::ClosedDay => "the clinic is closed on that day",
            OutOfHoursReason::OutsideOpeningHours => "the time is outside the clinic's opening hours",
            OutOfHoursReason::DuringBreak => "the time overlaps the clinic's break",
            OutOfHoursReason::InThePast => "the time has already passed",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, thiserror::Error)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Invalid operating hours: {0}")]
    InvalidHours(String),

    #[error("This time cannot be booked: {0}")]
    OutOfHours(OutOfHoursReason),

    #[error("This slot is no longer available")]
    ConflictDetected,

    #[error("Appointments can only be cancelled or rescheduled at least {cutoff_hours} hours in advance. Please contact the clinic directly.")]
    CancellationWindow { cutoff_hours: i64 },

    #[error("The {window_hours}-hour dispute window for this appointment has closed")]
    DisputeWindowExpired { window_hours: i64 },

    #[error("This appointment has already been disputed")]
    AlreadyDisputed,

    #[error("Only completed appointments can be disputed (current status: {0})")]
    NotDisputable(AppointmentStatus),

    #[error("Cannot {action} an appointment that is {from}")]
    InvalidStatusTransition {
        from: AppointmentStatus,
        action: LifecycleEvent,
    },

    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Storage lost a serialization race; the commit may be retried.
    #[error("Booking commit could not be serialized")]
    SerializationFailure,

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<ClinicError> for AppointmentError {
    fn from(err: ClinicError) -> Self {
        match err {
            ClinicError::InvalidHours(msg) => AppointmentError::InvalidHours(msg),
            ClinicError::DatabaseError(msg) => AppointmentError::DatabaseError(msg),
        }
    }
}

/// Actions that move an appointment along its lifecycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEvent {
    Confirm,
    Start,
    Complete,
    Cancel,
    MarkNoShow,
    Reschedule,
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self {
            LifecycleEvent::Confirm => "confirm",
            LifecycleEvent::Start => "start",
            LifecycleEvent::Complete => "complete",
            LifecycleEvent::Cancel => "cancel",
            LifecycleEvent::MarkNoShow => "mark as no-show",
            LifecycleEvent::Reschedule => "reschedule",
        };
        f.write_str(verb)
    }
}
