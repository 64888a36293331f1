// libs/appointment-cell/src/policy.rs
use chrono::Duration;

use shared_config::{AppConfig, SchedulingPolicyConfig};

use crate::models::AppointmentError;

/// Business rules for slot discretisation and lifecycle windows.
///
/// Fixed for the lifetime of a service instance and shared by the lifecycle,
/// the availability resolver and the booking service.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyRules {
    pub slot_granularity_minutes: i64,
    pub cancel_reschedule_cutoff_hours: i64,
    pub dispute_window_hours: i64,
    pub default_appointment_duration_minutes: i32,
    /// Attempts at a booking commit before a serialization failure becomes a conflict.
    pub max_commit_attempts: u32,
    pub max_calendar_range_days: i64,
}

impl Default for PolicyRules {
    fn default() -> Self {
        Self {
            slot_granularity_minutes: 30,
            cancel_reschedule_cutoff_hours: 24,
            dispute_window_hours: 48,
            default_appointment_duration_minutes: 30,
            max_commit_attempts: 3,
            max_calendar_range_days: 31,
        }
    }
}

impl PolicyRules {
    pub fn from_config(config: &AppConfig) -> Result<Self, AppointmentError> {
        Self::try_from(&config.policy)
    }

    pub fn validate(&self) -> Result<(), AppointmentError> {
        let checks = [
            ("slot granularity", self.slot_granularity_minutes),
            ("cancellation cutoff", self.cancel_reschedule_cutoff_hours),
            ("dispute window", self.dispute_window_hours),
            ("default duration", i64::from(self.default_appointment_duration_minutes)),
            ("commit attempts", i64::from(self.max_commit_attempts)),
            ("calendar range", self.max_calendar_range_days),
        ];

        for (name, value) in checks {
            if value <= 0 {
                return Err(AppointmentError::ValidationError(format!(
                    "Policy {} must be positive, got {}",
                    name, value
                )));
            }
        }

        if self.slot_granularity_minutes > 24 * 60 {
            return Err(AppointmentError::ValidationError(
                "Policy slot granularity cannot exceed one day".to_string(),
            ));
        }

        Ok(())
    }

    pub fn slot_granularity(&self) -> Duration {
        Duration::minutes(self.slot_granularity_minutes)
    }

    pub fn cancellation_cutoff(&self) -> Duration {
        Duration::hours(self.cancel_reschedule_cutoff_hours)
    }

    pub fn dispute_window(&self) -> Duration {
        Duration::hours(self.dispute_window_hours)
    }

    /// Resolves an optional requested duration against the default.
    pub fn duration_or_default(&self, requested: Option<i32>) -> Result<i32, AppointmentError> {
        let minutes = requested.unwrap_or(self.default_appointment_duration_minutes);
        if minutes <= 0 {
            return Err(AppointmentError::ValidationError(format!(
                "Appointment duration must be positive, got {} minutes",
                minutes
            )));
        }
        Ok(minutes)
    }
}

impl TryFrom<&SchedulingPolicyConfig> for PolicyRules {
    type Error = AppointmentError;

    fn try_from(config: &SchedulingPolicyConfig) -> Result<Self, Self::Error> {
        let rules = Self {
            slot_granularity_minutes: config.slot_granularity_minutes,
            cancel_reschedule_cutoff_hours: config.cancel_reschedule_cutoff_hours,
            dispute_window_hours: config.dispute_window_hours,
            default_appointment_duration_minutes: config.default_appointment_duration_minutes,
            max_commit_attempts: config.max_commit_attempts,
            max_calendar_range_days: config.max_calendar_range_days,
        };
        rules.validate()?;
        Ok(rules)
    }
}
