// libs/appointment-cell/src/services/lifecycle.rs
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use shared_utils::clock::time_until;

use crate::models::{Appointment, AppointmentError, AppointmentStatus, LifecycleEvent};
use crate::policy::PolicyRules;

// `Start` is driven by the clock, never requested.
const REQUESTABLE_EVENTS: [LifecycleEvent; 5] = [
    LifecycleEvent::Confirm,
    LifecycleEvent::Complete,
    LifecycleEvent::Cancel,
    LifecycleEvent::MarkNoShow,
    LifecycleEvent::Reschedule,
];

/// The status state machine plus the time-based lifecycle rules.
#[derive(Debug, Clone)]
pub struct AppointmentLifecycleService {
    policy: PolicyRules,
}

impl AppointmentLifecycleService {
    pub fn new(policy: PolicyRules) -> Self {
        Self { policy }
    }

    /// Where `event` takes an appointment that is `current`.
    pub fn next_status(
        &self,
        current: AppointmentStatus,
        event: LifecycleEvent,
    ) -> Result<AppointmentStatus, AppointmentError> {
        use AppointmentStatus::*;

        let next = match (current, event) {
            (Pending, LifecycleEvent::Confirm) => Some(Confirmed),
            (Confirmed, LifecycleEvent::Start) => Some(InProgress),
            (Confirmed | InProgress, LifecycleEvent::Complete) => Some(Completed),
            (Pending | Confirmed | InProgress, LifecycleEvent::Cancel) => Some(Cancelled),
            (Pending | Confirmed | InProgress, LifecycleEvent::MarkNoShow) => Some(NoShow),
            (Pending | Confirmed, LifecycleEvent::Reschedule) => Some(Pending),
            _ => None,
        };

        next.ok_or_else(|| {
            warn!("Invalid lifecycle event attempted: {} on {}", event, current);
            AppointmentError::InvalidStatusTransition {
                from: current,
                action: event,
            }
        })
    }

    /// Events a caller may request from `current`; empty for terminal statuses.
    pub fn allowed_events(&self, current: AppointmentStatus) -> Vec<LifecycleEvent> {
        REQUESTABLE_EVENTS
            .into_iter()
            .filter(|&event| self.next_status(current, event).is_ok())
            .collect()
    }

    /// A confirmed appointment whose start has passed reads as in progress.
    pub fn effective_status(&self, appointment: &Appointment, now: DateTime<Utc>) -> AppointmentStatus {
        effective_status(appointment, now)
    }

    /// Owner-initiated cancel and reschedule must leave at least the cutoff
    /// before the scheduled start. Exactly the cutoff is still allowed.
    pub fn check_owner_change_window(
        &self,
        appointment: &Appointment,
        now: DateTime<Utc>,
    ) -> Result<(), AppointmentError> {
        let remaining = time_until(now, appointment.scheduled_at);
        if remaining < self.policy.cancellation_cutoff() {
            debug!(
                "Appointment {} starts in {} minutes, inside the {}h cutoff",
                appointment.id,
                remaining.num_minutes(),
                self.policy.cancel_reschedule_cutoff_hours
            );
            return Err(AppointmentError::CancellationWindow {
                cutoff_hours: self.policy.cancel_reschedule_cutoff_hours,
            });
        }
        Ok(())
    }

    /// A completed, undisputed appointment can be disputed until
    /// `scheduled_at + dispute window`, inclusive.
    pub fn check_dispute(
        &self,
        appointment: &Appointment,
        status: AppointmentStatus,
        now: DateTime<Utc>,
    ) -> Result<(), AppointmentError> {
        if status != AppointmentStatus::Completed {
            return Err(AppointmentError::NotDisputable(status));
        }
        if appointment.is_disputed {
            return Err(AppointmentError::AlreadyDisputed);
        }
        if now > appointment.scheduled_at + self.policy.dispute_window() {
            return Err(AppointmentError::DisputeWindowExpired {
                window_hours: self.policy.dispute_window_hours,
            });
        }
        Ok(())
    }
}

pub fn effective_status(appointment: &Appointment, now: DateTime<Utc>) -> AppointmentStatus {
    match appointment.status {
        AppointmentStatus::Confirmed if now >= appointment.scheduled_at => AppointmentStatus::InProgress,
        status => status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    fn lifecycle() -> AppointmentLifecycleService {
        AppointmentLifecycleService::new(PolicyRules::default())
    }

    fn appointment(status: AppointmentStatus, scheduled_at: DateTime<Utc>) -> Appointment {
        Appointment {
            id: Uuid::new_v4(),
            clinic_id: Uuid::new_v4(),
            staff_id: None,
            owner_id: Uuid::new_v4(),
            subject_id: Uuid::new_v4(),
            scheduled_at,
            duration_minutes: 30,
            status,
            created_at: scheduled_at - Duration::days(7),
            updated_at: scheduled_at - Duration::days(7),
            is_disputed: false,
            dispute_reason: None,
            disputed_at: None,
            actual_cost: None,
            cancellation_reason: None,
            cancelled_by: None,
            reschedule_count: 0,
        }
    }

    fn ten_am() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 3, 4, 10, 0, 0).unwrap()
    }

    #[test]
    fn terminal_statuses_accept_no_events() {
        let lifecycle = lifecycle();
        for status in [
            AppointmentStatus::Completed,
            AppointmentStatus::Cancelled,
            AppointmentStatus::NoShow,
        ] {
            assert!(lifecycle.allowed_events(status).is_empty());
        }
    }

    #[test]
    fn allowed_events_follow_the_table() {
        let lifecycle = lifecycle();
        assert_eq!(
            lifecycle.allowed_events(AppointmentStatus::Pending),
            vec![
                LifecycleEvent::Confirm,
                LifecycleEvent::Cancel,
                LifecycleEvent::MarkNoShow,
                LifecycleEvent::Reschedule,
            ]
        );
        assert_eq!(
            lifecycle.allowed_events(AppointmentStatus::InProgress),
            vec![
                LifecycleEvent::Complete,
                LifecycleEvent::Cancel,
                LifecycleEvent::MarkNoShow,
            ]
        );
    }

    #[test]
    fn transition_table() {
        let lifecycle = lifecycle();
        assert_eq!(
            lifecycle.next_status(AppointmentStatus::Pending, LifecycleEvent::Confirm).unwrap(),
            AppointmentStatus::Confirmed
        );
        assert_eq!(
            lifecycle.next_status(AppointmentStatus::Confirmed, LifecycleEvent::Reschedule).unwrap(),
            AppointmentStatus::Pending
        );
        assert_eq!(
            lifecycle.next_status(AppointmentStatus::InProgress, LifecycleEvent::MarkNoShow).unwrap(),
            AppointmentStatus::NoShow
        );
        assert!(lifecycle
            .next_status(AppointmentStatus::Pending, LifecycleEvent::Complete)
            .is_err());
        assert!(lifecycle
            .next_status(AppointmentStatus::InProgress, LifecycleEvent::Reschedule)
            .is_err());
        assert!(lifecycle
            .next_status(AppointmentStatus::Confirmed, LifecycleEvent::Confirm)
            .is_err());
    }

    #[test]
    fn confirmed_reads_in_progress_from_start() {
        let appt = appointment(AppointmentStatus::Confirmed, ten_am());
        assert_eq!(
            effective_status(&appt, ten_am() - Duration::seconds(1)),
            AppointmentStatus::Confirmed
        );
        assert_eq!(effective_status(&appt, ten_am()), AppointmentStatus::InProgress);

        let pending = appointment(AppointmentStatus::Pending, ten_am());
        assert_eq!(
            effective_status(&pending, ten_am() + Duration::hours(1)),
            AppointmentStatus::Pending
        );
    }

    #[test]
    fn owner_cutoff_boundary_is_inclusive_of_exactly_24_hours() {
        let lifecycle = lifecycle();
        let appt = appointment(AppointmentStatus::Confirmed, ten_am());

        assert!(lifecycle
            .check_owner_change_window(&appt, ten_am() - Duration::hours(24))
            .is_ok());
        assert_eq!(
            lifecycle.check_owner_change_window(&appt, ten_am() - Duration::hours(24) + Duration::minutes(1)),
            Err(AppointmentError::CancellationWindow { cutoff_hours: 24 })
        );
    }

    #[test]
    fn dispute_window_closes_after_48_hours() {
        let lifecycle = lifecycle();
        let appt = appointment(AppointmentStatus::Completed, ten_am());
        let deadline = ten_am() + Duration::hours(48);

        assert!(lifecycle
            .check_dispute(&appt, AppointmentStatus::Completed, deadline)
            .is_ok());
        assert_eq!(
            lifecycle.check_dispute(&appt, AppointmentStatus::Completed, deadline + Duration::seconds(1)),
            Err(AppointmentError::DisputeWindowExpired { window_hours: 48 })
        );
    }

    #[test]
    fn dispute_requires_completed_and_undisputed() {
        let lifecycle = lifecycle();
        let mut appt = appointment(AppointmentStatus::Completed, ten_am());

        assert_eq!(
            lifecycle.check_dispute(&appt, AppointmentStatus::NoShow, ten_am()),
            Err(AppointmentError::NotDisputable(AppointmentStatus::NoShow))
        );

        appt.is_disputed = true;
        assert_eq!(
            lifecycle.check_dispute(&appt, AppointmentStatus::Completed, ten_am()),
            Err(AppointmentError::AlreadyDisputed)
        );
    }
}
