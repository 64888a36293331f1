// libs/appointment-cell/src/services/booking.rs
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use clinic_cell::services::OperatingHoursStore;
use shared_utils::clock::Clock;

use crate::models::{
    Appointment, AppointmentError, AppointmentStatus, BookAppointmentRequest, CancelledBy,
    LifecycleEvent, Slot,
};
use crate::policy::PolicyRules;
use crate::services::availability::AvailabilityResolver;
use crate::services::ledger::BookingLedger;
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::notifications::{AppointmentEvent, NotificationSink};
use crate::services::slots::SlotGenerator;

/// Front door of the scheduling engine: availability, booking and every
/// lifecycle action, all scoped by clinic.
pub struct AppointmentBookingService {
    ledger: Arc<dyn BookingLedger>,
    availability: AvailabilityResolver,
    lifecycle: AppointmentLifecycleService,
    notifications: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    policy: PolicyRules,
}

impl AppointmentBookingService {
    pub fn new(
        hours: Arc<dyn OperatingHoursStore>,
        ledger: Arc<dyn BookingLedger>,
        clock: Arc<dyn Clock>,
        notifications: Arc<dyn NotificationSink>,
        policy: PolicyRules,
    ) -> Self {
        let slots = SlotGenerator::new(hours, Arc::clone(&clock));
        let availability = AvailabilityResolver::new(
            slots,
            Arc::clone(&ledger),
            Arc::clone(&clock),
            policy.clone(),
        );

        Self {
            ledger,
            availability,
            lifecycle: AppointmentLifecycleService::new(policy.clone()),
            notifications,
            clock,
            policy,
        }
    }

    pub fn policy(&self) -> &PolicyRules {
        &self.policy
    }

    // ==========================================================================
    // AVAILABILITY
    // ==========================================================================

    /// Every slot of `from..=to` with its state for `staff_id`'s scope.
    pub async fn get_available_slots(
        &self,
        clinic_id: Uuid,
        staff_id: Option<Uuid>,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Slot>, AppointmentError> {
        self.availability.slots_in_range(clinic_id, staff_id, from, to).await
    }

    pub async fn free_slots(
        &self,
        clinic_id: Uuid,
        staff_id: Option<Uuid>,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Slot>, AppointmentError> {
        self.availability.free_slots(clinic_id, staff_id, from, to).await
    }

    pub async fn is_free(
        &self,
        clinic_id: Uuid,
        staff_id: Option<Uuid>,
        start: DateTime<Utc>,
        duration_minutes: Option<i32>,
    ) -> Result<bool, AppointmentError> {
        let duration = self.policy.duration_or_default(duration_minutes)?;
        self.availability.is_free(clinic_id, staff_id, start, duration).await
    }

    // ==========================================================================
    // BOOKING
    // ==========================================================================

    #[instrument(skip(self, request), fields(clinic_id = %request.clinic_id, scheduled_at = %request.scheduled_at))]
    pub async fn book(&self, request: BookAppointmentRequest) -> Result<Appointment, AppointmentError> {
        let duration = self.policy.duration_or_default(request.duration_minutes)?;
        let now = self.clock.now();

        self.availability
            .check_bookable_window(request.clinic_id, request.scheduled_at, duration)
            .await?;

        let appointment = Appointment {
            id: Uuid::new_v4(),
            clinic_id: request.clinic_id,
            staff_id: request.staff_id,
            owner_id: request.owner_id,
            subject_id: request.subject_id,
            scheduled_at: request.scheduled_at,
            duration_minutes: duration,
            status: AppointmentStatus::Pending,
            created_at: now,
            updated_at: now,
            is_disputed: false,
            dispute_reason: None,
            disputed_at: None,
            actual_cost: None,
            cancellation_reason: None,
            cancelled_by: None,
            reschedule_count: 0,
        };

        let booked = self
            .commit_with_retry(|| self.ledger.insert_if_free(appointment.clone()))
            .await?;

        info!("Booked appointment {} for clinic {}", booked.id, booked.clinic_id);
        self.notifications.notify(AppointmentEvent::Booked, &booked).await;
        Ok(booked)
    }

    #[instrument(skip(self))]
    pub async fn reschedule(
        &self,
        clinic_id: Uuid,
        appointment_id: Uuid,
        new_scheduled_at: DateTime<Utc>,
        initiated_by_owner: bool,
    ) -> Result<Appointment, AppointmentError> {
        let current = self.load_effective(clinic_id, appointment_id).await?;
        let next = self
            .lifecycle
            .next_status(current.status, LifecycleEvent::Reschedule)?;

        let now = self.clock.now();
        if initiated_by_owner {
            self.lifecycle.check_owner_change_window(&current, now)?;
        }
        self.availability
            .check_bookable_window(clinic_id, new_scheduled_at, current.duration_minutes)
            .await?;

        let updated = Appointment {
            scheduled_at: new_scheduled_at,
            status: next,
            reschedule_count: current.reschedule_count + 1,
            updated_at: now,
            ..current.clone()
        };

        let expected = current.status;
        let written = self
            .commit_with_retry(|| self.ledger.reschedule_if_free(updated.clone(), expected))
            .await?;
        let rescheduled = self
            .written_or_stale(written, clinic_id, appointment_id, LifecycleEvent::Reschedule)
            .await?;

        info!(
            "Rescheduled appointment {} from {} to {}",
            appointment_id, current.scheduled_at, rescheduled.scheduled_at
        );
        self.notifications
            .notify(AppointmentEvent::Rescheduled, &rescheduled)
            .await;
        Ok(rescheduled)
    }

    /// Retries a commit that lost a serialization race. Once the attempts run
    /// out the caller sees a plain conflict.
    async fn commit_with_retry<T, F, Fut>(&self, mut commit: F) -> Result<T, AppointmentError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AppointmentError>>,
    {
        let max_attempts = self.policy.max_commit_attempts.max(1);
        for attempt in 1..=max_attempts {
            match commit().await {
                Err(AppointmentError::SerializationFailure) if attempt < max_attempts => {
                    warn!(
                        "Booking commit not serializable, retrying attempt {}/{}",
                        attempt, max_attempts
                    );
                    tokio::time::sleep(tokio::time::Duration::from_millis(100 * attempt as u64)).await;
                }
                Err(AppointmentError::SerializationFailure) => {
                    warn!("Booking commit failed after {} attempts", max_attempts);
                    return Err(AppointmentError::ConflictDetected);
                }
                other => return other,
            }
        }
        Err(AppointmentError::ConflictDetected)
    }

    // ==========================================================================
    // LIFECYCLE
    // ==========================================================================

    pub async fn confirm(&self, clinic_id: Uuid, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        let current = self.load_effective(clinic_id, appointment_id).await?;
        let next = self.lifecycle.next_status(current.status, LifecycleEvent::Confirm)?;

        let confirmed = self.store_status(current, next, LifecycleEvent::Confirm).await?;
        self.notifications.notify(AppointmentEvent::Confirmed, &confirmed).await;
        Ok(confirmed)
    }

    pub async fn complete(
        &self,
        clinic_id: Uuid,
        appointment_id: Uuid,
        actual_cost: Option<f64>,
    ) -> Result<Appointment, AppointmentError> {
        if let Some(cost) = actual_cost {
            if !cost.is_finite() || cost < 0.0 {
                return Err(AppointmentError::ValidationError(format!(
                    "Actual cost must be a non-negative amount, got {}",
                    cost
                )));
            }
        }

        let mut current = self.load_effective(clinic_id, appointment_id).await?;
        let next = self.lifecycle.next_status(current.status, LifecycleEvent::Complete)?;
        if actual_cost.is_some() {
            current.actual_cost = actual_cost;
        }

        let completed = self.store_status(current, next, LifecycleEvent::Complete).await?;
        self.notifications.notify(AppointmentEvent::Completed, &completed).await;
        Ok(completed)
    }

    pub async fn mark_no_show(&self, clinic_id: Uuid, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        let current = self.load_effective(clinic_id, appointment_id).await?;
        let next = self.lifecycle.next_status(current.status, LifecycleEvent::MarkNoShow)?;

        let no_show = self.store_status(current, next, LifecycleEvent::MarkNoShow).await?;
        self.notifications.notify(AppointmentEvent::NoShow, &no_show).await;
        Ok(no_show)
    }

    #[instrument(skip(self, reason))]
    pub async fn cancel(
        &self,
        clinic_id: Uuid,
        appointment_id: Uuid,
        cancelled_by: CancelledBy,
        reason: Option<String>,
    ) -> Result<Appointment, AppointmentError> {
        let mut current = self.load_effective(clinic_id, appointment_id).await?;
        let next = self.lifecycle.next_status(current.status, LifecycleEvent::Cancel)?;

        if cancelled_by.is_subject_to_cutoff() {
            self.lifecycle
                .check_owner_change_window(&current, self.clock.now())?;
        }
        current.cancelled_by = Some(cancelled_by);
        current.cancellation_reason = reason;

        let cancelled = self.store_status(current, next, LifecycleEvent::Cancel).await?;
        info!("Appointment {} cancelled by {:?}", appointment_id, cancelled_by);
        self.notifications.notify(AppointmentEvent::Cancelled, &cancelled).await;
        Ok(cancelled)
    }

    pub async fn cancel_by_owner(
        &self,
        clinic_id: Uuid,
        appointment_id: Uuid,
        reason: Option<String>,
    ) -> Result<Appointment, AppointmentError> {
        self.cancel(clinic_id, appointment_id, CancelledBy::Owner, reason).await
    }

    pub async fn cancel_by_clinic(
        &self,
        clinic_id: Uuid,
        appointment_id: Uuid,
        reason: Option<String>,
    ) -> Result<Appointment, AppointmentError> {
        self.cancel(clinic_id, appointment_id, CancelledBy::Clinic, reason).await
    }

    pub async fn cancel_by_admin(
        &self,
        clinic_id: Uuid,
        appointment_id: Uuid,
        reason: Option<String>,
    ) -> Result<Appointment, AppointmentError> {
        self.cancel(clinic_id, appointment_id, CancelledBy::Admin, reason).await
    }

    pub async fn dispute(
        &self,
        clinic_id: Uuid,
        appointment_id: Uuid,
        reason: String,
    ) -> Result<Appointment, AppointmentError> {
        let reason = reason.trim().to_string();
        if reason.is_empty() {
            return Err(AppointmentError::ValidationError(
                "A dispute needs a reason".to_string(),
            ));
        }

        let mut current = self.load_effective(clinic_id, appointment_id).await?;
        let now = self.clock.now();
        self.lifecycle.check_dispute(&current, current.status, now)?;

        current.is_disputed = true;
        current.dispute_reason = Some(reason);
        current.disputed_at = Some(now);
        current.updated_at = now;

        let disputed = match self.ledger.update(current, AppointmentStatus::Completed).await? {
            Some(disputed) => disputed,
            None => {
                let stored = self
                    .ledger
                    .get(clinic_id, appointment_id)
                    .await?
                    .ok_or(AppointmentError::NotFound)?;
                return Err(AppointmentError::NotDisputable(stored.status));
            }
        };
        info!("Appointment {} disputed", appointment_id);
        self.notifications.notify(AppointmentEvent::Disputed, &disputed).await;
        Ok(disputed)
    }

    // ==========================================================================
    // READS
    // ==========================================================================

    pub async fn get_appointment(&self, clinic_id: Uuid, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.load_effective(clinic_id, appointment_id).await
    }

    pub async fn effective_status(
        &self,
        clinic_id: Uuid,
        appointment_id: Uuid,
    ) -> Result<AppointmentStatus, AppointmentError> {
        Ok(self.load_effective(clinic_id, appointment_id).await?.status)
    }

    /// Effective status and the events a caller may still request.
    pub async fn status_with_actions(
        &self,
        clinic_id: Uuid,
        appointment_id: Uuid,
    ) -> Result<(AppointmentStatus, Vec<LifecycleEvent>), AppointmentError> {
        let status = self.load_effective(clinic_id, appointment_id).await?.status;
        Ok((status, self.lifecycle.allowed_events(status)))
    }

    /// Appointments overlapping `[from, to)`, each with its effective status.
    pub async fn list_appointments(
        &self,
        clinic_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        if to <= from {
            return Err(AppointmentError::ValidationError(
                "Range end must be after its start".to_string(),
            ));
        }

        let mut appointments = self.ledger.list(clinic_id, from, to).await?;
        let now = self.clock.now();
        for appointment in appointments.iter_mut() {
            let effective = self.lifecycle.effective_status(appointment, now);
            if effective != appointment.status {
                let stored = match self.persist_lazy_transition(appointment, effective, now).await? {
                    Some(stored) => Some(stored),
                    None => self.ledger.get(clinic_id, appointment.id).await?,
                };
                if let Some(stored) = stored {
                    *appointment = stored;
                }
            }
        }
        Ok(appointments)
    }

    /// Loads an appointment and applies the time-driven transition, writing
    /// it back at most once.
    async fn load_effective(&self, clinic_id: Uuid, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        let appointment = self
            .ledger
            .get(clinic_id, appointment_id)
            .await?
            .ok_or(AppointmentError::NotFound)?;

        let now = self.clock.now();
        let effective = self.lifecycle.effective_status(&appointment, now);
        if effective == appointment.status {
            return Ok(appointment);
        }

        match self.persist_lazy_transition(&appointment, effective, now).await? {
            Some(stored) => Ok(stored),
            None => self
                .ledger
                .get(clinic_id, appointment_id)
                .await?
                .ok_or(AppointmentError::NotFound),
        }
    }

    async fn persist_lazy_transition(
        &self,
        appointment: &Appointment,
        effective: AppointmentStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<Appointment>, AppointmentError> {
        debug!(
            "Appointment {} started at {}, moving {} -> {}",
            appointment.id, appointment.scheduled_at, appointment.status, effective
        );
        self.ledger
            .transition_status(appointment.clinic_id, appointment.id, appointment.status, effective, now)
            .await
    }

    /// Writes `next` only if the stored status is still the one `action` was
    /// validated against.
    async fn store_status(
        &self,
        mut appointment: Appointment,
        next: AppointmentStatus,
        action: LifecycleEvent,
    ) -> Result<Appointment, AppointmentError> {
        let (clinic_id, appointment_id, expected) = (appointment.clinic_id, appointment.id, appointment.status);
        appointment.status = next;
        appointment.updated_at = self.clock.now();

        let written = self.ledger.update(appointment, expected).await?;
        self.written_or_stale(written, clinic_id, appointment_id, action).await
    }

    async fn written_or_stale(
        &self,
        written: Option<Appointment>,
        clinic_id: Uuid,
        appointment_id: Uuid,
        action: LifecycleEvent,
    ) -> Result<Appointment, AppointmentError> {
        if let Some(appointment) = written {
            return Ok(appointment);
        }

        let stored = self
            .ledger
            .get(clinic_id, appointment_id)
            .await?
            .ok_or(AppointmentError::NotFound)?;
        warn!(
            "Appointment {} became {} before the {} was written",
            appointment_id, stored.status, action
        );
        Err(AppointmentError::InvalidStatusTransition {
            from: stored.status,
            action,
        })
    }
}
