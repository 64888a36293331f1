// libs/appointment-cell/src/services/ledger.rs
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{Appointment, AppointmentError, AppointmentStatus};

/// Half-open interval overlap: `[s1, e1)` and `[s2, e2)` conflict iff
/// `s1 < e2 && s2 < e1`. Back-to-back windows do not conflict.
pub fn windows_overlap(
    s1: DateTime<Utc>,
    e1: DateTime<Utc>,
    s2: DateTime<Utc>,
    e2: DateTime<Utc>,
) -> bool {
    s1 < e2 && s2 < e1
}

/// A staff-less booking occupies the whole clinic; two staff-assigned
/// bookings only compete when they share the staff member.
pub fn scopes_overlap(a: Option<Uuid>, b: Option<Uuid>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a == b,
        _ => true,
    }
}

/// True when `appointment` blocks `[start, end)` for `staff_id`.
pub fn blocks_window(
    appointment: &Appointment,
    staff_id: Option<Uuid>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    exclude_appointment_id: Option<Uuid>,
) -> bool {
    Some(appointment.id) != exclude_appointment_id
        && appointment.is_active()
        && scopes_overlap(appointment.staff_id, staff_id)
        && windows_overlap(appointment.scheduled_at, appointment.scheduled_end_time(), start, end)
}

/// Authoritative appointment store used for conflict checks.
///
/// Every method is scoped by clinic. `insert_if_free` and
/// `reschedule_if_free` run the overlap check and the write as one atomic
/// step per `(clinic, staff-or-none)`. Writes to an existing appointment are
/// conditional on the status the caller validated against; `Ok(None)` means
/// the stored record is missing or has moved on.
#[async_trait]
pub trait BookingLedger: Send + Sync {
    async fn get(&self, clinic_id: Uuid, appointment_id: Uuid) -> Result<Option<Appointment>, AppointmentError>;

    /// Appointments of any status whose window overlaps `[from, to)`, by start time.
    async fn list(
        &self,
        clinic_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, AppointmentError>;

    /// Active appointments in scope of `staff_id` overlapping `[start, end)`.
    async fn active_overlapping(
        &self,
        clinic_id: Uuid,
        staff_id: Option<Uuid>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude_appointment_id: Option<Uuid>,
    ) -> Result<Vec<Appointment>, AppointmentError>;

    /// Inserts a new appointment unless an active one in scope overlaps it.
    async fn insert_if_free(&self, appointment: Appointment) -> Result<Appointment, AppointmentError>;

    /// Replaces the stored record with `appointment` (same id, new time)
    /// unless another active appointment in scope overlaps the new window.
    async fn reschedule_if_free(
        &self,
        appointment: Appointment,
        expected: AppointmentStatus,
    ) -> Result<Option<Appointment>, AppointmentError>;

    /// Writes status, dispute and cancellation fields. The time window is immutable here.
    async fn update(
        &self,
        appointment: Appointment,
        expected: AppointmentStatus,
    ) -> Result<Option<Appointment>, AppointmentError>;

    /// Compare-and-set on status. `Ok(None)` when the stored status was not `expected`.
    async fn transition_status(
        &self,
        clinic_id: Uuid,
        appointment_id: Uuid,
        expected: AppointmentStatus,
        next: AppointmentStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Appointment>, AppointmentError>;
}

// ==============================================================================
// COMMIT LOCKS
// ==============================================================================

#[derive(Default)]
struct ClinicLocks {
    clinic: Arc<RwLock<()>>,
    staff: Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
}

enum ScopeGuard {
    /// Staff-less commit: the whole clinic.
    Clinic(OwnedRwLockWriteGuard<()>),
    /// Staff commit: clinic shared, staff member exclusive.
    Staff(OwnedRwLockReadGuard<()>, OwnedMutexGuard<()>),
}

#[derive(Default)]
struct CommitLocks {
    clinics: Mutex<HashMap<Uuid, Arc<ClinicLocks>>>,
}

impl CommitLocks {
    fn clinic(&self, clinic_id: Uuid) -> Arc<ClinicLocks> {
        let mut clinics = self.clinics.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(clinics.entry(clinic_id).or_default())
    }

    async fn acquire(&self, clinic_id: Uuid, staff_id: Option<Uuid>) -> ScopeGuard {
        let locks = self.clinic(clinic_id);
        match staff_id {
            None => ScopeGuard::Clinic(Arc::clone(&locks.clinic).write_owned().await),
            Some(staff_id) => {
                let shared = Arc::clone(&locks.clinic).read_owned().await;
                let staff_lock = {
                    let mut staff = locks.staff.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                    Arc::clone(staff.entry(staff_id).or_default())
                };
                ScopeGuard::Staff(shared, staff_lock.lock_owned().await)
            }
        }
    }
}

// ==============================================================================
// IN-MEMORY LEDGER
// ==============================================================================

#[derive(Default)]
pub struct InMemoryBookingLedger {
    appointments: RwLock<HashMap<Uuid, Appointment>>,
    locks: CommitLocks,
}

impl InMemoryBookingLedger {
    pub fn new() -> Self {
        Self::default()
    }

    async fn conflicts_for(&self, appointment: &Appointment) -> Vec<Uuid> {
        self.appointments
            .read()
            .await
            .values()
            .filter(|existing| existing.clinic_id == appointment.clinic_id)
            .filter(|existing| {
                blocks_window(
                    existing,
                    appointment.staff_id,
                    appointment.scheduled_at,
                    appointment.scheduled_end_time(),
                    Some(appointment.id),
                )
            })
            .map(|existing| existing.id)
            .collect()
    }
}

#[async_trait]
impl BookingLedger for InMemoryBookingLedger {
    async fn get(&self, clinic_id: Uuid, appointment_id: Uuid) -> Result<Option<Appointment>, AppointmentError> {
        Ok(self
            .appointments
            .read()
            .await
            .get(&appointment_id)
            .filter(|appointment| appointment.clinic_id == clinic_id)
            .cloned())
    }

    async fn list(
        &self,
        clinic_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let mut found: Vec<Appointment> = self
            .appointments
            .read()
            .await
            .values()
            .filter(|a| a.clinic_id == clinic_id)
            .filter(|a| windows_overlap(a.scheduled_at, a.scheduled_end_time(), from, to))
            .cloned()
            .collect();
        found.sort_by_key(|a| (a.scheduled_at, a.created_at));
        Ok(found)
    }

    async fn active_overlapping(
        &self,
        clinic_id: Uuid,
        staff_id: Option<Uuid>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude_appointment_id: Option<Uuid>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let mut found: Vec<Appointment> = self
            .appointments
            .read()
            .await
            .values()
            .filter(|a| a.clinic_id == clinic_id)
            .filter(|a| blocks_window(a, staff_id, start, end, exclude_appointment_id))
            .cloned()
            .collect();
        found.sort_by_key(|a| a.scheduled_at);
        Ok(found)
    }

    async fn insert_if_free(&self, appointment: Appointment) -> Result<Appointment, AppointmentError> {
        let _guard = self.locks.acquire(appointment.clinic_id, appointment.staff_id).await;

        let conflicts = self.conflicts_for(&appointment).await;
        if !conflicts.is_empty() {
            warn!(
                "Booking conflict for clinic {} at {}: overlaps {:?}",
                appointment.clinic_id, appointment.scheduled_at, conflicts
            );
            return Err(AppointmentError::ConflictDetected);
        }

        let mut appointments = self.appointments.write().await;
        if appointments.contains_key(&appointment.id) {
            return Err(AppointmentError::ValidationError(format!(
                "Appointment {} already exists",
                appointment.id
            )));
        }
        appointments.insert(appointment.id, appointment.clone());
        debug!("Inserted appointment {}", appointment.id);
        Ok(appointment)
    }

    async fn reschedule_if_free(
        &self,
        appointment: Appointment,
        expected: AppointmentStatus,
    ) -> Result<Option<Appointment>, AppointmentError> {
        let _guard = self.locks.acquire(appointment.clinic_id, appointment.staff_id).await;

        match self.get(appointment.clinic_id, appointment.id).await? {
            Some(stored) if stored.status != expected => return Ok(None),
            Some(stored) if stored.staff_id == appointment.staff_id => {}
            Some(_) => {
                return Err(AppointmentError::ValidationError(
                    "Rescheduling cannot change the assigned staff member".to_string(),
                ))
            }
            None => return Ok(None),
        }

        let conflicts = self.conflicts_for(&appointment).await;
        if !conflicts.is_empty() {
            warn!(
                "Reschedule conflict for appointment {} at {}: overlaps {:?}",
                appointment.id, appointment.scheduled_at, conflicts
            );
            return Err(AppointmentError::ConflictDetected);
        }

        // Status writes skip the scope lock, so check again under the map lock.
        let mut appointments = self.appointments.write().await;
        match appointments.get_mut(&appointment.id) {
            Some(stored) if stored.status == expected => {
                *stored = appointment.clone();
                Ok(Some(appointment))
            }
            _ => Ok(None),
        }
    }

    async fn update(
        &self,
        appointment: Appointment,
        expected: AppointmentStatus,
    ) -> Result<Option<Appointment>, AppointmentError> {
        let mut appointments = self.appointments.write().await;
        let Some(stored) = appointments
            .get_mut(&appointment.id)
            .filter(|stored| stored.clinic_id == appointment.clinic_id)
        else {
            return Ok(None);
        };

        if stored.status != expected {
            debug!(
                "Appointment {} is {}, not {}; skipping write",
                appointment.id, stored.status, expected
            );
            return Ok(None);
        }

        if stored.scheduled_at != appointment.scheduled_at
            || stored.duration_minutes != appointment.duration_minutes
            || stored.staff_id != appointment.staff_id
        {
            return Err(AppointmentError::ValidationError(
                "Appointment time can only change through a reschedule".to_string(),
            ));
        }

        *stored = appointment.clone();
        Ok(Some(appointment))
    }

    async fn transition_status(
        &self,
        clinic_id: Uuid,
        appointment_id: Uuid,
        expected: AppointmentStatus,
        next: AppointmentStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Appointment>, AppointmentError> {
        let mut appointments = self.appointments.write().await;
        let stored = appointments
            .get_mut(&appointment_id)
            .filter(|stored| stored.clinic_id == clinic_id)
            .ok_or(AppointmentError::NotFound)?;

        if stored.status != expected {
            return Ok(None);
        }

        stored.status = next;
        stored.updated_at = at;
        Ok(Some(stored.clone()))
    }
}
