// libs/appointment-cell/src/services/supabase_ledger.rs
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Method;
use serde_json::json;
use tracing::{debug, error, warn};
use uuid::Uuid;

use shared_database::{postgrest_error, SupabaseClient};

use crate::models::{Appointment, AppointmentError, AppointmentStatus};
use crate::services::ledger::BookingLedger;

const TABLE_PATH: &str = "/rest/v1/appointments";

/// SQLSTATE raised by the booking functions when the window is taken.
pub const SLOT_TAKEN_SQLSTATE: &str = "PT409";

const ACTIVE_STATUSES: &str = "status=in.(pending,confirmed,in_progress)";

/// Ledger on the `appointments` table. Conditional writes go through the
/// `book_appointment_if_free` and `reschedule_appointment_if_free` functions
/// so the overlap check and the write share one transaction.
pub struct SupabaseBookingLedger {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseBookingLedger {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn map_storage_error(err: anyhow::Error) -> AppointmentError {
    match postgrest_error(&err) {
        Some(pg) if pg.is_serialization_failure() => AppointmentError::SerializationFailure,
        Some(pg) if pg.has_code(SLOT_TAKEN_SQLSTATE) => AppointmentError::ConflictDetected,
        _ => {
            error!("Appointment storage error: {}", err);
            AppointmentError::DatabaseError(err.to_string())
        }
    }
}

fn single(rows: Vec<Appointment>, what: &str) -> Result<Appointment, AppointmentError> {
    rows.into_iter()
        .next()
        .ok_or_else(|| AppointmentError::DatabaseError(format!("{} returned no appointment", what)))
}

#[async_trait]
impl BookingLedger for SupabaseBookingLedger {
    async fn get(&self, clinic_id: Uuid, appointment_id: Uuid) -> Result<Option<Appointment>, AppointmentError> {
        let path = format!(
            "{}?clinic_id=eq.{}&id=eq.{}&limit=1",
            TABLE_PATH, clinic_id, appointment_id
        );
        let rows: Vec<Appointment> = self
            .supabase
            .request(Method::GET, &path, None)
            .await
            .map_err(map_storage_error)?;
        Ok(rows.into_iter().next())
    }

    async fn list(
        &self,
        clinic_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let path = format!(
            "{}?clinic_id=eq.{}&scheduled_at=lt.{}&ends_at=gt.{}&order=scheduled_at.asc",
            TABLE_PATH,
            clinic_id,
            timestamp(to),
            timestamp(from)
        );
        self.supabase
            .request(Method::GET, &path, None)
            .await
            .map_err(map_storage_error)
    }

    async fn active_overlapping(
        &self,
        clinic_id: Uuid,
        staff_id: Option<Uuid>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude_appointment_id: Option<Uuid>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let mut path = format!(
            "{}?clinic_id=eq.{}&{}&scheduled_at=lt.{}&ends_at=gt.{}",
            TABLE_PATH,
            clinic_id,
            ACTIVE_STATUSES,
            timestamp(end),
            timestamp(start)
        );
        if let Some(staff_id) = staff_id {
            path.push_str(&format!("&or=(staff_id.is.null,staff_id.eq.{})", staff_id));
        }
        if let Some(exclude) = exclude_appointment_id {
            path.push_str(&format!("&id=neq.{}", exclude));
        }
        path.push_str("&order=scheduled_at.asc");

        self.supabase
            .request(Method::GET, &path, None)
            .await
            .map_err(map_storage_error)
    }

    async fn insert_if_free(&self, appointment: Appointment) -> Result<Appointment, AppointmentError> {
        debug!("Committing appointment {} via book_appointment_if_free", appointment.id);
        let rows: Vec<Appointment> = self
            .supabase
            .rpc("book_appointment_if_free", json!({ "p_appointment": appointment }))
            .await
            .map_err(map_storage_error)?;
        single(rows, "book_appointment_if_free")
    }

    async fn reschedule_if_free(
        &self,
        appointment: Appointment,
        expected: AppointmentStatus,
    ) -> Result<Option<Appointment>, AppointmentError> {
        let args = json!({
            "p_clinic_id": appointment.clinic_id,
            "p_appointment_id": appointment.id,
            "p_expected_status": expected,
            "p_scheduled_at": timestamp(appointment.scheduled_at),
            "p_status": appointment.status,
            "p_reschedule_count": appointment.reschedule_count,
            "p_updated_at": appointment.updated_at.to_rfc3339(),
        });
        let rows: Vec<Appointment> = self
            .supabase
            .rpc("reschedule_appointment_if_free", args)
            .await
            .map_err(map_storage_error)?;

        Ok(rows.into_iter().next())
    }

    async fn update(
        &self,
        appointment: Appointment,
        expected: AppointmentStatus,
    ) -> Result<Option<Appointment>, AppointmentError> {
        let path = format!(
            "{}?clinic_id=eq.{}&id=eq.{}&status=eq.{}",
            TABLE_PATH, appointment.clinic_id, appointment.id, expected
        );
        let body = json!({
            "status": appointment.status,
            "updated_at": appointment.updated_at.to_rfc3339(),
            "is_disputed": appointment.is_disputed,
            "dispute_reason": appointment.dispute_reason,
            "disputed_at": appointment.disputed_at.map(|at| at.to_rfc3339()),
            "actual_cost": appointment.actual_cost,
            "cancellation_reason": appointment.cancellation_reason,
            "cancelled_by": appointment.cancelled_by,
        });

        let rows: Vec<Appointment> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(body),
                Some(SupabaseClient::return_representation()),
            )
            .await
            .map_err(map_storage_error)?;

        if rows.is_empty() {
            warn!("Appointment {} was no longer {}; update skipped", appointment.id, expected);
        }
        Ok(rows.into_iter().next())
    }

    async fn transition_status(
        &self,
        clinic_id: Uuid,
        appointment_id: Uuid,
        expected: AppointmentStatus,
        next: AppointmentStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Appointment>, AppointmentError> {
        let path = format!(
            "{}?clinic_id=eq.{}&id=eq.{}&status=eq.{}",
            TABLE_PATH, clinic_id, appointment_id, expected
        );
        let body = json!({
            "status": next,
            "updated_at": at.to_rfc3339(),
        });

        let rows: Vec<Appointment> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(body),
                Some(SupabaseClient::return_representation()),
            )
            .await
            .map_err(map_storage_error)?;

        if rows.is_empty() {
            warn!(
                "Appointment {} was no longer {} when moving it to {}",
                appointment_id, expected, next
            );
        }
        Ok(rows.into_iter().next())
    }
}
