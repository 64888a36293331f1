// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::error::AppError;

use crate::models::{
    AppointmentError, AppointmentRangeQuery, AvailabilityQuery, BookAppointmentRequest,
    CancelAppointmentRequest, CompleteAppointmentRequest, DisputeAppointmentRequest,
    RescheduleAppointmentRequest, SlotQuery,
};
use crate::services::booking::AppointmentBookingService;

pub type BookingState = Arc<AppointmentBookingService>;

impl From<AppointmentError> for AppError {
    fn from(err: AppointmentError) -> Self {
        let message = err.to_string();
        match err {
            AppointmentError::NotFound => AppError::NotFound {
                code: "appointment_not_found",
                message,
            },
            AppointmentError::InvalidHours(_) => AppError::BadRequest {
                code: "invalid_hours",
                message,
            },
            AppointmentError::ValidationError(_) => AppError::BadRequest {
                code: "validation_error",
                message,
            },
            AppointmentError::OutOfHours(_) => AppError::PolicyViolation {
                code: "out_of_hours",
                message,
            },
            AppointmentError::CancellationWindow { .. } => AppError::PolicyViolation {
                code: "cancellation_window",
                message,
            },
            AppointmentError::DisputeWindowExpired { .. } => AppError::PolicyViolation {
                code: "dispute_window_expired",
                message,
            },
            AppointmentError::ConflictDetected | AppointmentError::SerializationFailure => {
                AppError::Conflict {
                    code: "slot_conflict",
                    message,
                }
            }
            AppointmentError::AlreadyDisputed => AppError::Conflict {
                code: "already_disputed",
                message,
            },
            AppointmentError::NotDisputable(_) => AppError::Conflict {
                code: "not_disputable",
                message,
            },
            AppointmentError::InvalidStatusTransition { .. } => AppError::Conflict {
                code: "invalid_transition",
                message,
            },
            AppointmentError::DatabaseError(_) => AppError::Database(message),
        }
    }
}

/// Booking body; the clinic comes from the path.
#[derive(Debug, Deserialize)]
pub struct BookAppointmentBody {
    pub staff_id: Option<Uuid>,
    pub owner_id: Uuid,
    pub subject_id: Uuid,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: Option<i32>,
}

// ==============================================================================
// AVAILABILITY HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_slots(
    State(service): State<BookingState>,
    Path(clinic_id): Path<Uuid>,
    Query(query): Query<SlotQuery>,
) -> Result<Json<Value>, AppError> {
    let to = query.to.unwrap_or(query.from);
    let slots = service
        .get_available_slots(clinic_id, query.staff_id, query.from, to)
        .await?;

    Ok(Json(json!({
        "clinic_id": clinic_id,
        "from": query.from,
        "to": to,
        "staff_id": query.staff_id,
        "slots": slots,
    })))
}

#[axum::debug_handler]
pub async fn check_availability(
    State(service): State<BookingState>,
    Path(clinic_id): Path<Uuid>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<Value>, AppError> {
    let duration = service.policy().duration_or_default(query.duration_minutes)?;
    let free = service
        .is_free(clinic_id, query.staff_id, query.start, Some(duration))
        .await?;

    Ok(Json(json!({
        "clinic_id": clinic_id,
        "start": query.start,
        "duration_minutes": duration,
        "staff_id": query.staff_id,
        "is_free": free,
    })))
}

// ==============================================================================
// APPOINTMENT HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn list_appointments(
    State(service): State<BookingState>,
    Path(clinic_id): Path<Uuid>,
    Query(query): Query<AppointmentRangeQuery>,
) -> Result<Json<Value>, AppError> {
    let appointments = service
        .list_appointments(clinic_id, query.from, query.to)
        .await?;

    Ok(Json(json!({
        "clinic_id": clinic_id,
        "appointments": appointments,
        "total": appointments.len(),
    })))
}

#[axum::debug_handler]
pub async fn book_appointment(
    State(service): State<BookingState>,
    Path(clinic_id): Path<Uuid>,
    Json(body): Json<BookAppointmentBody>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let request = BookAppointmentRequest {
        clinic_id,
        staff_id: body.staff_id,
        owner_id: body.owner_id,
        subject_id: body.subject_id,
        scheduled_at: body.scheduled_at,
        duration_minutes: body.duration_minutes,
    };
    let appointment = service.book(request).await?;

    Ok((StatusCode::CREATED, Json(json!(appointment))))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(service): State<BookingState>,
    Path((clinic_id, appointment_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Value>, AppError> {
    let appointment = service.get_appointment(clinic_id, appointment_id).await?;
    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn get_appointment_status(
    State(service): State<BookingState>,
    Path((clinic_id, appointment_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Value>, AppError> {
    let (status, allowed_events) = service
        .status_with_actions(clinic_id, appointment_id)
        .await?;

    Ok(Json(json!({
        "appointment_id": appointment_id,
        "status": status,
        "allowed_events": allowed_events,
    })))
}

#[axum::debug_handler]
pub async fn confirm_appointment(
    State(service): State<BookingState>,
    Path((clinic_id, appointment_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Value>, AppError> {
    let appointment = service.confirm(clinic_id, appointment_id).await?;
    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn complete_appointment(
    State(service): State<BookingState>,
    Path((clinic_id, appointment_id)): Path<(Uuid, Uuid)>,
    body: Option<Json<CompleteAppointmentRequest>>,
) -> Result<Json<Value>, AppError> {
    let request = body.map(|Json(request)| request).unwrap_or_default();
    let appointment = service
        .complete(clinic_id, appointment_id, request.actual_cost)
        .await?;
    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn mark_no_show(
    State(service): State<BookingState>,
    Path((clinic_id, appointment_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Value>, AppError> {
    let appointment = service.mark_no_show(clinic_id, appointment_id).await?;
    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(service): State<BookingState>,
    Path((clinic_id, appointment_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<CancelAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let appointment = service
        .cancel(clinic_id, appointment_id, request.cancelled_by, request.reason)
        .await?;
    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn reschedule_appointment(
    State(service): State<BookingState>,
    Path((clinic_id, appointment_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<RescheduleAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let appointment = service
        .reschedule(
            clinic_id,
            appointment_id,
            request.new_scheduled_at,
            request.initiated_by_owner,
        )
        .await?;
    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn dispute_appointment(
    State(service): State<BookingState>,
    Path((clinic_id, appointment_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<DisputeAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let appointment = service
        .dispute(clinic_id, appointment_id, request.reason)
        .await?;
    Ok(Json(json!(appointment)))
}
