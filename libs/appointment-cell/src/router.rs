// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers;
use crate::services::booking::AppointmentBookingService;

/// Availability and appointment routes, to be nested under `/clinics`.
pub fn appointment_routes(service: Arc<AppointmentBookingService>) -> Router {
    Router::new()
        .route("/{clinic_id}/slots", get(handlers::get_slots))
        .route("/{clinic_id}/availability", get(handlers::check_availability))
        .route(
            "/{clinic_id}/appointments",
            get(handlers::list_appointments).post(handlers::book_appointment),
        )
        .route("/{clinic_id}/appointments/{appointment_id}", get(handlers::get_appointment))
        .route(
            "/{clinic_id}/appointments/{appointment_id}/status",
            get(handlers::get_appointment_status),
        )
        .route(
            "/{clinic_id}/appointments/{appointment_id}/confirm",
            post(handlers::confirm_appointment),
        )
        .route(
            "/{clinic_id}/appointments/{appointment_id}/complete",
            post(handlers::complete_appointment),
        )
        .route(
            "/{clinic_id}/appointments/{appointment_id}/no-show",
            post(handlers::mark_no_show),
        )
        .route(
            "/{clinic_id}/appointments/{appointment_id}/cancel",
            post(handlers::cancel_appointment),
        )
        .route(
            "/{clinic_id}/appointments/{appointment_id}/reschedule",
            post(handlers::reschedule_appointment),
        )
        .route(
            "/{clinic_id}/appointments/{appointment_id}/dispute",
            post(handlers::dispute_appointment),
        )
        .with_state(service)
}
