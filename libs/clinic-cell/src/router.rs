use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::handlers;
use crate::services::OperatingHoursStore;

/// Operating-hours routes, to be nested under `/clinics`.
pub fn clinic_routes(store: Arc<dyn OperatingHoursStore>) -> Router {
    Router::new()
        .route("/{clinic_id}/hours", get(handlers::get_operating_hours))
        .route("/{clinic_id}/hours/seed", post(handlers::seed_operating_hours))
        .route("/{clinic_id}/hours/{weekday}", put(handlers::update_operating_hours))
        .with_state(store)
}
