use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Weekday;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::error::AppError;

use crate::models::{default_week, ClinicError, OperatingHours, SeedHoursRequest};
use crate::services::OperatingHoursStore;

pub type HoursState = Arc<dyn OperatingHoursStore>;

impl From<ClinicError> for AppError {
    fn from(err: ClinicError) -> Self {
        match err {
            ClinicError::InvalidHours(message) => AppError::BadRequest {
                code: "invalid_hours",
                message,
            },
            ClinicError::DatabaseError(message) => AppError::Database(message),
        }
    }
}

fn parse_weekday(raw: &str) -> Result<Weekday, AppError> {
    Weekday::from_str(raw).map_err(|_| AppError::BadRequest {
        code: "invalid_weekday",
        message: format!("Unknown weekday: {}", raw),
    })
}

#[axum::debug_handler]
pub async fn get_operating_hours(
    State(store): State<HoursState>,
    Path(clinic_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let days = store.week(clinic_id).await?;

    Ok(Json(json!({
        "clinic_id": clinic_id,
        "days": days,
    })))
}

#[axum::debug_handler]
pub async fn update_operating_hours(
    State(store): State<HoursState>,
    Path((clinic_id, weekday)): Path<(Uuid, String)>,
    Json(hours): Json<OperatingHours>,
) -> Result<Json<Value>, AppError> {
    let weekday = parse_weekday(&weekday)?;
    let stored = store.set(clinic_id, weekday, hours).await?;

    Ok(Json(json!({
        "clinic_id": clinic_id,
        "weekday": weekday,
        "hours": stored,
    })))
}

#[axum::debug_handler]
pub async fn seed_operating_hours(
    State(store): State<HoursState>,
    Path(clinic_id): Path<Uuid>,
    Json(request): Json<SeedHoursRequest>,
) -> Result<Json<Value>, AppError> {
    let template = request.days.unwrap_or_else(default_week);
    let days = store.seed_defaults(clinic_id, &template).await?;

    Ok(Json(json!({
        "clinic_id": clinic_id,
        "days": days,
    })))
}
