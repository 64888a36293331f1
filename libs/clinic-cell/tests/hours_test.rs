use std::sync::Arc;

use assert_matches::assert_matches;
use axum::extract::{Path, State};
use axum::Json;
use chrono::{NaiveTime, Weekday};
use uuid::Uuid;

use clinic_cell::handlers::{get_operating_hours, seed_operating_hours, update_operating_hours, HoursState};
use clinic_cell::models::{default_week, ClinicError, DayHours, OperatingHours, SeedHoursRequest};
use clinic_cell::services::{InMemoryOperatingHoursStore, OperatingHoursStore};
use shared_models::error::AppError;

fn t(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

#[tokio::test]
async fn missing_record_reads_as_closed() {
    let store = InMemoryOperatingHoursStore::new();
    let clinic_id = Uuid::new_v4();

    assert_eq!(store.find(clinic_id, Weekday::Wed).await.unwrap(), None);
    let hours = store.get(clinic_id, Weekday::Wed).await.unwrap();
    assert!(hours.is_closed);
}

#[tokio::test]
async fn set_rejects_invalid_hours_and_keeps_previous() {
    let store = InMemoryOperatingHoursStore::new();
    let clinic_id = Uuid::new_v4();
    let good = OperatingHours::open(t(8, 0), t(17, 0));

    store.set(clinic_id, Weekday::Mon, good).await.unwrap();
    let err = store
        .set(clinic_id, Weekday::Mon, OperatingHours::open(t(17, 0), t(8, 0)))
        .await
        .unwrap_err();

    assert_matches!(err, ClinicError::InvalidHours(_));
    assert_eq!(store.get(clinic_id, Weekday::Mon).await.unwrap(), good);
}

#[tokio::test]
async fn hours_are_scoped_per_clinic() {
    let store = InMemoryOperatingHoursStore::new();
    let (first, second) = (Uuid::new_v4(), Uuid::new_v4());

    store
        .set(first, Weekday::Tue, OperatingHours::around_the_clock())
        .await
        .unwrap();

    assert!(!store.get(first, Weekday::Tue).await.unwrap().is_closed);
    assert!(store.get(second, Weekday::Tue).await.unwrap().is_closed);
}

#[tokio::test]
async fn seeding_only_fills_missing_days() {
    let store = InMemoryOperatingHoursStore::new();
    let clinic_id = Uuid::new_v4();
    let custom_monday = OperatingHours::open(t(10, 0), t(14, 0));
    store.set(clinic_id, Weekday::Mon, custom_monday).await.unwrap();

    let week = store.seed_defaults(clinic_id, &default_week()).await.unwrap();

    assert_eq!(week.len(), 7);
    assert_eq!(week[0].hours, custom_monday);
    assert_eq!(week[1].hours, default_week()[1].hours);
    assert!(week[6].hours.is_closed);
}

#[tokio::test]
async fn seeding_rejects_duplicate_weekdays() {
    let store = InMemoryOperatingHoursStore::new();
    let day = DayHours {
        weekday: Weekday::Fri,
        hours: OperatingHours::open(t(8, 0), t(12, 0)),
    };

    let err = store.seed_defaults(Uuid::new_v4(), &[day, day]).await.unwrap_err();
    assert_matches!(err, ClinicError::InvalidHours(msg) if msg.contains("more than once"));
}

#[tokio::test]
async fn handlers_round_trip_hours() {
    let state: HoursState = Arc::new(InMemoryOperatingHoursStore::new());
    let clinic_id = Uuid::new_v4();

    let Json(body) = update_operating_hours(
        State(state.clone()),
        Path((clinic_id, "thursday".to_string())),
        Json(OperatingHours::open(t(9, 0), t(18, 0)).with_break(t(13, 0), t(14, 0))),
    )
    .await
    .unwrap();
    assert_eq!(body["weekday"], "Thu");
    assert_eq!(body["hours"]["break_start"], "13:00:00");

    let Json(week) = get_operating_hours(State(state), Path(clinic_id)).await.unwrap();
    let days = week["days"].as_array().unwrap();
    assert_eq!(days.len(), 7);
    assert_eq!(days[3]["opening_time"], "09:00:00");
    assert_eq!(days[0]["is_closed"], true);
}

#[tokio::test]
async fn handlers_reject_bad_weekday_and_bad_hours() {
    let state: HoursState = Arc::new(InMemoryOperatingHoursStore::new());
    let clinic_id = Uuid::new_v4();

    let err = update_operating_hours(
        State(state.clone()),
        Path((clinic_id, "someday".to_string())),
        Json(OperatingHours::closed()),
    )
    .await
    .unwrap_err();
    assert_eq!(err.code(), "invalid_weekday");

    let err = update_operating_hours(
        State(state),
        Path((clinic_id, "Mon".to_string())),
        Json(OperatingHours::open(t(12, 0), t(12, 0))),
    )
    .await
    .unwrap_err();
    assert_matches!(err, AppError::BadRequest { code: "invalid_hours", .. });
}

#[tokio::test]
async fn seed_handler_uses_default_template() {
    let state: HoursState = Arc::new(InMemoryOperatingHoursStore::new());
    let clinic_id = Uuid::new_v4();

    let Json(body) = seed_operating_hours(State(state.clone()), Path(clinic_id), Json(SeedHoursRequest::default()))
        .await
        .unwrap();

    assert_eq!(body["days"][0]["break_start"], "12:00:00");
    assert!(state.get(clinic_id, Weekday::Sun).await.unwrap().is_closed);
}
