mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::models::{Appointment, AppointmentError, AppointmentStatus, CancelledBy};
use appointment_cell::services::{BookingLedger, SupabaseBookingLedger, TracingNotificationSink};
use appointment_cell::PolicyRules;
use shared_database::SupabaseClient;
use shared_utils::test_utils::{MockSupabaseResponses, TestConfig};

use common::{at, monday, Fixture};

fn ledger_for(server: &MockServer) -> SupabaseBookingLedger {
    let config = TestConfig::for_mock_server(&server.uri()).to_app_config();
    SupabaseBookingLedger::new(Arc::new(SupabaseClient::new(&config)))
}

#[tokio::test]
async fn get_is_scoped_by_clinic() {
    let server = MockServer::start().await;
    let (clinic_id, id) = (Uuid::new_v4(), Uuid::new_v4());

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("clinic_id", format!("eq.{}", clinic_id)))
        .and(query_param("id", format!("eq.{}", id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_row(id, clinic_id, None, at(monday(), 10, 0), 30, "confirmed")
        ])))
        .mount(&server)
        .await;

    let found = ledger_for(&server).get(clinic_id, id).await.unwrap().unwrap();
    assert_eq!(found.status, AppointmentStatus::Confirmed);
    assert_eq!(found.scheduled_at, at(monday(), 10, 0));
}

#[tokio::test]
async fn overlap_query_filters_active_scope_and_window() {
    let server = MockServer::start().await;
    let (clinic_id, staff_id, exclude) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("clinic_id", format!("eq.{}", clinic_id)))
        .and(query_param("status", "in.(pending,confirmed,in_progress)"))
        .and(query_param("scheduled_at", "lt.2030-03-04T10:30:00Z"))
        .and(query_param("ends_at", "gt.2030-03-04T10:00:00Z"))
        .and(query_param("or", format!("(staff_id.is.null,staff_id.eq.{})", staff_id)))
        .and(query_param("id", format!("neq.{}", exclude)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let found = ledger_for(&server)
        .active_overlapping(
            clinic_id,
            Some(staff_id),
            at(monday(), 10, 0),
            at(monday(), 10, 30),
            Some(exclude),
        )
        .await
        .unwrap();
    assert!(found.is_empty());
}

#[tokio::test]
async fn slot_taken_in_database_is_a_conflict() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/book_appointment_if_free"))
        .respond_with(ResponseTemplate::new(409).set_body_json(
            MockSupabaseResponses::postgrest_error("PT409", "This slot is no longer available"),
        ))
        .mount(&server)
        .await;

    let row = MockSupabaseResponses::appointment_row(
        Uuid::new_v4(),
        Uuid::new_v4(),
        Some(Uuid::new_v4()),
        at(monday(), 10, 0),
        30,
        "pending",
    );
    let appointment: Appointment = serde_json::from_value(row).unwrap();

    let err = ledger_for(&server).insert_if_free(appointment).await.unwrap_err();
    assert_eq!(err, AppointmentError::ConflictDetected);
}

#[tokio::test]
async fn booking_retries_serialization_failures_against_postgrest() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/book_appointment_if_free"))
        .respond_with(ResponseTemplate::new(409).set_body_json(
            MockSupabaseResponses::postgrest_error("40001", "could not serialize access"),
        ))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;

    let fx = Fixture::build(
        Arc::new(ledger_for(&server)),
        Arc::new(TracingNotificationSink),
        PolicyRules::default(),
    )
    .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/book_appointment_if_free"))
        .and(body_partial_json(json!({ "p_appointment": { "clinic_id": fx.clinic_id } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_row(Uuid::new_v4(), fx.clinic_id, None, at(monday(), 10, 0), 30, "pending")
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let booked = fx
        .service
        .book(fx.request(None, at(monday(), 10, 0)))
        .await
        .unwrap();
    assert_eq!(booked.clinic_id, fx.clinic_id);
}

#[tokio::test]
async fn persistent_serialization_failure_becomes_conflict() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/book_appointment_if_free"))
        .respond_with(ResponseTemplate::new(409).set_body_json(
            MockSupabaseResponses::postgrest_error("40001", "could not serialize access"),
        ))
        .expect(3)
        .mount(&server)
        .await;

    let fx = Fixture::with_ledger(Arc::new(ledger_for(&server))).await;
    let err = fx
        .service
        .book(fx.request(None, at(monday(), 10, 0)))
        .await
        .unwrap_err();
    assert_eq!(err, AppointmentError::ConflictDetected);
}

#[tokio::test]
async fn lazy_transition_is_a_conditional_patch() {
    let server = MockServer::start().await;
    let (clinic_id, id) = (Uuid::new_v4(), Uuid::new_v4());

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", id)))
        .and(query_param("status", "eq.confirmed"))
        .and(body_partial_json(json!({ "status": "in_progress" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let moved = ledger_for(&server)
        .transition_status(
            clinic_id,
            id,
            AppointmentStatus::Confirmed,
            AppointmentStatus::InProgress,
            Utc::now(),
        )
        .await
        .unwrap();
    assert!(moved.is_none());
}

#[tokio::test]
async fn update_never_sends_the_time_window() {
    let server = MockServer::start().await;
    let (clinic_id, id) = (Uuid::new_v4(), Uuid::new_v4());
    let row = MockSupabaseResponses::appointment_row(id, clinic_id, None, at(monday(), 10, 0), 30, "cancelled");

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("clinic_id", format!("eq.{}", clinic_id)))
        .and(query_param("status", "eq.pending"))
        .and(body_partial_json(json!({ "status": "cancelled", "cancelled_by": "clinic" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([row.clone()])))
        .expect(1)
        .mount(&server)
        .await;

    let mut appointment: Appointment = serde_json::from_value(row).unwrap();
    appointment.cancelled_by = Some(CancelledBy::Clinic);

    let stored = ledger_for(&server)
        .update(appointment, AppointmentStatus::Pending)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, AppointmentStatus::Cancelled);

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert!(body.get("scheduled_at").is_none());
    assert!(body.get("duration_minutes").is_none());
}

#[tokio::test]
async fn update_of_a_changed_record_writes_nothing() {
    let server = MockServer::start().await;
    let (clinic_id, id) = (Uuid::new_v4(), Uuid::new_v4());

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("status", "eq.pending"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let row = MockSupabaseResponses::appointment_row(id, clinic_id, None, at(monday(), 10, 0), 30, "confirmed");
    let appointment: Appointment = serde_json::from_value(row).unwrap();

    let written = ledger_for(&server)
        .update(appointment, AppointmentStatus::Pending)
        .await
        .unwrap();
    assert!(written.is_none());
}

#[tokio::test]
async fn reschedule_passes_the_validated_status() {
    let server = MockServer::start().await;
    let (clinic_id, id) = (Uuid::new_v4(), Uuid::new_v4());

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/reschedule_appointment_if_free"))
        .and(body_partial_json(json!({
            "p_appointment_id": id,
            "p_expected_status": "confirmed",
            "p_status": "pending",
            "p_scheduled_at": "2030-03-04T15:00:00.250Z",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let row = MockSupabaseResponses::appointment_row(id, clinic_id, None, at(monday(), 10, 0), 30, "pending");
    let mut appointment: Appointment = serde_json::from_value(row).unwrap();
    appointment.scheduled_at = at(monday(), 15, 0) + chrono::Duration::milliseconds(250);

    let moved = ledger_for(&server)
        .reschedule_if_free(appointment, AppointmentStatus::Confirmed)
        .await
        .unwrap();
    assert!(moved.is_none());
}

#[tokio::test]
async fn overlap_filters_keep_sub_second_precision() {
    let server = MockServer::start().await;
    let clinic_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("scheduled_at", "lt.2030-03-04T10:30:00.500Z"))
        .and(query_param("ends_at", "gt.2030-03-04T10:00:00.500Z"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let half = chrono::Duration::milliseconds(500);
    ledger_for(&server)
        .active_overlapping(
            clinic_id,
            None,
            at(monday(), 10, 0) + half,
            at(monday(), 10, 30) + half,
            None,
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn unexpected_errors_are_database_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500).set_body_json(
            MockSupabaseResponses::postgrest_error("XX000", "boom"),
        ))
        .mount(&server)
        .await;

    let err = ledger_for(&server)
        .get(Uuid::new_v4(), Uuid::new_v4())
        .await
        .unwrap_err();
    assert_matches!(err, AppointmentError::DatabaseError(_));
}
