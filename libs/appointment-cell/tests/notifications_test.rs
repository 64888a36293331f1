mod common;

use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use mockall::mock;
use mockall::predicate::eq;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::models::{Appointment, AppointmentStatus};
use appointment_cell::services::{
    AppointmentEvent, FanoutNotificationSink, InMemoryBookingLedger, NotificationSink,
    WebhookNotificationSink,
};
use appointment_cell::PolicyRules;

use common::{at, monday, Fixture};

mock! {
    pub Sink {}

    #[async_trait]
    impl NotificationSink for Sink {
        async fn notify(&self, event: AppointmentEvent, appointment: &Appointment);
    }
}

#[tokio::test]
async fn each_committed_change_notifies_once() {
    let mut sink = MockSink::new();
    let mut sequence = mockall::Sequence::new();
    for event in [
        AppointmentEvent::Booked,
        AppointmentEvent::Confirmed,
        AppointmentEvent::Rescheduled,
        AppointmentEvent::Cancelled,
    ] {
        sink.expect_notify()
            .with(eq(event), mockall::predicate::always())
            .times(1)
            .in_sequence(&mut sequence)
            .return_const(());
    }

    let fx = Fixture::build(
        Arc::new(InMemoryBookingLedger::new()),
        Arc::new(sink),
        PolicyRules::default(),
    )
    .await;

    let booked = fx.service.book(fx.request(None, at(monday(), 10, 0))).await.unwrap();
    fx.service.confirm(fx.clinic_id, booked.id).await.unwrap();
    fx.service
        .reschedule(fx.clinic_id, booked.id, at(monday(), 11, 0), false)
        .await
        .unwrap();
    fx.service
        .cancel_by_clinic(fx.clinic_id, booked.id, None)
        .await
        .unwrap();
}

#[tokio::test]
async fn rejected_requests_do_not_notify() {
    let mut sink = MockSink::new();
    sink.expect_notify()
        .withf(|event, appointment| {
            *event == AppointmentEvent::Booked && appointment.status == AppointmentStatus::Pending
        })
        .times(1)
        .return_const(());

    let fx = Fixture::build(
        Arc::new(InMemoryBookingLedger::new()),
        Arc::new(sink),
        PolicyRules::default(),
    )
    .await;

    fx.service.book(fx.request(None, at(monday(), 10, 0))).await.unwrap();
    assert!(fx.service.book(fx.request(None, at(monday(), 10, 0))).await.is_err());
    assert!(fx.service.book(fx.request(None, at(monday(), 12, 0))).await.is_err());
}

#[tokio::test]
async fn fanout_forwards_to_every_sink() {
    let mut first = MockSink::new();
    first.expect_notify().times(1).return_const(());
    let mut second = MockSink::new();
    second.expect_notify().times(1).return_const(());

    let fanout = FanoutNotificationSink::default()
        .with(Arc::new(first))
        .with(Arc::new(second));
    assert_eq!(fanout.len(), 2);

    let fx = Fixture::build(
        Arc::new(InMemoryBookingLedger::new()),
        Arc::new(fanout),
        PolicyRules::default(),
    )
    .await;
    fx.service.book(fx.request(None, at(monday(), 9, 0))).await.unwrap();
}

#[tokio::test]
async fn webhook_posts_event_and_appointment() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hooks/appointments"))
        .and(body_partial_json(json!({ "event": "booked" })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let fx = Fixture::new().await;
    let booked = fx.service.book(fx.request(None, at(monday(), 10, 0))).await.unwrap();

    let webhook = WebhookNotificationSink::new(format!("{}/hooks/appointments", server.uri()));
    webhook.deliver(AppointmentEvent::Booked, &booked).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["appointment"]["id"], json!(booked.id));
}

#[tokio::test]
async fn webhook_failure_never_fails_the_booking() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let fx = Fixture::build(
        Arc::new(InMemoryBookingLedger::new()),
        Arc::new(WebhookNotificationSink::new(server.uri())),
        PolicyRules::default(),
    )
    .await;

    let booked = fx.service.book(fx.request(None, at(monday(), 10, 0))).await;
    assert!(booked.is_ok());

    // Delivery runs on a spawned task.
    let mut delivered = false;
    for _ in 0..50 {
        if !server.received_requests().await.unwrap().is_empty() {
            delivered = true;
            break;
        }
        tokio::time::sleep(StdDuration::from_millis(20)).await;
    }
    assert!(delivered);
}
