#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use uuid::Uuid;

use appointment_cell::models::BookAppointmentRequest;
use appointment_cell::services::{
    AppointmentBookingService, BookingLedger, InMemoryBookingLedger, NotificationSink,
    TracingNotificationSink,
};
use appointment_cell::PolicyRules;
use clinic_cell::models::default_week;
use clinic_cell::services::{InMemoryOperatingHoursStore, OperatingHoursStore};
use shared_utils::clock::{at_wall_clock, FixedClock};

/// Monday 4 March 2030.
pub fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2030, 3, 4).unwrap()
}

pub fn t(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

pub fn at(day: NaiveDate, h: u32, m: u32) -> DateTime<Utc> {
    at_wall_clock(day, t(h, m))
}

pub struct Fixture {
    pub clinic_id: Uuid,
    pub hours: Arc<InMemoryOperatingHoursStore>,
    pub ledger: Arc<dyn BookingLedger>,
    pub clock: Arc<FixedClock>,
    pub service: Arc<AppointmentBookingService>,
}

impl Fixture {
    /// Default week seeded, clock on the Friday before `monday()` at 09:00.
    pub async fn new() -> Self {
        Self::with_ledger(Arc::new(InMemoryBookingLedger::new())).await
    }

    pub async fn with_ledger(ledger: Arc<dyn BookingLedger>) -> Self {
        Self::build(ledger, Arc::new(TracingNotificationSink), PolicyRules::default()).await
    }

    pub async fn build(
        ledger: Arc<dyn BookingLedger>,
        notifications: Arc<dyn NotificationSink>,
        policy: PolicyRules,
    ) -> Self {
        let clinic_id = Uuid::new_v4();
        let hours = Arc::new(InMemoryOperatingHoursStore::new());
        hours.seed_defaults(clinic_id, &default_week()).await.unwrap();

        let clock = Arc::new(FixedClock::at(NaiveDate::from_ymd_opt(2030, 3, 1).unwrap(), t(9, 0)));
        let service = Arc::new(AppointmentBookingService::new(
            hours.clone(),
            Arc::clone(&ledger),
            clock.clone(),
            notifications,
            policy,
        ));

        Self {
            clinic_id,
            hours,
            ledger,
            clock,
            service,
        }
    }

    pub fn request(&self, staff_id: Option<Uuid>, scheduled_at: DateTime<Utc>) -> BookAppointmentRequest {
        BookAppointmentRequest {
            clinic_id: self.clinic_id,
            staff_id,
            owner_id: Uuid::new_v4(),
            subject_id: Uuid::new_v4(),
            scheduled_at,
            duration_minutes: None,
        }
    }

    pub fn request_for(
        &self,
        staff_id: Option<Uuid>,
        scheduled_at: DateTime<Utc>,
        duration_minutes: i32,
    ) -> BookAppointmentRequest {
        BookAppointmentRequest {
            duration_minutes: Some(duration_minutes),
            ..self.request(staff_id, scheduled_at)
        }
    }
}
