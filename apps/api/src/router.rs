use std::sync::Arc;

use axum::{routing::get, Router};
use tracing::info;

use appointment_cell::router::appointment_routes;
use appointment_cell::services::{
    AppointmentBookingService, BookingLedger, FanoutNotificationSink, InMemoryBookingLedger,
    NotificationSink, SupabaseBookingLedger, TracingNotificationSink, WebhookNotificationSink,
};
use appointment_cell::PolicyRules;
use clinic_cell::router::clinic_routes;
use clinic_cell::services::{
    InMemoryOperatingHoursStore, OperatingHoursStore, SupabaseOperatingHoursStore,
};
use shared_config::AppConfig;
use shared_database::SupabaseClient;
use shared_utils::clock::Clock;

/// Everything the routes need, wired once at startup.
pub struct Services {
    pub hours: Arc<dyn OperatingHoursStore>,
    pub booking: Arc<AppointmentBookingService>,
}

impl Services {
    pub fn from_config(config: &AppConfig, clock: Arc<dyn Clock>) -> anyhow::Result<Self> {
        let policy = PolicyRules::from_config(config)?;

        let (hours, ledger): (Arc<dyn OperatingHoursStore>, Arc<dyn BookingLedger>) =
            if config.is_configured() {
                info!("Using Supabase-backed scheduling stores");
                let supabase = Arc::new(SupabaseClient::new(config));
                (
                    Arc::new(SupabaseOperatingHoursStore::new(Arc::clone(&supabase))),
                    Arc::new(SupabaseBookingLedger::new(supabase)),
                )
            } else {
                info!("Using in-memory scheduling stores");
                (
                    Arc::new(InMemoryOperatingHoursStore::new()),
                    Arc::new(InMemoryBookingLedger::new()),
                )
            };

        let mut sinks = FanoutNotificationSink::default().with(Arc::new(TracingNotificationSink));
        if let Some(url) = &config.notification_webhook_url {
            info!("Forwarding appointment events to {}", url);
            sinks = sinks.with(Arc::new(WebhookNotificationSink::new(url.clone())));
        }
        let notifications: Arc<dyn NotificationSink> = Arc::new(sinks);

        let booking = Arc::new(AppointmentBookingService::new(
            Arc::clone(&hours),
            ledger,
            clock,
            notifications,
            policy,
        ));

        Ok(Self { hours, booking })
    }
}

pub fn create_router(services: Services) -> Router {
    Router::new()
        .route("/", get(|| async { "Clinic scheduling API is running!" }))
        .nest(
            "/clinics",
            clinic_routes(services.hours).merge(appointment_routes(services.booking)),
        )
}
