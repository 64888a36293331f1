pub mod availability;
pub mod booking;
pub mod ledger;
pub mod lifecycle;
pub mod notifications;
pub mod slots;
pub mod supabase_ledger;

pub use availability::AvailabilityResolver;
pub use booking::AppointmentBookingService;
pub use ledger::{BookingLedger, InMemoryBookingLedger};
pub use lifecycle::AppointmentLifecycleService;
pub use notifications::{
    AppointmentEvent, FanoutNotificationSink, NotificationSink, TracingNotificationSink,
    WebhookNotificationSink,
};
pub use slots::{DaySlots, SlotGenerator};
pub use supabase_ledger::SupabaseBookingLedger;
