pub mod hours;
pub mod supabase_hours;

pub use hours::{InMemoryOperatingHoursStore, OperatingHoursStore};
pub use supabase_hours::SupabaseOperatingHoursStore;
