use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;

pub struct TestConfig {
    pub supabase_url: String,
    pub supabase_service_key: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            supabase_url: "http://localhost:54321".to_string(),
            supabase_service_key: "test-service-key".to_string(),
        }
    }
}

impl TestConfig {
    /// Points the Supabase client at a wiremock server.
    pub fn for_mock_server(uri: &str) -> Self {
        Self {
            supabase_url: uri.to_string(),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        let mut config = AppConfig::in_memory();
        config.supabase_url = self.supabase_url.clone();
        config.supabase_service_key = self.supabase_service_key.clone();
        config
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

/// PostgREST row bodies shaped like the scheduling tables.
pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    pub fn operating_hours_row(
        clinic_id: Uuid,
        weekday: i16,
        opening_time: &str,
        closing_time: &str,
        break_window: Option<(&str, &str)>,
    ) -> Value {
        json!({
            "clinic_id": clinic_id,
            "weekday": weekday,
            "is_closed": false,
            "opening_time": opening_time,
            "closing_time": closing_time,
            "break_start": break_window.map(|(start, _)| start),
            "break_end": break_window.map(|(_, end)| end),
            "updated_at": "2024-01-01T00:00:00Z"
        })
    }

    pub fn closed_day_row(clinic_id: Uuid, weekday: i16) -> Value {
        json!({
            "clinic_id": clinic_id,
            "weekday": weekday,
            "is_closed": true,
            "opening_time": null,
            "closing_time": null,
            "break_start": null,
            "break_end": null,
            "updated_at": "2024-01-01T00:00:00Z"
        })
    }

    pub fn appointment_row(
        id: Uuid,
        clinic_id: Uuid,
        staff_id: Option<Uuid>,
        scheduled_at: DateTime<Utc>,
        duration_minutes: i32,
        status: &str,
    ) -> Value {
        json!({
            "id": id,
            "clinic_id": clinic_id,
            "staff_id": staff_id,
            "owner_id": Uuid::new_v4(),
            "subject_id": Uuid::new_v4(),
            "scheduled_at": scheduled_at.to_rfc3339(),
            "duration_minutes": duration_minutes,
            "status": status,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z",
            "is_disputed": false,
            "dispute_reason": null,
            "disputed_at": null,
            "actual_cost": null,
            "cancellation_reason": null,
            "cancelled_by": null,
            "reschedule_count": 0
        })
    }

    pub fn postgrest_error(code: &str, message: &str) -> Value {
        json!({
            "code": code,
            "message": message,
            "details": null,
            "hint": null
        })
    }
}
