use std::env;
use std::str::FromStr;
use tracing::warn;

/// Scheduling policy values as read from the environment.
///
/// These are raw numbers; `appointment_cell::policy::PolicyRules` validates
/// them before they reach the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulingPolicyConfig {
    pub slot_granularity_minutes: i64,
    pub cancel_reschedule_cutoff_hours: i64,
    pub dispute_window_hours: i64,
    pub default_appointment_duration_minutes: i32,
    pub max_commit_attempts: u32,
    pub max_calendar_range_days: i64,
}

impl Default for SchedulingPolicyConfig {
    fn default() -> Self {
        Self {
            slot_granularity_minutes: 30,
            cancel_reschedule_cutoff_hours: 24,
            dispute_window_hours: 48,
            default_appointment_duration_minutes: 30,
            max_commit_attempts: 3,
            max_calendar_range_days: 31,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_service_key: String,
    pub bind_address: String,
    pub notification_webhook_url: Option<String>,
    pub policy: SchedulingPolicyConfig,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = SchedulingPolicyConfig::default();

        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_service_key: env::var("SUPABASE_SERVICE_ROLE_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_SERVICE_ROLE_KEY not set, using empty value");
                    String::new()
                }),
            bind_address: env::var("BIND_ADDRESS")
                .unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            notification_webhook_url: env::var("NOTIFICATION_WEBHOOK_URL")
                .ok()
                .filter(|url| !url.is_empty()),
            policy: SchedulingPolicyConfig {
                slot_granularity_minutes: env_or(
                    "SLOT_GRANULARITY_MINUTES",
                    defaults.slot_granularity_minutes,
                ),
                cancel_reschedule_cutoff_hours: env_or(
                    "CANCEL_RESCHEDULE_CUTOFF_HOURS",
                    defaults.cancel_reschedule_cutoff_hours,
                ),
                dispute_window_hours: env_or(
                    "DISPUTE_WINDOW_HOURS",
                    defaults.dispute_window_hours,
                ),
                default_appointment_duration_minutes: env_or(
                    "DEFAULT_APPOINTMENT_DURATION_MINUTES",
                    defaults.default_appointment_duration_minutes,
                ),
                max_commit_attempts: env_or(
                    "BOOKING_COMMIT_MAX_ATTEMPTS",
                    defaults.max_commit_attempts,
                ),
                max_calendar_range_days: env_or(
                    "MAX_CALENDAR_RANGE_DAYS",
                    defaults.max_calendar_range_days,
                ),
            },
        };

        if !config.is_configured() {
            warn!("Supabase not configured - scheduling data will be kept in memory");
        }

        config
    }

    /// Configuration for tests and local runs without any environment.
    pub fn in_memory() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_service_key: String::new(),
            bind_address: "127.0.0.1:3000".to_string(),
            notification_webhook_url: None,
            policy: SchedulingPolicyConfig::default(),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty() && !self.supabase_service_key.is_empty()
    }
}

fn env_or<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has invalid value {:?}, using default {}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}
