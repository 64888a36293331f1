// libs/clinic-cell/src/services/supabase_hours.rs
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveTime, Utc, Weekday};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_database::SupabaseClient;

use crate::models::{ClinicError, DayHours, OperatingHours, WEEK};
use crate::services::hours::OperatingHoursStore;

const TABLE_PATH: &str = "/rest/v1/clinic_operating_hours";

/// Row shape of `clinic_operating_hours`; `weekday` is 0 = Monday .. 6 = Sunday.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatingHoursRow {
    pub clinic_id: Uuid,
    pub weekday: i16,
    pub is_closed: bool,
    pub opening_time: Option<NaiveTime>,
    pub closing_time: Option<NaiveTime>,
    pub break_start: Option<NaiveTime>,
    pub break_end: Option<NaiveTime>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl OperatingHoursRow {
    fn hours(&self) -> OperatingHours {
        OperatingHours {
            is_closed: self.is_closed,
            opening_time: self.opening_time,
            closing_time: self.closing_time,
            break_start: self.break_start,
            break_end: self.break_end,
        }
    }

    fn weekday(&self) -> Option<Weekday> {
        WEEK.get(usize::try_from(self.weekday).ok()?).copied()
    }
}

fn weekday_index(weekday: Weekday) -> i16 {
    weekday.num_days_from_monday() as i16
}

pub struct SupabaseOperatingHoursStore {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseOperatingHoursStore {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }
}

fn database_error(err: anyhow::Error) -> ClinicError {
    ClinicError::DatabaseError(err.to_string())
}

#[async_trait]
impl OperatingHoursStore for SupabaseOperatingHoursStore {
    async fn find(&self, clinic_id: Uuid, weekday: Weekday) -> Result<Option<OperatingHours>, ClinicError> {
        let path = format!(
            "{}?clinic_id=eq.{}&weekday=eq.{}&limit=1",
            TABLE_PATH,
            clinic_id,
            weekday_index(weekday)
        );

        let rows: Vec<OperatingHoursRow> = self
            .supabase
            .request(Method::GET, &path, None)
            .await
            .map_err(database_error)?;

        Ok(rows.first().map(OperatingHoursRow::hours))
    }

    async fn set(
        &self,
        clinic_id: Uuid,
        weekday: Weekday,
        hours: OperatingHours,
    ) -> Result<OperatingHours, ClinicError> {
        hours.validate()?;

        let body = json!({
            "clinic_id": clinic_id,
            "weekday": weekday_index(weekday),
            "is_closed": hours.is_closed,
            "opening_time": hours.opening_time,
            "closing_time": hours.closing_time,
            "break_start": hours.break_start,
            "break_end": hours.break_end,
            "updated_at": Utc::now().to_rfc3339(),
        });

        let path = format!("{}?on_conflict=clinic_id,weekday", TABLE_PATH);
        let rows: Vec<OperatingHoursRow> = self
            .supabase
            .request_with_headers(
                Method::POST,
                &path,
                Some(body),
                Some(SupabaseClient::upsert_representation()),
            )
            .await
            .map_err(database_error)?;

        let stored = rows.first().ok_or_else(|| {
            ClinicError::DatabaseError("Upsert returned no operating hours row".to_string())
        })?;
        debug!("Stored {} hours for clinic {}", weekday, clinic_id);
        Ok(stored.hours())
    }

    async fn week(&self, clinic_id: Uuid) -> Result<Vec<DayHours>, ClinicError> {
        let path = format!("{}?clinic_id=eq.{}&order=weekday.asc", TABLE_PATH, clinic_id);
        let rows: Vec<OperatingHoursRow> = self
            .supabase
            .request(Method::GET, &path, None)
            .await
            .map_err(database_error)?;

        Ok(WEEK
            .iter()
            .map(|&weekday| {
                let hours = rows
                    .iter()
                    .find(|row| row.weekday() == Some(weekday))
                    .map(OperatingHoursRow::hours)
                    .unwrap_or_else(OperatingHours::closed);
                DayHours { weekday, hours }
            })
            .inspect(|day| {
                if let Err(e) = day.hours.validate() {
                    warn!("Clinic {} has invalid stored hours for {}: {}", clinic_id, day.weekday, e);
                }
            })
            .collect())
    }
}
