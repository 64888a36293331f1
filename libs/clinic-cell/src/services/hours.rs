// libs/clinic-cell/src/services/hours.rs
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Weekday;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{ClinicError, DayHours, OperatingHours, WEEK};

/// Per-clinic, per-weekday operating hours.
///
/// Every method takes the clinic id explicitly; there is no ambient tenant.
#[async_trait]
pub trait OperatingHoursStore: Send + Sync {
    /// The stored record, if any.
    async fn find(&self, clinic_id: Uuid, weekday: Weekday) -> Result<Option<OperatingHours>, ClinicError>;

    /// Validates and overwrites the record for one weekday.
    async fn set(
        &self,
        clinic_id: Uuid,
        weekday: Weekday,
        hours: OperatingHours,
    ) -> Result<OperatingHours, ClinicError>;

    /// Hours for a weekday. A missing record reads as closed.
    async fn get(&self, clinic_id: Uuid, weekday: Weekday) -> Result<OperatingHours, ClinicError> {
        Ok(self
            .find(clinic_id, weekday)
            .await?
            .unwrap_or_else(OperatingHours::closed))
    }

    async fn week(&self, clinic_id: Uuid) -> Result<Vec<DayHours>, ClinicError> {
        let mut days = Vec::with_capacity(WEEK.len());
        for weekday in WEEK {
            days.push(DayHours {
                weekday,
                hours: self.get(clinic_id, weekday).await?,
            });
        }
        Ok(days)
    }

    /// Onboarding: writes the template for weekdays that have no record yet.
    /// Returns the resulting full week.
    async fn seed_defaults(
        &self,
        clinic_id: Uuid,
        template: &[DayHours],
    ) -> Result<Vec<DayHours>, ClinicError> {
        validate_template(template)?;

        for day in template {
            if self.find(clinic_id, day.weekday).await?.is_none() {
                self.set(clinic_id, day.weekday, day.hours).await?;
            } else {
                debug!(
                    "Clinic {} already has hours for {}, keeping them",
                    clinic_id, day.weekday
                );
            }
        }

        info!("Seeded operating hours for clinic {}", clinic_id);
        self.week(clinic_id).await
    }
}

/// Every day valid and no weekday listed twice.
pub fn validate_template(template: &[DayHours]) -> Result<(), ClinicError> {
    for (index, day) in template.iter().enumerate() {
        day.hours.validate()?;
        if template[..index].iter().any(|earlier| earlier.weekday == day.weekday) {
            return Err(ClinicError::InvalidHours(format!(
                "{} is listed more than once",
                day.weekday
            )));
        }
    }
    Ok(())
}

#[derive(Default)]
pub struct InMemoryOperatingHoursStore {
    hours: RwLock<HashMap<(Uuid, Weekday), OperatingHours>>,
}

impl InMemoryOperatingHoursStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OperatingHoursStore for InMemoryOperatingHoursStore {
    async fn find(&self, clinic_id: Uuid, weekday: Weekday) -> Result<Option<OperatingHours>, ClinicError> {
        Ok(self.hours.read().await.get(&(clinic_id, weekday)).copied())
    }

    async fn set(
        &self,
        clinic_id: Uuid,
        weekday: Weekday,
        hours: OperatingHours,
    ) -> Result<OperatingHours, ClinicError> {
        hours.validate()?;
        self.hours.write().await.insert((clinic_id, weekday), hours);
        debug!("Updated {} hours for clinic {}", weekday, clinic_id);
        Ok(hours)
    }
}
