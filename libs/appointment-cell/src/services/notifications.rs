// libs/appointment-cell/src/services/notifications.rs
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::models::Appointment;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentEvent {
    Booked,
    Confirmed,
    Rescheduled,
    Cancelled,
    Completed,
    NoShow,
    Disputed,
}

/// Receives committed lifecycle changes. Failures never roll back the commit.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, event: AppointmentEvent, appointment: &Appointment);
}

/// Logs every event as a structured tracing record.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotificationSink;

#[async_trait]
impl NotificationSink for TracingNotificationSink {
    async fn notify(&self, event: AppointmentEvent, appointment: &Appointment) {
        info!(
            event = ?event,
            appointment_id = %appointment.id,
            clinic_id = %appointment.clinic_id,
            status = %appointment.status,
            scheduled_at = %appointment.scheduled_at,
            "appointment event"
        );
    }
}

/// POSTs each event as JSON to a webhook, off the request path.
#[derive(Clone)]
pub struct WebhookNotificationSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotificationSink {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }

    /// Sends one event and waits for the response.
    pub async fn deliver(&self, event: AppointmentEvent, appointment: &Appointment) -> anyhow::Result<()> {
        let body = json!({
            "event": event,
            "appointment": appointment,
            "sent_at": Utc::now().to_rfc3339(),
        });

        let response = self.client.post(&self.url).json(&body).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("Webhook responded with {}", response.status());
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationSink for WebhookNotificationSink {
    async fn notify(&self, event: AppointmentEvent, appointment: &Appointment) {
        let sink = self.clone();
        let appointment = appointment.clone();
        tokio::spawn(async move {
            if let Err(e) = sink.deliver(event, &appointment).await {
                warn!("Failed to deliver {:?} for appointment {}: {}", event, appointment.id, e);
            }
        });
    }
}

/// Forwards each event to every inner sink in order.
#[derive(Clone, Default)]
pub struct FanoutNotificationSink {
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl FanoutNotificationSink {
    pub fn new(sinks: Vec<Arc<dyn NotificationSink>>) -> Self {
        Self { sinks }
    }

    pub fn with(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[async_trait]
impl NotificationSink for FanoutNotificationSink {
    async fn notify(&self, event: AppointmentEvent, appointment: &Appointment) {
        for sink in &self.sinks {
            sink.notify(event, appointment).await;
        }
    }
}
