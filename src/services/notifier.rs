//! Best-effort outbound notifications
//!
//! Events are handed to a spawned task after the ledger transaction has
//! committed. A failed or slow notifier never affects the booking result.

use crate::config::NotificationConfig;
use async_trait::async_trait;
use entity::sea_orm_active_enums::PaymentStatus;
use serde::Serialize;
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StudioEvent {
    BookingConfirmed {
        booking_id: Uuid,
        class_id: Uuid,
        user_id: Option<Uuid>,
        guest_contact: Option<String>,
    },
    BookingCancelled {
        booking_id: Uuid,
        class_id: Uuid,
        user_id: Option<Uuid>,
        credit_refunded: bool,
    },
    SlipUploaded {
        booking_id: Uuid,
        user_id: Option<Uuid>,
    },
    PaymentApproved {
        booking_id: Uuid,
        user_id: Option<Uuid>,
        payment_status: PaymentStatus,
        amount_paid: i64,
    },
    PaymentRejected {
        booking_id: Uuid,
        user_id: Option<Uuid>,
        reason: Option<String>,
    },
}

impl StudioEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::BookingConfirmed { .. } => "booking_confirmed",
            Self::BookingCancelled { .. } => "booking_cancelled",
            Self::SlipUploaded { .. } => "slip_uploaded",
            Self::PaymentApproved { .. } => "payment_approved",
            Self::PaymentRejected { .. } => "payment_rejected",
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &StudioEvent) -> anyhow::Result<()>;
}

/// Fire-and-forget delivery on the runtime
pub fn dispatch(notifier: Arc<dyn Notifier>, event: StudioEvent) {
    tokio::spawn(async move {
        if let Err(e) = notifier.notify(&event).await {
            warn!(event = event.name(), "Notification delivery failed: {:#}", e);
        }
    });
}

/// Logs events; used when no webhook is configured
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &StudioEvent) -> anyhow::Result<()> {
        info!(event = event.name(), payload = ?event, "Studio notification");
        Ok(())
    }
}

/// POSTs events as JSON to the email/SMS relay
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, event: &StudioEvent) -> anyhow::Result<()> {
        let response = self.client.post(&self.url).json(event).send().await?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("webhook returned {}", status.as_u16());
        }
        info!(event = event.name(), "Notification delivered");
        Ok(())
    }
}

/// Pick the notifier the configuration asks for
pub fn from_config(config: &NotificationConfig) -> anyhow::Result<Arc<dyn Notifier>> {
    match config.webhook_url.as_deref() {
        Some(url) if !url.is_empty() => {
            let timeout = Duration::from_millis(config.webhook_timeout_ms.unwrap_or(3_000));
            Ok(Arc::new(WebhookNotifier::new(url, timeout)?))
        }
        _ => Ok(Arc::new(LogNotifier)),
    }
}
