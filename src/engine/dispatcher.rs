//! Alert fan-out: one [`AlertEvent`] becomes one [`AlertDelivery`] per
//! configured channel.
//!
//! Sends run concurrently on spawned tasks, each bounded by a fixed timeout.
//! A failing or slow channel only ever produces a `Failed` / `TimedOut`
//! record; it never aborts the other channels or reading processing.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::channels::{LogChannel, NotificationChannel};
use crate::models::{AlertDelivery, AlertEvent, Channel, DeliveryStatus, SystemConfig};

pub const DEFAULT_SCREEN_TARGET: &str = "Main Lab Screen";
pub const DEFAULT_CHANNEL_TIMEOUT: Duration = Duration::from_secs(2);

pub struct AlertDispatcher {
    // ---
    senders: HashMap<Channel, Arc<dyn NotificationChannel>>,
    screen_target: String,
    timeout: Duration,
}

impl Default for AlertDispatcher {
    fn default() -> Self {
        Self::new(DEFAULT_SCREEN_TARGET, DEFAULT_CHANNEL_TIMEOUT)
    }
}

impl AlertDispatcher {
    // ---
    /// Every configured channel starts with a log-only sender.
    pub fn new(screen_target: impl Into<String>, timeout: Duration) -> Self {
        // ---
        let senders = [Channel::Sms, Channel::Email, Channel::Screen]
            .into_iter()
            .map(|c| (c, Arc::new(LogChannel::new(c)) as Arc<dyn NotificationChannel>))
            .collect();

        AlertDispatcher {
            senders,
            screen_target: screen_target.into(),
            timeout,
        }
    }

    pub fn with_sender(mut self, channel: Channel, sender: Arc<dyn NotificationChannel>) -> Self {
        self.senders.insert(channel, sender);
        self
    }

    /// Statically configured channels and their recipients.
    pub fn targets(&self, config: &SystemConfig) -> Vec<(Channel, String)> {
        // ---
        vec![
            (Channel::Sms, config.guard_phone.clone()),
            (Channel::Email, config.admin_email.clone()),
            (Channel::Screen, self.screen_target.clone()),
        ]
    }

    /// Attempt delivery of a recorded `event` on every target.
    ///
    /// Returns exactly one delivery record per target, in target order.
    /// Persisting them is the caller's job.
    pub async fn deliver(
        &self,
        event: &AlertEvent,
        config: &SystemConfig,
        now: DateTime<Utc>,
    ) -> Vec<AlertDelivery> {
        // ---
        let (kind, severity) = (event.kind, event.severity);
        let targets = self.targets(config);
        let mut pending = Vec::with_capacity(targets.len());

        for (channel, recipient) in targets {
            let sender = self.senders.get(&channel).cloned();
            let timeout = self.timeout;
            let text = event.message.clone();
            let to = recipient.clone();

            let handle = tokio::spawn(async move {
                // ---
                let Some(sender) = sender else {
                    return (DeliveryStatus::Failed, Some("no sender configured".to_string()));
                };
                match tokio::time::timeout(timeout, sender.send(&to, &text)).await {
                    Ok(Ok(())) => (DeliveryStatus::Sent, None),
                    Ok(Err(e)) => (DeliveryStatus::Failed, Some(e.to_string())),
                    Err(_) => (
                        DeliveryStatus::TimedOut,
                        Some(format!("no response within {} ms", timeout.as_millis())),
                    ),
                }
            });
            pending.push((channel, recipient, handle));
        }

        let mut deliveries = Vec::with_capacity(pending.len());
        for (channel, recipient, handle) in pending {
            let (status, detail) = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => (DeliveryStatus::Failed, Some(format!("send task failed: {}", e))),
            };

            match status {
                DeliveryStatus::Sent => {
                    tracing::info!("{} alert sent via {} to {}", kind, channel, recipient)
                }
                _ => tracing::warn!(
                    "{} alert via {} to {} {}: {}",
                    kind,
                    channel,
                    recipient,
                    status,
                    detail.as_deref().unwrap_or("unknown error")
                ),
            }

            deliveries.push(AlertDelivery {
                id: Uuid::new_v4(),
                alert_id: event.id,
                channel,
                recipient,
                message: event.message.clone(),
                severity,
                status,
                detail,
                attempted_at: now,
            });
        }

        deliveries
    }
}
