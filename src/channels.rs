//! Notification channel senders.
//!
//! Senders are fire-and-forget collaborators: the dispatcher bounds every
//! call with a timeout and turns any error into a failed delivery record.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::models::Channel;

#[derive(Debug, Error)]
pub enum ChannelError {
    // ---
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("channel rejected the message with status {0}")]
    Rejected(u16),
}

#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn send(&self, recipient: &str, message: &str) -> Result<(), ChannelError>;
}

// ---

/// Simulated sender: the message is only written to the log.
#[derive(Debug, Clone)]
pub struct LogChannel {
    channel: Channel,
}

impl LogChannel {
    pub fn new(channel: Channel) -> Self {
        LogChannel { channel }
    }
}

#[async_trait]
impl NotificationChannel for LogChannel {
    async fn send(&self, recipient: &str, message: &str) -> Result<(), ChannelError> {
        // ---
        tracing::info!(channel = %self.channel, recipient, "Notification: {}", message);
        Ok(())
    }
}

// ---

#[derive(Serialize)]
struct WebhookPayload<'a> {
    channel: Channel,
    recipient: &'a str,
    message: &'a str,
}

/// Posts each notification as JSON to an HTTP gateway (SMS relay, mail
/// relay, display controller).
#[derive(Debug, Clone)]
pub struct WebhookChannel {
    // ---
    channel: Channel,
    url: String,
    client: reqwest::Client,
}

impl WebhookChannel {
    pub fn new(channel: Channel, url: impl Into<String>) -> Self {
        // ---
        WebhookChannel {
            channel,
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    async fn send(&self, recipient: &str, message: &str) -> Result<(), ChannelError> {
        // ---
        let payload = WebhookPayload {
            channel: self.channel,
            recipient,
            message,
        };

        tracing::debug!("POST {} ({} -> {})", self.url, self.channel, recipient);

        let response = self.client.post(&self.url).json(&payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ChannelError::Rejected(status.as_u16()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[tokio::test]
    async fn test_log_channel_always_succeeds() {
        // ---
        let channel = LogChannel::new(Channel::Sms);
        assert!(channel.send("+254700000000", "hello").await.is_ok());
    }

    #[tokio::test]
    async fn test_webhook_channel_unreachable_is_http_error() {
        // ---
        // Port 9 (discard) on localhost is not expected to accept HTTP.
        let channel = WebhookChannel::new(Channel::Email, "http://127.0.0.1:9/notify");
        let result = channel.send("admin@uon.ac.ke", "hello").await;
        assert!(matches!(result, Err(ChannelError::Http(_))));
    }

    #[test]
    fn test_webhook_payload_shape() {
        // ---
        let payload = WebhookPayload {
            channel: Channel::Screen,
            recipient: "Main Lab Screen",
            message: "Noise",
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["channel"], "SCREEN");
        assert_eq!(json["recipient"], "Main Lab Screen");
    }
}
