use crate::domain::errors::NotificationError;
use crate::domain::notification::{Notification, Severity};
use crate::domain::ports::Notifier;
use crate::infrastructure::core::http_client_factory::HttpClientFactory;
use crate::infrastructure::observability::Metrics;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const FOOTER: &str = "Automated Optimization Pipeline";

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    embeds: [Embed<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Embed<'a> {
    title: &'a str,
    description: &'a str,
    color: u32,
    timestamp: String,
    footer: Footer,
}

#[derive(Debug, Serialize)]
struct Footer {
    text: &'static str,
}

/// Discord-style webhook notifier.
///
/// Every message is logged locally. Without a webhook URL nothing is sent.
/// Delivery failures are logged and counted, never returned.
pub struct WebhookNotifier {
    webhook_url: Option<String>,
    client: Client,
    metrics: Option<Metrics>,
}

impl WebhookNotifier {
    pub fn new(webhook_url: Option<String>, timeout: Duration) -> Self {
        Self {
            webhook_url,
            client: HttpClientFactory::create_plain_client(timeout),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.webhook_url.is_some()
    }

    async fn deliver(&self, url: &str, notification: &Notification) -> Result<(), NotificationError> {
        let payload = WebhookPayload {
            embeds: [Embed {
                title: &notification.title,
                description: &notification.description,
                color: notification.severity.color(),
                timestamp: chrono::Utc::now().to_rfc3339(),
                footer: Footer { text: FOOTER },
            }],
        };

        let response = self
            .client
            .post(url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotificationError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotificationError::Status {
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, notification: Notification) {
        match notification.severity {
            Severity::Error => error!("[notify] {}: {}", notification.title, notification.description),
            Severity::Warning => warn!("[notify] {}: {}", notification.title, notification.description),
            _ => info!("[notify] {}: {}", notification.title, notification.description),
        }

        let Some(url) = self.webhook_url.as_deref() else {
            debug!("No webhook configured, notification logged only");
            return;
        };

        if let Err(e) = self.deliver(url, &notification).await {
            warn!("Failed to deliver notification '{}': {}", notification.title, e);
            if let Some(metrics) = &self.metrics {
                metrics.notification_failures_total.inc();
            }
        }
    }
}
