use anyhow::{Context, Result};
use reqwest::Client;

use super::{AlertEvent, Notifier};

/// Secondary alert channel: JSON POST to a logging/paging webhook.
pub struct WebhookNotifier {
    url: String,
    client: Client,
}

impl WebhookNotifier {
    pub fn from_env() -> Option<Self> {
        let url = std::env::var("ALERT_WEBHOOK_URL").ok()?;
        Some(Self::new(url))
    }

    pub fn new(url: String) -> Self {
        Self {
            url,
            client: Client::new(),
        }
    }
}

#[async_trait::async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, ev: &AlertEvent) -> Result<()> {
        let body = serde_json::json!({
            "subject": ev.subject,
            "body": ev.body,
            "severity": ev.severity.as_str(),
            "user_id": ev.user_id,
            "timestamp": ev.ts.to_rfc3339(),
        });

        self.client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .context("webhook post")?
            .error_for_status()
            .context("webhook non-2xx")?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "webhook"
    }
}
