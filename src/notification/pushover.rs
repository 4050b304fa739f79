//! A client for sending push notifications through Pushover.

use crate::core::{Record, Sink};
use crate::formatting::{NotificationFormatter, TextFormatter, NOTIFICATION_TITLE};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{error, info, instrument};

/// The public Pushover message endpoint.
pub const PUSHOVER_API_URL: &str = "https://api.pushover.net/1/messages.json";

#[derive(Deserialize)]
struct PushoverResponse {
    status: i64,
    #[serde(default)]
    errors: Vec<String>,
}

/// A client for the Pushover message API.
pub struct PushoverClient {
    client: reqwest::Client,
    api_url: String,
    token: String,
    user: String,
    formatter: Box<dyn TextFormatter>,
}

impl PushoverClient {
    /// Creates a new `PushoverClient` for the given application token and
    /// user key.
    pub fn new(token: String, user: String, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_url: PUSHOVER_API_URL.to_string(),
            token,
            user,
            formatter: Box::new(NotificationFormatter),
        })
    }

    /// Points the client at a different endpoint.
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    /// Sends a single message.
    pub async fn send_message(&self, title: &str, message: &str) -> anyhow::Result<()> {
        let form = [
            ("token", self.token.as_str()),
            ("user", self.user.as_str()),
            ("title", title),
            ("message", message),
        ];

        let res = self
            .client
            .post(&self.api_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "HTTP request to Pushover failed");
                e
            })?;

        let status = res.status();
        let text = res.text().await.unwrap_or_default();
        if !status.is_success() {
            error!(status = %status, body = %text, "Failed to send Pushover notification");
            anyhow::bail!(
                "Failed to send Pushover notification: status {}, body: {}",
                status,
                text
            );
        }

        match serde_json::from_str::<PushoverResponse>(&text) {
            Ok(body) if body.status == 1 => Ok(()),
            Ok(body) => anyhow::bail!(
                "Pushover rejected the notification: {}",
                body.errors.join(", ")
            ),
            Err(e) => anyhow::bail!("Unexpected response from Pushover: {} ({})", text, e),
        }
    }
}

#[async_trait]
impl Sink for PushoverClient {
    fn name(&self) -> &str {
        "pushover"
    }

    #[instrument(skip(self, record), fields(id = record.id()))]
    async fn deliver(&self, record: &Record) -> anyhow::Result<()> {
        let message = self.formatter.format_record(record);
        self.send_message(NOTIFICATION_TITLE, &message).await?;
        info!("Sent Pushover notification for {}", record.kind());
        Ok(())
    }
}
