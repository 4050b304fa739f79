//! Forwards email reports to a MISP instance as new events.

use crate::core::{Record, Report, Sink};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{error, info, instrument};

/// Template of the MISP `email` object.
const EMAIL_TEMPLATE_UUID: &str = "a0c666e0-fc65-4be8-b48f-3423d788b552";
const EMAIL_TEMPLATE_VERSION: u32 = 10;

/// A client for the MISP event API.
pub struct MispClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl MispClient {
    pub fn new(base_url: &str, token: String, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Sends a prepared event envelope.
    pub async fn send_event(&self, event: &Value) -> anyhow::Result<()> {
        let url = format!("{}/events", self.base_url);
        let res = self
            .client
            .post(&url)
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json")
            .header(AUTHORIZATION, &self.token)
            .json(event)
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            error!(status = %status, body = %text, "MISP refused the event");
            anyhow::bail!("Failed to create MISP event: status {}, body: {}", status, text);
        }
        Ok(())
    }
}

/// Builds the MISP event envelope for an email report.
///
/// The raw email is attached base64-encoded to an `email` object and the
/// reporting user is recorded in an annotation object.
pub fn build_email_event(report: &Report) -> Value {
    let objects = json!([
        {
            "name": "email",
            "meta-category": "network",
            "description": "Email object describing an email with meta-information",
            "template_uuid": EMAIL_TEMPLATE_UUID,
            "template_version": EMAIL_TEMPLATE_VERSION,
            "Attribute": [
                {
                    "category": "Payload delivery",
                    "type": "attachment",
                    "object_relation": "eml",
                    "value": "Raw Email",
                    "data": STANDARD.encode(report.content.as_bytes()),
                }
            ],
        },
        {
            "name": "annotation",
            "meta-category": "misc",
            "Attribute": [
                {
                    "type": "text",
                    "object_relation": "text",
                    "value": report.user_contact,
                }
            ],
        }
    ]);

    json!({
        "Event": {
            "info": "Suspicious Email Submitter",
            "distribution": 0,
            "threat_level_id": 3,
            "analysis": 1,
            "Object": objects,
        }
    })
}

#[async_trait]
impl Sink for MispClient {
    fn name(&self) -> &str {
        "misp"
    }

    #[instrument(skip(self, record), fields(id = record.id()))]
    async fn deliver(&self, record: &Record) -> anyhow::Result<()> {
        let Record::Report(report) = record else {
            anyhow::bail!("MISP only accepts reports, got a {}", record.kind());
        };
        self.send_event(&build_email_event(report)).await?;
        info!("Created MISP event for report {}", report.uuid);
        Ok(())
    }
}
