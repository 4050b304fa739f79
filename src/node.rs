//! HTTP client for the PhishDetect Node API.
//!
//! Every endpoint answers either with the requested payload or with a JSON
//! object carrying an `error` key. Both shapes are decoded here so that
//! callers only ever see typed records or a [`NodeError`].

use crate::core::{
    Alert, FetchRequest, IndicatorSet, IndicatorSubmission, NodeApi, PendingUser, Record,
    RecordKind, Report,
};
use async_trait::async_trait;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Error, Debug)]
pub enum NodeError {
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("node returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("node reported an error: {0}")]
    Api(String),
    #[error("malformed response from node: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid request: {0}")]
    Request(String),
}

impl NodeError {
    /// Whether the failure is transient and the caller may simply try again
    /// on the next cycle.
    ///
    /// `Request` errors stem from bad configuration (e.g. an unusable base
    /// URL) and will fail the same way every time.
    pub fn is_continuable(&self) -> bool {
        !matches!(self, NodeError::Request(_))
    }
}

/// Client for a single PhishDetect Node.
#[derive(Debug, Clone)]
pub struct NodeClient {
    client: reqwest::Client,
    base_url: Url,
    api_key: Option<String>,
}

impl NodeClient {
    /// Creates a client for the node at `base_url`.
    ///
    /// The API key is optional because public nodes serve indicators
    /// without one.
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, NodeError> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| NodeError::Request(format!("invalid node URL \"{}\": {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(NodeError::Request(format!(
                "node URL \"{}\" cannot be used as a base",
                base_url
            )));
        }
        // Url::join would otherwise drop the last path segment.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("pdtools/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| NodeError::Request(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            api_key: api_key.filter(|k| !k.is_empty()),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, NodeError> {
        let mut url = self
            .base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| NodeError::Request(e.to_string()))?;
        if let Some(key) = &self.api_key {
            url.query_pairs_mut().append_pair("key", key);
        }
        Ok(url)
    }

    async fn get(&self, url: Url) -> Result<Value, NodeError> {
        debug!(path = url.path(), "GET");
        let response = self.client.get(url).send().await?;
        Self::decode(response).await
    }

    async fn post<T: serde::Serialize + ?Sized>(
        &self,
        url: Url,
        body: &T,
    ) -> Result<Value, NodeError> {
        debug!(path = url.path(), "POST");
        let response = self.client.post(url).json(body).send().await?;
        Self::decode(response).await
    }

    /// Turns a raw response into a JSON value, surfacing explicit node errors.
    async fn decode(response: reqwest::Response) -> Result<Value, NodeError> {
        let status = response.status();
        let body = response.text().await?;

        let value = match serde_json::from_str::<Value>(&body) {
            Ok(value) => value,
            Err(e) if status.is_success() => return Err(NodeError::Decode(e)),
            Err(_) => {
                return Err(NodeError::Status {
                    status: status.as_u16(),
                    body,
                })
            }
        };

        if let Some(message) = value.get("error") {
            let message = match message {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            return Err(NodeError::Api(message));
        }

        if !status.is_success() {
            return Err(NodeError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(value)
    }
}

/// Decodes a JSON list into records, treating `null` as an empty list.
fn records_from<T, F>(value: Value, wrap: F) -> Result<Vec<Record>, NodeError>
where
    T: DeserializeOwned,
    F: Fn(T) -> Record,
{
    if value.is_null() {
        return Ok(Vec::new());
    }
    let items: Vec<T> = serde_json::from_value(value)?;
    Ok(items.into_iter().map(wrap).collect())
}

#[async_trait]
impl NodeApi for NodeClient {
    #[instrument(skip(self), fields(kind = %request.kind))]
    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<Record>, NodeError> {
        let path = match request.kind {
            RecordKind::Alert => "api/alerts/fetch/",
            RecordKind::Report => "api/reports/fetch/",
            RecordKind::UserRequest => "api/users/pending/",
        };
        let mut url = self.endpoint(path)?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(page) = request.page {
                query.append_pair("limit", &page.limit.to_string());
                query.append_pair("offset", &page.offset.to_string());
            }
            if let Some(report_type) = &request.report_type {
                query.append_pair("type", report_type);
            }
        }
        // Drop a dangling '?' when no parameters were appended.
        if url.query() == Some("") {
            url.set_query(None);
        }

        let value = self.get(url).await?;
        match request.kind {
            RecordKind::Alert => records_from::<Alert, _>(value, Record::Alert),
            RecordKind::Report => records_from::<Report, _>(value, Record::Report),
            RecordKind::UserRequest => records_from::<PendingUser, _>(value, Record::UserRequest),
        }
    }

    #[instrument(skip(self))]
    async fn fetch_indicators(&self, recent: bool) -> Result<IndicatorSet, NodeError> {
        let path = if recent {
            "api/indicators/fetch/recent/"
        } else {
            "api/indicators/fetch/"
        };
        let value = self.get(self.endpoint(path)?).await?;
        if value.is_null() {
            return Ok(IndicatorSet::new());
        }
        let raw: BTreeMap<String, Option<Vec<String>>> = serde_json::from_value(value)?;
        Ok(raw
            .into_iter()
            .map(|(kind, values)| (kind, values.unwrap_or_default()))
            .collect())
    }

    #[instrument(skip(self, submission), fields(kind = %submission.kind, count = submission.indicators.len()))]
    async fn add_indicators(
        &self,
        submission: &IndicatorSubmission,
    ) -> Result<String, NodeError> {
        let value = self
            .post(self.endpoint("api/indicators/add/")?, submission)
            .await?;
        Ok(match value.get("msg") {
            Some(Value::String(msg)) => msg.clone(),
            _ => value.to_string(),
        })
    }
}
