//! Core domain types and service traits for pdtools
//!
//! This module defines the records fetched from a PhishDetect Node, the
//! indicator types submitted to it, and the trait contracts that the poller,
//! the submission and the sync commands are written against.

use crate::node::NodeError;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// An alert raised by the node when a monitored indicator was matched.
///
/// Older nodes call these "events".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Alert {
    pub uuid: String,
    /// The kind of content that triggered the alert (e.g. "domain", "email").
    #[serde(rename = "type", default)]
    pub alert_type: String,
    /// The matched indicator or URL.
    #[serde(rename = "match", default)]
    pub matched: String,
    #[serde(default)]
    pub user_contact: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datetime: Option<String>,
}

/// An artifact (e.g. a suspicious email) shared with the node by a user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Report {
    pub uuid: String,
    #[serde(rename = "type", default)]
    pub report_type: String,
    /// Raw content of the report, e.g. the full email source.
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub user_contact: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datetime: Option<String>,
}

/// A pending request for a node account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PendingUser {
    pub key: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
}

/// The record kinds the poller knows how to track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Alert,
    Report,
    UserRequest,
}

impl RecordKind {
    /// File name of the seen-set that tracks this kind.
    pub fn seen_file_name(&self) -> &'static str {
        match self {
            RecordKind::Alert => "alerts",
            RecordKind::Report => "reports",
            RecordKind::UserRequest => "users",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecordKind::Alert => "alert",
            RecordKind::Report => "report",
            RecordKind::UserRequest => "user request",
        };
        f.write_str(name)
    }
}

/// A record fetched from the node. Immutable once fetched.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Alert(Alert),
    Report(Report),
    UserRequest(PendingUser),
}

impl Record {
    /// The identifier used for deduplication.
    pub fn id(&self) -> &str {
        match self {
            Record::Alert(alert) => &alert.uuid,
            Record::Report(report) => &report.uuid,
            Record::UserRequest(user) => &user.key,
        }
    }

    pub fn kind(&self) -> RecordKind {
        match self {
            Record::Alert(_) => RecordKind::Alert,
            Record::Report(_) => RecordKind::Report,
            Record::UserRequest(_) => RecordKind::UserRequest,
        }
    }
}

/// Describes one fetch against the node.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub kind: RecordKind,
    /// Optional paging window. `None` fetches the node's default page.
    pub page: Option<Page>,
    /// Restricts reports to a given type (e.g. "email").
    pub report_type: Option<String>,
}

impl FetchRequest {
    pub fn new(kind: RecordKind) -> Self {
        Self {
            kind,
            page: None,
            report_type: None,
        }
    }

    pub fn paged(mut self, limit: usize) -> Self {
        self.page = Some(Page { limit, offset: 0 });
        self
    }

    pub fn with_report_type(mut self, report_type: impl Into<String>) -> Self {
        self.report_type = Some(report_type.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: usize,
    pub offset: usize,
}

// =============================================================================
// Indicators
// =============================================================================

/// The type of an indicator of compromise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndicatorKind {
    Domain,
    Email,
}

impl IndicatorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndicatorKind::Domain => "domain",
            IndicatorKind::Email => "email",
        }
    }
}

impl fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndicatorKind {
    type Err = String;

    /// Accepts both the singular and the plural form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().trim_end_matches('s') {
            "domain" => Ok(IndicatorKind::Domain),
            "email" => Ok(IndicatorKind::Email),
            other => Err(format!("unknown indicator type \"{}\"", other)),
        }
    }
}

/// Indicators grouped by plural kind name, as listed by the node.
///
/// Keys are kept as strings so that kinds a newer node knows about are
/// carried through instead of rejected.
pub type IndicatorSet = BTreeMap<String, Vec<String>>;

/// A batch of indicators to add to a node.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct IndicatorSubmission {
    #[serde(rename = "type")]
    pub kind: String,
    pub indicators: Vec<String>,
    pub tags: Vec<String>,
    pub enabled: bool,
}

// =============================================================================
// Service Traits
// =============================================================================

/// The subset of the PhishDetect Node API used by the commands.
#[async_trait]
pub trait NodeApi: Send + Sync {
    /// Fetches a collection of records of the requested kind.
    ///
    /// # Returns
    /// * `Ok(records)`, possibly empty when there is nothing to report
    /// * `Err` on transport failures, non-success statuses, explicit API
    ///   errors or undecodable bodies
    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<Record>, NodeError>;

    /// Fetches the active indicators, or only the recent ones.
    async fn fetch_indicators(&self, recent: bool) -> Result<IndicatorSet, NodeError>;

    /// Adds a batch of indicators and returns the node's message.
    async fn add_indicators(&self, submission: &IndicatorSubmission)
        -> Result<String, NodeError>;
}

/// Performs the side effect for a newly seen record.
#[async_trait]
pub trait Sink: Send + Sync {
    /// A short name for the sink (e.g. "pushover", "misp"), used in logs.
    fn name(&self) -> &str;

    /// Delivers a record to the destination.
    ///
    /// # Returns
    /// * `Ok(())` if the destination accepted the record
    /// * `Err` if delivery failed or the record kind is not supported
    async fn deliver(&self, record: &Record) -> Result<()>;
}
