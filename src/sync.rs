//! One-shot synchronization of indicators from one node to another.

use crate::core::{IndicatorSet, IndicatorSubmission, NodeApi};
use crate::node::NodeError;
use itertools::Itertools;
use reqwest::Url;
use std::collections::HashSet;
use std::fmt;
use tracing::{error, info};

/// Default number of indicators per `add` call.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Options for a single sync run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// Only take the source node's recent indicators.
    pub recent: bool,
    /// Submit the indicators as enabled on the target.
    pub enabled: bool,
    pub tags: Vec<String>,
    pub batch_size: usize,
}

/// Builds the tag list for synced indicators.
///
/// Explicit tags are trimmed, lowercased and de-duplicated. Without them a
/// single tag naming the source node (host and explicit port) is used.
pub fn generate_tags(tags: Option<&str>, source_node: &str) -> Vec<String> {
    match tags.filter(|t| !t.trim().is_empty()) {
        Some(tags) => tags
            .split(',')
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .unique()
            .collect(),
        None => vec![node_tag(source_node)],
    }
}

fn node_tag(source_node: &str) -> String {
    let host = match Url::parse(source_node) {
        Ok(url) => match url.host_str() {
            Some(host) => host.to_string(),
            None => return source_node.to_string(),
        },
        Err(_) => return source_node.to_string(),
    };

    // Url drops a port equal to the scheme default, so read it from the
    // authority as typed.
    let authority = source_node
        .split_once("://")
        .map_or("", |(_, rest)| rest)
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();
    let authority = authority.rsplit('@').next().unwrap_or_default();
    match authority.rsplit_once(':') {
        Some((_, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => {
            format!("{}:{}", host, port)
        }
        _ => host,
    }
}

/// Indicators present in `source` but not yet in `target`, per kind.
///
/// Source order is preserved. Kinds without new indicators are kept with an
/// empty list so they can still be reported.
pub fn filter_new(source: &IndicatorSet, target: &IndicatorSet) -> IndicatorSet {
    source
        .iter()
        .map(|(kind, values)| {
            let existing: HashSet<&str> = target
                .get(kind)
                .map(|v| v.iter().map(String::as_str).collect())
                .unwrap_or_default();
            let fresh = values
                .iter()
                .filter(|v| !existing.contains(v.as_str()))
                .cloned()
                .collect();
            (kind.clone(), fresh)
        })
        .collect()
}

/// Turns the plural listing key into the singular type `add` expects.
pub fn singular_kind(kind: &str) -> &str {
    kind.trim_end_matches('s')
}

/// Counters for a single indicator kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KindSummary {
    pub kind: String,
    /// Indicators fetched from the source.
    pub processed: usize,
    /// Indicators not already on the target.
    pub filtered: usize,
    /// Indicators the target accepted.
    pub submitted: usize,
    pub failed_batches: usize,
}

impl fmt::Display for KindSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: processed {} / filtered {} / submitted {}",
            self.kind, self.processed, self.filtered, self.submitted
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub kinds: Vec<KindSummary>,
}

impl SyncReport {
    pub fn get(&self, kind: &str) -> Option<&KindSummary> {
        self.kinds.iter().find(|k| k.kind == kind)
    }

    pub fn has_failures(&self) -> bool {
        self.kinds.iter().any(|k| k.failed_batches > 0)
    }
}

/// Copies indicators missing from `target` over from `source`.
///
/// Fetch failures on either node abort the run since there is nothing to
/// compare. A failed batch is logged and the remaining batches still go out.
pub async fn sync_nodes(
    source: &dyn NodeApi,
    target: &dyn NodeApi,
    options: &SyncOptions,
) -> Result<SyncReport, NodeError> {
    if options.recent {
        info!("Fetching the list of recent indicators from source node...");
    } else {
        info!("Fetching the full list of active indicators from the source node...");
    }
    let source_iocs = source.fetch_indicators(options.recent).await?;

    info!("Fetching the current list of indicators from the target node...");
    let current_iocs = target.fetch_indicators(false).await?;

    let filtered = filter_new(&source_iocs, &current_iocs);
    let batch_size = options.batch_size.max(1);
    let mut report = SyncReport::default();

    for (kind, fresh) in &filtered {
        let mut summary = KindSummary {
            kind: kind.clone(),
            processed: source_iocs.get(kind).map_or(0, Vec::len),
            filtered: fresh.len(),
            ..Default::default()
        };

        if fresh.is_empty() {
            println!("No new indicators of type {} to add. Skip.", kind);
            report.kinds.push(summary);
            continue;
        }

        println!(
            "From a list of {} of type {} submitting a filtered list of {}...",
            summary.processed, kind, summary.filtered
        );

        for batch in fresh.chunks(batch_size) {
            let submission = IndicatorSubmission {
                kind: singular_kind(kind).to_string(),
                indicators: batch.to_vec(),
                tags: options.tags.clone(),
                enabled: options.enabled,
            };
            match target.add_indicators(&submission).await {
                Ok(msg) => {
                    println!("{}", msg);
                    summary.submitted += batch.len();
                }
                Err(e) => {
                    error!(%kind, size = batch.len(), "Failed to add indicators to target node: {}", e);
                    summary.failed_batches += 1;
                }
            }
        }

        report.kinds.push(summary);
    }

    Ok(report)
}
