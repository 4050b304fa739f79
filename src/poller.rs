//! The seen-set poller.
//!
//! Each cycle fetches every tracked record kind from the node, hands records
//! that are not in the kind's seen-set to the sink and records their
//! identifiers. Cycles repeat after a fixed delay until the shutdown channel
//! fires.

use crate::core::{FetchRequest, NodeApi, Record, RecordKind, Sink};
use crate::node::NodeError;
use crate::storage::{SeenStore, StorageError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

/// What to do with a record whose delivery failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum DeliveryPolicy {
    /// Mark the record as seen anyway. A failed delivery is never retried.
    #[default]
    AtMostOnce,
    /// Leave the record unseen so the next cycle delivers it again.
    AtLeastOnce,
}

#[derive(Error, Debug)]
pub enum PollError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("unrecoverable node error: {0}")]
    Node(NodeError),
}

/// The result of handling a single fetched record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    AlreadySeen,
    Delivered,
    /// Delivery failed and the record was marked seen regardless.
    Dropped,
    /// Delivery failed and the record stays unseen.
    Pending,
}

/// Delivers `record` unless it was seen before, then records it according
/// to `policy`.
pub async fn process(
    record: &Record,
    store: &mut dyn SeenStore,
    sink: &dyn Sink,
    policy: DeliveryPolicy,
) -> Result<Outcome, StorageError> {
    let id = record.id();
    if store.contains(id) {
        return Ok(Outcome::AlreadySeen);
    }

    info!("Got a new {} with ID {}", record.kind(), id);
    let outcome = match sink.deliver(record).await {
        Ok(()) => Outcome::Delivered,
        Err(e) => {
            error!(sink = sink.name(), "Failed to deliver {} {}: {:#}", record.kind(), id, e);
            match policy {
                DeliveryPolicy::AtMostOnce => Outcome::Dropped,
                DeliveryPolicy::AtLeastOnce => Outcome::Pending,
            }
        }
    };

    if outcome != Outcome::Pending {
        store.record_seen(id).await?;
    }
    Ok(outcome)
}

/// Per-kind counters for a single cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindReport {
    pub kind: RecordKind,
    pub fetched: usize,
    pub delivered: usize,
    pub dropped: usize,
    pub pending: usize,
    /// Set when the fetch failed with a continuable error.
    pub error: Option<String>,
}

impl KindReport {
    fn new(kind: RecordKind) -> Self {
        Self {
            kind,
            fetched: 0,
            delivered: 0,
            dropped: 0,
            pending: 0,
            error: None,
        }
    }

    /// Records that were not in the seen-set.
    pub fn new_records(&self) -> usize {
        self.delivered + self.dropped + self.pending
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub kinds: Vec<KindReport>,
}

impl CycleReport {
    pub fn get(&self, kind: RecordKind) -> Option<&KindReport> {
        self.kinds.iter().find(|k| k.kind == kind)
    }
}

/// A record kind tracked by the poller, with its own seen-set.
pub struct Tracked {
    request: FetchRequest,
    store: Box<dyn SeenStore>,
    /// Records whose delivery failed under `AtLeastOnce`, attempted again
    /// on every cycle until they settle.
    retry: Vec<Record>,
}

impl Tracked {
    pub fn new(request: FetchRequest, store: Box<dyn SeenStore>) -> Self {
        Self {
            request,
            store,
            retry: Vec::new(),
        }
    }

    pub fn pending(&self) -> &[Record] {
        &self.retry
    }

    pub fn request(&self) -> &FetchRequest {
        &self.request
    }

    pub fn store(&self) -> &dyn SeenStore {
        self.store.as_ref()
    }
}

pub struct Poller {
    node: Arc<dyn NodeApi>,
    sink: Arc<dyn Sink>,
    tracked: Vec<Tracked>,
    policy: DeliveryPolicy,
    delay: Duration,
}

impl Poller {
    pub fn new(node: Arc<dyn NodeApi>, sink: Arc<dyn Sink>) -> Self {
        Self {
            node,
            sink,
            tracked: Vec::new(),
            policy: DeliveryPolicy::default(),
            delay: Duration::from_secs(300),
        }
    }

    pub fn policy(mut self, policy: DeliveryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Adds a record kind to every cycle. Kinds are polled in the order
    /// they were added.
    pub fn track(mut self, request: FetchRequest, store: Box<dyn SeenStore>) -> Self {
        self.tracked.push(Tracked::new(request, store));
        self
    }

    pub fn tracked(&self) -> &[Tracked] {
        &self.tracked
    }

    /// Loads every seen-set. Call once before the first cycle.
    pub async fn load(&mut self) -> Result<(), PollError> {
        for tracked in &mut self.tracked {
            let count = tracked.store.load().await?;
            info!(kind = %tracked.request.kind, count, "Loaded seen-set");
        }
        Ok(())
    }

    /// Runs a single fetch and process pass over all tracked kinds.
    ///
    /// Continuable node errors are logged and reported as an empty result
    /// for that kind; only storage failures and unrecoverable node errors
    /// abort the cycle.
    #[instrument(skip(self))]
    pub async fn poll_once(&mut self) -> Result<CycleReport, PollError> {
        let mut report = CycleReport::default();

        for tracked in &mut self.tracked {
            let kind = tracked.request.kind;
            let mut kind_report = KindReport::new(kind);

            let records = match self.node.fetch(&tracked.request).await {
                Ok(records) => records,
                Err(e) if e.is_continuable() => {
                    warn!(%kind, "Unable to fetch from node: {}", e);
                    kind_report.error = Some(e.to_string());
                    report.kinds.push(kind_report);
                    continue;
                }
                Err(e) => return Err(PollError::Node(e)),
            };

            kind_report.fetched = records.len();
            if records.is_empty() {
                debug!(%kind, "Response is empty (nothing to do)");
            }

            // Pending records from earlier cycles go after the fresh ones,
            // unless the node returned them again.
            let carried: Vec<Record> = std::mem::take(&mut tracked.retry)
                .into_iter()
                .filter(|old| records.iter().all(|r| r.id() != old.id()))
                .collect();

            for record in records.iter().chain(carried.iter()) {
                let outcome =
                    process(record, tracked.store.as_mut(), self.sink.as_ref(), self.policy).await?;
                match outcome {
                    Outcome::AlreadySeen => {}
                    Outcome::Delivered => kind_report.delivered += 1,
                    Outcome::Dropped => kind_report.dropped += 1,
                    Outcome::Pending => {
                        kind_report.pending += 1;
                        tracked.retry.push(record.clone());
                    }
                }
            }

            // The window always moves past what was returned; pending
            // records are carried in `retry` instead of re-fetched.
            if let Some(page) = tracked.request.page.as_mut() {
                page.offset += records.len();
            }

            report.kinds.push(kind_report);
        }

        Ok(report)
    }

    /// Polls until `shutdown_rx` changes or its sender is dropped.
    ///
    /// Shutdown is observed before each cycle and while waiting between
    /// cycles; a cycle in progress always runs to completion.
    pub async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) -> Result<(), PollError> {
        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            info!("Checking for new records to report...");
            let report = self.poll_once().await?;
            for kind in &report.kinds {
                if kind.new_records() > 0 {
                    info!(
                        kind = %kind.kind,
                        delivered = kind.delivered,
                        dropped = kind.dropped,
                        pending = kind.pending,
                        "Processed new records"
                    );
                }
            }

            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    info!("Poller received shutdown signal.");
                    break;
                }
                _ = tokio::time::sleep(self.delay) => {}
            }
        }
        Ok(())
    }
}
