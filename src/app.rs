//! The command implementations, decoupled from the entry point.

use crate::{
    cli::{SendArgs, SyncArgs},
    config::Config,
    core::{FetchRequest, NodeApi, RecordKind, Sink},
    node::NodeClient,
    notification::{ArchiveSink, MispClient, PushoverClient},
    outputs::SinkManager,
    poller::{PollError, Poller},
    storage::FileSeenStore,
    submit::{self, IndicatorSource, SubmitError},
    sync::{self, SyncOptions, SyncReport},
};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

/// Seen-set file used by the MISP forwarder, kept apart from the
/// notifier's `reports` so both can run against the same directory.
pub const MISP_SEEN_FILE: &str = "misp_reports";

fn timeout(config: &Config) -> Duration {
    Duration::from_secs(config.node.timeout_seconds)
}

/// Path of the seen-set tracking `kind` under `dir`.
pub fn seen_path(dir: &Path, kind: RecordKind) -> PathBuf {
    dir.join(kind.seen_file_name())
}

/// Client for the configured node.
pub fn node_client(config: &Config) -> Result<NodeClient> {
    NodeClient::new(&config.node.url, config.node.key.clone(), timeout(config))
        .context("unable to set up the node client")
}

/// Submits the indicators selected by `args` and prints the node's answer.
pub async fn run_send(config: &Config, args: SendArgs) -> Result<(), SubmitError> {
    let source = IndicatorSource::from_options(args.single, args.file)?;
    let indicators = submit::collect_indicators(&source)?;
    for indicator in &indicators {
        println!("Adding indicator: {}", indicator);
    }
    let tags = submit::parse_tags(args.tags.as_deref());

    let node = NodeClient::new(&config.node.url, config.node.key.clone(), timeout(config))?;
    let message = submit::submit(&node, args.kind, indicators, tags, args.enabled).await?;
    println!("{}", message);
    Ok(())
}

/// Copies new indicators from the source node to the configured node and
/// prints a summary line per indicator kind.
pub async fn run_sync(config: &Config, args: SyncArgs) -> Result<SyncReport> {
    let tags = sync::generate_tags(args.tags.as_deref(), &args.source_node);
    let source = NodeClient::new(&args.source_node, args.source_key, timeout(config))
        .context("unable to set up the source node client")?;
    let target = node_client(config)?;

    let options = SyncOptions {
        recent: args.recent,
        enabled: args.enabled,
        tags,
        batch_size: config.sync.batch_size,
    };
    info!(source = %args.source_node, target = %config.node.url, tags = ?options.tags, "Synchronizing indicators");

    let report = sync::sync_nodes(&source, &target, &options).await?;
    for summary in &report.kinds {
        println!("{}", summary);
    }
    Ok(report)
}

/// Builds the poller that pushes alerts, reports and user requests to
/// Pushover.
pub fn notify_poller(config: &Config, node: Arc<dyn NodeApi>) -> Result<Poller> {
    let pushover = &config.notify.pushover;
    let client = PushoverClient::new(
        pushover.token.clone().unwrap_or_default(),
        pushover.user.clone().unwrap_or_default(),
        timeout(config),
    )?
    .with_api_url(pushover.api_url.clone());

    let dir = &config.storage.dir;
    let mut poller = Poller::new(node, Arc::new(client))
        .policy(config.notify.delivery)
        .delay(Duration::from_secs(config.notify.delay_seconds));
    for kind in [RecordKind::Alert, RecordKind::Report, RecordKind::UserRequest] {
        poller = poller.track(
            FetchRequest::new(kind),
            Box::new(FileSeenStore::new(seen_path(dir, kind))),
        );
    }
    Ok(poller)
}

/// Builds the poller that forwards email reports to MISP, and optionally to
/// a local archive.
pub fn misp_poller(config: &Config, node: Arc<dyn NodeApi>) -> Result<Poller> {
    let misp = &config.misp;
    let client = MispClient::new(
        misp.url.as_deref().unwrap_or_default(),
        misp.token.clone().unwrap_or_default(),
        timeout(config),
    )?;

    let sink: Arc<dyn Sink> = match &misp.archive_dir {
        Some(dir) => Arc::new(SinkManager::new(vec![
            Arc::new(client) as Arc<dyn Sink>,
            Arc::new(ArchiveSink::new(dir.clone())),
        ])),
        None => Arc::new(client),
    };

    let request = FetchRequest::new(RecordKind::Report)
        .paged(misp.page_size)
        .with_report_type(misp.report_type.clone());
    let store = FileSeenStore::new(config.storage.dir.join(MISP_SEEN_FILE));

    Ok(Poller::new(node, sink)
        .policy(misp.delivery)
        .delay(Duration::from_secs(misp.delay_seconds))
        .track(request, Box::new(store)))
}

/// Loads the seen-sets and polls until shutdown.
pub async fn run_poller(mut poller: Poller, shutdown_rx: watch::Receiver<bool>) -> Result<(), PollError> {
    poller.load().await?;
    poller.run(shutdown_rx).await
}
