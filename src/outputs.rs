//! Fan-out of a record to several sinks.

use crate::core::{Record, Sink};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::error;

/// Delivers every record to all configured sinks, one after the other.
///
/// Delivery counts as successful only when every sink succeeded, so the
/// poller's delivery policy sees a single outcome per record.
pub struct SinkManager {
    sinks: Vec<Arc<dyn Sink>>,
}

impl SinkManager {
    pub fn new(sinks: Vec<Arc<dyn Sink>>) -> Self {
        Self { sinks }
    }
}

#[async_trait]
impl Sink for SinkManager {
    fn name(&self) -> &str {
        "manager"
    }

    async fn deliver(&self, record: &Record) -> anyhow::Result<()> {
        let mut failed = Vec::new();
        for sink in &self.sinks {
            if let Err(e) = sink.deliver(record).await {
                error!(sink = sink.name(), id = record.id(), "Delivery failed: {:#}", e);
                failed.push(sink.name().to_string());
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            anyhow::bail!("delivery failed for sink(s): {}", failed.join(", "))
        }
    }
}
