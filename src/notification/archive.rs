//! Writes raw record content to a local directory for later forwarding.

use crate::core::{Record, Sink};
use anyhow::Context;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs;
use tracing::info;

/// Stores each record as a file named after its identifier.
///
/// Reports are written verbatim as `<uuid>.eml`; everything else as
/// pretty-printed JSON.
#[derive(Debug, Clone)]
pub struct ArchiveSink {
    dir: PathBuf,
}

impl ArchiveSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The file a record would be archived to.
    pub fn path_for(&self, record: &Record) -> PathBuf {
        let extension = match record {
            Record::Report(_) => "eml",
            _ => "json",
        };
        // Identifiers come from a remote node; keep them from escaping the directory.
        let name: String = record
            .id()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.{}", name, extension))
    }
}

#[async_trait]
impl Sink for ArchiveSink {
    fn name(&self) -> &str {
        "archive"
    }

    async fn deliver(&self, record: &Record) -> anyhow::Result<()> {
        fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("creating archive directory {}", self.dir.display()))?;

        let contents = match record {
            Record::Report(report) => report.content.clone(),
            Record::Alert(alert) => serde_json::to_string_pretty(alert)?,
            Record::UserRequest(user) => serde_json::to_string_pretty(user)?,
        };

        let path = self.path_for(record);
        fs::write(&path, contents)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), "Archived {}", record.kind());
        Ok(())
    }
}
