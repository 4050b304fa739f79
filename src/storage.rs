//! Persistent seen-sets used to avoid processing a record twice.
//!
//! A seen-set is an append-only, newline-delimited file of identifiers. It is
//! read once at startup and only ever appended to afterwards.

use async_trait::async_trait;
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::PathBuf;
use thiserror::Error;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("failed to read seen-set {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to append to seen-set {path}: {source}")]
    Append {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to create storage directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// A set of identifiers that have already been processed.
#[async_trait]
pub trait SeenStore: Send + Sync {
    /// Loads previously recorded identifiers and returns how many were found.
    async fn load(&mut self) -> Result<usize, StorageError>;

    fn contains(&self, id: &str) -> bool;

    /// Records an identifier as processed. Recording an identifier that is
    /// already present is a no-op.
    async fn record_seen(&mut self, id: &str) -> Result<(), StorageError>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A seen-set persisted as one identifier per line.
#[derive(Debug)]
pub struct FileSeenStore {
    path: PathBuf,
    seen: HashSet<String>,
}

impl FileSeenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            seen: HashSet::new(),
        }
    }
}

/// Parses the contents of a seen-set file, skipping blank lines.
pub fn parse_seen_set(contents: &str) -> impl Iterator<Item = &str> {
    contents.lines().map(str::trim).filter(|line| !line.is_empty())
}

#[async_trait]
impl SeenStore for FileSeenStore {
    async fn load(&mut self) -> Result<usize, StorageError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            if fs::metadata(dir).await.is_err() {
                info!(path = %dir.display(), "Creating storage directory");
                fs::create_dir_all(dir)
                    .await
                    .map_err(|source| StorageError::CreateDir {
                        path: dir.to_path_buf(),
                        source,
                    })?;
                return Ok(0);
            }
        }

        let contents = match fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(source) => {
                return Err(StorageError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        info!(path = %self.path.display(), "Parsing seen-set");
        for id in parse_seen_set(&contents) {
            debug!("  - adding {}", id);
            self.seen.insert(id.to_string());
        }
        Ok(self.seen.len())
    }

    fn contains(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    async fn record_seen(&mut self, id: &str) -> Result<(), StorageError> {
        if self.seen.contains(id) {
            return Ok(());
        }

        let append_err = |source| StorageError::Append {
            path: self.path.clone(),
            source,
        };
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(append_err)?;
        file.write_all(format!("{}\n", id).as_bytes())
            .await
            .map_err(append_err)?;
        file.flush().await.map_err(append_err)?;

        self.seen.insert(id.to_string());
        Ok(())
    }

    fn len(&self) -> usize {
        self.seen.len()
    }
}

/// An in-memory seen-set for tests and dry runs.
#[derive(Debug, Default, Clone)]
pub struct MemorySeenStore {
    seen: HashSet<String>,
    recorded: Vec<String>,
}

impl MemorySeenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that already knows the given identifiers.
    pub fn with_seen<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            seen: ids.into_iter().map(Into::into).collect(),
            recorded: Vec::new(),
        }
    }

    /// Identifiers recorded since creation, in order.
    pub fn recorded(&self) -> &[String] {
        &self.recorded
    }
}

#[async_trait]
impl SeenStore for MemorySeenStore {
    async fn load(&mut self) -> Result<usize, StorageError> {
        Ok(self.seen.len())
    }

    fn contains(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    async fn record_seen(&mut self, id: &str) -> Result<(), StorageError> {
        if self.seen.insert(id.to_string()) {
            self.recorded.push(id.to_string());
        }
        Ok(())
    }

    fn len(&self) -> usize {
        self.seen.len()
    }
}
