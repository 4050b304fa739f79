//! One-shot submission of indicators to a node.

use crate::core::{IndicatorKind, IndicatorSubmission, NodeApi};
use crate::node::NodeError;
use itertools::Itertools;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("You need to specify either --single or --file")]
    InputMode,
    #[error("The file you specified at path {} does not exist.", .0.display())]
    MissingFile(PathBuf),
    #[error("Unable to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Somehow there are no indicators to submit")]
    Empty,
    #[error(transparent)]
    Node(#[from] NodeError),
}

impl SubmitError {
    /// Errors caused by how the command was invoked, as opposed to a failure
    /// talking to the node.
    pub fn is_usage(&self) -> bool {
        !matches!(self, SubmitError::Node(_))
    }
}

/// Where the indicators come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndicatorSource {
    Single(String),
    File(PathBuf),
}

impl IndicatorSource {
    /// Picks the input mode from the two mutually exclusive options.
    pub fn from_options(
        single: Option<String>,
        file: Option<PathBuf>,
    ) -> Result<Self, SubmitError> {
        match (single, file) {
            (Some(single), None) => Ok(IndicatorSource::Single(single)),
            (None, Some(file)) => Ok(IndicatorSource::File(file)),
            _ => Err(SubmitError::InputMode),
        }
    }
}

/// Trims values, drops blanks and removes exact duplicates, keeping the
/// first occurrence of each value.
pub fn dedup_values<'a, I>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    values
        .into_iter()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unique()
        .map(String::from)
        .collect()
}

/// Splits a comma-separated tag list. Matching is case-sensitive.
pub fn parse_tags(tags: Option<&str>) -> Vec<String> {
    tags.map(|t| dedup_values(t.split(','))).unwrap_or_default()
}

/// Reads the indicators to submit.
pub fn collect_indicators(source: &IndicatorSource) -> Result<Vec<String>, SubmitError> {
    let indicators = match source {
        IndicatorSource::Single(value) => dedup_values([value.as_str()]),
        IndicatorSource::File(path) => read_indicator_file(path)?,
    };

    if indicators.is_empty() {
        return Err(SubmitError::Empty);
    }
    Ok(indicators)
}

fn read_indicator_file(path: &Path) -> Result<Vec<String>, SubmitError> {
    if !path.exists() {
        return Err(SubmitError::MissingFile(path.to_path_buf()));
    }
    let contents = std::fs::read_to_string(path).map_err(|source| SubmitError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(dedup_values(contents.lines()))
}

/// Sends all indicators to the node in a single call and returns the node's
/// message.
pub async fn submit(
    node: &dyn NodeApi,
    kind: IndicatorKind,
    indicators: Vec<String>,
    tags: Vec<String>,
    enabled: bool,
) -> Result<String, SubmitError> {
    if indicators.is_empty() {
        return Err(SubmitError::Empty);
    }
    let submission = IndicatorSubmission {
        kind: kind.as_str().to_string(),
        indicators,
        tags,
        enabled,
    };
    Ok(node.add_indicators(&submission).await?)
}
