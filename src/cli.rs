//! Command-Line Interface (CLI) argument parsing.
//!
//! This module defines the command-line arguments using the `clap` crate.
//! The long-standing environment variables (`PDNODE`, `PDKEY`, `POTOKEN`, ...)
//! are read here through clap's `env` support. Arguments that map onto the
//! configuration are then merged over the `pdtools.toml` file and the
//! `PDTOOLS_` environment through the [`Provider`] implementation below.

use crate::core::IndicatorKind;
use crate::poller::DeliveryPolicy;
use clap::{Args, Parser, Subcommand};
use figment::{
    value::{Dict, Map, Value},
    Error, Metadata, Profile, Provider,
};
use std::path::PathBuf;

/// Command-line clients for a PhishDetect Node.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Log level filter (e.g. "info", "debug"). RUST_LOG takes precedence.
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// URL to the PhishDetect Node.
    #[arg(long, env = "PDNODE", value_name = "URL", global = true)]
    pub node: Option<String>,

    /// The API key for your PhishDetect Node user.
    #[arg(long, env = "PDKEY", hide_env_values = true, global = true)]
    pub key: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send indicators to the PhishDetect Node.
    Send(SendArgs),
    /// Synchronize your PhishDetect Node with another.
    Sync(SyncArgs),
    /// Push notifications for new alerts, reports and user requests.
    Notify(NotifyArgs),
    /// Forward new email reports to a MISP instance.
    Misp(MispArgs),
}

impl Command {
    /// The subcommand name as typed on the command line.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Send(_) => "send",
            Command::Sync(_) => "sync",
            Command::Notify(_) => "notify",
            Command::Misp(_) => "misp",
        }
    }
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// The type of indicator ("domain" or "email").
    #[arg(long = "type", value_name = "TYPE")]
    pub kind: IndicatorKind,

    /// Comma separated list of tags to mark the indicators with.
    #[arg(long)]
    pub tags: Option<String>,

    /// Send this single indicator.
    #[arg(long, value_name = "IOC")]
    pub single: Option<String>,

    /// Send all indicators contained in this file, one per line.
    #[arg(long, value_name = "FILE")]
    pub file: Option<PathBuf>,

    /// Submit the indicators as enabled.
    #[arg(long)]
    pub enabled: bool,
}

#[derive(Args, Debug)]
pub struct SyncArgs {
    /// URL to the PhishDetect Node you want to fetch indicators from.
    #[arg(long, value_name = "URL")]
    pub source_node: String,

    /// API key for the source PhishDetect Node, if needed.
    #[arg(long, env = "PDSRCKEY", hide_env_values = true)]
    pub source_key: Option<String>,

    /// Fetch only the source node's recent indicators.
    #[arg(long)]
    pub recent: bool,

    /// Submit synced indicators as enabled.
    #[arg(long)]
    pub enabled: bool,

    /// Comma-separated list of tags to add to the synced indicators. If none
    /// is specified, one is generated from the source node address.
    #[arg(long)]
    pub tags: Option<String>,

    /// Size of batches of indicators to add to the target node.
    #[arg(long, value_name = "N")]
    pub batch_size: Option<usize>,
}

#[derive(Args, Debug)]
pub struct NotifyArgs {
    /// The Pushover application token.
    #[arg(long, env = "POTOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// The Pushover user key.
    #[arg(long, env = "POUSER", hide_env_values = true)]
    pub user: Option<String>,

    /// Delay in seconds between checks.
    #[arg(long, value_name = "SECONDS")]
    pub delay: Option<u64>,

    /// Whether a failed notification is retried on the next check.
    #[arg(long, value_enum)]
    pub delivery: Option<DeliveryPolicy>,
}

#[derive(Args, Debug)]
pub struct MispArgs {
    /// URL to the MISP instance.
    #[arg(long, env = "MISPURL", value_name = "URL")]
    pub misp: Option<String>,

    /// The MISP API token.
    #[arg(long, env = "MISPTOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Delay in seconds between checks.
    #[arg(long, value_name = "SECONDS")]
    pub delay: Option<u64>,

    /// Whether a report MISP refused is retried on the next check.
    #[arg(long, value_enum)]
    pub delivery: Option<DeliveryPolicy>,

    /// Also write the raw content of each report into this directory.
    #[arg(long, value_name = "DIR")]
    pub archive: Option<PathBuf>,

    /// Number of reports requested per fetch.
    #[arg(long, value_name = "N")]
    pub limit: Option<usize>,
}

/// Inserts `value` at a dotted key path, creating intermediate dictionaries.
fn insert_path(dict: &mut Dict, path: &str, value: Value) {
    match path.split_once('.') {
        Some((head, rest)) => {
            let entry = dict
                .entry(head.to_string())
                .or_insert_with(|| Value::from(Dict::new()));
            if let Value::Dict(_, inner) = entry {
                insert_path(inner, rest, value);
            }
        }
        None => {
            dict.insert(path.to_string(), value);
        }
    }
}

fn insert_policy(dict: &mut Dict, path: &str, policy: DeliveryPolicy) -> Result<(), Error> {
    insert_path(dict, path, Value::serialize(policy)?);
    Ok(())
}

impl Provider for Cli {
    fn metadata(&self) -> Metadata {
        Metadata::named("Command-Line Arguments")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        let mut dict = Dict::new();

        if let Some(level) = &self.log_level {
            insert_path(&mut dict, "log_level", Value::from(level.clone()));
        }
        if let Some(node) = &self.node {
            insert_path(&mut dict, "node.url", Value::from(node.clone()));
        }
        if let Some(key) = &self.key {
            insert_path(&mut dict, "node.key", Value::from(key.clone()));
        }

        match &self.command {
            Command::Send(_) => {}
            Command::Sync(args) => {
                if let Some(size) = args.batch_size {
                    insert_path(&mut dict, "sync.batch_size", Value::from(size as u64));
                }
            }
            Command::Notify(args) => {
                if let Some(token) = &args.token {
                    insert_path(&mut dict, "notify.pushover.token", Value::from(token.clone()));
                }
                if let Some(user) = &args.user {
                    insert_path(&mut dict, "notify.pushover.user", Value::from(user.clone()));
                }
                if let Some(delay) = args.delay {
                    insert_path(&mut dict, "notify.delay_seconds", Value::from(delay));
                }
                if let Some(policy) = args.delivery {
                    insert_policy(&mut dict, "notify.delivery", policy)?;
                }
            }
            Command::Misp(args) => {
                if let Some(url) = &args.misp {
                    insert_path(&mut dict, "misp.url", Value::from(url.clone()));
                }
                if let Some(token) = &args.token {
                    insert_path(&mut dict, "misp.token", Value::from(token.clone()));
                }
                if let Some(delay) = args.delay {
                    insert_path(&mut dict, "misp.delay_seconds", Value::from(delay));
                }
                if let Some(policy) = args.delivery {
                    insert_policy(&mut dict, "misp.delivery", policy)?;
                }
                if let Some(dir) = &args.archive {
                    insert_path(
                        &mut dict,
                        "misp.archive_dir",
                        Value::from(dir.display().to_string()),
                    );
                }
                if let Some(limit) = args.limit {
                    insert_path(&mut dict, "misp.page_size", Value::from(limit as u64));
                }
            }
        }

        let mut map = Map::new();
        map.insert(Profile::Default, dict);
        Ok(map)
    }
}
