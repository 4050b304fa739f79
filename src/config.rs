//! Configuration management for pdtools
//!
//! This module defines the main `Config` struct and its sub-structs,
//! responsible for holding all application settings. It uses the `figment`
//! crate to layer built-in defaults, an optional `pdtools.toml` file,
//! `PDTOOLS_` environment variables and finally the command line.

use crate::cli::{Cli, Command};
use crate::poller::DeliveryPolicy;
use crate::sync::DEFAULT_BATCH_SIZE;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Node address used when neither `--node` nor `PDNODE` is given.
pub const DEFAULT_NODE_URL: &str = "http://127.0.0.1:7856";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),
    #[error("missing {what}: pass {flag} or set {env}")]
    Missing {
        what: &'static str,
        flag: &'static str,
        env: &'static str,
    },
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// The main configuration struct for the application.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    /// The logging level for the application.
    pub log_level: String,
    /// The PhishDetect Node commands talk to (the target node for `sync`).
    pub node: NodeConfig,
    /// Where seen-sets are persisted.
    pub storage: StorageConfig,
    pub notify: NotifyConfig,
    pub misp: MispConfig,
    pub sync: SyncConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct NodeConfig {
    pub url: String,
    pub key: Option<String>,
    /// Timeout for a single HTTP request, in seconds.
    pub timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct StorageConfig {
    /// Directory holding one seen-set file per record kind.
    pub dir: PathBuf,
}

/// Configuration for the push notification poller.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct NotifyConfig {
    pub delay_seconds: u64,
    pub delivery: DeliveryPolicy,
    pub pushover: PushoverConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PushoverConfig {
    pub token: Option<String>,
    pub user: Option<String>,
    pub api_url: String,
}

/// Configuration for the MISP report forwarder.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct MispConfig {
    pub url: Option<String>,
    pub token: Option<String>,
    pub delay_seconds: u64,
    pub delivery: DeliveryPolicy,
    /// Number of reports requested per fetch.
    pub page_size: usize,
    /// Only reports of this type are forwarded.
    pub report_type: String,
    /// Optional directory receiving the raw content of every report.
    pub archive_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SyncConfig {
    pub batch_size: usize,
}

/// `~/.config/phishdetect`, falling back to the working directory when no
/// home directory can be determined.
pub fn default_storage_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".config").join("phishdetect"))
        .unwrap_or_else(|| PathBuf::from(".phishdetect"))
}

impl Config {
    /// Loads the configuration for the parsed command line.
    ///
    /// Sources are layered so that later ones win: defaults, the TOML file
    /// given with `--config`, `PDTOOLS_` environment variables (nested keys
    /// separated by `__`, e.g. `PDTOOLS_STORAGE__DIR`), then the CLI.
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));
        if let Some(path) = &cli.config {
            figment = figment.merge(Toml::file(path));
        }
        let config = figment
            .merge(Env::prefixed("PDTOOLS_").split("__"))
            .merge(cli)
            .extract()
            .map_err(Box::new)?;
        Ok(config)
    }

    /// Checks that everything `command` needs is present, before any
    /// network call is made.
    pub fn validate_for(&self, command: &Command) -> Result<(), ConfigError> {
        if self.node.url.trim().is_empty() {
            return Err(ConfigError::Missing {
                what: "node URL",
                flag: "--node",
                env: "PDNODE",
            });
        }
        if is_blank(&self.node.key) {
            return Err(ConfigError::Missing {
                what: "API key",
                flag: "--key",
                env: "PDKEY",
            });
        }

        match command {
            Command::Send(_) => {}
            Command::Sync(_) => {
                if self.sync.batch_size == 0 {
                    return Err(ConfigError::Invalid {
                        key: "sync.batch_size",
                        reason: "must be greater than zero".to_string(),
                    });
                }
            }
            Command::Notify(_) => {
                if is_blank(&self.notify.pushover.token) {
                    return Err(ConfigError::Missing {
                        what: "Pushover token",
                        flag: "--token",
                        env: "POTOKEN",
                    });
                }
                if is_blank(&self.notify.pushover.user) {
                    return Err(ConfigError::Missing {
                        what: "Pushover user",
                        flag: "--user",
                        env: "POUSER",
                    });
                }
            }
            Command::Misp(_) => {
                if is_blank(&self.misp.url) {
                    return Err(ConfigError::Missing {
                        what: "MISP URL",
                        flag: "--misp",
                        env: "MISPURL",
                    });
                }
                if is_blank(&self.misp.token) {
                    return Err(ConfigError::Missing {
                        what: "MISP token",
                        flag: "--token",
                        env: "MISPTOKEN",
                    });
                }
                if self.misp.page_size == 0 {
                    return Err(ConfigError::Invalid {
                        key: "misp.page_size",
                        reason: "must be greater than zero".to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            node: NodeConfig {
                url: DEFAULT_NODE_URL.to_string(),
                key: None,
                timeout_seconds: 30,
            },
            storage: StorageConfig {
                dir: default_storage_dir(),
            },
            notify: NotifyConfig {
                delay_seconds: 300,
                delivery: DeliveryPolicy::AtMostOnce,
                pushover: PushoverConfig {
                    token: None,
                    user: None,
                    api_url: crate::notification::pushover::PUSHOVER_API_URL.to_string(),
                },
            },
            misp: MispConfig {
                url: None,
                token: None,
                delay_seconds: 60,
                delivery: DeliveryPolicy::AtLeastOnce,
                page_size: 100,
                report_type: "email".to_string(),
                archive_dir: None,
            },
            sync: SyncConfig {
                batch_size: DEFAULT_BATCH_SIZE,
            },
        }
    }
}
