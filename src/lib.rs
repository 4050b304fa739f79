/// pdtools - command-line clients for a PhishDetect Node
///
/// This library provides indicator submission, node-to-node synchronization
/// and the seen-set poller that forwards new alerts, reports and user
/// requests to notification and threat-sharing services.
pub mod app;
pub mod cli;
pub mod config;
pub mod core;
pub mod formatting;
pub mod node;
pub mod notification;
pub mod outputs;
pub mod poller;
pub mod storage;
pub mod submit;
pub mod sync;

// Re-export core types for convenience
pub use core::*;
