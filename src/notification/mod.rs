//! Destinations for newly seen records.
//!
//! Each sink implements [`crate::core::Sink`]; the poller only ever talks to
//! that trait, so sinks can be combined through [`crate::outputs::SinkManager`]
//! or replaced by fakes in tests.
pub mod archive;
pub mod misp;
pub mod pushover;

pub use archive::ArchiveSink;
pub use misp::MispClient;
pub use pushover::PushoverClient;
