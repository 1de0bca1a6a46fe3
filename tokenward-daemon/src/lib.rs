//! Tokenward Daemon Library
//!
//! This library exposes the daemon's API, configuration, and token
//! sources for testing and potential embedding in other applications.

pub mod api;
pub mod config;
pub mod sources;

pub use api::{ApiState, start_server};
pub use config::{CredentialConfig, DaemonConfig, SourceConfig, load_config};
pub use sources::build_source;
