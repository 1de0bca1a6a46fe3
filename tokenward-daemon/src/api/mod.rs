//! JSON-RPC API for daemon IPC.
//!
//! This module provides the JSON-RPC interface between tokenward clients
//! and the tokenwardd daemon.

pub mod handlers;
pub mod server;

pub use handlers::{ApiState, CredentialInfo, GetTokenResponse, ListCredentialsResponse};
pub use server::{ServerHandle, start_server};
