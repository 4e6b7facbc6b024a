//! Sidecar bridge: the production [`SessionClient`](crate::SessionClient).
//!
//! The messaging platform is driven by an external process (typically a
//! script automating the platform's web client). chatlink talks to it over
//! newline-delimited JSON on stdin/stdout:
//!
//! - requests carry an `id` and an `op`
//! - replies echo the `id` with `ok` and either `result` or `error`
//! - lifecycle events carry an `event` tag and no `id`
//!
//! # Modules
//!
//! - [`protocol`] - wire types and line parsing
//! - [`process`] - spawning the sidecar and streaming its output
//! - [`client`] - request correlation and the `SessionClient` impl

pub mod client;
pub mod process;
pub mod protocol;

use std::path::PathBuf;

use thiserror::Error;

use crate::client::ClientError;

pub use client::BridgeClient;

/// How to launch the bridge process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Path to the bridge executable
    pub binary_path: String,
    /// Arguments to pass to the executable
    pub args: Vec<String>,
    /// Working directory for the process
    pub working_dir: Option<String>,
    /// Shell prefix (e.g. "/bin/zsh -l -c"); empty means the login shell
    pub shell_prefix: Option<String>,
    /// Directory for the raw traffic log
    pub log_dir: Option<PathBuf>,
}

impl BridgeConfig {
    pub fn new(binary_path: impl Into<String>) -> Self {
        Self {
            binary_path: binary_path.into(),
            args: Vec::new(),
            working_dir: None,
            shell_prefix: None,
            log_dir: None,
        }
    }

    pub fn args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn shell_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.shell_prefix = Some(prefix.into());
        self
    }

    pub fn log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }
}

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Invalid bridge command: {0}")]
    Command(String),

    #[error("Failed to spawn bridge: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Bridge is not running")]
    NotRunning,

    #[error("Failed to write to bridge: {0}")]
    Write(#[source] std::io::Error),

    #[error("Failed to encode bridge request: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Bridge exited before replying")]
    Exited,

    #[error("Unexpected bridge reply: {0}")]
    Decode(String),

    /// The bridge reported a failure for the request.
    #[error("{0}")]
    Remote(String),
}

impl From<BridgeError> for ClientError {
    fn from(e: BridgeError) -> Self {
        ClientError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_builder() {
        let config = BridgeConfig::new("/usr/bin/node")
            .args(vec!["bridge.js".to_string()])
            .working_dir("/srv/bridge")
            .shell_prefix("/bin/bash -c")
            .log_dir("/var/log/chatlink");

        assert_eq!(config.binary_path, "/usr/bin/node");
        assert_eq!(config.args, vec!["bridge.js"]);
        assert_eq!(config.working_dir.as_deref(), Some("/srv/bridge"));
        assert_eq!(config.shell_prefix.as_deref(), Some("/bin/bash -c"));
        assert_eq!(config.log_dir, Some(PathBuf::from("/var/log/chatlink")));
    }

    #[test]
    fn remote_error_keeps_bridge_text() {
        let err: ClientError = BridgeError::Remote("chat not found".into()).into();
        assert_eq!(err.0, "chat not found");
    }

    #[test]
    fn exited_error_message() {
        let err: ClientError = BridgeError::Exited.into();
        assert!(err.0.contains("exited"));
    }
}
