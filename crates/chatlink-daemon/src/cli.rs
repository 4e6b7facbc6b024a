//! Command-line interface.

use std::path::PathBuf;

use chatlink_core::BridgeConfig;
use clap::Parser;

/// Broker a single device-linked messaging session over HTTP.
#[derive(Parser, Debug, Clone)]
#[command(name = "chatlink", version, about, long_about = None)]
pub struct Args {
    /// Address to bind the HTTP server to
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Port to bind the HTTP server to
    #[arg(long, default_value_t = 3000)]
    pub port: u16,

    /// Executable of the bridge sidecar
    #[arg(long, value_name = "PATH")]
    pub bridge: String,

    /// Argument passed to the bridge (repeatable)
    #[arg(long = "bridge-arg", value_name = "ARG", allow_hyphen_values = true)]
    pub bridge_args: Vec<String>,

    /// Working directory for the bridge
    #[arg(long, value_name = "DIR")]
    pub bridge_dir: Option<String>,

    /// Run the bridge through this shell, e.g. "/bin/zsh -l -c"
    ///
    /// An empty value picks the login shell from $SHELL.
    #[arg(long)]
    pub shell_prefix: Option<String>,

    /// Write the raw bridge traffic to DIR/bridge.log
    #[arg(long, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// Default log filter; RUST_LOG takes precedence
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Args {
    pub fn bridge_config(&self) -> BridgeConfig {
        let mut config = BridgeConfig::new(&self.bridge).args(self.bridge_args.clone());
        if let Some(dir) = &self.bridge_dir {
            config = config.working_dir(dir);
        }
        if let Some(prefix) = &self.shell_prefix {
            config = config.shell_prefix(prefix);
        }
        if let Some(dir) = &self.log_dir {
            config = config.log_dir(dir);
        }
        config
    }
}
