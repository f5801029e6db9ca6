//! Command-line arguments for the relay host.
//!
//! Every option overrides the matching value loaded from the configuration
//! file; anything left unset keeps the file's value.

use clap::Parser;
use std::net::IpAddr;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "ws_host",
    version,
    about = "Event-driven WebSocket relay server"
)]
pub struct CliArgs {
    /// Configuration file path
    #[arg(short, long = "config", value_name = "FILE", default_value = "config.toml")]
    pub config_path: PathBuf,

    /// Port for the plain listener, or the TLS listener when [tls] is configured
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Interface to bind (e.g. 127.0.0.1)
    #[arg(short, long = "bind", value_name = "ADDRESS")]
    pub bind_host: Option<IpAddr>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Shorthand for --log-level debug
    #[arg(short, long)]
    pub debug: bool,

    /// Output logs in JSON format
    #[arg(long = "json-logs")]
    pub json_logs: bool,
}

#[cfg(test)]
impl Default for CliArgs {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("config.toml"),
            port: None,
            bind_host: None,
            log_level: None,
            debug: false,
            json_logs: false,
        }
    }
}
