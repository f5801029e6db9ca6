//! Configuration for the relay host.
//!
//! Settings are read from a TOML file. A missing file is created with the
//! defaults so a first run leaves an editable configuration behind.

use crate::cli::CliArgs;
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use tracing::info;
use ws_server::{ServerConfig, TlsSettings};

/// Application configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerSettings,
    /// Present only when the relay should serve `wss://`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsSection>,
    #[serde(default)]
    pub relay: RelaySettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Interface to bind
    pub bind_host: IpAddr,
    /// Listening port, used for both plain and TLS listeners
    pub port: u16,
    /// Maximum number of concurrent client connections (0 = unlimited)
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default = "default_listen_backlog")]
    pub listen_backlog: u32,
}

fn default_max_connections() -> usize {
    1000
}

fn default_listen_backlog() -> u32 {
    1024
}

/// Certificate and key locations for the TLS listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsSection {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

/// What the relay does with an incoming message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayMode {
    /// Reply to the sender only
    Echo,
    /// Forward to every connected client, tagged with the sender's address
    #[default]
    Broadcast,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelaySettings {
    #[serde(default)]
    pub mode: RelayMode,
    /// Sent to each client right after it connects
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub greeting: Option<String>,
}

/// Logging output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    #[serde(default)]
    pub json_format: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                bind_host: IpAddr::V4(Ipv4Addr::LOCALHOST),
                port: 8080,
                max_connections: default_max_connections(),
                listen_backlog: default_listen_backlog(),
            },
            tls: None,
            relay: RelaySettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

const VALID_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl AppConfig {
    /// Loads configuration from a TOML file, creating it with the defaults
    /// when it does not exist.
    pub async fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            let content = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            let config: AppConfig = toml::from_str(&content)
                .with_context(|| format!("parsing {}", path.display()))?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            info!("📝 Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Applies command-line overrides on top of the file's values.
    pub fn apply_overrides(&mut self, args: &CliArgs) {
        if let Some(port) = args.port {
            self.server.port = port;
        }
        if let Some(bind_host) = args.bind_host {
            self.server.bind_host = bind_host;
        }
        if let Some(level) = &args.log_level {
            self.logging.level = level.clone();
        }
        if args.debug {
            self.logging.level = "debug".to_string();
        }
        if args.json_logs {
            self.logging.json_format = true;
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !VALID_LEVELS.contains(&self.logging.level.as_str()) {
            bail!(
                "Invalid log level: {}. Must be one of: {VALID_LEVELS:?}",
                self.logging.level
            );
        }
        if let Some(tls) = &self.tls {
            if tls.cert_path.as_os_str().is_empty() || tls.key_path.as_os_str().is_empty() {
                bail!("[tls] requires both cert_path and key_path");
            }
        }
        Ok(())
    }

    pub fn to_server_config(&self) -> ServerConfig {
        ServerConfig {
            bind_host: self.server.bind_host,
            max_connections: self.server.max_connections,
            listen_backlog: self.server.listen_backlog,
        }
    }

    /// TLS start settings, when a `[tls]` section is configured.
    pub fn tls_settings(&self) -> Option<TlsSettings> {
        self.tls.as_ref().map(|tls| TlsSettings {
            cert_path: tls.cert_path.clone(),
            key_path: tls.key_path.clone(),
            port: self.server.port,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();

        assert_eq!(config.server.bind_host, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.max_connections, 1000);
        assert!(config.tls.is_none());
        assert_eq!(config.relay.mode, RelayMode::Broadcast);
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json_format);
    }

    #[tokio::test]
    async fn test_missing_file_is_created_with_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let config = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(config.server.port, 8080);
        assert!(path.exists());

        let reloaded = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(reloaded.server.port, config.server.port);
        assert_eq!(reloaded.relay.mode, config.relay.mode);
    }

    #[tokio::test]
    async fn test_load_full_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("relay.toml");
        tokio::fs::write(
            &path,
            r#"
[server]
bind_host = "0.0.0.0"
port = 9443
max_connections = 16

[tls]
cert_path = "certs/server.pem"
key_path = "certs/server.key"

[relay]
mode = "echo"
greeting = "welcome"

[logging]
level = "warn"
json_format = true
"#,
        )
        .await
        .unwrap();

        let config = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(config.server.max_connections, 16);
        assert_eq!(config.server.listen_backlog, 1024);
        assert_eq!(config.relay.mode, RelayMode::Echo);
        assert_eq!(config.relay.greeting.as_deref(), Some("welcome"));
        assert!(config.logging.json_format);

        let tls = config.tls_settings().unwrap();
        assert_eq!(tls.port, 9443);
        assert_eq!(tls.cert_path, PathBuf::from("certs/server.pem"));
    }

    #[tokio::test]
    async fn test_malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.toml");
        tokio::fs::write(&path, "[server\nport = ").await.unwrap();

        assert!(AppConfig::load_from_file(&path).await.is_err());
    }

    #[test]
    fn test_overrides_replace_file_values() {
        let mut config = AppConfig::default();
        let args = CliArgs {
            port: Some(9100),
            bind_host: Some("0.0.0.0".parse().unwrap()),
            debug: true,
            json_logs: true,
            ..CliArgs::default()
        };

        config.apply_overrides(&args);
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.bind_host.to_string(), "0.0.0.0");
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json_format);
    }

    #[test]
    fn test_validate_rejects_unknown_level() {
        let mut config = AppConfig::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());

        config.logging.level = "trace".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_server_config_conversion() {
        let mut config = AppConfig::default();
        config.server.max_connections = 0;

        let server_config = config.to_server_config();
        assert_eq!(server_config.bind_host, config.server.bind_host);
        assert_eq!(server_config.max_connections, 0);
        assert!(config.tls_settings().is_none());
    }
}
