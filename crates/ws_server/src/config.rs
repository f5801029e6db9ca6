//! Server configuration types and defaults.
//!
//! The listening port is not part of [`ServerConfig`]; it is supplied on every
//! start call so one manager can be restarted on a different port.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

/// Configuration shared by every server a [`crate::ServerManager`] starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Interface the listener binds to
    pub bind_host: IpAddr,

    /// Maximum number of concurrent connections allowed; zero disables the limit
    pub max_connections: usize,

    /// Backlog passed to `listen(2)`
    pub listen_backlog: u32,
}

impl ServerConfig {
    /// Socket address for `port` on the configured interface.
    pub fn socket_addr(&self, port: u16) -> SocketAddr {
        SocketAddr::new(self.bind_host, port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            max_connections: 1000,
            listen_backlog: 1024,
        }
    }
}

/// Settings for starting an encrypted (`wss://`) server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsSettings {
    /// PEM file holding the server certificate chain, leaf first
    pub cert_path: PathBuf,
    /// PEM file holding the private key (PKCS#8, PKCS#1 or SEC1)
    pub key_path: PathBuf,
    /// Port to listen on
    pub port: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_binds_all_interfaces() {
        let config = ServerConfig::default();
        assert_eq!(config.socket_addr(8080).to_string(), "0.0.0.0:8080");
        assert_eq!(config.max_connections, 1000);
    }

    #[test]
    fn test_socket_addr_uses_bind_host() {
        let config = ServerConfig {
            bind_host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            ..Default::default()
        };
        assert_eq!(config.socket_addr(0), SocketAddr::from(([127, 0, 0, 1], 0)));
    }
}
