//! Error types for the WebSocket server core.
//!
//! Two families exist. [`ServerError`] is returned synchronously from start,
//! messaging and roster operations. [`TransportError`] describes failures that
//! happen after a server is already listening; those are never returned to a
//! caller and only reach user code through the transport-error callback.

use crate::connection::ConnectionId;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Errors surfaced directly to callers of the server manager.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Certificate or private key material could not be read from disk.
    #[error("Certificate file could not be read ({path}): {source}")]
    CertificateLoad {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The secure transport could not be built from the supplied material.
    #[error("Secure server could not be created, check the certificate and key: {0}")]
    ServerBind(String),
    /// A messaging or roster operation ran before any server was listening.
    #[error("Server is not initialized: start a server before sending or listing clients")]
    NotInitialized,
    /// Unicast to the active connection when no connection has been active yet.
    #[error("No active connection to send to")]
    NoActiveConnection,
    /// The targeted connection has already gone away.
    #[error("Connection {0} is closed")]
    ConnectionClosed(ConnectionId),
    /// Network-related error (socket creation, bind, listen)
    #[error("Network error: {0}")]
    Network(String),
    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failures reported by a running transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Failed to accept connection: {0}")]
    Accept(#[source] std::io::Error),
    #[error("TLS handshake failed for {peer}: {source}")]
    Tls {
        peer: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("WebSocket handshake failed for {peer}: {source}")]
    Handshake {
        peer: SocketAddr,
        #[source]
        source: tokio_tungstenite::tungstenite::Error,
    },
    #[error("WebSocket error on connection {id} ({peer}): {source}")]
    Connection {
        id: ConnectionId,
        peer: SocketAddr,
        #[source]
        source: tokio_tungstenite::tungstenite::Error,
    },
}

/// Error returned by user callbacks.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EventError {
    /// The callback failed while handling the event.
    #[error("Handler execution error: {0}")]
    HandlerExecution(String),
}

impl From<ServerError> for EventError {
    fn from(error: ServerError) -> Self {
        EventError::HandlerExecution(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_certificate_load_mentions_path() {
        let err = ServerError::CertificateLoad {
            path: PathBuf::from("/missing/cert.pem"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        };
        let text = err.to_string();
        assert!(text.contains("/missing/cert.pem"));
        assert!(text.contains("not found"));
    }

    #[test]
    fn test_server_error_converts_into_event_error() {
        let err: EventError = ServerError::NotInitialized.into();
        let EventError::HandlerExecution(message) = err;
        assert!(message.contains("not initialized"));
    }
}
