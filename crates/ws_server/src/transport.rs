//! Listening transports.
//!
//! A plain transport is a TCP listener that speaks WebSocket directly. A
//! secure transport puts a TLS acceptor, built from a PEM certificate chain
//! and private key, in front of the same listener.

use crate::config::TlsSettings;
use crate::error::ServerError;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_rustls::rustls::{self, pki_types::CertificateDer};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info};

/// Which kind of transport a server runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Plain,
    Secure,
}

impl TransportKind {
    /// URL scheme clients use for this transport.
    pub fn scheme(self) -> &'static str {
        match self {
            TransportKind::Plain => "ws",
            TransportKind::Secure => "wss",
        }
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.scheme())
    }
}

/// The stream layer applied to every accepted TCP connection.
#[derive(Clone)]
pub enum Transport {
    Plain,
    Secure(TlsAcceptor),
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transport::Plain => f.write_str("Transport::Plain"),
            Transport::Secure(_) => f.write_str("Transport::Secure"),
        }
    }
}

impl Transport {
    pub fn kind(&self) -> TransportKind {
        match self {
            Transport::Plain => TransportKind::Plain,
            Transport::Secure(_) => TransportKind::Secure,
        }
    }
}

/// Creates a non-blocking TCP listener on `address`.
pub fn bind_listener(address: SocketAddr, backlog: u32) -> Result<TcpListener, ServerError> {
    let socket = Socket::new(Domain::for_address(address), Type::STREAM, Some(Protocol::TCP))
        .map_err(|e| ServerError::Network(format!("Socket creation failed: {e}")))?;
    socket.set_reuse_address(true).ok();

    socket
        .bind(&address.into())
        .map_err(|e| ServerError::Network(format!("Bind failed on {address}: {e}")))?;

    let backlog = i32::try_from(backlog).unwrap_or(i32::MAX);
    socket
        .listen(backlog)
        .map_err(|e| ServerError::Network(format!("Listen failed on {address}: {e}")))?;

    let std_listener: StdTcpListener = socket.into();
    std_listener
        .set_nonblocking(true)
        .map_err(|e| ServerError::Network(format!("Failed to make listener non-blocking: {e}")))?;

    let listener = TcpListener::from_std(std_listener)
        .map_err(|e| ServerError::Network(format!("Tokio listener creation failed: {e}")))?;

    info!("✅ Listener bound on {}", address);
    Ok(listener)
}

async fn read_material(path: &Path) -> Result<Vec<u8>, ServerError> {
    tokio::fs::read(path)
        .await
        .map_err(|source| ServerError::CertificateLoad {
            path: path.to_path_buf(),
            source,
        })
}

/// Reads the certificate and key files named by `settings`.
///
/// Both files are read before anything is parsed, so an unreadable file is
/// always reported as [`ServerError::CertificateLoad`].
pub async fn load_tls_material(settings: &TlsSettings) -> Result<(Vec<u8>, Vec<u8>), ServerError> {
    let cert = read_material(&settings.cert_path).await?;
    let key = read_material(&settings.key_path).await?;
    debug!(
        "Read {} certificate bytes from {} and {} key bytes from {}",
        cert.len(),
        settings.cert_path.display(),
        key.len(),
        settings.key_path.display()
    );
    Ok((cert, key))
}

/// Builds a TLS acceptor from PEM-encoded certificate chain and key.
pub fn build_tls_acceptor(cert_pem: &[u8], key_pem: &[u8]) -> Result<TlsAcceptor, ServerError> {
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut &cert_pem[..])
        .collect::<Result<_, _>>()
        .map_err(|e| ServerError::ServerBind(format!("invalid certificate PEM: {e}")))?;
    if certs.is_empty() {
        return Err(ServerError::ServerBind(
            "no certificates found in certificate file".into(),
        ));
    }

    let key = rustls_pemfile::private_key(&mut &key_pem[..])
        .map_err(|e| ServerError::ServerBind(format!("invalid private key PEM: {e}")))?
        .ok_or_else(|| ServerError::ServerBind("no private key found in key file".into()))?;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = rustls::ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| ServerError::ServerBind(e.to_string()))?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| ServerError::ServerBind(e.to_string()))?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// Reads and parses TLS material into a secure transport.
pub async fn secure_transport(settings: &TlsSettings) -> Result<Transport, ServerError> {
    let (cert, key) = load_tls_material(settings).await?;
    build_tls_acceptor(&cert, &key).map(Transport::Secure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const CERT: &[u8] = include_bytes!("../tests/fixtures/server.pem");
    const KEY: &[u8] = include_bytes!("../tests/fixtures/server.key");

    #[test]
    fn test_scheme_matches_kind() {
        assert_eq!(TransportKind::Plain.to_string(), "ws");
        assert_eq!(TransportKind::Secure.to_string(), "wss");
        assert_eq!(Transport::Plain.kind(), TransportKind::Plain);
    }

    #[tokio::test]
    async fn test_binds_ephemeral_port() {
        let listener = bind_listener("127.0.0.1:0".parse().unwrap(), 16).unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn test_binding_taken_port_is_network_error() {
        let first = bind_listener("127.0.0.1:0".parse().unwrap(), 16).unwrap();
        let taken = first.local_addr().unwrap();
        let err = bind_listener(taken, 16).unwrap_err();
        assert!(matches!(err, ServerError::Network(_)));
    }

    #[test]
    fn test_acceptor_builds_from_valid_pem() {
        assert!(build_tls_acceptor(CERT, KEY).is_ok());
    }

    #[test]
    fn test_garbage_certificate_is_server_bind_error() {
        let err = build_tls_acceptor(b"not a certificate", KEY).err().expect("expected error");
        assert!(matches!(err, ServerError::ServerBind(_)));
    }

    #[test]
    fn test_missing_key_is_server_bind_error() {
        let err = build_tls_acceptor(CERT, b"").err().expect("expected error");
        assert!(matches!(err, ServerError::ServerBind(_)));
    }

    #[tokio::test]
    async fn test_unreadable_certificate_is_load_error() {
        let mut key_file = NamedTempFile::new().unwrap();
        key_file.write_all(KEY).unwrap();

        let settings = TlsSettings {
            cert_path: "/nonexistent/ws_server/cert.pem".into(),
            key_path: key_file.path().to_path_buf(),
            port: 0,
        };
        let err = load_tls_material(&settings).await.unwrap_err();
        match err {
            ServerError::CertificateLoad { path, .. } => {
                assert_eq!(path, settings.cert_path);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_secure_transport_from_files() {
        let mut cert_file = NamedTempFile::new().unwrap();
        cert_file.write_all(CERT).unwrap();
        let mut key_file = NamedTempFile::new().unwrap();
        key_file.write_all(KEY).unwrap();

        let settings = TlsSettings {
            cert_path: cert_file.path().to_path_buf(),
            key_path: key_file.path().to_path_buf(),
            port: 0,
        };
        let transport = secure_transport(&settings).await.unwrap();
        assert_eq!(transport.kind(), TransportKind::Secure);
    }
}
