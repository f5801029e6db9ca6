//! Core server manager implementation.
//!
//! This module contains [`ServerManager`], which owns the callback slots, the
//! connection registry and the single live server instance. Starting a server
//! (plain or secure) replaces whatever instance was running before.

use super::dispatcher::Dispatcher;
use super::ServerState;
use crate::config::{ServerConfig, TlsSettings};
use crate::connection::{ClientConnection, ConnectionRegistry};
use crate::error::{EventError, ServerError, TransportError};
use crate::events::{CallbackRegistry, EventContext, StartContext};
use crate::messaging::Messenger;
use crate::transport::{self, Transport, TransportKind};
use parking_lot::{Mutex, RwLock};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Address and transport of a started server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerHandle {
    pub local_addr: SocketAddr,
    pub transport: TransportKind,
}

impl ServerHandle {
    /// URL a local client can connect to, e.g. `ws://127.0.0.1:8080/`.
    pub fn url(&self) -> String {
        format!("{}://{}/", self.transport.scheme(), self.local_addr)
    }
}

/// The running listener and the signal that stops it and its connections.
struct ServerInstance {
    handle: ServerHandle,
    shutdown: watch::Sender<bool>,
    accept_task: JoinHandle<()>,
}

/// Owns a WebSocket server and everything user code hooks into.
///
/// # Architecture
///
/// * **Callbacks**: one slot per event kind, shared by every server started
///   through this manager
/// * **Connection registry**: open connections plus the active-connection slot
/// * **Instance**: at most one listening transport at a time
///
/// Callbacks registered before a start call see a fully wired server: the
/// start-success callback runs only after the accept loop is attached and the
/// state is [`ServerState::Listening`].
pub struct ServerManager {
    config: ServerConfig,
    callbacks: Arc<CallbackRegistry>,
    registry: Arc<ConnectionRegistry>,
    state: Arc<RwLock<ServerState>>,
    instance: Mutex<Option<ServerInstance>>,
}

impl std::fmt::Debug for ServerManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerManager")
            .field("config", &self.config)
            .field("state", &*self.state.read())
            .field("instance", &self.handle())
            .field("connections", &self.registry.len())
            .finish()
    }
}

impl Default for ServerManager {
    fn default() -> Self {
        Self::new(ServerConfig::default())
    }
}

impl ServerManager {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            callbacks: Arc::new(CallbackRegistry::new()),
            registry: Arc::new(ConnectionRegistry::new()),
            state: Arc::new(RwLock::new(ServerState::Unstarted)),
            instance: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ServerState {
        *self.state.read()
    }

    /// Handle of the currently running server, if any.
    pub fn handle(&self) -> Option<ServerHandle> {
        self.instance.lock().as_ref().map(|instance| instance.handle)
    }

    /// A cloneable messaging handle bound to this manager.
    pub fn messenger(&self) -> Messenger {
        Messenger::new(self.registry.clone(), self.state.clone())
    }

    // Callback registration. Each call replaces the previous callback of its kind.

    pub fn on_start_success<F>(&self, callback: F)
    where
        F: Fn(&StartContext) -> Result<(), EventError> + Send + Sync + 'static,
    {
        self.callbacks.set_on_start_success(callback);
    }

    pub fn on_start_error<F>(&self, callback: F)
    where
        F: Fn(&ServerError, &StartContext) -> Result<(), EventError> + Send + Sync + 'static,
    {
        self.callbacks.set_on_start_error(callback);
    }

    pub fn on_transport_error<F>(&self, callback: F)
    where
        F: Fn(&TransportError) -> Result<(), EventError> + Send + Sync + 'static,
    {
        self.callbacks.set_on_transport_error(callback);
    }

    pub fn on_connection<F>(&self, callback: F)
    where
        F: Fn(&EventContext) -> Result<(), EventError> + Send + Sync + 'static,
    {
        self.callbacks.set_on_connection(callback);
    }

    pub fn on_message<F>(&self, callback: F)
    where
        F: Fn(&EventContext) -> Result<(), EventError> + Send + Sync + 'static,
    {
        self.callbacks.set_on_message(callback);
    }

    /// Starts a plain WebSocket server on `port`.
    ///
    /// A bind failure fires the start-error callback and is also returned.
    pub async fn start_plain(&self, port: u16) -> Result<ServerHandle, ServerError> {
        let address = self.config.socket_addr(port);
        self.start_transport(address, Transport::Plain).await
    }

    /// Starts a TLS WebSocket server.
    ///
    /// Unreadable certificate or key files fail with
    /// [`ServerError::CertificateLoad`]; material that does not form a valid
    /// TLS configuration fails with [`ServerError::ServerBind`]. Neither fires
    /// a callback and neither touches a server that is already running.
    pub async fn start_secure(&self, settings: &TlsSettings) -> Result<ServerHandle, ServerError> {
        let transport = transport::secure_transport(settings).await?;
        let address = self.config.socket_addr(settings.port);
        self.start_transport(address, transport).await
    }

    async fn start_transport(
        &self,
        address: SocketAddr,
        transport: Transport,
    ) -> Result<ServerHandle, ServerError> {
        let kind = transport.kind();
        info!("🚀 Starting {} server on {}", kind, address);

        if self.handle().is_none() {
            *self.state.write() = ServerState::Starting;
        }

        let listener = match self.bind_replacing(address).await {
            Ok(listener) => listener,
            Err(e) => return Err(self.fail_start(e, address, kind)),
        };
        let local_addr = match listener.local_addr() {
            Ok(local_addr) => local_addr,
            Err(e) => {
                let err = ServerError::Network(format!("Failed to read bound address: {e}"));
                return Err(self.fail_start(err, address, kind));
            }
        };

        let handle = ServerHandle {
            local_addr,
            transport: kind,
        };
        self.attach(listener, transport, handle);

        info!("✅ {} server listening on {}", kind, local_addr);
        self.callbacks.emit_start_success(&StartContext {
            address: local_addr,
            transport: kind,
        });
        Ok(handle)
    }

    /// Binds the new listener, then stops the running instance. When the
    /// running instance holds the requested port it is stopped first and the
    /// bind retried. Any other bind failure leaves it serving.
    async fn bind_replacing(&self, address: SocketAddr) -> Result<TcpListener, ServerError> {
        let backlog = self.config.listen_backlog;
        match transport::bind_listener(address, backlog) {
            Ok(listener) => {
                self.stop_instance().await;
                Ok(listener)
            }
            Err(e) if self.holds_port(address) => {
                debug!("Port {} held by the running server, stopping it first: {}", address.port(), e);
                self.stop_instance().await;
                *self.state.write() = ServerState::Starting;
                transport::bind_listener(address, backlog)
            }
            Err(e) => Err(e),
        }
    }

    fn holds_port(&self, address: SocketAddr) -> bool {
        address.port() != 0
            && self
                .handle()
                .is_some_and(|handle| handle.local_addr.port() == address.port())
    }

    fn attach(&self, listener: TcpListener, transport: Transport, handle: ServerHandle) {
        let dispatcher = Arc::new(Dispatcher::new(
            self.callbacks.clone(),
            self.registry.clone(),
            self.config.max_connections,
        ));
        let (shutdown, shutdown_rx) = watch::channel(false);
        let accept_task = dispatcher.attach(listener, transport, shutdown_rx);

        *self.instance.lock() = Some(ServerInstance {
            handle,
            shutdown,
            accept_task,
        });
        *self.state.write() = ServerState::Listening;
    }

    fn fail_start(&self, err: ServerError, address: SocketAddr, kind: TransportKind) -> ServerError {
        error!("Failed to start {} server on {}: {}", kind, address, err);
        if self.handle().is_none() {
            *self.state.write() = ServerState::Failed;
        }
        self.callbacks.emit_start_error(
            &err,
            &StartContext {
                address,
                transport: kind,
            },
        );
        err
    }

    /// Stops the running instance, if any: the accept loop is ended and the
    /// listener released before this returns, and every open connection is
    /// sent a close frame.
    async fn stop_instance(&self) -> Option<ServerHandle> {
        let instance = self.instance.lock().take()?;
        info!("🧹 Stopping {} server on {}", instance.handle.transport, instance.handle.local_addr);

        let _ = instance.shutdown.send(true);
        instance.accept_task.abort();
        let _ = instance.accept_task.await;

        let closed = self.registry.close_all();
        if closed > 0 {
            info!("Closed {} connection(s)", closed);
        }
        Some(instance.handle)
    }

    /// Shuts the running server down. Messaging operations fail with
    /// [`ServerError::NotInitialized`] afterwards until the next start.
    pub async fn shutdown(&self) -> Result<(), ServerError> {
        info!("🛑 Shutting down server...");
        if self.stop_instance().await.is_some() {
            *self.state.write() = ServerState::Stopped;
        }
        Ok(())
    }

    // Messaging, delegated to a Messenger over the same registry.

    pub fn broadcast(&self, message: &str) -> Result<usize, ServerError> {
        self.messenger().broadcast(message)
    }

    pub fn broadcast_binary(&self, data: &[u8]) -> Result<usize, ServerError> {
        self.messenger().broadcast_binary(data)
    }

    pub fn send_to_active(&self, message: &str) -> Result<(), ServerError> {
        self.messenger().send_to_active(message)
    }

    pub fn send_to(&self, client: &ClientConnection, message: &str) -> Result<(), ServerError> {
        self.messenger().send_to(client, message)
    }

    pub fn send_binary_to(&self, client: &ClientConnection, data: &[u8]) -> Result<(), ServerError> {
        self.messenger().send_binary_to(client, data)
    }

    pub fn list_clients(&self) -> Result<Vec<ClientConnection>, ServerError> {
        self.messenger().list_clients()
    }
}

impl Drop for ServerManager {
    fn drop(&mut self) {
        if let Some(instance) = self.instance.get_mut().take() {
            let _ = instance.shutdown.send(true);
            instance.accept_task.abort();
            self.registry.close_all();
        }
    }
}
