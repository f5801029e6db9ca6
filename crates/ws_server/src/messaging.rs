//! Broadcast and targeted sends.
//!
//! A [`Messenger`] is a cheap clone of the manager's registry and state, meant
//! to be captured by callbacks that reply or fan out. All sends are
//! fire-and-forget: frames are queued on each connection's writer and the call
//! returns without waiting for the peer.

use crate::connection::{ClientConnection, ConnectionRegistry};
use crate::error::ServerError;
use crate::server::ServerState;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio_tungstenite::tungstenite::Message;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct Messenger {
    registry: Arc<ConnectionRegistry>,
    state: Arc<RwLock<ServerState>>,
}

impl Messenger {
    pub(crate) fn new(registry: Arc<ConnectionRegistry>, state: Arc<RwLock<ServerState>>) -> Self {
        Self { registry, state }
    }

    fn ensure_listening(&self) -> Result<(), ServerError> {
        if self.state.read().is_listening() {
            Ok(())
        } else {
            Err(ServerError::NotInitialized)
        }
    }

    /// Sends `message` to every open connection.
    ///
    /// Connections that fail are logged and skipped. Returns the number of
    /// connections the frame was queued for.
    pub fn broadcast(&self, message: &str) -> Result<usize, ServerError> {
        self.broadcast_message(Message::text(message))
    }

    pub fn broadcast_binary(&self, data: &[u8]) -> Result<usize, ServerError> {
        self.broadcast_message(Message::binary(data.to_vec()))
    }

    fn broadcast_message(&self, message: Message) -> Result<usize, ServerError> {
        self.ensure_listening()?;
        let mut delivered = 0;
        for client in self.registry.list() {
            match client.send_message(message.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => warn!("Broadcast skipped connection {}: {}", client.id(), e),
            }
        }
        Ok(delivered)
    }

    /// Sends `message` to whichever connection was most recently active.
    ///
    /// With several clients talking at once this may not be the client whose
    /// callback is running; prefer [`Messenger::send_to`] with the context's
    /// connection handle.
    pub fn send_to_active(&self, message: &str) -> Result<(), ServerError> {
        self.ensure_listening()?;
        let active = self
            .registry
            .get_active()
            .ok_or(ServerError::NoActiveConnection)?;
        active.send_text(message)
    }

    pub fn send_to(&self, client: &ClientConnection, message: &str) -> Result<(), ServerError> {
        self.ensure_listening()?;
        client.send_text(message)
    }

    pub fn send_binary_to(&self, client: &ClientConnection, data: &[u8]) -> Result<(), ServerError> {
        self.ensure_listening()?;
        client.send_binary(data.to_vec())
    }

    /// Snapshot of the open connections.
    pub fn list_clients(&self) -> Result<Vec<ClientConnection>, ServerError> {
        self.ensure_listening()?;
        Ok(self.registry.list())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    struct Fixture {
        messenger: Messenger,
        registry: Arc<ConnectionRegistry>,
        state: Arc<RwLock<ServerState>>,
    }

    fn fixture(state: ServerState) -> Fixture {
        let registry = Arc::new(ConnectionRegistry::new());
        let state = Arc::new(RwLock::new(state));
        Fixture {
            messenger: Messenger::new(registry.clone(), state.clone()),
            registry,
            state,
        }
    }

    fn add_client(
        registry: &ConnectionRegistry,
        port: u16,
    ) -> (ClientConnection, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let client = ClientConnection::new(
            registry.next_id(),
            format!("127.0.0.1:{port}").parse().unwrap(),
            tx,
        );
        registry.add(client.clone());
        (client, rx)
    }

    #[test]
    fn test_operations_require_listening_server() {
        let states = [
            ServerState::Unstarted,
            ServerState::Starting,
            ServerState::Failed,
            ServerState::Stopped,
        ];
        for state in states {
            let f = fixture(state);
            assert!(matches!(f.messenger.broadcast("x"), Err(ServerError::NotInitialized)));
            assert!(matches!(f.messenger.send_to_active("x"), Err(ServerError::NotInitialized)));
            assert!(matches!(f.messenger.list_clients(), Err(ServerError::NotInitialized)));
        }
    }

    #[test]
    fn test_broadcast_reaches_every_client_once() {
        let f = fixture(ServerState::Listening);
        let (_a, mut ra) = add_client(&f.registry, 1);
        let (_b, mut rb) = add_client(&f.registry, 2);
        let (_c, mut rc) = add_client(&f.registry, 3);

        assert_eq!(f.messenger.broadcast("x").unwrap(), 3);
        for rx in [&mut ra, &mut rb, &mut rc] {
            assert_eq!(rx.try_recv().unwrap(), Message::text("x"));
            assert!(rx.try_recv().is_err());
        }
    }

    #[test]
    fn test_broadcast_skips_closed_connections() {
        let f = fixture(ServerState::Listening);
        let (_a, ra) = add_client(&f.registry, 1);
        let (_b, mut rb) = add_client(&f.registry, 2);
        drop(ra);

        assert_eq!(f.messenger.broadcast("still here").unwrap(), 1);
        assert_eq!(rb.try_recv().unwrap(), Message::text("still here"));
    }

    #[test]
    fn test_send_to_active_without_activity_errors() {
        let f = fixture(ServerState::Listening);
        let _client = add_client(&f.registry, 1);
        assert!(matches!(
            f.messenger.send_to_active("y"),
            Err(ServerError::NoActiveConnection)
        ));
    }

    #[test]
    fn test_send_to_active_targets_latest_sender() {
        let f = fixture(ServerState::Listening);
        let (a, mut ra) = add_client(&f.registry, 1);
        let (b, mut rb) = add_client(&f.registry, 2);

        f.registry.set_active(&b);
        f.registry.set_active(&a);
        f.messenger.send_to_active("y").unwrap();

        assert_eq!(ra.try_recv().unwrap(), Message::text("y"));
        assert!(rb.try_recv().is_err());
    }

    #[test]
    fn test_explicit_send_goes_only_to_target() {
        let f = fixture(ServerState::Listening);
        let (a, mut ra) = add_client(&f.registry, 1);
        let (_b, mut rb) = add_client(&f.registry, 2);

        f.messenger.send_to(&a, "just you").unwrap();
        f.messenger.send_binary_to(&a, &[9, 9]).unwrap();
        assert_eq!(ra.try_recv().unwrap(), Message::text("just you"));
        assert_eq!(ra.try_recv().unwrap(), Message::binary(vec![9, 9]));
        assert!(rb.try_recv().is_err());
    }

    #[test]
    fn test_list_reflects_state_changes() {
        let f = fixture(ServerState::Listening);
        let (a, _ra) = add_client(&f.registry, 1);
        assert_eq!(f.messenger.list_clients().unwrap().len(), 1);

        f.registry.remove(a.id());
        assert!(f.messenger.list_clients().unwrap().is_empty());

        *f.state.write() = ServerState::Stopped;
        assert!(f.messenger.list_clients().is_err());
    }
}
