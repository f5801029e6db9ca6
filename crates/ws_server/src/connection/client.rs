//! Client connection handle.
//!
//! A [`ClientConnection`] is a cheap, cloneable handle to one open socket.
//! Outbound frames are queued on an unbounded channel that the connection's
//! writer task drains, so sending never waits on the remote peer.

use super::ConnectionId;
use crate::error::ServerError;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

/// Represents an individual client connection to the server.
#[derive(Clone)]
pub struct ClientConnection {
    id: ConnectionId,
    remote_addr: SocketAddr,
    connected_at: SystemTime,
    outbound: mpsc::UnboundedSender<Message>,
}

impl std::fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("remote_addr", &self.remote_addr)
            .field("connected_at", &self.connected_at)
            .field("open", &self.is_open())
            .finish()
    }
}

impl ClientConnection {
    /// Creates a handle whose frames are written through `outbound`.
    pub(crate) fn new(
        id: ConnectionId,
        remote_addr: SocketAddr,
        outbound: mpsc::UnboundedSender<Message>,
    ) -> Self {
        Self {
            id,
            remote_addr,
            connected_at: SystemTime::now(),
            outbound,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// The peer as `address:port`, without IPv6 brackets.
    pub fn peer(&self) -> String {
        format!("{}:{}", self.remote_addr.ip(), self.remote_addr.port())
    }

    /// Whether the writer side of this connection is still running.
    pub fn is_open(&self) -> bool {
        !self.outbound.is_closed()
    }

    /// Queues a text frame for this client.
    pub fn send_text(&self, message: &str) -> Result<(), ServerError> {
        self.send_message(Message::text(message))
    }

    /// Queues a binary frame for this client.
    pub fn send_binary(&self, data: Vec<u8>) -> Result<(), ServerError> {
        self.send_message(Message::binary(data))
    }

    pub(crate) fn send_message(&self, message: Message) -> Result<(), ServerError> {
        self.outbound
            .send(message)
            .map_err(|_| ServerError::ConnectionClosed(self.id))
    }

    /// Asks the writer task to send a close frame and stop.
    pub(crate) fn close(&self) {
        let _ = self.outbound.send(Message::Close(None));
    }

    /// Serializable snapshot of this connection.
    pub fn info(&self) -> ClientInfo {
        ClientInfo {
            id: self.id,
            address: self.remote_addr.ip().to_string(),
            port: self.remote_addr.port(),
            connected_at: self
                .connected_at
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default(),
        }
    }
}

/// Plain-data view of a connection, suitable for handing to a host layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub id: ConnectionId,
    pub address: String,
    pub port: u16,
    /// Seconds since the Unix epoch
    pub connected_at: u64,
}
