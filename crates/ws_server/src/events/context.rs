//! Per-dispatch event contexts.
//!
//! A fresh context is built for every callback invocation. Connection events
//! carry the HTTP upgrade request as their target, message events carry the
//! received frame.

use crate::connection::ClientConnection;
use crate::transport::TransportKind;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio_tungstenite::tungstenite::handshake::server::Request;

/// Context passed to the start-success and start-error callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartContext {
    /// Bound address on success, requested address on failure
    pub address: SocketAddr,
    pub transport: TransportKind,
}

/// Metadata captured from the WebSocket upgrade request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMeta {
    pub uri: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: Vec<(String, String)>,
    pub remote_addr: SocketAddr,
}

impl RequestMeta {
    pub(crate) fn from_request(request: &Request, remote_addr: SocketAddr) -> Self {
        let headers = request
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();

        Self {
            uri: request.uri().to_string(),
            path: request.uri().path().to_string(),
            query: request.uri().query().map(str::to_string),
            headers,
            remote_addr,
        }
    }

    /// First value of header `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// A received WebSocket data frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessagePayload {
    Text(String),
    Binary(Vec<u8>),
}

impl MessagePayload {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MessagePayload::Text(text) => Some(text),
            MessagePayload::Binary(_) => None,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            MessagePayload::Text(text) => text.as_bytes(),
            MessagePayload::Binary(data) => data,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }
}

/// What an event is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventTarget {
    Connection(RequestMeta),
    Message(MessagePayload),
}

/// Context handed to the connection and message callbacks.
#[derive(Debug, Clone)]
pub struct EventContext {
    pub target: EventTarget,
    /// The sender as `address:port`
    pub peer: String,
    /// Handle of the connection the event came from
    pub client: ClientConnection,
}

impl EventContext {
    pub(crate) fn connection(request: RequestMeta, client: ClientConnection) -> Self {
        Self {
            target: EventTarget::Connection(request),
            peer: client.peer(),
            client,
        }
    }

    pub(crate) fn message(payload: MessagePayload, client: ClientConnection) -> Self {
        Self {
            target: EventTarget::Message(payload),
            peer: client.peer(),
            client,
        }
    }

    pub fn request(&self) -> Option<&RequestMeta> {
        match &self.target {
            EventTarget::Connection(request) => Some(request),
            EventTarget::Message(_) => None,
        }
    }

    pub fn message_payload(&self) -> Option<&MessagePayload> {
        match &self.target {
            EventTarget::Message(payload) => Some(payload),
            EventTarget::Connection(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn request() -> Request {
        Request::builder()
            .uri("/chat?room=lobby")
            .header("Host", "localhost:9000")
            .header("User-Agent", "test-agent")
            .body(())
            .unwrap()
    }

    #[test]
    fn test_request_meta_captures_path_query_and_headers() {
        let addr: SocketAddr = "127.0.0.1:40000".parse().unwrap();
        let meta = RequestMeta::from_request(&request(), addr);

        assert_eq!(meta.path, "/chat");
        assert_eq!(meta.query.as_deref(), Some("room=lobby"));
        assert_eq!(meta.header("user-agent"), Some("test-agent"));
        assert_eq!(meta.header("HOST"), Some("localhost:9000"));
        assert_eq!(meta.header("missing"), None);
        assert_eq!(meta.remote_addr, addr);
    }

    #[test]
    fn test_message_context_carries_peer_and_payload() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let client = ClientConnection::new(1, "10.1.2.3:5000".parse().unwrap(), tx);
        let ctx = EventContext::message(MessagePayload::Text("hi".into()), client);

        assert_eq!(ctx.peer, "10.1.2.3:5000");
        assert_eq!(ctx.message_payload().and_then(MessagePayload::as_text), Some("hi"));
        assert!(ctx.request().is_none());
    }

    #[test]
    fn test_binary_payload_has_no_text_view() {
        let payload = MessagePayload::Binary(vec![0xff, 0x00]);
        assert_eq!(payload.as_text(), None);
        assert_eq!(payload.as_bytes(), &[0xff, 0x00]);
        assert_eq!(payload.len(), 2);
    }
}
