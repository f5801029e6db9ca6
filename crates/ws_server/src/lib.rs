//! # WebSocket Server Core
//!
//! An event-driven WebSocket server manager. It turns low-level socket events
//! (connection established, message received, error, close) into a small,
//! fixed set of user callbacks, and exposes broadcast, targeted send and a live
//! client roster.
//!
//! ## Architecture Overview
//!
//! * **Transport** ([`transport`]) - plain TCP listeners, optionally fronted by
//!   a TLS acceptor built from a PEM certificate and key
//! * **Connection Registry** ([`connection`]) - open connections and the
//!   most recently active one
//! * **Event Dispatch** - per-connection tasks that fire the connection and
//!   message callbacks in arrival order
//! * **Messaging** ([`messaging`]) - broadcast, unicast and client listing
//! * **Lifecycle** ([`ServerManager`]) - owns the single live server instance
//!
//! ## Example
//!
//! ```no_run
//! use ws_server::{ServerConfig, ServerManager};
//!
//! # async fn run() -> Result<(), ws_server::ServerError> {
//! let manager = ServerManager::new(ServerConfig::default());
//! let messenger = manager.messenger();
//!
//! manager.on_message(move |ctx| {
//!     if let Some(text) = ctx.message_payload().and_then(|p| p.as_text()) {
//!         messenger.broadcast(&format!("{}: {}", ctx.peer, text))?;
//!     }
//!     Ok(())
//! });
//!
//! manager.start_plain(8080).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Start, messaging and roster operations return [`ServerError`]. Failures of
//! an already running transport are [`TransportError`]s and only reach user
//! code through the transport-error callback.
//!
//! ## Thread Safety
//!
//! Callbacks for different connections may run concurrently on different
//! runtime threads. Callbacks for a single connection run one at a time, in the
//! order its frames arrived.

pub use config::{ServerConfig, TlsSettings};
pub use connection::{ClientConnection, ClientInfo, ConnectionId};
pub use error::{EventError, ServerError, TransportError};
pub use events::{EventContext, EventTarget, MessagePayload, RequestMeta, StartContext};
pub use messaging::Messenger;
pub use server::{ServerHandle, ServerManager, ServerState};
pub use transport::TransportKind;

pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod messaging;
pub mod server;
pub mod transport;
