//! Connection tracking for open WebSocket clients.
//!
//! This module holds the per-client handle used to address replies and the
//! registry that tracks every open connection plus the most recently active one.

pub mod client;
pub mod registry;

pub use client::{ClientConnection, ClientInfo};
pub use registry::ConnectionRegistry;

/// Type alias for connection identifiers.
///
/// Connection IDs are allocated from a per-registry counter and are never
/// reused while the registry lives.
pub type ConnectionId = usize;
