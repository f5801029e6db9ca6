//! Server lifecycle and event dispatch.

pub mod core;
mod dispatcher;

pub use self::core::{ServerHandle, ServerManager};

/// Lifecycle state of a [`ServerManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerState {
    /// No start has been attempted yet
    Unstarted,
    /// A start call is binding its listener
    Starting,
    /// A listener is accepting connections
    Listening,
    /// The most recent start attempt failed to bind
    Failed,
    /// The server was shut down explicitly
    Stopped,
}

impl ServerState {
    pub fn is_listening(self) -> bool {
        self == ServerState::Listening
    }
}

impl std::fmt::Display for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ServerState::Unstarted => "unstarted",
            ServerState::Starting => "starting",
            ServerState::Listening => "listening",
            ServerState::Failed => "failed",
            ServerState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}
