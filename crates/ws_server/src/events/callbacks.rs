//! User callback slots.
//!
//! Each event kind holds at most one callback. Registering again replaces the
//! previous callback. Callbacks are cloned out of their slot before they run,
//! so a callback may re-register any slot, including its own.

use super::context::{EventContext, StartContext};
use crate::error::{EventError, ServerError, TransportError};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::error;

pub type StartSuccessCallback = Arc<dyn Fn(&StartContext) -> Result<(), EventError> + Send + Sync>;
pub type StartErrorCallback =
    Arc<dyn Fn(&ServerError, &StartContext) -> Result<(), EventError> + Send + Sync>;
pub type TransportErrorCallback = Arc<dyn Fn(&TransportError) -> Result<(), EventError> + Send + Sync>;
pub type EventCallback = Arc<dyn Fn(&EventContext) -> Result<(), EventError> + Send + Sync>;

/// The callback slots shared by every server a manager starts.
#[derive(Default)]
pub struct CallbackRegistry {
    on_start_success: RwLock<Option<StartSuccessCallback>>,
    on_start_error: RwLock<Option<StartErrorCallback>>,
    on_transport_error: RwLock<Option<TransportErrorCallback>>,
    on_connection: RwLock<Option<EventCallback>>,
    on_message: RwLock<Option<EventCallback>>,
}

impl std::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("on_start_success", &self.on_start_success.read().is_some())
            .field("on_start_error", &self.on_start_error.read().is_some())
            .field("on_transport_error", &self.on_transport_error.read().is_some())
            .field("on_connection", &self.on_connection.read().is_some())
            .field("on_message", &self.on_message.read().is_some())
            .finish()
    }
}

/// Logs a failed callback; callback errors never reach the transport.
fn report(kind: &str, result: Result<(), EventError>) {
    if let Err(e) = result {
        error!("{} callback failed: {}", kind, e);
    }
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_on_start_success<F>(&self, callback: F)
    where
        F: Fn(&StartContext) -> Result<(), EventError> + Send + Sync + 'static,
    {
        *self.on_start_success.write() = Some(Arc::new(callback));
    }

    pub fn set_on_start_error<F>(&self, callback: F)
    where
        F: Fn(&ServerError, &StartContext) -> Result<(), EventError> + Send + Sync + 'static,
    {
        *self.on_start_error.write() = Some(Arc::new(callback));
    }

    pub fn set_on_transport_error<F>(&self, callback: F)
    where
        F: Fn(&TransportError) -> Result<(), EventError> + Send + Sync + 'static,
    {
        *self.on_transport_error.write() = Some(Arc::new(callback));
    }

    pub fn set_on_connection<F>(&self, callback: F)
    where
        F: Fn(&EventContext) -> Result<(), EventError> + Send + Sync + 'static,
    {
        *self.on_connection.write() = Some(Arc::new(callback));
    }

    pub fn set_on_message<F>(&self, callback: F)
    where
        F: Fn(&EventContext) -> Result<(), EventError> + Send + Sync + 'static,
    {
        *self.on_message.write() = Some(Arc::new(callback));
    }

    // The emit functions return whether a callback was registered.

    pub(crate) fn emit_start_success(&self, ctx: &StartContext) -> bool {
        let callback = self.on_start_success.read().clone();
        match callback {
            Some(callback) => {
                report("start-success", callback(ctx));
                true
            }
            None => false,
        }
    }

    pub(crate) fn emit_start_error(&self, err: &ServerError, ctx: &StartContext) -> bool {
        let callback = self.on_start_error.read().clone();
        match callback {
            Some(callback) => {
                report("start-error", callback(err, ctx));
                true
            }
            None => false,
        }
    }

    pub(crate) fn emit_transport_error(&self, err: &TransportError) -> bool {
        let callback = self.on_transport_error.read().clone();
        match callback {
            Some(callback) => {
                report("transport-error", callback(err));
                true
            }
            None => false,
        }
    }

    pub(crate) fn emit_connection(&self, ctx: &EventContext) -> bool {
        let callback = self.on_connection.read().clone();
        match callback {
            Some(callback) => {
                report("connection", callback(ctx));
                true
            }
            None => false,
        }
    }

    pub(crate) fn emit_message(&self, ctx: &EventContext) -> bool {
        let callback = self.on_message.read().clone();
        match callback {
            Some(callback) => {
                report("message", callback(ctx));
                true
            }
            None => false,
        }
    }
}
