//! The relay: callbacks that turn the server core into a chat-style
//! message relay.
//!
//! In echo mode every message goes back to its sender. In broadcast mode it
//! is forwarded to every connected client, prefixed with the sender's
//! `address:port`.

use crate::config::{RelayMode, RelaySettings};
use tracing::{error, info, warn};
use ws_server::{EventContext, EventError, MessagePayload, ServerManager};

/// Sends `message` back to the connection an event came from.
pub fn reply(ctx: &EventContext, message: &str) -> Result<(), EventError> {
    ctx.client.send_text(message)?;
    Ok(())
}

/// Registers the relay's callbacks on `manager`, replacing any already set.
pub fn install(manager: &ServerManager, settings: &RelaySettings) {
    manager.on_start_success(|ctx| {
        info!("🚀 Relay listening on {}://{}", ctx.transport.scheme(), ctx.address);
        Ok(())
    });

    manager.on_start_error(|err, ctx| {
        error!("❌ Relay failed to start on {}: {}", ctx.address, err);
        Ok(())
    });

    manager.on_transport_error(|err| {
        warn!("⚠️ Transport error: {}", err);
        Ok(())
    });

    let greeting = settings.greeting.clone();
    manager.on_connection(move |ctx| {
        let path = ctx.request().map(|r| r.path.as_str()).unwrap_or("/");
        info!("🔗 {} joined via {}", ctx.peer, path);
        match &greeting {
            Some(greeting) => reply(ctx, greeting),
            None => Ok(()),
        }
    });

    let mode = settings.mode;
    let messenger = manager.messenger();
    manager.on_message(move |ctx| {
        let Some(payload) = ctx.message_payload() else {
            return Ok(());
        };
        match (mode, payload) {
            (RelayMode::Echo, MessagePayload::Text(text)) => reply(ctx, text),
            (RelayMode::Echo, MessagePayload::Binary(data)) => {
                ctx.client.send_binary(data.clone())?;
                Ok(())
            }
            (RelayMode::Broadcast, MessagePayload::Text(text)) => {
                messenger.broadcast(&format!("{}: {}", ctx.peer, text))?;
                Ok(())
            }
            (RelayMode::Broadcast, MessagePayload::Binary(data)) => {
                messenger.broadcast_binary(data)?;
                Ok(())
            }
        }
    });
}
