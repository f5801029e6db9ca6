//! Transport event wiring.
//!
//! Every accepted socket gets its own task. The task performs the TLS and
//! WebSocket handshakes, registers the connection, fires the connection
//! callback and then reads frames in arrival order, firing the message
//! callback for each data frame. Outbound frames go through a separate writer
//! task fed by the connection's channel.

use crate::connection::{ClientConnection, ConnectionRegistry};
use crate::error::TransportError;
use crate::events::{CallbackRegistry, EventContext, MessagePayload, RequestMeta};
use crate::transport::Transport;
use futures::{SinkExt, StreamExt};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Duration};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

/// Pause after a failed `accept` so a persistent error does not spin.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Upper bound for the TLS and WebSocket handshakes of one socket.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Why a handshake stage did not produce a stream.
enum Interrupted {
    Shutdown,
    TimedOut,
}

/// Shared state every connection task dispatches into.
#[derive(Debug)]
pub(crate) struct Dispatcher {
    callbacks: Arc<CallbackRegistry>,
    registry: Arc<ConnectionRegistry>,
    /// One permit per allowed connection; `None` when unlimited
    slots: Option<Arc<Semaphore>>,
    max_connections: usize,
}

impl Dispatcher {
    pub(crate) fn new(
        callbacks: Arc<CallbackRegistry>,
        registry: Arc<ConnectionRegistry>,
        max_connections: usize,
    ) -> Self {
        let slots = (max_connections > 0).then(|| Arc::new(Semaphore::new(max_connections)));
        Self {
            callbacks,
            registry,
            slots,
            max_connections,
        }
    }

    /// Reserves a connection slot. `Ok(None)` means no limit is configured.
    fn reserve_slot(&self) -> Result<Option<OwnedSemaphorePermit>, ()> {
        match &self.slots {
            None => Ok(None),
            Some(slots) => slots.clone().try_acquire_owned().map(Some).map_err(|_| ()),
        }
    }

    /// Runs one handshake stage, giving up when the server stops or the
    /// stage exceeds [`HANDSHAKE_TIMEOUT`].
    async fn guarded<F: Future>(
        fut: F,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<F::Output, Interrupted> {
        if *shutdown.borrow() {
            return Err(Interrupted::Shutdown);
        }
        tokio::select! {
            result = timeout(HANDSHAKE_TIMEOUT, fut) => result.map_err(|_| Interrupted::TimedOut),
            _ = shutdown.changed() => Err(Interrupted::Shutdown),
        }
    }

    fn log_interrupted(addr: SocketAddr, stage: &str, reason: Interrupted) {
        match reason {
            Interrupted::Shutdown => debug!("Dropping {} handshake from {}: server stopped", stage, addr),
            Interrupted::TimedOut => warn!("{} handshake from {} timed out", stage, addr),
        }
    }
    fn report_transport_error(&self, err: TransportError) {
        error!("{}", err);
        self.callbacks.emit_transport_error(&err);
    }

    /// Spawns the accept loop for `listener`. The loop ends when `shutdown`
    /// changes or its sender is dropped.
    pub(crate) fn attach(
        self: &Arc<Self>,
        listener: TcpListener,
        transport: Transport,
        shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let dispatcher = self.clone();
        tokio::spawn(async move { dispatcher.accept_loop(listener, transport, shutdown).await })
    }

    async fn accept_loop(
        self: Arc<Self>,
        listener: TcpListener,
        transport: Transport,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        let dispatcher = self.clone();
                        let transport = transport.clone();
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            dispatcher.accept_stream(stream, addr, transport, shutdown).await;
                        });
                    }
                    Err(e) => {
                        self.report_transport_error(TransportError::Accept(e));
                        sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                },
                _ = shutdown.changed() => {
                    info!("🛑 Listener on {:?} stopped", listener.local_addr().ok());
                    break;
                }
            }
        }
    }

    async fn accept_stream(
        self: Arc<Self>,
        stream: tokio::net::TcpStream,
        addr: SocketAddr,
        transport: Transport,
        mut shutdown: watch::Receiver<bool>,
    ) {
        match transport {
            Transport::Plain => self.handle_connection(stream, addr, shutdown).await,
            Transport::Secure(acceptor) => {
                match Self::guarded(acceptor.accept(stream), &mut shutdown).await {
                    Ok(Ok(tls_stream)) => self.handle_connection(tls_stream, addr, shutdown).await,
                    Ok(Err(source)) => {
                        self.report_transport_error(TransportError::Tls { peer: addr, source })
                    }
                    Err(reason) => Self::log_interrupted(addr, "TLS", reason),
                }
            }
        }
    }

    async fn handle_connection<S>(
        &self,
        stream: S,
        addr: SocketAddr,
        mut shutdown: watch::Receiver<bool>,
    ) where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let mut request_meta = None;
        let handshake = accept_hdr_async(stream, |request: &Request, response: Response| {
            request_meta = Some(RequestMeta::from_request(request, addr));
            Ok(response)
        });

        let mut ws_stream = match Self::guarded(handshake, &mut shutdown).await {
            Ok(Ok(ws_stream)) => ws_stream,
            Ok(Err(source)) => {
                self.report_transport_error(TransportError::Handshake { peer: addr, source });
                return;
            }
            Err(reason) => {
                Self::log_interrupted(addr, "WebSocket", reason);
                return;
            }
        };

        // Held until this task ends so the slot frees only when the socket does.
        let _slot = match self.reserve_slot() {
            Ok(slot) => slot,
            Err(()) => {
                warn!(
                    "Rejecting connection from {}: limit of {} connections reached",
                    addr, self.max_connections
                );
                let _ = ws_stream.close(None).await;
                return;
            }
        };

        if *shutdown.borrow() {
            let _ = ws_stream.close(None).await;
            return;
        }

        let (mut sink, mut source) = ws_stream.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
        let client = ClientConnection::new(self.registry.next_id(), addr, outbound);
        let id = client.id();

        tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                let closing = matches!(message, Message::Close(_));
                if let Err(e) = sink.send(message).await {
                    debug!("Writer for connection {} stopped: {}", id, e);
                    break;
                }
                if closing {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        self.registry.add(client.clone());
        self.registry.set_active(&client);
        info!("🔗 Connection {} established from {}", id, addr);

        let request = request_meta.unwrap_or_else(|| RequestMeta {
            uri: String::from("/"),
            path: String::from("/"),
            query: None,
            headers: Vec::new(),
            remote_addr: addr,
        });
        self.callbacks
            .emit_connection(&EventContext::connection(request, client.clone()));

        loop {
            tokio::select! {
                frame = source.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        self.dispatch_message(&client, MessagePayload::Text(text.as_str().to_owned()));
                    }
                    Some(Ok(Message::Binary(data))) => {
                        self.dispatch_message(&client, MessagePayload::Binary(data.to_vec()));
                    }
                    Some(Ok(Message::Close(frame))) => {
                        info!("ws::close connection {} from {}: {:?}", id, addr, frame);
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        self.report_transport_error(TransportError::Connection { id, peer: addr, source: err });
                        break;
                    }
                    None => {
                        info!("ws::close connection {} from {}: stream ended", id, addr);
                        break;
                    }
                },
                _ = shutdown.changed() => {
                    debug!("Closing connection {} for server shutdown", id);
                    break;
                }
            }
        }

        client.close();
        self.registry.remove(id);
        info!("❌ Connection {} from {} closed", id, addr);
    }

    fn dispatch_message(&self, client: &ClientConnection, payload: MessagePayload) {
        debug!(
            "Message of {} bytes from connection {} ({})",
            payload.len(),
            client.id(),
            client.peer()
        );
        self.registry.set_active(client);
        self.callbacks
            .emit_message(&EventContext::message(payload, client.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dispatcher(max_connections: usize) -> Dispatcher {
        Dispatcher::new(
            Arc::new(CallbackRegistry::new()),
            Arc::new(ConnectionRegistry::new()),
            max_connections,
        )
    }

    #[test]
    fn test_slots_are_reserved_up_to_the_limit() {
        let dispatcher = dispatcher(2);
        let first = dispatcher.reserve_slot().unwrap();
        let second = dispatcher.reserve_slot().unwrap();
        assert!(first.is_some() && second.is_some());
        assert!(dispatcher.reserve_slot().is_err());

        drop(first);
        assert!(dispatcher.reserve_slot().unwrap().is_some());
    }

    #[test]
    fn test_zero_limit_is_unlimited() {
        let dispatcher = dispatcher(0);
        let held: Vec<_> = (0..64).map(|_| dispatcher.reserve_slot().unwrap()).collect();
        assert!(held.iter().all(Option::is_none));
    }

    #[tokio::test]
    async fn test_guarded_stage_stops_on_shutdown() {
        let (tx, mut rx) = watch::channel(false);
        let pending = Dispatcher::guarded(std::future::pending::<()>(), &mut rx);
        let stop = async {
            sleep(Duration::from_millis(20)).await;
            let _ = tx.send(true);
        };
        let (result, ()) = tokio::join!(pending, stop);
        assert!(matches!(result, Err(Interrupted::Shutdown)));

        let again = Dispatcher::guarded(async { 7 }, &mut rx).await;
        assert!(matches!(again, Err(Interrupted::Shutdown)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_guarded_stage_times_out() {
        let (_tx, mut rx) = watch::channel(false);
        let result = Dispatcher::guarded(std::future::pending::<()>(), &mut rx).await;
        assert!(matches!(result, Err(Interrupted::TimedOut)));
    }
}
