//! The live reload server.
//!
//! Every request gets the same never-ending `text/event-stream` response,
//! served by hyper over HTTP/1.1. No timer is installed, so there are no
//! idle, header or request timeouts; a connection lives until the client
//! leaves or the server terminates.

use crate::connection::{SseConnection, TransportSocket};
use crate::registry::{ConnectionId, ConnectionRegistry, Registration};
use crate::sse::{
    encode_event, event_stream_response, format_address, DEFAULT_PORT, DEFAULT_RETRY_MS,
    KEEP_ALIVE_FRAME,
};
use crate::termination::TerminationHooks;
use bytes::Bytes;
use futures_util::stream;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use socket2::SockRef;
use std::convert::Infallible;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use swlive_core::LiveEvent;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Pause after a failed accept, typically from running out of descriptors.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Registry specialised to live reload streams.
pub type ServerRegistry = ConnectionRegistry<SseConnection, TransportSocket>;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind live reload server on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub addr: SocketAddr,
    /// Reconnect hint sent with every event.
    pub retry_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
            retry_ms: DEFAULT_RETRY_MS,
        }
    }
}

/// One queued broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub event: String,
    pub payload: String,
}

/// Cloneable handle for broadcasting events.
///
/// Broadcasts are queued and written by a single task on a later scheduler
/// turn, in the order they were sent. Sending never blocks and never fails
/// visibly; with no server behind the handle events are dropped.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    tx: mpsc::UnboundedSender<Notification>,
}

impl Broadcaster {
    /// A handle whose events go nowhere, for sessions without live reload.
    pub fn disabled() -> Self {
        let (tx, _) = mpsc::unbounded_channel();
        Self { tx }
    }

    /// A handle whose events land in the returned receiver instead of on the wire.
    pub fn detached() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queues `event_name` with `payload` for every connected client.
    pub fn broadcast(&self, event_name: &str, payload: &str) {
        let _ = self.tx.send(Notification {
            event: event_name.to_string(),
            payload: payload.to_string(),
        });
    }

    /// Queues a [`LiveEvent`].
    pub fn send(&self, event: &LiveEvent) {
        self.broadcast(event.name(), event.payload());
    }
}

/// A running live reload server.
pub struct LiveReloadServer {
    registry: Arc<ServerRegistry>,
    broadcaster: Broadcaster,
    local_addr: Option<SocketAddr>,
}

impl LiveReloadServer {
    /// Binds the listener and starts accepting clients.
    ///
    /// `on_ready` is called once with the bound address. Termination is armed
    /// on `hooks`, so a signal or process exit tears every connection down.
    pub async fn listen<F>(
        config: ServerConfig,
        hooks: &TerminationHooks,
        on_ready: F,
    ) -> Result<Self, ServerError>
    where
        F: FnOnce(&str),
    {
        let listener = TcpListener::bind(config.addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: config.addr,
                source,
            })?;
        let local_addr = listener.local_addr().ok();

        let registry = Arc::new(ServerRegistry::new());
        {
            let registry = registry.clone();
            hooks.terminate_with(move || registry.terminate());
        }

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_broadcaster(registry.clone(), rx, config.retry_ms));
        tokio::spawn(accept_loop(listener, registry.clone()));

        on_ready(&format_address(local_addr));

        Ok(Self {
            registry,
            broadcaster: Broadcaster { tx },
            local_addr,
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Handle for broadcasting from other tasks.
    pub fn broadcaster(&self) -> Broadcaster {
        self.broadcaster.clone()
    }

    /// Queues an event for every connected client.
    pub fn broadcast(&self, event_name: &str, payload: &str) {
        self.broadcaster.broadcast(event_name, payload);
    }

    /// Number of connected clients.
    pub fn client_count(&self) -> usize {
        self.registry.len()
    }

    pub fn registry(&self) -> &Arc<ServerRegistry> {
        &self.registry
    }

    /// Closes every connection and the listener. Idempotent.
    pub fn terminate(&self) {
        self.registry.terminate();
    }

    pub fn is_terminated(&self) -> bool {
        self.registry.is_terminated()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Accepting
// ─────────────────────────────────────────────────────────────────────────────

/// Accepts until the registry closes the listener.
async fn accept_loop(listener: TcpListener, registry: Arc<ServerRegistry>) {
    let mut closed = registry.listener_closed();

    loop {
        let stop = *closed.borrow_and_update();
        if stop {
            break;
        }

        tokio::select! {
            changed = closed.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => track_connection(stream, peer, &registry),
                Err(e) => accept_failed(&e).await,
            }
        }
    }

    drop(listener);
    // Whoever closed the listener, converge on the same teardown.
    registry.terminate();
    info!("Live reload server stopped");
}

async fn accept_failed(e: &std::io::Error) {
    error!("Accept error: {}", e);
    tokio::time::sleep(ACCEPT_BACKOFF).await;
}

/// Tracks the socket as soon as it is accepted, then serves it on its own task.
///
/// Destroying the tracked socket aborts that task, so a client still sending
/// its request head is torn down like any other.
fn track_connection(stream: TcpStream, peer: SocketAddr, registry: &Arc<ServerRegistry>) {
    let id = registry.next_id();
    let socket = Arc::new(TransportSocket::new(peer));

    if !registry.record_socket(id, Some(socket.clone())) {
        debug!(%peer, "Server shutting down, dropping connection");
        return;
    }

    let task = tokio::spawn(serve_connection(stream, peer, id, registry.clone()));
    socket.attach(task.abort_handle());
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    id: ConnectionId,
    registry: Arc<ServerRegistry>,
) {
    configure_socket(&stream, peer);

    let service = {
        let registry = registry.clone();
        service_fn(move |_request: Request<Incoming>| {
            let response = open_stream(id, peer, &registry);
            async move { Ok::<_, Infallible>(response) }
        })
    };

    let served = http1::Builder::new()
        .serve_connection(TokioIo::new(stream), service)
        .await;
    if let Err(e) = served {
        debug!(%peer, "Connection ended: {}", e);
    }

    registry.close(id);
    debug!(id, %peer, "Live reload client disconnected");
}

/// No Nagle delay, keep-alive probes on.
fn configure_socket(stream: &TcpStream, peer: SocketAddr) {
    if let Err(e) = stream.set_nodelay(true) {
        warn!(%peer, "Failed to set TCP_NODELAY: {}", e);
    }
    if let Err(e) = SockRef::from(stream).set_keepalive(true) {
        warn!(%peer, "Failed to enable TCP keepalive: {}", e);
    }
}

type FrameBody = UnsyncBoxBody<Bytes, Infallible>;

/// Registers the client and builds its endless response.
fn open_stream(id: ConnectionId, peer: SocketAddr, registry: &Arc<ServerRegistry>) -> Response<FrameBody> {
    let (connection, frames) = SseConnection::open(id, peer);
    let connection = Arc::new(connection);
    let registration = registry.record(id, connection.clone());

    if registration.is_some() {
        info!(%peer, clients = registry.len(), "Live reload client connected");

        // Queued behind the response head.
        let registry = registry.clone();
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            if !registry.is_terminated() && connection.is_writable() {
                connection.write(KEEP_ALIVE_FRAME);
            }
        });
    }

    event_stream_response(frame_body(frames, registration))
}

/// Streams queued frames until the connection is destroyed. Dropping the
/// body, which hyper does when the client goes away, closes the connection.
fn frame_body(
    frames: mpsc::Receiver<Bytes>,
    registration: Option<Registration<SseConnection, TransportSocket>>,
) -> FrameBody {
    let frames = stream::unfold((frames, registration), |(mut frames, registration)| async move {
        let frame = frames.recv().await?;
        Some((Ok::<_, Infallible>(Frame::data(frame)), (frames, registration)))
    });
    StreamBody::new(frames).boxed_unsync()
}

// ─────────────────────────────────────────────────────────────────────────────
// Broadcasting
// ─────────────────────────────────────────────────────────────────────────────

/// Drains the broadcast queue in order, fanning each event out to the
/// clients connected at that moment.
async fn run_broadcaster(
    registry: Arc<ServerRegistry>,
    mut rx: mpsc::UnboundedReceiver<Notification>,
    retry_ms: u64,
) {
    while let Some(notification) = rx.recv().await {
        if registry.is_terminated() {
            break;
        }

        let frame = Bytes::from(encode_event(retry_ms, &notification.event, &notification.payload));
        let mut delivered = 0usize;

        for connection in registry.connections() {
            if connection.write(frame.clone()) {
                delivered += 1;
            } else {
                debug!(id = connection.id(), peer = %connection.peer(), "Skipping closed connection");
            }
        }

        debug!(
            event = %notification.event,
            clients = delivered,
            "Broadcast"
        );
    }
}
