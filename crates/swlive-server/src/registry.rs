//! Bookkeeping for live connections and their transport sockets.
//!
//! The registry is the only owner allowed to destroy a connection. Every
//! path that ends a connection (the client going away, the server shutting
//! down, the process being told to stop) goes through [`ConnectionRegistry::close`]
//! or [`ConnectionRegistry::terminate`], and both are safe to race.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

/// Identity of a registered connection. Allocated in accept order.
pub type ConnectionId = u64;

/// A resource that can be released exactly once.
pub trait Destroy: Send + Sync {
    /// Releases the resource. Calling it again must be a no-op.
    fn destroy(&self);

    fn is_destroyed(&self) -> bool;
}

struct Tracked<C, S> {
    connections: BTreeMap<ConnectionId, Arc<C>>,
    sockets: BTreeMap<ConnectionId, Arc<S>>,
    terminated: bool,
}

/// Live connections (`C`) and their sockets (`S`), keyed by connection id.
///
/// Once terminated the registry stays terminated: anything recorded later is
/// destroyed on the spot and never tracked.
pub struct ConnectionRegistry<C, S> {
    tracked: Mutex<Tracked<C, S>>,
    next_id: AtomicU64,
    listener_closed: watch::Sender<bool>,
}

impl<C: Destroy, S: Destroy> Default for ConnectionRegistry<C, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Destroy, S: Destroy> ConnectionRegistry<C, S> {
    /// Creates an empty, live registry.
    pub fn new() -> Self {
        let (listener_closed, _) = watch::channel(false);

        Self {
            tracked: Mutex::new(Tracked {
                connections: BTreeMap::new(),
                sockets: BTreeMap::new(),
                terminated: false,
            }),
            next_id: AtomicU64::new(1),
            listener_closed,
        }
    }

    /// Allocates the id for the next connection.
    pub fn next_id(&self) -> ConnectionId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Tracks a connection.
    ///
    /// Returns a [`Registration`] that closes the connection when dropped;
    /// hold it for as long as the client is there. Returns `None`, after
    /// destroying the connection, if the registry is already terminated.
    pub fn record(
        self: &Arc<Self>,
        id: ConnectionId,
        connection: Arc<C>,
    ) -> Option<Registration<C, S>> {
        {
            let mut tracked = self.tracked.lock();
            if !tracked.terminated {
                tracked.connections.insert(id, connection);
                return Some(Registration {
                    registry: Arc::clone(self),
                    id,
                });
            }
        }

        debug!(id, "Connection arrived after shutdown, destroying");
        connection.destroy();
        None
    }

    /// Tracks the transport socket paired with connection `id`.
    ///
    /// A missing socket is a no-op. Returns `false`, after destroying the
    /// socket, if the registry is already terminated.
    pub fn record_socket(&self, id: ConnectionId, socket: Option<Arc<S>>) -> bool {
        let Some(socket) = socket else {
            return true;
        };

        {
            let mut tracked = self.tracked.lock();
            if !tracked.terminated {
                tracked.sockets.insert(id, socket);
                return true;
            }
        }

        socket.destroy();
        false
    }

    /// Removes connection `id` and its socket, destroying both.
    ///
    /// Unknown or already closed ids are ignored.
    pub fn close(&self, id: ConnectionId) {
        let (connection, socket) = {
            let mut tracked = self.tracked.lock();
            (tracked.connections.remove(&id), tracked.sockets.remove(&id))
        };

        if let Some(connection) = connection {
            connection.destroy();
        }
        if let Some(socket) = socket {
            socket.destroy();
        }
    }

    /// Destroys everything and closes the listener.
    ///
    /// Idempotent and panic-free; later calls do nothing.
    pub fn terminate(&self) {
        let (connections, sockets) = {
            let mut tracked = self.tracked.lock();
            if tracked.terminated {
                return;
            }
            tracked.terminated = true;
            (
                std::mem::take(&mut tracked.connections),
                std::mem::take(&mut tracked.sockets),
            )
        };

        debug!(
            connections = connections.len(),
            sockets = sockets.len(),
            "Terminating connection registry"
        );

        for connection in connections.values() {
            connection.destroy();
        }
        for socket in sockets.values() {
            socket.destroy();
        }

        self.listener_closed.send_replace(true);
    }

    pub fn is_terminated(&self) -> bool {
        self.tracked.lock().terminated
    }

    /// Snapshot of the live connections in registration order.
    pub fn connections(&self) -> Vec<Arc<C>> {
        self.tracked.lock().connections.values().cloned().collect()
    }

    /// Number of tracked connections.
    pub fn len(&self) -> usize {
        self.tracked.lock().connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of tracked sockets.
    pub fn socket_count(&self) -> usize {
        self.tracked.lock().sockets.len()
    }

    /// Flips to `true` once the listener must stop accepting.
    pub fn listener_closed(&self) -> watch::Receiver<bool> {
        self.listener_closed.subscribe()
    }
}

/// Close handle for one recorded connection.
///
/// Dropping it closes the connection through the registry, exactly like the
/// client going away. Closing after termination is a no-op.
pub struct Registration<C: Destroy, S: Destroy> {
    registry: Arc<ConnectionRegistry<C, S>>,
    id: ConnectionId,
}

impl<C: Destroy, S: Destroy> Registration<C, S> {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl<C: Destroy, S: Destroy> Drop for Registration<C, S> {
    fn drop(&mut self) {
        self.registry.close(self.id);
    }
}
