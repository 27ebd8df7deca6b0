//! Connection and socket handles tracked by the registry.

use crate::registry::{ConnectionId, Destroy};
use bytes::Bytes;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::AbortHandle;
use tracing::debug;

/// Frames a client may fall behind by before further frames are dropped.
pub const FRAME_QUEUE_CAPACITY: usize = 64;

/// The server-to-client side of a live reload stream.
///
/// Frames go into a bounded queue that the response body drains, so a slow
/// client never holds up a broadcast to the others. A full queue counts as
/// not writable: the frame is dropped rather than buffered. Destroying the
/// connection closes the queue, which ends the response body.
pub struct SseConnection {
    id: ConnectionId,
    peer: SocketAddr,
    frames: Mutex<Option<mpsc::Sender<Bytes>>>,
    destroyed: AtomicBool,
}

impl SseConnection {
    /// Creates a connection and the receiving end of its frame queue.
    pub fn open(id: ConnectionId, peer: SocketAddr) -> (Self, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(FRAME_QUEUE_CAPACITY);
        let connection = Self {
            id,
            peer,
            frames: Mutex::new(Some(tx)),
            destroyed: AtomicBool::new(false),
        };
        (connection, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// True while a frame written now would be queued for the client.
    pub fn is_writable(&self) -> bool {
        if self.destroyed.load(Ordering::SeqCst) {
            return false;
        }
        self.frames
            .lock()
            .as_ref()
            .is_some_and(|tx| !tx.is_closed() && tx.capacity() > 0)
    }

    /// Queues a frame. Returns `false`, dropping the frame, if the
    /// connection is gone or the client is not keeping up.
    pub fn write(&self, frame: impl Into<Bytes>) -> bool {
        if self.destroyed.load(Ordering::SeqCst) {
            return false;
        }

        let frames = self.frames.lock();
        let Some(tx) = frames.as_ref() else {
            return false;
        };

        match tx.try_send(frame.into()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!(id = self.id, peer = %self.peer, "Client not keeping up, frame dropped");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

impl Destroy for SseConnection {
    fn destroy(&self) {
        if !self.destroyed.swap(true, Ordering::SeqCst) {
            self.frames.lock().take();
        }
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }
}

/// The transport side of a connection: the task serving the socket.
///
/// Destroying it aborts that task, which drops the stream and closes the
/// file descriptor, whether the client is mid-handshake or streaming.
pub struct TransportSocket {
    peer: SocketAddr,
    task: Mutex<Option<AbortHandle>>,
    destroyed: AtomicBool,
}

impl TransportSocket {
    pub fn new(peer: SocketAddr) -> Self {
        Self {
            peer,
            task: Mutex::new(None),
            destroyed: AtomicBool::new(false),
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Attaches the serving task. If the socket was already destroyed the
    /// task is aborted right away.
    pub fn attach(&self, task: AbortHandle) {
        let mut slot = self.task.lock();
        if self.destroyed.load(Ordering::SeqCst) {
            task.abort();
        } else {
            *slot = Some(task);
        }
    }
}

impl Destroy for TransportSocket {
    fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        let task = self.task.lock().take();
        if let Some(task) = task {
            task.abort();
        }
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }
}
