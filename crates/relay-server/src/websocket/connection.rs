//! WebSocket client connection state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use relay_core::{ConnectionId, DeliveryError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::message::RelayMessage;

/// Lifecycle of a connection. `Closed` is absorbing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// Accepting deliveries.
    Open = 0,
    /// Close requested; the write loop is flushing a Close frame.
    Closing = 1,
    /// The write loop has exited.
    Closed = 2,
}

impl ConnectionState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Open,
            1 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Outbound handle for one connected WebSocket client.
///
/// The session task that accepted the socket owns the connection; the
/// registry only holds an `Arc` to deliver to it and to remove it.
pub struct ClientConnection {
    id: ConnectionId,
    /// Send side of the connection's outbound queue.
    tx: mpsc::Sender<RelayMessage>,
    capacity: usize,
    state: AtomicU8,
    /// Deliveries hold this shared; state transitions hold it exclusive, so
    /// nothing is enqueued once `close` has returned.
    gate: RwLock<()>,
    /// Cancelled on close; the write loop watches it.
    close_token: CancellationToken,
    /// When this connection was established.
    pub connected_at: Instant,
    /// Whether the client has shown activity since the last heartbeat check.
    pub is_alive: AtomicBool,
    last_pong: Mutex<Instant>,
    delivered: AtomicU64,
}

impl ClientConnection {
    /// Create a connection around the send side of an outbound queue.
    pub fn new(id: ConnectionId, tx: mpsc::Sender<RelayMessage>) -> Self {
        let now = Instant::now();
        Self {
            id,
            capacity: tx.max_capacity(),
            tx,
            state: AtomicU8::new(ConnectionState::Open as u8),
            gate: RwLock::new(()),
            close_token: CancellationToken::new(),
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(now),
            delivered: AtomicU64::new(0),
        }
    }

    /// Create a connection with a fresh outbound queue of `capacity`.
    ///
    /// Returns the shared handle and the receiving side for the write loop.
    pub fn channel(
        id: ConnectionId,
        capacity: usize,
    ) -> (Arc<Self>, mpsc::Receiver<RelayMessage>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Arc::new(Self::new(id, tx)), rx)
    }

    /// Connection ID.
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether deliveries are still accepted.
    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Queue a message for the write loop without waiting.
    ///
    /// Fails with [`DeliveryError::QueueFull`] when the client is not keeping
    /// up, and with [`DeliveryError::Closed`] once the connection is closing
    /// or its write loop has gone.
    pub fn deliver(&self, message: RelayMessage) -> Result<(), DeliveryError> {
        let _gate = self.gate.read();
        if !self.is_open() {
            return Err(DeliveryError::Closed);
        }
        match self.tx.try_send(message) {
            Ok(()) => {
                let _ = self.delivered.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => Err(DeliveryError::QueueFull {
                capacity: self.capacity,
            }),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(DeliveryError::Closed),
        }
    }

    /// Request close. Idempotent.
    ///
    /// Returns `true` only for the call that moved the connection out of
    /// `Open`. The write loop sends a Close frame and exits.
    pub fn close(&self) -> bool {
        let _gate = self.gate.write();
        let transitioned = self
            .state
            .compare_exchange(
                ConnectionState::Open as u8,
                ConnectionState::Closing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        self.close_token.cancel();
        transitioned
    }

    /// Record that the write loop has exited.
    pub fn mark_closed(&self) {
        let _gate = self.gate.write();
        self.state
            .store(ConnectionState::Closed as u8, Ordering::Release);
        self.close_token.cancel();
    }

    /// Resolves once [`close`](Self::close) or
    /// [`mark_closed`](Self::mark_closed) has been called.
    pub async fn closed(&self) {
        self.close_token.cancelled().await;
    }

    /// Capacity of the outbound queue.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Messages accepted into the outbound queue so far.
    pub fn delivered_count(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Mark the connection as alive (pong or any inbound frame).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Duration since the last pong (or connection establishment).
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Check and reset the alive flag for heartbeat.
    ///
    /// Returns `true` if the connection was alive since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl std::fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}
