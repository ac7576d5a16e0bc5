//! Broadcast hub: the shared inbound queue and its single dispatch loop.
//!
//! Read loops publish into a bounded queue. One [`Dispatcher`] drains it and
//! fans every message out to a snapshot of the registry. Delivery never
//! waits on a client: a member whose outbound queue is full or closed is
//! removed from the registry and closed, and the pass continues.

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use relay_core::{RelayError, Result};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::message::RelayMessage;
use super::registry::ConnectionRegistry;
use crate::metrics::{
    RELAY_DELIVERIES_TOTAL, RELAY_DELIVERY_FAILURES_TOTAL, RELAY_DISPATCH_DURATION_SECONDS,
    RELAY_MESSAGES_PUBLISHED_TOTAL,
};

/// Publishing side of the hub. Cheap to clone; one per read loop.
#[derive(Clone, Debug)]
pub struct BroadcastHub {
    tx: mpsc::Sender<RelayMessage>,
    registry: Arc<ConnectionRegistry>,
}

/// Consuming side of the hub. Exactly one exists per hub.
#[derive(Debug)]
pub struct Dispatcher {
    rx: mpsc::Receiver<RelayMessage>,
    registry: Arc<ConnectionRegistry>,
}

/// Outcome of one fan-out pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Members in the snapshot the pass iterated.
    pub recipients: usize,
    /// Members the message was queued for.
    pub delivered: usize,
    /// Members removed because delivery failed or they were already closing.
    pub failed: usize,
}

impl BroadcastHub {
    /// Create a hub over `registry` with an inbound queue of
    /// `inbound_capacity` messages.
    pub fn new(registry: Arc<ConnectionRegistry>, inbound_capacity: usize) -> (Self, Dispatcher) {
        let (tx, rx) = mpsc::channel(inbound_capacity.max(1));
        let hub = Self {
            tx,
            registry: Arc::clone(&registry),
        };
        (hub, Dispatcher { rx, registry })
    }

    /// Enqueue a message for fan-out, waiting for queue space if needed.
    ///
    /// Never waits on any connection's write. Fails with
    /// [`RelayError::HubClosed`] once the dispatcher has stopped.
    pub async fn publish(&self, message: RelayMessage) -> Result<()> {
        self.tx
            .send(message)
            .await
            .map_err(|_| RelayError::HubClosed)?;
        counter!(RELAY_MESSAGES_PUBLISHED_TOTAL).increment(1);
        Ok(())
    }

    /// Enqueue without waiting.
    ///
    /// Fails with [`RelayError::HubBacklogged`] when the queue is full.
    pub fn try_publish(&self, message: RelayMessage) -> Result<()> {
        match self.tx.try_send(message) {
            Ok(()) => {
                counter!(RELAY_MESSAGES_PUBLISHED_TOTAL).increment(1);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => Err(RelayError::HubBacklogged),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(RelayError::HubClosed),
        }
    }

    /// Whether the dispatcher has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Registry the hub fans out to.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }
}

impl Dispatcher {
    /// Drain the inbound queue until `cancel` fires or every publisher is
    /// gone.
    ///
    /// Messages are dispatched in FIFO order. Once this returns, further
    /// publishes fail with [`RelayError::HubClosed`].
    pub async fn run(mut self, cancel: CancellationToken) {
        info!("dispatcher started");
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    debug!("dispatcher cancelled");
                    break;
                }
                msg = self.rx.recv() => {
                    let Some(message) = msg else {
                        debug!("all publishers gone");
                        break;
                    };
                    let report = dispatch(&self.registry, &message);
                    debug!(
                        kind = message.kind(),
                        len = message.len(),
                        recipients = report.recipients,
                        delivered = report.delivered,
                        failed = report.failed,
                        "message dispatched"
                    );
                }
            }
        }
        self.rx.close();
        info!("dispatcher stopped");
    }
}

/// Deliver `message` to every member of one registry snapshot.
///
/// Members that are already closing, or whose delivery fails, are removed
/// and closed. There is no retry. Connections added during the pass are
/// not part of it.
pub fn dispatch(registry: &ConnectionRegistry, message: &RelayMessage) -> DispatchReport {
    let started = Instant::now();
    let members = registry.snapshot();
    let mut report = DispatchReport {
        recipients: members.len(),
        ..DispatchReport::default()
    };

    for conn in members {
        match conn.deliver(message.clone()) {
            Ok(()) => report.delivered += 1,
            Err(e) => {
                report.failed += 1;
                counter!(RELAY_DELIVERY_FAILURES_TOTAL, "reason" => e.reason()).increment(1);
                if conn.is_open() {
                    warn!(conn_id = %conn.id(), error = %e, "delivery failed, dropping client");
                } else {
                    debug!(conn_id = %conn.id(), "skipping closed client");
                }
                let _ = registry.remove(conn.id());
                let _ = conn.close();
            }
        }
    }

    counter!(RELAY_DELIVERIES_TOTAL).increment(report.delivered as u64);
    histogram!(RELAY_DISPATCH_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
    report
}
