//! WebSocket session lifecycle: one accepted client from upgrade through
//! disconnect.
//!
//! Each session runs a read loop (publishing into the hub), a spawned write
//! loop (draining the connection's outbound queue and sending pings) and a
//! heartbeat checker. Whichever ends first tears the whole session down:
//! the connection is removed from the registry and closed, and the write
//! loop gets a bounded window to flush a Close frame.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use relay_core::ConnectionId;
use tokio::sync::mpsc;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::connection::ClientConnection;
use super::heartbeat::{HeartbeatResult, run_heartbeat};
use super::hub::BroadcastHub;
use super::message::RelayMessage;
use crate::config::ServerConfig;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};

/// Why a session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The client sent Close or the stream ended.
    ClientClosed,
    /// Reading a frame failed (protocol error, oversized message, reset).
    ReadFailed,
    /// The write loop exited (write error, write timeout, or close request).
    WriteEnded,
    /// No pong within the heartbeat timeout.
    HeartbeatTimeout,
    /// The heartbeat task panicked.
    HeartbeatFailed,
    /// The dispatcher is gone.
    HubClosed,
    /// The server is shutting down.
    Shutdown,
}

impl DisconnectReason {
    /// Short label for logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ClientClosed => "client_closed",
            Self::ReadFailed => "read_failed",
            Self::WriteEnded => "write_ended",
            Self::HeartbeatTimeout => "heartbeat_timeout",
            Self::HeartbeatFailed => "heartbeat_failed",
            Self::HubClosed => "hub_closed",
            Self::Shutdown => "shutdown",
        }
    }
}

/// Run a session for an upgraded socket until it disconnects.
#[instrument(skip_all, fields(conn_id = %id))]
pub async fn run_connection(
    socket: WebSocket,
    id: ConnectionId,
    hub: BroadcastHub,
    config: Arc<ServerConfig>,
    shutdown: CancellationToken,
) -> DisconnectReason {
    let (ws_tx, mut ws_rx) = socket.split();
    let (connection, outbound_rx) =
        ClientConnection::channel(id.clone(), config.outbound_queue_capacity);

    let registry = Arc::clone(hub.registry());
    if !registry.add(Arc::clone(&connection)) {
        warn!("connection id already registered, refusing session");
        return DisconnectReason::ClientClosed;
    }

    info!(connections = registry.len(), "client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    let mut writer = tokio::spawn(write_loop(
        ws_tx,
        outbound_rx,
        Arc::clone(&connection),
        config.write_timeout,
        config.heartbeat_interval,
    ));
    let heartbeat_cancel = shutdown.child_token();
    let mut heartbeat = tokio::spawn(run_heartbeat(
        Arc::clone(&connection),
        config.heartbeat_interval,
        config.heartbeat_timeout,
        heartbeat_cancel.clone(),
    ));

    let reason = tokio::select! {
        reason = read_loop(&mut ws_rx, &connection, &hub) => reason,
        _ = &mut writer => DisconnectReason::WriteEnded,
        result = &mut heartbeat => match result {
            Ok(HeartbeatResult::TimedOut) => {
                warn!(
                    silent_for = ?connection.last_pong_elapsed(),
                    "client unresponsive, disconnecting"
                );
                DisconnectReason::HeartbeatTimeout
            }
            Ok(HeartbeatResult::Cancelled) => DisconnectReason::Shutdown,
            Err(e) => {
                error!(error = %e, "heartbeat task failed");
                DisconnectReason::HeartbeatFailed
            }
        },
        () = shutdown.cancelled() => DisconnectReason::Shutdown,
    };

    // Teardown: deregister, close, let the writer flush its Close frame.
    heartbeat_cancel.cancel();
    heartbeat.abort();
    let _ = registry.remove(&id);
    let _ = connection.close();
    if !writer.is_finished() {
        if time::timeout(config.write_timeout, &mut writer).await.is_err() {
            debug!("write loop did not finish in time, aborting");
        }
        writer.abort();
    }
    connection.mark_closed();

    info!(
        reason = reason.as_str(),
        delivered = connection.delivered_count(),
        age = ?connection.age(),
        connections = registry.len(),
        "client disconnected"
    );
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(connection.age().as_secs_f64());
    reason
}

/// Publish every data frame into the hub until the socket fails or closes.
async fn read_loop(
    ws_rx: &mut SplitStream<WebSocket>,
    connection: &ClientConnection,
    hub: &BroadcastHub,
) -> DisconnectReason {
    while let Some(frame) = ws_rx.next().await {
        let msg = match frame {
            Ok(msg) => msg,
            Err(e) => {
                debug!(error = %e, "read failed");
                return DisconnectReason::ReadFailed;
            }
        };
        connection.mark_alive();

        if let Message::Close(frame) = &msg {
            debug!(?frame, "client sent close frame");
            return DisconnectReason::ClientClosed;
        }
        let Some(message) = RelayMessage::from_ws(msg) else {
            continue;
        };
        if let Err(e) = hub.publish(message).await {
            warn!(error = %e, "publish failed");
            return DisconnectReason::HubClosed;
        }
    }
    DisconnectReason::ClientClosed
}

/// Drain the outbound queue onto the socket, interleaving pings.
///
/// Exits on close request, write error or write timeout. On close request a
/// Close frame is sent before returning. Dropping the queue receiver makes
/// further deliveries fail with `Closed`.
async fn write_loop(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<RelayMessage>,
    connection: Arc<ClientConnection>,
    write_timeout: Duration,
    ping_interval: Duration,
) {
    let mut ping = time::interval(ping_interval);
    // Skip the immediate first tick
    let _ = ping.tick().await;

    loop {
        let frame = tokio::select! {
            biased;
            () = connection.closed() => break,
            msg = outbound.recv() => match msg {
                Some(message) => message.into_ws(),
                None => break,
            },
            _ = ping.tick() => Message::Ping(Bytes::new()),
        };
        match time::timeout(write_timeout, ws_tx.send(frame)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!(error = %e, "write failed");
                return;
            }
            Err(_) => {
                warn!(timeout = ?write_timeout, "write timed out, dropping client");
                return;
            }
        }
    }

    let close = Message::Close(Some(CloseFrame {
        code: close_code::AWAY,
        reason: "".into(),
    }));
    if let Ok(Err(e)) = time::timeout(write_timeout, ws_tx.send(close)).await {
        debug!(error = %e, "close frame not sent");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_labels_are_snake_case() {
        let reasons = [
            DisconnectReason::ClientClosed,
            DisconnectReason::ReadFailed,
            DisconnectReason::WriteEnded,
            DisconnectReason::HeartbeatTimeout,
            DisconnectReason::HeartbeatFailed,
            DisconnectReason::HubClosed,
            DisconnectReason::Shutdown,
        ];
        for reason in reasons {
            let label = reason.as_str();
            assert!(
                label.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "label '{label}' must be snake_case"
            );
        }
    }
}
