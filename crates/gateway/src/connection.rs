//! Connection Manager (C10, §4.10).
//!
//! Tracks every live session's writer channel and per-connection counters.
//! `send` retries up to 3 times with a 0.5·attempt second backoff; repeated
//! failure unregisters the connection and asks its writer task to close.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::warn;
use voice_protocol::ServerMessage;

const MAX_SEND_ATTEMPTS: u32 = 3;

/// Per-connection counters (§4.10). Plain atomics: each field is updated
/// independently and read back as a point-in-time snapshot, no need for a
/// single consistent view across fields.
#[derive(Default)]
pub struct ConnectionStats {
    pub messages_sent: AtomicU64,
    pub messages_received: AtomicU64,
    pub bytes_in: AtomicU64,
    pub bytes_out: AtomicU64,
    pub connected_since_unix_ms: u64,
    pub last_activity_unix_ms: AtomicU64,
}

impl ConnectionStats {
    fn new() -> Self {
        Self {
            connected_since_unix_ms: now_unix_ms(),
            last_activity_unix_ms: AtomicU64::new(now_unix_ms()),
            ..Default::default()
        }
    }

    pub fn record_received(&self, bytes: usize) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_in.fetch_add(bytes as u64, Ordering::Relaxed);
        self.last_activity_unix_ms.store(now_unix_ms(), Ordering::Relaxed);
    }

    fn record_sent(&self, bytes: usize) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_out.fetch_add(bytes as u64, Ordering::Relaxed);
        self.last_activity_unix_ms.store(now_unix_ms(), Ordering::Relaxed);
    }
}

fn now_unix_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

struct Connection {
    outbound: mpsc::Sender<ServerMessage>,
    stats: Arc<ConnectionStats>,
}

/// Owns every live connection's outbound channel and counters (§4.10). The
/// writer task that actually touches the socket is spawned by the session
/// handler; this struct only hands it messages and decides when a
/// connection is unhealthy enough to be dropped.
#[derive(Default)]
pub struct ConnectionManager {
    connections: Mutex<HashMap<String, Connection>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new connection, returning its stats handle for the
    /// session to update on each receive.
    pub fn register(&self, client_id: &str, outbound: mpsc::Sender<ServerMessage>) -> Arc<ConnectionStats> {
        let stats = Arc::new(ConnectionStats::new());
        self.connections.lock().insert(
            client_id.to_string(),
            Connection { outbound, stats: stats.clone() },
        );
        stats
    }

    pub fn unregister(&self, client_id: &str) {
        self.connections.lock().remove(client_id);
    }

    pub fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }

    fn outbound_of(&self, client_id: &str) -> Option<(mpsc::Sender<ServerMessage>, Arc<ConnectionStats>)> {
        self.connections
            .lock()
            .get(client_id)
            .map(|c| (c.outbound.clone(), c.stats.clone()))
    }

    /// Sends `msg` to `client_id`'s writer task, retrying on a full/closed
    /// channel up to [`MAX_SEND_ATTEMPTS`] times with 0.5·attempt second
    /// backoff. Repeated failure unregisters the connection.
    pub async fn send(&self, client_id: &str, msg: ServerMessage) -> bool {
        let Some((outbound, stats)) = self.outbound_of(client_id) else {
            return false;
        };

        let mut to_send = msg;
        for attempt in 1..=MAX_SEND_ATTEMPTS {
            match outbound.try_send(to_send) {
                Ok(()) => {
                    stats.record_sent(0);
                    return true;
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    warn!(client_id, "outbound channel closed, unregistering connection");
                    self.unregister(client_id);
                    return false;
                }
                Err(mpsc::error::TrySendError::Full(returned)) => {
                    to_send = returned;
                    if attempt < MAX_SEND_ATTEMPTS {
                        sleep(Duration::from_millis(500 * attempt as u64)).await;
                    }
                }
            }
        }

        warn!(client_id, attempts = MAX_SEND_ATTEMPTS, "send failed after retries, unregistering connection");
        self.unregister(client_id);
        false
    }
}
