//! Connection registry: the single source of truth mapping connection ids to
//! live connections and rooms to their join-ordered member lists.
//!
//! Both indices are sharded maps so unrelated rooms never contend on one
//! lock. Everything here is in-memory and synchronous; the registry is safe
//! to call while a room's mutex is held.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Notify;

use crate::error::SessionError;
use crate::protocol::{PeerInfo, Role, ServerMessage};

/// Item on a connection's outbound queue, drained by its send task.
#[derive(Debug, Clone)]
pub enum Outbound {
    Frame(ServerMessage),
    Close { code: u16, reason: String },
}

/// Result of a non-blocking enqueue onto a connection's outbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// Outbox overflowed; the connection was kicked instead of letting it
    /// backpressure the room.
    Kicked,
    /// The connection is unknown or its transport is already gone.
    Gone,
}

/// A live transport connection. Owned by the registry; rooms and handlers
/// reference it through `Arc`, never own it.
pub struct Connection {
    pub connection_id: String,
    pub user_id: String,
    pub display_name: String,
    pub role: Role,
    pub room_id: String,
    pub joined_at: Instant,
    /// Milliseconds since `joined_at` of the last inbound frame.
    last_seen_ms: AtomicU64,
    /// Highest signaling `seq` accepted from this sender.
    last_signal_seq: AtomicU64,
    sender: mpsc::Sender<Outbound>,
    kick: Arc<Notify>,
}

impl Connection {
    pub fn new(
        connection_id: String,
        user_id: String,
        display_name: String,
        role: Role,
        room_id: String,
        sender: mpsc::Sender<Outbound>,
        kick: Arc<Notify>,
    ) -> Self {
        Self {
            connection_id,
            user_id,
            display_name,
            role,
            room_id,
            joined_at: Instant::now(),
            last_seen_ms: AtomicU64::new(0),
            last_signal_seq: AtomicU64::new(0),
            sender,
            kick,
        }
    }

    /// Record inbound activity for the liveness sweep.
    pub fn touch(&self) {
        let elapsed = self.joined_at.elapsed().as_millis() as u64;
        self.last_seen_ms.fetch_max(elapsed, Ordering::Relaxed);
    }

    /// Time since the last inbound frame.
    pub fn idle_for(&self) -> Duration {
        let now = self.joined_at.elapsed().as_millis() as u64;
        let seen = self.last_seen_ms.load(Ordering::Relaxed);
        Duration::from_millis(now.saturating_sub(seen))
    }

    /// Accept `seq` only if it advances the sender's sequence. Stale
    /// envelopes (e.g. replayed after a reconnect) are dropped by the caller.
    pub fn advance_signal_seq(&self, seq: u64) -> bool {
        self.last_signal_seq.fetch_max(seq, Ordering::AcqRel) < seq
    }

    /// Non-blocking enqueue; a full outbox kicks the connection.
    pub fn enqueue(&self, message: ServerMessage) -> SendOutcome {
        match self.sender.try_send(Outbound::Frame(message)) {
            Ok(()) => SendOutcome::Sent,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(
                    connection_id = %self.connection_id,
                    room_id = %self.room_id,
                    "outbox overflow, kicking slow connection"
                );
                self.kick.notify_one();
                SendOutcome::Kicked
            }
            Err(TrySendError::Closed(_)) => SendOutcome::Gone,
        }
    }

    /// Enqueue a close frame and wake the socket task so it stops reading.
    pub fn close(&self, code: u16, reason: &str) {
        let _ = self.sender.try_send(Outbound::Close {
            code,
            reason: reason.to_string(),
        });
        self.kick.notify_one();
    }
}

/// Registry of live connections plus a per-room join-order index.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<String, Arc<Connection>>,
    room_index: DashMap<String, Vec<String>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, conn: Arc<Connection>) -> Result<(), SessionError> {
        match self.connections.entry(conn.connection_id.clone()) {
            Entry::Occupied(_) => Err(SessionError::DuplicateConnection(
                conn.connection_id.clone(),
            )),
            Entry::Vacant(slot) => {
                self.room_index
                    .entry(conn.room_id.clone())
                    .or_default()
                    .push(conn.connection_id.clone());
                slot.insert(conn);
                Ok(())
            }
        }
    }

    pub fn unregister(&self, connection_id: &str) -> Option<Arc<Connection>> {
        let (_, conn) = self.connections.remove(connection_id)?;
        if let Some(mut ids) = self.room_index.get_mut(&conn.room_id) {
            ids.retain(|id| id != connection_id);
        }
        self.room_index.remove_if(&conn.room_id, |_, ids| ids.is_empty());
        Some(conn)
    }

    pub fn get(&self, connection_id: &str) -> Option<Arc<Connection>> {
        self.connections
            .get(connection_id)
            .map(|entry| entry.value().clone())
    }

    /// Room members in join order; the order every broadcast and snapshot
    /// delivery follows.
    pub fn list_room_members(&self, room_id: &str) -> Vec<Arc<Connection>> {
        let ids: Vec<String> = self
            .room_index
            .get(room_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();
        ids.iter()
            .filter_map(|id| self.get(id))
            .collect()
    }

    pub fn touch(&self, connection_id: &str) {
        if let Some(conn) = self.get(connection_id) {
            conn.touch();
        }
    }

    /// Connections silent for longer than `timeout`, due for implicit leave.
    pub fn idle_connections(&self, timeout: Duration) -> Vec<Arc<Connection>> {
        self.connections
            .iter()
            .filter(|entry| entry.value().idle_for() >= timeout)
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn send_to(&self, connection_id: &str, message: ServerMessage) -> SendOutcome {
        match self.get(connection_id) {
            Some(conn) => conn.enqueue(message),
            None => SendOutcome::Gone,
        }
    }

    pub fn send_close(&self, connection_id: &str, code: u16, reason: &str) {
        if let Some(conn) = self.get(connection_id) {
            conn.close(code, reason);
        }
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn room_count(&self) -> usize {
        self.room_index.len()
    }
}

impl From<&Connection> for PeerInfo {
    fn from(conn: &Connection) -> Self {
        Self {
            connection_id: conn.connection_id.clone(),
            display_name: conn.display_name.clone(),
            role: conn.role,
        }
    }
}
