//! Room: membership invariants, the per-room sequencer, and ordered fan-out.
//!
//! All state mutation goes through one `tokio::sync::Mutex` per room. Holding
//! that lock across `op_id` assignment, log append, and outbox enqueue is
//! what makes every member observe whiteboard operations in the same order;
//! enqueues are `try_send` so the lock is never held across I/O.

use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::error::SessionError;
use crate::protocol::{PeerInfo, ServerMessage};
use crate::registry::{Connection, ConnectionRegistry};
use crate::whiteboard::{unix_ts_ms, OpType, ValidatedDraft, WhiteboardLog, WhiteboardOperation};

/// A session pairs one tutor with one student; everyone else observes.
pub const MAX_VIDEO_PARTICIPANTS: usize = 2;

/// Room lifecycle. A room is created `Active` by its first join and comes
/// back from `Draining` when someone rejoins before the grace period ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomPhase {
    Active,
    Draining,
    Destroyed,
}

#[derive(Debug, Clone)]
struct Member {
    connection_id: String,
    user_id: String,
}

struct RoomInner {
    phase: RoomPhase,
    /// Video-eligible members, at most [`MAX_VIDEO_PARTICIPANTS`].
    participants: Vec<Member>,
    /// Whiteboard-only members, unbounded.
    observers: Vec<Member>,
    /// The authoritative operation sequencer.
    seq: u64,
    whiteboard: WhiteboardLog,
    draining_since: Option<Instant>,
}

impl RoomInner {
    fn is_member(&self, connection_id: &str) -> bool {
        self.participants
            .iter()
            .chain(self.observers.iter())
            .any(|m| m.connection_id == connection_id)
    }

    fn remove_connection(&mut self, connection_id: &str) -> bool {
        let before = self.participants.len() + self.observers.len();
        self.participants.retain(|m| m.connection_id != connection_id);
        self.observers.retain(|m| m.connection_id != connection_id);
        before != self.participants.len() + self.observers.len()
    }

    /// Drop any membership held by `user_id`, returning the stale
    /// connection id. Used to let a reconnect take over its old seat.
    fn remove_user(&mut self, user_id: &str) -> Option<String> {
        let found = self
            .participants
            .iter()
            .chain(self.observers.iter())
            .find(|m| m.user_id == user_id)
            .map(|m| m.connection_id.clone())?;
        self.remove_connection(&found);
        Some(found)
    }
}

/// Result of an accepted join.
pub struct JoinGrant {
    /// The stale connection this join superseded, already unregistered.
    pub replaced: Option<Arc<Connection>>,
    pub member_count: usize,
    /// The join revived a draining room.
    pub resumed: bool,
}

/// Outcome of a leave that actually removed a member.
pub struct LeaveOutcome {
    pub now_empty: bool,
}

pub struct Room {
    pub id: String,
    pub created_at: Instant,
    inner: Mutex<RoomInner>,
}

impl Room {
    pub fn new(id: String) -> Self {
        Self {
            id,
            created_at: Instant::now(),
            inner: Mutex::new(RoomInner {
                phase: RoomPhase::Active,
                participants: Vec::new(),
                observers: Vec::new(),
                seq: 0,
                whiteboard: WhiteboardLog::new(),
                draining_since: None,
            }),
        }
    }

    /// Admit a connection, registering it and delivering the `joined`
    /// response plus `peer-joined` presence while the room lock is held.
    ///
    /// A rejoin by the same user replaces the stale connection instead of
    /// doubling membership; the superseded connection is returned so the
    /// caller can close it.
    pub async fn join(
        &self,
        registry: &ConnectionRegistry,
        conn: Arc<Connection>,
        wants_video: bool,
    ) -> Result<JoinGrant, SessionError> {
        let mut inner = self.inner.lock().await;
        let resumed = match inner.phase {
            RoomPhase::Destroyed => return Err(SessionError::RoomClosed),
            RoomPhase::Draining => {
                inner.phase = RoomPhase::Active;
                inner.draining_since = None;
                true
            }
            RoomPhase::Active => false,
        };

        if wants_video {
            let other_seats = inner
                .participants
                .iter()
                .filter(|m| m.user_id != conn.user_id)
                .count();
            if other_seats >= MAX_VIDEO_PARTICIPANTS {
                return Err(SessionError::RoomFull);
            }
        }

        registry.register(conn.clone())?;

        let replaced = match inner.remove_user(&conn.user_id) {
            Some(stale_id) if stale_id != conn.connection_id => registry.unregister(&stale_id),
            _ => None,
        };

        let member = Member {
            connection_id: conn.connection_id.clone(),
            user_id: conn.user_id.clone(),
        };
        if wants_video {
            inner.participants.push(member);
        } else {
            inner.observers.push(member);
        }

        let members = registry.list_room_members(&self.id);
        let infos: Vec<PeerInfo> = members.iter().map(|c| PeerInfo::from(c.as_ref())).collect();
        registry.send_to(
            &conn.connection_id,
            ServerMessage::Joined {
                connection_id: conn.connection_id.clone(),
                members: infos,
                snapshot: inner.whiteboard.snapshot(),
            },
        );

        let presence = ServerMessage::PeerJoined {
            connection_id: conn.connection_id.clone(),
            display_name: conn.display_name.clone(),
            role: conn.role,
        };
        for member in &members {
            if member.connection_id != conn.connection_id {
                member.enqueue(presence.clone());
            }
        }

        Ok(JoinGrant {
            replaced,
            member_count: members.len(),
            resumed,
        })
    }

    /// Remove a connection from whichever set held it and tell the rest.
    /// The last member out starts the grace timer instead of tearing the
    /// whiteboard down, leaving a reconnect window.
    pub async fn leave(
        &self,
        registry: &ConnectionRegistry,
        connection_id: &str,
    ) -> Option<LeaveOutcome> {
        let mut inner = self.inner.lock().await;
        if inner.phase == RoomPhase::Destroyed {
            registry.unregister(connection_id);
            return None;
        }

        let was_member = inner.remove_connection(connection_id);
        let left = registry.unregister(connection_id);
        if !was_member {
            return None;
        }

        let now_empty = inner.participants.is_empty() && inner.observers.is_empty();
        if now_empty {
            inner.phase = RoomPhase::Draining;
            inner.draining_since = Some(Instant::now());
        }

        if let Some(conn) = left {
            let frame = ServerMessage::PeerLeft {
                connection_id: conn.connection_id.clone(),
                display_name: conn.display_name.clone(),
                role: conn.role,
            };
            broadcast(registry, &self.id, frame);
        }

        Some(LeaveOutcome { now_empty })
    }

    /// Sequence a validated draw operation and fan it out to every member,
    /// author included, in registry join order.
    pub async fn submit(
        &self,
        registry: &ConnectionRegistry,
        author_connection_id: &str,
        draft: ValidatedDraft,
    ) -> Result<WhiteboardOperation, SessionError> {
        let mut inner = self.inner.lock().await;
        if inner.phase != RoomPhase::Active {
            return Err(SessionError::RoomClosed);
        }
        if !inner.is_member(author_connection_id) {
            return Err(SessionError::UnknownConnection(
                author_connection_id.to_string(),
            ));
        }

        inner.seq += 1;
        let op = WhiteboardOperation {
            op_id: inner.seq,
            room_id: self.id.clone(),
            author_connection_id: author_connection_id.to_string(),
            op_type: draft.op_type,
            data: draft.data,
            timestamp: unix_ts_ms(),
        };
        inner.whiteboard.append_draw(op.clone());
        broadcast(registry, &self.id, ServerMessage::WbApplied { op: op.clone() });

        Ok(op)
    }

    /// Retract the most recent applied operation by any author (shared undo
    /// stack). `Ok(None)` when there is nothing to undo.
    pub async fn undo(
        &self,
        registry: &ConnectionRegistry,
        connection_id: &str,
    ) -> Result<Option<WhiteboardOperation>, SessionError> {
        let mut inner = self.inner.lock().await;
        if inner.phase != RoomPhase::Active {
            return Err(SessionError::RoomClosed);
        }
        if !inner.is_member(connection_id) {
            return Err(SessionError::UnknownConnection(connection_id.to_string()));
        }

        let Some(target) = inner.whiteboard.undo() else {
            return Ok(None);
        };
        inner.seq += 1;
        let marker = WhiteboardOperation {
            op_id: inner.seq,
            room_id: self.id.clone(),
            author_connection_id: connection_id.to_string(),
            op_type: OpType::Undo,
            data: json!({ "opId": target }),
            timestamp: unix_ts_ms(),
        };
        inner.whiteboard.record_marker(marker.clone());
        broadcast(registry, &self.id, ServerMessage::WbUndone { op_id: target });

        Ok(Some(marker))
    }

    /// Re-apply the most recently undone operation. `Ok(None)` at the tail.
    pub async fn redo(
        &self,
        registry: &ConnectionRegistry,
        connection_id: &str,
    ) -> Result<Option<WhiteboardOperation>, SessionError> {
        let mut inner = self.inner.lock().await;
        if inner.phase != RoomPhase::Active {
            return Err(SessionError::RoomClosed);
        }
        if !inner.is_member(connection_id) {
            return Err(SessionError::UnknownConnection(connection_id.to_string()));
        }

        let Some(target) = inner.whiteboard.redo() else {
            return Ok(None);
        };
        inner.seq += 1;
        let marker = WhiteboardOperation {
            op_id: inner.seq,
            room_id: self.id.clone(),
            author_connection_id: connection_id.to_string(),
            op_type: OpType::Redo,
            data: json!({ "opId": target }),
            timestamp: unix_ts_ms(),
        };
        inner.whiteboard.record_marker(marker.clone());
        broadcast(registry, &self.id, ServerMessage::WbRedone { op_id: target });

        Ok(Some(marker))
    }

    /// Applied operations in replay order, for late joiners and export.
    pub async fn snapshot(&self) -> Vec<WhiteboardOperation> {
        self.inner.lock().await.whiteboard.snapshot()
    }

    /// The other video participant's connection id, if present.
    ///
    /// Errors when the caller is not a video participant; observers never
    /// take part in negotiation.
    pub async fn video_peer_of(
        &self,
        connection_id: &str,
    ) -> Result<Option<String>, SessionError> {
        let inner = self.inner.lock().await;
        if inner.phase == RoomPhase::Destroyed {
            return Err(SessionError::RoomClosed);
        }
        if !inner
            .participants
            .iter()
            .any(|m| m.connection_id == connection_id)
        {
            return Err(SessionError::InvalidSignal(
                "only video participants exchange signaling".to_string(),
            ));
        }
        Ok(inner
            .participants
            .iter()
            .find(|m| m.connection_id != connection_id)
            .map(|m| m.connection_id.clone()))
    }

    pub async fn phase(&self) -> RoomPhase {
        self.inner.lock().await.phase
    }

    /// Destroy the room if it has been draining past the grace period.
    /// Returns whether the room should be dropped from the registry.
    pub async fn try_reap(&self, grace: Duration) -> bool {
        let mut inner = self.inner.lock().await;
        match (inner.phase, inner.draining_since) {
            (RoomPhase::Draining, Some(since)) if since.elapsed() >= grace => {
                inner.phase = RoomPhase::Destroyed;
                inner.whiteboard.clear_all();
                true
            }
            _ => false,
        }
    }
}

/// Enqueue a frame to every current room member, in join order.
fn broadcast(registry: &ConnectionRegistry, room_id: &str, frame: ServerMessage) {
    for member in registry.list_room_members(room_id) {
        member.enqueue(frame.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Role;
    use crate::registry::Outbound;
    use crate::whiteboard::validate_draft;
    use crate::config::CanvasConfig;
    use tokio::sync::mpsc::{self, Receiver};
    use tokio::sync::Notify;

    fn test_conn(
        connection_id: &str,
        user_id: &str,
        role: Role,
        room_id: &str,
    ) -> (Arc<Connection>, Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(64);
        let conn = Arc::new(Connection::new(
            connection_id.to_string(),
            user_id.to_string(),
            user_id.to_string(),
            role,
            room_id.to_string(),
            tx,
            Arc::new(Notify::new()),
        ));
        (conn, rx)
    }

    fn stroke_draft() -> ValidatedDraft {
        validate_draft(
            OpType::Stroke,
            serde_json::json!({"points": [{"x": 5.0, "y": 5.0}]}),
            &CanvasConfig {
                width: 100.0,
                height: 100.0,
            },
        )
        .unwrap()
    }

    fn drain_op_ids(rx: &mut Receiver<Outbound>) -> Vec<u64> {
        let mut ids = Vec::new();
        while let Ok(out) = rx.try_recv() {
            if let Outbound::Frame(ServerMessage::WbApplied { op }) = out {
                ids.push(op.op_id);
            }
        }
        ids
    }

    #[tokio::test]
    async fn third_video_join_is_rejected() {
        let registry = ConnectionRegistry::new();
        let room = Room::new("bk_123".to_string());

        let (tutor, _rx_t) = test_conn("c_t", "tutor_1", Role::Tutor, "bk_123");
        let (student, _rx_s) = test_conn("c_s", "student_1", Role::Student, "bk_123");
        let (intruder, _rx_i) = test_conn("c_x", "student_2", Role::Student, "bk_123");

        room.join(&registry, tutor, true).await.unwrap();
        room.join(&registry, student, true).await.unwrap();
        let result = room.join(&registry, intruder, true).await;
        assert!(matches!(result, Err(SessionError::RoomFull)));
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn observers_join_past_the_video_cap() {
        let registry = ConnectionRegistry::new();
        let room = Room::new("bk_123".to_string());

        let (tutor, _rx_t) = test_conn("c_t", "tutor_1", Role::Tutor, "bk_123");
        let (student, _rx_s) = test_conn("c_s", "student_1", Role::Student, "bk_123");
        let (observer, _rx_o) = test_conn("c_o", "reviewer_1", Role::Observer, "bk_123");

        room.join(&registry, tutor, true).await.unwrap();
        room.join(&registry, student, true).await.unwrap();
        let grant = room.join(&registry, observer, false).await.unwrap();
        assert_eq!(grant.member_count, 3);

        // The observer holds no video seat.
        let err = room.video_peer_of("c_o").await;
        assert!(matches!(err, Err(SessionError::InvalidSignal(_))));
    }

    #[tokio::test]
    async fn rejoin_replaces_stale_connection() {
        let registry = ConnectionRegistry::new();
        let room = Room::new("bk_123".to_string());

        let (tutor, _rx_t) = test_conn("c_old", "tutor_1", Role::Tutor, "bk_123");
        room.join(&registry, tutor, true).await.unwrap();

        let (again, _rx_a) = test_conn("c_new", "tutor_1", Role::Tutor, "bk_123");
        let grant = room.join(&registry, again, true).await.unwrap();

        let replaced = grant.replaced.expect("stale connection returned");
        assert_eq!(replaced.connection_id, "c_old");
        assert_eq!(grant.member_count, 1);
        assert!(registry.get("c_old").is_none());
        assert!(registry.get("c_new").is_some());

        // The seat was replaced, not doubled: a second user still fits.
        let (student, _rx_s) = test_conn("c_s", "student_1", Role::Student, "bk_123");
        room.join(&registry, student, true).await.unwrap();
    }

    #[tokio::test]
    async fn last_leave_starts_draining_and_rejoin_revives() {
        let registry = ConnectionRegistry::new();
        let room = Room::new("bk_123".to_string());

        let (tutor, _rx_t) = test_conn("c_t", "tutor_1", Role::Tutor, "bk_123");
        room.join(&registry, tutor, true).await.unwrap();
        room.submit(&registry, "c_t", stroke_draft()).await.unwrap();

        let outcome = room.leave(&registry, "c_t").await.unwrap();
        assert!(outcome.now_empty);
        assert_eq!(room.phase().await, RoomPhase::Draining);

        // Rejoin within the grace window: state intact, sequence continues.
        let (back, _rx_b) = test_conn("c_t2", "tutor_1", Role::Tutor, "bk_123");
        let grant = room.join(&registry, back, true).await.unwrap();
        assert!(grant.resumed);
        assert_eq!(room.phase().await, RoomPhase::Active);
        assert_eq!(room.snapshot().await.len(), 1);

        let op = room.submit(&registry, "c_t2", stroke_draft()).await.unwrap();
        assert_eq!(op.op_id, 2);
    }

    #[tokio::test]
    async fn reaped_room_rejects_further_operations() {
        let registry = ConnectionRegistry::new();
        let room = Room::new("bk_123".to_string());

        let (tutor, _rx_t) = test_conn("c_t", "tutor_1", Role::Tutor, "bk_123");
        room.join(&registry, tutor, true).await.unwrap();
        room.leave(&registry, "c_t").await.unwrap();

        assert!(!room.try_reap(Duration::from_secs(3600)).await);
        assert!(room.try_reap(Duration::ZERO).await);
        assert_eq!(room.phase().await, RoomPhase::Destroyed);

        let res = room.submit(&registry, "c_t", stroke_draft()).await;
        assert!(matches!(res, Err(SessionError::RoomClosed)));
        let (late, _rx_l) = test_conn("c_l", "tutor_1", Role::Tutor, "bk_123");
        let res = room.join(&registry, late, true).await;
        assert!(matches!(res, Err(SessionError::RoomClosed)));
    }

    #[tokio::test]
    async fn concurrent_submits_reach_all_members_in_one_order() {
        let registry = Arc::new(ConnectionRegistry::new());
        let room = Arc::new(Room::new("bk_123".to_string()));

        let (tutor, mut rx_t) = test_conn("c_t", "tutor_1", Role::Tutor, "bk_123");
        let (student, mut rx_s) = test_conn("c_s", "student_1", Role::Student, "bk_123");
        room.join(&registry, tutor, true).await.unwrap();
        room.join(&registry, student, true).await.unwrap();

        let mut tasks = Vec::new();
        for author in ["c_t", "c_s"] {
            for _ in 0..10 {
                let room = room.clone();
                let registry = registry.clone();
                tasks.push(tokio::spawn(async move {
                    room.submit(&registry, author, stroke_draft()).await.unwrap();
                }));
            }
        }
        for task in tasks {
            task.await.unwrap();
        }

        let tutor_view = drain_op_ids(&mut rx_t);
        let student_view = drain_op_ids(&mut rx_s);
        assert_eq!(tutor_view.len(), 20);
        assert_eq!(tutor_view, student_view);
        // op_ids are the authoritative order and contain no gaps.
        assert_eq!(tutor_view, (1..=20).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn video_peer_lookup() {
        let registry = ConnectionRegistry::new();
        let room = Room::new("bk_123".to_string());

        let (tutor, _rx_t) = test_conn("c_t", "tutor_1", Role::Tutor, "bk_123");
        room.join(&registry, tutor, true).await.unwrap();
        assert_eq!(room.video_peer_of("c_t").await.unwrap(), None);

        let (student, _rx_s) = test_conn("c_s", "student_1", Role::Student, "bk_123");
        room.join(&registry, student, true).await.unwrap();
        assert_eq!(
            room.video_peer_of("c_t").await.unwrap(),
            Some("c_s".to_string())
        );
        assert_eq!(
            room.video_peer_of("c_s").await.unwrap(),
            Some("c_t".to_string())
        );
    }
}
