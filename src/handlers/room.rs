//! Join handling and room lifecycle sweeps.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};

use crate::auth::AuthDecision;
use crate::error::{close_code, SessionError};
use crate::protocol::Role;
use crate::registry::{Connection, Outbound};
use crate::room::Room;
use crate::state::AppState;

/// Identity claims and transport wiring for a join attempt.
pub struct JoinRequest {
    pub room_id: String,
    pub user_id: String,
    pub display_name: String,
    pub role: Role,
    pub wants_video: bool,
    pub sender: mpsc::Sender<Outbound>,
    pub kick: Arc<Notify>,
}

/// Authorize, create or attach to the room, and wire the connection in.
/// The `joined` response and `peer-joined` presence are delivered by
/// [`Room::join`] under the room lock.
pub async fn handle_join(
    state: &Arc<AppState>,
    connection_id: &str,
    req: JoinRequest,
) -> Result<(), SessionError> {
    if state
        .authorizer
        .authorize(&req.user_id, &req.room_id)
        .await
        == AuthDecision::Forbidden
    {
        tracing::warn!(
            user_id = %req.user_id,
            room_id = %req.room_id,
            "join rejected by authorizer"
        );
        return Err(SessionError::Unauthorized);
    }

    // Observers never hold a video seat, whatever the flag says.
    let wants_video = req.wants_video && req.role != Role::Observer;

    let conn = Arc::new(Connection::new(
        connection_id.to_string(),
        req.user_id,
        req.display_name,
        req.role,
        req.room_id.clone(),
        req.sender,
        req.kick,
    ));

    // One retry covers the race against the reaper destroying the room
    // between lookup and join.
    let mut grant = None;
    for _ in 0..2 {
        let room = state
            .rooms
            .entry(req.room_id.clone())
            .or_insert_with(|| {
                tracing::info!(room_id = %req.room_id, "room created");
                Arc::new(Room::new(req.room_id.clone()))
            })
            .clone();
        match room.join(&state.registry, conn.clone(), wants_video).await {
            Ok(g) => {
                grant = Some(g);
                break;
            }
            Err(SessionError::RoomClosed) => {
                state
                    .rooms
                    .remove_if(&req.room_id, |_, r| Arc::ptr_eq(r, &room));
            }
            Err(err) => return Err(err),
        }
    }
    let grant = grant.ok_or(SessionError::RoomClosed)?;

    if let Some(stale) = grant.replaced {
        tracing::info!(
            connection_id = %connection_id,
            stale_connection_id = %stale.connection_id,
            user_id = %conn.user_id,
            "reconnect superseded stale connection"
        );
        stale.close(close_code::SUPERSEDED, "superseded by reconnect");
    }

    tracing::info!(
        connection_id = %connection_id,
        room_id = %req.room_id,
        role = ?conn.role,
        member_count = grant.member_count,
        resumed = grant.resumed,
        "joined room"
    );
    Ok(())
}

/// Destroy rooms that stayed empty past the grace period.
pub async fn reap_rooms(state: Arc<AppState>) {
    let grace = Duration::from_millis(state.config.room.idle_grace_ms);
    let rooms: Vec<(String, Arc<Room>)> = state
        .rooms
        .iter()
        .map(|entry| (entry.key().clone(), entry.value().clone()))
        .collect();

    for (room_id, room) in rooms {
        if room.try_reap(grace).await {
            state.rooms.remove_if(&room_id, |_, r| Arc::ptr_eq(r, &room));
            tracing::info!(room_id = %room_id, "room reaped after grace period");
        }
    }
}
