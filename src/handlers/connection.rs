//! Connection lifecycle handlers and the liveness sweep.

use std::sync::Arc;
use std::time::Duration;

use crate::error::close_code;
use crate::protocol::ServerMessage;
use crate::state::AppState;

/// Tear a connection down: leave the room, unregister, notify the rest.
/// Invoked on normal close, transport error, kick, and liveness timeout;
/// safe to call more than once for the same id.
pub async fn handle_disconnect(state: &Arc<AppState>, connection_id: &str) {
    let Some(conn) = state.registry.get(connection_id) else {
        return;
    };

    match state.room(&conn.room_id) {
        Some(room) => {
            if let Some(outcome) = room.leave(&state.registry, connection_id).await {
                if outcome.now_empty {
                    tracing::info!(room_id = %conn.room_id, "room empty, grace timer started");
                }
            }
        }
        None => {
            state.registry.unregister(connection_id);
        }
    }

    tracing::info!(
        connection_id = %connection_id,
        room_id = %conn.room_id,
        "connection closed"
    );
}

/// Heartbeats keep the liveness sweep away; the dispatch layer already
/// touched the connection before we get here.
pub fn handle_heartbeat(state: &AppState, connection_id: &str) {
    let _ = state.registry.send_to(connection_id, ServerMessage::HeartbeatAck);
}

/// Unregister connections that have been silent past the liveness timeout,
/// treating silence as an implicit leave.
pub async fn sweep_idle_connections(state: Arc<AppState>) {
    let timeout = Duration::from_millis(state.config.room.liveness_timeout_ms);
    for conn in state.registry.idle_connections(timeout) {
        tracing::info!(
            connection_id = %conn.connection_id,
            room_id = %conn.room_id,
            idle_ms = conn.idle_for().as_millis() as u64,
            "liveness timeout, treating as implicit leave"
        );
        conn.close(close_code::INTERNAL, "liveness timeout");
        handle_disconnect(&state, &conn.connection_id).await;
    }
}
