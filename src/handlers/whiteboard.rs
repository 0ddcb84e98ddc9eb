//! Whiteboard replication handlers: validate, sequence, broadcast.

use serde_json::Value;
use std::sync::Arc;

use crate::error::SessionError;
use crate::state::AppState;
use crate::whiteboard::{validate_draft, OpType};

pub async fn handle_wb_op(
    state: &Arc<AppState>,
    connection_id: &str,
    op_type: OpType,
    data: Value,
) -> Result<(), SessionError> {
    let conn = state
        .registry
        .get(connection_id)
        .ok_or_else(|| SessionError::UnknownConnection(connection_id.to_string()))?;
    let draft = validate_draft(op_type, data, &state.config.canvas)?;

    let room = state.room(&conn.room_id).ok_or(SessionError::RoomClosed)?;
    let op = room.submit(&state.registry, connection_id, draft).await?;

    tracing::debug!(
        room_id = %conn.room_id,
        op_id = op.op_id,
        op_type = ?op.op_type,
        author = %connection_id,
        "whiteboard op applied"
    );
    Ok(())
}

pub async fn handle_wb_undo(
    state: &Arc<AppState>,
    connection_id: &str,
) -> Result<(), SessionError> {
    let conn = state
        .registry
        .get(connection_id)
        .ok_or_else(|| SessionError::UnknownConnection(connection_id.to_string()))?;
    let room = state.room(&conn.room_id).ok_or(SessionError::RoomClosed)?;

    match room.undo(&state.registry, connection_id).await? {
        Some(marker) => {
            tracing::debug!(room_id = %conn.room_id, op_id = marker.op_id, "undo applied");
        }
        None => {
            tracing::debug!(room_id = %conn.room_id, "nothing to undo");
        }
    }
    Ok(())
}

pub async fn handle_wb_redo(
    state: &Arc<AppState>,
    connection_id: &str,
) -> Result<(), SessionError> {
    let conn = state
        .registry
        .get(connection_id)
        .ok_or_else(|| SessionError::UnknownConnection(connection_id.to_string()))?;
    let room = state.room(&conn.room_id).ok_or(SessionError::RoomClosed)?;

    match room.redo(&state.registry, connection_id).await? {
        Some(marker) => {
            tracing::debug!(room_id = %conn.room_id, op_id = marker.op_id, "redo applied");
        }
        None => {
            tracing::debug!(room_id = %conn.room_id, "nothing to redo");
        }
    }
    Ok(())
}
