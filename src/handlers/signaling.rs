//! WebRTC signaling relay.
//!
//! Envelopes are opaque; the relay only routes them to the other video
//! participant of the sender's room. Delivery is ordered per sender via the
//! monotonic `seq`; there is no retry, and no cross-sender ordering.

use serde_json::Value;
use std::sync::Arc;

use crate::error::SessionError;
use crate::protocol::{ServerMessage, SignalKind};
use crate::state::AppState;

pub async fn handle_signal(
    state: &Arc<AppState>,
    connection_id: &str,
    kind: &str,
    payload: Value,
    seq: u64,
) -> Result<(), SessionError> {
    let kind = SignalKind::parse(kind)
        .ok_or_else(|| SessionError::InvalidSignal(format!("unknown kind: {kind}")))?;
    let conn = state
        .registry
        .get(connection_id)
        .ok_or_else(|| SessionError::UnknownConnection(connection_id.to_string()))?;

    // Stale envelopes (replays, out-of-order frames after a reconnect) are
    // dropped silently; a fresh negotiation restarts cleanly.
    if !conn.advance_signal_seq(seq) {
        tracing::debug!(
            connection_id = %connection_id,
            seq = seq,
            "discarded regressed signal seq"
        );
        return Ok(());
    }

    let room = state.room(&conn.room_id).ok_or(SessionError::RoomClosed)?;
    let peer = room
        .video_peer_of(connection_id)
        .await?
        .ok_or(SessionError::PeerNotConnected)?;

    state.registry.send_to(
        &peer,
        ServerMessage::Signal {
            from: connection_id.to_string(),
            kind,
            payload,
            seq,
        },
    );

    tracing::debug!(
        from = %connection_id,
        to = %peer,
        kind = ?kind,
        seq = seq,
        "relayed signal"
    );
    Ok(())
}
