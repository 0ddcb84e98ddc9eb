//! Client-server wire protocol.
//!
//! Frames are internally tagged JSON: a kebab-case `type` field with
//! camelCase payload fields inline, e.g.
//! `{"type":"wb-op","opType":"stroke","data":{...}}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::whiteboard::{OpType, WhiteboardOperation};

/// Participant role, verified upstream and claimed at join time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Tutor,
    Student,
    Observer,
}

/// Peer-connection negotiation payload kinds this relay forwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    Offer,
    Answer,
    Ice,
}

impl SignalKind {
    /// Parse the wire `kind`; unknown kinds are rejected to the sender.
    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "offer" => Some(Self::Offer),
            "answer" => Some(Self::Answer),
            "ice" => Some(Self::Ice),
            _ => None,
        }
    }
}

/// Presence entry for member lists and join/leave events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerInfo {
    pub connection_id: String,
    pub display_name: String,
    pub role: Role,
}

/// Client → server messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    Heartbeat,

    /// Must be the first frame after transport open.
    Join {
        room_id: String,
        user_id: String,
        display_name: String,
        role: Role,
        wants_video: bool,
    },
    Leave,

    /// Opaque peer-connection negotiation payload. `seq` is monotonic per
    /// sender; regressions are discarded.
    Signal {
        kind: String,
        payload: Value,
        seq: u64,
    },

    WbOp {
        op_type: OpType,
        data: Value,
    },
    WbUndo,
    WbRedo,

    IceConfig,
}

/// Server → client messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    HeartbeatAck,

    Joined {
        connection_id: String,
        members: Vec<PeerInfo>,
        snapshot: Vec<WhiteboardOperation>,
    },
    Rejected {
        reason: String,
    },

    Signal {
        from: String,
        kind: SignalKind,
        payload: Value,
        seq: u64,
    },

    WbApplied {
        op: WhiteboardOperation,
    },
    WbUndone {
        op_id: u64,
    },
    WbRedone {
        op_id: u64,
    },

    PeerJoined {
        connection_id: String,
        display_name: String,
        role: Role,
    },
    PeerLeft {
        connection_id: String,
        display_name: String,
        role: Role,
    },
    RoomClosed {
        room_id: String,
    },

    /// Local rejection; the connection stays alive.
    Error {
        code: String,
        message: String,
    },

    IceConfig {
        success: bool,
        servers: Vec<IceServer>,
        ttl: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

/// ICE server entry handed to the client's WebRTC stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IceServer {
    pub urls: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_type: Option<String>,
}
