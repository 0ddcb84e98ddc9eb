//! Session error taxonomy and transport close codes.

use thiserror::Error;

/// Errors surfaced by the session core.
///
/// Fatal variants carry a WebSocket close code; the rest are reported to the
/// sender as an `error` frame and the connection stays alive.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("not authorized for this room")]
    Unauthorized,

    #[error("room already has two video participants")]
    RoomFull,

    #[error("room is closed")]
    RoomClosed,

    #[error("the other participant is not connected yet")]
    PeerNotConnected,

    #[error("invalid signal: {0}")]
    InvalidSignal(String),

    #[error("unsupported message type: {0}")]
    UnsupportedMessageType(String),

    #[error("duplicate connection: {0}")]
    DuplicateConnection(String),

    #[error("unknown connection: {0}")]
    UnknownConnection(String),

    #[error("operation rejected: {0}")]
    OperationRejected(String),
}

/// WebSocket close codes used at the transport boundary.
pub mod close_code {
    /// Clean close after an explicit leave.
    pub const NORMAL: u16 = 1000;
    /// Identity is not a participant of the room's booking.
    pub const UNAUTHORIZED: u16 = 4001;
    /// Two video participants are already present.
    pub const ROOM_FULL: u16 = 4002;
    /// The session ended; the client must start a new session flow.
    pub const ROOM_CLOSED: u16 = 4003;
    /// Connection superseded by a reconnect of the same user.
    pub const SUPERSEDED: u16 = 4000;
    /// Generic server error; clients reconnect with backoff.
    pub const INTERNAL: u16 = 1011;
}

impl SessionError {
    /// Stable code string carried in `error` and `rejected` frames.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::RoomFull => "room-full",
            Self::RoomClosed => "room-closed",
            Self::PeerNotConnected => "peer-not-connected",
            Self::InvalidSignal(_) => "invalid-signal",
            Self::UnsupportedMessageType(_) => "unsupported-message-type",
            Self::DuplicateConnection(_) => "duplicate-connection",
            Self::UnknownConnection(_) => "unknown-connection",
            Self::OperationRejected(_) => "operation-rejected",
        }
    }

    /// Close code when the error terminates the connection, `None` when the
    /// connection stays alive.
    pub fn close_code(&self) -> Option<u16> {
        match self {
            Self::Unauthorized => Some(close_code::UNAUTHORIZED),
            Self::RoomFull => Some(close_code::ROOM_FULL),
            Self::RoomClosed => Some(close_code::ROOM_CLOSED),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_errors_map_to_close_codes() {
        assert_eq!(SessionError::Unauthorized.close_code(), Some(4001));
        assert_eq!(SessionError::RoomFull.close_code(), Some(4002));
        assert_eq!(SessionError::RoomClosed.close_code(), Some(4003));
        assert_eq!(SessionError::PeerNotConnected.close_code(), None);
        assert_eq!(
            SessionError::InvalidSignal("nack".to_string()).close_code(),
            None
        );
    }
}
