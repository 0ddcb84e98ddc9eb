//! Authorization collaborator seam.
//!
//! Booking ownership lives outside this core. The coordinator asks once at
//! join time whether `(user_id, room_id)` belongs to the room's underlying
//! booking and never re-checks afterwards.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};

/// Verdict of the external authorization collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthDecision {
    Authorized,
    Forbidden,
}

#[async_trait]
pub trait RoomAuthorizer: Send + Sync {
    async fn authorize(&self, user_id: &str, room_id: &str) -> AuthDecision;
}

/// Trusts every verified identity. Used when the upstream gateway already
/// checked booking membership before handing out the room id.
pub struct AllowAll;

#[async_trait]
impl RoomAuthorizer for AllowAll {
    async fn authorize(&self, _user_id: &str, _room_id: &str) -> AuthDecision {
        AuthDecision::Authorized
    }
}

/// Fixed room rosters, mainly for tests and local development.
#[derive(Default)]
pub struct StaticRoster {
    rooms: HashMap<String, HashSet<String>>,
}

impl StaticRoster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn permit(mut self, room_id: &str, user_id: &str) -> Self {
        self.rooms
            .entry(room_id.to_string())
            .or_default()
            .insert(user_id.to_string());
        self
    }
}

#[async_trait]
impl RoomAuthorizer for StaticRoster {
    async fn authorize(&self, user_id: &str, room_id: &str) -> AuthDecision {
        match self.rooms.get(room_id) {
            Some(users) if users.contains(user_id) => AuthDecision::Authorized,
            _ => AuthDecision::Forbidden,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn roster_rejects_unknown_users() {
        let roster = StaticRoster::new().permit("bk_1", "tutor_1");
        assert_eq!(
            roster.authorize("tutor_1", "bk_1").await,
            AuthDecision::Authorized
        );
        assert_eq!(
            roster.authorize("stranger", "bk_1").await,
            AuthDecision::Forbidden
        );
        assert_eq!(
            roster.authorize("tutor_1", "bk_2").await,
            AuthDecision::Forbidden
        );
    }
}
