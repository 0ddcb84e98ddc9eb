//! Shared application state.

use dashmap::DashMap;
use std::sync::Arc;

use crate::auth::RoomAuthorizer;
use crate::config::Config;
use crate::registry::ConnectionRegistry;
use crate::room::Room;

/// Global state handed to every handler.
pub struct AppState {
    pub registry: ConnectionRegistry,
    /// Live rooms, created lazily on first join.
    pub rooms: DashMap<String, Arc<Room>>,
    pub config: Arc<Config>,
    pub authorizer: Arc<dyn RoomAuthorizer>,
}

impl AppState {
    pub fn new(config: Config, authorizer: Arc<dyn RoomAuthorizer>) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            rooms: DashMap::new(),
            config: Arc::new(config),
            authorizer,
        }
    }

    /// Clone the room handle out so no map guard is held across awaits.
    pub fn room(&self, room_id: &str) -> Option<Arc<Room>> {
        self.rooms.get(room_id).map(|entry| entry.value().clone())
    }
}
