//! Real-time session coordination core for live one-to-one tutoring:
//! WebRTC signaling brokered between the two video participants of a room,
//! plus a replicated whiteboard shared with any number of observers.

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod protocol;
pub mod registry;
pub mod room;
pub mod server;
pub mod state;
pub mod whiteboard;
