//! Protocol module.

pub mod messages;

pub use messages::*;
