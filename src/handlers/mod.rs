//! Message handlers.

pub mod connection;
pub mod room;
pub mod signaling;
pub mod turn;
pub mod whiteboard;

pub use connection::*;
pub use room::*;
pub use signaling::*;
pub use turn::*;
pub use whiteboard::*;
