//! WebSocket push channel.

pub mod connection;
pub mod handler;
pub mod notifier;

pub use connection::{ConnectionManager, Outbound};
pub use handler::ws_handler;
pub use notifier::WsNotifier;
