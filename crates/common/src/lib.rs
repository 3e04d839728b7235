pub mod types;

pub use types::{ConnectionId, TransactionId};
