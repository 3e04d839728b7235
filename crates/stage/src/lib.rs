//! Object stage: the temporary landing area for uploaded invoice files.
//!
//! Clients never talk to the stage with their own identity. They receive a
//! key-scoped, time-limited [`UploadCredential`] and perform exactly one
//! write with it. Every successful write is announced as an
//! [`ObjectCreated`] notification.

pub mod error;
pub mod memory;
pub mod object;
pub mod stage;

pub use error::{Result, StageError};
pub use memory::{DEFAULT_OBJECT_LIFETIME_SECS, InMemoryObjectStage};
pub use object::{ObjectCreated, StagePurge, UploadCredential};
pub use stage::ObjectStage;
