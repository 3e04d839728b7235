//! External collaborators of the import handlers.

pub mod audit;
pub mod notifier;

pub use audit::{AuditEvent, AuditPublisher, InMemoryAuditPublisher, TracingAuditPublisher};
pub use notifier::{InMemoryNotifier, Notifier, NotifierExt};
