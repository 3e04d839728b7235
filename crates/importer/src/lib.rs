//! Invoice import transaction coordinator.
//!
//! An import is driven by four uncorrelated triggers, each handled by a
//! short-lived, stateless handler:
//! 1. a client asks for an upload slot ([`UploadSlotIssuer`])
//! 2. the uploaded object lands in the stage ([`ImportProcessor`])
//! 3. the client cancels ([`CancellationHandler`])
//! 4. the transaction record is evicted from the store ([`ExpiryReaper`])
//!
//! Handlers agree on the shared transaction record through the store's
//! compare-and-set; there is no in-process lock. [`ImportCoordinator`]
//! routes inbound events to the handlers.

pub mod cancellation;
pub mod context;
pub mod coordinator;
pub mod error;
pub mod frames;
pub mod issuer;
pub mod payload;
pub mod processor;
pub mod reaper;
pub mod services;
pub mod settings;
pub mod sweeper;

pub use cancellation::CancellationHandler;
pub use context::ImportContext;
pub use coordinator::ImportCoordinator;
pub use error::ImportError;
pub use frames::{ClientAction, StatusFrame, UploadSlot};
pub use issuer::UploadSlotIssuer;
pub use payload::{ImportFailure, InvoicePayload, PayloadError};
pub use processor::{ImportProcessor, ProcessOutcome};
pub use reaper::{ExpiryReaper, ReapOutcome};
pub use services::{
    AuditEvent, AuditPublisher, InMemoryAuditPublisher, InMemoryNotifier, Notifier, NotifierExt,
    TracingAuditPublisher,
};
pub use settings::ImportSettings;
pub use sweeper::ExpirySweeper;
