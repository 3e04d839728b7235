//! Collaborators shared by the import handlers.

use std::sync::Arc;

use stage::ObjectStage;
use store::{InvoiceStore, TransactionStore};

use crate::services::{AuditPublisher, Notifier};
use crate::settings::ImportSettings;

/// Handles to every collaborator a handler may touch.
///
/// Cloning is cheap; each handler keeps its own copy.
#[derive(Clone)]
pub struct ImportContext {
    pub transactions: Arc<dyn TransactionStore>,
    pub invoices: Arc<dyn InvoiceStore>,
    pub stage: Arc<dyn ObjectStage>,
    pub notifier: Arc<dyn Notifier>,
    pub audit: Arc<dyn AuditPublisher>,
    pub settings: ImportSettings,
}

impl ImportContext {
    pub fn new(
        transactions: Arc<dyn TransactionStore>,
        invoices: Arc<dyn InvoiceStore>,
        stage: Arc<dyn ObjectStage>,
        notifier: Arc<dyn Notifier>,
        audit: Arc<dyn AuditPublisher>,
    ) -> Self {
        Self {
            transactions,
            invoices,
            stage,
            notifier,
            audit,
            settings: ImportSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: ImportSettings) -> Self {
        self.settings = settings;
        self
    }
}
