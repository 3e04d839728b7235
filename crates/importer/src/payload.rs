//! Parsing of uploaded invoice payloads.

use common::TransactionId;
use serde::Deserialize;
use store::Invoice;
use thiserror::Error;

/// Classification of an import that will not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportFailure {
    /// The transaction record expired before processing finished.
    Timeout,
    /// The payload parsed but has no usable invoice number.
    NoInvoiceNumber,
    /// The payload is not a valid invoice document.
    MalformedPayload,
}

impl ImportFailure {
    /// Returns the `errorDetail` code used in audit events.
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportFailure::Timeout => "TIMEOUT",
            ImportFailure::NoInvoiceNumber => "FAIL_NO_INVOICE_NUMBER",
            ImportFailure::MalformedPayload => "FAIL_MALFORMED_PAYLOAD",
        }
    }
}

impl std::fmt::Display for ImportFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("malformed invoice payload: {0}")]
    Malformed(String),

    #[error("invoice payload has no invoice number")]
    MissingInvoiceNumber,
}

impl PayloadError {
    pub fn failure(&self) -> ImportFailure {
        match self {
            PayloadError::Malformed(_) => ImportFailure::MalformedPayload,
            PayloadError::MissingInvoiceNumber => ImportFailure::NoInvoiceNumber,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawInvoicePayload {
    customer_name: String,
    #[serde(default)]
    invoice_number: Option<String>,
    total_value: f64,
    product_id: String,
    quantity: u32,
}

/// A validated uploaded invoice document.
#[derive(Debug, Clone, PartialEq)]
pub struct InvoicePayload {
    pub customer_name: String,
    pub invoice_number: String,
    pub total_value: f64,
    pub product_id: String,
    pub quantity: u32,
}

impl InvoicePayload {
    pub fn parse(bytes: &[u8]) -> Result<Self, PayloadError> {
        let raw: RawInvoicePayload =
            serde_json::from_slice(bytes).map_err(|e| PayloadError::Malformed(e.to_string()))?;

        let invoice_number = raw
            .invoice_number
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .ok_or(PayloadError::MissingInvoiceNumber)?;

        Ok(Self {
            customer_name: raw.customer_name,
            invoice_number,
            total_value: raw.total_value,
            product_id: raw.product_id,
            quantity: raw.quantity,
        })
    }

    /// Builds the invoice record committed for `transaction_id`.
    pub fn into_invoice(self, transaction_id: TransactionId) -> Invoice {
        Invoice::new(
            self.customer_name,
            self.invoice_number,
            self.total_value,
            self.product_id,
            self.quantity,
            transaction_id,
        )
    }
}
