//! Committed invoice records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::TransactionId;

/// Prefix of the partition key derived from the customer name.
pub const INVOICE_PARTITION_PREFIX: &str = "#invoice_";

/// A committed invoice. Created once by the import processor and never
/// mutated or evicted (`ttl == 0`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub customer_key: String,
    pub invoice_number: String,
    pub customer_name: String,
    pub total_value: f64,
    pub product_id: String,
    pub quantity: u32,
    pub transaction_id: TransactionId,
    pub created_at: DateTime<Utc>,
    pub ttl: i64,
}

impl Invoice {
    pub fn new(
        customer_name: impl Into<String>,
        invoice_number: impl Into<String>,
        total_value: f64,
        product_id: impl Into<String>,
        quantity: u32,
        transaction_id: TransactionId,
    ) -> Self {
        let customer_name = customer_name.into();
        Self {
            customer_key: Self::customer_key_for(&customer_name),
            invoice_number: invoice_number.into(),
            customer_name,
            total_value,
            product_id: product_id.into(),
            quantity,
            transaction_id,
            created_at: Utc::now(),
            ttl: 0,
        }
    }

    /// Derives the partition key for a customer.
    pub fn customer_key_for(customer_name: &str) -> String {
        format!("{INVOICE_PARTITION_PREFIX}{customer_name}")
    }

    /// Returns the composite key as a display string.
    pub fn key(&self) -> String {
        format!("{}/{}", self.customer_key, self.invoice_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn customer_key_is_derived_from_name() {
        let invoice = Invoice::new("alice", "INV-1", 10.5, "p-1", 2, TransactionId::from("abc"));
        assert_eq!(invoice.customer_key, "#invoice_alice");
        assert_eq!(invoice.key(), "#invoice_alice/INV-1");
        assert_eq!(invoice.ttl, 0);
    }
}
