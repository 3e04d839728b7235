//! Import tuning values.

/// Settings shared by the import handlers.
#[derive(Debug, Clone)]
pub struct ImportSettings {
    /// Lifetime of an upload credential, in seconds.
    pub upload_expires_secs: u32,
    /// Time-to-live of a transaction record, in seconds.
    pub transaction_ttl_secs: u32,
    /// Callback address of the push channel, stored on each record.
    pub endpoint: String,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            upload_expires_secs: 300,
            transaction_ttl_secs: 120,
            endpoint: "ws://localhost:3000/ws".to_string(),
        }
    }
}
