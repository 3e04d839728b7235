pub mod change;
pub mod error;
pub mod invoice;
pub mod memory;
pub mod postgres;
pub mod store;
pub mod transaction;

pub use change::{ChangeKind, TransactionChange};
pub use common::{ConnectionId, TransactionId};
pub use error::{Result, StoreError};
pub use invoice::Invoice;
pub use memory::{InMemoryInvoiceStore, InMemoryTransactionStore};
pub use postgres::{PostgresInvoiceStore, PostgresTransactionStore};
pub use store::{InvoiceStore, TransactionStore, TransactionStoreExt, check_transition};
pub use transaction::{InvoiceTransaction, TRANSACTION_PARTITION, TransactionStatus};
