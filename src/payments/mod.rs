// Reconciliation state: pending payments, processed transfers, subscriptions
pub mod memory;
pub mod models;
pub mod postgres;
pub mod store;

pub use memory::MemoryPaymentStore;
pub use models::{stacked_expiry, CreditOutcome, PendingPayment, ProcessedTransfer, Subscription};
pub use postgres::PgPaymentStore;
pub use store::PaymentStore;
