// Transfer-to-request reconciliation
pub mod engine;
pub mod scheduler;

pub use engine::{ReconcilerConfig, ReconciliationEngine, TickSummary};
pub use scheduler::ReconcilerScheduler;
