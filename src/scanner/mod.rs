// Chain explorer queries
pub mod models;
pub mod tronscan;

use async_trait::async_trait;

pub use models::{InboundTransfer, ScanOutcome};
pub use tronscan::TronScanClient;

/// Read-only query against the ledger explorer for recent inbound transfers
/// to the merchant address. Implementations never raise into the engine's
/// critical section - failures come back as [`ScanOutcome`] variants.
#[async_trait]
pub trait ChainScanner: Send + Sync {
    async fn recent_transfers(&self) -> ScanOutcome;
}
