// Fingerprint amount allocation
pub mod pool;

pub use pool::{OffsetPool, DEFAULT_OFFSET_CAPACITY, OFFSET_STEP};
