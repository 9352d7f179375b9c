use std::collections::HashSet;

use parking_lot::Mutex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::warn;

use crate::error::AllocatorError;

/// Granularity of the fingerprint offset space: three fractional digits
pub const OFFSET_STEP: Decimal = dec!(0.001);

/// Usable offsets per base price (0.001 ..= 0.999)
pub const DEFAULT_OFFSET_CAPACITY: u32 = 999;

/// Pool of fingerprint offsets.
///
/// Every outstanding payment request holds one offset from a fixed arena of
/// `capacity` values, `0.001 * index` for index 1..=capacity. An offset goes
/// back into the pool when its pending payment is matched or expires, so the
/// precision space is never exhausted by churn - only by genuinely
/// concurrent requests.
///
/// While an offset is held, no other outstanding request can receive it,
/// which is what lets a bare transferred amount identify the request it
/// satisfies.
pub struct OffsetPool {
    capacity: u32,
    state: Mutex<PoolState>,
}

struct PoolState {
    /// Offsets freed by match or expiry, reused before fresh ones (LIFO)
    free: Vec<u32>,
    /// Next never-issued arena index, 1-based
    next_unissued: u32,
    /// Indices currently held by outstanding requests
    in_use: HashSet<u32>,
}

impl OffsetPool {
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn new(capacity: u32) -> Self {
        assert!(capacity > 0, "OffsetPool capacity must be > 0");
        Self {
            capacity,
            state: Mutex::new(PoolState {
                free: Vec::new(),
                next_unissued: 1,
                in_use: HashSet::new(),
            }),
        }
    }

    /// Hand out an offset no other outstanding request holds.
    ///
    /// # Errors
    /// Returns [`AllocatorError::Exhausted`] when every offset in the arena
    /// is held by an outstanding request.
    pub fn acquire(&self) -> Result<Decimal, AllocatorError> {
        let mut state = self.state.lock();

        if let Some(index) = state.free.pop() {
            state.in_use.insert(index);
            return Ok(offset_of(index));
        }

        while state.next_unissued <= self.capacity {
            let index = state.next_unissued;
            state.next_unissued += 1;
            if state.in_use.insert(index) {
                return Ok(offset_of(index));
            }
        }

        Err(AllocatorError::Exhausted {
            capacity: self.capacity,
        })
    }

    /// Return an offset to the pool once its pending payment reached a
    /// terminal state. Offsets from outside the arena, or offsets that are
    /// not currently outstanding, are ignored with a warning.
    pub fn release(&self, offset: Decimal) {
        let Some(index) = self.index_of(offset) else {
            warn!("ignoring release of foreign fingerprint offset {}", offset);
            return;
        };

        let mut state = self.state.lock();
        if state.in_use.remove(&index) {
            state.free.push(index);
        } else {
            warn!("fingerprint offset {} released but not outstanding", offset);
        }
    }

    /// Mark offsets as in-use at boot, from pending payments that survived a
    /// restart. Foreign values (e.g. rows minted under a different base
    /// price) are skipped with a warning.
    pub fn restore<I>(&self, offsets: I)
    where
        I: IntoIterator<Item = Decimal>,
    {
        let mut state = self.state.lock();
        for offset in offsets {
            match self.index_of(offset) {
                Some(index) => {
                    state.free.retain(|&i| i != index);
                    state.in_use.insert(index);
                }
                None => warn!("skipping restore of foreign fingerprint offset {}", offset),
            }
        }
    }

    /// Number of offsets currently held by outstanding requests
    pub fn outstanding(&self) -> usize {
        self.state.lock().in_use.len()
    }

    fn index_of(&self, offset: Decimal) -> Option<u32> {
        let steps = offset / OFFSET_STEP;
        if !steps.fract().is_zero() {
            return None;
        }
        let index = steps.to_u32()?;
        (index >= 1 && index <= self.capacity).then_some(index)
    }
}

fn offset_of(index: u32) -> Decimal {
    Decimal::from(index) * OFFSET_STEP
}
