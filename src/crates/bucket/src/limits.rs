//! Hot-swappable bucket limits
//!
//! Inflow rate and capacity are held behind shared atomic cells instead of
//! being copied into the bucket. Anyone holding a [`LimitHandle`] can store a
//! new value without taking the bucket lock; the next refill of every bucket
//! referencing the handle sees it.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Shared, atomically updated limit value
#[derive(Clone)]
pub struct LimitHandle {
    cell: Arc<AtomicU64>,
}

impl LimitHandle {
    /// New handle holding `value`
    pub fn new(value: u64) -> Self {
        Self {
            cell: Arc::new(AtomicU64::new(value)),
        }
    }

    /// Current value
    pub fn get(&self) -> u64 {
        self.cell.load(Ordering::Acquire)
    }

    /// Current value as a signed token count, saturating at `i64::MAX`
    pub fn get_signed(&self) -> i64 {
        i64::try_from(self.get()).unwrap_or(i64::MAX)
    }

    /// Replace the value, returning the previous one
    pub fn set(&self, value: u64) -> u64 {
        self.cell.swap(value, Ordering::AcqRel)
    }

    /// Whether two handles share the same cell
    pub fn shares_cell_with(&self, other: &LimitHandle) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }
}

impl fmt::Debug for LimitHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LimitHandle").field(&self.get()).finish()
    }
}

impl From<u64> for LimitHandle {
    fn from(value: u64) -> Self {
        Self::new(value)
    }
}
