//! Collateral Holding
//!
//! Registry of collateral acquired through completed purchases. Each
//! lock tracks its entry price and the peak price seen while held;
//! selling a lock realizes a signed P&L against its cost basis which
//! the pool feeds back through the waterfall.

use caisson_common::errors::{PoolError, PoolResult};
use caisson_common::types::{AssetId, CollateralLock};
use std::collections::BTreeMap;

/// Result of selling a lock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RealizedSale {
    pub lock_id: u64,
    pub proceeds: u64,
    pub cost_basis: u64,
    /// proceeds minus cost basis
    pub pnl: i64,
}

/// All collateral locks, active and settled
#[derive(Debug, Clone, Default)]
pub struct HoldingBook {
    locks: BTreeMap<u64, CollateralLock>,
    next_lock_id: u64,
}

impl HoldingBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock freshly acquired collateral
    pub fn lock(&mut self, asset: AssetId, amount: u64, entry_price: u64, now: u64) -> u64 {
        let lock_id = self.next_lock_id;
        self.next_lock_id += 1;
        self.locks.insert(
            lock_id,
            CollateralLock {
                lock_id,
                asset,
                amount,
                entry_price,
                peak_price: entry_price,
                acquired_at: now,
                active: true,
            },
        );
        lock_id
    }

    /// Update the peak price from a fresh observation
    pub fn mark_price(&mut self, lock_id: u64, price: u64) -> PoolResult<()> {
        let lock = self.active_mut(lock_id)?;
        lock.peak_price = lock.peak_price.max(price);
        Ok(())
    }

    /// Settle a lock against sale proceeds and its cost basis
    pub fn realize_sale(
        &mut self,
        lock_id: u64,
        proceeds: u64,
        cost_basis: u64,
    ) -> PoolResult<RealizedSale> {
        let lock = self.active_mut(lock_id)?;
        lock.active = false;
        Ok(RealizedSale {
            lock_id,
            proceeds,
            cost_basis,
            pnl: proceeds as i64 - cost_basis as i64,
        })
    }

    pub fn get(&self, lock_id: u64) -> Option<&CollateralLock> {
        self.locks.get(&lock_id)
    }

    /// Locks still holding collateral
    pub fn active_locks(&self) -> impl Iterator<Item = &CollateralLock> {
        self.locks.values().filter(|l| l.active)
    }

    fn active_mut(&mut self, lock_id: u64) -> PoolResult<&mut CollateralLock> {
        let lock = self.locks.get_mut(&lock_id).ok_or(PoolError::InvalidInput {
            param: "lock_id",
            reason: "unknown collateral lock",
        })?;
        if !lock.active {
            return Err(PoolError::InvalidStatus { expected: "active", actual: "settled" });
        }
        Ok(lock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COLLATERAL: AssetId = [2u8; 32];

    #[test]
    fn lock_tracks_peak_price() {
        let mut book = HoldingBook::new();
        let id = book.lock(COLLATERAL, 1_000, 50_000, 100);

        book.mark_price(id, 55_000).unwrap();
        book.mark_price(id, 52_000).unwrap();
        assert_eq!(book.get(id).unwrap().peak_price, 55_000);
    }

    #[test]
    fn sale_realizes_signed_pnl() {
        let mut book = HoldingBook::new();
        let id = book.lock(COLLATERAL, 1_000, 50_000, 100);

        let sale = book.realize_sale(id, 48_000, 45_000).unwrap();
        assert_eq!(sale.pnl, 3_000);
        assert!(!book.get(id).unwrap().active);

        let id2 = book.lock(COLLATERAL, 500, 50_000, 200);
        let sale = book.realize_sale(id2, 20_000, 25_000).unwrap();
        assert_eq!(sale.pnl, -5_000);
    }

    #[test]
    fn settled_locks_reject_further_operations() {
        let mut book = HoldingBook::new();
        let id = book.lock(COLLATERAL, 1_000, 50_000, 100);
        book.realize_sale(id, 48_000, 45_000).unwrap();

        assert!(book.mark_price(id, 60_000).is_err());
        assert!(book.realize_sale(id, 1, 1).is_err());
        assert_eq!(book.active_locks().count(), 0);
    }
}
