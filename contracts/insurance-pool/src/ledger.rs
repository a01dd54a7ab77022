//! Pool Ledger
//!
//! Authoritative balances: per-asset pool totals and reservations,
//! per-(user, tranche) shares, tranche totals and values, the pending
//! withdrawal tally, and the FIFO withdrawal queue. Mutations are
//! small and explicit; the pool re-checks the waterfall invariants
//! after every compound operation. Share totals equal the sum of user
//! shares by construction — shares only enter or leave through mint
//! and burn.

use borsh::{BorshDeserialize, BorshSerialize};
use caisson_common::errors::{PoolError, PoolResult};
use caisson_common::types::{Address, AssetId, Tranche, WithdrawRequest};
use caisson_common::waterfall::{validate_invariants, TrancheState};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Per-asset funds accounting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct AssetBalance {
    /// All pool-owned funds in this asset, custodied or liquid
    pub total_pool: u64,
    /// Portion reserved for in-flight purchases
    pub reserved: u64,
}

impl AssetBalance {
    /// Funds not locked behind a reservation
    pub fn unreserved(&self) -> u64 {
        self.total_pool.saturating_sub(self.reserved)
    }
}

/// Deposit timing used by the anti-manipulation guards
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct DepositMeta {
    pub block: u64,
    pub timestamp: u64,
}

/// The persistent pool ledger
#[derive(Debug, Clone, Default, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct Ledger {
    balances: BTreeMap<AssetId, AssetBalance>,
    shares: BTreeMap<(Address, Tranche), u64>,
    pending: BTreeMap<(Address, Tranche), u64>,
    total_shares: [u64; 2],
    tranche_values: [u64; 2],
    queue: Vec<WithdrawRequest>,
    next_queue_id: u64,
    deposit_meta: BTreeMap<(Address, Tranche), DepositMeta>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    // ============ Views ============

    /// Snapshot both tranches for the waterfall
    pub fn tranche_state(&self) -> TrancheState {
        TrancheState::new(
            self.tranche_values[Tranche::Senior.index()],
            self.tranche_values[Tranche::Junior.index()],
            self.total_shares[Tranche::Senior.index()],
            self.total_shares[Tranche::Junior.index()],
        )
    }

    pub fn balance(&self, asset: &AssetId) -> AssetBalance {
        self.balances.get(asset).copied().unwrap_or_default()
    }

    pub fn shares_of(&self, user: &Address, tranche: Tranche) -> u64 {
        self.shares.get(&(*user, tranche)).copied().unwrap_or(0)
    }

    pub fn pending_of(&self, user: &Address, tranche: Tranche) -> u64 {
        self.pending.get(&(*user, tranche)).copied().unwrap_or(0)
    }

    pub fn total_shares(&self, tranche: Tranche) -> u64 {
        self.total_shares[tranche.index()]
    }

    pub fn tranche_value(&self, tranche: Tranche) -> u64 {
        self.tranche_values[tranche.index()]
    }

    pub fn deposit_meta(&self, user: &Address, tranche: Tranche) -> Option<DepositMeta> {
        self.deposit_meta.get(&(*user, tranche)).copied()
    }

    /// Funds available across all assets, net of reservations
    pub fn total_unreserved(&self) -> u64 {
        self.balances
            .values()
            .fold(0u64, |acc, b| acc.saturating_add(b.unreserved()))
    }

    /// All pool-owned funds across assets
    pub fn total_funds(&self) -> u64 {
        self.balances
            .values()
            .fold(0u64, |acc, b| acc.saturating_add(b.total_pool))
    }

    // ============ Funds ============

    pub fn credit_pool(&mut self, asset: AssetId, amount: u64) -> PoolResult<()> {
        let balance = self.balances.entry(asset).or_default();
        balance.total_pool = balance
            .total_pool
            .checked_add(amount)
            .ok_or(PoolError::Overflow)?;
        Ok(())
    }

    pub fn debit_pool(&mut self, asset: AssetId, amount: u64) -> PoolResult<()> {
        let balance = self.balances.entry(asset).or_default();
        if amount > balance.unreserved() {
            return Err(PoolError::InsufficientPoolFunds {
                available: balance.unreserved(),
                requested: amount,
            });
        }
        balance.total_pool -= amount;
        Ok(())
    }

    /// Reserve funds for a purchase. Atomic with respect to the
    /// unreserved balance: no sequence of calls can reserve more than
    /// `total_pool - reserved`.
    pub fn reserve(&mut self, asset: AssetId, amount: u64) -> PoolResult<()> {
        let balance = self.balances.entry(asset).or_default();
        if amount > balance.unreserved() {
            return Err(PoolError::InsufficientPoolFunds {
                available: balance.unreserved(),
                requested: amount,
            });
        }
        balance.reserved += amount;
        Ok(())
    }

    /// Release an unused reservation
    pub fn release(&mut self, asset: AssetId, amount: u64) -> PoolResult<()> {
        let balance = self.balances.entry(asset).or_default();
        if amount > balance.reserved {
            return Err(PoolError::InsufficientReserved {
                reserved: balance.reserved,
                requested: amount,
            });
        }
        balance.reserved -= amount;
        Ok(())
    }

    /// Spend `spent` out of a reservation of `reserved`, releasing
    /// the difference
    pub fn consume_reservation(
        &mut self,
        asset: AssetId,
        reserved: u64,
        spent: u64,
    ) -> PoolResult<()> {
        if spent > reserved {
            return Err(PoolError::InsufficientReserved { reserved, requested: spent });
        }
        let balance = self.balances.entry(asset).or_default();
        if reserved > balance.reserved || spent > balance.total_pool {
            return Err(PoolError::InsufficientReserved {
                reserved: balance.reserved,
                requested: reserved,
            });
        }
        balance.reserved -= reserved;
        balance.total_pool -= spent;
        Ok(())
    }

    // ============ Shares ============

    pub fn mint_shares(
        &mut self,
        user: Address,
        tranche: Tranche,
        shares: u64,
        value_added: u64,
        meta: DepositMeta,
    ) -> PoolResult<()> {
        let entry = self.shares.entry((user, tranche)).or_insert(0);
        *entry = entry.checked_add(shares).ok_or(PoolError::Overflow)?;
        self.total_shares[tranche.index()] = self.total_shares[tranche.index()]
            .checked_add(shares)
            .ok_or(PoolError::Overflow)?;
        self.tranche_values[tranche.index()] = self.tranche_values[tranche.index()]
            .checked_add(value_added)
            .ok_or(PoolError::Overflow)?;
        self.deposit_meta.insert((user, tranche), meta);
        Ok(())
    }

    pub fn burn_shares(
        &mut self,
        user: &Address,
        tranche: Tranche,
        shares: u64,
        value_removed: u64,
    ) -> PoolResult<()> {
        let held = self.shares_of(user, tranche);
        if shares > held {
            return Err(PoolError::InsufficientPoolFunds { available: held, requested: shares });
        }
        if shares == held {
            self.shares.remove(&(*user, tranche));
        } else {
            self.shares.insert((*user, tranche), held - shares);
        }
        self.total_shares[tranche.index()] = self.total_shares[tranche.index()]
            .checked_sub(shares)
            .ok_or(PoolError::Underflow)?;
        self.tranche_values[tranche.index()] =
            self.tranche_values[tranche.index()].saturating_sub(value_removed);
        Ok(())
    }

    /// Apply a waterfall result to the tranche values
    pub fn add_tranche_value(&mut self, tranche: Tranche, amount: u64) -> PoolResult<()> {
        self.tranche_values[tranche.index()] = self.tranche_values[tranche.index()]
            .checked_add(amount)
            .ok_or(PoolError::Overflow)?;
        Ok(())
    }

    /// Remove value from a tranche, saturating at zero (losses beyond
    /// a tranche's value wipe it, they do not underflow)
    pub fn sub_tranche_value(&mut self, tranche: Tranche, amount: u64) {
        self.tranche_values[tranche.index()] =
            self.tranche_values[tranche.index()].saturating_sub(amount);
    }

    // ============ Withdrawal Queue ============

    pub fn push_request(
        &mut self,
        user: Address,
        shares: u64,
        tranche: Tranche,
        asset: AssetId,
        now: u64,
    ) -> PoolResult<u64> {
        let queue_id = self.next_queue_id;
        self.next_queue_id += 1;
        self.queue
            .push(WithdrawRequest::new(queue_id, user, shares, tranche, asset, now));

        let pending = self.pending.entry((user, tranche)).or_insert(0);
        *pending = pending.checked_add(shares).ok_or(PoolError::Overflow)?;
        Ok(queue_id)
    }

    pub fn request(&self, queue_id: u64) -> Option<&WithdrawRequest> {
        self.queue.iter().find(|r| r.queue_id == queue_id)
    }

    pub fn request_mut(&mut self, queue_id: u64) -> Option<&mut WithdrawRequest> {
        self.queue.iter_mut().find(|r| r.queue_id == queue_id)
    }

    /// Pending queue in FIFO order (settled entries may linger until
    /// the next batch sweep)
    pub fn queue(&self) -> &[WithdrawRequest] {
        &self.queue
    }

    pub fn sub_pending(&mut self, user: &Address, tranche: Tranche, shares: u64) -> PoolResult<()> {
        let pending = self.pending_of(user, tranche);
        if shares > pending {
            return Err(PoolError::Underflow);
        }
        if shares == pending {
            self.pending.remove(&(*user, tranche));
        } else {
            self.pending.insert((*user, tranche), pending - shares);
        }
        Ok(())
    }

    /// Clear a user's pending tally entirely (emergency redemption)
    pub fn clear_pending(&mut self, user: &Address, tranche: Tranche) {
        self.pending.remove(&(*user, tranche));
        self.queue
            .retain(|r| !(r.user == *user && r.tranche == tranche && !r.fulfilled));
    }

    /// Remove settled entries with swap-with-last-and-pop
    pub fn sweep_settled(&mut self) -> u64 {
        let mut removed = 0;
        let mut i = 0;
        while i < self.queue.len() {
            if self.queue[i].fulfilled {
                self.queue.swap_remove(i);
                removed += 1;
            } else {
                i += 1;
            }
        }
        removed
    }

    // ============ Integrity ============

    /// Check the waterfall invariants plus share-sum consistency.
    ///
    /// Called by the pool after every compound mutation; an error
    /// here is a bug, not a user mistake.
    pub fn check_invariants(&self) -> PoolResult<()> {
        let state = self.tranche_state();
        debug_assert!(validate_invariants(&state));
        if !validate_invariants(&state) {
            return Err(PoolError::InvariantViolated { invariant: "tranche value conservation" });
        }

        for tranche in [Tranche::Senior, Tranche::Junior] {
            let sum = self
                .shares
                .iter()
                .filter(|((_, t), _)| *t == tranche)
                .fold(0u64, |acc, (_, s)| acc.saturating_add(*s));
            if sum != self.total_shares[tranche.index()] {
                return Err(PoolError::InvariantViolated { invariant: "share totals match holders" });
            }
        }

        for ((user, tranche), pending) in &self.pending {
            if *pending > self.shares_of(user, *tranche) {
                return Err(PoolError::InvariantViolated {
                    invariant: "pending never exceeds holdings",
                });
            }
        }
        Ok(())
    }

    /// Root of the ledger's value-bearing state, bound into loss
    /// proofs
    pub fn state_root(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        for (asset, balance) in &self.balances {
            hasher.update(asset);
            hasher.update(balance.total_pool.to_le_bytes());
            hasher.update(balance.reserved.to_le_bytes());
        }
        hasher.update(self.total_shares[0].to_le_bytes());
        hasher.update(self.total_shares[1].to_le_bytes());
        hasher.update(self.tranche_values[0].to_le_bytes());
        hasher.update(self.tranche_values[1].to_le_bytes());
        hasher.finalize().into()
    }
}
