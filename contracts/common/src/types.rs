//! Core Types for the Caisson Pool
//!
//! Persistent data structures shared across the engine and the pool
//! orchestrator. Everything that lands in the ledger or the event log
//! derives both serde and borsh; borsh is also the canonical encoding
//! hashed into commitments and loss proofs.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

/// Type alias for addresses (32-byte hash)
pub type Address = [u8; 32];

/// Type alias for asset identifiers
pub type AssetId = [u8; 32];

/// Type alias for purchase execution identifiers
pub type ExecutionId = [u8; 32];

/// Type alias for liquidation target identifiers (trove, position)
pub type TargetId = [u8; 32];

// ============ Tranche Types ============

/// Capital layer with distinct loss priority and return profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum Tranche {
    /// Protected layer; absorbs losses only after Junior is exhausted
    Senior,
    /// First-loss layer; earns the larger profit share
    Junior,
}

impl Tranche {
    /// Stable index for per-tranche arrays
    pub fn index(&self) -> usize {
        match self {
            Tranche::Senior => 0,
            Tranche::Junior => 1,
        }
    }

    /// The other tranche
    pub fn other(&self) -> Tranche {
        match self {
            Tranche::Senior => Tranche::Junior,
            Tranche::Junior => Tranche::Senior,
        }
    }
}

// ============ Withdrawal Types ============

/// Queued withdrawal awaiting the fulfillment delay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct WithdrawRequest {
    /// Queue identifier, unique for the pool lifetime
    pub queue_id: u64,
    /// Requesting holder
    pub user: Address,
    /// Shares queued for burning (reduced in place on partial fills)
    pub shares: u64,
    /// Tranche the shares belong to
    pub tranche: Tranche,
    /// Stablecoin to pay out
    pub asset: AssetId,
    /// Timestamp of the request
    pub requested_at: u64,
    /// Set once fully settled; second fulfillment attempts are rejected
    pub fulfilled: bool,
}

impl WithdrawRequest {
    pub fn new(
        queue_id: u64,
        user: Address,
        shares: u64,
        tranche: Tranche,
        asset: AssetId,
        requested_at: u64,
    ) -> Self {
        Self {
            queue_id,
            user,
            shares,
            tranche,
            asset,
            requested_at,
            fulfilled: false,
        }
    }
}

// ============ Purchase Types ============

/// Lifecycle of a commit-reveal purchase attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum PurchaseStatus {
    /// Committed, funds reserved, awaiting reveal
    #[default]
    Pending,
    /// Reveal verified; external execution in flight
    Executing,
    /// Collateral acquired and locked
    Completed,
    /// Withdrawn by the keeper before reveal
    Cancelled,
    /// External execution aborted; reservation released
    Failed,
}

impl PurchaseStatus {
    /// Short name for diagnostics
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseStatus::Pending => "PENDING",
            PurchaseStatus::Executing => "EXECUTING",
            PurchaseStatus::Completed => "COMPLETED",
            PurchaseStatus::Cancelled => "CANCELLED",
            PurchaseStatus::Failed => "FAILED",
        }
    }
}

/// One commit-reveal purchase attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct PurchaseAttempt {
    /// Fresh identifier derived from commitment, time, and nonce
    pub execution_id: ExecutionId,
    /// Liquidation target; marked processed exactly once
    pub target: TargetId,
    /// Stablecoin backing the reservation
    pub asset: AssetId,
    /// Committing keeper
    pub keeper: Address,
    /// Pool funds reserved for the expected cost
    pub reserved: u64,
    /// Current lifecycle status
    pub status: PurchaseStatus,
    /// Block of the commit
    pub commit_block: u64,
    /// Timestamp of the commit
    pub committed_at: u64,
}

/// Stored commitment awaiting its reveal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct CommitmentData {
    /// Hash binding target, parameters, and salt
    pub commitment: [u8; 32],
    /// Block of the commit; the reveal window counts from here
    pub commit_block: u64,
    /// Keeper that committed
    pub keeper: Address,
    /// Set once revealed; a commitment is never revealed twice
    pub revealed: bool,
}

/// Lending protocol a liquidation executes against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum LiquidationProtocol {
    Aave,
    Compound,
    Liquity,
    Morpho,
}

/// Parameters a keeper commits to and later reveals
///
/// The borsh encoding of this struct (plus the salt) is what the
/// commitment hash binds; field order is therefore part of the
/// protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct RevealData {
    /// Protocol the target lives on
    pub protocol: LiquidationProtocol,
    /// Liquidation target (trove id, position id)
    pub target: TargetId,
    /// Borrower being liquidated
    pub borrower: Address,
    /// Collateral asset to receive
    pub collateral_asset: AssetId,
    /// Debt asset to repay
    pub debt_asset: AssetId,
    /// Debt to cover in the liquidation
    pub debt_to_cover: u64,
    /// Slippage bound on acquired collateral
    pub min_collateral_out: u64,
}

// ============ Reinsurance Types ============

/// External capital provider backing the pool beyond Junior
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct ReinsuranceProvider {
    /// Provider address
    pub provider: Address,
    /// Capital the provider has allocated to the pool
    pub allocated_capital: u64,
    /// Ceiling on coverage per request
    pub coverage_limit: u64,
    /// Premium owed back per unit of approved coverage
    pub premium_rate_bps: u64,
    /// 0-100 operator-assigned reliability score
    pub trust_score: u8,
    /// Inactive providers receive no allocations
    pub active: bool,
}

/// Lifecycle of a coverage request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum CoverageStatus {
    #[default]
    Pending,
    Approved,
    PaidOut,
    Rejected,
    Expired,
}

/// Claim against the reinsurance layer for a verified loss
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct CoverageRequest {
    /// Request identifier
    pub request_id: u64,
    /// Total loss the pool realized
    pub loss_amount: u64,
    /// Loss above the deductible, requested from providers
    pub requested_coverage: u64,
    /// Coverage allocated across providers on approval
    pub approved_coverage: u64,
    /// Current lifecycle status
    pub status: CoverageStatus,
    /// Timestamp of the request; the validity window counts from here
    pub requested_at: u64,
}

// ============ Holding Types ============

/// Acquired liquidation collateral held for later distribution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct CollateralLock {
    /// Lock identifier
    pub lock_id: u64,
    /// Collateral asset
    pub asset: AssetId,
    /// Amount held
    pub amount: u64,
    /// Price at acquisition
    pub entry_price: u64,
    /// Highest price observed while held
    pub peak_price: u64,
    /// Timestamp of acquisition
    pub acquired_at: u64,
    /// Cleared when the lock is sold or released
    pub active: bool,
}

// ============ Oracle Types ============

/// Price with the oracle's confidence in it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct PriceQuote {
    /// Price in pool base units
    pub price: u64,
    /// Aggregation confidence (10_000 = full agreement)
    pub confidence_bps: u64,
    /// Observation timestamp
    pub timestamp: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tranche_indices_are_stable() {
        assert_eq!(Tranche::Senior.index(), 0);
        assert_eq!(Tranche::Junior.index(), 1);
        assert_eq!(Tranche::Senior.other(), Tranche::Junior);
    }

    #[test]
    fn reveal_data_borsh_round_trip() {
        let reveal = RevealData {
            protocol: LiquidationProtocol::Aave,
            target: [7u8; 32],
            borrower: [8u8; 32],
            collateral_asset: [9u8; 32],
            debt_asset: [10u8; 32],
            debt_to_cover: 123_456,
            min_collateral_out: 100_000,
        };

        let bytes = borsh::to_vec(&reveal).unwrap();
        let decoded: RevealData = borsh::from_slice(&bytes).unwrap();
        assert_eq!(decoded, reveal);
    }

    #[test]
    fn purchase_status_defaults_to_pending() {
        assert_eq!(PurchaseStatus::default(), PurchaseStatus::Pending);
        assert_eq!(PurchaseStatus::Executing.as_str(), "EXECUTING");
    }
}
