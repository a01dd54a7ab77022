//! External Interfaces
//!
//! Traits for every collaborator the pool consumes: the yield
//! custodian, the DEX venue, the price oracle, the flash-capital
//! provider, the protocol liquidation adapters, and the keeper
//! registry. Adapters implement these against real venues; tests
//! inject mocks. The pool never reaches for ambient state — all six
//! are owned by the orchestrator and passed in at construction.

use caisson_common::errors::PoolResult;
use caisson_common::types::{Address, AssetId, LiquidationProtocol, PriceQuote, TargetId};

// ============================================================================
// Custodian
// ============================================================================

/// Yield-bearing custody of pooled stablecoins
pub trait Custodian {
    /// Deposit funds; returns the amount actually credited
    fn deposit(&mut self, asset: AssetId, amount: u64) -> PoolResult<u64>;

    /// Withdraw funds; returns the amount actually received
    fn withdraw(&mut self, asset: AssetId, amount: u64) -> PoolResult<u64>;

    /// Current custodied balance
    fn balance(&self, asset: AssetId) -> PoolResult<u64>;
}

// ============================================================================
// DEX Venue
// ============================================================================

/// Swap parameters with the slippage bound made explicit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapParams {
    pub token_in: AssetId,
    pub token_out: AssetId,
    /// Venue fee tier in bps
    pub fee_bps: u64,
    pub amount_in: u64,
    /// Swap aborts below this output
    pub amount_out_minimum: u64,
}

/// Quote and execute swaps
pub trait DexVenue {
    /// Expected output for an input amount
    fn quote(
        &self,
        token_in: AssetId,
        token_out: AssetId,
        fee_bps: u64,
        amount_in: u64,
    ) -> PoolResult<u64>;

    /// Execute a swap; returns the realized output
    fn swap(&mut self, params: &SwapParams) -> PoolResult<u64>;
}

// ============================================================================
// Oracle
// ============================================================================

/// Multi-source price aggregation (external; the pool keeps its own
/// gated history in `RiskMetrics` on top of this)
pub trait PriceFeed {
    fn price(&self, asset: AssetId) -> PoolResult<PriceQuote>;
}

// ============================================================================
// Flash Capital
// ============================================================================

/// A flash loan request; repayment is due within the same call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashLoanRequest {
    pub asset: AssetId,
    pub amount: u64,
    /// Unix deadline; the provider rejects past it
    pub deadline: u64,
    /// Opaque execution data forwarded to the callback context
    pub data: Vec<u8>,
}

/// Flash-capital provider. `open` hands out principal and returns the
/// premium owed; `settle` verifies repayment of principal plus
/// premium and aborts the whole operation otherwise.
pub trait FlashCapital {
    fn open(&mut self, request: &FlashLoanRequest, now: u64) -> PoolResult<u64>;

    fn settle(
        &mut self,
        asset: AssetId,
        principal: u64,
        premium: u64,
        repaid: u64,
    ) -> PoolResult<()>;
}

// ============================================================================
// Liquidation Adapters
// ============================================================================

/// One liquidation call against a protocol adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiquidationCall {
    pub protocol: LiquidationProtocol,
    pub target: TargetId,
    pub collateral_asset: AssetId,
    pub debt_asset: AssetId,
    pub borrower: Address,
    pub debt_to_cover: u64,
    pub min_collateral_out: u64,
}

/// What the adapter actually moved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiquidationOutcome {
    pub collateral_received: u64,
    pub debt_paid: u64,
}

/// Protocol-specific liquidation execution
pub trait LiquidationVenue {
    fn liquidate(&mut self, call: &LiquidationCall) -> PoolResult<LiquidationOutcome>;
}

// ============================================================================
// Keeper Registry
// ============================================================================

/// Authorization for purchase-committing keepers
pub trait KeeperRegistry {
    fn is_authorized(&self, caller: &Address) -> bool;
}

/// The full set of collaborators owned by the pool
pub struct Collaborators {
    pub custodian: Box<dyn Custodian>,
    pub dex: Box<dyn DexVenue>,
    pub price_feed: Box<dyn PriceFeed>,
    pub flash: Box<dyn FlashCapital>,
    pub liquidation: Box<dyn LiquidationVenue>,
    pub keepers: Box<dyn KeeperRegistry>,
}
