//! Error Types for the Caisson Pool
//!
//! Typed errors with stable codes for logging and a five-kind
//! taxonomy that tells callers how to react: validation errors need a
//! corrected retry, state-precondition errors need waiting, integrity
//! errors are security-relevant rejections, capacity errors are the
//! solvency backpressure, and external errors abort the whole call.

use crate::types::{Address, AssetId, ExecutionId, TargetId};

/// Result type alias for pool operations
pub type PoolResult<T> = Result<T, PoolError>;

/// How a rejected call should be interpreted by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input; retry with corrected parameters
    Validation,
    /// Right input, wrong time; wait or adjust
    StatePrecondition,
    /// Security-relevant rejection, never degraded silently
    Integrity,
    /// Solvency backpressure; the pool refuses to take on more
    Capacity,
    /// A collaborator failed; the whole call aborted atomically
    External,
}

/// Main error enum for all pool operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    // ============ Validation Errors ============
    /// Zero amount not allowed
    ZeroAmount,

    /// Amount below minimum threshold
    BelowMinimum { amount: u64, minimum: u64 },

    /// Amount exceeds maximum allowed
    ExceedsMaximum { amount: u64, maximum: u64 },

    /// Asset is not supported by this pool
    UnsupportedAsset { asset: AssetId },

    /// Invalid input parameter
    InvalidInput { param: &'static str, reason: &'static str },

    /// Invalid address (e.g., zero address)
    InvalidAddress { reason: &'static str },

    /// Risk weights do not sum to the bps denominator
    WeightSumMismatch { sum: u64 },

    /// Arithmetic overflow occurred
    Overflow,

    /// Arithmetic underflow occurred
    Underflow,

    /// Division by zero
    DivisionByZero,

    // ============ State-Precondition Errors ============
    /// Deposit cooldown has not elapsed
    CooldownActive { remaining_secs: u64 },

    /// Withdrawal requested in the same block as the deposit
    SameBlockWithdrawal { block: u64 },

    /// Mandatory delay after the request has not elapsed
    DelayNotElapsed { remaining_secs: u64 },

    /// Withdrawal request already fulfilled
    AlreadyFulfilled { queue_id: u64 },

    /// Withdrawal request not found
    RequestNotFound { queue_id: u64 },

    /// Purchase attempt not found
    AttemptNotFound { execution_id: ExecutionId },

    /// Purchase attempt is not in the status the operation requires
    InvalidStatus { expected: &'static str, actual: &'static str },

    /// Reveal arrived in the commit block or earlier
    RevealTooEarly { commit_block: u64, current_block: u64 },

    /// Commitment window has closed
    CommitmentExpired { commit_block: u64, current_block: u64 },

    /// Premium epoch has not elapsed
    EpochNotElapsed { remaining_secs: u64 },

    /// Coverage request not found
    CoverageNotFound { request_id: u64 },

    /// Coverage request is not in the status the operation requires
    InvalidCoverageStatus { request_id: u64 },

    /// Reinsurance provider not found
    ProviderNotFound { provider: Address },

    /// Reinsurance provider is not active
    ProviderInactive { provider: Address },

    /// Shutdown has not been initiated
    ShutdownNotInitiated,

    /// Shutdown already initiated
    ShutdownAlreadyInitiated,

    /// Shutdown delay has not elapsed
    ShutdownDelayActive { remaining_secs: u64 },

    /// Re-entered an externally-observable critical section
    ReentrantCall,

    // ============ Integrity Errors ============
    /// Revealed data does not hash to the stored commitment
    CommitmentMismatch { execution_id: ExecutionId },

    /// Purchase already finalized (second idempotency guard)
    AlreadyFinalized { execution_id: ExecutionId },

    /// Liquidation target was already attempted
    TargetAlreadyProcessed { target: TargetId },

    /// Loss proof does not verify against the ledger state
    InvalidLossProof,

    /// Oracle confidence below the accepted minimum
    InsufficientConfidence { confidence_bps: u64, minimum_bps: u64 },

    /// Latest price observation is too old
    StalePrice { age_secs: u64, max_age_secs: u64 },

    /// Price jump exceeds the per-observation deviation bound
    PriceDeviation { old_price: u64, new_price: u64, max_jump_bps: u64 },

    /// Caller lacks the required capability
    Unauthorized { caller: Address, required: &'static str },

    /// A ledger invariant failed after a mutation
    InvariantViolated { invariant: &'static str },

    // ============ Capacity Errors ============
    /// Deposit would exceed the per-actor exposure limit
    ExceedsExposureLimit { amount: u64, limit: u64 },

    /// Pool does not hold enough unreserved funds
    InsufficientPoolFunds { available: u64, requested: u64 },

    /// Reservation accounting does not cover the request
    InsufficientReserved { reserved: u64, requested: u64 },

    /// Post-operation capital ratio would fall below the minimum
    CapitalRatioBreach { ratio_bps: u64, minimum_bps: u64 },

    /// Circuit breaker is active; liquidations are paused
    CircuitBreakerTripped,

    /// Acquired collateral is worth less than the minimum
    CollateralValueTooLow { value: u64, minimum: u64 },

    // ============ External-Call Failures ============
    /// Custodian returned less than requested
    CustodianShortfall { requested: u64, received: u64 },

    /// Swap produced less than the slippage bound
    SlippageExceeded { minimum_out: u64, actual_out: u64 },

    /// Flash capital was not repaid in full
    FlashLoanNotRepaid { owed: u64, repaid: u64 },

    /// Flash execution missed its deadline
    FlashDeadlineExceeded { deadline: u64, now: u64 },

    /// Protocol liquidation adapter rejected the call
    LiquidationCallFailed { reason: &'static str },

    /// Oracle could not produce a usable price
    OracleUnavailable,
}

impl PoolError {
    /// Returns a stable error code for logging/debugging
    pub fn code(&self) -> &'static str {
        match self {
            Self::ZeroAmount => "E010_ZERO_AMOUNT",
            Self::BelowMinimum { .. } => "E011_BELOW_MINIMUM",
            Self::ExceedsMaximum { .. } => "E012_EXCEEDS_MAXIMUM",
            Self::UnsupportedAsset { .. } => "E013_UNSUPPORTED_ASSET",
            Self::InvalidInput { .. } => "E014_INVALID_INPUT",
            Self::InvalidAddress { .. } => "E015_INVALID_ADDRESS",
            Self::WeightSumMismatch { .. } => "E016_WEIGHT_SUM",
            Self::Overflow => "E017_OVERFLOW",
            Self::Underflow => "E018_UNDERFLOW",
            Self::DivisionByZero => "E019_DIV_ZERO",
            Self::CooldownActive { .. } => "E020_COOLDOWN",
            Self::SameBlockWithdrawal { .. } => "E021_SAME_BLOCK",
            Self::DelayNotElapsed { .. } => "E022_DELAY",
            Self::AlreadyFulfilled { .. } => "E023_ALREADY_FULFILLED",
            Self::RequestNotFound { .. } => "E024_REQUEST_NOT_FOUND",
            Self::AttemptNotFound { .. } => "E025_ATTEMPT_NOT_FOUND",
            Self::InvalidStatus { .. } => "E026_INVALID_STATUS",
            Self::RevealTooEarly { .. } => "E027_REVEAL_TOO_EARLY",
            Self::CommitmentExpired { .. } => "E028_COMMIT_EXPIRED",
            Self::EpochNotElapsed { .. } => "E029_EPOCH",
            Self::CoverageNotFound { .. } => "E02A_COVERAGE_NOT_FOUND",
            Self::InvalidCoverageStatus { .. } => "E02B_COVERAGE_STATUS",
            Self::ProviderNotFound { .. } => "E02C_PROVIDER_NOT_FOUND",
            Self::ProviderInactive { .. } => "E02D_PROVIDER_INACTIVE",
            Self::ShutdownNotInitiated => "E02E_NO_SHUTDOWN",
            Self::ShutdownAlreadyInitiated => "E02F_SHUTDOWN_ACTIVE",
            Self::ShutdownDelayActive { .. } => "E030_SHUTDOWN_DELAY",
            Self::ReentrantCall => "E031_REENTRANT",
            Self::CommitmentMismatch { .. } => "E040_COMMIT_MISMATCH",
            Self::AlreadyFinalized { .. } => "E041_ALREADY_FINALIZED",
            Self::TargetAlreadyProcessed { .. } => "E042_TARGET_PROCESSED",
            Self::InvalidLossProof => "E043_INVALID_PROOF",
            Self::InsufficientConfidence { .. } => "E044_LOW_CONFIDENCE",
            Self::StalePrice { .. } => "E045_STALE_PRICE",
            Self::PriceDeviation { .. } => "E046_PRICE_DEVIATION",
            Self::Unauthorized { .. } => "E047_UNAUTHORIZED",
            Self::InvariantViolated { .. } => "E048_INVARIANT",
            Self::ExceedsExposureLimit { .. } => "E050_EXPOSURE_LIMIT",
            Self::InsufficientPoolFunds { .. } => "E051_POOL_FUNDS",
            Self::InsufficientReserved { .. } => "E052_RESERVED",
            Self::CapitalRatioBreach { .. } => "E053_CAPITAL_RATIO",
            Self::CircuitBreakerTripped => "E054_CIRCUIT_BREAKER",
            Self::CollateralValueTooLow { .. } => "E055_COLLATERAL_VALUE",
            Self::CustodianShortfall { .. } => "E060_CUSTODIAN_SHORTFALL",
            Self::SlippageExceeded { .. } => "E061_SLIPPAGE",
            Self::FlashLoanNotRepaid { .. } => "E062_FLASH_NOT_REPAID",
            Self::FlashDeadlineExceeded { .. } => "E063_FLASH_DEADLINE",
            Self::LiquidationCallFailed { .. } => "E064_LIQUIDATION_FAILED",
            Self::OracleUnavailable => "E065_ORACLE_UNAVAILABLE",
        }
    }

    /// Classify the error into the reaction taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ZeroAmount
            | Self::BelowMinimum { .. }
            | Self::ExceedsMaximum { .. }
            | Self::UnsupportedAsset { .. }
            | Self::InvalidInput { .. }
            | Self::InvalidAddress { .. }
            | Self::WeightSumMismatch { .. }
            | Self::Overflow
            | Self::Underflow
            | Self::DivisionByZero => ErrorKind::Validation,

            Self::CooldownActive { .. }
            | Self::SameBlockWithdrawal { .. }
            | Self::DelayNotElapsed { .. }
            | Self::AlreadyFulfilled { .. }
            | Self::RequestNotFound { .. }
            | Self::AttemptNotFound { .. }
            | Self::InvalidStatus { .. }
            | Self::RevealTooEarly { .. }
            | Self::CommitmentExpired { .. }
            | Self::EpochNotElapsed { .. }
            | Self::CoverageNotFound { .. }
            | Self::InvalidCoverageStatus { .. }
            | Self::ProviderNotFound { .. }
            | Self::ProviderInactive { .. }
            | Self::ShutdownNotInitiated
            | Self::ShutdownAlreadyInitiated
            | Self::ShutdownDelayActive { .. }
            | Self::ReentrantCall => ErrorKind::StatePrecondition,

            Self::CommitmentMismatch { .. }
            | Self::AlreadyFinalized { .. }
            | Self::TargetAlreadyProcessed { .. }
            | Self::InvalidLossProof
            | Self::InsufficientConfidence { .. }
            | Self::StalePrice { .. }
            | Self::PriceDeviation { .. }
            | Self::Unauthorized { .. }
            | Self::InvariantViolated { .. } => ErrorKind::Integrity,

            Self::ExceedsExposureLimit { .. }
            | Self::InsufficientPoolFunds { .. }
            | Self::InsufficientReserved { .. }
            | Self::CapitalRatioBreach { .. }
            | Self::CircuitBreakerTripped
            | Self::CollateralValueTooLow { .. } => ErrorKind::Capacity,

            Self::CustodianShortfall { .. }
            | Self::SlippageExceeded { .. }
            | Self::FlashLoanNotRepaid { .. }
            | Self::FlashDeadlineExceeded { .. }
            | Self::LiquidationCallFailed { .. }
            | Self::OracleUnavailable => ErrorKind::External,
        }
    }

    /// Returns true if the caller can fix the rejection and retry
    pub fn is_recoverable(&self) -> bool {
        match self.kind() {
            ErrorKind::Validation | ErrorKind::StatePrecondition => true,
            ErrorKind::Capacity => matches!(
                self,
                Self::ExceedsExposureLimit { .. } | Self::InsufficientPoolFunds { .. }
            ),
            ErrorKind::Integrity | ErrorKind::External => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BTreeSet;

    #[test]
    fn error_codes_are_unique() {
        let errors = [
            PoolError::ZeroAmount,
            PoolError::BelowMinimum { amount: 1, minimum: 2 },
            PoolError::CooldownActive { remaining_secs: 10 },
            PoolError::CommitmentMismatch { execution_id: [0u8; 32] },
            PoolError::CircuitBreakerTripped,
            PoolError::OracleUnavailable,
            PoolError::InvariantViolated { invariant: "x" },
        ];

        let codes: Vec<_> = errors.iter().map(|e| e.code()).collect();
        let unique: BTreeSet<_> = codes.iter().collect();
        assert_eq!(codes.len(), unique.len(), "Error codes must be unique");
    }

    #[test]
    fn taxonomy_matches_reaction_semantics() {
        assert_eq!(PoolError::ZeroAmount.kind(), ErrorKind::Validation);
        assert_eq!(
            PoolError::DelayNotElapsed { remaining_secs: 5 }.kind(),
            ErrorKind::StatePrecondition
        );
        assert_eq!(
            PoolError::CommitmentMismatch { execution_id: [1u8; 32] }.kind(),
            ErrorKind::Integrity
        );
        assert_eq!(PoolError::CircuitBreakerTripped.kind(), ErrorKind::Capacity);
        assert_eq!(
            PoolError::FlashLoanNotRepaid { owed: 10, repaid: 9 }.kind(),
            ErrorKind::External
        );
    }

    #[test]
    fn integrity_rejections_are_not_recoverable() {
        assert!(!PoolError::InvalidLossProof.is_recoverable());
        assert!(!PoolError::TargetAlreadyProcessed { target: [2u8; 32] }.is_recoverable());
        assert!(PoolError::BelowMinimum { amount: 1, minimum: 2 }.is_recoverable());
        assert!(PoolError::CooldownActive { remaining_secs: 1 }.is_recoverable());
    }
}
