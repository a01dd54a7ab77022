//! Pool Events
//!
//! Structured events emitted by every state-changing operation; the
//! log can be indexed off-process for monitoring and analytics, and
//! tests assert against it.

use crate::types::{Address, AssetId, ExecutionId, TargetId, Tranche};
use crate::Vec;
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

/// Event types for indexing and filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
#[borsh(use_discriminant = true)]
#[repr(u8)]
pub enum EventType {
    // Tranche / ledger events (0x01 - 0x1F)
    Deposited = 0x01,
    LossDistributed = 0x02,
    ProfitDistributed = 0x03,
    FundsReserved = 0x04,
    FundsReleased = 0x05,

    // Withdrawal events (0x20 - 0x3F)
    WithdrawRequested = 0x20,
    WithdrawFulfilled = 0x21,
    WithdrawBatchFulfilled = 0x22,

    // Purchase events (0x40 - 0x5F)
    PurchaseAttempted = 0x40,
    PurchaseFinalized = 0x41,
    PurchaseCancelled = 0x42,
    PurchaseFailed = 0x43,
    CollateralLocked = 0x44,
    CollateralReleased = 0x45,

    // Adequacy events (0x60 - 0x7F)
    CircuitBreakerTripped = 0x60,
    CircuitBreakerReset = 0x61,

    // Premium events (0x80 - 0x9F)
    PremiumUpdated = 0x80,
    PremiumOverridden = 0x81,

    // Reinsurance events (0xA0 - 0xBF)
    ProviderRegistered = 0xA0,
    CoverageRequested = 0xA1,
    CoverageApproved = 0xA2,
    CoveragePaidOut = 0xA3,
    CoverageExpired = 0xA4,
    CapitalInjected = 0xA5,

    // Protocol events (0xC0 - 0xDF)
    ShutdownInitiated = 0xC0,
    EmergencyWithdrawal = 0xC1,
}

/// Main event enum containing all pool events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum PoolEvent {
    /// Emitted when a depositor mints tranche shares
    Deposited {
        user: Address,
        asset: AssetId,
        tranche: Tranche,
        gross_amount: u64,
        fee: u64,
        shares_minted: u64,
        timestamp: u64,
    },

    /// Emitted when a realized loss flows through the waterfall
    LossDistributed {
        loss: u64,
        senior_loss: u64,
        junior_loss: u64,
        reinsurance_needed: bool,
        timestamp: u64,
    },

    /// Emitted when a realized profit flows through the waterfall
    ProfitDistributed {
        profit: u64,
        senior_profit: u64,
        junior_profit: u64,
        timestamp: u64,
    },

    /// Emitted when pool funds are reserved for a purchase
    FundsReserved {
        asset: AssetId,
        amount: u64,
        total_reserved: u64,
        timestamp: u64,
    },

    /// Emitted when a reservation is released unused
    FundsReleased {
        asset: AssetId,
        amount: u64,
        total_reserved: u64,
        timestamp: u64,
    },

    /// Emitted when a withdrawal enters the queue
    WithdrawRequested {
        queue_id: u64,
        user: Address,
        tranche: Tranche,
        shares: u64,
        timestamp: u64,
    },

    /// Emitted when a single withdrawal settles
    WithdrawFulfilled {
        queue_id: u64,
        user: Address,
        tranche: Tranche,
        shares_burned: u64,
        amount_paid: u64,
        restricted: bool,
        timestamp: u64,
    },

    /// Emitted once per pro-rata batch fulfillment pass
    WithdrawBatchFulfilled {
        requests_touched: u64,
        requests_settled: u64,
        total_paid: u64,
        ratio_bps: u64,
        timestamp: u64,
    },

    /// Emitted when a commit-reveal attempt is recorded
    PurchaseAttempted {
        execution_id: ExecutionId,
        target: TargetId,
        keeper: Address,
        reserved: u64,
        commit_block: u64,
        timestamp: u64,
    },

    /// Emitted when a purchase completes
    PurchaseFinalized {
        execution_id: ExecutionId,
        collateral_received: u64,
        debt_paid: u64,
        cost: u64,
        timestamp: u64,
    },

    /// Emitted when a keeper cancels a pending attempt
    PurchaseCancelled {
        execution_id: ExecutionId,
        keeper: Address,
        released: u64,
        timestamp: u64,
    },

    /// Emitted when execution aborts and the reservation is released
    PurchaseFailed {
        execution_id: ExecutionId,
        released: u64,
        timestamp: u64,
    },

    /// Emitted when acquired collateral is locked in holding
    CollateralLocked {
        lock_id: u64,
        asset: AssetId,
        amount: u64,
        entry_price: u64,
        timestamp: u64,
    },

    /// Emitted when a holding lock is sold or released
    CollateralReleased {
        lock_id: u64,
        proceeds: u64,
        realized_pnl: i64,
        timestamp: u64,
    },

    /// Emitted when the capital ratio trips the breaker
    CircuitBreakerTripped {
        ratio_bps: u64,
        threshold_bps: u64,
        timestamp: u64,
    },

    /// Emitted when the ratio recovers past the target
    CircuitBreakerReset {
        ratio_bps: u64,
        target_bps: u64,
        timestamp: u64,
    },

    /// Emitted when an epoch update moves the premium rate
    PremiumUpdated {
        old_rate_bps: u64,
        new_rate_bps: u64,
        smoothed_score_bps: u64,
        timestamp: u64,
    },

    /// Emitted when governance overrides the rate
    PremiumOverridden {
        by: Address,
        old_rate_bps: u64,
        new_rate_bps: u64,
        timestamp: u64,
    },

    /// Emitted when a reinsurance provider registers
    ProviderRegistered {
        provider: Address,
        allocated_capital: u64,
        coverage_limit: u64,
        timestamp: u64,
    },

    /// Emitted when a loss generates a coverage request
    CoverageRequested {
        request_id: u64,
        loss_amount: u64,
        deductible: u64,
        requested_coverage: u64,
        timestamp: u64,
    },

    /// Emitted when a coverage request is approved
    CoverageApproved {
        request_id: u64,
        approved_coverage: u64,
        provider_count: u64,
        timestamp: u64,
    },

    /// Emitted when an approved claim pays out
    CoveragePaidOut {
        request_id: u64,
        gross_coverage: u64,
        premiums_netted: u64,
        timestamp: u64,
    },

    /// Emitted when a stale request expires lazily
    CoverageExpired {
        request_id: u64,
        timestamp: u64,
    },

    /// Emitted when reinsurance capital lands in the ledger
    CapitalInjected {
        request_id: u64,
        senior_credit: u64,
        junior_credit: u64,
        timestamp: u64,
    },

    /// Emitted when the admin starts the shutdown delay
    ShutdownInitiated {
        by: Address,
        redeemable_at: u64,
        timestamp: u64,
    },

    /// Emitted per holder redemption after shutdown
    EmergencyWithdrawal {
        user: Address,
        senior_paid: u64,
        junior_paid: u64,
        timestamp: u64,
    },
}

impl PoolEvent {
    /// Get the event type for filtering
    pub fn event_type(&self) -> EventType {
        match self {
            Self::Deposited { .. } => EventType::Deposited,
            Self::LossDistributed { .. } => EventType::LossDistributed,
            Self::ProfitDistributed { .. } => EventType::ProfitDistributed,
            Self::FundsReserved { .. } => EventType::FundsReserved,
            Self::FundsReleased { .. } => EventType::FundsReleased,
            Self::WithdrawRequested { .. } => EventType::WithdrawRequested,
            Self::WithdrawFulfilled { .. } => EventType::WithdrawFulfilled,
            Self::WithdrawBatchFulfilled { .. } => EventType::WithdrawBatchFulfilled,
            Self::PurchaseAttempted { .. } => EventType::PurchaseAttempted,
            Self::PurchaseFinalized { .. } => EventType::PurchaseFinalized,
            Self::PurchaseCancelled { .. } => EventType::PurchaseCancelled,
            Self::PurchaseFailed { .. } => EventType::PurchaseFailed,
            Self::CollateralLocked { .. } => EventType::CollateralLocked,
            Self::CollateralReleased { .. } => EventType::CollateralReleased,
            Self::CircuitBreakerTripped { .. } => EventType::CircuitBreakerTripped,
            Self::CircuitBreakerReset { .. } => EventType::CircuitBreakerReset,
            Self::PremiumUpdated { .. } => EventType::PremiumUpdated,
            Self::PremiumOverridden { .. } => EventType::PremiumOverridden,
            Self::ProviderRegistered { .. } => EventType::ProviderRegistered,
            Self::CoverageRequested { .. } => EventType::CoverageRequested,
            Self::CoverageApproved { .. } => EventType::CoverageApproved,
            Self::CoveragePaidOut { .. } => EventType::CoveragePaidOut,
            Self::CoverageExpired { .. } => EventType::CoverageExpired,
            Self::CapitalInjected { .. } => EventType::CapitalInjected,
            Self::ShutdownInitiated { .. } => EventType::ShutdownInitiated,
            Self::EmergencyWithdrawal { .. } => EventType::EmergencyWithdrawal,
        }
    }
}

/// Event log for collecting events during execution
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<PoolEvent>,
}

impl EventLog {
    /// Create a new empty event log
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Emit an event (add to log)
    pub fn emit(&mut self, event: PoolEvent) {
        self.events.push(event);
    }

    /// Get all events
    pub fn events(&self) -> &[PoolEvent] {
        &self.events
    }

    /// Take ownership of all events
    pub fn into_events(self) -> Vec<PoolEvent> {
        self.events
    }

    /// Filter events by type
    pub fn filter_by_type(&self, event_type: EventType) -> Vec<&PoolEvent> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    /// Number of events in the log
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the log is empty
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Whether any events were emitted
    pub fn has_events(&self) -> bool {
        !self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_and_filter() {
        let mut log = EventLog::new();
        log.emit(PoolEvent::Deposited {
            user: [1u8; 32],
            asset: [2u8; 32],
            tranche: Tranche::Senior,
            gross_amount: 1_000,
            fee: 5,
            shares_minted: 995,
            timestamp: 100,
        });
        log.emit(PoolEvent::CircuitBreakerTripped {
            ratio_bps: 8_500,
            threshold_bps: 9_000,
            timestamp: 101,
        });

        assert_eq!(log.len(), 2);
        assert_eq!(log.filter_by_type(EventType::Deposited).len(), 1);
        assert_eq!(log.filter_by_type(EventType::CircuitBreakerReset).len(), 0);
    }

    #[test]
    fn borsh_round_trip() {
        let event = PoolEvent::ProfitDistributed {
            profit: 100,
            senior_profit: 80,
            junior_profit: 20,
            timestamp: 42,
        };
        let bytes = borsh::to_vec(&event).unwrap();
        let decoded: PoolEvent = borsh::from_slice(&bytes).unwrap();
        assert_eq!(decoded, event);
    }
}
