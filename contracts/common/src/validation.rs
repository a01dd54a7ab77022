//! Validation Helpers for the Caisson Pool
//!
//! Centralized guard functions shared by the engine modules and the
//! pool orchestrator, plus the `check!` macro for inline conditions.

use crate::errors::{PoolError, PoolResult};
use crate::types::Address;

/// Check a condition and return an error if it fails.
///
/// ```rust,ignore
/// check!(amount > 0, PoolError::ZeroAmount);
/// ```
#[macro_export]
macro_rules! check {
    ($condition:expr, $error:expr) => {
        if !($condition) {
            return Err($error);
        }
    };
}

/// Amount must be non-zero
pub fn require_positive(amount: u64) -> PoolResult<()> {
    if amount == 0 {
        return Err(PoolError::ZeroAmount);
    }
    Ok(())
}

/// Amount must meet a minimum
pub fn require_at_least(amount: u64, minimum: u64) -> PoolResult<()> {
    if amount < minimum {
        return Err(PoolError::BelowMinimum { amount, minimum });
    }
    Ok(())
}

/// Amount must not exceed a maximum
pub fn require_at_most(amount: u64, maximum: u64) -> PoolResult<()> {
    if amount > maximum {
        return Err(PoolError::ExceedsMaximum { amount, maximum });
    }
    Ok(())
}

/// Balance must cover the request
pub fn require_sufficient_balance(available: u64, requested: u64) -> PoolResult<()> {
    if requested > available {
        return Err(PoolError::InsufficientPoolFunds { available, requested });
    }
    Ok(())
}

/// Address must not be the zero address
pub fn require_valid_address(address: &Address) -> PoolResult<()> {
    if address.iter().all(|b| *b == 0) {
        return Err(PoolError::InvalidAddress { reason: "zero address" });
    }
    Ok(())
}

/// A timestamp-gated window must have elapsed
pub fn require_elapsed(since: u64, now: u64, window_secs: u64) -> PoolResult<()> {
    let deadline = since.saturating_add(window_secs);
    if now < deadline {
        return Err(PoolError::DelayNotElapsed { remaining_secs: deadline - now });
    }
    Ok(())
}
