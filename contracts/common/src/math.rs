//! Mathematical Utilities for the Caisson Pool
//!
//! Checked fixed-point arithmetic. Intermediate products widen to
//! u128; accounting never touches floats.

use crate::constants::bps::BPS_DENOMINATOR;
use crate::errors::{PoolError, PoolResult};

/// Safe addition with overflow check
pub fn safe_add(a: u64, b: u64) -> PoolResult<u64> {
    a.checked_add(b).ok_or(PoolError::Overflow)
}

/// Safe subtraction with underflow check
pub fn safe_sub(a: u64, b: u64) -> PoolResult<u64> {
    a.checked_sub(b).ok_or(PoolError::Underflow)
}

/// a * b / denom through u128
pub fn mul_div(a: u64, b: u64, denom: u64) -> PoolResult<u64> {
    if denom == 0 {
        return Err(PoolError::DivisionByZero);
    }
    let wide = (a as u128)
        .checked_mul(b as u128)
        .ok_or(PoolError::Overflow)?
        / denom as u128;
    if wide > u64::MAX as u128 {
        return Err(PoolError::Overflow);
    }
    Ok(wide as u64)
}

/// Apply a basis-point fraction to an amount
pub fn apply_bps(amount: u64, rate_bps: u64) -> PoolResult<u64> {
    mul_div(amount, rate_bps, BPS_DENOMINATOR)
}

/// Net asset value per share in basis points of par
///
/// Callers must special-case `shares == 0` before asking for a NAV;
/// a tranche without shares has no per-share value.
pub fn nav_bps(value: u64, shares: u64) -> PoolResult<u64> {
    mul_div(value, BPS_DENOMINATOR, shares)
}

/// Pro-rata entitlement: shares * pool_value / total_shares
pub fn pro_rata(shares: u64, pool_value: u64, total_shares: u64) -> PoolResult<u64> {
    mul_div(shares, pool_value, total_shares)
}
