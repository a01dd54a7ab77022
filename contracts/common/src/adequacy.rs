//! Capital Adequacy Monitor
//!
//! Computes required capital from the expected liquidation loss plus
//! the model tail (max of VaR and Expected Shortfall) plus a stress
//! buffer over the worst observed loss, and compares it to available
//! capital. The ratio drives a two-state circuit breaker: trip below
//! the pause threshold, reset only once the ratio recovers past the
//! target. Full checks are rate-limited; inside the interval the
//! cached report is returned so polling keepers cannot make the
//! breaker oscillate on noisy inputs.

use crate::constants::adequacy::{
    CHECK_INTERVAL_SECS, EVENT_WINDOW_SECS, MAX_LIQUIDATION_PROBABILITY_BPS,
    MIN_CAPITAL_RATIO_BPS, PAUSE_THRESHOLD_BPS, PROBABILITY_BPS_PER_ANNUAL_EVENT,
    STRESS_BUFFER_DEN, STRESS_BUFFER_NUM, TAIL_CUSHION_BPS, TARGET_CAPITAL_RATIO_BPS,
};
use crate::constants::bps::BPS_DENOMINATOR;
use crate::errors::{PoolError, PoolResult};
use crate::math::mul_div;
use crate::Vec;
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

// ============================================================================
// Types
// ============================================================================

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum BreakerState {
    #[default]
    Normal,
    CircuitBreakerActive,
}

/// Monitor configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct AdequacyConfig {
    /// Ratio below which new liquidations are rejected
    pub min_ratio_bps: u64,
    /// Ratio below which the breaker trips
    pub pause_threshold_bps: u64,
    /// Ratio required to reset the breaker
    pub target_ratio_bps: u64,
    /// Minimum interval between full checks
    pub check_interval_secs: u64,
    /// Cushion applied to current capital in the requirement
    pub tail_cushion_bps: u64,
}

impl Default for AdequacyConfig {
    fn default() -> Self {
        Self {
            min_ratio_bps: MIN_CAPITAL_RATIO_BPS,
            pause_threshold_bps: PAUSE_THRESHOLD_BPS,
            target_ratio_bps: TARGET_CAPITAL_RATIO_BPS,
            check_interval_secs: CHECK_INTERVAL_SECS,
            tail_cushion_bps: TAIL_CUSHION_BPS,
        }
    }
}

/// Inputs to the capital requirement, assembled by the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RiskSnapshot {
    /// Aggregate debt exposure the pool could be asked to absorb
    pub debt_exposure: u64,
    /// Average liquidation discount in bps
    pub avg_discount_bps: u64,
    /// Capital currently deployed by the pool
    pub current_capital: u64,
    /// One-year 99% Value-at-Risk from the GBM model
    pub var_99: u64,
    /// One-year 99% Expected Shortfall from the GBM model
    pub es_99: u64,
}

/// Result of an adequacy check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct AdequacyReport {
    pub required_capital: u64,
    pub available_capital: u64,
    /// available / required in bps; `u64::MAX` when nothing is required
    pub ratio_bps: u64,
    pub state: BreakerState,
    /// False when the rate limiter served a cached report
    pub fresh: bool,
    pub checked_at: u64,
}

// ============================================================================
// Monitor
// ============================================================================

/// Two-state capital adequacy machine with rate-limited checks
#[derive(Debug, Clone, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct CapitalAdequacyMonitor {
    config: AdequacyConfig,
    state: BreakerState,
    last_check_at: u64,
    last_report: Option<AdequacyReport>,
    event_timestamps: Vec<u64>,
    max_observed_loss: u64,
}

impl CapitalAdequacyMonitor {
    pub fn new(config: AdequacyConfig) -> Self {
        Self {
            config,
            state: BreakerState::Normal,
            last_check_at: 0,
            last_report: None,
            event_timestamps: Vec::new(),
            max_observed_loss: 0,
        }
    }

    pub fn state(&self) -> BreakerState {
        self.state
    }

    pub fn is_tripped(&self) -> bool {
        self.state == BreakerState::CircuitBreakerActive
    }

    pub fn config(&self) -> &AdequacyConfig {
        &self.config
    }

    /// Record a liquidation event for the frequency estimate
    pub fn record_liquidation_event(&mut self, now: u64) {
        let cutoff = now.saturating_sub(EVENT_WINDOW_SECS);
        self.event_timestamps.retain(|t| *t >= cutoff);
        self.event_timestamps.push(now);
    }

    /// Record a realized loss for the stress buffer
    pub fn record_loss(&mut self, loss: u64) {
        self.max_observed_loss = self.max_observed_loss.max(loss);
    }

    /// Annualized liquidation probability in bps, capped at 50%.
    ///
    /// Poisson-style frequency estimate: events in the trailing
    /// window, annualized, each contributing a fixed probability.
    pub fn liquidation_probability_bps(&self, now: u64) -> u64 {
        let cutoff = now.saturating_sub(EVENT_WINDOW_SECS);
        let events_in_window =
            self.event_timestamps.iter().filter(|t| **t >= cutoff).count() as u64;
        let annualized = events_in_window.saturating_mul(12);
        annualized
            .saturating_mul(PROBABILITY_BPS_PER_ANNUAL_EVENT)
            .min(MAX_LIQUIDATION_PROBABILITY_BPS)
    }

    /// Required capital for a risk snapshot.
    ///
    /// Expected-loss term plus tail cushion plus the model tail plus
    /// a 1.5x buffer over the worst loss ever observed.
    pub fn required_capital(&self, snapshot: &RiskSnapshot, now: u64) -> PoolResult<u64> {
        let prob_bps = self.liquidation_probability_bps(now);
        let recovery_bps = BPS_DENOMINATOR.saturating_sub(snapshot.avg_discount_bps);

        // prob * exposure * (1 - discount) / 10_000^2
        let expected_loss = (prob_bps as u128)
            .checked_mul(snapshot.debt_exposure as u128)
            .ok_or(PoolError::Overflow)?
            .checked_mul(recovery_bps as u128)
            .ok_or(PoolError::Overflow)?
            / (BPS_DENOMINATOR as u128 * BPS_DENOMINATOR as u128);
        let expected_loss = u64::try_from(expected_loss).map_err(|_| PoolError::Overflow)?;

        let cushion = mul_div(snapshot.current_capital, self.config.tail_cushion_bps, BPS_DENOMINATOR)?;
        let model_tail = snapshot.var_99.max(snapshot.es_99);
        let stress_buffer =
            mul_div(self.max_observed_loss, STRESS_BUFFER_NUM, STRESS_BUFFER_DEN)?;

        expected_loss
            .checked_add(cushion)
            .and_then(|sum| sum.checked_add(model_tail))
            .and_then(|sum| sum.checked_add(stress_buffer))
            .ok_or(PoolError::Overflow)
    }

    fn ratio_bps(available: u64, required: u64) -> u64 {
        if required == 0 {
            return u64::MAX;
        }
        ((available as u128 * BPS_DENOMINATOR as u128) / required as u128)
            .min(u64::MAX as u128) as u64
    }

    /// Full adequacy check with breaker transitions.
    ///
    /// Inside the rate-limit interval the cached report is returned
    /// with `fresh = false` and no state transition happens.
    pub fn check_capital_adequacy(
        &mut self,
        available: u64,
        snapshot: &RiskSnapshot,
        now: u64,
    ) -> PoolResult<AdequacyReport> {
        if let Some(cached) = self.last_report {
            if now < self.last_check_at.saturating_add(self.config.check_interval_secs) {
                return Ok(AdequacyReport { fresh: false, ..cached });
            }
        }

        let required = self.required_capital(snapshot, now)?;
        let ratio = Self::ratio_bps(available, required);

        self.state = match self.state {
            BreakerState::Normal if ratio < self.config.pause_threshold_bps => {
                BreakerState::CircuitBreakerActive
            }
            BreakerState::CircuitBreakerActive if ratio >= self.config.target_ratio_bps => {
                BreakerState::Normal
            }
            unchanged => unchanged,
        };

        let report = AdequacyReport {
            required_capital: required,
            available_capital: available,
            ratio_bps: ratio,
            state: self.state,
            fresh: true,
            checked_at: now,
        };
        self.last_check_at = now;
        self.last_report = Some(report);
        Ok(report)
    }

    /// Pure pre-check for a liquidation purchase of `cost`.
    ///
    /// Simulates the post-purchase ratio without touching the breaker
    /// or the rate limiter; rejects when the breaker is tripped or
    /// the simulated ratio falls below the minimum.
    pub fn can_execute_liquidation(
        &self,
        available: u64,
        cost: u64,
        snapshot: &RiskSnapshot,
        now: u64,
    ) -> PoolResult<()> {
        if self.is_tripped() {
            return Err(PoolError::CircuitBreakerTripped);
        }
        let post_available = available
            .checked_sub(cost)
            .ok_or(PoolError::InsufficientPoolFunds { available, requested: cost })?;

        let required = self.required_capital(snapshot, now)?;
        let ratio = Self::ratio_bps(post_available, required);
        if ratio < self.config.min_ratio_bps {
            return Err(PoolError::CapitalRatioBreach {
                ratio_bps: ratio,
                minimum_bps: self.config.min_ratio_bps,
            });
        }
        Ok(())
    }
}

impl Default for CapitalAdequacyMonitor {
    fn default() -> Self {
        Self::new(AdequacyConfig::default())
    }
}

// ============================================================================
// Tests
// ============================================================================
