//! Premium Pricing Engine
//!
//! Maps a weighted risk score to the deposit premium rate. The score
//! blends volatility, utilization, liquidation frequency, liquidity
//! depth, correlation, and loss momentum; weights always sum to the
//! bps denominator and shift toward clustered/illiquid risk after
//! recent losses. The score is EMA-smoothed and the rate only moves
//! when it clears a hysteresis band, so noisy inputs cannot make the
//! premium thrash. Updates are epoch-gated; governance can override
//! the rate directly but never above the hard ceiling.

use crate::constants::bps::BPS_DENOMINATOR;
use crate::constants::premium::{
    BASE_RATE_BPS, EPOCH_DURATION_SECS, HYSTERESIS_BAND_BPS, LOSS_SHIFT_MAJOR_BPS,
    LOSS_SHIFT_MINOR_BPS, MAX_RATE_BPS, MOMENTUM_HALF_LIFE_SECS, RISK_MULTIPLIER_BPS,
    SMOOTHING_ALPHA_BPS,
};
use crate::errors::{PoolError, PoolResult};
use crate::math::{apply_bps, mul_div};
use crate::Vec;
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

// ============================================================================
// Weights
// ============================================================================

/// Risk-factor weights in bps; must sum to the denominator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct RiskWeights {
    pub volatility: u64,
    pub utilization: u64,
    pub liquidation_frequency: u64,
    pub liquidity_depth: u64,
    pub correlation: u64,
    pub loss_momentum: u64,
}

impl RiskWeights {
    /// Steady-state weighting
    pub fn baseline() -> Self {
        Self {
            volatility: 2_500,
            utilization: 2_000,
            liquidation_frequency: 1_500,
            liquidity_depth: 1_500,
            correlation: 1_500,
            loss_momentum: 1_000,
        }
    }

    /// Weighting after recent losses above the minor threshold
    pub fn stressed_minor() -> Self {
        Self {
            volatility: 2_800,
            utilization: 1_600,
            liquidation_frequency: 1_200,
            liquidity_depth: 1_800,
            correlation: 1_800,
            loss_momentum: 800,
        }
    }

    /// Weighting after recent losses above the major threshold
    pub fn stressed_major() -> Self {
        Self {
            volatility: 3_000,
            utilization: 1_200,
            liquidation_frequency: 1_000,
            liquidity_depth: 2_000,
            correlation: 2_200,
            loss_momentum: 600,
        }
    }

    /// Pick the table for a recent-loss level
    pub fn for_recent_loss(recent_loss_bps: u64) -> Self {
        if recent_loss_bps > LOSS_SHIFT_MAJOR_BPS {
            Self::stressed_major()
        } else if recent_loss_bps > LOSS_SHIFT_MINOR_BPS {
            Self::stressed_minor()
        } else {
            Self::baseline()
        }
    }

    pub fn sum(&self) -> u64 {
        self.volatility
            + self.utilization
            + self.liquidation_frequency
            + self.liquidity_depth
            + self.correlation
            + self.loss_momentum
    }

    /// Reject tables that do not sum to the denominator
    pub fn validate(&self) -> PoolResult<()> {
        let sum = self.sum();
        if sum != BPS_DENOMINATOR {
            return Err(PoolError::WeightSumMismatch { sum });
        }
        Ok(())
    }
}

// ============================================================================
// Inputs & Results
// ============================================================================

/// Risk-factor readings, each 0..=10_000 (clamped when scored)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RiskInputs {
    pub volatility_bps: u64,
    pub utilization_bps: u64,
    pub liquidation_frequency_bps: u64,
    pub liquidity_depth_bps: u64,
    pub correlation_bps: u64,
    pub loss_momentum_bps: u64,
}

/// Outcome of an epoch update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PremiumUpdate {
    pub old_rate_bps: u64,
    pub new_rate_bps: u64,
    pub smoothed_score_bps: u64,
    /// False when the epoch gate or the hysteresis band held the rate
    pub applied: bool,
}

/// Engine configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct PremiumConfig {
    pub base_rate_bps: u64,
    pub risk_multiplier_bps: u64,
    pub smoothing_alpha_bps: u64,
    pub hysteresis_band_bps: u64,
    pub epoch_duration_secs: u64,
    pub max_rate_bps: u64,
}

impl Default for PremiumConfig {
    fn default() -> Self {
        Self {
            base_rate_bps: BASE_RATE_BPS,
            risk_multiplier_bps: RISK_MULTIPLIER_BPS,
            smoothing_alpha_bps: SMOOTHING_ALPHA_BPS,
            hysteresis_band_bps: HYSTERESIS_BAND_BPS,
            epoch_duration_secs: EPOCH_DURATION_SECS,
            max_rate_bps: MAX_RATE_BPS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
struct LossEvent {
    loss_bps: u64,
    timestamp: u64,
}

// ============================================================================
// Engine
// ============================================================================

/// Smoothed, hysteresis-gated premium rate
#[derive(Debug, Clone, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct PremiumEngine {
    config: PremiumConfig,
    current_rate_bps: u64,
    smoothed_score_bps: u64,
    last_update_at: u64,
    losses: Vec<LossEvent>,
}

impl PremiumEngine {
    pub fn new(config: PremiumConfig) -> Self {
        Self {
            current_rate_bps: config.base_rate_bps,
            smoothed_score_bps: 0,
            last_update_at: 0,
            losses: Vec::new(),
            config,
        }
    }

    /// Currently applied premium rate
    pub fn current_rate_bps(&self) -> u64 {
        self.current_rate_bps
    }

    pub fn config(&self) -> &PremiumConfig {
        &self.config
    }

    /// Record a realized loss as a fraction of pool value.
    ///
    /// Feeds both the weight-shift rule and the loss-momentum factor.
    pub fn record_loss(&mut self, loss: u64, pool_value: u64, now: u64) -> PoolResult<()> {
        if loss == 0 || pool_value == 0 {
            return Ok(());
        }
        let loss_bps = mul_div(loss, BPS_DENOMINATOR, pool_value)?.min(BPS_DENOMINATOR);
        self.losses.push(LossEvent { loss_bps, timestamp: now });
        Ok(())
    }

    /// Undecayed loss fraction over the last momentum half-life
    pub fn recent_loss_bps(&self, now: u64) -> u64 {
        let cutoff = now.saturating_sub(MOMENTUM_HALF_LIFE_SECS);
        self.losses
            .iter()
            .filter(|l| l.timestamp >= cutoff)
            .fold(0u64, |acc, l| acc.saturating_add(l.loss_bps))
            .min(BPS_DENOMINATOR)
    }

    /// Time-decayed loss signal: each event halves per half-life
    pub fn loss_momentum_bps(&self, now: u64) -> u64 {
        self.losses
            .iter()
            .fold(0u64, |acc, l| {
                let age = now.saturating_sub(l.timestamp);
                let halvings = age / MOMENTUM_HALF_LIFE_SECS;
                if halvings >= 64 {
                    return acc;
                }
                acc.saturating_add(l.loss_bps >> halvings)
            })
            .min(BPS_DENOMINATOR)
    }

    /// Drop loss events too old to contribute anything
    pub fn prune_losses(&mut self, now: u64) {
        self.losses.retain(|l| {
            let halvings = now.saturating_sub(l.timestamp) / MOMENTUM_HALF_LIFE_SECS;
            halvings < 64 && (l.loss_bps >> halvings.min(63)) > 0
        });
    }

    /// Active weight table given recent losses
    pub fn weights(&self, now: u64) -> RiskWeights {
        RiskWeights::for_recent_loss(self.recent_loss_bps(now))
    }

    /// Weighted raw score for a set of inputs
    pub fn risk_score(&self, inputs: &RiskInputs, weights: &RiskWeights) -> PoolResult<u64> {
        weights.validate()?;
        let clamp = |v: u64| v.min(BPS_DENOMINATOR);
        let weighted = clamp(inputs.volatility_bps) as u128 * weights.volatility as u128
            + clamp(inputs.utilization_bps) as u128 * weights.utilization as u128
            + clamp(inputs.liquidation_frequency_bps) as u128
                * weights.liquidation_frequency as u128
            + clamp(inputs.liquidity_depth_bps) as u128 * weights.liquidity_depth as u128
            + clamp(inputs.correlation_bps) as u128 * weights.correlation as u128
            + clamp(inputs.loss_momentum_bps) as u128 * weights.loss_momentum as u128;
        Ok((weighted / BPS_DENOMINATOR as u128) as u64)
    }

    /// Epoch update: score, smooth, map to a rate, apply past the
    /// hysteresis band. Inside the epoch this is a no-op.
    pub fn update(&mut self, inputs: &RiskInputs, now: u64) -> PoolResult<PremiumUpdate> {
        let old_rate = self.current_rate_bps;

        if now < self.last_update_at.saturating_add(self.config.epoch_duration_secs) {
            return Ok(PremiumUpdate {
                old_rate_bps: old_rate,
                new_rate_bps: old_rate,
                smoothed_score_bps: self.smoothed_score_bps,
                applied: false,
            });
        }

        let weights = self.weights(now);
        let raw = self.risk_score(inputs, &weights)?;

        let alpha = self.config.smoothing_alpha_bps;
        let smoothed = (raw as u128 * alpha as u128
            + self.smoothed_score_bps as u128 * (BPS_DENOMINATOR - alpha) as u128)
            / BPS_DENOMINATOR as u128;
        self.smoothed_score_bps = smoothed as u64;
        self.last_update_at = now;

        let candidate = self
            .config
            .base_rate_bps
            .saturating_add(apply_bps(self.config.risk_multiplier_bps, self.smoothed_score_bps)?)
            .min(self.config.max_rate_bps);

        let applied = candidate.abs_diff(old_rate) > self.config.hysteresis_band_bps;
        if applied {
            self.current_rate_bps = candidate;
        }

        Ok(PremiumUpdate {
            old_rate_bps: old_rate,
            new_rate_bps: self.current_rate_bps,
            smoothed_score_bps: self.smoothed_score_bps,
            applied,
        })
    }

    /// Governance override: bypasses the epoch gate, smoothing, and
    /// hysteresis, but never the hard ceiling.
    pub fn governance_override(&mut self, rate_bps: u64) -> u64 {
        self.current_rate_bps = rate_bps.min(self.config.max_rate_bps);
        self.current_rate_bps
    }
}

impl Default for PremiumEngine {
    fn default() -> Self {
        Self::new(PremiumConfig::default())
    }
}

// ============================================================================
// Tests
// ============================================================================
