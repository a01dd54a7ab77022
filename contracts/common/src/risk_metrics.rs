//! Risk Metrics
//!
//! Bounded per-asset price history with staleness, confidence, and
//! deviation gates, plus realized volatility and Pearson correlation
//! over log returns. When a metric cannot be computed the engine
//! substitutes the max-risk value instead of degrading silently, so a
//! broken feed makes premiums expensive rather than coverage cheap.
//!
//! Float math stays inside this module and `gbm`; results surface as
//! basis points and the ledger never sees an `f64`.

use crate::constants::risk::{
    MAX_JUMP_BPS, MAX_OBSERVATIONS, MAX_PRICE_AGE_SECS, MAX_RISK_BPS, MIN_CONFIDENCE_BPS,
};
use crate::constants::bps::BPS_DENOMINATOR;
use crate::constants::time::SECS_PER_YEAR;
use crate::errors::{PoolError, PoolResult};
use crate::types::{AssetId, PriceQuote};
use crate::{BTreeMap, Vec};

// ============================================================================
// Price History
// ============================================================================

/// One accepted oracle observation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceObservation {
    pub timestamp: u64,
    pub price: u64,
    pub confidence_bps: u64,
}

/// Bounded ring of observations for a single asset
#[derive(Debug, Clone, Default)]
pub struct PriceHistory {
    observations: Vec<PriceObservation>,
}

impl PriceHistory {
    pub fn new() -> Self {
        Self { observations: Vec::new() }
    }

    /// Record an observation, enforcing the write gates.
    ///
    /// Rejects zero prices, out-of-range confidence, timestamps that
    /// run backwards, and single-step jumps beyond the deviation
    /// bound. The ring drops the oldest observation once full.
    pub fn record(&mut self, obs: PriceObservation) -> PoolResult<()> {
        if obs.price == 0 {
            return Err(PoolError::ZeroAmount);
        }
        if obs.confidence_bps > BPS_DENOMINATOR {
            return Err(PoolError::InvalidInput {
                param: "confidence_bps",
                reason: "exceeds denominator",
            });
        }

        if let Some(last) = self.observations.last() {
            if obs.timestamp < last.timestamp {
                return Err(PoolError::InvalidInput {
                    param: "timestamp",
                    reason: "observations must be monotonic",
                });
            }
            let jump = obs.price.abs_diff(last.price);
            let max_jump = (last.price as u128 * MAX_JUMP_BPS as u128
                / BPS_DENOMINATOR as u128) as u64;
            if jump > max_jump {
                return Err(PoolError::PriceDeviation {
                    old_price: last.price,
                    new_price: obs.price,
                    max_jump_bps: MAX_JUMP_BPS,
                });
            }
        }

        if self.observations.len() == MAX_OBSERVATIONS {
            self.observations.remove(0);
        }
        self.observations.push(obs);
        Ok(())
    }

    /// Latest observation as a quote, enforcing the read gates.
    pub fn latest(&self, now: u64) -> PoolResult<PriceQuote> {
        let last = self.observations.last().ok_or(PoolError::OracleUnavailable)?;

        let age = now.saturating_sub(last.timestamp);
        if age > MAX_PRICE_AGE_SECS {
            return Err(PoolError::StalePrice { age_secs: age, max_age_secs: MAX_PRICE_AGE_SECS });
        }
        if last.confidence_bps < MIN_CONFIDENCE_BPS {
            return Err(PoolError::InsufficientConfidence {
                confidence_bps: last.confidence_bps,
                minimum_bps: MIN_CONFIDENCE_BPS,
            });
        }

        Ok(PriceQuote {
            price: last.price,
            confidence_bps: last.confidence_bps,
            timestamp: last.timestamp,
        })
    }

    /// All retained observations, oldest first
    pub fn observations(&self) -> &[PriceObservation] {
        &self.observations
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Log returns between consecutive observations
    pub fn log_returns(&self) -> Vec<f64> {
        self.observations
            .windows(2)
            .map(|w| (w[1].price as f64 / w[0].price as f64).ln())
            .collect()
    }

    /// Average spacing between observations in years
    pub fn mean_interval_years(&self) -> Option<f64> {
        if self.observations.len() < 2 {
            return None;
        }
        let first = self.observations.first()?.timestamp;
        let last = self.observations.last()?.timestamp;
        let span = last.saturating_sub(first);
        if span == 0 {
            return None;
        }
        let intervals = (self.observations.len() - 1) as f64;
        Some(span as f64 / intervals / SECS_PER_YEAR as f64)
    }
}

// ============================================================================
// Metrics over Histories
// ============================================================================

/// Per-asset histories and the derived risk metrics
#[derive(Debug, Clone, Default)]
pub struct RiskMetrics {
    histories: BTreeMap<AssetId, PriceHistory>,
}

impl RiskMetrics {
    pub fn new() -> Self {
        Self { histories: BTreeMap::new() }
    }

    /// Record an observation for an asset
    pub fn record_price(&mut self, asset: AssetId, obs: PriceObservation) -> PoolResult<()> {
        self.histories.entry(asset).or_default().record(obs)
    }

    /// Gated latest price for an asset
    pub fn price(&self, asset: &AssetId, now: u64) -> PoolResult<PriceQuote> {
        self.histories
            .get(asset)
            .ok_or(PoolError::OracleUnavailable)?
            .latest(now)
    }

    /// History for an asset, if any observations were accepted
    pub fn history(&self, asset: &AssetId) -> Option<&PriceHistory> {
        self.histories.get(asset)
    }

    /// Annualized realized volatility in bps.
    ///
    /// Falls back to the max-risk value when the history is too thin
    /// to produce a number.
    pub fn realized_volatility_bps(&self, asset: &AssetId) -> u64 {
        let Some(history) = self.histories.get(asset) else {
            return MAX_RISK_BPS;
        };
        let returns = history.log_returns();
        if returns.len() < 2 {
            return MAX_RISK_BPS;
        }
        let Some(dt_years) = history.mean_interval_years() else {
            return MAX_RISK_BPS;
        };

        let mean = returns.iter().sum::<f64>() / returns.len() as f64;
        let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>()
            / (returns.len() - 1) as f64;
        let annualized = variance.sqrt() / dt_years.sqrt();

        if !annualized.is_finite() {
            return MAX_RISK_BPS;
        }
        ((annualized * BPS_DENOMINATOR as f64) as u64).min(MAX_RISK_BPS)
    }

    /// Pearson correlation between two assets' log returns, in bps
    /// (signed, -10_000..=10_000).
    ///
    /// Falls back to full positive correlation — the worst case for a
    /// pool long both assets — when it cannot be computed.
    pub fn correlation_bps(&self, a: &AssetId, b: &AssetId) -> i64 {
        let max_risk = MAX_RISK_BPS as i64;
        let (Some(ha), Some(hb)) = (self.histories.get(a), self.histories.get(b)) else {
            return max_risk;
        };
        let ra = ha.log_returns();
        let rb = hb.log_returns();
        let n = ra.len().min(rb.len());
        if n < 2 {
            return max_risk;
        }
        // Align on the most recent n returns
        let ra = &ra[ra.len() - n..];
        let rb = &rb[rb.len() - n..];

        let mean_a = ra.iter().sum::<f64>() / n as f64;
        let mean_b = rb.iter().sum::<f64>() / n as f64;

        let mut cov = 0.0;
        let mut var_a = 0.0;
        let mut var_b = 0.0;
        for i in 0..n {
            let da = ra[i] - mean_a;
            let db = rb[i] - mean_b;
            cov += da * db;
            var_a += da * da;
            var_b += db * db;
        }
        if var_a == 0.0 || var_b == 0.0 {
            return max_risk;
        }

        let rho = cov / (var_a.sqrt() * var_b.sqrt());
        if !rho.is_finite() {
            return max_risk;
        }
        ((rho * BPS_DENOMINATOR as f64) as i64).clamp(-max_risk, max_risk)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::time::SECS_PER_DAY;

    const ASSET_A: AssetId = [1u8; 32];
    const ASSET_B: AssetId = [2u8; 32];

    fn obs(timestamp: u64, price: u64) -> PriceObservation {
        PriceObservation { timestamp, price, confidence_bps: 9_500 }
    }

    #[test]
    fn record_and_read_latest() {
        let mut history = PriceHistory::new();
        history.record(obs(1_000, 50_000)).unwrap();
        history.record(obs(2_000, 50_500)).unwrap();

        let quote = history.latest(2_100).unwrap();
        assert_eq!(quote.price, 50_500);
    }

    #[test]
    fn stale_reads_are_rejected() {
        let mut history = PriceHistory::new();
        history.record(obs(1_000, 50_000)).unwrap();

        let result = history.latest(1_000 + MAX_PRICE_AGE_SECS + 1);
        assert!(matches!(result, Err(PoolError::StalePrice { .. })));
    }

    #[test]
    fn low_confidence_reads_are_rejected() {
        let mut history = PriceHistory::new();
        history
            .record(PriceObservation { timestamp: 1_000, price: 50_000, confidence_bps: 5_000 })
            .unwrap();

        let result = history.latest(1_100);
        assert!(matches!(result, Err(PoolError::InsufficientConfidence { .. })));
    }

    #[test]
    fn deviation_gate_rejects_jumps() {
        let mut history = PriceHistory::new();
        history.record(obs(1_000, 50_000)).unwrap();

        // 20% bound: 60,001 jumps 20.002%
        let result = history.record(obs(2_000, 60_001));
        assert!(matches!(result, Err(PoolError::PriceDeviation { .. })));
        // At exactly the bound the observation passes
        history.record(obs(2_000, 60_000)).unwrap();
    }

    #[test]
    fn ring_stays_bounded() {
        let mut history = PriceHistory::new();
        for i in 0..(MAX_OBSERVATIONS + 10) {
            history.record(obs(i as u64 * 60, 50_000)).unwrap();
        }
        assert_eq!(history.len(), MAX_OBSERVATIONS);
    }

    #[test]
    fn thin_history_falls_back_to_max_risk() {
        let mut metrics = RiskMetrics::new();
        assert_eq!(metrics.realized_volatility_bps(&ASSET_A), MAX_RISK_BPS);

        metrics.record_price(ASSET_A, obs(0, 50_000)).unwrap();
        metrics.record_price(ASSET_A, obs(SECS_PER_DAY, 50_100)).unwrap();
        // One return is still too thin
        assert_eq!(metrics.realized_volatility_bps(&ASSET_A), MAX_RISK_BPS);
    }

    #[test]
    fn flat_prices_have_near_zero_volatility() {
        let mut metrics = RiskMetrics::new();
        for day in 0..30u64 {
            metrics.record_price(ASSET_A, obs(day * SECS_PER_DAY, 50_000)).unwrap();
        }
        assert_eq!(metrics.realized_volatility_bps(&ASSET_A), 0);
    }

    #[test]
    fn alternating_prices_show_volatility() {
        let mut metrics = RiskMetrics::new();
        for day in 0..30u64 {
            let price = if day % 2 == 0 { 50_000 } else { 52_000 };
            metrics.record_price(ASSET_A, obs(day * SECS_PER_DAY, price)).unwrap();
        }
        let vol = metrics.realized_volatility_bps(&ASSET_A);
        assert!(vol > 1_000, "oscillating series should be volatile, got {vol}");
    }

    #[test]
    fn identical_series_are_fully_correlated() {
        let mut metrics = RiskMetrics::new();
        for day in 0..20u64 {
            let price = 50_000 + (day % 5) * 500;
            metrics.record_price(ASSET_A, obs(day * SECS_PER_DAY, price)).unwrap();
            metrics.record_price(ASSET_B, obs(day * SECS_PER_DAY, price)).unwrap();
        }
        let rho = metrics.correlation_bps(&ASSET_A, &ASSET_B);
        assert!(rho > 9_900, "identical series should correlate, got {rho}");
    }

    #[test]
    fn mirrored_series_are_negatively_correlated() {
        let mut metrics = RiskMetrics::new();
        for day in 0..20u64 {
            let up = 50_000 + (day % 5) * 500;
            let down = 60_000 - (day % 5) * 500;
            metrics.record_price(ASSET_A, obs(day * SECS_PER_DAY, up)).unwrap();
            metrics.record_price(ASSET_B, obs(day * SECS_PER_DAY, down)).unwrap();
        }
        let rho = metrics.correlation_bps(&ASSET_A, &ASSET_B);
        assert!(rho < -9_000, "mirrored series should anti-correlate, got {rho}");
    }

    #[test]
    fn missing_history_correlation_falls_back_to_max() {
        let metrics = RiskMetrics::new();
        assert_eq!(metrics.correlation_bps(&ASSET_A, &ASSET_B), MAX_RISK_BPS as i64);
    }
}
