//! GBM Risk Model
//!
//! Calibrates geometric Brownian motion from a price history and
//! Monte-Carlo-simulates the terminal price distribution to derive
//! Value-at-Risk and Expected Shortfall over a horizon. Simulation is
//! deterministic under a seeded LCG so adequacy checks reproduce
//! exactly across runs.

use crate::constants::bps::BPS_DENOMINATOR;
use crate::constants::risk::{CONFIDENCE_BPS, DEFAULT_PATHS, DEFAULT_SEED};
use crate::errors::{PoolError, PoolResult};
use crate::risk_metrics::PriceHistory;
use crate::Vec;

// ============================================================================
// Deterministic Randomness
// ============================================================================

/// Linear congruential generator for reproducible simulation
#[derive(Debug, Clone)]
pub struct Lcg {
    state: u64,
}

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Next raw state
    pub fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_mul(6364136223846793005).wrapping_add(1);
        self.state
    }

    /// Uniform in (0, 1)
    pub fn next_unit(&mut self) -> f64 {
        // Top 53 bits give a full-precision mantissa; offset by half
        // a step to keep the draw strictly positive for ln()
        let bits = self.next_u64() >> 11;
        (bits as f64 + 0.5) / (1u64 << 53) as f64
    }

    /// Standard normal draw via Box-Muller
    pub fn next_standard_normal(&mut self) -> f64 {
        let u1 = self.next_unit();
        let u2 = self.next_unit();
        (-2.0 * u1.ln()).sqrt() * (core::f64::consts::TAU * u2).cos()
    }
}

// ============================================================================
// Calibration
// ============================================================================

/// Annualized GBM parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GbmParams {
    /// Annualized drift of the log-price
    pub drift: f64,
    /// Annualized volatility
    pub volatility: f64,
}

/// Calibrate drift and volatility from a price history.
///
/// Uses the sample mean and standard deviation of log returns scaled
/// by the mean observation interval. Needs at least three returns.
pub fn calibrate(history: &PriceHistory) -> PoolResult<GbmParams> {
    let returns = history.log_returns();
    if returns.len() < 3 {
        return Err(PoolError::InvalidInput {
            param: "history",
            reason: "need at least 4 observations to calibrate",
        });
    }
    let dt_years = history.mean_interval_years().ok_or(PoolError::InvalidInput {
        param: "history",
        reason: "observations span zero time",
    })?;

    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>()
        / (returns.len() - 1) as f64;

    let volatility = variance.sqrt() / dt_years.sqrt();
    // Log-drift plus the Itô correction gives the arithmetic drift
    let drift = mean / dt_years + 0.5 * volatility * volatility;

    if !drift.is_finite() || !volatility.is_finite() {
        return Err(PoolError::InvalidInput { param: "history", reason: "degenerate returns" });
    }

    Ok(GbmParams { drift, volatility })
}

// ============================================================================
// Simulation
// ============================================================================

/// Terminal prices of `paths` GBM trajectories after `horizon_years`.
///
/// One step to the horizon: S_T = S_0 exp((mu - sigma^2/2) T +
/// sigma sqrt(T) Z). Same seed, same distribution.
pub fn simulate_terminal_prices(
    spot: f64,
    params: &GbmParams,
    horizon_years: f64,
    paths: usize,
    seed: u64,
) -> Vec<f64> {
    let mut rng = Lcg::new(seed);
    let log_drift = (params.drift - 0.5 * params.volatility * params.volatility) * horizon_years;
    let diffusion = params.volatility * horizon_years.sqrt();

    (0..paths)
        .map(|_| {
            let z = rng.next_standard_normal();
            spot * (log_drift + diffusion * z).exp()
        })
        .collect()
}

// ============================================================================
// Tail Risk
// ============================================================================

/// Quantile and tail-average loss estimates on a notional exposure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TailRisk {
    /// Loss at the confidence quantile
    pub value_at_risk: u64,
    /// Mean loss beyond the quantile
    pub expected_shortfall: u64,
}

impl TailRisk {
    /// The larger of the two estimates, used by capital requirements
    pub fn worst(&self) -> u64 {
        self.value_at_risk.max(self.expected_shortfall)
    }
}

/// Derive VaR and Expected Shortfall from simulated terminal prices.
///
/// Loss per path is the relative drawdown below spot applied to the
/// exposure; gains count as zero loss. `confidence_bps` picks the
/// quantile (9_900 = 99%).
pub fn tail_risk(
    exposure: u64,
    spot: f64,
    terminal_prices: &[f64],
    confidence_bps: u64,
) -> PoolResult<TailRisk> {
    if terminal_prices.is_empty() || spot <= 0.0 {
        return Err(PoolError::InvalidInput {
            param: "terminal_prices",
            reason: "empty distribution",
        });
    }
    if confidence_bps >= BPS_DENOMINATOR {
        return Err(PoolError::InvalidInput {
            param: "confidence_bps",
            reason: "must be below the denominator",
        });
    }

    let mut losses: Vec<f64> = terminal_prices
        .iter()
        .map(|s| ((spot - s) / spot).max(0.0))
        .collect();
    losses.sort_by(|a, b| a.total_cmp(b));

    let n = losses.len();
    let index = ((confidence_bps as u128 * n as u128) / BPS_DENOMINATOR as u128) as usize;
    let index = index.min(n - 1);

    let var_frac = losses[index];
    let tail = &losses[index..];
    let es_frac = tail.iter().sum::<f64>() / tail.len() as f64;

    Ok(TailRisk {
        value_at_risk: (exposure as f64 * var_frac) as u64,
        expected_shortfall: (exposure as f64 * es_frac) as u64,
    })
}

/// One-call helper: calibrate, simulate one year ahead, and measure
/// the tail on the given exposure with the default path count.
pub fn annual_tail_risk(history: &PriceHistory, exposure: u64) -> PoolResult<TailRisk> {
    let params = calibrate(history)?;
    let spot = history
        .observations()
        .last()
        .map(|o| o.price as f64)
        .ok_or(PoolError::OracleUnavailable)?;
    let terminal = simulate_terminal_prices(spot, &params, 1.0, DEFAULT_PATHS, DEFAULT_SEED);
    tail_risk(exposure, spot, &terminal, CONFIDENCE_BPS)
}

// ============================================================================
// Tests
// ============================================================================
