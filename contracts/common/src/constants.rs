//! Protocol Constants
//!
//! All magic numbers and tunable parameters for the Caisson pool.
//! Amounts are fixed-point integers with 6 decimals; ratios are basis
//! points (10_000 bps = 100%). Every module pulls its defaults from
//! here so a deployment can be re-parameterized in one place.

/// Share token metadata
pub mod token {
    /// Token name
    pub const NAME: &str = "Caisson Pool Share";
    /// Token symbol
    pub const SYMBOL: &str = "CPS";
    /// Decimal places for pool amounts
    pub const DECIMALS: u8 = 6;
    /// One unit with decimals (1.0 = 1_000_000 base units)
    pub const ONE: u64 = 1_000_000;
}

/// Basis-point arithmetic
pub mod bps {
    /// Basis points denominator (100%)
    pub const BPS_DENOMINATOR: u64 = 10_000;
}

/// Tranche accounting parameters
pub mod tranche {
    /// NAV at par, in basis points of one share
    pub const PAR_NAV_BPS: u64 = 10_000;

    /// Senior share of profit once Junior is at or above par (80%)
    pub const SENIOR_PROFIT_SHARE_BPS: u64 = 8_000;

    /// NAV below which Senior withdrawals take a haircut and a
    /// post-loss Senior flags reinsurance (80% of par)
    pub const IMPAIRMENT_THRESHOLD_BPS: u64 = 8_000;

    /// Divisor in the Senior haircut: half the impairment ratio
    /// applied to Senior value
    pub const HAIRCUT_DIVISOR: u64 = 20_000;
}

/// Deposit and exposure limits
pub mod limits {
    use super::token::ONE;

    /// Dust floor for deposits
    pub const MIN_DEPOSIT: u64 = 100 * ONE;

    /// Absolute ceiling on the first deposit into an empty pool
    pub const FIRST_DEPOSIT_CEILING: u64 = 1_000_000 * ONE;

    /// Maximum single deposit as a share of the post-deposit pool (20%)
    pub const MAX_EXPOSURE_BPS: u64 = 2_000;

    /// Maximum fraction of a tranche one withdrawal may drain (25%)
    pub const MAX_WITHDRAW_EPOCH_BPS: u64 = 2_500;
}

/// Withdrawal queue timing
pub mod withdrawal {
    use super::time::{SECS_PER_DAY, SECS_PER_HOUR};

    /// Delay between request and fulfillment
    pub const REQUEST_DELAY_SECS: u64 = SECS_PER_DAY;

    /// Cooldown after a deposit before a withdrawal may be requested
    pub const DEPOSIT_COOLDOWN_SECS: u64 = SECS_PER_HOUR;
}

/// Premium pricing parameters
pub mod premium {
    use super::time::{SECS_PER_DAY, SECS_PER_WEEK};

    /// Floor premium rate (0.5%)
    pub const BASE_RATE_BPS: u64 = 50;

    /// Slope from smoothed risk score to rate
    pub const RISK_MULTIPLIER_BPS: u64 = 2_000;

    /// EMA weight on the newest score
    pub const SMOOTHING_ALPHA_BPS: u64 = 3_000;

    /// Minimum rate move required to apply an update
    pub const HYSTERESIS_BAND_BPS: u64 = 25;

    /// Minimum interval between premium updates
    pub const EPOCH_DURATION_SECS: u64 = SECS_PER_DAY;

    /// Hard ceiling on the premium rate, governance included (10%)
    pub const MAX_RATE_BPS: u64 = 1_000;

    /// Recent-loss level that starts shifting weight toward
    /// correlation, liquidity, and volatility (2%)
    pub const LOSS_SHIFT_MINOR_BPS: u64 = 200;

    /// Recent-loss level for the stronger weight shift (5%)
    pub const LOSS_SHIFT_MAJOR_BPS: u64 = 500;

    /// Half-life of the loss-momentum signal
    pub const MOMENTUM_HALF_LIFE_SECS: u64 = SECS_PER_WEEK;
}

/// Capital adequacy parameters
pub mod adequacy {
    use super::time::{SECS_PER_DAY, SECS_PER_HOUR};

    /// Capital ratio below which liquidations are rejected (100%)
    pub const MIN_CAPITAL_RATIO_BPS: u64 = 10_000;

    /// Capital ratio below which the circuit breaker trips (90%)
    pub const PAUSE_THRESHOLD_BPS: u64 = 9_000;

    /// Capital ratio required to reset the breaker (120%)
    pub const TARGET_CAPITAL_RATIO_BPS: u64 = 12_000;

    /// Minimum interval between full adequacy checks
    pub const CHECK_INTERVAL_SECS: u64 = SECS_PER_HOUR;

    /// Tail cushion applied to current capital
    pub const TAIL_CUSHION_BPS: u64 = 500;

    /// Stress buffer multiplier over the largest observed loss (1.5x)
    pub const STRESS_BUFFER_NUM: u64 = 3;
    pub const STRESS_BUFFER_DEN: u64 = 2;

    /// Cap on the annualized liquidation probability (50%)
    pub const MAX_LIQUIDATION_PROBABILITY_BPS: u64 = 5_000;

    /// Window over which liquidation events are counted
    pub const EVENT_WINDOW_SECS: u64 = 30 * SECS_PER_DAY;

    /// Probability contribution per annualized event (1%)
    pub const PROBABILITY_BPS_PER_ANNUAL_EVENT: u64 = 100;
}

/// Commit-reveal purchase parameters
pub mod purchase {
    /// Blocks a commitment stays revealable
    pub const COMMIT_WINDOW_BLOCKS: u64 = 10;

    /// Blocks that must pass between commit and reveal
    pub const MIN_REVEAL_DELAY_BLOCKS: u64 = 1;

    /// Deadline for flash-funded execution (5 minutes)
    pub const FLASH_DEADLINE_SECS: u64 = 300;

    /// Minimum value of collateral acquired per purchase
    pub const MIN_COLLATERAL_VALUE: u64 = 10 * super::token::ONE;
}

/// Reinsurance parameters
pub mod reinsurance {
    use super::time::SECS_PER_DAY;

    /// Validity window for a coverage request
    pub const CLAIM_VALIDITY_SECS: u64 = 7 * SECS_PER_DAY;

    /// Loss fraction the pool always absorbs itself (5%)
    pub const DEDUCTIBLE_BPS: u64 = 500;

    /// Minimum trust score for a provider to receive allocations
    pub const MIN_TRUST_SCORE: u8 = 50;
}

/// Risk model parameters
pub mod risk {
    use super::time::SECS_PER_HOUR;

    /// Maximum observations retained per asset history
    pub const MAX_OBSERVATIONS: usize = 512;

    /// Maximum age of the latest observation before reads fail
    pub const MAX_PRICE_AGE_SECS: u64 = SECS_PER_HOUR;

    /// Minimum oracle confidence accepted on reads
    pub const MIN_CONFIDENCE_BPS: u64 = 8_000;

    /// Maximum single-observation price jump accepted on writes (20%)
    pub const MAX_JUMP_BPS: u64 = 2_000;

    /// Fallback risk value when a metric cannot be computed
    pub const MAX_RISK_BPS: u64 = 10_000;

    /// Monte-Carlo paths for the GBM terminal distribution
    pub const DEFAULT_PATHS: usize = 10_000;

    /// Seed for deterministic simulation
    pub const DEFAULT_SEED: u64 = 42;

    /// Confidence level for VaR / Expected Shortfall (99%)
    pub const CONFIDENCE_BPS: u64 = 9_900;
}

/// Emergency shutdown timing
pub mod shutdown {
    use super::time::SECS_PER_DAY;

    /// Delay between initiation and redeemability
    pub const SHUTDOWN_DELAY_SECS: u64 = 3 * SECS_PER_DAY;
}

/// Time conversion constants
pub mod time {
    pub const SECS_PER_HOUR: u64 = 3_600;
    pub const SECS_PER_DAY: u64 = 86_400;
    pub const SECS_PER_WEEK: u64 = 7 * SECS_PER_DAY;
    pub const SECS_PER_YEAR: u64 = 365 * SECS_PER_DAY;
}
