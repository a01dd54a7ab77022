//! Tranche Waterfall Engine
//!
//! Pure functions over a `TrancheState` snapshot. Losses hit Junior
//! first; profits restore an impaired Junior to par before the 80/20
//! split resumes; Senior withdrawals take a haircut while Junior is
//! impaired so the loss buffer cannot be drained by an early exit.
//! Nothing here touches the ledger — callers apply the returned
//! amounts and re-check invariants.

use crate::constants::bps::BPS_DENOMINATOR;
use crate::constants::tranche::{
    HAIRCUT_DIVISOR, IMPAIRMENT_THRESHOLD_BPS, PAR_NAV_BPS, SENIOR_PROFIT_SHARE_BPS,
};
use crate::errors::PoolResult;
use crate::math::{mul_div, nav_bps, pro_rata};
use crate::types::Tranche;
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

// ============================================================================
// Types
// ============================================================================

/// Snapshot of both tranches, recomputed from the ledger each call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct TrancheState {
    /// Senior tranche value
    pub senior_value: u64,
    /// Junior tranche value
    pub junior_value: u64,
    /// Senior shares outstanding
    pub senior_shares: u64,
    /// Junior shares outstanding
    pub junior_shares: u64,
    /// Pool value; must equal senior_value + junior_value
    pub total_value: u64,
}

impl TrancheState {
    pub fn new(
        senior_value: u64,
        junior_value: u64,
        senior_shares: u64,
        junior_shares: u64,
    ) -> Self {
        Self {
            senior_value,
            junior_value,
            senior_shares,
            junior_shares,
            total_value: senior_value.saturating_add(junior_value),
        }
    }

    /// Junior NAV in bps of par, if Junior has shares
    pub fn junior_nav_bps(&self) -> PoolResult<Option<u64>> {
        if self.junior_shares == 0 {
            return Ok(None);
        }
        nav_bps(self.junior_value, self.junior_shares).map(Some)
    }

    /// Senior NAV in bps of par, if Senior has shares
    pub fn senior_nav_bps(&self) -> PoolResult<Option<u64>> {
        if self.senior_shares == 0 {
            return Ok(None);
        }
        nav_bps(self.senior_value, self.senior_shares).map(Some)
    }
}

/// Output of `distribute_loss`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LossDistribution {
    /// Loss applied to Senior after Junior is exhausted
    pub senior_loss: u64,
    /// Loss absorbed by Junior, up to its full value
    pub junior_loss: u64,
    /// Set when post-loss Senior NAV falls below the impairment
    /// threshold; the pool should open a reinsurance claim
    pub reinsurance_needed: bool,
}

/// Output of `distribute_profit`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfitDistribution {
    pub senior_profit: u64,
    pub junior_profit: u64,
}

/// Output of `calculate_withdrawal`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WithdrawalEntitlement {
    /// Amount the shares entitle the holder to
    pub amount: u64,
    /// Set when a Senior haircut was applied
    pub restricted: bool,
}

// ============================================================================
// Waterfall Functions
// ============================================================================

/// Distribute a realized loss across the tranches.
///
/// Junior absorbs the loss up to its full value; any remainder hits
/// Senior. The reinsurance flag trips when the post-loss Senior NAV
/// drops below the impairment threshold, or when Senior is consumed
/// entirely with no shares left to price.
pub fn distribute_loss(state: &TrancheState, loss: u64) -> PoolResult<LossDistribution> {
    if loss == 0 {
        return Ok(LossDistribution {
            senior_loss: 0,
            junior_loss: 0,
            reinsurance_needed: false,
        });
    }

    let junior_loss = loss.min(state.junior_value);
    let senior_loss = loss - junior_loss;

    let reinsurance_needed = if senior_loss == 0 {
        false
    } else if state.senior_shares == 0 {
        // Junior exhausted and no Senior capital to absorb the rest
        true
    } else {
        let post_senior_value = state.senior_value.saturating_sub(senior_loss);
        let post_nav = nav_bps(post_senior_value, state.senior_shares)?;
        post_nav < IMPAIRMENT_THRESHOLD_BPS
    };

    Ok(LossDistribution {
        senior_loss,
        junior_loss,
        reinsurance_needed,
    })
}

/// Distribute a realized profit across the tranches.
///
/// While Junior NAV is below par the profit restores Junior first;
/// only once restoration actually lands Junior back at par does the
/// excess split 80/20 Senior/Junior. A restoration that somehow falls
/// short routes the whole excess to Junior as well.
pub fn distribute_profit(state: &TrancheState, profit: u64) -> PoolResult<ProfitDistribution> {
    if profit == 0 || (state.senior_shares == 0 && state.junior_shares == 0) {
        return Ok(ProfitDistribution { senior_profit: 0, junior_profit: 0 });
    }
    if state.junior_shares == 0 {
        return Ok(ProfitDistribution { senior_profit: profit, junior_profit: 0 });
    }
    if state.senior_shares == 0 {
        return Ok(ProfitDistribution { senior_profit: 0, junior_profit: profit });
    }

    let junior_nav = nav_bps(state.junior_value, state.junior_shares)?;
    if junior_nav >= PAR_NAV_BPS {
        return Ok(split_healthy(profit)?);
    }

    // Junior impaired: restore before any Senior upside. Deficit is
    // the shares-implied par value minus current value.
    let deficit = mul_div(state.junior_shares, PAR_NAV_BPS, BPS_DENOMINATOR)?
        .saturating_sub(state.junior_value);
    if profit <= deficit {
        return Ok(ProfitDistribution { senior_profit: 0, junior_profit: profit });
    }

    let excess = profit - deficit;
    let restored_value = state.junior_value.saturating_add(deficit);
    let restored_nav = nav_bps(restored_value, state.junior_shares)?;
    if restored_nav >= PAR_NAV_BPS {
        let split = split_healthy(excess)?;
        Ok(ProfitDistribution {
            senior_profit: split.senior_profit,
            junior_profit: deficit + split.junior_profit,
        })
    } else {
        // Restoration fell short of par; Junior keeps the excess too
        Ok(ProfitDistribution { senior_profit: 0, junior_profit: profit })
    }
}

fn split_healthy(profit: u64) -> PoolResult<ProfitDistribution> {
    let senior_profit = mul_div(profit, SENIOR_PROFIT_SHARE_BPS, BPS_DENOMINATOR)?;
    Ok(ProfitDistribution {
        senior_profit,
        junior_profit: profit - senior_profit,
    })
}

/// Entitlement for burning `shares` of a tranche.
///
/// Junior is always pure pro-rata. Senior takes a haircut of half the
/// Junior impairment ratio while Junior NAV sits below the threshold,
/// so Senior cannot exit at par while its loss buffer is damaged.
pub fn calculate_withdrawal(
    state: &TrancheState,
    shares: u64,
    tranche: Tranche,
) -> PoolResult<WithdrawalEntitlement> {
    match tranche {
        Tranche::Junior => {
            if state.junior_shares == 0 {
                return Ok(WithdrawalEntitlement { amount: 0, restricted: false });
            }
            let amount = pro_rata(shares, state.junior_value, state.junior_shares)?;
            Ok(WithdrawalEntitlement { amount, restricted: false })
        }
        Tranche::Senior => {
            if state.senior_shares == 0 {
                return Ok(WithdrawalEntitlement { amount: 0, restricted: false });
            }

            let junior_nav = match state.junior_nav_bps()? {
                Some(nav) => nav,
                // No Junior shares means no impairment ratio to haircut by
                None => PAR_NAV_BPS,
            };

            if junior_nav >= IMPAIRMENT_THRESHOLD_BPS {
                let amount = pro_rata(shares, state.senior_value, state.senior_shares)?;
                return Ok(WithdrawalEntitlement { amount, restricted: false });
            }

            let haircut = mul_div(
                PAR_NAV_BPS.saturating_sub(junior_nav),
                state.senior_value,
                HAIRCUT_DIVISOR,
            )?;
            let effective_value = state.senior_value.saturating_sub(haircut);
            let amount = pro_rata(shares, effective_value, state.senior_shares)?;
            Ok(WithdrawalEntitlement { amount, restricted: true })
        }
    }
}

/// Check the structural invariants of a snapshot.
///
/// The ledger asserts this after every mutation; a false return means
/// the mutation that produced the snapshot is a bug.
pub fn validate_invariants(state: &TrancheState) -> bool {
    let conserves = state
        .senior_value
        .checked_add(state.junior_value)
        .map(|sum| sum == state.total_value)
        .unwrap_or(false);
    let senior_backed = state.senior_value == 0 || state.senior_shares > 0;
    let junior_backed = state.junior_value == 0 || state.junior_shares > 0;
    conserves && senior_backed && junior_backed
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::token::ONE;

    fn healthy_state() -> TrancheState {
        // Both tranches at par: value == shares
        TrancheState::new(450_000 * ONE, 50_000 * ONE, 450_000 * ONE, 50_000 * ONE)
    }

    // ============ distribute_loss ============

    #[test]
    fn loss_within_junior_buffer_spares_senior() {
        let state = healthy_state();
        let dist = distribute_loss(&state, 30_000 * ONE).unwrap();
        assert_eq!(dist.junior_loss, 30_000 * ONE);
        assert_eq!(dist.senior_loss, 0);
        assert!(!dist.reinsurance_needed);
    }

    #[test]
    fn loss_beyond_junior_spills_into_senior() {
        let state = healthy_state();
        let dist = distribute_loss(&state, 80_000 * ONE).unwrap();
        assert_eq!(dist.junior_loss, 50_000 * ONE);
        assert_eq!(dist.senior_loss, 30_000 * ONE);
        // Senior NAV after: 420k/450k ≈ 9333 bps, above the threshold
        assert!(!dist.reinsurance_needed);
    }

    #[test]
    fn deep_loss_flags_reinsurance() {
        let state = healthy_state();
        // Senior keeps 330k of 450k: NAV ≈ 7333 bps < 8000
        let dist = distribute_loss(&state, 170_000 * ONE).unwrap();
        assert_eq!(dist.junior_loss, 50_000 * ONE);
        assert_eq!(dist.senior_loss, 120_000 * ONE);
        assert!(dist.reinsurance_needed);
    }

    #[test]
    fn zero_loss_is_a_no_op() {
        let dist = distribute_loss(&healthy_state(), 0).unwrap();
        assert_eq!(dist.junior_loss, 0);
        assert_eq!(dist.senior_loss, 0);
        assert!(!dist.reinsurance_needed);
    }

    #[test]
    fn junior_only_wipeout_flags_reinsurance() {
        let state = TrancheState::new(0, 20_000 * ONE, 0, 20_000 * ONE);
        let dist = distribute_loss(&state, 30_000 * ONE).unwrap();
        assert_eq!(dist.junior_loss, 20_000 * ONE);
        assert_eq!(dist.senior_loss, 10_000 * ONE);
        assert!(dist.reinsurance_needed);
    }

    // ============ distribute_profit ============

    #[test]
    fn healthy_profit_splits_eighty_twenty() {
        let dist = distribute_profit(&healthy_state(), 100).unwrap();
        assert_eq!(dist.senior_profit, 80);
        assert_eq!(dist.junior_profit, 20);
    }

    #[test]
    fn empty_pool_distributes_nothing() {
        let state = TrancheState::default();
        let dist = distribute_profit(&state, 1_000).unwrap();
        assert_eq!(dist.senior_profit, 0);
        assert_eq!(dist.junior_profit, 0);
    }

    #[test]
    fn senior_only_pool_takes_everything() {
        let state = TrancheState::new(100_000, 0, 100_000, 0);
        let dist = distribute_profit(&state, 1_000).unwrap();
        assert_eq!(dist.senior_profit, 1_000);
        assert_eq!(dist.junior_profit, 0);
    }

    #[test]
    fn junior_only_pool_takes_everything() {
        let state = TrancheState::new(0, 100_000, 0, 100_000);
        let dist = distribute_profit(&state, 1_000).unwrap();
        assert_eq!(dist.senior_profit, 0);
        assert_eq!(dist.junior_profit, 1_000);
    }

    #[test]
    fn impaired_junior_absorbs_small_profit_entirely() {
        // Junior NAV = 5000 bps: value half of shares
        let state = TrancheState::new(400_000, 50_000, 400_000, 100_000);
        let deficit = 50_000; // back to value == shares
        let dist = distribute_profit(&state, deficit - 10_000).unwrap();
        assert_eq!(dist.senior_profit, 0);
        assert_eq!(dist.junior_profit, deficit - 10_000);
    }

    #[test]
    fn profit_beyond_deficit_restores_then_splits() {
        let state = TrancheState::new(400_000, 50_000, 400_000, 100_000);
        // deficit = 50_000; excess = 10_000 split 80/20
        let dist = distribute_profit(&state, 60_000).unwrap();
        assert_eq!(dist.senior_profit, 8_000);
        assert_eq!(dist.junior_profit, 52_000);
        assert_eq!(dist.senior_profit + dist.junior_profit, 60_000);
    }

    #[test]
    fn profit_exactly_at_deficit_restores_junior_to_par() {
        let state = TrancheState::new(400_000, 149_999, 400_000, 300_001);
        let deficit = state.junior_shares - state.junior_value;
        let dist = distribute_profit(&state, deficit).unwrap();
        assert_eq!(dist.senior_profit, 0);
        assert_eq!(dist.junior_profit, deficit);

        let restored = TrancheState::new(
            state.senior_value,
            state.junior_value + dist.junior_profit,
            state.senior_shares,
            state.junior_shares,
        );
        assert_eq!(restored.junior_nav_bps().unwrap(), Some(PAR_NAV_BPS));
    }

    #[test]
    fn one_unit_over_deficit_starts_the_split() {
        let state = TrancheState::new(400_000, 149_999, 400_000, 300_001);
        let deficit = state.junior_shares - state.junior_value;
        let dist = distribute_profit(&state, deficit + 10).unwrap();
        // Excess of 10 splits 80/20 once Junior is back at par
        assert_eq!(dist.senior_profit, 8);
        assert_eq!(dist.junior_profit, deficit + 2);
    }

    // ============ calculate_withdrawal ============

    #[test]
    fn junior_withdrawal_is_pro_rata() {
        let state = TrancheState::new(400_000, 60_000, 400_000, 50_000);
        let ent = calculate_withdrawal(&state, 10_000, Tranche::Junior).unwrap();
        assert_eq!(ent.amount, 12_000); // 10k/50k of 60k
        assert!(!ent.restricted);
    }

    #[test]
    fn senior_withdrawal_unrestricted_when_junior_healthy() {
        let state = healthy_state();
        let ent = calculate_withdrawal(&state, 45_000 * ONE, Tranche::Senior).unwrap();
        assert_eq!(ent.amount, 45_000 * ONE);
        assert!(!ent.restricted);
    }

    #[test]
    fn senior_haircut_at_half_impaired_junior_is_quarter() {
        // Junior NAV 5000 bps -> haircut = 5000/20000 = 25% of Senior value
        let state = TrancheState::new(400_000, 50_000, 400_000, 100_000);
        let ent = calculate_withdrawal(&state, 100_000, Tranche::Senior).unwrap();
        // Pre-haircut entitlement 100_000; effective value 300_000
        assert_eq!(ent.amount, 75_000);
        assert!(ent.restricted);
    }

    #[test]
    fn senior_without_junior_shares_takes_no_haircut() {
        let state = TrancheState::new(400_000, 0, 400_000, 0);
        let ent = calculate_withdrawal(&state, 40_000, Tranche::Senior).unwrap();
        assert_eq!(ent.amount, 40_000);
        assert!(!ent.restricted);
    }

    #[test]
    fn zero_share_tranches_entitle_nothing() {
        let state = TrancheState::default();
        assert_eq!(
            calculate_withdrawal(&state, 10, Tranche::Senior).unwrap().amount,
            0
        );
        assert_eq!(
            calculate_withdrawal(&state, 10, Tranche::Junior).unwrap().amount,
            0
        );
    }

    // ============ invariants ============

    #[test]
    fn invariants_hold_for_well_formed_state() {
        assert!(validate_invariants(&healthy_state()));
        assert!(validate_invariants(&TrancheState::default()));
    }

    #[test]
    fn invariants_catch_conservation_break() {
        let mut state = healthy_state();
        state.total_value += 1;
        assert!(!validate_invariants(&state));
    }

    #[test]
    fn invariants_catch_unbacked_value() {
        let state = TrancheState {
            senior_value: 100,
            junior_value: 0,
            senior_shares: 0,
            junior_shares: 0,
            total_value: 100,
        };
        assert!(!validate_invariants(&state));
    }

    #[test]
    fn loss_then_profit_conserves_value() {
        let state = healthy_state();
        let loss = distribute_loss(&state, 70_000 * ONE).unwrap();
        let after_loss = TrancheState::new(
            state.senior_value - loss.senior_loss,
            state.junior_value - loss.junior_loss,
            state.senior_shares,
            state.junior_shares,
        );
        assert!(validate_invariants(&after_loss));

        let profit = distribute_profit(&after_loss, 70_000 * ONE).unwrap();
        assert_eq!(profit.senior_profit + profit.junior_profit, 70_000 * ONE);
        let after_profit = TrancheState::new(
            after_loss.senior_value + profit.senior_profit,
            after_loss.junior_value + profit.junior_profit,
            after_loss.senior_shares,
            after_loss.junior_shares,
        );
        assert!(validate_invariants(&after_profit));
    }
}
