//! Integration Tests
//!
//! Cross-module scenarios exercising the waterfall, premium engine,
//! adequacy monitor, purchase book, and reinsurance registry
//! together, including the two reference end-to-end scenarios.

#[cfg(test)]
mod tests {
    use crate::adequacy::{BreakerState, CapitalAdequacyMonitor, RiskSnapshot};
    use crate::constants::bps::BPS_DENOMINATOR;
    use crate::constants::reinsurance::DEDUCTIBLE_BPS;
    use crate::constants::time::SECS_PER_DAY;
    use crate::constants::token::ONE;
    use crate::errors::PoolError;
    use crate::gbm::annual_tail_risk;
    use crate::math::{apply_bps, mul_div};
    use crate::premium::{PremiumEngine, RiskInputs};
    use crate::purchase::{compute_commitment, PurchaseBook};
    use crate::reinsurance::{LossProof, ReinsuranceRegistry};
    use crate::risk_metrics::{PriceObservation, RiskMetrics};
    use crate::types::{
        AssetId, LiquidationProtocol, PurchaseStatus, ReinsuranceProvider, RevealData, Tranche,
    };
    use crate::waterfall::{
        calculate_withdrawal, distribute_loss, distribute_profit, validate_invariants,
        TrancheState,
    };

    const STABLE: AssetId = [1u8; 32];
    const COLLATERAL: AssetId = [2u8; 32];
    const KEEPER: [u8; 32] = [9u8; 32];

    // ========================================================================
    // Scenario: 90/10 tranche split, 50k profit, Junior out-earns Senior
    // ========================================================================

    #[test]
    fn tranche_roi_scenario_junior_outearns_senior() {
        let premium_rate_bps = 200; // 2% deposit premium

        // Senior deposits 450k, Junior 50k; fee deducted before minting
        let senior_net = 450_000 * ONE - apply_bps(450_000 * ONE, premium_rate_bps).unwrap();
        let junior_net = 50_000 * ONE - apply_bps(50_000 * ONE, premium_rate_bps).unwrap();
        assert_eq!(senior_net, 441_000 * ONE);
        assert_eq!(junior_net, 49_000 * ONE);

        // First deposits mint 1:1, so both tranches sit at par
        let state = TrancheState::new(senior_net, junior_net, senior_net, junior_net);
        assert!(validate_invariants(&state));

        let profit = 50_000 * ONE;
        let dist = distribute_profit(&state, profit).unwrap();
        assert_eq!(dist.senior_profit, 40_000 * ONE);
        assert_eq!(dist.junior_profit, 10_000 * ONE);

        let senior_roi_bps = mul_div(dist.senior_profit, BPS_DENOMINATOR, senior_net).unwrap();
        let junior_roi_bps = mul_div(dist.junior_profit, BPS_DENOMINATOR, junior_net).unwrap();
        assert_eq!(senior_roi_bps, 907);
        assert_eq!(junior_roi_bps, 2_040);
        assert!(junior_roi_bps > senior_roi_bps);
    }

    // ========================================================================
    // Scenario: 150k loss on a 220k pool, deductible, reinsurance claim
    // ========================================================================

    #[test]
    fn loss_scenario_deductible_and_covered_loss() {
        let pool_value = 220_000 * ONE;
        let state = TrancheState::new(200_000 * ONE, 20_000 * ONE, 200_000 * ONE, 20_000 * ONE);
        let loss = 150_000 * ONE;

        // Junior's entire 20k buffer is consumed before Senior
        let dist = distribute_loss(&state, loss).unwrap();
        assert_eq!(dist.junior_loss, 20_000 * ONE);
        assert_eq!(dist.senior_loss, 130_000 * ONE);
        // Post-loss Senior NAV is 35%: reinsurance is needed
        assert!(dist.reinsurance_needed);

        // The pool self-absorbs a 5% deductible; only the excess is
        // requested from reinsurance
        let deductible = apply_bps(pool_value, DEDUCTIBLE_BPS).unwrap();
        assert_eq!(deductible, 11_000 * ONE);
        let covered_loss = loss - deductible;
        assert_eq!(covered_loss, 139_000 * ONE);

        let mut registry = ReinsuranceRegistry::new();
        registry
            .register_provider(ReinsuranceProvider {
                provider: [11u8; 32],
                allocated_capital: 500_000 * ONE,
                coverage_limit: 150_000 * ONE,
                premium_rate_bps: 150,
                trust_score: 90,
                active: true,
            })
            .unwrap();

        let proof = LossProof::new(loss, [42u8; 32]);
        let id = registry.request_coverage(loss, covered_loss, &proof, 1_000).unwrap();
        let approved = registry.approve(id, 2_000).unwrap();
        assert_eq!(approved, covered_loss);

        // Payout nets the provider premium in the same plan
        let plan = registry.execute_payout(id, 3_000).unwrap();
        assert_eq!(plan.gross_coverage, covered_loss);
        assert_eq!(plan.premiums, apply_bps(covered_loss, 150).unwrap());
        assert_eq!(plan.net_injection, plan.gross_coverage - plan.premiums);
    }

    // ========================================================================
    // Scenario: impaired Junior gates Senior exits until restored
    // ========================================================================

    #[test]
    fn senior_exits_are_haircut_until_junior_recovers() {
        // After a 10k loss Junior NAV is at 50%
        let state = TrancheState::new(200_000 * ONE, 10_000 * ONE, 200_000 * ONE, 20_000 * ONE);

        let ent = calculate_withdrawal(&state, 20_000 * ONE, Tranche::Senior).unwrap();
        assert!(ent.restricted);
        // 25% haircut on the pro-rata 20k
        assert_eq!(ent.amount, 15_000 * ONE);

        // Profit restores Junior to par; the haircut disappears
        let deficit = state.junior_shares - state.junior_value;
        let dist = distribute_profit(&state, deficit).unwrap();
        assert_eq!(dist.junior_profit, deficit);
        let restored = TrancheState::new(
            state.senior_value,
            state.junior_value + dist.junior_profit,
            state.senior_shares,
            state.junior_shares,
        );
        let ent = calculate_withdrawal(&restored, 20_000 * ONE, Tranche::Senior).unwrap();
        assert!(!ent.restricted);
        assert_eq!(ent.amount, 20_000 * ONE);
    }

    // ========================================================================
    // Scenario: adequacy breaker blocks the purchase pipeline
    // ========================================================================

    #[test]
    fn tripped_breaker_blocks_new_purchases() {
        let mut monitor = CapitalAdequacyMonitor::default();
        let now = 100 * SECS_PER_DAY;

        // A heavy loss inflates the stress buffer beyond the pool
        monitor.record_loss(900_000 * ONE);
        monitor.record_liquidation_event(now);
        let snapshot = RiskSnapshot {
            debt_exposure: 2_000_000 * ONE,
            avg_discount_bps: 800,
            current_capital: 500_000 * ONE,
            var_99: 90_000 * ONE,
            es_99: 110_000 * ONE,
        };

        let report = monitor
            .check_capital_adequacy(500_000 * ONE, &snapshot, now)
            .unwrap();
        assert_eq!(report.state, BreakerState::CircuitBreakerActive);

        let result =
            monitor.can_execute_liquidation(500_000 * ONE, 10_000 * ONE, &snapshot, now);
        assert_eq!(result, Err(PoolError::CircuitBreakerTripped));
    }

    #[test]
    fn purchase_lifecycle_behind_a_healthy_monitor() {
        let monitor = CapitalAdequacyMonitor::default();
        let now = 100 * SECS_PER_DAY;
        let snapshot = RiskSnapshot {
            debt_exposure: 100_000 * ONE,
            avg_discount_bps: 800,
            current_capital: 500_000 * ONE,
            var_99: 10_000 * ONE,
            es_99: 12_000 * ONE,
        };

        let cost = 40_000 * ONE;
        monitor
            .can_execute_liquidation(500_000 * ONE, cost, &snapshot, now)
            .unwrap();

        let reveal = RevealData {
            protocol: LiquidationProtocol::Liquity,
            target: [77u8; 32],
            borrower: [78u8; 32],
            collateral_asset: COLLATERAL,
            debt_asset: STABLE,
            debt_to_cover: cost,
            min_collateral_out: 42_000 * ONE,
        };
        let salt = [0x5A; 32];
        let commitment = compute_commitment(&reveal, &salt).unwrap();

        let mut book = PurchaseBook::new();
        let id = book
            .attempt_purchase(KEEPER, reveal.target, STABLE, commitment, cost, 500, now)
            .unwrap();

        let attempt = book.begin_execution(&id, &reveal, &salt, 501).unwrap();
        assert_eq!(attempt.status, PurchaseStatus::Executing);
        book.complete(&id).unwrap();

        // The target can never be attempted again, even completed
        let second = book.attempt_purchase(
            KEEPER,
            reveal.target,
            STABLE,
            commitment,
            cost,
            502,
            now + 60,
        );
        assert!(matches!(second, Err(PoolError::TargetAlreadyProcessed { .. })));
    }

    // ========================================================================
    // Scenario: market data drives the premium through the metrics stack
    // ========================================================================

    #[test]
    fn volatile_market_raises_the_premium() {
        let mut metrics = RiskMetrics::new();
        for day in 0..30u64 {
            // Choppy series, ~6% swings every other day
            let price = if day % 2 == 0 { 50_000 } else { 53_000 };
            metrics
                .record_price(
                    STABLE,
                    PriceObservation {
                        timestamp: day * SECS_PER_DAY,
                        price,
                        confidence_bps: 9_700,
                    },
                )
                .unwrap();
        }

        let vol_bps = metrics.realized_volatility_bps(&STABLE);
        assert!(vol_bps > 5_000);

        let mut engine = PremiumEngine::default();
        let base = engine.current_rate_bps();
        let inputs = RiskInputs {
            volatility_bps: vol_bps,
            utilization_bps: 4_000,
            liquidation_frequency_bps: 1_200,
            liquidity_depth_bps: 2_000,
            correlation_bps: metrics.correlation_bps(&STABLE, &STABLE).max(0) as u64,
            loss_momentum_bps: engine.loss_momentum_bps(30 * SECS_PER_DAY),
        };

        let update = engine.update(&inputs, 30 * SECS_PER_DAY).unwrap();
        assert!(update.applied);
        assert!(update.new_rate_bps > base);

        // The GBM tail on the same history is material but bounded
        let history = metrics.history(&STABLE).unwrap();
        let tail = annual_tail_risk(history, 1_000_000 * ONE).unwrap();
        assert!(tail.worst() > 0);
        assert!(tail.worst() <= 1_000_000 * ONE);
    }
}
