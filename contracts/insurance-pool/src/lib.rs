//! Caisson Insurance Pool
//!
//! The orchestrator composing the engine library with the ledger and
//! the external collaborators. Depositors fund Senior and Junior
//! tranches; pooled capital earns custodian yield and is deployed
//! through commit-reveal liquidation purchases; realized results flow
//! back through the waterfall with Junior first-loss, restoration
//! before profit split, and Senior haircuts while Junior is impaired.
//!
//! ## Ordering discipline
//!
//! Every operation that reaches a collaborator runs behind a single
//! reentrancy flag, and authoritative state (purchase status, the
//! reservation counters, share balances) moves *before* the external
//! call. A collaborator failure aborts the whole call; a purchase
//! that fails mid-execution flips to `Failed` and releases its
//! reservation, nothing else.

pub mod collaborators;
pub mod holding;
pub mod ledger;

pub use collaborators::{
    Collaborators, Custodian, DexVenue, FlashCapital, FlashLoanRequest, KeeperRegistry,
    LiquidationCall, LiquidationOutcome, LiquidationVenue, PriceFeed, SwapParams,
};
pub use holding::{HoldingBook, RealizedSale};
pub use ledger::{AssetBalance, DepositMeta, Ledger};

use caisson_common::access::{AccessTable, Role};
use caisson_common::adequacy::{AdequacyReport, BreakerState, CapitalAdequacyMonitor, RiskSnapshot};
use caisson_common::constants::bps::BPS_DENOMINATOR;
use caisson_common::constants::limits::{
    FIRST_DEPOSIT_CEILING, MAX_EXPOSURE_BPS, MAX_WITHDRAW_EPOCH_BPS, MIN_DEPOSIT,
};
use caisson_common::constants::purchase::{FLASH_DEADLINE_SECS, MIN_COLLATERAL_VALUE};
use caisson_common::constants::reinsurance::DEDUCTIBLE_BPS;
use caisson_common::constants::risk::MIN_CONFIDENCE_BPS;
use caisson_common::constants::shutdown::SHUTDOWN_DELAY_SECS;
use caisson_common::constants::token;
use caisson_common::constants::withdrawal::{DEPOSIT_COOLDOWN_SECS, REQUEST_DELAY_SECS};
use caisson_common::errors::{PoolError, PoolResult};
use caisson_common::events::{EventLog, PoolEvent};
use caisson_common::gbm::{annual_tail_risk, TailRisk};
use caisson_common::math::{apply_bps, mul_div, pro_rata, safe_add, safe_sub};
use caisson_common::premium::{PremiumEngine, PremiumUpdate, RiskInputs};
use caisson_common::purchase::PurchaseBook;
use caisson_common::reinsurance::{LossProof, ReinsuranceRegistry};
use caisson_common::risk_metrics::{PriceObservation, RiskMetrics};
use caisson_common::types::{
    Address, AssetId, ExecutionId, ReinsuranceProvider, RevealData, TargetId, Tranche,
};
use caisson_common::validation::{require_at_least, require_at_most, require_positive};
use caisson_common::waterfall::{
    calculate_withdrawal, distribute_loss, distribute_profit, TrancheState,
    WithdrawalEntitlement,
};

// ============================================================================
// Context & Config
// ============================================================================

/// Who is calling and when
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallContext {
    pub caller: Address,
    pub block: u64,
    pub timestamp: u64,
}

impl CallContext {
    pub fn new(caller: Address, block: u64, timestamp: u64) -> Self {
        Self { caller, block, timestamp }
    }
}

/// Pool configuration; defaults come from the shared constants
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Stablecoins the pool accepts
    pub supported_assets: Vec<AssetId>,
    /// Collateral asset the tail-risk model runs on
    pub risk_asset: AssetId,
    /// Second series for the correlation factor
    pub reference_asset: AssetId,
    pub min_deposit: u64,
    pub first_deposit_ceiling: u64,
    pub max_exposure_bps: u64,
    pub max_withdraw_epoch_bps: u64,
    pub deposit_cooldown_secs: u64,
    pub withdraw_delay_secs: u64,
    pub shutdown_delay_secs: u64,
    pub deductible_bps: u64,
    pub min_collateral_value: u64,
    /// Average liquidation discount for the expected-loss term
    pub avg_discount_bps: u64,
    pub flash_deadline_secs: u64,
    /// Venue fee tier used for liquidity probing and sales
    pub dex_fee_bps: u64,
    /// Probe size for the liquidity-depth factor
    pub liquidity_probe_amount: u64,
}

impl PoolConfig {
    pub fn standard(
        supported_assets: Vec<AssetId>,
        risk_asset: AssetId,
        reference_asset: AssetId,
    ) -> Self {
        Self {
            supported_assets,
            risk_asset,
            reference_asset,
            min_deposit: MIN_DEPOSIT,
            first_deposit_ceiling: FIRST_DEPOSIT_CEILING,
            max_exposure_bps: MAX_EXPOSURE_BPS,
            max_withdraw_epoch_bps: MAX_WITHDRAW_EPOCH_BPS,
            deposit_cooldown_secs: DEPOSIT_COOLDOWN_SECS,
            withdraw_delay_secs: REQUEST_DELAY_SECS,
            shutdown_delay_secs: SHUTDOWN_DELAY_SECS,
            deductible_bps: DEDUCTIBLE_BPS,
            min_collateral_value: MIN_COLLATERAL_VALUE,
            avg_discount_bps: 800,
            flash_deadline_secs: FLASH_DEADLINE_SECS,
            dex_fee_bps: 30,
            liquidity_probe_amount: 1_000 * token::ONE,
        }
    }
}

/// Retained income and realized results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub premium_income: u64,
    pub realized_profit: u64,
    pub realized_loss: u64,
    pub reinsurance_received: u64,
    pub purchases_completed: u64,
    pub purchases_failed: u64,
}

// ============================================================================
// Operation Results
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepositReceipt {
    pub shares_minted: u64,
    pub fee: u64,
    pub net_amount: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WithdrawalPayout {
    pub queue_id: u64,
    pub shares_burned: u64,
    pub amount_paid: u64,
    /// A Senior haircut was in effect
    pub restricted: bool,
    /// False when the epoch cap left part of the request queued
    pub fully_settled: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchFulfillment {
    pub requests_touched: u64,
    pub requests_settled: u64,
    pub total_paid: u64,
    pub ratio_bps: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PurchaseOutcome {
    pub execution_id: ExecutionId,
    pub collateral_received: u64,
    pub debt_paid: u64,
    /// Debt paid plus flash premium, consumed from the reservation
    pub cost: u64,
    pub collateral_value: u64,
    pub lock_id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LossReport {
    pub senior_loss: u64,
    pub junior_loss: u64,
    pub deductible: u64,
    pub covered_loss: u64,
    pub reinsurance_needed: bool,
    pub request_id: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmergencyPayout {
    pub senior_paid: u64,
    pub junior_paid: u64,
}

// ============================================================================
// The Pool
// ============================================================================

/// Tranche-based liquidation-insurance pool
pub struct InsurancePool {
    config: PoolConfig,
    access: AccessTable,
    ledger: Ledger,
    book: PurchaseBook,
    reinsurance: ReinsuranceRegistry,
    premium: PremiumEngine,
    adequacy: CapitalAdequacyMonitor,
    holding: HoldingBook,
    metrics: RiskMetrics,
    events: EventLog,
    stats: PoolStats,
    collaborators: Collaborators,
    entered: bool,
    shutdown_initiated_at: Option<u64>,
}

impl InsurancePool {
    pub fn new(config: PoolConfig, access: AccessTable, collaborators: Collaborators) -> Self {
        Self {
            config,
            access,
            ledger: Ledger::new(),
            book: PurchaseBook::new(),
            reinsurance: ReinsuranceRegistry::new(),
            premium: PremiumEngine::default(),
            adequacy: CapitalAdequacyMonitor::default(),
            holding: HoldingBook::new(),
            metrics: RiskMetrics::new(),
            events: EventLog::new(),
            stats: PoolStats::default(),
            collaborators,
            entered: false,
            shutdown_initiated_at: None,
        }
    }

    // ============ Guards ============

    fn enter(&mut self) -> PoolResult<()> {
        if self.entered {
            return Err(PoolError::ReentrantCall);
        }
        self.entered = true;
        Ok(())
    }

    fn exit(&mut self) {
        self.entered = false;
    }

    fn require_supported(&self, asset: &AssetId) -> PoolResult<()> {
        if !self.config.supported_assets.contains(asset) {
            return Err(PoolError::UnsupportedAsset { asset: *asset });
        }
        Ok(())
    }

    fn require_not_shutdown(&self) -> PoolResult<()> {
        if self.shutdown_initiated_at.is_some() {
            return Err(PoolError::ShutdownAlreadyInitiated);
        }
        Ok(())
    }

    fn require_keeper(&self, caller: &Address) -> PoolResult<()> {
        if !self.collaborators.keepers.is_authorized(caller) {
            return Err(PoolError::Unauthorized { caller: *caller, required: "KEEPER" });
        }
        Ok(())
    }

    // ============ Views ============

    pub fn tranche_state(&self) -> TrancheState {
        self.ledger.tranche_state()
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn holding(&self) -> &HoldingBook {
        &self.holding
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.stats
    }

    pub fn current_premium_bps(&self) -> u64 {
        self.premium.current_rate_bps()
    }

    pub fn breaker_state(&self) -> BreakerState {
        self.adequacy.state()
    }

    pub fn purchase_book(&self) -> &PurchaseBook {
        &self.book
    }

    pub fn reinsurance(&self) -> &ReinsuranceRegistry {
        &self.reinsurance
    }

    /// Entitlement for burning `shares` right now, haircuts included
    pub fn preview_withdraw(&self, shares: u64, tranche: Tranche) -> PoolResult<WithdrawalEntitlement> {
        calculate_withdrawal(&self.ledger.tranche_state(), shares, tranche)
    }

    // ============ Deposits ============

    /// Deposit into a tranche. The premium fee is deducted before
    /// minting and retained by the pool; net funds go to the
    /// custodian.
    pub fn deposit(
        &mut self,
        ctx: &CallContext,
        asset: AssetId,
        amount: u64,
        tranche: Tranche,
    ) -> PoolResult<DepositReceipt> {
        self.enter()?;
        let result = self.deposit_inner(ctx, asset, amount, tranche);
        self.exit();
        result
    }

    fn deposit_inner(
        &mut self,
        ctx: &CallContext,
        asset: AssetId,
        amount: u64,
        tranche: Tranche,
    ) -> PoolResult<DepositReceipt> {
        self.require_not_shutdown()?;
        self.require_supported(&asset)?;
        require_at_least(amount, self.config.min_deposit)?;

        let state = self.ledger.tranche_state();
        if state.total_value == 0 {
            require_at_most(amount, self.config.first_deposit_ceiling)?;
        } else {
            // Single-actor cap relative to the post-deposit pool
            let post_total = safe_add(state.total_value, amount)?;
            let limit = apply_bps(post_total, self.config.max_exposure_bps)?;
            if amount > limit {
                return Err(PoolError::ExceedsExposureLimit { amount, limit });
            }
        }

        let fee = apply_bps(amount, self.premium.current_rate_bps())?;
        let net = safe_sub(amount, fee)?;

        let total_shares = self.ledger.total_shares(tranche);
        let tranche_value = self.ledger.tranche_value(tranche);
        let shares = if total_shares == 0 || tranche_value == 0 {
            net
        } else {
            mul_div(net, total_shares, tranche_value)?
        };
        require_positive(shares)?;

        let credited = self.collaborators.custodian.deposit(asset, net)?;
        if credited < net {
            return Err(PoolError::CustodianShortfall { requested: net, received: credited });
        }

        self.ledger.credit_pool(asset, amount)?;
        self.ledger.mint_shares(
            ctx.caller,
            tranche,
            shares,
            net,
            DepositMeta { block: ctx.block, timestamp: ctx.timestamp },
        )?;
        self.stats.premium_income = self.stats.premium_income.saturating_add(fee);

        self.events.emit(PoolEvent::Deposited {
            user: ctx.caller,
            asset,
            tranche,
            gross_amount: amount,
            fee,
            shares_minted: shares,
            timestamp: ctx.timestamp,
        });
        self.ledger.check_invariants()?;

        Ok(DepositReceipt { shares_minted: shares, fee, net_amount: net })
    }

    // ============ Withdrawals ============

    /// Queue shares for withdrawal. Rejects same-block requests and
    /// requests inside the deposit cooldown; a share already queued
    /// cannot be queued again.
    pub fn request_withdraw(
        &mut self,
        ctx: &CallContext,
        asset: AssetId,
        shares: u64,
        tranche: Tranche,
    ) -> PoolResult<u64> {
        self.require_supported(&asset)?;
        require_positive(shares)?;

        let held = self.ledger.shares_of(&ctx.caller, tranche);
        let pending = self.ledger.pending_of(&ctx.caller, tranche);
        let available = held.saturating_sub(pending);
        if shares > available {
            return Err(PoolError::InsufficientPoolFunds { available, requested: shares });
        }

        let meta = self
            .ledger
            .deposit_meta(&ctx.caller, tranche)
            .ok_or(PoolError::InvalidInput { param: "tranche", reason: "no deposit on record" })?;
        if meta.block == ctx.block {
            return Err(PoolError::SameBlockWithdrawal { block: ctx.block });
        }
        let cooldown_end = meta.timestamp.saturating_add(self.config.deposit_cooldown_secs);
        if ctx.timestamp < cooldown_end {
            return Err(PoolError::CooldownActive {
                remaining_secs: cooldown_end - ctx.timestamp,
            });
        }

        let queue_id = self
            .ledger
            .push_request(ctx.caller, shares, tranche, asset, ctx.timestamp)?;
        self.events.emit(PoolEvent::WithdrawRequested {
            queue_id,
            user: ctx.caller,
            tranche,
            shares,
            timestamp: ctx.timestamp,
        });
        self.ledger.check_invariants()?;
        Ok(queue_id)
    }

    /// Settle one queued withdrawal after the fulfillment delay.
    ///
    /// The payout is the waterfall entitlement, clamped to the
    /// per-epoch cap; a clamped request stays queued with its
    /// remaining shares. Fulfilled requests reject a second call.
    pub fn fulfill_withdraw(&mut self, ctx: &CallContext, queue_id: u64) -> PoolResult<WithdrawalPayout> {
        self.enter()?;
        let result = self.fulfill_withdraw_inner(ctx, queue_id);
        self.exit();
        result
    }

    fn fulfill_withdraw_inner(
        &mut self,
        ctx: &CallContext,
        queue_id: u64,
    ) -> PoolResult<WithdrawalPayout> {
        let request = self
            .ledger
            .request(queue_id)
            .cloned()
            .ok_or(PoolError::RequestNotFound { queue_id })?;
        if request.fulfilled {
            return Err(PoolError::AlreadyFulfilled { queue_id });
        }
        let ready_at = request.requested_at.saturating_add(self.config.withdraw_delay_secs);
        if ctx.timestamp < ready_at {
            return Err(PoolError::DelayNotElapsed { remaining_secs: ready_at - ctx.timestamp });
        }

        let state = self.ledger.tranche_state();
        let entitlement = calculate_withdrawal(&state, request.shares, request.tranche)?;

        let epoch_cap = apply_bps(
            self.ledger.tranche_value(request.tranche),
            self.config.max_withdraw_epoch_bps,
        )?;
        let (amount, shares_burned, fully_settled) =
            if entitlement.amount > epoch_cap && entitlement.amount > 0 {
                let burn = mul_div(request.shares, epoch_cap, entitlement.amount)?;
                (epoch_cap, burn, false)
            } else {
                (entitlement.amount, request.shares, true)
            };

        let balance = self.ledger.balance(&request.asset);
        if amount > balance.unreserved() {
            return Err(PoolError::InsufficientPoolFunds {
                available: balance.unreserved(),
                requested: amount,
            });
        }

        if amount > 0 {
            let received = self.collaborators.custodian.withdraw(request.asset, amount)?;
            if received < amount {
                return Err(PoolError::CustodianShortfall { requested: amount, received });
            }
        }

        self.ledger
            .burn_shares(&request.user, request.tranche, shares_burned, amount)?;
        self.ledger.sub_pending(&request.user, request.tranche, shares_burned)?;
        if amount > 0 {
            self.ledger.debit_pool(request.asset, amount)?;
        }
        if let Some(stored) = self.ledger.request_mut(queue_id) {
            if fully_settled {
                stored.fulfilled = true;
            } else {
                stored.shares -= shares_burned;
            }
        }

        self.events.emit(PoolEvent::WithdrawFulfilled {
            queue_id,
            user: request.user,
            tranche: request.tranche,
            shares_burned,
            amount_paid: amount,
            restricted: entitlement.restricted,
            timestamp: ctx.timestamp,
        });
        self.ledger.check_invariants()?;

        Ok(WithdrawalPayout {
            queue_id,
            shares_burned,
            amount_paid: amount,
            restricted: entitlement.restricted,
            fully_settled,
        })
    }

    /// Pro-rata batch fulfillment across the FIFO queue.
    ///
    /// Splits `max_amount` over all eligible entitlements, reducing
    /// requests in place on partial fills and compacting fully
    /// settled entries with swap-remove. This is the relief valve
    /// when aggregate demand exceeds one epoch's liquidity.
    pub fn batch_fulfill_withdrawals(
        &mut self,
        ctx: &CallContext,
        asset: AssetId,
        max_amount: u64,
    ) -> PoolResult<BatchFulfillment> {
        self.enter()?;
        let result = self.batch_fulfill_inner(ctx, asset, max_amount);
        self.exit();
        result
    }

    fn batch_fulfill_inner(
        &mut self,
        ctx: &CallContext,
        asset: AssetId,
        max_amount: u64,
    ) -> PoolResult<BatchFulfillment> {
        self.require_supported(&asset)?;
        require_positive(max_amount)?;

        let state = self.ledger.tranche_state();
        // (queue_id, entitlement) per eligible request, FIFO
        let mut eligible: Vec<(u64, u64)> = Vec::new();
        let mut total_entitlement: u64 = 0;
        for request in self.ledger.queue() {
            if request.fulfilled || request.asset != asset {
                continue;
            }
            let ready_at = request.requested_at.saturating_add(self.config.withdraw_delay_secs);
            if ctx.timestamp < ready_at {
                continue;
            }
            let entitlement = calculate_withdrawal(&state, request.shares, request.tranche)?;
            if entitlement.amount == 0 {
                continue;
            }
            eligible.push((request.queue_id, entitlement.amount));
            total_entitlement = safe_add(total_entitlement, entitlement.amount)?;
        }
        if total_entitlement == 0 {
            return Ok(BatchFulfillment::default());
        }

        let payable = max_amount
            .min(total_entitlement)
            .min(self.ledger.balance(&asset).unreserved());
        let ratio_bps = mul_div(payable, BPS_DENOMINATOR, total_entitlement)?;

        let mut total_paid: u64 = 0;
        let mut plan: Vec<(u64, u64)> = Vec::new(); // (queue_id, pay)
        for (queue_id, entitlement) in &eligible {
            let pay = mul_div(*entitlement, payable, total_entitlement)?;
            if pay == 0 {
                continue;
            }
            plan.push((*queue_id, pay));
            total_paid = safe_add(total_paid, pay)?;
        }
        if total_paid == 0 {
            return Ok(BatchFulfillment::default());
        }

        let received = self.collaborators.custodian.withdraw(asset, total_paid)?;
        if received < total_paid {
            return Err(PoolError::CustodianShortfall { requested: total_paid, received });
        }

        let mut settled: u64 = 0;
        for (queue_id, pay) in &plan {
            let request = self
                .ledger
                .request(*queue_id)
                .cloned()
                .ok_or(PoolError::RequestNotFound { queue_id: *queue_id })?;
            let entitlement = eligible
                .iter()
                .find(|(id, _)| id == queue_id)
                .map(|(_, e)| *e)
                .unwrap_or(0);

            let full = *pay >= entitlement;
            let shares_burned = if full {
                request.shares
            } else {
                mul_div(request.shares, *pay, entitlement)?
            };

            self.ledger
                .burn_shares(&request.user, request.tranche, shares_burned, *pay)?;
            self.ledger.sub_pending(&request.user, request.tranche, shares_burned)?;
            self.ledger.debit_pool(asset, *pay)?;
            if let Some(stored) = self.ledger.request_mut(*queue_id) {
                if full {
                    stored.fulfilled = true;
                    settled += 1;
                } else {
                    stored.shares -= shares_burned;
                }
            }
        }
        self.ledger.sweep_settled();

        self.events.emit(PoolEvent::WithdrawBatchFulfilled {
            requests_touched: plan.len() as u64,
            requests_settled: settled,
            total_paid,
            ratio_bps,
            timestamp: ctx.timestamp,
        });
        self.ledger.check_invariants()?;

        Ok(BatchFulfillment {
            requests_touched: plan.len() as u64,
            requests_settled: settled,
            total_paid,
            ratio_bps,
        })
    }

    // ============ Yield ============

    /// Book harvested custodian yield and distribute it through the
    /// waterfall.
    pub fn harvest_yield(&mut self, ctx: &CallContext, asset: AssetId, amount: u64) -> PoolResult<()> {
        self.access.require_role(&ctx.caller, Role::Governance)?;
        self.require_supported(&asset)?;
        require_positive(amount)?;

        let state = self.ledger.tranche_state();
        let dist = distribute_profit(&state, amount)?;
        self.ledger.credit_pool(asset, amount)?;
        self.ledger.add_tranche_value(Tranche::Senior, dist.senior_profit)?;
        self.ledger.add_tranche_value(Tranche::Junior, dist.junior_profit)?;
        self.stats.realized_profit = self.stats.realized_profit.saturating_add(amount);

        self.events.emit(PoolEvent::ProfitDistributed {
            profit: amount,
            senior_profit: dist.senior_profit,
            junior_profit: dist.junior_profit,
            timestamp: ctx.timestamp,
        });
        self.ledger.check_invariants()
    }

    // ============ Oracle Intake ============

    /// Record an oracle observation into the gated price history
    pub fn record_price(
        &mut self,
        ctx: &CallContext,
        asset: AssetId,
        price: u64,
        confidence_bps: u64,
    ) -> PoolResult<()> {
        self.metrics.record_price(
            asset,
            PriceObservation { timestamp: ctx.timestamp, price, confidence_bps },
        )
    }

    // ============ Premiums ============

    /// Epoch premium update from live risk inputs
    pub fn update_premiums(&mut self, ctx: &CallContext, asset: AssetId) -> PoolResult<PremiumUpdate> {
        self.require_supported(&asset)?;
        let inputs = self.collect_risk_inputs(&asset, ctx.timestamp);
        let update = self.premium.update(&inputs, ctx.timestamp)?;
        if update.applied {
            self.events.emit(PoolEvent::PremiumUpdated {
                old_rate_bps: update.old_rate_bps,
                new_rate_bps: update.new_rate_bps,
                smoothed_score_bps: update.smoothed_score_bps,
                timestamp: ctx.timestamp,
            });
        }
        Ok(update)
    }

    /// Governance rate override, capped at the hard ceiling
    pub fn override_premium(&mut self, ctx: &CallContext, rate_bps: u64) -> PoolResult<u64> {
        self.access.require_role(&ctx.caller, Role::Governance)?;
        let old = self.premium.current_rate_bps();
        let new = self.premium.governance_override(rate_bps);
        self.events.emit(PoolEvent::PremiumOverridden {
            by: ctx.caller,
            old_rate_bps: old,
            new_rate_bps: new,
            timestamp: ctx.timestamp,
        });
        Ok(new)
    }

    /// Assemble the premium factors from the metrics stack and the
    /// ledger. Any factor that cannot be computed reads as max risk.
    fn collect_risk_inputs(&self, asset: &AssetId, now: u64) -> RiskInputs {
        let balance = self.ledger.balance(asset);
        let utilization_bps = if balance.total_pool == 0 {
            0
        } else {
            mul_div(balance.reserved, BPS_DENOMINATOR, balance.total_pool)
                .unwrap_or(BPS_DENOMINATOR)
        };

        RiskInputs {
            volatility_bps: self.metrics.realized_volatility_bps(&self.config.risk_asset),
            utilization_bps,
            liquidation_frequency_bps: self.adequacy.liquidation_probability_bps(now),
            liquidity_depth_bps: self.liquidity_depth_bps(asset, now),
            correlation_bps: self
                .metrics
                .correlation_bps(&self.config.risk_asset, &self.config.reference_asset)
                .max(0) as u64,
            loss_momentum_bps: self.premium.loss_momentum_bps(now),
        }
    }

    /// DEX slippage on a probe-sized sale of the risk asset, as a
    /// depth proxy; unanswerable quotes read as max risk
    fn liquidity_depth_bps(&self, asset: &AssetId, now: u64) -> u64 {
        let probe = self.config.liquidity_probe_amount;
        let Ok(quote_price) = self.metrics.price(&self.config.risk_asset, now) else {
            return BPS_DENOMINATOR;
        };
        let Ok(expected) = mul_div(probe, quote_price.price, token::ONE) else {
            return BPS_DENOMINATOR;
        };
        if expected == 0 {
            return BPS_DENOMINATOR;
        }
        let Ok(quoted) = self.collaborators.dex.quote(
            self.config.risk_asset,
            *asset,
            self.config.dex_fee_bps,
            probe,
        ) else {
            return BPS_DENOMINATOR;
        };
        let shortfall = expected.saturating_sub(quoted);
        mul_div(shortfall, BPS_DENOMINATOR, expected).unwrap_or(BPS_DENOMINATOR)
    }

    // ============ Capital Adequacy ============

    fn risk_snapshot(&self, debt_exposure: u64) -> RiskSnapshot {
        // Max-risk fallback: without a usable history the whole
        // exposure is treated as tail loss
        let tail = self
            .metrics
            .history(&self.config.risk_asset)
            .and_then(|h| annual_tail_risk(h, debt_exposure).ok())
            .unwrap_or(TailRisk {
                value_at_risk: debt_exposure,
                expected_shortfall: debt_exposure,
            });

        RiskSnapshot {
            debt_exposure,
            avg_discount_bps: self.config.avg_discount_bps,
            current_capital: self.ledger.total_funds(),
            var_99: tail.value_at_risk,
            es_99: tail.expected_shortfall,
        }
    }

    /// Rate-limited adequacy check; emits breaker transitions
    pub fn check_capital_adequacy(
        &mut self,
        ctx: &CallContext,
        debt_exposure: u64,
    ) -> PoolResult<AdequacyReport> {
        let available = self.ledger.total_unreserved();
        let snapshot = self.risk_snapshot(debt_exposure);
        let before = self.adequacy.state();
        let report = self
            .adequacy
            .check_capital_adequacy(available, &snapshot, ctx.timestamp)?;

        match (before, report.state) {
            (BreakerState::Normal, BreakerState::CircuitBreakerActive) => {
                self.events.emit(PoolEvent::CircuitBreakerTripped {
                    ratio_bps: report.ratio_bps,
                    threshold_bps: self.adequacy.config().pause_threshold_bps,
                    timestamp: ctx.timestamp,
                });
            }
            (BreakerState::CircuitBreakerActive, BreakerState::Normal) => {
                self.events.emit(PoolEvent::CircuitBreakerReset {
                    ratio_bps: report.ratio_bps,
                    target_bps: self.adequacy.config().target_ratio_bps,
                    timestamp: ctx.timestamp,
                });
            }
            _ => {}
        }
        Ok(report)
    }

    /// Pure pre-check: would a purchase of `cost` keep the pool
    /// adequately capitalized?
    pub fn can_execute_liquidation(&self, cost: u64, debt_exposure: u64, now: u64) -> PoolResult<()> {
        let available = self.ledger.total_unreserved();
        let snapshot = self.risk_snapshot(debt_exposure);
        self.adequacy.can_execute_liquidation(available, cost, &snapshot, now)
    }

    // ============ Liquidation Purchases ============

    /// Commit to a liquidation purchase: reserve the expected cost
    /// and record the commitment. The target is marked processed now
    /// and can never be attempted again.
    pub fn attempt_purchase(
        &mut self,
        ctx: &CallContext,
        asset: AssetId,
        target: TargetId,
        commitment: [u8; 32],
        expected_cost: u64,
        debt_exposure: u64,
    ) -> PoolResult<ExecutionId> {
        self.enter()?;
        let result =
            self.attempt_purchase_inner(ctx, asset, target, commitment, expected_cost, debt_exposure);
        self.exit();
        result
    }

    fn attempt_purchase_inner(
        &mut self,
        ctx: &CallContext,
        asset: AssetId,
        target: TargetId,
        commitment: [u8; 32],
        expected_cost: u64,
        debt_exposure: u64,
    ) -> PoolResult<ExecutionId> {
        self.require_not_shutdown()?;
        self.require_keeper(&ctx.caller)?;
        self.require_supported(&asset)?;
        require_positive(expected_cost)?;
        if self.book.is_target_processed(&target) {
            return Err(PoolError::TargetAlreadyProcessed { target });
        }

        self.can_execute_liquidation(expected_cost, debt_exposure, ctx.timestamp)?;

        self.ledger.reserve(asset, expected_cost)?;
        let execution_id = match self.book.attempt_purchase(
            ctx.caller,
            target,
            asset,
            commitment,
            expected_cost,
            ctx.block,
            ctx.timestamp,
        ) {
            Ok(id) => id,
            Err(e) => {
                self.ledger.release(asset, expected_cost)?;
                return Err(e);
            }
        };

        self.events.emit(PoolEvent::FundsReserved {
            asset,
            amount: expected_cost,
            total_reserved: self.ledger.balance(&asset).reserved,
            timestamp: ctx.timestamp,
        });
        self.events.emit(PoolEvent::PurchaseAttempted {
            execution_id,
            target,
            keeper: ctx.caller,
            reserved: expected_cost,
            commit_block: ctx.block,
            timestamp: ctx.timestamp,
        });
        Ok(execution_id)
    }

    /// Reveal and execute a committed purchase.
    ///
    /// The attempt flips to `Executing` before any collaborator is
    /// touched; on success the reservation is consumed for the actual
    /// cost and the collateral is locked in holding, on failure the
    /// attempt flips to `Failed` and the reservation is released with
    /// no other ledger mutation.
    pub fn finalize_purchase(
        &mut self,
        ctx: &CallContext,
        execution_id: ExecutionId,
        reveal: &RevealData,
        salt: &[u8; 32],
    ) -> PoolResult<PurchaseOutcome> {
        self.enter()?;
        let result = self.finalize_purchase_inner(ctx, execution_id, reveal, salt);
        self.exit();
        result
    }

    fn finalize_purchase_inner(
        &mut self,
        ctx: &CallContext,
        execution_id: ExecutionId,
        reveal: &RevealData,
        salt: &[u8; 32],
    ) -> PoolResult<PurchaseOutcome> {
        self.require_keeper(&ctx.caller)?;

        // State before external calls: PENDING -> EXECUTING
        let attempt = self.book.begin_execution(&execution_id, reveal, salt, ctx.block)?;

        match self.execute_flash_liquidation(&attempt.asset, attempt.reserved, reveal, ctx) {
            Ok((outcome, cost, entry_price, collateral_value)) => {
                self.book.complete(&execution_id)?;
                self.ledger
                    .consume_reservation(attempt.asset, attempt.reserved, cost)?;
                let lock_id = self.holding.lock(
                    reveal.collateral_asset,
                    outcome.collateral_received,
                    entry_price,
                    ctx.timestamp,
                );
                self.adequacy.record_liquidation_event(ctx.timestamp);
                self.stats.purchases_completed += 1;

                self.events.emit(PoolEvent::PurchaseFinalized {
                    execution_id,
                    collateral_received: outcome.collateral_received,
                    debt_paid: outcome.debt_paid,
                    cost,
                    timestamp: ctx.timestamp,
                });
                self.events.emit(PoolEvent::CollateralLocked {
                    lock_id,
                    asset: reveal.collateral_asset,
                    amount: outcome.collateral_received,
                    entry_price,
                    timestamp: ctx.timestamp,
                });
                self.ledger.check_invariants()?;

                Ok(PurchaseOutcome {
                    execution_id,
                    collateral_received: outcome.collateral_received,
                    debt_paid: outcome.debt_paid,
                    cost,
                    collateral_value,
                    lock_id,
                })
            }
            Err(error) => {
                // All-or-nothing: the flash callback aborted, so only
                // the status and the reservation move
                let released = self.book.fail(&execution_id)?;
                self.ledger.release(attempt.asset, released)?;
                self.stats.purchases_failed += 1;
                self.events.emit(PoolEvent::PurchaseFailed {
                    execution_id,
                    released,
                    timestamp: ctx.timestamp,
                });
                Err(error)
            }
        }
    }

    /// Flash-funded execution: borrow, liquidate, value-check, repay.
    /// Returns the outcome, the pool's net cost, and the collateral
    /// entry price and value.
    fn execute_flash_liquidation(
        &mut self,
        asset: &AssetId,
        reserved: u64,
        reveal: &RevealData,
        ctx: &CallContext,
    ) -> PoolResult<(LiquidationOutcome, u64, u64, u64)> {
        let deadline = ctx.timestamp.saturating_add(self.config.flash_deadline_secs);
        let request = FlashLoanRequest {
            asset: *asset,
            amount: reveal.debt_to_cover,
            deadline,
            data: borsh::to_vec(reveal).map_err(|_| PoolError::InvalidInput {
                param: "reveal",
                reason: "not borsh-encodable",
            })?,
        };
        let flash_premium = self.collaborators.flash.open(&request, ctx.timestamp)?;

        let call = LiquidationCall {
            protocol: reveal.protocol,
            target: reveal.target,
            collateral_asset: reveal.collateral_asset,
            debt_asset: reveal.debt_asset,
            borrower: reveal.borrower,
            debt_to_cover: reveal.debt_to_cover,
            min_collateral_out: reveal.min_collateral_out,
        };
        let outcome = self.collaborators.liquidation.liquidate(&call)?;
        if outcome.collateral_received < reveal.min_collateral_out {
            return Err(PoolError::SlippageExceeded {
                minimum_out: reveal.min_collateral_out,
                actual_out: outcome.collateral_received,
            });
        }

        let quote = self.collaborators.price_feed.price(reveal.collateral_asset)?;
        if quote.confidence_bps < MIN_CONFIDENCE_BPS {
            return Err(PoolError::InsufficientConfidence {
                confidence_bps: quote.confidence_bps,
                minimum_bps: MIN_CONFIDENCE_BPS,
            });
        }
        let collateral_value = mul_div(outcome.collateral_received, quote.price, token::ONE)?;
        if collateral_value < self.config.min_collateral_value {
            return Err(PoolError::CollateralValueTooLow {
                value: collateral_value,
                minimum: self.config.min_collateral_value,
            });
        }

        let cost = safe_add(outcome.debt_paid, flash_premium)?;
        if cost > reserved {
            return Err(PoolError::InsufficientReserved { reserved, requested: cost });
        }

        let received = self.collaborators.custodian.withdraw(*asset, cost)?;
        if received < cost {
            return Err(PoolError::CustodianShortfall { requested: cost, received });
        }
        let repaid = safe_add(reveal.debt_to_cover, flash_premium)?;
        self.collaborators
            .flash
            .settle(*asset, reveal.debt_to_cover, flash_premium, repaid)?;

        Ok((outcome, cost, quote.price, collateral_value))
    }

    /// Keeper-cancel of a pending attempt; releases the reservation
    pub fn cancel_purchase(&mut self, ctx: &CallContext, execution_id: ExecutionId) -> PoolResult<()> {
        let released = self.book.cancel(&execution_id, &ctx.caller)?;
        let asset = self
            .book
            .attempt(&execution_id)
            .map(|a| a.asset)
            .ok_or(PoolError::AttemptNotFound { execution_id })?;
        self.ledger.release(asset, released)?;
        self.events.emit(PoolEvent::PurchaseCancelled {
            execution_id,
            keeper: ctx.caller,
            released,
            timestamp: ctx.timestamp,
        });
        Ok(())
    }

    // ============ Collateral Sales ============

    /// Sell a holding lock into a stablecoin and push the realized
    /// P&L through the waterfall.
    pub fn sell_collateral(
        &mut self,
        ctx: &CallContext,
        lock_id: u64,
        asset: AssetId,
        min_out: u64,
    ) -> PoolResult<RealizedSale> {
        self.enter()?;
        let result = self.sell_collateral_inner(ctx, lock_id, asset, min_out);
        self.exit();
        result
    }

    fn sell_collateral_inner(
        &mut self,
        ctx: &CallContext,
        lock_id: u64,
        asset: AssetId,
        min_out: u64,
    ) -> PoolResult<RealizedSale> {
        self.require_keeper(&ctx.caller)?;
        self.require_supported(&asset)?;
        let lock = self
            .holding
            .get(lock_id)
            .cloned()
            .ok_or(PoolError::InvalidInput { param: "lock_id", reason: "unknown collateral lock" })?;

        let proceeds = self.collaborators.dex.swap(&SwapParams {
            token_in: lock.asset,
            token_out: asset,
            fee_bps: self.config.dex_fee_bps,
            amount_in: lock.amount,
            amount_out_minimum: min_out,
        })?;
        if proceeds < min_out {
            return Err(PoolError::SlippageExceeded { minimum_out: min_out, actual_out: proceeds });
        }
        let credited = self.collaborators.custodian.deposit(asset, proceeds)?;
        if credited < proceeds {
            return Err(PoolError::CustodianShortfall { requested: proceeds, received: credited });
        }

        let cost_basis = mul_div(lock.amount, lock.entry_price, token::ONE)?;
        let sale = self.holding.realize_sale(lock_id, proceeds, cost_basis)?;
        self.ledger.credit_pool(asset, proceeds)?;

        if sale.pnl >= 0 {
            let profit = sale.pnl as u64;
            if profit > 0 {
                let state = self.ledger.tranche_state();
                let dist = distribute_profit(&state, profit)?;
                self.ledger.add_tranche_value(Tranche::Senior, dist.senior_profit)?;
                self.ledger.add_tranche_value(Tranche::Junior, dist.junior_profit)?;
                self.stats.realized_profit = self.stats.realized_profit.saturating_add(profit);
                self.events.emit(PoolEvent::ProfitDistributed {
                    profit,
                    senior_profit: dist.senior_profit,
                    junior_profit: dist.junior_profit,
                    timestamp: ctx.timestamp,
                });
            }
        } else {
            let loss = sale.pnl.unsigned_abs();
            self.apply_realized_loss(ctx, loss)?;
        }

        self.events.emit(PoolEvent::CollateralReleased {
            lock_id,
            proceeds,
            realized_pnl: sale.pnl,
            timestamp: ctx.timestamp,
        });
        self.ledger.check_invariants()?;
        Ok(sale)
    }

    /// Distribute a realized loss across the tranches and feed the
    /// risk models. Does not open a reinsurance claim by itself.
    fn apply_realized_loss(
        &mut self,
        ctx: &CallContext,
        loss: u64,
    ) -> PoolResult<caisson_common::waterfall::LossDistribution> {
        let state = self.ledger.tranche_state();
        let pool_value = state.total_value;
        let dist = distribute_loss(&state, loss)?;

        self.ledger.sub_tranche_value(Tranche::Junior, dist.junior_loss);
        self.ledger.sub_tranche_value(Tranche::Senior, dist.senior_loss);
        self.premium.record_loss(loss, pool_value, ctx.timestamp)?;
        self.adequacy.record_loss(loss);
        self.stats.realized_loss = self.stats.realized_loss.saturating_add(loss);

        self.events.emit(PoolEvent::LossDistributed {
            loss,
            senior_loss: dist.senior_loss,
            junior_loss: dist.junior_loss,
            reinsurance_needed: dist.reinsurance_needed,
            timestamp: ctx.timestamp,
        });
        Ok(dist)
    }

    // ============ Reinsurance ============

    /// Register an external reinsurance provider
    pub fn register_reinsurance_provider(
        &mut self,
        ctx: &CallContext,
        provider: ReinsuranceProvider,
    ) -> PoolResult<()> {
        self.access.require_role(&ctx.caller, Role::Admin)?;
        let allocated = provider.allocated_capital;
        let limit = provider.coverage_limit;
        let address = provider.provider;
        self.reinsurance.register_provider(provider)?;
        self.events.emit(PoolEvent::ProviderRegistered {
            provider: address,
            allocated_capital: allocated,
            coverage_limit: limit,
            timestamp: ctx.timestamp,
        });
        Ok(())
    }

    /// Report a realized loss, absorb the deductible, and request the
    /// excess from reinsurance. Reserved to the liquidation module.
    pub fn trigger_reinsurance(&mut self, ctx: &CallContext, loss: u64) -> PoolResult<LossReport> {
        self.access.require_role(&ctx.caller, Role::LiquidationModule)?;
        require_positive(loss)?;

        let pool_value = self.ledger.tranche_state().total_value;
        let dist = self.apply_realized_loss(ctx, loss)?;

        // The pool always eats a deductible slice itself; only the
        // excess is claimable
        let deductible = apply_bps(pool_value, self.config.deductible_bps)?;
        let covered_loss = loss.saturating_sub(deductible);

        let request_id = if covered_loss > 0 {
            let proof = LossProof::new(loss, self.ledger.state_root());
            let id = self
                .reinsurance
                .request_coverage(loss, covered_loss, &proof, ctx.timestamp)?;
            self.events.emit(PoolEvent::CoverageRequested {
                request_id: id,
                loss_amount: loss,
                deductible,
                requested_coverage: covered_loss,
                timestamp: ctx.timestamp,
            });
            Some(id)
        } else {
            None
        };

        self.ledger.check_invariants()?;
        Ok(LossReport {
            senior_loss: dist.senior_loss,
            junior_loss: dist.junior_loss,
            deductible,
            covered_loss,
            reinsurance_needed: dist.reinsurance_needed,
            request_id,
        })
    }

    /// Governance approval of a pending coverage request
    pub fn approve_coverage(&mut self, ctx: &CallContext, request_id: u64) -> PoolResult<u64> {
        self.access.require_role(&ctx.caller, Role::Governance)?;
        let approved = self.reinsurance.approve(request_id, ctx.timestamp)?;
        if approved > 0 {
            let provider_count = self
                .reinsurance
                .allocations(request_id)
                .map(|a| a.len() as u64)
                .unwrap_or(0);
            self.events.emit(PoolEvent::CoverageApproved {
                request_id,
                approved_coverage: approved,
                provider_count,
                timestamp: ctx.timestamp,
            });
        }
        Ok(approved)
    }

    /// Execute an approved payout and inject the net capital.
    ///
    /// Deliberately a separate governance-gated step from the trigger
    /// to model settlement latency honestly. The injection restores
    /// Senior toward par first; any excess goes to Junior.
    pub fn inject_reinsurance_capital(
        &mut self,
        ctx: &CallContext,
        asset: AssetId,
        request_id: u64,
    ) -> PoolResult<u64> {
        self.enter()?;
        let result = self.inject_reinsurance_inner(ctx, asset, request_id);
        self.exit();
        result
    }

    fn inject_reinsurance_inner(
        &mut self,
        ctx: &CallContext,
        asset: AssetId,
        request_id: u64,
    ) -> PoolResult<u64> {
        self.access.require_role(&ctx.caller, Role::Governance)?;
        self.require_supported(&asset)?;

        let plan = self.reinsurance.execute_payout(request_id, ctx.timestamp)?;
        let net = plan.net_injection;
        if net == 0 {
            return Ok(0);
        }

        let credited = self.collaborators.custodian.deposit(asset, net)?;
        if credited < net {
            return Err(PoolError::CustodianShortfall { requested: net, received: credited });
        }

        let state = self.ledger.tranche_state();
        let senior_deficit = state.senior_shares.saturating_sub(state.senior_value);
        let senior_credit = net.min(senior_deficit);
        let junior_credit = net - senior_credit;

        self.ledger.credit_pool(asset, net)?;
        self.ledger.add_tranche_value(Tranche::Senior, senior_credit)?;
        self.ledger.add_tranche_value(Tranche::Junior, junior_credit)?;
        self.stats.reinsurance_received = self.stats.reinsurance_received.saturating_add(net);

        self.events.emit(PoolEvent::CoveragePaidOut {
            request_id,
            gross_coverage: plan.gross_coverage,
            premiums_netted: plan.premiums,
            timestamp: ctx.timestamp,
        });
        self.events.emit(PoolEvent::CapitalInjected {
            request_id,
            senior_credit,
            junior_credit,
            timestamp: ctx.timestamp,
        });
        self.ledger.check_invariants()?;
        Ok(net)
    }

    // ============ Emergency Shutdown ============

    /// Phase one: start the shutdown delay
    pub fn initiate_shutdown(&mut self, ctx: &CallContext) -> PoolResult<()> {
        self.access.require_role(&ctx.caller, Role::Admin)?;
        self.require_not_shutdown()?;
        self.shutdown_initiated_at = Some(ctx.timestamp);
        self.events.emit(PoolEvent::ShutdownInitiated {
            by: ctx.caller,
            redeemable_at: ctx.timestamp.saturating_add(self.config.shutdown_delay_secs),
            timestamp: ctx.timestamp,
        });
        Ok(())
    }

    /// Phase two: after the delay, any holder redeems full pro-rata
    /// value across both tranches in one call, bypassing the cooldown
    /// and the queue.
    pub fn emergency_withdraw(&mut self, ctx: &CallContext, asset: AssetId) -> PoolResult<EmergencyPayout> {
        self.enter()?;
        let result = self.emergency_withdraw_inner(ctx, asset);
        self.exit();
        result
    }

    fn emergency_withdraw_inner(
        &mut self,
        ctx: &CallContext,
        asset: AssetId,
    ) -> PoolResult<EmergencyPayout> {
        self.require_supported(&asset)?;
        let initiated_at = self.shutdown_initiated_at.ok_or(PoolError::ShutdownNotInitiated)?;
        let redeemable_at = initiated_at.saturating_add(self.config.shutdown_delay_secs);
        if ctx.timestamp < redeemable_at {
            return Err(PoolError::ShutdownDelayActive {
                remaining_secs: redeemable_at - ctx.timestamp,
            });
        }

        let state = self.ledger.tranche_state();
        let senior_shares = self.ledger.shares_of(&ctx.caller, Tranche::Senior);
        let junior_shares = self.ledger.shares_of(&ctx.caller, Tranche::Junior);

        let senior_paid = if senior_shares > 0 {
            pro_rata(senior_shares, state.senior_value, state.senior_shares)?
        } else {
            0
        };
        let junior_paid = if junior_shares > 0 {
            pro_rata(junior_shares, state.junior_value, state.junior_shares)?
        } else {
            0
        };
        let total = safe_add(senior_paid, junior_paid)?;
        require_positive(total)?;

        let balance = self.ledger.balance(&asset);
        if total > balance.unreserved() {
            return Err(PoolError::InsufficientPoolFunds {
                available: balance.unreserved(),
                requested: total,
            });
        }
        let received = self.collaborators.custodian.withdraw(asset, total)?;
        if received < total {
            return Err(PoolError::CustodianShortfall { requested: total, received });
        }

        // The queue is moot for this holder now
        self.ledger.clear_pending(&ctx.caller, Tranche::Senior);
        self.ledger.clear_pending(&ctx.caller, Tranche::Junior);
        if senior_shares > 0 {
            self.ledger
                .burn_shares(&ctx.caller, Tranche::Senior, senior_shares, senior_paid)?;
        }
        if junior_shares > 0 {
            self.ledger
                .burn_shares(&ctx.caller, Tranche::Junior, junior_shares, junior_paid)?;
        }
        self.ledger.debit_pool(asset, total)?;

        self.events.emit(PoolEvent::EmergencyWithdrawal {
            user: ctx.caller,
            senior_paid,
            junior_paid,
            timestamp: ctx.timestamp,
        });
        self.ledger.check_invariants()?;
        Ok(EmergencyPayout { senior_paid, junior_paid })
    }
}

// ============================================================================
// Tests
// ============================================================================
