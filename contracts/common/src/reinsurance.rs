//! Reinsurance Module
//!
//! Registry of external capital providers and the coverage-request
//! lifecycle. Requests are created against a verified loss proof,
//! approved pro-rata across active providers by allocated capital
//! (bounded by each provider's coverage limit), and paid out within a
//! seven-day validity window. Payouts report the gross coverage and
//! the premiums owed back to each provider in the same plan, so the
//! net capital effect is explicit rather than assumed. Stale requests
//! expire lazily on the next access; nothing runs in the background.

use crate::constants::bps::BPS_DENOMINATOR;
use crate::constants::reinsurance::{CLAIM_VALIDITY_SECS, MIN_TRUST_SCORE};
use crate::errors::{PoolError, PoolResult};
use crate::math::{apply_bps, mul_div};
use crate::types::{Address, CoverageRequest, CoverageStatus, ReinsuranceProvider};
use crate::validation::{require_positive, require_valid_address};
use crate::{BTreeMap, Vec};
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ============================================================================
// Loss Proofs
// ============================================================================

/// Binding of a loss amount to the ledger state that realized it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct LossProof {
    pub loss_amount: u64,
    /// Root of the ledger state at loss time
    pub state_root: [u8; 32],
    /// SHA-256 over amount and root
    pub digest: [u8; 32],
}

impl LossProof {
    pub fn new(loss_amount: u64, state_root: [u8; 32]) -> Self {
        Self {
            loss_amount,
            state_root,
            digest: Self::compute_digest(loss_amount, &state_root),
        }
    }

    fn compute_digest(loss_amount: u64, state_root: &[u8; 32]) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(loss_amount.to_le_bytes());
        hasher.update(state_root);
        hasher.finalize().into()
    }

    /// Whether the digest matches the claimed amount and root
    pub fn verify(&self) -> bool {
        self.digest == Self::compute_digest(self.loss_amount, &self.state_root)
    }
}

// ============================================================================
// Payout Plans
// ============================================================================

/// One provider's slice of an approved request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct ProviderAllocation {
    pub provider: Address,
    /// Gross coverage this provider pays
    pub coverage: u64,
    /// Premium the pool owes back for that coverage
    pub premium: u64,
}

/// Executed payout with the netting made explicit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct PayoutPlan {
    pub request_id: u64,
    pub allocations: Vec<ProviderAllocation>,
    /// Sum of provider coverage
    pub gross_coverage: u64,
    /// Sum of premiums collected from the pool in the same call
    pub premiums: u64,
    /// gross minus premiums; what actually lands in the ledger
    pub net_injection: u64,
}

// ============================================================================
// Registry
// ============================================================================

/// Providers, requests, and approved allocations
#[derive(Debug, Clone, Default, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct ReinsuranceRegistry {
    providers: BTreeMap<Address, ReinsuranceProvider>,
    requests: BTreeMap<u64, CoverageRequest>,
    allocations: BTreeMap<u64, Vec<ProviderAllocation>>,
    next_request_id: u64,
}

impl ReinsuranceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or update a provider
    pub fn register_provider(&mut self, provider: ReinsuranceProvider) -> PoolResult<()> {
        require_valid_address(&provider.provider)?;
        require_positive(provider.allocated_capital)?;
        require_positive(provider.coverage_limit)?;
        crate::check!(
            provider.premium_rate_bps < BPS_DENOMINATOR,
            PoolError::InvalidInput {
                param: "premium_rate_bps",
                reason: "must be below the denominator",
            }
        );
        crate::check!(
            provider.trust_score <= 100,
            PoolError::InvalidInput { param: "trust_score", reason: "scored 0-100" }
        );
        self.providers.insert(provider.provider, provider);
        Ok(())
    }

    /// Activate or deactivate a provider
    pub fn set_provider_active(&mut self, address: &Address, active: bool) -> PoolResult<()> {
        let provider = self
            .providers
            .get_mut(address)
            .ok_or(PoolError::ProviderNotFound { provider: *address })?;
        provider.active = active;
        Ok(())
    }

    pub fn provider(&self, address: &Address) -> Option<&ReinsuranceProvider> {
        self.providers.get(address)
    }

    pub fn request(&self, request_id: u64) -> Option<&CoverageRequest> {
        self.requests.get(&request_id)
    }

    pub fn allocations(&self, request_id: u64) -> Option<&[ProviderAllocation]> {
        self.allocations.get(&request_id).map(Vec::as_slice)
    }

    /// Capital across providers eligible for allocations
    pub fn total_eligible_capital(&self) -> u64 {
        self.eligible_providers()
            .fold(0u64, |acc, p| acc.saturating_add(p.allocated_capital))
    }

    fn eligible_providers(&self) -> impl Iterator<Item = &ReinsuranceProvider> {
        self.providers
            .values()
            .filter(|p| p.active && p.trust_score >= MIN_TRUST_SCORE && p.allocated_capital > 0)
    }

    /// Open a coverage request for a verified loss.
    ///
    /// The proof must carry the same amount the request claims; a
    /// proof that does not verify is a security-relevant rejection.
    pub fn request_coverage(
        &mut self,
        loss_amount: u64,
        requested_coverage: u64,
        proof: &LossProof,
        now: u64,
    ) -> PoolResult<u64> {
        require_positive(requested_coverage)?;
        if !proof.verify() || proof.loss_amount != loss_amount {
            return Err(PoolError::InvalidLossProof);
        }

        let request_id = self.next_request_id;
        self.next_request_id += 1;
        self.requests.insert(
            request_id,
            CoverageRequest {
                request_id,
                loss_amount,
                requested_coverage,
                approved_coverage: 0,
                status: CoverageStatus::Pending,
                requested_at: now,
            },
        );
        Ok(request_id)
    }

    /// Approve a pending request, allocating pro-rata by capital.
    ///
    /// Each provider's slice is bounded by its coverage limit and its
    /// allocated capital. With no eligible providers the request is
    /// rejected in place and approves zero.
    pub fn approve(&mut self, request_id: u64, now: u64) -> PoolResult<u64> {
        self.expire_if_stale(request_id, now)?;
        let request = self
            .requests
            .get(&request_id)
            .ok_or(PoolError::CoverageNotFound { request_id })?;
        if request.status != CoverageStatus::Pending {
            return Err(PoolError::InvalidCoverageStatus { request_id });
        }
        let requested = request.requested_coverage;

        let total_capital = self.total_eligible_capital();
        if total_capital == 0 {
            self.set_request_status(request_id, CoverageStatus::Rejected)?;
            return Ok(0);
        }

        let mut allocations = Vec::new();
        let mut approved: u64 = 0;
        for provider in self.eligible_providers() {
            let share = mul_div(requested, provider.allocated_capital, total_capital)?;
            let coverage = share
                .min(provider.coverage_limit)
                .min(provider.allocated_capital);
            if coverage == 0 {
                continue;
            }
            let premium = apply_bps(coverage, provider.premium_rate_bps)?;
            allocations.push(ProviderAllocation {
                provider: provider.provider,
                coverage,
                premium,
            });
            approved = approved.saturating_add(coverage);
        }

        if approved == 0 {
            self.set_request_status(request_id, CoverageStatus::Rejected)?;
            return Ok(0);
        }
        let request = self
            .requests
            .get_mut(&request_id)
            .ok_or(PoolError::CoverageNotFound { request_id })?;
        request.status = CoverageStatus::Approved;
        request.approved_coverage = approved;
        self.allocations.insert(request_id, allocations);
        Ok(approved)
    }

    fn set_request_status(&mut self, request_id: u64, status: CoverageStatus) -> PoolResult<()> {
        let request = self
            .requests
            .get_mut(&request_id)
            .ok_or(PoolError::CoverageNotFound { request_id })?;
        request.status = status;
        Ok(())
    }

    /// Execute an approved payout inside the validity window.
    ///
    /// Deducts the covered amounts from provider capital and returns
    /// the plan with premiums netted; the caller applies
    /// `net_injection` to the ledger.
    pub fn execute_payout(&mut self, request_id: u64, now: u64) -> PoolResult<PayoutPlan> {
        self.expire_if_stale(request_id, now)?;
        let request = self
            .requests
            .get_mut(&request_id)
            .ok_or(PoolError::CoverageNotFound { request_id })?;
        if request.status != CoverageStatus::Approved {
            return Err(PoolError::InvalidCoverageStatus { request_id });
        }

        let allocations = self
            .allocations
            .get(&request_id)
            .cloned()
            .unwrap_or_default();

        let mut gross: u64 = 0;
        let mut premiums: u64 = 0;
        for allocation in &allocations {
            gross = gross.saturating_add(allocation.coverage);
            premiums = premiums.saturating_add(allocation.premium);
        }

        request.status = CoverageStatus::PaidOut;

        for allocation in &allocations {
            if let Some(provider) = self.providers.get_mut(&allocation.provider) {
                provider.allocated_capital =
                    provider.allocated_capital.saturating_sub(allocation.coverage);
            }
        }

        Ok(PayoutPlan {
            request_id,
            net_injection: gross.saturating_sub(premiums),
            gross_coverage: gross,
            premiums,
            allocations,
        })
    }

    /// Lazily expire a request whose validity window has closed
    fn expire_if_stale(&mut self, request_id: u64, now: u64) -> PoolResult<()> {
        let request = self
            .requests
            .get_mut(&request_id)
            .ok_or(PoolError::CoverageNotFound { request_id })?;
        let open = matches!(
            request.status,
            CoverageStatus::Pending | CoverageStatus::Approved
        );
        if open && now > request.requested_at.saturating_add(CLAIM_VALIDITY_SECS) {
            request.status = CoverageStatus::Expired;
            return Err(PoolError::InvalidCoverageStatus { request_id });
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(address: u8, capital: u64, limit: u64, rate_bps: u64) -> ReinsuranceProvider {
        ReinsuranceProvider {
            provider: [address; 32],
            allocated_capital: capital,
            coverage_limit: limit,
            premium_rate_bps: rate_bps,
            trust_score: 80,
            active: true,
        }
    }

    fn registry_with_two_providers() -> ReinsuranceRegistry {
        let mut registry = ReinsuranceRegistry::new();
        registry.register_provider(provider(1, 300_000, 200_000, 100)).unwrap();
        registry.register_provider(provider(2, 100_000, 200_000, 200)).unwrap();
        registry
    }

    #[test]
    fn proof_round_trip_and_tamper_detection() {
        let proof = LossProof::new(139_000, [5u8; 32]);
        assert!(proof.verify());

        let mut tampered = proof;
        tampered.loss_amount += 1;
        assert!(!tampered.verify());
    }

    #[test]
    fn request_requires_a_valid_proof() {
        let mut registry = registry_with_two_providers();
        let proof = LossProof::new(100_000, [5u8; 32]);

        // Claimed amount differs from the proven amount
        let result = registry.request_coverage(120_000, 90_000, &proof, 1_000);
        assert_eq!(result, Err(PoolError::InvalidLossProof));

        let id = registry.request_coverage(100_000, 90_000, &proof, 1_000).unwrap();
        assert_eq!(registry.request(id).unwrap().status, CoverageStatus::Pending);
    }

    #[test]
    fn approval_allocates_pro_rata_by_capital() {
        let mut registry = registry_with_two_providers();
        let proof = LossProof::new(100_000, [5u8; 32]);
        let id = registry.request_coverage(100_000, 80_000, &proof, 1_000).unwrap();

        let approved = registry.approve(id, 2_000).unwrap();
        // 300k/400k and 100k/400k of 80k
        assert_eq!(approved, 80_000);
        let allocations = registry.allocations(id).unwrap();
        assert_eq!(allocations[0].coverage, 60_000);
        assert_eq!(allocations[1].coverage, 20_000);
        assert_eq!(registry.request(id).unwrap().status, CoverageStatus::Approved);
    }

    #[test]
    fn coverage_limit_bounds_each_slice() {
        let mut registry = ReinsuranceRegistry::new();
        registry.register_provider(provider(1, 900_000, 50_000, 100)).unwrap();
        registry.register_provider(provider(2, 100_000, 200_000, 100)).unwrap();

        let proof = LossProof::new(500_000, [5u8; 32]);
        let id = registry.request_coverage(500_000, 400_000, &proof, 1_000).unwrap();
        let approved = registry.approve(id, 2_000).unwrap();

        let allocations = registry.allocations(id).unwrap();
        // Provider 1's pro-rata 360k is clipped to its 50k limit
        assert_eq!(allocations[0].coverage, 50_000);
        assert_eq!(allocations[1].coverage, 40_000);
        assert_eq!(approved, 90_000);
    }

    #[test]
    fn untrusted_and_inactive_providers_get_nothing() {
        let mut registry = registry_with_two_providers();
        let mut shady = provider(3, 500_000, 500_000, 100);
        shady.trust_score = 10;
        registry.register_provider(shady).unwrap();
        registry.set_provider_active(&[2u8; 32], false).unwrap();

        let proof = LossProof::new(100_000, [5u8; 32]);
        let id = registry.request_coverage(100_000, 80_000, &proof, 1_000).unwrap();
        registry.approve(id, 2_000).unwrap();

        let allocations = registry.allocations(id).unwrap();
        assert_eq!(allocations.len(), 1);
        assert_eq!(allocations[0].provider, [1u8; 32]);
    }

    #[test]
    fn no_eligible_providers_rejects_in_place() {
        let mut registry = ReinsuranceRegistry::new();
        let proof = LossProof::new(100_000, [5u8; 32]);
        let id = registry.request_coverage(100_000, 80_000, &proof, 1_000).unwrap();

        assert_eq!(registry.approve(id, 2_000).unwrap(), 0);
        assert_eq!(registry.request(id).unwrap().status, CoverageStatus::Rejected);
    }

    #[test]
    fn payout_nets_premiums_against_coverage() {
        let mut registry = registry_with_two_providers();
        let proof = LossProof::new(100_000, [5u8; 32]);
        let id = registry.request_coverage(100_000, 80_000, &proof, 1_000).unwrap();
        registry.approve(id, 2_000).unwrap();

        let plan = registry.execute_payout(id, 3_000).unwrap();
        assert_eq!(plan.gross_coverage, 80_000);
        // 60k at 1% + 20k at 2%
        assert_eq!(plan.premiums, 600 + 400);
        assert_eq!(plan.net_injection, 79_000);
        assert_eq!(registry.request(id).unwrap().status, CoverageStatus::PaidOut);

        // Capital was consumed
        assert_eq!(registry.provider(&[1u8; 32]).unwrap().allocated_capital, 240_000);
        assert_eq!(registry.provider(&[2u8; 32]).unwrap().allocated_capital, 80_000);
    }

    #[test]
    fn payout_requires_prior_approval() {
        let mut registry = registry_with_two_providers();
        let proof = LossProof::new(100_000, [5u8; 32]);
        let id = registry.request_coverage(100_000, 80_000, &proof, 1_000).unwrap();

        let result = registry.execute_payout(id, 2_000);
        assert_eq!(result, Err(PoolError::InvalidCoverageStatus { request_id: id }));
    }

    #[test]
    fn stale_requests_expire_lazily() {
        let mut registry = registry_with_two_providers();
        let proof = LossProof::new(100_000, [5u8; 32]);
        let id = registry.request_coverage(100_000, 80_000, &proof, 1_000).unwrap();
        registry.approve(id, 2_000).unwrap();

        let too_late = 1_000 + CLAIM_VALIDITY_SECS + 1;
        let result = registry.execute_payout(id, too_late);
        assert!(result.is_err());
        assert_eq!(registry.request(id).unwrap().status, CoverageStatus::Expired);

        // Providers keep their capital when a claim expires
        assert_eq!(registry.provider(&[1u8; 32]).unwrap().allocated_capital, 300_000);
    }

    #[test]
    fn provider_validation_rejects_bad_entries() {
        let mut registry = ReinsuranceRegistry::new();
        assert!(registry.register_provider(provider(0, 1, 1, 1)).is_err()); // zero address
        assert!(registry
            .register_provider(provider(1, 0, 200_000, 100))
            .is_err()); // no capital
        assert!(registry
            .register_provider(provider(1, 100, 100, 10_000))
            .is_err()); // rate at denominator
    }
}
