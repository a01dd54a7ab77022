//! Liquidation Purchase Book
//!
//! Commit-reveal state machine for discounted collateral purchases.
//! Liquidation targets are zero-sum and visible in a public mempool,
//! so a keeper first commits to a hash of the target and parameters;
//! the reveal happens atomically with execution at least one block
//! later. A target is marked processed at commit time and never
//! again, execution ids carry a nonce so commits cannot collide, and
//! a finalized set independent of the status field guarantees a
//! retried reveal cannot double-execute.
//!
//! The book owns state transitions only. The pool flips an attempt
//! to `Executing` here *before* making any external call, then
//! reports `complete` or `fail` afterwards; a failure releases the
//! reservation and nothing else.

use crate::constants::purchase::{COMMIT_WINDOW_BLOCKS, MIN_REVEAL_DELAY_BLOCKS};
use crate::errors::{PoolError, PoolResult};
use crate::types::{
    Address, AssetId, CommitmentData, ExecutionId, PurchaseAttempt, PurchaseStatus, RevealData,
    TargetId,
};
use crate::{BTreeMap, BTreeSet};
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ============================================================================
// Commitment Hashing
// ============================================================================

/// Commitment hash binding reveal parameters and a secret salt.
///
/// SHA-256 over the borsh encoding of the reveal followed by the
/// salt; both sides of the protocol must use this exact derivation.
pub fn compute_commitment(reveal: &RevealData, salt: &[u8; 32]) -> PoolResult<[u8; 32]> {
    let encoded = borsh::to_vec(reveal).map_err(|_| PoolError::InvalidInput {
        param: "reveal",
        reason: "not borsh-encodable",
    })?;
    let mut hasher = Sha256::new();
    hasher.update(&encoded);
    hasher.update(salt);
    Ok(hasher.finalize().into())
}

fn derive_execution_id(commitment: &[u8; 32], timestamp: u64, nonce: u64) -> ExecutionId {
    let mut hasher = Sha256::new();
    hasher.update(commitment);
    hasher.update(timestamp.to_le_bytes());
    hasher.update(nonce.to_le_bytes());
    hasher.finalize().into()
}

// ============================================================================
// Purchase Book
// ============================================================================

/// All purchase attempts and their replay guards
#[derive(Debug, Clone, Default, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct PurchaseBook {
    attempts: BTreeMap<ExecutionId, PurchaseAttempt>,
    commitments: BTreeMap<ExecutionId, CommitmentData>,
    processed_targets: BTreeSet<TargetId>,
    finalized: BTreeSet<ExecutionId>,
    nonce: u64,
}

impl PurchaseBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a commit: one attempt per target, ever.
    ///
    /// The caller has already reserved `reserved` pool funds; the
    /// returned execution id keys the rest of the lifecycle.
    pub fn attempt_purchase(
        &mut self,
        keeper: Address,
        target: TargetId,
        asset: AssetId,
        commitment: [u8; 32],
        reserved: u64,
        block: u64,
        now: u64,
    ) -> PoolResult<ExecutionId> {
        if self.processed_targets.contains(&target) {
            return Err(PoolError::TargetAlreadyProcessed { target });
        }

        let execution_id = derive_execution_id(&commitment, now, self.nonce);
        self.nonce = self.nonce.wrapping_add(1);

        self.attempts.insert(
            execution_id,
            PurchaseAttempt {
                execution_id,
                target,
                asset,
                keeper,
                reserved,
                status: PurchaseStatus::Pending,
                commit_block: block,
                committed_at: now,
            },
        );
        self.commitments.insert(
            execution_id,
            CommitmentData {
                commitment,
                commit_block: block,
                keeper,
                revealed: false,
            },
        );
        self.processed_targets.insert(target);

        Ok(execution_id)
    }

    /// Verify a reveal and flip the attempt to `Executing`.
    ///
    /// Must be called before any external execution. A commitment
    /// mismatch leaves the attempt untouched and still revealable
    /// with the right data inside the window.
    pub fn begin_execution(
        &mut self,
        execution_id: &ExecutionId,
        reveal: &RevealData,
        salt: &[u8; 32],
        block: u64,
    ) -> PoolResult<PurchaseAttempt> {
        if self.finalized.contains(execution_id) {
            return Err(PoolError::AlreadyFinalized { execution_id: *execution_id });
        }
        let attempt = self
            .attempts
            .get(execution_id)
            .ok_or(PoolError::AttemptNotFound { execution_id: *execution_id })?;
        if attempt.status != PurchaseStatus::Pending {
            return Err(PoolError::InvalidStatus {
                expected: PurchaseStatus::Pending.as_str(),
                actual: attempt.status.as_str(),
            });
        }

        let commitment = self
            .commitments
            .get(execution_id)
            .ok_or(PoolError::AttemptNotFound { execution_id: *execution_id })?;
        if block < commitment.commit_block.saturating_add(MIN_REVEAL_DELAY_BLOCKS) {
            return Err(PoolError::RevealTooEarly {
                commit_block: commitment.commit_block,
                current_block: block,
            });
        }
        if block > commitment.commit_block.saturating_add(COMMIT_WINDOW_BLOCKS) {
            return Err(PoolError::CommitmentExpired {
                commit_block: commitment.commit_block,
                current_block: block,
            });
        }

        let derived = compute_commitment(reveal, salt)?;
        if derived != commitment.commitment {
            return Err(PoolError::CommitmentMismatch { execution_id: *execution_id });
        }
        if reveal.target != attempt.target {
            return Err(PoolError::CommitmentMismatch { execution_id: *execution_id });
        }

        // All guards passed: commit the transition before the caller
        // touches any collaborator
        self.finalized.insert(*execution_id);
        if let Some(data) = self.commitments.get_mut(execution_id) {
            data.revealed = true;
        }
        let attempt = self
            .attempts
            .get_mut(execution_id)
            .ok_or(PoolError::AttemptNotFound { execution_id: *execution_id })?;
        attempt.status = PurchaseStatus::Executing;
        Ok(attempt.clone())
    }

    /// Mark an executing attempt completed; the reservation was spent
    pub fn complete(&mut self, execution_id: &ExecutionId) -> PoolResult<()> {
        let attempt = self.executing_mut(execution_id)?;
        attempt.status = PurchaseStatus::Completed;
        Ok(())
    }

    /// Mark an executing attempt failed; returns the reservation to
    /// release. The target stays processed.
    pub fn fail(&mut self, execution_id: &ExecutionId) -> PoolResult<u64> {
        let attempt = self.executing_mut(execution_id)?;
        attempt.status = PurchaseStatus::Failed;
        Ok(attempt.reserved)
    }

    /// Keeper-cancel a pending attempt; returns the reservation to
    /// release. Not available once execution has begun.
    pub fn cancel(&mut self, execution_id: &ExecutionId, keeper: &Address) -> PoolResult<u64> {
        let attempt = self
            .attempts
            .get_mut(execution_id)
            .ok_or(PoolError::AttemptNotFound { execution_id: *execution_id })?;
        if attempt.keeper != *keeper {
            return Err(PoolError::Unauthorized { caller: *keeper, required: "committing keeper" });
        }
        if attempt.status != PurchaseStatus::Pending {
            return Err(PoolError::InvalidStatus {
                expected: PurchaseStatus::Pending.as_str(),
                actual: attempt.status.as_str(),
            });
        }
        attempt.status = PurchaseStatus::Cancelled;
        Ok(attempt.reserved)
    }

    fn executing_mut(&mut self, execution_id: &ExecutionId) -> PoolResult<&mut PurchaseAttempt> {
        let attempt = self
            .attempts
            .get_mut(execution_id)
            .ok_or(PoolError::AttemptNotFound { execution_id: *execution_id })?;
        if attempt.status != PurchaseStatus::Executing {
            return Err(PoolError::InvalidStatus {
                expected: PurchaseStatus::Executing.as_str(),
                actual: attempt.status.as_str(),
            });
        }
        Ok(attempt)
    }

    pub fn attempt(&self, execution_id: &ExecutionId) -> Option<&PurchaseAttempt> {
        self.attempts.get(execution_id)
    }

    pub fn commitment(&self, execution_id: &ExecutionId) -> Option<&CommitmentData> {
        self.commitments.get(execution_id)
    }

    pub fn is_target_processed(&self, target: &TargetId) -> bool {
        self.processed_targets.contains(target)
    }

    pub fn is_finalized(&self, execution_id: &ExecutionId) -> bool {
        self.finalized.contains(execution_id)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LiquidationProtocol;

    const KEEPER: Address = [9u8; 32];
    const ASSET: AssetId = [3u8; 32];

    fn reveal() -> RevealData {
        RevealData {
            protocol: LiquidationProtocol::Aave,
            target: [7u8; 32],
            borrower: [8u8; 32],
            collateral_asset: [4u8; 32],
            debt_asset: ASSET,
            debt_to_cover: 100_000,
            min_collateral_out: 90_000,
        }
    }

    fn salt() -> [u8; 32] {
        [0xAB; 32]
    }

    fn commit(book: &mut PurchaseBook) -> ExecutionId {
        let commitment = compute_commitment(&reveal(), &salt()).unwrap();
        book.attempt_purchase(KEEPER, reveal().target, ASSET, commitment, 100_000, 100, 1_000)
            .unwrap()
    }

    #[test]
    fn commitment_binds_every_field_and_the_salt() {
        let base = compute_commitment(&reveal(), &salt()).unwrap();

        let mut other = reveal();
        other.debt_to_cover += 1;
        assert_ne!(base, compute_commitment(&other, &salt()).unwrap());
        assert_ne!(base, compute_commitment(&reveal(), &[0xAC; 32]).unwrap());
    }

    #[test]
    fn commit_reveal_complete_happy_path() {
        let mut book = PurchaseBook::new();
        let id = commit(&mut book);

        assert_eq!(book.attempt(&id).unwrap().status, PurchaseStatus::Pending);
        assert!(book.is_target_processed(&reveal().target));

        let attempt = book.begin_execution(&id, &reveal(), &salt(), 101).unwrap();
        assert_eq!(attempt.status, PurchaseStatus::Executing);
        assert_eq!(attempt.reserved, 100_000);
        assert!(book.commitment(&id).unwrap().revealed);

        book.complete(&id).unwrap();
        assert_eq!(book.attempt(&id).unwrap().status, PurchaseStatus::Completed);
    }

    #[test]
    fn same_target_cannot_be_committed_twice() {
        let mut book = PurchaseBook::new();
        commit(&mut book);

        let commitment = compute_commitment(&reveal(), &[0xCD; 32]).unwrap();
        let result = book.attempt_purchase(
            KEEPER,
            reveal().target,
            ASSET,
            commitment,
            50_000,
            105,
            1_050,
        );
        assert!(matches!(result, Err(PoolError::TargetAlreadyProcessed { .. })));
    }

    #[test]
    fn execution_ids_never_collide() {
        let mut book = PurchaseBook::new();
        let commitment = compute_commitment(&reveal(), &salt()).unwrap();
        // Same commitment, same timestamp, different targets: the
        // nonce keeps the ids apart
        let a = book
            .attempt_purchase(KEEPER, [1u8; 32], ASSET, commitment, 1, 100, 1_000)
            .unwrap();
        let b = book
            .attempt_purchase(KEEPER, [2u8; 32], ASSET, commitment, 1, 100, 1_000)
            .unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_reveal_is_rejected_without_side_effects() {
        let mut book = PurchaseBook::new();
        let id = commit(&mut book);

        let mut wrong = reveal();
        wrong.debt_to_cover += 1;
        let result = book.begin_execution(&id, &wrong, &salt(), 101);
        assert!(matches!(result, Err(PoolError::CommitmentMismatch { .. })));

        // Nothing moved: still pending, unrevealed, not finalized
        assert_eq!(book.attempt(&id).unwrap().status, PurchaseStatus::Pending);
        assert!(!book.commitment(&id).unwrap().revealed);
        assert!(!book.is_finalized(&id));

        // The honest reveal still works afterwards
        book.begin_execution(&id, &reveal(), &salt(), 102).unwrap();
    }

    #[test]
    fn wrong_salt_is_rejected() {
        let mut book = PurchaseBook::new();
        let id = commit(&mut book);
        let result = book.begin_execution(&id, &reveal(), &[0xFF; 32], 101);
        assert!(matches!(result, Err(PoolError::CommitmentMismatch { .. })));
    }

    #[test]
    fn reveal_in_commit_block_is_too_early() {
        let mut book = PurchaseBook::new();
        let id = commit(&mut book);
        let result = book.begin_execution(&id, &reveal(), &salt(), 100);
        assert!(matches!(result, Err(PoolError::RevealTooEarly { .. })));
    }

    #[test]
    fn reveal_after_the_window_is_expired() {
        let mut book = PurchaseBook::new();
        let id = commit(&mut book);
        let result =
            book.begin_execution(&id, &reveal(), &salt(), 100 + COMMIT_WINDOW_BLOCKS + 1);
        assert!(matches!(result, Err(PoolError::CommitmentExpired { .. })));
        // Last block of the window still reveals
        book.begin_execution(&id, &reveal(), &salt(), 100 + COMMIT_WINDOW_BLOCKS)
            .unwrap();
    }

    #[test]
    fn second_reveal_hits_the_finalized_guard() {
        let mut book = PurchaseBook::new();
        let id = commit(&mut book);
        book.begin_execution(&id, &reveal(), &salt(), 101).unwrap();

        let result = book.begin_execution(&id, &reveal(), &salt(), 102);
        assert!(matches!(result, Err(PoolError::AlreadyFinalized { .. })));
    }

    #[test]
    fn failure_releases_the_reservation_and_keeps_the_target() {
        let mut book = PurchaseBook::new();
        let id = commit(&mut book);
        book.begin_execution(&id, &reveal(), &salt(), 101).unwrap();

        let released = book.fail(&id).unwrap();
        assert_eq!(released, 100_000);
        assert_eq!(book.attempt(&id).unwrap().status, PurchaseStatus::Failed);
        // Replay guard survives the failure
        assert!(book.is_target_processed(&reveal().target));
        // A failed attempt cannot be completed
        assert!(matches!(book.complete(&id), Err(PoolError::InvalidStatus { .. })));
    }

    #[test]
    fn keeper_can_cancel_only_while_pending() {
        let mut book = PurchaseBook::new();
        let id = commit(&mut book);

        // Someone else cannot cancel
        let other = [1u8; 32];
        assert!(matches!(
            book.cancel(&id, &other),
            Err(PoolError::Unauthorized { .. })
        ));

        let released = book.cancel(&id, &KEEPER).unwrap();
        assert_eq!(released, 100_000);
        assert_eq!(book.attempt(&id).unwrap().status, PurchaseStatus::Cancelled);

        // Cancelled attempts cannot be revealed
        let result = book.begin_execution(&id, &reveal(), &salt(), 101);
        assert!(matches!(result, Err(PoolError::InvalidStatus { .. })));
    }

    #[test]
    fn cancel_after_execution_began_is_rejected() {
        let mut book = PurchaseBook::new();
        let id = commit(&mut book);
        book.begin_execution(&id, &reveal(), &salt(), 101).unwrap();

        let result = book.cancel(&id, &KEEPER);
        assert!(matches!(result, Err(PoolError::InvalidStatus { .. })));
    }
}
