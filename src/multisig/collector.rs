//! Signature collection
//!
//! Validates and records member signatures. Each attempt reads the latest
//! proposal, checks every precondition against it, appends the signature,
//! recomputes the status and writes back with compare-and-swap. A lost race
//! restarts the whole attempt, so the checks always see the newest record.

use crate::multisig::error::MultisigError;
use crate::multisig::proposal::{Proposal, ProposalStatus, Signature};
use crate::multisig::store::{CasError, ProposalStore};
use crate::multisig::threshold;
use std::sync::Arc;

/// Upper bound on compare-and-swap attempts per operation
pub const MAX_CAS_ATTEMPTS: usize = 64;

/// Records member signatures against proposals
#[derive(Debug, Clone)]
pub struct SignatureCollector {
    store: Arc<ProposalStore>,
}

impl SignatureCollector {
    pub fn new(store: Arc<ProposalStore>) -> Self {
        Self { store }
    }

    /// Add `signer`'s signature to a proposal
    ///
    /// Checks, in order: the proposal exists, it is `Pending` or `Approved`,
    /// the signer is a wallet member, and the signer has not signed yet.
    pub async fn sign_proposal(
        &self,
        proposal_id: &str,
        signer: &str,
        signature: &str,
    ) -> Result<Proposal, MultisigError> {
        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let proposal = self.store.get_proposal(proposal_id).await?;

            if !proposal.status.accepts_signatures() {
                return Err(MultisigError::forbidden_in(proposal.status, "sign"));
            }

            let wallet = self.store.registry().get_wallet(&proposal.wallet_id).await?;

            if !wallet.is_member(signer) {
                return Err(MultisigError::NotAMember(signer.to_string()));
            }

            if proposal.has_signed(signer) {
                return Err(MultisigError::AlreadySigned(signer.to_string()));
            }

            if signature.trim().is_empty() {
                return Err(MultisigError::EmptySignature);
            }

            let expected_version = proposal.version;
            let previous_status = proposal.status;

            let mut updated = proposal;
            updated
                .signatures
                .push(Signature::new(proposal_id, signer, signature));
            debug_assert!(updated.signatures.len() <= wallet.member_count());
            updated.status = threshold::evaluate(&updated, &wallet);

            match self.store.compare_and_swap(updated, expected_version).await {
                Ok(stored) => {
                    log::info!(
                        "Proposal {} signed by {} ({}/{})",
                        proposal_id,
                        signer,
                        stored.signature_count(),
                        wallet.threshold
                    );
                    if previous_status == ProposalStatus::Pending
                        && stored.status == ProposalStatus::Approved
                    {
                        log::info!("Proposal {} reached its threshold and is approved", proposal_id);
                    }
                    return Ok(stored);
                }
                Err(CasError::Conflict { expected, actual }) => {
                    log::debug!(
                        "Signing {} lost a race (attempt {}, version {} != {}), retrying",
                        proposal_id,
                        attempt,
                        expected,
                        actual
                    );
                    tokio::task::yield_now().await;
                }
                Err(CasError::Missing) => {
                    return Err(MultisigError::ProposalNotFound(proposal_id.to_string()));
                }
            }
        }

        Err(MultisigError::Contention(proposal_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;
    use crate::multisig::registry::WalletRegistry;
    use crate::multisig::wallet::MultisigWallet;

    async fn setup(n: usize, threshold: usize) -> (SignatureCollector, Arc<ProposalStore>, MultisigWallet) {
        let registry = Arc::new(WalletRegistry::new());
        let members: Vec<String> = (0..n).map(|_| KeyPair::generate().address()).collect();
        let wallet = registry.create_wallet("Ops", members, threshold).await.unwrap();
        let store = Arc::new(ProposalStore::new(registry));
        (SignatureCollector::new(store.clone()), store, wallet)
    }

    #[tokio::test]
    async fn test_signing_crosses_threshold() {
        let (collector, store, wallet) = setup(3, 2).await;
        let proposal = store
            .create_proposal(&wallet.id, "pay", &wallet.members[0], None)
            .await
            .unwrap();

        let p = collector
            .sign_proposal(&proposal.id, &wallet.members[0], "sig-a")
            .await
            .unwrap();
        assert_eq!(p.status, ProposalStatus::Pending);
        assert_eq!(p.signature_count(), 1);

        let p = collector
            .sign_proposal(&proposal.id, &wallet.members[1], "sig-b")
            .await
            .unwrap();
        assert_eq!(p.status, ProposalStatus::Approved);

        // Extra signatures are tolerated and leave the status alone
        let p = collector
            .sign_proposal(&proposal.id, &wallet.members[2], "sig-c")
            .await
            .unwrap();
        assert_eq!(p.status, ProposalStatus::Approved);
        assert_eq!(p.signature_count(), 3);
        assert_eq!(p.version, 3);
    }

    #[tokio::test]
    async fn test_precondition_order() {
        let (collector, store, wallet) = setup(3, 2).await;
        let outsider = KeyPair::generate().address();

        // 1. missing proposal wins over everything else
        let err = collector.sign_proposal("missing", &outsider, "").await.unwrap_err();
        assert!(matches!(err, MultisigError::ProposalNotFound(_)));

        let proposal = store
            .create_proposal(&wallet.id, "pay", &wallet.members[0], None)
            .await
            .unwrap();

        // 3. non-member
        let err = collector.sign_proposal(&proposal.id, &outsider, "sig").await.unwrap_err();
        assert!(matches!(err, MultisigError::NotAMember(_)));

        // 4. duplicate
        collector
            .sign_proposal(&proposal.id, &wallet.members[0], "sig")
            .await
            .unwrap();
        let err = collector
            .sign_proposal(&proposal.id, &wallet.members[0], "sig")
            .await
            .unwrap_err();
        assert!(matches!(err, MultisigError::AlreadySigned(_)));

        // 2. terminal status beats membership
        let mut cancelled = store.get_proposal(&proposal.id).await.unwrap();
        let version = cancelled.version;
        cancelled.status = ProposalStatus::Cancelled;
        store.compare_and_swap(cancelled, version).await.unwrap();

        let err = collector.sign_proposal(&proposal.id, &outsider, "sig").await.unwrap_err();
        assert!(matches!(
            err,
            MultisigError::InvalidState {
                status: ProposalStatus::Cancelled,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_rejected_and_executing_refuse_signatures() {
        let (collector, store, wallet) = setup(3, 2).await;

        for (status, executing) in [(ProposalStatus::Rejected, false), (ProposalStatus::Executing, true)] {
            let mut proposal = store
                .create_proposal(&wallet.id, "pay", &wallet.members[0], None)
                .await
                .unwrap();
            proposal.status = status;
            store.compare_and_swap(proposal.clone(), 0).await.unwrap();

            let err = collector
                .sign_proposal(&proposal.id, &wallet.members[1], "sig")
                .await
                .unwrap_err();
            if executing {
                assert!(matches!(err, MultisigError::ExecutionInProgress));
            } else {
                assert!(matches!(err, MultisigError::InvalidState { .. }));
            }
        }
    }

    #[tokio::test]
    async fn test_empty_signature_rejected() {
        let (collector, store, wallet) = setup(2, 1).await;
        let proposal = store
            .create_proposal(&wallet.id, "pay", &wallet.members[0], None)
            .await
            .unwrap();

        let err = collector
            .sign_proposal(&proposal.id, &wallet.members[1], "  ")
            .await
            .unwrap_err();
        assert!(matches!(err, MultisigError::EmptySignature));
        assert_eq!(store.get_proposal(&proposal.id).await.unwrap().version, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_signers_lose_nothing() {
        let (collector, store, wallet) = setup(10, 6).await;
        let proposal = store
            .create_proposal(&wallet.id, "pay", &wallet.members[0], None)
            .await
            .unwrap();

        let handles: Vec<_> = wallet
            .members
            .iter()
            .cloned()
            .map(|member| {
                let collector = collector.clone();
                let id = proposal.id.clone();
                tokio::spawn(async move { collector.sign_proposal(&id, &member, "sig").await })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let stored = store.get_proposal(&proposal.id).await.unwrap();
        assert_eq!(stored.signature_count(), 10);
        assert_eq!(stored.status, ProposalStatus::Approved);
        assert_eq!(stored.version, 10);

        let mut signers = stored.signed_by();
        signers.sort();
        signers.dedup();
        assert_eq!(signers.len(), 10);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_same_signer_racing_records_once() {
        let (collector, store, wallet) = setup(3, 2).await;
        let proposal = store
            .create_proposal(&wallet.id, "pay", &wallet.members[0], None)
            .await
            .unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let collector = collector.clone();
                let id = proposal.id.clone();
                let member = wallet.members[1].clone();
                tokio::spawn(async move { collector.sign_proposal(&id, &member, "sig").await })
            })
            .collect();

        let mut ok = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => ok += 1,
                Err(e) => assert!(matches!(e, MultisigError::AlreadySigned(_))),
            }
        }

        assert_eq!(ok, 1);
        assert_eq!(store.get_proposal(&proposal.id).await.unwrap().signature_count(), 1);
    }
}
