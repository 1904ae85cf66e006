//! Proposal execution
//!
//! Execution is claim, act, finalize:
//! 1. compare-and-swap `Approved -> Executing` (only one caller can win)
//! 2. submit the action through the [`ActionExecutor`] backend
//! 3. compare-and-swap `Executing -> Executed`, or back to `Approved` if the
//!    backend failed
//!
//! Nothing else mutates an `Executing` proposal, so the winner of step 1 is
//! the only caller that ever submits the action.

use crate::crypto::double_sha256_hex;
use crate::multisig::collector::MAX_CAS_ATTEMPTS;
use crate::multisig::error::MultisigError;
use crate::multisig::proposal::{Proposal, ProposalStatus};
use crate::multisig::store::{CasError, ProposalStore};
use crate::multisig::wallet::MultisigWallet;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;

/// Errors reported by an action backend
#[derive(Error, Debug)]
pub enum ActionError {
    #[error("Backend rejected action: {0}")]
    Rejected(String),
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

/// Backend that carries out an approved proposal's action
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// Submit the action and return its reference (e.g. a transaction id)
    async fn submit(
        &self,
        proposal: &Proposal,
        wallet: &MultisigWallet,
    ) -> Result<String, ActionError>;
}

/// Settles actions locally by deriving a deterministic transaction reference
///
/// reference = DoubleSHA256(signing data || "signer:signature" for each signature)
#[derive(Debug, Default, Clone)]
pub struct LocalSettlement;

#[async_trait]
impl ActionExecutor for LocalSettlement {
    async fn submit(
        &self,
        proposal: &Proposal,
        wallet: &MultisigWallet,
    ) -> Result<String, ActionError> {
        if proposal.signature_count() < wallet.threshold as usize {
            return Err(ActionError::Rejected(format!(
                "{} signatures do not satisfy {}",
                proposal.signature_count(),
                wallet.description()
            )));
        }

        let mut data = proposal.signing_data();
        for sig in &proposal.signatures {
            data.extend_from_slice(format!("{}:{}", sig.signer, sig.signature).as_bytes());
        }

        Ok(double_sha256_hex(&data))
    }
}

/// Coordinates at-most-once execution of approved proposals
#[derive(Clone)]
pub struct ExecutionCoordinator {
    store: Arc<ProposalStore>,
    executor: Arc<dyn ActionExecutor>,
}

impl ExecutionCoordinator {
    pub fn new(store: Arc<ProposalStore>, executor: Arc<dyn ActionExecutor>) -> Self {
        Self { store, executor }
    }

    /// Execute an approved proposal, returning the execution reference
    ///
    /// # Errors
    /// - `InsufficientSignatures` while still `Pending`
    /// - `ExecutionInProgress` if another caller holds the claim
    /// - `AlreadyExecuted` / `InvalidState` for terminal proposals
    /// - `ExecutionFailed` if the backend failed; the proposal is `Approved`
    ///   again and the call can be retried
    pub async fn execute_proposal(&self, proposal_id: &str) -> Result<String, MultisigError> {
        let (claimed, wallet) = self.claim(proposal_id).await?;

        log::info!("Proposal {} claimed for execution", proposal_id);

        match self.executor.submit(&claimed, &wallet).await {
            Ok(reference) => {
                let finished = self
                    .finish(proposal_id, |p| {
                        p.status = ProposalStatus::Executed;
                        p.executed_at = Some(Utc::now());
                        p.execution_reference = Some(reference.clone());
                    })
                    .await;
                let stored = match finished {
                    Ok(stored) => stored,
                    Err(e) => {
                        log::error!(
                            "Proposal {} was submitted as {} but could not be marked executed: {}",
                            proposal_id,
                            reference,
                            e
                        );
                        return Err(e);
                    }
                };
                log::info!("Proposal {} executed: {}", proposal_id, reference);
                debug_assert_eq!(stored.execution_reference.as_deref(), Some(reference.as_str()));
                Ok(reference)
            }
            Err(e) => {
                log::warn!("Execution of proposal {} failed: {}", proposal_id, e);
                self.finish(proposal_id, |p| p.status = ProposalStatus::Approved)
                    .await?;
                log::info!("Proposal {} reverted to Approved", proposal_id);
                Err(MultisigError::ExecutionFailed(e.to_string()))
            }
        }
    }

    /// Move an `Approved` proposal to `Executing`
    async fn claim(&self, proposal_id: &str) -> Result<(Proposal, MultisigWallet), MultisigError> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let proposal = self.store.get_proposal(proposal_id).await?;
            let wallet = self.store.registry().get_wallet(&proposal.wallet_id).await?;

            match proposal.status {
                ProposalStatus::Approved => {}
                ProposalStatus::Pending => {
                    return Err(MultisigError::InsufficientSignatures {
                        have: proposal.signature_count(),
                        need: wallet.threshold,
                    });
                }
                status => return Err(MultisigError::forbidden_in(status, "execute")),
            }

            let expected_version = proposal.version;
            let mut claimed = proposal;
            claimed.status = ProposalStatus::Executing;

            match self.store.compare_and_swap(claimed, expected_version).await {
                Ok(stored) => return Ok((stored, wallet)),
                // Someone changed the record first; re-read and re-check
                Err(CasError::Conflict { .. }) => tokio::task::yield_now().await,
                Err(CasError::Missing) => {
                    return Err(MultisigError::ProposalNotFound(proposal_id.to_string()))
                }
            }
        }

        Err(MultisigError::Contention(proposal_id.to_string()))
    }

    /// Apply `update` to a proposal this coordinator holds the claim on
    async fn finish<F>(&self, proposal_id: &str, update: F) -> Result<Proposal, MultisigError>
    where
        F: Fn(&mut Proposal),
    {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let mut proposal = self.store.get_proposal(proposal_id).await?;
            if proposal.status != ProposalStatus::Executing {
                log::error!(
                    "Proposal {} left Executing while claimed (now {})",
                    proposal_id,
                    proposal.status
                );
                return Err(MultisigError::forbidden_in(proposal.status, "finalize"));
            }

            let expected_version = proposal.version;
            update(&mut proposal);

            match self.store.compare_and_swap(proposal, expected_version).await {
                Ok(stored) => return Ok(stored),
                Err(CasError::Conflict { .. }) => tokio::task::yield_now().await,
                Err(CasError::Missing) => {
                    return Err(MultisigError::ProposalNotFound(proposal_id.to_string()))
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
    use crate::multisig::collector::SignatureCollector;
    use crate::multisig::registry::WalletRegistry;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Fails the first `failures` submissions, counts every call
    #[derive(Default)]
    struct ScriptedBackend {
        failures: AtomicUsize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ActionExecutor for ScriptedBackend {
        async fn submit(
            &self,
            proposal: &Proposal,
            _wallet: &MultisigWallet,
        ) -> Result<String, ActionError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;

            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(ActionError::Unavailable("node timeout".to_string()));
            }
            Ok(format!("tx-{}-{}", proposal.id, call))
        }
    }

    async fn approved_proposal(
        backend: Arc<dyn ActionExecutor>,
    ) -> (ExecutionCoordinator, Arc<ProposalStore>, Proposal) {
        let registry = Arc::new(WalletRegistry::new());
        let members: Vec<String> = (0..3).map(|_| KeyPair::generate().address()).collect();
        let wallet = registry.create_wallet("Ops", members, 2).await.unwrap();
        let store = Arc::new(ProposalStore::new(registry));
        let collector = SignatureCollector::new(store.clone());

        let proposal = store
            .create_proposal(&wallet.id, "pay", &wallet.members[0], None)
            .await
            .unwrap();
        collector.sign_proposal(&proposal.id, &wallet.members[0], "a").await.unwrap();
        let proposal = collector
            .sign_proposal(&proposal.id, &wallet.members[1], "b")
            .await
            .unwrap();
        assert_eq!(proposal.status, ProposalStatus::Approved);

        (ExecutionCoordinator::new(store.clone(), backend), store, proposal)
    }

    #[tokio::test]
    async fn test_execute_approved() {
        let (coordinator, store, proposal) = approved_proposal(Arc::new(LocalSettlement)).await;

        let reference = coordinator.execute_proposal(&proposal.id).await.unwrap();
        assert_eq!(reference.len(), 64);

        let stored = store.get_proposal(&proposal.id).await.unwrap();
        assert_eq!(stored.status, ProposalStatus::Executed);
        assert_eq!(stored.execution_reference, Some(reference));
        assert!(stored.executed_at.is_some());

        let err = coordinator.execute_proposal(&proposal.id).await.unwrap_err();
        assert!(matches!(err, MultisigError::AlreadyExecuted));
    }

    /// Submits successfully but moves the proposal out of `Executing` first
    #[derive(Default)]
    struct InterferingBackend {
        store: std::sync::OnceLock<Arc<ProposalStore>>,
    }

    #[async_trait]
    impl ActionExecutor for InterferingBackend {
        async fn submit(
            &self,
            proposal: &Proposal,
            _wallet: &MultisigWallet,
        ) -> Result<String, ActionError> {
            let store = self.store.get().expect("store attached");
            let mut current = store.get_proposal(&proposal.id).await.unwrap();
            let version = current.version;
            current.status = ProposalStatus::Approved;
            store.compare_and_swap(current, version).await.unwrap();
            Ok("tx-submitted".to_string())
        }
    }

    #[tokio::test]
    async fn test_finalize_failure_is_reported_not_swallowed() {
        let backend = Arc::new(InterferingBackend::default());
        let (coordinator, store, proposal) = approved_proposal(backend.clone()).await;
        backend.store.set(store.clone()).ok();

        let err = coordinator.execute_proposal(&proposal.id).await.unwrap_err();
        assert!(matches!(
            err,
            MultisigError::InvalidState {
                status: ProposalStatus::Approved,
                action: "finalize"
            }
        ));

        let stored = store.get_proposal(&proposal.id).await.unwrap();
        assert_eq!(stored.execution_reference, None);
    }

    #[tokio::test]
    async fn test_pending_cannot_execute() {
        let registry = Arc::new(WalletRegistry::new());
        let members: Vec<String> = (0..3).map(|_| KeyPair::generate().address()).collect();
        let wallet = registry.create_wallet("Ops", members, 2).await.unwrap();
        let store = Arc::new(ProposalStore::new(registry));
        let coordinator = ExecutionCoordinator::new(store.clone(), Arc::new(LocalSettlement));

        let proposal = store
            .create_proposal(&wallet.id, "pay", &wallet.members[0], None)
            .await
            .unwrap();

        let err = coordinator.execute_proposal(&proposal.id).await.unwrap_err();
        assert!(matches!(
            err,
            MultisigError::InsufficientSignatures { have: 0, need: 2 }
        ));
        assert!(matches!(
            coordinator.execute_proposal("missing").await,
            Err(MultisigError::ProposalNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_failure_reverts_and_retry_succeeds() {
        let backend = Arc::new(ScriptedBackend {
            failures: AtomicUsize::new(1),
            ..Default::default()
        });
        let (coordinator, store, proposal) = approved_proposal(backend.clone()).await;

        let err = coordinator.execute_proposal(&proposal.id).await.unwrap_err();
        assert!(matches!(err, MultisigError::ExecutionFailed(_)));

        let stored = store.get_proposal(&proposal.id).await.unwrap();
        assert_eq!(stored.status, ProposalStatus::Approved);
        assert!(stored.execution_reference.is_none());

        let reference = coordinator.execute_proposal(&proposal.id).await.unwrap();
        let stored = store.get_proposal(&proposal.id).await.unwrap();
        assert_eq!(stored.status, ProposalStatus::Executed);
        assert_eq!(stored.execution_reference, Some(reference));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_execution_is_at_most_once() {
        let backend = Arc::new(ScriptedBackend::default());
        let (coordinator, store, proposal) = approved_proposal(backend.clone()).await;

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let coordinator = coordinator.clone();
                let id = proposal.id.clone();
                tokio::spawn(async move { coordinator.execute_proposal(&id).await })
            })
            .collect();

        let mut references = Vec::new();
        for handle in handles {
            match handle.await.unwrap() {
                Ok(reference) => references.push(reference),
                Err(e) => assert_eq!(e.kind(), crate::multisig::ErrorKind::State),
            }
        }

        assert_eq!(references.len(), 1);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        let stored = store.get_proposal(&proposal.id).await.unwrap();
        assert_eq!(stored.execution_reference.as_ref(), Some(&references[0]));
    }

    #[tokio::test]
    async fn test_local_settlement_is_deterministic() {
        let (_, store, proposal) = approved_proposal(Arc::new(LocalSettlement)).await;
        let wallet = store.registry().get_wallet(&proposal.wallet_id).await.unwrap();

        let a = LocalSettlement.submit(&proposal, &wallet).await.unwrap();
        let b = LocalSettlement.submit(&proposal, &wallet).await.unwrap();
        assert_eq!(a, b);

        let mut short = proposal.clone();
        short.signatures.truncate(1);
        assert!(LocalSettlement.submit(&short, &wallet).await.is_err());
    }
}
