//! Proposal store
//!
//! Proposals are versioned records. Readers get a snapshot; every mutation is
//! written back with [`ProposalStore::compare_and_swap`], which only succeeds
//! if nobody else wrote the record since it was read.

use crate::multisig::error::MultisigError;
use crate::multisig::proposal::{Proposal, ProposalStatus};
use crate::multisig::registry::WalletRegistry;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Outcome of a failed compare-and-swap
#[derive(Debug, PartialEq, Eq)]
pub enum CasError {
    /// The record changed since it was read
    Conflict { expected: u64, actual: u64 },
    /// The record does not exist
    Missing,
}

#[derive(Debug, Default)]
struct StoreInner {
    /// Proposals by id
    proposals: HashMap<String, Proposal>,
    /// Proposal ids in insertion order
    order: Vec<String>,
}

/// Store of proposals, scoped to registered wallets
#[derive(Debug)]
pub struct ProposalStore {
    registry: Arc<WalletRegistry>,
    inner: RwLock<StoreInner>,
}

impl ProposalStore {
    /// Create an empty store backed by `registry`
    pub fn new(registry: Arc<WalletRegistry>) -> Self {
        Self {
            registry,
            inner: RwLock::new(StoreInner::default()),
        }
    }

    /// Rebuild a store from persisted proposals
    pub fn from_proposals(registry: Arc<WalletRegistry>, mut proposals: Vec<Proposal>) -> Self {
        proposals.sort_by_key(|p| p.created_at);

        let mut inner = StoreInner::default();
        for proposal in proposals {
            if proposal.status == ProposalStatus::Executing {
                log::warn!(
                    "Proposal {} was mid-execution when last saved; outcome unknown, leaving it Executing",
                    proposal.id
                );
            }
            inner.order.push(proposal.id.clone());
            inner.proposals.insert(proposal.id.clone(), proposal);
        }

        Self {
            registry,
            inner: RwLock::new(inner),
        }
    }

    /// Create a new pending proposal
    ///
    /// # Errors
    /// `WalletNotFound` for an unknown wallet, `NotAMember` if `created_by`
    /// is not one of the wallet's members
    pub async fn create_proposal(
        &self,
        wallet_id: &str,
        action_payload: &str,
        created_by: &str,
        description: Option<String>,
    ) -> Result<Proposal, MultisigError> {
        let wallet = self.registry.get_wallet(wallet_id).await?;

        if !wallet.is_member(created_by) {
            return Err(MultisigError::NotAMember(created_by.to_string()));
        }

        let description = description.filter(|d| !d.trim().is_empty());
        let proposal = Proposal::new(wallet_id, action_payload, created_by, description);

        let mut inner = self.inner.write().await;
        inner.order.push(proposal.id.clone());
        inner.proposals.insert(proposal.id.clone(), proposal.clone());

        log::info!(
            "Proposal {} created on wallet {} by {}",
            proposal.id,
            wallet_id,
            created_by
        );

        Ok(proposal)
    }

    /// Get a snapshot of a proposal
    pub async fn get_proposal(&self, proposal_id: &str) -> Result<Proposal, MultisigError> {
        self.inner
            .read()
            .await
            .proposals
            .get(proposal_id)
            .cloned()
            .ok_or_else(|| MultisigError::ProposalNotFound(proposal_id.to_string()))
    }

    /// List proposals of a wallet, newest first
    ///
    /// Proposals created at the same instant are ordered by reverse
    /// insertion, so the most recently stored one comes first.
    pub async fn list_proposals(
        &self,
        wallet_id: &str,
        status_filter: Option<ProposalStatus>,
    ) -> Vec<Proposal> {
        let inner = self.inner.read().await;

        let mut proposals: Vec<Proposal> = inner
            .order
            .iter()
            .rev()
            .filter_map(|id| inner.proposals.get(id))
            .filter(|p| p.wallet_id == wallet_id)
            .filter(|p| status_filter.map_or(true, |status| p.status == status))
            .cloned()
            .collect();

        // Stable sort keeps reverse insertion order among equal timestamps
        proposals.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        proposals
    }

    /// All proposals, in insertion order
    pub async fn all_proposals(&self) -> Vec<Proposal> {
        let inner = self.inner.read().await;
        inner
            .order
            .iter()
            .filter_map(|id| inner.proposals.get(id))
            .cloned()
            .collect()
    }

    /// Write `proposal` back if the stored version is still `expected_version`
    ///
    /// On success the stored record carries `expected_version + 1` and is
    /// returned.
    pub async fn compare_and_swap(
        &self,
        mut proposal: Proposal,
        expected_version: u64,
    ) -> Result<Proposal, CasError> {
        let mut inner = self.inner.write().await;

        let current = inner
            .proposals
            .get_mut(&proposal.id)
            .ok_or(CasError::Missing)?;

        if current.version != expected_version {
            return Err(CasError::Conflict {
                expected: expected_version,
                actual: current.version,
            });
        }

        proposal.version = expected_version + 1;
        proposal.touch();
        *current = proposal.clone();

        Ok(proposal)
    }

    /// Get proposal count
    pub async fn proposal_count(&self) -> usize {
        self.inner.read().await.proposals.len()
    }

    /// The wallet registry this store validates against
    pub fn registry(&self) -> &Arc<WalletRegistry> {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;
    use crate::multisig::wallet::MultisigWallet;

    async fn setup() -> (ProposalStore, MultisigWallet) {
        let registry = Arc::new(WalletRegistry::new());
        let members: Vec<String> = (0..3).map(|_| KeyPair::generate().address()).collect();
        let wallet = registry.create_wallet("Ops", members, 2).await.unwrap();
        (ProposalStore::new(registry), wallet)
    }

    #[tokio::test]
    async fn test_create_proposal() {
        let (store, wallet) = setup().await;
        let creator = &wallet.members[0];

        let proposal = store
            .create_proposal(&wallet.id, "pay 5", creator, Some("rent".to_string()))
            .await
            .unwrap();

        assert_eq!(proposal.status, ProposalStatus::Pending);
        assert!(proposal.signatures.is_empty());
        assert_eq!(proposal.created_by, *creator);
        assert_eq!(store.get_proposal(&proposal.id).await.unwrap(), proposal);
    }

    #[tokio::test]
    async fn test_create_requires_member() {
        let (store, wallet) = setup().await;
        let outsider = KeyPair::generate().address();

        let result = store.create_proposal(&wallet.id, "pay 5", &outsider, None).await;
        assert!(matches!(result, Err(MultisigError::NotAMember(_))));

        let result = store
            .create_proposal("no-such-wallet", "pay 5", &wallet.members[0], None)
            .await;
        assert!(matches!(result, Err(MultisigError::WalletNotFound(_))));
        assert_eq!(store.proposal_count().await, 0);
    }

    #[tokio::test]
    async fn test_list_newest_first_with_filter() {
        let (store, wallet) = setup().await;
        let creator = &wallet.members[0];

        let first = store.create_proposal(&wallet.id, "a", creator, None).await.unwrap();
        let second = store.create_proposal(&wallet.id, "b", creator, None).await.unwrap();

        let listed: Vec<String> = store
            .list_proposals(&wallet.id, None)
            .await
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(listed, vec![second.id.clone(), first.id.clone()]);

        let mut cancelled = first.clone();
        cancelled.status = ProposalStatus::Cancelled;
        store.compare_and_swap(cancelled, first.version).await.unwrap();

        let pending = store
            .list_proposals(&wallet.id, Some(ProposalStatus::Pending))
            .await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, second.id);

        assert!(store.list_proposals("other", None).await.is_empty());
    }

    #[tokio::test]
    async fn test_compare_and_swap_detects_conflict() {
        let (store, wallet) = setup().await;
        let proposal = store
            .create_proposal(&wallet.id, "a", &wallet.members[0], None)
            .await
            .unwrap();

        let stale = proposal.clone();
        let updated = store.compare_and_swap(proposal, 0).await.unwrap();
        assert_eq!(updated.version, 1);

        let result = store.compare_and_swap(stale, 0).await;
        assert_eq!(
            result,
            Err(CasError::Conflict {
                expected: 0,
                actual: 1
            })
        );
    }

    #[tokio::test]
    async fn test_compare_and_swap_missing() {
        let (store, _) = setup().await;
        let ghost = Proposal::new("w", "p", "c", None);
        assert_eq!(store.compare_and_swap(ghost, 0).await, Err(CasError::Missing));
    }
}
