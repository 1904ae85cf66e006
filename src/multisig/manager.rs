//! Multi-signature wallet and proposal manager
//!
//! Single entry point composing the registry, proposal store, signature
//! collector, execution coordinator and cancellation guard.

use crate::multisig::cancel::CancellationGuard;
use crate::multisig::collector::SignatureCollector;
use crate::multisig::error::MultisigError;
use crate::multisig::executor::{ActionExecutor, ExecutionCoordinator, LocalSettlement};
use crate::multisig::proposal::{Proposal, ProposalStatus, Signature};
use crate::multisig::registry::WalletRegistry;
use crate::multisig::store::ProposalStore;
use crate::multisig::threshold;
use crate::multisig::wallet::MultisigWallet;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Persisted form of the manager: three collections keyed by id
///
/// Proposals reference wallets by `wallet_id`; signatures reference
/// proposals by `proposal_id`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MultisigSnapshot {
    pub wallets: Vec<MultisigWallet>,
    pub proposals: Vec<Proposal>,
    pub signatures: Vec<Signature>,
}

/// Manager for multisig wallets and their proposals
#[derive(Clone)]
pub struct MultisigManager {
    registry: Arc<WalletRegistry>,
    store: Arc<ProposalStore>,
    collector: SignatureCollector,
    coordinator: ExecutionCoordinator,
    guard: CancellationGuard,
}

impl MultisigManager {
    /// Create an empty manager executing through `executor`
    pub fn new(executor: Arc<dyn ActionExecutor>) -> Self {
        let registry = Arc::new(WalletRegistry::new());
        let store = Arc::new(ProposalStore::new(registry.clone()));
        Self::assemble(registry, store, executor)
    }

    /// Create an empty manager settling through [`LocalSettlement`]
    pub fn with_local_settlement() -> Self {
        Self::new(Arc::new(LocalSettlement))
    }

    /// Rebuild a manager from a persisted snapshot
    pub fn from_snapshot(snapshot: MultisigSnapshot, executor: Arc<dyn ActionExecutor>) -> Self {
        let MultisigSnapshot {
            wallets,
            mut proposals,
            signatures,
        } = snapshot;

        let wallets_by_id: HashMap<String, MultisigWallet> = wallets
            .iter()
            .map(|w| (w.id.clone(), w.clone()))
            .collect();
        proposals.retain(|p| {
            let known = wallets_by_id.contains_key(&p.wallet_id);
            if !known {
                log::warn!("Dropping proposal {} of unknown wallet {}", p.id, p.wallet_id);
            }
            known
        });

        let mut by_proposal: HashMap<String, Vec<Signature>> = HashMap::new();
        for sig in signatures {
            by_proposal.entry(sig.proposal_id.clone()).or_default().push(sig);
        }

        for proposal in &mut proposals {
            let Some(wallet) = wallets_by_id.get(&proposal.wallet_id) else {
                continue;
            };
            let attached = by_proposal.remove(&proposal.id).unwrap_or_default();
            proposal.signatures = valid_signatures(&proposal.id, wallet, attached);

            let status = threshold::evaluate(proposal, wallet);
            if status != proposal.status {
                log::warn!(
                    "Proposal {} restored as {} (saved as {}) after signature checks",
                    proposal.id,
                    status,
                    proposal.status
                );
                proposal.status = status;
            }
        }

        for orphan in by_proposal.keys() {
            log::warn!("Dropping signatures of unknown proposal {}", orphan);
        }

        let registry = Arc::new(WalletRegistry::from_wallets(wallets));
        let store = Arc::new(ProposalStore::from_proposals(registry.clone(), proposals));
        Self::assemble(registry, store, executor)
    }

    fn assemble(
        registry: Arc<WalletRegistry>,
        store: Arc<ProposalStore>,
        executor: Arc<dyn ActionExecutor>,
    ) -> Self {
        Self {
            collector: SignatureCollector::new(store.clone()),
            coordinator: ExecutionCoordinator::new(store.clone(), executor),
            guard: CancellationGuard::new(store.clone()),
            registry,
            store,
        }
    }

    /// Capture the current state for persistence
    pub async fn snapshot(&self) -> MultisigSnapshot {
        let wallets = self.registry.list_wallets().await;
        let mut proposals = self.store.all_proposals().await;

        let mut signatures = Vec::new();
        for proposal in &mut proposals {
            signatures.append(&mut proposal.signatures);
        }

        MultisigSnapshot {
            wallets,
            proposals,
            signatures,
        }
    }

    /// Create a new multisig wallet
    pub async fn create_wallet(
        &self,
        name: &str,
        members: Vec<String>,
        threshold: usize,
    ) -> Result<MultisigWallet, MultisigError> {
        self.registry.create_wallet(name, members, threshold).await
    }

    /// Get a wallet by id
    pub async fn get_wallet(&self, wallet_id: &str) -> Result<MultisigWallet, MultisigError> {
        self.registry.get_wallet(wallet_id).await
    }

    /// Get a wallet by id, falling back to its address
    pub async fn find_wallet(&self, id_or_address: &str) -> Result<MultisigWallet, MultisigError> {
        match self.registry.get_wallet(id_or_address).await {
            Ok(wallet) => Ok(wallet),
            Err(_) => self.registry.get_by_address(id_or_address).await,
        }
    }

    /// List all wallets, oldest first
    pub async fn list_wallets(&self) -> Vec<MultisigWallet> {
        self.registry.list_wallets().await
    }

    /// Record an advisory balance for a wallet
    pub async fn set_cached_balance(
        &self,
        wallet_id: &str,
        balance: u64,
    ) -> Result<(), MultisigError> {
        self.registry.set_cached_balance(wallet_id, balance).await
    }

    /// Create a proposal on a wallet
    pub async fn create_proposal(
        &self,
        wallet_id: &str,
        action_payload: &str,
        created_by: &str,
        description: Option<String>,
    ) -> Result<Proposal, MultisigError> {
        self.store
            .create_proposal(wallet_id, action_payload, created_by, description)
            .await
    }

    /// Get a proposal by id
    pub async fn get_proposal(&self, proposal_id: &str) -> Result<Proposal, MultisigError> {
        self.store.get_proposal(proposal_id).await
    }

    /// List a wallet's proposals, newest first
    pub async fn list_proposals(
        &self,
        wallet_id: &str,
        status_filter: Option<ProposalStatus>,
    ) -> Result<Vec<Proposal>, MultisigError> {
        self.registry.get_wallet(wallet_id).await?;
        Ok(self.store.list_proposals(wallet_id, status_filter).await)
    }

    /// Record a member signature
    pub async fn sign_proposal(
        &self,
        proposal_id: &str,
        signer: &str,
        signature: &str,
    ) -> Result<Proposal, MultisigError> {
        self.collector.sign_proposal(proposal_id, signer, signature).await
    }

    /// Execute an approved proposal
    pub async fn execute_proposal(&self, proposal_id: &str) -> Result<String, MultisigError> {
        self.coordinator.execute_proposal(proposal_id).await
    }

    /// Cancel a pending proposal
    pub async fn cancel_proposal(
        &self,
        proposal_id: &str,
        requestor: &str,
    ) -> Result<Proposal, MultisigError> {
        self.guard.cancel_proposal(proposal_id, requestor).await
    }

    /// Get wallet count
    pub async fn wallet_count(&self) -> usize {
        self.registry.wallet_count().await
    }

    /// Get proposal count
    pub async fn proposal_count(&self) -> usize {
        self.store.proposal_count().await
    }
}

impl Default for MultisigManager {
    fn default() -> Self {
        Self::with_local_settlement()
    }
}

/// Keep signatures by members, one per signer, in their saved order
fn valid_signatures(
    proposal_id: &str,
    wallet: &MultisigWallet,
    signatures: Vec<Signature>,
) -> Vec<Signature> {
    let mut seen = HashSet::new();
    signatures
        .into_iter()
        .filter(|sig| {
            if !wallet.is_member(&sig.signer) {
                log::warn!(
                    "Dropping signature on {} by non-member {}",
                    proposal_id,
                    sig.signer
                );
                return false;
            }
            if !seen.insert(sig.signer.clone()) {
                log::warn!(
                    "Dropping repeated signature on {} by {}",
                    proposal_id,
                    sig.signer
                );
                return false;
            }
            true
        })
        .collect()
}
