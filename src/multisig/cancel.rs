//! Proposal cancellation
//!
//! Only the creator may cancel, and only while the proposal is `Pending`.

use crate::multisig::collector::MAX_CAS_ATTEMPTS;
use crate::multisig::error::MultisigError;
use crate::multisig::proposal::{Proposal, ProposalStatus};
use crate::multisig::store::{CasError, ProposalStore};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct CancellationGuard {
    store: Arc<ProposalStore>,
}

impl CancellationGuard {
    pub fn new(store: Arc<ProposalStore>) -> Self {
        Self { store }
    }

    /// Cancel a pending proposal on behalf of its creator
    pub async fn cancel_proposal(
        &self,
        proposal_id: &str,
        requestor: &str,
    ) -> Result<Proposal, MultisigError> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let proposal = self.store.get_proposal(proposal_id).await?;

            if proposal.status != ProposalStatus::Pending {
                return Err(MultisigError::forbidden_in(proposal.status, "cancel"));
            }

            if proposal.created_by != requestor {
                return Err(MultisigError::NotCreator);
            }

            let expected_version = proposal.version;
            let mut cancelled = proposal;
            cancelled.status = ProposalStatus::Cancelled;

            match self.store.compare_and_swap(cancelled, expected_version).await {
                Ok(stored) => {
                    log::info!("Proposal {} cancelled by {}", proposal_id, requestor);
                    return Ok(stored);
                }
                Err(CasError::Conflict { .. }) => tokio::task::yield_now().await,
                Err(CasError::Missing) => {
                    return Err(MultisigError::ProposalNotFound(proposal_id.to_string()))
                }
            }
        }

        Err(MultisigError::Contention(proposal_id.to_string()))
    }
}
