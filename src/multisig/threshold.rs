//! Threshold evaluation
//!
//! Derives a proposal's status from its signature count and the wallet
//! threshold. Pure: no I/O, no mutation.

use crate::multisig::proposal::{Proposal, ProposalStatus};
use crate::multisig::wallet::MultisigWallet;

/// Status a proposal should have given its current signatures
///
/// Terminal and `Executing` statuses are returned unchanged. Otherwise the
/// proposal is `Approved` once `threshold` signatures are collected and
/// `Pending` before that.
pub fn evaluate(proposal: &Proposal, wallet: &MultisigWallet) -> ProposalStatus {
    match proposal.status {
        ProposalStatus::Executing
        | ProposalStatus::Executed
        | ProposalStatus::Rejected
        | ProposalStatus::Cancelled => proposal.status,
        ProposalStatus::Pending | ProposalStatus::Approved => {
            if proposal.signature_count() >= wallet.threshold as usize {
                ProposalStatus::Approved
            } else {
                ProposalStatus::Pending
            }
        }
    }
}

/// Signatures still missing before the proposal can be approved
pub fn signatures_needed(proposal: &Proposal, wallet: &MultisigWallet) -> usize {
    (wallet.threshold as usize).saturating_sub(proposal.signature_count())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;
    use crate::multisig::proposal::Signature;
    use crate::multisig::wallet::MultisigConfig;

    fn wallet_2_of_3() -> MultisigWallet {
        let members: Vec<String> = (0..3).map(|_| KeyPair::generate().address()).collect();
        MultisigWallet::new(MultisigConfig::new("t", members, 2).unwrap())
    }

    fn with_signatures(wallet: &MultisigWallet, count: usize) -> Proposal {
        let mut proposal = Proposal::new(&wallet.id, "payload", &wallet.members[0], None);
        for signer in wallet.members.iter().take(count) {
            let sig = Signature::new(&proposal.id, signer, "sig");
            proposal.signatures.push(sig);
        }
        proposal
    }

    #[test]
    fn test_below_threshold_is_pending() {
        let wallet = wallet_2_of_3();
        assert_eq!(evaluate(&with_signatures(&wallet, 0), &wallet), ProposalStatus::Pending);
        assert_eq!(evaluate(&with_signatures(&wallet, 1), &wallet), ProposalStatus::Pending);
        assert_eq!(signatures_needed(&with_signatures(&wallet, 1), &wallet), 1);
    }

    #[test]
    fn test_threshold_reached_is_approved() {
        let wallet = wallet_2_of_3();
        assert_eq!(evaluate(&with_signatures(&wallet, 2), &wallet), ProposalStatus::Approved);
        assert_eq!(evaluate(&with_signatures(&wallet, 3), &wallet), ProposalStatus::Approved);
        assert_eq!(signatures_needed(&with_signatures(&wallet, 3), &wallet), 0);
    }

    #[test]
    fn test_non_open_statuses_unchanged() {
        let wallet = wallet_2_of_3();
        for status in [
            ProposalStatus::Executing,
            ProposalStatus::Executed,
            ProposalStatus::Rejected,
            ProposalStatus::Cancelled,
        ] {
            let mut proposal = with_signatures(&wallet, 2);
            proposal.status = status;
            assert_eq!(evaluate(&proposal, &wallet), status);

            let mut proposal = with_signatures(&wallet, 0);
            proposal.status = status;
            assert_eq!(evaluate(&proposal, &wallet), status);
        }
    }

    #[test]
    fn test_evaluate_is_idempotent() {
        let wallet = wallet_2_of_3();
        for count in 0..=3 {
            let mut proposal = with_signatures(&wallet, count);
            let first = evaluate(&proposal, &wallet);
            assert_eq!(evaluate(&proposal, &wallet), first);

            // Feeding the result back in changes nothing
            proposal.status = first;
            assert_eq!(evaluate(&proposal, &wallet), first);
        }
    }
}
