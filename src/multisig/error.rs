//! Error taxonomy for the multisig engine

use crate::multisig::proposal::ProposalStatus;
use thiserror::Error;

/// Coarse classification of a [`MultisigError`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input at creation time
    Validation,
    /// Actor not permitted for the requested action
    Authorization,
    /// Proposal status forbids the requested action
    State,
    /// Referenced wallet or proposal does not exist
    NotFound,
    /// External action submission failed
    Execution,
}

/// Errors related to multisig operations
#[derive(Error, Debug)]
pub enum MultisigError {
    #[error("Invalid threshold: {0}")]
    InvalidThreshold(String),
    #[error("Invalid member count: need at least 2 members, got {0}")]
    InsufficientMembers(usize),
    #[error("Duplicate member: {0}")]
    DuplicateMember(String),
    #[error("Invalid member address: {0}")]
    InvalidMemberAddress(String),
    #[error("Invalid wallet name: {0}")]
    InvalidName(String),
    #[error("Signature must not be empty")]
    EmptySignature,

    #[error("Not a wallet member: {0}")]
    NotAMember(String),
    #[error("Already signed by {0}")]
    AlreadySigned(String),
    #[error("Only the proposal creator may cancel it")]
    NotCreator,

    #[error("Proposal is {status}, cannot {action}")]
    InvalidState {
        status: ProposalStatus,
        action: &'static str,
    },
    #[error("Insufficient signatures: have {have}, need {need}")]
    InsufficientSignatures { have: usize, need: u8 },
    #[error("Proposal already executed")]
    AlreadyExecuted,
    #[error("Proposal execution already in progress")]
    ExecutionInProgress,
    #[error("Proposal {0} kept changing under concurrent updates")]
    Contention(String),

    #[error("Wallet not found: {0}")]
    WalletNotFound(String),
    #[error("Proposal not found: {0}")]
    ProposalNotFound(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
}

impl MultisigError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            MultisigError::InvalidThreshold(_)
            | MultisigError::InsufficientMembers(_)
            | MultisigError::DuplicateMember(_)
            | MultisigError::InvalidMemberAddress(_)
            | MultisigError::InvalidName(_)
            | MultisigError::EmptySignature => ErrorKind::Validation,
            MultisigError::NotAMember(_)
            | MultisigError::AlreadySigned(_)
            | MultisigError::NotCreator => ErrorKind::Authorization,
            MultisigError::InvalidState { .. }
            | MultisigError::InsufficientSignatures { .. }
            | MultisigError::AlreadyExecuted
            | MultisigError::ExecutionInProgress
            | MultisigError::Contention(_) => ErrorKind::State,
            MultisigError::WalletNotFound(_) | MultisigError::ProposalNotFound(_) => {
                ErrorKind::NotFound
            }
            MultisigError::ExecutionFailed(_) => ErrorKind::Execution,
        }
    }

    /// The error for attempting `action` on a proposal in `status`
    pub(crate) fn forbidden_in(status: ProposalStatus, action: &'static str) -> Self {
        match status {
            ProposalStatus::Executed => MultisigError::AlreadyExecuted,
            ProposalStatus::Executing => MultisigError::ExecutionInProgress,
            _ => MultisigError::InvalidState { status, action },
        }
    }
}
