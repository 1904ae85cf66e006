//! Proposals and member signatures
//!
//! A proposal is a wallet action awaiting approval from enough members.

use crate::crypto::{sha256, unique_id};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of a proposal
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ProposalStatus {
    /// Waiting for more signatures
    Pending,
    /// Has enough signatures, ready to execute
    Approved,
    /// Claimed by an executor, action submission in flight
    Executing,
    /// Action submitted and recorded
    Executed,
    /// Rejected by policy
    Rejected,
    /// Withdrawn by its creator
    Cancelled,
}

impl ProposalStatus {
    /// Terminal statuses accept no further transitions
    pub fn is_terminal(self) -> bool {
        match self {
            ProposalStatus::Executed | ProposalStatus::Rejected | ProposalStatus::Cancelled => true,
            ProposalStatus::Pending | ProposalStatus::Approved | ProposalStatus::Executing => {
                false
            }
        }
    }

    /// Whether new signatures may be appended
    pub fn accepts_signatures(self) -> bool {
        match self {
            ProposalStatus::Pending | ProposalStatus::Approved => true,
            ProposalStatus::Executing
            | ProposalStatus::Executed
            | ProposalStatus::Rejected
            | ProposalStatus::Cancelled => false,
        }
    }

    /// All statuses, in lifecycle order
    pub const ALL: [ProposalStatus; 6] = [
        ProposalStatus::Pending,
        ProposalStatus::Approved,
        ProposalStatus::Executing,
        ProposalStatus::Executed,
        ProposalStatus::Rejected,
        ProposalStatus::Cancelled,
    ];
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProposalStatus::Pending => "Pending",
            ProposalStatus::Approved => "Approved",
            ProposalStatus::Executing => "Executing",
            ProposalStatus::Executed => "Executed",
            ProposalStatus::Rejected => "Rejected",
            ProposalStatus::Cancelled => "Cancelled",
        };
        f.write_str(name)
    }
}

impl FromStr for ProposalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProposalStatus::ALL
            .into_iter()
            .find(|status| status.to_string().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown proposal status: {}", s))
    }
}

/// A single member signature over a proposal
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Signature {
    /// Unique signature ID
    pub id: String,
    /// Proposal this signature approves
    pub proposal_id: String,
    /// Member address of the signer
    pub signer: String,
    /// Opaque signature produced by the signer
    pub signature: String,
    /// When the signature was recorded
    pub signed_at: DateTime<Utc>,
}

impl Signature {
    /// Create a new signature record
    pub fn new(proposal_id: &str, signer: &str, signature: &str) -> Self {
        Self {
            id: unique_id(&format!("{}{}", proposal_id, signer)),
            proposal_id: proposal_id.to_string(),
            signer: signer.to_string(),
            signature: signature.to_string(),
            signed_at: Utc::now(),
        }
    }
}

/// A wallet action awaiting member approval
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Proposal {
    /// Unique proposal ID
    pub id: String,
    /// Owning wallet
    pub wallet_id: String,
    /// Opaque action to execute once approved
    pub action_payload: String,
    /// Current status
    pub status: ProposalStatus,
    /// Member who created the proposal
    pub created_by: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Optional human-readable description
    pub description: Option<String>,
    /// Collected signatures, in recording order
    #[serde(default)]
    pub signatures: Vec<Signature>,
    /// When the action was executed
    pub executed_at: Option<DateTime<Utc>>,
    /// Reference returned by the action backend
    pub execution_reference: Option<String>,
    /// When the record last changed
    pub updated_at: DateTime<Utc>,
    /// Record version, bumped on every stored change
    pub version: u64,
}

impl Proposal {
    /// Create a new pending proposal
    pub fn new(
        wallet_id: &str,
        action_payload: &str,
        created_by: &str,
        description: Option<String>,
    ) -> Self {
        let now = Utc::now();

        Self {
            id: unique_id(&format!("{}{}{}", wallet_id, created_by, action_payload)),
            wallet_id: wallet_id.to_string(),
            action_payload: action_payload.to_string(),
            status: ProposalStatus::Pending,
            created_by: created_by.to_string(),
            created_at: now,
            description,
            signatures: Vec::new(),
            executed_at: None,
            execution_reference: None,
            updated_at: now,
            version: 0,
        }
    }

    /// Data members sign to approve this proposal
    ///
    /// SHA256(proposal id || wallet id || action payload)
    pub fn signing_data(&self) -> Vec<u8> {
        let data = format!("{}{}{}", self.id, self.wallet_id, self.action_payload);
        sha256(data.as_bytes())
    }

    /// Get number of signatures collected
    pub fn signature_count(&self) -> usize {
        self.signatures.len()
    }

    /// Check whether a member has already signed
    pub fn has_signed(&self, signer: &str) -> bool {
        self.signatures.iter().any(|s| s.signer == signer)
    }

    /// Get signers who have already signed
    pub fn signed_by(&self) -> Vec<&str> {
        self.signatures.iter().map(|s| s.signer.as_str()).collect()
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
