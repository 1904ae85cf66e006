//! Multi-signature wallet definitions
//!
//! Provides threshold-based wallets requiring M-of-N member signatures.

use crate::crypto::{base58check_encode, hash160, unique_id};
use crate::multisig::error::MultisigError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Address version byte for multisig wallets (encodes with a leading '3')
pub const WALLET_ADDRESS_VERSION: u8 = 0x05;

/// Minimum number of members in a multisig wallet
pub const MIN_MEMBERS: usize = 2;

/// Accepted length range for member addresses
pub const MEMBER_ADDRESS_LEN: std::ops::RangeInclusive<usize> = 32..=44;

/// Check that `address` follows the member address syntax
///
/// Member addresses are base58 strings of 32 to 44 characters.
pub fn validate_member_address(address: &str) -> Result<(), MultisigError> {
    if !MEMBER_ADDRESS_LEN.contains(&address.len()) {
        return Err(MultisigError::InvalidMemberAddress(format!(
            "{} (length {} outside 32..=44)",
            address,
            address.len()
        )));
    }

    if bs58::decode(address).into_vec().is_err() {
        return Err(MultisigError::InvalidMemberAddress(format!(
            "{} (not base58)",
            address
        )));
    }

    Ok(())
}

/// Validated configuration for a multisig wallet
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MultisigConfig {
    /// Human-readable label
    pub name: String,
    /// Minimum signatures required (M in M-of-N)
    pub threshold: u8,
    /// Member addresses, sorted
    pub members: Vec<String>,
}

impl MultisigConfig {
    /// Create a new multisig configuration
    ///
    /// # Arguments
    /// * `name` - Wallet label
    /// * `members` - Addresses of the authorized members (N)
    /// * `threshold` - Minimum signatures required (M)
    ///
    /// # Errors
    /// Returns a validation error if the name is blank, any member address is
    /// malformed or repeated, or the threshold is outside `1..=N`
    pub fn new(name: &str, members: Vec<String>, threshold: usize) -> Result<Self, MultisigError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(MultisigError::InvalidName("name must not be empty".to_string()));
        }

        if members.len() < MIN_MEMBERS {
            return Err(MultisigError::InsufficientMembers(members.len()));
        }

        if members.len() > u8::MAX as usize {
            return Err(MultisigError::InvalidThreshold(format!(
                "at most {} members are supported",
                u8::MAX
            )));
        }

        for member in &members {
            validate_member_address(member)?;
        }

        let mut sorted = members;
        sorted.sort();
        if let Some(pair) = sorted.windows(2).find(|pair| pair[0] == pair[1]) {
            return Err(MultisigError::DuplicateMember(pair[0].clone()));
        }

        if threshold == 0 {
            return Err(MultisigError::InvalidThreshold(
                "threshold must be at least 1".to_string(),
            ));
        }

        if threshold > sorted.len() {
            return Err(MultisigError::InvalidThreshold(format!(
                "threshold {} exceeds member count {}",
                threshold,
                sorted.len()
            )));
        }

        Ok(Self {
            name: name.to_string(),
            threshold: threshold as u8,
            members: sorted,
        })
    }

    /// Multisig address for this configuration
    ///
    /// Address = Base58Check(0x05 || RIPEMD160(SHA256(script)))
    /// where script = threshold || (len(member) || member) for each sorted member
    ///
    /// The name is not part of the address, so identical member sets with the
    /// same threshold always map to the same address. Each member is length
    /// prefixed so different member sets never serialize to the same script.
    pub fn derive_address(&self) -> String {
        let mut script_data = vec![self.threshold];
        for member in &self.members {
            // Member addresses are at most 44 bytes
            script_data.push(member.len() as u8);
            script_data.extend_from_slice(member.as_bytes());
        }

        base58check_encode(WALLET_ADDRESS_VERSION, &hash160(&script_data))
    }

    /// Get description like "2-of-3"
    pub fn description(&self) -> String {
        format!("{}-of-{}", self.threshold, self.members.len())
    }
}

/// A multi-signature wallet
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MultisigWallet {
    /// Unique wallet identifier
    pub id: String,
    /// Human-readable label
    pub name: String,
    /// Deterministic multisig address
    pub address: String,
    /// Minimum signatures required
    pub threshold: u8,
    /// Authorized members, sorted
    pub members: Vec<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last balance reported by the balance backend; advisory only
    #[serde(default)]
    pub cached_balance: Option<u64>,
}

impl MultisigWallet {
    /// Create a new multisig wallet from a validated configuration
    pub fn new(config: MultisigConfig) -> Self {
        let address = config.derive_address();

        Self {
            id: unique_id(&address),
            name: config.name,
            address,
            threshold: config.threshold,
            members: config.members,
            created_at: Utc::now(),
            cached_balance: None,
        }
    }

    /// Check if an address is a member of this wallet
    pub fn is_member(&self, address: &str) -> bool {
        self.members.binary_search_by(|m| m.as_str().cmp(address)).is_ok()
    }

    /// Get the total number of members
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Get human-readable description
    pub fn description(&self) -> String {
        format!("{}-of-{}", self.threshold, self.members.len())
    }
}
