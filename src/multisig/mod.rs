//! Multi-signature wallets and proposal coordination
//!
//! An M-of-N wallet executes an action only after M of its N members have
//! signed the proposal carrying it.
//!
//! # Example
//!
//! ```ignore
//! use multisig_engine::multisig::MultisigManager;
//!
//! let manager = MultisigManager::with_local_settlement();
//!
//! // Create a 2-of-3 wallet
//! let wallet = manager.create_wallet("Treasury", vec![alice, bob, carol], 2).await?;
//!
//! // Propose an action and collect signatures
//! let proposal = manager.create_proposal(&wallet.id, payload, &alice, None).await?;
//! manager.sign_proposal(&proposal.id, &alice, &sig_a).await?;
//! manager.sign_proposal(&proposal.id, &bob, &sig_b).await?;
//!
//! // Approved: execute exactly once
//! let tx_ref = manager.execute_proposal(&proposal.id).await?;
//! ```

pub mod cancel;
pub mod collector;
pub mod error;
pub mod executor;
pub mod manager;
pub mod proposal;
pub mod registry;
pub mod store;
pub mod threshold;
pub mod wallet;

pub use cancel::CancellationGuard;
pub use collector::SignatureCollector;
pub use error::{ErrorKind, MultisigError};
pub use executor::{ActionError, ActionExecutor, ExecutionCoordinator, LocalSettlement};
pub use manager::{MultisigManager, MultisigSnapshot};
pub use proposal::{Proposal, ProposalStatus, Signature};
pub use registry::WalletRegistry;
pub use store::{CasError, ProposalStore};
pub use wallet::{validate_member_address, MultisigConfig, MultisigWallet};
