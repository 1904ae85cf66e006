//! Multisig Engine: M-of-N proposal and signature coordination in Rust
//!
//! This crate provides the coordination core of a multisig wallet:
//! - Wallet registration with validated membership and threshold
//! - Deterministic P2SH-style wallet addresses
//! - Proposals with a guarded lifecycle (Pending, Approved, Executing, Executed, Cancelled)
//! - Per-member signature collection with automatic threshold evaluation
//! - Exactly-once execution through a pluggable action backend
//! - JSON persistence, a REST API with a WebSocket event stream, and a CLI
//!
//! # Example
//!
//! ```rust
//! use multisig_engine::crypto::KeyPair;
//! use multisig_engine::multisig::{MultisigManager, ProposalStatus};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let manager = MultisigManager::with_local_settlement();
//! let members: Vec<String> = (0..3).map(|_| KeyPair::generate().address()).collect();
//!
//! // Create a 2-of-3 wallet
//! let wallet = manager.create_wallet("Treasury", members.clone(), 2).await.unwrap();
//! println!("Wallet address: {}", wallet.address);
//!
//! // Propose, collect two signatures, execute
//! let proposal = manager
//!     .create_proposal(&wallet.id, "transfer 10", &members[0], None)
//!     .await
//!     .unwrap();
//! manager.sign_proposal(&proposal.id, &members[0], "sig-a").await.unwrap();
//! let approved = manager.sign_proposal(&proposal.id, &members[1], "sig-b").await.unwrap();
//! assert_eq!(approved.status, ProposalStatus::Approved);
//!
//! let reference = manager.execute_proposal(&proposal.id).await.unwrap();
//! println!("Executed: {}", reference);
//! # });
//! ```

pub mod api;
pub mod cli;
pub mod crypto;
pub mod multisig;
pub mod storage;

// Re-export commonly used types
pub use api::{create_router, ApiState};
pub use crypto::KeyPair;
pub use multisig::{
    ActionExecutor, MultisigConfig, MultisigError, MultisigManager, MultisigWallet, Proposal,
    ProposalStatus,
};
pub use storage::Storage;
