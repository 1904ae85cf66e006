//! CLI commands for the multisig engine
//!
//! Implements all command handlers for the CLI interface.

use crate::crypto::KeyPair;
use crate::multisig::{
    threshold, LocalSettlement, MultisigManager, MultisigWallet, Proposal, ProposalStatus,
};
use crate::storage::{DirLock, Storage, StorageConfig};
use std::path::PathBuf;
use std::sync::Arc;

/// Result type for CLI operations
pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Application state
///
/// Commands never keep state in memory between runs. Mutating commands open
/// a [`Session`], which holds the data directory lock from load to save, so
/// concurrent `multisig` processes apply their changes one after another on
/// the latest saved state.
pub struct AppState {
    pub storage: Storage,
    pub data_dir: PathBuf,
}

/// Manager loaded while holding the data directory lock
pub struct Session {
    pub manager: MultisigManager,
    _lock: DirLock,
}

impl AppState {
    /// Initialize application state
    pub fn new(data_dir: PathBuf) -> CliResult<Self> {
        let storage_config = StorageConfig {
            data_dir: data_dir.clone(),
            ..Default::default()
        };

        let storage = Storage::new(storage_config)?;

        Ok(Self { storage, data_dir })
    }

    /// Lock the data directory and load the latest saved state
    pub async fn begin(&self) -> CliResult<Session> {
        let lock = self.storage.lock().await?;
        log::debug!("Loading multisig state from {:?}", self.data_dir);
        let manager = self.storage.load_manager(Arc::new(LocalSettlement))?;

        Ok(Session {
            manager,
            _lock: lock,
        })
    }

    /// Save a session's state, then release the lock
    pub async fn commit(&self, session: Session) -> CliResult<()> {
        self.storage.save_manager(&session.manager).await?;
        Ok(())
    }

    /// Latest saved state, for read-only commands
    ///
    /// The state file is replaced by atomic rename, so no lock is needed to
    /// read a consistent copy.
    pub fn load(&self) -> CliResult<MultisigManager> {
        Ok(self.storage.load_manager(Arc::new(LocalSettlement))?)
    }
}

fn print_proposal(proposal: &Proposal, wallet: &MultisigWallet) {
    println!("📝 Proposal {}", proposal.id);
    println!("   ├─ Wallet: {} ({})", wallet.name, wallet.address);
    println!("   ├─ Status: {}", proposal.status);
    println!("   ├─ Payload: {}", proposal.action_payload);
    if let Some(description) = &proposal.description {
        println!("   ├─ Description: {}", description);
    }
    println!("   ├─ Created by: {}", proposal.created_by);
    println!(
        "   ├─ Signatures: {}/{}",
        proposal.signature_count(),
        wallet.threshold
    );
    for signer in proposal.signed_by() {
        println!("   │   • {}", signer);
    }
    if proposal.status == ProposalStatus::Pending {
        println!(
            "   ├─ Still needed: {}",
            threshold::signatures_needed(proposal, wallet)
        );
    }
    if let Some(reference) = &proposal.execution_reference {
        println!("   ├─ Execution reference: {}", reference);
    }
    println!(
        "   └─ Created: {}",
        proposal.created_at.format("%Y-%m-%d %H:%M:%S")
    );
}

/// Create a multisig wallet
pub async fn cmd_wallet_create(
    state: &AppState,
    name: &str,
    members: Vec<String>,
    threshold: usize,
) -> CliResult<()> {
    let session = state.begin().await?;
    let wallet = session.manager.create_wallet(name, members, threshold).await?;
    state.commit(session).await?;

    println!("✅ Multisig wallet ready!");
    println!("   🆔 ID: {}", wallet.id);
    println!("   📍 Address: {}", wallet.address);
    println!("   🔐 Policy: {}", wallet.description());

    Ok(())
}

/// List all multisig wallets
pub async fn cmd_wallet_list(state: &AppState) -> CliResult<()> {
    let wallets = state.load()?.list_wallets().await;

    if wallets.is_empty() {
        println!("📭 No multisig wallets found");
        println!("   Create one with: multisig wallet create --name <NAME> --members <A,B,C> --threshold <M>");
        return Ok(());
    }

    println!("👛 Multisig wallets ({}):", wallets.len());
    println!();

    for wallet in wallets {
        println!("   {} [{}]", wallet.name, wallet.description());
        println!("   ├─ ID: {}", wallet.id);
        println!("   └─ Address: {}", wallet.address);
        println!();
    }

    Ok(())
}

/// Show a wallet and its members
pub async fn cmd_wallet_show(state: &AppState, id: &str) -> CliResult<()> {
    let manager = state.load()?;
    let wallet = manager.find_wallet(id).await?;
    let proposals = manager.list_proposals(&wallet.id, None).await?;

    println!("👛 {}", wallet.name);
    println!("   ├─ ID: {}", wallet.id);
    println!("   ├─ Address: {}", wallet.address);
    println!("   ├─ Policy: {}", wallet.description());
    if let Some(balance) = wallet.cached_balance {
        println!("   ├─ Cached balance: {}", balance);
    }
    println!("   ├─ Proposals: {}", proposals.len());
    println!("   └─ Members:");
    for member in &wallet.members {
        println!("       • {}", member);
    }

    Ok(())
}

/// Create a proposal on a wallet
pub async fn cmd_proposal_create(
    state: &AppState,
    wallet: &str,
    payload: &str,
    created_by: &str,
    description: Option<String>,
) -> CliResult<()> {
    let session = state.begin().await?;
    let wallet = session.manager.find_wallet(wallet).await?;
    let proposal = session
        .manager
        .create_proposal(&wallet.id, payload, created_by, description)
        .await?;
    state.commit(session).await?;

    println!("✅ Proposal created!");
    println!("   🆔 ID: {}", proposal.id);
    println!(
        "   ✍️  Needs {} of {} signatures",
        wallet.threshold,
        wallet.member_count()
    );
    println!("   🔏 Signing data: {}", hex::encode(proposal.signing_data()));

    Ok(())
}

/// List a wallet's proposals, newest first
pub async fn cmd_proposal_list(
    state: &AppState,
    wallet: &str,
    status: Option<ProposalStatus>,
) -> CliResult<()> {
    let manager = state.load()?;
    let wallet = manager.find_wallet(wallet).await?;
    let proposals = manager.list_proposals(&wallet.id, status).await?;

    if proposals.is_empty() {
        println!("📭 No proposals for {}", wallet.name);
        return Ok(());
    }

    println!("📋 Proposals for {} ({}):", wallet.name, proposals.len());
    println!();
    println!("   {:<34} {:<10} {:>5}  Created", "ID", "Status", "Sigs");
    println!("   {}", "─".repeat(70));

    for proposal in proposals {
        println!(
            "   {:<34} {:<10} {:>2}/{:<2}  {}",
            proposal.id,
            proposal.status.to_string(),
            proposal.signature_count(),
            wallet.threshold,
            proposal.created_at.format("%Y-%m-%d %H:%M:%S")
        );
    }

    Ok(())
}

/// Show a single proposal
pub async fn cmd_proposal_show(state: &AppState, id: &str) -> CliResult<()> {
    let manager = state.load()?;
    let proposal = manager.get_proposal(id).await?;
    let wallet = manager.get_wallet(&proposal.wallet_id).await?;
    print_proposal(&proposal, &wallet);
    Ok(())
}

/// Sign a proposal
///
/// With a private key the signer address is derived from it and the
/// proposal's signing data is signed locally. Otherwise an explicit signer
/// and opaque signature are recorded as given.
pub async fn cmd_proposal_sign(
    state: &AppState,
    id: &str,
    signer: Option<String>,
    signature: Option<String>,
    private_key: Option<String>,
) -> CliResult<()> {
    let session = state.begin().await?;
    let (signer, signature) = match private_key {
        Some(key) => {
            let keypair = KeyPair::from_private_key_hex(&key)?;
            let proposal = session.manager.get_proposal(id).await?;
            let signature = keypair.sign_hex(&proposal.signing_data())?;
            (keypair.address(), signature)
        }
        None => match (signer, signature) {
            (Some(signer), Some(signature)) => (signer, signature),
            _ => return Err("either --private-key or both --signer and --signature are required".into()),
        },
    };

    let proposal = session.manager.sign_proposal(id, &signer, &signature).await?;
    let wallet = session.manager.get_wallet(&proposal.wallet_id).await?;
    state.commit(session).await?;

    println!("✍️  Signature recorded for {}", signer);
    println!(
        "   Signatures: {}/{}",
        proposal.signature_count(),
        wallet.threshold
    );
    if proposal.status == ProposalStatus::Approved {
        println!("   ✅ Threshold reached, proposal is ready to execute");
    }

    Ok(())
}

/// Execute an approved proposal
pub async fn cmd_proposal_execute(state: &AppState, id: &str) -> CliResult<()> {
    println!("⚙️  Executing proposal {}...", id);

    let session = state.begin().await?;
    let result = session.manager.execute_proposal(id).await;
    // A failed execution reverts to Approved; save either way
    state.commit(session).await?;
    let reference = result?;

    println!("✅ Proposal executed!");
    println!("   🔗 Reference: {}", reference);

    Ok(())
}

/// Cancel a pending proposal
pub async fn cmd_proposal_cancel(state: &AppState, id: &str, requestor: &str) -> CliResult<()> {
    let session = state.begin().await?;
    session.manager.cancel_proposal(id, requestor).await?;
    state.commit(session).await?;

    println!("🚫 Proposal {} cancelled", id);

    Ok(())
}

/// Generate a member key pair
pub fn cmd_key_generate() -> CliResult<()> {
    let keypair = KeyPair::generate();

    println!("🔑 New member key generated!");
    println!("   📍 Address: {}", keypair.address());
    println!("   🔓 Public key: {}", keypair.public_key_hex());
    println!("   🔐 Private key: {}", keypair.private_key_hex());
    println!();
    println!("   ⚠️  Keep the private key secret. It is not stored anywhere.");

    Ok(())
}
