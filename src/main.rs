//! Multisig engine CLI application
//!
//! A command-line interface for managing multisig wallets and proposals.

use clap::{Parser, Subcommand};
use multisig_engine::api::{create_router, ApiState, WsBroadcaster};
use multisig_engine::cli::{self, AppState};
use multisig_engine::multisig::{LocalSettlement, ProposalStatus};
use multisig_engine::storage::{Storage, StorageConfig};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "multisig")]
#[command(author = "Darshan")]
#[command(version = "0.1.0")]
#[command(about = "M-of-N multisig proposal and signature coordination", long_about = None)]
struct Cli {
    /// Data directory for multisig state
    #[arg(short, long, default_value = ".multisig_data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Multisig wallet operations
    Wallet {
        #[command(subcommand)]
        action: WalletCommands,
    },

    /// Proposal operations
    Proposal {
        #[command(subcommand)]
        action: ProposalCommands,
    },

    /// Member key operations
    Key {
        #[command(subcommand)]
        action: KeyCommands,
    },

    /// REST API server
    Api {
        #[command(subcommand)]
        action: ApiCommands,
    },
}

#[derive(Subcommand)]
enum WalletCommands {
    /// Create a new multisig wallet
    Create {
        /// Wallet name
        #[arg(short, long)]
        name: String,

        /// Member addresses (comma-separated)
        #[arg(short, long, value_delimiter = ',')]
        members: Vec<String>,

        /// Required signatures
        #[arg(short, long)]
        threshold: usize,
    },

    /// List all multisig wallets
    List,

    /// Show a wallet
    Show {
        /// Wallet id or address
        #[arg(short, long)]
        id: String,
    },
}

#[derive(Subcommand)]
enum ProposalCommands {
    /// Create a proposal on a wallet
    Create {
        /// Wallet id or address
        #[arg(short, long)]
        wallet: String,

        /// Opaque action payload
        #[arg(short, long)]
        payload: String,

        /// Creating member address
        #[arg(short, long)]
        from: String,

        /// Optional description
        #[arg(short, long)]
        description: Option<String>,
    },

    /// List a wallet's proposals
    List {
        /// Wallet id or address
        #[arg(short, long)]
        wallet: String,

        /// Only show proposals with this status
        #[arg(short, long)]
        status: Option<ProposalStatus>,
    },

    /// Show a proposal
    Show {
        /// Proposal id
        #[arg(short, long)]
        id: String,
    },

    /// Sign a proposal
    Sign {
        /// Proposal id
        #[arg(short, long)]
        id: String,

        /// Signer address (with --signature)
        #[arg(long)]
        signer: Option<String>,

        /// Opaque signature (with --signer)
        #[arg(long)]
        signature: Option<String>,

        /// Member private key (hex); signs the proposal's signing data
        #[arg(long, conflicts_with_all = ["signer", "signature"])]
        private_key: Option<String>,
    },

    /// Execute an approved proposal
    Execute {
        /// Proposal id
        #[arg(short, long)]
        id: String,
    },

    /// Cancel a pending proposal
    Cancel {
        /// Proposal id
        #[arg(short, long)]
        id: String,

        /// Requesting member address (must be the creator)
        #[arg(short, long)]
        from: String,
    },
}

#[derive(Subcommand)]
enum KeyCommands {
    /// Generate a new member key pair
    Generate,
}

#[derive(Subcommand)]
enum ApiCommands {
    /// Start the REST API server
    Start {
        /// Port to listen on for REST API
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        // Key generation doesn't need any state
        Commands::Key {
            action: KeyCommands::Generate,
        } => cli::cmd_key_generate(),
        Commands::Wallet { action } => run_wallet_command(action, cli.data_dir),
        Commands::Proposal { action } => run_proposal_command(action, cli.data_dir),
        // Long-running server
        Commands::Api { action } => run_api_command(&action, &cli.data_dir),
    }
}

fn run_wallet_command(
    action: WalletCommands,
    data_dir: PathBuf,
) -> Result<(), Box<dyn std::error::Error>> {
    let state = AppState::new(data_dir)?;
    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async {
        match action {
            WalletCommands::Create {
                name,
                members,
                threshold,
            } => cli::cmd_wallet_create(&state, &name, members, threshold).await,
            WalletCommands::List => cli::cmd_wallet_list(&state).await,
            WalletCommands::Show { id } => cli::cmd_wallet_show(&state, &id).await,
        }
    })
}

fn run_proposal_command(
    action: ProposalCommands,
    data_dir: PathBuf,
) -> Result<(), Box<dyn std::error::Error>> {
    let state = AppState::new(data_dir)?;
    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async {
        match action {
            ProposalCommands::Create {
                wallet,
                payload,
                from,
                description,
            } => cli::cmd_proposal_create(&state, &wallet, &payload, &from, description).await,
            ProposalCommands::List { wallet, status } => {
                cli::cmd_proposal_list(&state, &wallet, status).await
            }
            ProposalCommands::Show { id } => cli::cmd_proposal_show(&state, &id).await,
            ProposalCommands::Sign {
                id,
                signer,
                signature,
                private_key,
            } => cli::cmd_proposal_sign(&state, &id, signer, signature, private_key).await,
            ProposalCommands::Execute { id } => cli::cmd_proposal_execute(&state, &id).await,
            ProposalCommands::Cancel { id, from } => {
                cli::cmd_proposal_cancel(&state, &id, &from).await
            }
        }
    })
}

fn run_api_command(
    action: &ApiCommands,
    data_dir: &PathBuf,
) -> Result<(), Box<dyn std::error::Error>> {
    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async {
        match action {
            ApiCommands::Start { port } => {
                // Initialize storage
                let storage_config = StorageConfig {
                    data_dir: data_dir.clone(),
                    ..Default::default()
                };
                let storage = Arc::new(Storage::new(storage_config)?);

                // The server owns the data directory while it runs
                let _dir_lock = storage.try_lock()?;

                if storage.exists() {
                    println!("📂 Loading existing multisig state...");
                } else {
                    println!("🆕 Starting with empty multisig state...");
                }
                let manager = storage.load_manager(Arc::new(LocalSettlement))?;

                let state = ApiState {
                    manager,
                    storage,
                    ws_broadcaster: Arc::new(WsBroadcaster::new()),
                };
                let shutdown_state = state.clone();

                let app = create_router(state);
                let addr = format!("0.0.0.0:{}", port);

                println!("🚀 REST API server starting on http://localhost:{}", port);
                println!();
                println!("📖 Available endpoints:");
                println!("   GET  /health                          - Health check");
                println!("   GET  /ws                              - WebSocket updates");
                println!("   GET  /api/wallets                     - List wallets");
                println!("   POST /api/wallets                     - Create wallet");
                println!("   GET  /api/wallets/{{id}}                - Get wallet");
                println!("   GET  /api/wallets/{{id}}/proposals      - List proposals");
                println!("   POST /api/wallets/{{id}}/proposals      - Create proposal");
                println!("   GET  /api/proposals/{{id}}              - Get proposal");
                println!("   POST /api/proposals/{{id}}/sign         - Sign proposal");
                println!("   POST /api/proposals/{{id}}/execute      - Execute proposal");
                println!("   POST /api/proposals/{{id}}/cancel       - Cancel proposal");
                println!();

                // Handle Ctrl+C with graceful shutdown
                tokio::spawn(async move {
                    tokio::signal::ctrl_c().await.ok();
                    println!("\n📴 Shutting down API server...");
                    println!("💾 Saving data...");

                    match shutdown_state
                        .storage
                        .save_manager(&shutdown_state.manager)
                        .await
                    {
                        Ok(()) => println!("✅ Data saved successfully!"),
                        Err(e) => log::error!("Failed to save multisig state: {}", e),
                    }
                    std::process::exit(0);
                });

                let listener = tokio::net::TcpListener::bind(&addr).await?;
                axum::serve(listener, app).await?;
            }
        }

        Ok::<(), Box<dyn std::error::Error>>(())
    })?;

    Ok(())
}
