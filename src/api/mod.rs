//! REST API module
//!
//! HTTP access to the multisig engine.
//!
//! # Endpoints
//!
//! ## Wallets
//! - `GET /api/wallets` - List wallets, oldest first
//! - `POST /api/wallets` - Create wallet
//! - `GET /api/wallets/{id}` - Get wallet by id or address
//!
//! ## Proposals
//! - `GET /api/wallets/{id}/proposals?status=` - List proposals, newest first
//! - `POST /api/wallets/{id}/proposals` - Create proposal
//! - `GET /api/proposals/{id}` - Get proposal
//! - `POST /api/proposals/{id}/sign` - Add a member signature
//! - `POST /api/proposals/{id}/execute` - Execute an approved proposal
//! - `POST /api/proposals/{id}/cancel` - Cancel a pending proposal
//!
//! ## WebSocket
//! - `GET /ws` - Real-time updates (WalletCreated, ProposalCreated,
//!   ProposalSigned, ProposalExecuted, ProposalCancelled)

pub mod handlers;
pub mod routes;
pub mod websocket;

pub use handlers::ApiState;
pub use routes::create_router;
pub use websocket::{WsBroadcaster, WsEvent};
