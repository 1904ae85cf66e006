//! REST API handlers for multisig operations

use crate::api::websocket::{WsBroadcaster, WsEvent};
use crate::multisig::{
    ErrorKind, MultisigError, MultisigManager, MultisigWallet, Proposal, ProposalStatus,
};
use crate::storage::Storage;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Shared application state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub manager: MultisigManager,
    pub storage: Arc<Storage>,
    pub ws_broadcaster: Arc<WsBroadcaster>,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub kind: String,
}

impl From<MultisigError> for ApiError {
    fn from(e: MultisigError) -> Self {
        Self {
            kind: format!("{:?}", e.kind()),
            error: e.to_string(),
        }
    }
}

/// Map an engine error onto an HTTP status and JSON body
fn api_error(e: MultisigError) -> (StatusCode, Json<ApiError>) {
    let status = match e.kind() {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Authorization => StatusCode::FORBIDDEN,
        ErrorKind::State => StatusCode::CONFLICT,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Execution => StatusCode::BAD_GATEWAY,
    };
    (status, Json(ApiError::from(e)))
}

fn bad_request(message: String) -> (StatusCode, Json<ApiError>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiError {
            error: message,
            kind: format!("{:?}", ErrorKind::Validation),
        }),
    )
}

/// Multisig wallet info response
#[derive(Clone, Debug, Serialize)]
pub struct WalletInfo {
    pub id: String,
    pub name: String,
    pub address: String,
    pub threshold: u8,
    pub member_count: usize,
    pub members: Vec<String>,
    pub description: String,
    pub cached_balance: Option<u64>,
    pub created_at: String,
}

impl From<&MultisigWallet> for WalletInfo {
    fn from(w: &MultisigWallet) -> Self {
        Self {
            id: w.id.clone(),
            name: w.name.clone(),
            address: w.address.clone(),
            threshold: w.threshold,
            member_count: w.member_count(),
            members: w.members.clone(),
            description: w.description(),
            cached_balance: w.cached_balance,
            created_at: w.created_at.to_rfc3339(),
        }
    }
}

/// Proposal info response
#[derive(Clone, Debug, Serialize)]
pub struct ProposalInfo {
    pub id: String,
    pub wallet_id: String,
    pub action_payload: String,
    pub description: Option<String>,
    pub status: ProposalStatus,
    pub created_by: String,
    pub signatures_collected: usize,
    pub signatures_required: u8,
    pub signed_by: Vec<String>,
    pub execution_reference: Option<String>,
    pub created_at: String,
    pub executed_at: Option<String>,
}

impl ProposalInfo {
    fn new(p: &Proposal, wallet: &MultisigWallet) -> Self {
        Self {
            id: p.id.clone(),
            wallet_id: p.wallet_id.clone(),
            action_payload: p.action_payload.clone(),
            description: p.description.clone(),
            status: p.status,
            created_by: p.created_by.clone(),
            signatures_collected: p.signature_count(),
            signatures_required: wallet.threshold,
            signed_by: p.signed_by().iter().map(|s| s.to_string()).collect(),
            execution_reference: p.execution_reference.clone(),
            created_at: p.created_at.to_rfc3339(),
            executed_at: p.executed_at.map(|t| t.to_rfc3339()),
        }
    }
}

#[derive(Serialize)]
pub struct ExecuteResponse {
    pub proposal_id: String,
    pub execution_reference: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub wallets: usize,
    pub proposals: usize,
}

// ============================================================================
// Request Types
// ============================================================================

#[derive(Deserialize)]
pub struct CreateWalletRequest {
    pub name: String,
    pub members: Vec<String>,
    pub threshold: usize,
}

#[derive(Deserialize)]
pub struct CreateProposalRequest {
    pub action_payload: String,
    pub created_by: String,
    pub description: Option<String>,
}

#[derive(Deserialize)]
pub struct ListProposalsQuery {
    pub status: Option<String>,
}

#[derive(Deserialize)]
pub struct SignProposalRequest {
    pub signer: String,
    pub signature: String,
}

#[derive(Deserialize)]
pub struct CancelProposalRequest {
    pub requestor: String,
}

// ============================================================================
// Helpers
// ============================================================================

/// Save state after a committed mutation
///
/// A failed save is reported as 500: the change is live in memory but not
/// yet durable, and the next successful save will carry it.
async fn persist(state: &ApiState) -> Result<(), (StatusCode, Json<ApiError>)> {
    state.storage.save_manager(&state.manager).await.map_err(|e| {
        log::error!("Failed to save multisig state: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiError {
                error: format!("State not saved: {}", e),
                kind: "Storage".to_string(),
            }),
        )
    })
}

async fn proposal_info(state: &ApiState, proposal: &Proposal) -> Result<ProposalInfo, MultisigError> {
    let wallet = state.manager.get_wallet(&proposal.wallet_id).await?;
    Ok(ProposalInfo::new(proposal, &wallet))
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /health - Health check
pub async fn health_check(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        wallets: state.manager.wallet_count().await,
        proposals: state.manager.proposal_count().await,
    })
}

/// GET /api/wallets - List all multisig wallets
pub async fn list_wallets(State(state): State<ApiState>) -> Json<Vec<WalletInfo>> {
    let wallets = state.manager.list_wallets().await;
    Json(wallets.iter().map(WalletInfo::from).collect())
}

/// POST /api/wallets - Create a multisig wallet
pub async fn create_wallet(
    State(state): State<ApiState>,
    Json(req): Json<CreateWalletRequest>,
) -> ApiResult<WalletInfo> {
    let wallet = state
        .manager
        .create_wallet(&req.name, req.members, req.threshold)
        .await
        .map_err(api_error)?;

    persist(&state).await?;
    state.ws_broadcaster.broadcast(WsEvent::WalletCreated {
        wallet_id: wallet.id.clone(),
        address: wallet.address.clone(),
        description: wallet.description(),
    });

    Ok(Json(WalletInfo::from(&wallet)))
}

/// GET /api/wallets/{id} - Get wallet by id or address
pub async fn get_wallet(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<WalletInfo> {
    let wallet = state.manager.find_wallet(&id).await.map_err(api_error)?;
    Ok(Json(WalletInfo::from(&wallet)))
}

/// GET /api/wallets/{id}/proposals - List proposals, newest first
pub async fn list_proposals(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Query(query): Query<ListProposalsQuery>,
) -> ApiResult<Vec<ProposalInfo>> {
    let status_filter = query
        .status
        .as_deref()
        .map(str::parse::<ProposalStatus>)
        .transpose()
        .map_err(bad_request)?;

    let wallet = state.manager.find_wallet(&id).await.map_err(api_error)?;
    let proposals = state
        .manager
        .list_proposals(&wallet.id, status_filter)
        .await
        .map_err(api_error)?;

    Ok(Json(
        proposals
            .iter()
            .map(|p| ProposalInfo::new(p, &wallet))
            .collect(),
    ))
}

/// POST /api/wallets/{id}/proposals - Create a proposal
pub async fn create_proposal(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(req): Json<CreateProposalRequest>,
) -> ApiResult<ProposalInfo> {
    let wallet = state.manager.find_wallet(&id).await.map_err(api_error)?;
    let proposal = state
        .manager
        .create_proposal(&wallet.id, &req.action_payload, &req.created_by, req.description)
        .await
        .map_err(api_error)?;

    persist(&state).await?;
    let info = ProposalInfo::new(&proposal, &wallet);
    state.ws_broadcaster.broadcast(WsEvent::ProposalCreated {
        proposal: info.clone(),
    });

    Ok(Json(info))
}

/// GET /api/proposals/{id} - Get a proposal
pub async fn get_proposal(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<ProposalInfo> {
    let proposal = state.manager.get_proposal(&id).await.map_err(api_error)?;
    let info = proposal_info(&state, &proposal).await.map_err(api_error)?;
    Ok(Json(info))
}

/// POST /api/proposals/{id}/sign - Record a member signature
pub async fn sign_proposal(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(req): Json<SignProposalRequest>,
) -> ApiResult<ProposalInfo> {
    let proposal = state
        .manager
        .sign_proposal(&id, &req.signer, &req.signature)
        .await
        .map_err(api_error)?;

    persist(&state).await?;
    let info = proposal_info(&state, &proposal).await.map_err(api_error)?;
    state.ws_broadcaster.broadcast(WsEvent::ProposalSigned {
        proposal_id: info.id.clone(),
        signer: req.signer,
        signatures_collected: info.signatures_collected,
        signatures_required: info.signatures_required,
        status: info.status,
    });

    Ok(Json(info))
}

/// POST /api/proposals/{id}/execute - Execute an approved proposal
pub async fn execute_proposal(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<ExecuteResponse> {
    let result = state.manager.execute_proposal(&id).await;

    // A failed execution still reverted state; save either way
    persist(&state).await?;
    let reference = result.map_err(api_error)?;

    state.ws_broadcaster.broadcast(WsEvent::ProposalExecuted {
        proposal_id: id.clone(),
        execution_reference: reference.clone(),
    });

    Ok(Json(ExecuteResponse {
        proposal_id: id,
        execution_reference: reference,
    }))
}

/// POST /api/proposals/{id}/cancel - Cancel a pending proposal
pub async fn cancel_proposal(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(req): Json<CancelProposalRequest>,
) -> ApiResult<ProposalInfo> {
    let proposal = state
        .manager
        .cancel_proposal(&id, &req.requestor)
        .await
        .map_err(api_error)?;

    persist(&state).await?;
    state.ws_broadcaster.broadcast(WsEvent::ProposalCancelled {
        proposal_id: proposal.id.clone(),
        requestor: req.requestor,
    });

    let info = proposal_info(&state, &proposal).await.map_err(api_error)?;
    Ok(Json(info))
}
