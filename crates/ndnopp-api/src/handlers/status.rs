//! /status, /peers, /faces, /transfers, /flush, /daemon/shutdown handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use ndnopp_core::{PeerId, PeerStatus, TransportAddress};
use ndnopp_services::{DaemonStatus, FaceBinding, TransferSummary};

use super::{daemon_error, ApiState};

// ── /status ──────────────────────────────────────────────────────────────────

pub async fn handle_status(State(state): State<ApiState>) -> Json<DaemonStatus> {
    Json(state.daemon.status())
}

// ── /peers ────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct PeersResponse {
    pub peers: Vec<PeerInfo>,
}

#[derive(Serialize)]
pub struct PeerInfo {
    pub peer_id: PeerId,
    pub address: TransportAddress,
    pub status: PeerStatus,
    pub last_seen_secs: u64,
}

pub async fn handle_peers(State(state): State<ApiState>) -> Json<PeersResponse> {
    let peers = state
        .daemon
        .peers()
        .into_iter()
        .map(|p| PeerInfo {
            peer_id: p.peer_id,
            address: p.transport_address,
            status: p.status,
            last_seen_secs: p.last_seen.elapsed().as_secs(),
        })
        .collect();

    Json(PeersResponse { peers })
}

// ── /faces ────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct FacesResponse {
    pub faces: Vec<FaceBinding>,
}

pub async fn handle_faces(State(state): State<ApiState>) -> Json<FacesResponse> {
    Json(FacesResponse {
        faces: state.daemon.faces(),
    })
}

// ── /transfers ────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct TransfersResponse {
    pub transfers: Vec<TransferSummary>,
}

pub async fn handle_transfers(State(state): State<ApiState>) -> Json<TransfersResponse> {
    Json(TransfersResponse {
        transfers: state.daemon.transfers(),
    })
}

// ── /flush ────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct FlushResponse {
    pub dispatched: usize,
}

pub async fn handle_flush(
    State(state): State<ApiState>,
) -> Result<Json<FlushResponse>, (StatusCode, String)> {
    let dispatched = state.daemon.flush_pending().map_err(daemon_error)?;
    tracing::info!(dispatched, "queued transfers flushed via API");
    Ok(Json(FlushResponse { dispatched }))
}

// ── /daemon/shutdown ──────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct ShutdownResponse {
    pub message: String,
}

pub async fn handle_shutdown(State(state): State<ApiState>) -> Json<ShutdownResponse> {
    tracing::info!("shutdown requested via API");
    let _ = state.shutdown_tx.send(());
    Json(ShutdownResponse {
        message: "Shutdown initiated".to_string(),
    })
}
