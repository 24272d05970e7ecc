//! HTTP API handlers — exposes daemon state as JSON.

pub mod engine;
pub mod status;

use std::sync::Arc;

use axum::http::StatusCode;

use ndnopp_core::DaemonError;
use ndnopp_services::Daemon;

#[derive(Clone)]
pub struct ApiState {
    pub daemon: Arc<Daemon>,
    /// Shutdown broadcast sender — signals graceful daemon shutdown.
    pub shutdown_tx: tokio::sync::broadcast::Sender<()>,
}

// ── Shared helpers ────────────────────────────────────────────────────────────

fn daemon_error(e: DaemonError) -> (StatusCode, String) {
    let status = match e {
        DaemonError::NotRunning => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::BAD_GATEWAY,
    };
    (status, e.to_string())
}

// Re-export handler functions for use in router setup.
pub use engine::{handle_engine_table, handle_face_table, handle_route_add, handle_route_remove};
pub use status::{
    handle_faces, handle_flush, handle_peers, handle_shutdown, handle_status, handle_transfers,
};
