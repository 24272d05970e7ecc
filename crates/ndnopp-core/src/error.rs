//! Error taxonomy shared by the registries, the orchestrator and the adapters.
//!
//! Face creation failures and transport failures are not returned from
//! calls; they travel on the same event channels as successes, tagged with
//! their outcome. Lifecycle misuse (start while started, stop while stopped)
//! is a logged no-op and has no variant here.

use crate::types::{FaceId, PeerId, TransferId};

/// Rejections by the transfer manager.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransferError {
    /// Local policy: the same packet is already on its way to this peer.
    #[error("transfer {transfer_id} to {peer} is already in flight")]
    DuplicateInFlight { peer: PeerId, transfer_id: TransferId },
    /// The manager was shut down with the daemon.
    #[error("transfer manager is shut down")]
    ShutDown,
}

/// Failures reported by the forwarding engine adapter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("forwarding engine is not running")]
    NotRunning,
    #[error("unknown face {0}")]
    UnknownFace(FaceId),
    #[error("engine rejected request: {0}")]
    Rejected(String),
    #[error("engine bridge failure: {0}")]
    Bridge(String),
}

/// Failures reported by a packet transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("peer {0} is not reachable")]
    Unreachable(PeerId),
    #[error("transport write failed: {0}")]
    WriteFailed(String),
}

/// Failures reported by the Wi-Fi P2P platform adapter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlatformError {
    #[error("platform call {call} failed: {reason}")]
    CallFailed { call: &'static str, reason: String },
}

/// Errors surfaced by the daemon orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    /// The call arrived while the daemon was stopped; it is rejected, not queued.
    #[error("daemon is not running")]
    NotRunning,
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Transfer(#[from] TransferError),
    #[error(transparent)]
    Platform(#[from] PlatformError),
}
