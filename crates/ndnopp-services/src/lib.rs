//! ndnopp-services — peer tracking, face management, transfers and the daemon orchestrator.
//!
//! Adapter traits for the forwarding engine, the Wi-Fi P2P platform and the
//! packet transports live here too; the daemon binary provides the real
//! implementations.

pub mod daemon;
pub mod engine;
pub mod face;
pub mod peer;
pub mod platform;
pub mod tracker;
pub mod transfer;
pub mod transport;

#[cfg(any(test, feature = "testing"))]
pub mod fakes;

pub use daemon::{Adapters, Daemon, DaemonContext, DaemonStatus};
pub use engine::{EngineTable, ForwardingEngine, Route};
pub use face::{FaceBinding, FaceEvent, FaceRegistry, FaceState};
pub use peer::{PeerChange, PeerDelta, PeerRecord, PeerRegistry};
pub use platform::P2pPlatform;
pub use tracker::PeerTracker;
pub use transfer::{
    FailureReason, SendReceipt, Transfer, TransferEvent, TransferManager, TransferOutcome,
    TransferSummary,
};
pub use transport::{OutboundPacket, Transport, Transports};
