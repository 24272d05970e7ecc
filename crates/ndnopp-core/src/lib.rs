//! ndnopp-core — identifiers, error taxonomy, configuration and installation identity.
//! All other ndn-opp crates depend on this one.

pub mod config;
pub mod error;
pub mod identity;
pub mod types;

pub use error::{DaemonError, EngineError, PlatformError, TransferError, TransportError};
pub use types::{
    Direction, FaceDescriptor, FaceId, PacketKind, PeerId, PeerStatus, TransferId,
    TransferState, TransportAddress, TransportPath,
};
