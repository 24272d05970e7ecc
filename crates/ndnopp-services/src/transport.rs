//! Packet transports — one per delivery path.
//!
//! The connection-oriented transport writes to a direct link inside a Wi-Fi
//! Direct group. The connection-less transport stores the packet and forwards
//! it on the next encounter; it can still withdraw a packet that has not
//! been picked up.

use std::sync::Arc;

use bytes::Bytes;

use ndnopp_core::{PacketKind, PeerId, TransferId, TransportError};

/// A packet handed to a transport.
#[derive(Debug, Clone)]
pub struct OutboundPacket {
    pub peer_id: PeerId,
    pub transfer_id: TransferId,
    pub kind: PacketKind,
    pub name: String,
    pub payload: Bytes,
}

pub trait Transport: Send + Sync {
    /// Hand the packet over. Completion is reported later as an ack or a failure.
    fn dispatch(&self, packet: &OutboundPacket) -> Result<(), TransportError>;

    /// Try to withdraw a dispatched packet. Returns false when the
    /// transport cannot take it back.
    fn cancel(&self, peer_id: &PeerId, transfer_id: &TransferId) -> bool;
}

/// Both delivery paths. Failure policy differs per path, so they stay separate.
#[derive(Clone)]
pub struct Transports {
    pub connection_oriented: Arc<dyn Transport>,
    pub connection_less: Arc<dyn Transport>,
}
