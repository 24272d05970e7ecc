//! Packet transfers over both paths, as the engine sees them.

use bytes::Bytes;
use ndnopp_core::{DaemonError, PacketKind, TransferError, TransferState, TransportError, TransportPath};

use crate::*;

fn interest(nonce: u32) -> PacketKind {
    PacketKind::Interest { nonce }
}

/// Same Interest to the same connected peer while the first is in flight.
#[test]
fn test_duplicate_in_flight_rejected() {
    let node = Node::started();
    node.connect("p1", "aa:01", 7);

    let first = node
        .daemon
        .transfer_interest(FaceId(7), "/a/b", 42, Bytes::from_static(b"i1"))
        .unwrap()
        .expect("face is bound");
    assert_eq!(first.path, TransportPath::ConnectionOriented);
    assert_eq!(first.state, TransferState::InFlight);

    let second = node
        .daemon
        .transfer_interest(FaceId(7), "/a/b", 42, Bytes::from_static(b"i1"));
    assert!(matches!(
        second,
        Err(DaemonError::Transfer(TransferError::DuplicateInFlight { .. }))
    ));
    assert_eq!(node.direct.dispatched_to(&PeerId::new("p1")), 1);
    assert_eq!(node.daemon.transfers().len(), 1);
}

/// Direct delivery is reported to the engine on the peer's face.
#[test]
fn test_direct_delivery_reported() {
    let node = Node::started();
    node.connect("p1", "aa:01", 7);
    let receipt = node
        .daemon
        .transfer_data(FaceId(7), "/a/b/v1", Bytes::from_static(b"data"))
        .unwrap()
        .unwrap();

    assert!(node
        .daemon
        .on_packet_transferred(&PeerId::new("p1"), &receipt.transfer_id)
        .unwrap());
    assert_eq!(
        node.count_calls(|c| *c == EngineCall::DataTransferred(FaceId(7), "/a/b/v1".to_string())),
        1
    );
    assert!(node.daemon.transfers().is_empty());

    // A second ack for the same transfer is stale.
    assert!(!node
        .daemon
        .on_packet_transferred(&PeerId::new("p1"), &receipt.transfer_id)
        .unwrap());
}

/// Available but not connected: Pending, flushed, then the peer leaves.
/// The engine hears about the failure exactly once.
#[test]
fn test_connection_less_failure_on_peer_loss() {
    let node = Node::started();
    node.discover("p1", "aa:01");
    node.confirm_face("p1", 7);

    let receipt = node
        .daemon
        .transfer_interest(FaceId(7), "/x", 9, Bytes::from_static(b"ix"))
        .unwrap()
        .unwrap();
    assert_eq!(receipt.path, TransportPath::ConnectionLess);
    assert_eq!(receipt.state, TransferState::Pending);
    assert!(node.store.dispatched().is_empty());

    assert_eq!(node.daemon.flush_pending().unwrap(), 1);
    assert_eq!(node.store.dispatched_to(&PeerId::new("p1")), 1);
    assert_eq!(node.daemon.transfers()[0].state, TransferState::InFlight);

    node.scan(&[]);
    let failed = |c: &EngineCall| matches!(c, EngineCall::TransferFailed(FaceId(7), k, _) if *k == interest(9));
    assert_eq!(node.count_calls(failed), 1);
    assert!(node.daemon.transfers().is_empty());

    // A late transport report for the same packet changes nothing.
    assert!(!node
        .daemon
        .on_transport_failure(
            &PeerId::new("p1"),
            &receipt.transfer_id,
            TransportError::WriteFailed("gone".to_string())
        )
        .unwrap());
    node.daemon.stop().unwrap();
    assert_eq!(node.count_calls(failed), 1);
}

/// A queued packet survives the peer leaving and goes out when it returns.
#[test]
fn test_dispatch_on_re_encounter() {
    let node = Node::started();
    node.discover("p1", "aa:01");
    node.confirm_face("p1", 7);
    let receipt = node
        .daemon
        .transfer_data(FaceId(7), "/d", Bytes::from_static(b"d"))
        .unwrap()
        .unwrap();

    node.scan(&[]);
    assert_eq!(node.daemon.transfers().len(), 1);
    assert_eq!(node.daemon.transfers()[0].state, TransferState::Pending);
    assert_eq!(node.daemon.flush_pending().unwrap(), 0);

    node.discover("p1", "aa:02");
    assert_eq!(node.store.dispatched_to(&PeerId::new("p1")), 1);

    node.confirm_face("p1", 8);
    node.daemon
        .on_packet_transferred(&PeerId::new("p1"), &receipt.transfer_id)
        .unwrap();
    assert_eq!(
        node.count_calls(|c| *c == EngineCall::DataTransferred(FaceId(8), "/d".to_string())),
        1
    );
}

/// Repeated sends while queued collapse into one transfer.
#[test]
fn test_pending_duplicate_coalesced() {
    let node = Node::started();
    node.discover("p1", "aa:01");
    node.confirm_face("p1", 7);

    let first = node
        .daemon
        .transfer_interest(FaceId(7), "/x", 1, Bytes::from_static(b"old"))
        .unwrap()
        .unwrap();
    let second = node
        .daemon
        .transfer_interest(FaceId(7), "/x", 1, Bytes::from_static(b"new"))
        .unwrap()
        .unwrap();
    assert!(!first.coalesced);
    assert!(second.coalesced);
    assert_eq!(first.transfer_id, second.transfer_id);

    node.daemon.flush_pending().unwrap();
    let sent = node.store.dispatched();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].payload, Bytes::from_static(b"new"));
}

/// Cancelling a dispatched connection-less Interest withdraws it from the
/// transport without an engine report.
#[test]
fn test_cancel_interest_withdraws() {
    let node = Node::started();
    node.discover("p1", "aa:01");
    node.confirm_face("p1", 7);
    let receipt = node
        .daemon
        .transfer_interest(FaceId(7), "/x", 5, Bytes::from_static(b"i"))
        .unwrap()
        .unwrap();
    node.daemon.flush_pending().unwrap();

    assert!(node.daemon.cancel_interest(FaceId(7), 5).unwrap());
    assert_eq!(
        node.store.cancelled(),
        vec![(PeerId::new("p1"), receipt.transfer_id)]
    );
    assert!(node.daemon.transfers().is_empty());
    assert_eq!(node.count_calls(|c| matches!(c, EngineCall::TransferFailed(..))), 0);
    assert_eq!(node.count_calls(|c| matches!(c, EngineCall::InterestTransferred(..))), 0);

    assert!(!node.daemon.cancel_interest(FaceId(7), 5).unwrap());
}

/// A direct write cannot be withdrawn; the cancel is local only.
#[test]
fn test_cancel_on_direct_path_is_local() {
    let node = Node::started();
    node.connect("p1", "aa:01", 7);
    node.daemon
        .transfer_interest(FaceId(7), "/x", 5, Bytes::from_static(b"i"))
        .unwrap();

    assert!(node.daemon.cancel_interest(FaceId(7), 5).unwrap());
    assert!(node.direct.cancelled().is_empty());
    assert!(node.store.cancelled().is_empty());
    assert!(node.daemon.transfers().is_empty());
}

/// Direct transport failure goes to the engine, and is not retried.
#[test]
fn test_direct_transport_failure_reported() {
    let node = Node::started();
    node.connect("p1", "aa:01", 7);
    node.direct.fail_dispatch(true);

    let receipt = node
        .daemon
        .transfer_interest(FaceId(7), "/x", 3, Bytes::from_static(b"i"))
        .unwrap()
        .unwrap();
    assert_eq!(receipt.state, TransferState::Failed);
    assert_eq!(
        node.count_calls(|c| matches!(c, EngineCall::TransferFailed(FaceId(7), k, _) if *k == interest(3))),
        1
    );
    assert!(node.daemon.transfers().is_empty());
}

/// Packets on faces without a peer are ignored.
#[test]
fn test_transfer_on_unbound_face() {
    let node = Node::started();
    let receipt = node
        .daemon
        .transfer_data(FaceId(99), "/d", Bytes::from_static(b"d"))
        .unwrap();
    assert!(receipt.is_none());
    assert!(node.daemon.transfers().is_empty());
}

/// An inbound packet is handed to the engine on the sender's face.
#[test]
fn test_inbound_packet_reaches_engine() {
    let node = Node::started();
    node.connect("p1", "aa:01", 7);

    assert!(node
        .daemon
        .on_packet_received(&PeerId::new("p1"), Bytes::from_static(&[0x05, 0x01]))
        .unwrap());
    assert_eq!(
        node.count_calls(|c| *c == EngineCall::ReceiveOnFace(FaceId(7), vec![0x05, 0x01])),
        1
    );
    assert!(node.daemon.transfers().is_empty());

    // Unknown senders have no face to arrive on.
    assert!(!node
        .daemon
        .on_packet_received(&PeerId::new("stranger"), Bytes::from_static(&[0x06]))
        .unwrap());
    assert_eq!(node.count_calls(|c| matches!(c, EngineCall::ReceiveOnFace(..))), 1);
}
