//! Peer discovery and scan reconciliation.

use ndnopp_services::{PeerRegistry, PeerTracker};

use crate::*;

// ══════════════════════════════════════════════════════════════════════════════
//  Registry growth
// ══════════════════════════════════════════════════════════════════════════════

/// Rediscovery, scans and address changes never duplicate or drop a peer.
#[test]
fn test_registry_only_grows() {
    let node = Node::started();
    node.discover("p1", "aa:00:00:00:00:01");
    node.discover("p2", "aa:00:00:00:00:02");
    assert_eq!(node.daemon.peers().len(), 2);

    node.scan(&[]);
    assert_eq!(node.daemon.peers().len(), 2);

    // p1 comes back on a new MAC.
    node.discover("p1", "aa:00:00:00:00:99");
    node.discover("p1", "aa:00:00:00:00:99");
    let peers = node.daemon.peers();
    assert_eq!(peers.len(), 2);
    let p1 = peers.iter().find(|p| p.peer_id == PeerId::new("p1")).unwrap();
    assert_eq!(p1.transport_address, TransportAddress::new("aa:00:00:00:00:99"));
    assert_eq!(p1.status, PeerStatus::Available);
    assert_eq!(node.peer_status("p2"), Some(PeerStatus::Unavailable));
}

/// Own advertisements and other services never become peers.
#[test]
fn test_foreign_and_own_services_ignored() {
    let node = Node::started();
    let own = node.daemon.local_id().clone();
    node.daemon
        .on_service_discovered(&own, SERVICE, &TransportAddress::new("aa:00"))
        .unwrap();
    node.daemon
        .on_service_discovered(&PeerId::new("printer"), "_ipp._tcp", &TransportAddress::new("aa:01"))
        .unwrap();
    assert!(node.daemon.peers().is_empty());
    assert!(node.engine.created_faces().is_empty());
}

// ══════════════════════════════════════════════════════════════════════════════
//  Scan reconciliation
// ══════════════════════════════════════════════════════════════════════════════

/// Known P1 on AA:BB, scan without AA:BB: P1 becomes Unavailable in a
/// single delta holding only P1.
#[test]
fn test_scan_absence_marks_peer_unavailable() {
    let registry = Arc::new(PeerRegistry::new());
    let tracker = PeerTracker::new(
        registry.clone(),
        Arc::new(RecordingPlatform::default()),
        PeerId::new("self"),
        "_ndnopp",
    );
    tracker.enable().unwrap();
    tracker.on_service_discovered(&PeerId::new("P1"), "_ndnopp", &TransportAddress::new("AA:BB"));
    let mut deltas = tracker.subscribe();

    tracker.on_scan_result(&[(TransportAddress::new("CC:DD"), PeerStatus::Available)]);

    let delta = deltas.try_recv().expect("one delta");
    assert_eq!(delta.len(), 1);
    assert_eq!(
        delta.get(&PeerId::new("P1")).map(|c| c.status()),
        Some(PeerStatus::Unavailable)
    );
    assert!(deltas.try_recv().is_err());
    assert_eq!(registry.status(&PeerId::new("P1")), Some(PeerStatus::Unavailable));
}

/// Scan statuses are taken as reported, and drive face state.
#[test]
fn test_scan_status_drives_faces() {
    let node = Node::started();
    node.discover("p1", "aa:01");
    node.confirm_face("p1", 40);

    node.scan(&[("aa:01", PeerStatus::Invited)]);
    assert_eq!(node.peer_status("p1"), Some(PeerStatus::Invited));
    assert_eq!(node.count_calls(|c| *c == EngineCall::BringDownFace(FaceId(40))), 1);

    node.scan(&[("aa:01", PeerStatus::Connected)]);
    assert_eq!(node.peer_status("p1"), Some(PeerStatus::Connected));
    // Initial bring-up plus the recovery.
    assert_eq!(node.count_calls(|c| *c == EngineCall::BringUpFace(FaceId(40))), 2);
}

/// Tracker disable flags everyone Unavailable in exactly one delta.
#[test]
fn test_disable_emits_single_delta() {
    let registry = Arc::new(PeerRegistry::new());
    let tracker = PeerTracker::new(
        registry.clone(),
        Arc::new(RecordingPlatform::default()),
        PeerId::new("self"),
        "_ndnopp",
    );
    tracker.enable().unwrap();
    for (id, mac) in [("p1", "aa:01"), ("p2", "aa:02"), ("p3", "aa:03"), ("p4", "aa:04")] {
        tracker.on_service_discovered(&PeerId::new(id), "_ndnopp", &TransportAddress::new(mac));
    }
    tracker.on_scan_result(&[
        (TransportAddress::new("aa:01"), PeerStatus::Connected),
        (TransportAddress::new("aa:02"), PeerStatus::Available),
        (TransportAddress::new("aa:03"), PeerStatus::Failed),
    ]);
    let mut deltas = tracker.subscribe();

    tracker.disable().unwrap();

    let delta = deltas.try_recv().expect("disable delta");
    assert_eq!(delta.len(), 3);
    assert!(delta.get(&PeerId::new("p4")).is_none());
    assert!(deltas.try_recv().is_err());
    assert!(registry
        .snapshot()
        .iter()
        .all(|p| p.status == PeerStatus::Unavailable));
}
