//! Daemon start/stop and the adapter calls around it.

use bytes::Bytes;
use ndnopp_core::DaemonError;

use crate::*;

/// Start and stop are idempotent, and the platform receiver is registered once.
#[test]
fn test_start_stop_idempotent() {
    let node = Node::new();
    assert!(!node.daemon.stop().unwrap());

    assert!(node.daemon.start().unwrap());
    assert!(!node.daemon.start().unwrap());
    assert!(node.engine.is_running());
    assert_eq!(node.platform.active_receivers(), 1);
    assert_eq!(node.count_calls(|c| *c == EngineCall::Start), 1);

    assert!(node.daemon.stop().unwrap());
    assert!(!node.daemon.stop().unwrap());
    assert!(!node.engine.is_running());
    assert_eq!(node.platform.active_receivers(), 0);
    assert_eq!(node.count_calls(|c| *c == EngineCall::Stop), 1);
}

/// Calls made while stopped are rejected, not queued.
#[test]
fn test_calls_rejected_while_stopped() {
    let node = Node::new();
    let result = node.daemon.on_service_discovered(
        &PeerId::new("p1"),
        SERVICE,
        &TransportAddress::new("aa:01"),
    );
    assert!(matches!(result, Err(DaemonError::NotRunning)));
    assert!(matches!(
        node.daemon.transfer_data(FaceId(1), "/d", Bytes::new()),
        Err(DaemonError::NotRunning)
    ));
    assert!(matches!(node.daemon.flush_pending(), Err(DaemonError::NotRunning)));

    node.daemon.start().unwrap();
    assert!(node.daemon.peers().is_empty());
    assert!(node.engine.created_faces().is_empty());
}

/// Stop tears down in order: peers lost, faces destroyed, in-flight
/// transfers failed, queued ones cancelled, then the engine stops.
#[test]
fn test_stop_tears_down_everything() {
    let node = Node::started();
    node.connect("p1", "aa:01", 7);
    node.discover("p2", "aa:02");
    node.confirm_face("p2", 8);
    node.scan(&[("aa:01", PeerStatus::Connected), ("aa:02", PeerStatus::Available)]);

    node.daemon
        .transfer_interest(FaceId(7), "/direct", 1, Bytes::from_static(b"i"))
        .unwrap();
    node.daemon
        .transfer_data(FaceId(8), "/queued", Bytes::from_static(b"d"))
        .unwrap();
    assert_eq!(node.daemon.transfers().len(), 2);

    node.daemon.stop().unwrap();

    assert_eq!(node.count_calls(|c| *c == EngineCall::DestroyFace(FaceId(7))), 1);
    assert_eq!(node.count_calls(|c| *c == EngineCall::DestroyFace(FaceId(8))), 1);
    assert_eq!(
        node.count_calls(|c| matches!(c, EngineCall::TransferFailed(FaceId(7), ..))),
        1
    );
    // The queued transfer is cancelled, which the engine is not told about.
    assert_eq!(node.count_calls(|c| matches!(c, EngineCall::TransferFailed(FaceId(8), ..))), 0);
    assert_eq!(node.engine.calls().last(), Some(&EngineCall::Stop));

    assert!(node.daemon.peers().is_empty());
    assert!(node.daemon.faces().is_empty());
    assert!(node.daemon.transfers().is_empty());
    assert!(node.daemon.face_table().is_empty());
}

/// A restarted daemon starts from an empty registry.
#[test]
fn test_restart_starts_fresh() {
    let node = Node::started();
    node.discover("p1", "aa:01");
    node.daemon.stop().unwrap();
    node.daemon.start().unwrap();

    assert!(node.daemon.peers().is_empty());
    node.discover("p1", "aa:01");
    assert_eq!(node.engine.created_faces().len(), 2);
    assert_eq!(node.platform.active_receivers(), 1);
}

/// Wi-Fi P2P toggles drive service discovery requests.
#[test]
fn test_p2p_state_changes() {
    let node = Node::started();
    node.daemon.on_p2p_state_changed(true).unwrap();
    assert_eq!(node.platform.service_requests(), 1);
    assert_eq!(node.platform.discoveries(), 1);

    node.daemon.on_p2p_state_changed(false).unwrap();
    assert_eq!(node.platform.service_requests(), 0);
}

/// Status reflects what the daemon holds.
#[test]
fn test_status_counts() {
    let node = Node::started();
    node.connect("p1", "aa:01", 7);
    node.discover("p2", "aa:02");
    node.scan(&[("aa:01", PeerStatus::Connected)]);

    let status = node.daemon.status();
    assert!(status.running);
    assert_eq!(status.peers, 2);
    assert_eq!(status.reachable_peers, 1);
    assert_eq!(status.faces, 1);
    assert_eq!(status.transfers, 0);

    let json = serde_json::to_value(&status).unwrap();
    assert_eq!(json["local_id"], "00000000-0000-4000-8000-00000000000a");
    assert!(json["uptime_secs"].is_u64());

    node.daemon.stop().unwrap();
    let status = node.daemon.status();
    assert!(!status.running);
    assert_eq!(status.peers, 0);
}

/// Stop racing a stream of host events: calls in progress finish before the
/// teardown, later ones are rejected, and the engine hears nothing after it
/// was stopped.
#[test]
fn test_stop_during_concurrent_events() {
    let node = Node::started();
    let daemon = &node.daemon;

    std::thread::scope(|scope| {
        for i in 0..4 {
            scope.spawn(move || {
                let peer = PeerId::new(format!("p{i}"));
                let mac = TransportAddress::new(format!("aa:0{i}"));
                loop {
                    let result = daemon
                        .on_service_discovered(&peer, SERVICE, &mac)
                        .and_then(|()| daemon.on_scan_result(&[(mac.clone(), PeerStatus::Connected)]))
                        .and_then(|()| daemon.flush_pending().map(|_| ()));
                    match result {
                        Ok(()) => {}
                        Err(DaemonError::NotRunning) => break,
                        Err(e) => panic!("unexpected error: {e}"),
                    }
                }
            });
        }
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert!(daemon.stop().unwrap());
    });

    assert_eq!(node.engine.calls().last(), Some(&EngineCall::Stop));
    assert_eq!(node.platform.active_receivers(), 0);
    assert!(daemon.peers().is_empty());
    assert!(daemon.faces().is_empty());
}
