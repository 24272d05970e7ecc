//! Face lifecycle against the engine.

use crate::*;

/// A peer never holds two faces, and an Unavailable peer loses its face
/// before a later Available can create another.
#[test]
fn test_one_face_per_peer() {
    let node = Node::started();
    node.discover("p1", "aa:01");
    node.scan(&[("aa:01", PeerStatus::Available)]);
    node.scan(&[("aa:01", PeerStatus::Connected)]);
    assert_eq!(node.engine.created_faces(), vec!["opp://p1".to_string()]);

    node.confirm_face("p1", 1);
    node.scan(&[]);
    assert!(node.daemon.faces().is_empty());
    assert_eq!(node.count_calls(|c| *c == EngineCall::DestroyFace(FaceId(1))), 1);

    node.discover("p1", "aa:01");
    assert_eq!(node.engine.created_faces().len(), 2);
    assert_eq!(node.daemon.faces().len(), 1);
}

/// Face requested, peer gone before confirmation: the late confirmation
/// does not bring the binding back, and the engine face is destroyed.
#[test]
fn test_late_confirmation_is_ignored() {
    let node = Node::started();
    node.discover("p1", "aa:01");
    node.scan(&[]);

    assert_eq!(node.confirm_face("p1", 5), None);
    assert!(node.daemon.faces().is_empty());
    assert_eq!(node.count_calls(|c| *c == EngineCall::BringUpFace(FaceId(5))), 0);
    assert_eq!(node.count_calls(|c| *c == EngineCall::DestroyFace(FaceId(5))), 1);
    // The engine's own table still lists the face until it reports the removal.
    assert_eq!(node.daemon.face_table().len(), 1);
    assert_eq!(node.daemon.before_face_removed(FaceId(5)).unwrap(), None);
    assert!(node.daemon.face_table().is_empty());
}

/// Confirmations are matched by peer, in whatever order they arrive.
#[test]
fn test_out_of_order_confirmations() {
    let node = Node::started();
    node.discover("p1", "aa:01");
    node.discover("p2", "aa:02");

    assert_eq!(node.confirm_face("p2", 21), Some(PeerId::new("p2")));
    assert_eq!(node.confirm_face("p1", 11), Some(PeerId::new("p1")));

    let faces = node.daemon.faces();
    assert_eq!(faces[0].face_id, Some(FaceId(11)));
    assert_eq!(faces[1].face_id, Some(FaceId(21)));
}

/// Failed creation is not retried until the peer is seen again.
#[test]
fn test_face_creation_failure() {
    let node = Node::started();
    node.engine.fail_face_creation(true);
    node.discover("p1", "aa:01");
    assert!(node.daemon.faces().is_empty());
    assert_eq!(node.engine.created_faces().len(), 1);

    node.engine.fail_face_creation(false);
    node.scan(&[]);
    node.discover("p1", "aa:01");
    assert_eq!(node.engine.created_faces().len(), 2);
    assert_eq!(node.daemon.faces().len(), 1);
}

/// Engine-side removal drops the binding; an unknown face id is harmless.
#[test]
fn test_engine_removes_face() {
    let node = Node::started();
    node.discover("p1", "aa:01");
    node.confirm_face("p1", 3);

    assert_eq!(node.daemon.before_face_removed(FaceId(3)).unwrap(), Some(PeerId::new("p1")));
    assert!(node.daemon.faces().is_empty());
    assert_eq!(node.daemon.before_face_removed(FaceId(999)).unwrap(), None);
}
