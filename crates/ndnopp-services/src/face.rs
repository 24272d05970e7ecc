//! Face registry — keeps the engine's opportunistic faces in step with peer availability.
//!
//! A reachable peer gets a face; an unavailable one loses it. Face ids are
//! allocated by the engine and only ever referenced here. Creation is
//! confirmed asynchronously and matched back by the peer id embedded in the
//! face URI, so confirmations may arrive in any order.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::mpsc;

use ndnopp_core::{EngineError, FaceDescriptor, FaceId, PeerId, PeerStatus};

use crate::engine::ForwardingEngine;
use crate::peer::PeerDelta;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FaceState {
    /// Creation requested, engine has not confirmed yet.
    PendingConfirm,
    Up,
    /// Face exists but the peer is invited or failed.
    Down,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FaceBinding {
    pub peer_id: PeerId,
    pub face_id: Option<FaceId>,
    pub state: FaceState,
}

/// Face lifecycle notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaceEvent {
    Created { peer_id: PeerId, face_id: FaceId },
    /// Not retried; the next availability delta for the peer tries again.
    CreationFailed { peer_id: PeerId, error: EngineError },
    Destroyed { peer_id: PeerId, face_id: Option<FaceId> },
}

#[derive(Default)]
struct Inner {
    by_peer: HashMap<PeerId, FaceBinding>,
    by_face: HashMap<FaceId, PeerId>,
}

impl Inner {
    fn unbind(&mut self, peer_id: &PeerId) -> Option<FaceBinding> {
        let binding = self.by_peer.remove(peer_id)?;
        if let Some(face_id) = binding.face_id {
            self.by_face.remove(&face_id);
        }
        Some(binding)
    }
}

enum FaceAction {
    Create(PeerId),
    Destroy(PeerId, Option<FaceId>),
    BringUp(FaceId),
    BringDown(FaceId),
}

pub struct FaceRegistry {
    engine: Arc<dyn ForwardingEngine>,
    inner: Mutex<Inner>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<FaceEvent>>>,
}

impl FaceRegistry {
    pub fn new(engine: Arc<dyn ForwardingEngine>) -> Self {
        Self {
            engine,
            inner: Mutex::new(Inner::default()),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<FaceEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// React to a peer delta. Engine requests are issued after the lock is released.
    pub fn apply_delta(&self, delta: &PeerDelta) {
        let mut actions = Vec::new();
        {
            let mut inner = self.lock();
            for change in delta.iter() {
                let peer_id = change.peer_id();
                match change.status() {
                    PeerStatus::Available | PeerStatus::Connected => {
                        match inner.by_peer.get_mut(peer_id) {
                            None => {
                                inner.by_peer.insert(
                                    peer_id.clone(),
                                    FaceBinding {
                                        peer_id: peer_id.clone(),
                                        face_id: None,
                                        state: FaceState::PendingConfirm,
                                    },
                                );
                                actions.push(FaceAction::Create(peer_id.clone()));
                            }
                            Some(binding) if binding.state == FaceState::Down => {
                                binding.state = FaceState::Up;
                                if let Some(face_id) = binding.face_id {
                                    actions.push(FaceAction::BringUp(face_id));
                                }
                            }
                            Some(_) => {}
                        }
                    }
                    PeerStatus::Invited | PeerStatus::Failed => {
                        if let Some(binding) = inner.by_peer.get_mut(peer_id) {
                            if binding.state == FaceState::Up {
                                binding.state = FaceState::Down;
                                if let Some(face_id) = binding.face_id {
                                    actions.push(FaceAction::BringDown(face_id));
                                }
                            }
                        }
                    }
                    PeerStatus::Unavailable => {
                        if let Some(binding) = inner.unbind(peer_id) {
                            actions.push(FaceAction::Destroy(peer_id.clone(), binding.face_id));
                        }
                    }
                }
            }
        }

        for action in actions {
            self.perform(action);
        }
    }

    fn perform(&self, action: FaceAction) {
        match action {
            FaceAction::Create(peer_id) => {
                let uri = peer_id.face_uri();
                match self.engine.create_face(&uri) {
                    Ok(()) => tracing::debug!(peer = %peer_id, uri = %uri, "face creation requested"),
                    Err(error) => {
                        {
                            let mut inner = self.lock();
                            let unconfirmed = inner
                                .by_peer
                                .get(&peer_id)
                                .is_some_and(|b| b.face_id.is_none());
                            if unconfirmed {
                                inner.by_peer.remove(&peer_id);
                            }
                        }
                        tracing::warn!(peer = %peer_id, error = %error, "face creation failed");
                        self.publish(FaceEvent::CreationFailed { peer_id, error });
                    }
                }
            }
            FaceAction::Destroy(peer_id, face_id) => {
                if let Some(face_id) = face_id {
                    match self.engine.destroy_face(face_id) {
                        Ok(()) | Err(EngineError::UnknownFace(_)) => {}
                        Err(e) => {
                            tracing::warn!(peer = %peer_id, face_id = %face_id, error = %e, "face destruction failed")
                        }
                    }
                }
                tracing::debug!(peer = %peer_id, ?face_id, "face binding removed");
                self.publish(FaceEvent::Destroyed { peer_id, face_id });
            }
            FaceAction::BringUp(face_id) => {
                if let Err(e) = self.engine.bring_up_face(face_id) {
                    tracing::warn!(face_id = %face_id, error = %e, "failed to bring face up");
                }
            }
            FaceAction::BringDown(face_id) => {
                if let Err(e) = self.engine.bring_down_face(face_id) {
                    tracing::warn!(face_id = %face_id, error = %e, "failed to bring face down");
                }
            }
        }
    }

    /// The engine added a face. Binds it if a creation for that peer is pending.
    ///
    /// A confirmation for a peer with no pending binding (the peer left in
    /// the meantime) or for a peer that already has a face is not bound;
    /// the orphaned engine face is destroyed. Returns the peer the face was
    /// bound to.
    pub fn on_face_added(&self, descriptor: &FaceDescriptor) -> Option<PeerId> {
        let peer_id = descriptor.peer_id()?;
        let face_id = descriptor.face_id;
        let bound = {
            let mut inner = self.lock();
            let existing = inner.by_peer.get(&peer_id).map(|b| b.face_id);
            match existing {
                None => {
                    tracing::debug!(peer = %peer_id, face_id = %face_id, "late face confirmation");
                    false
                }
                Some(Some(existing)) if existing == face_id => return Some(peer_id),
                Some(Some(existing)) => {
                    tracing::warn!(peer = %peer_id, existing = %existing, face_id = %face_id, "peer already has a face");
                    false
                }
                Some(None) => {
                    if let Some(binding) = inner.by_peer.get_mut(&peer_id) {
                        binding.face_id = Some(face_id);
                        binding.state = FaceState::Up;
                    }
                    inner.by_face.insert(face_id, peer_id.clone());
                    true
                }
            }
        };

        if !bound {
            match self.engine.destroy_face(face_id) {
                Ok(()) | Err(EngineError::UnknownFace(_)) => {}
                Err(e) => tracing::warn!(face_id = %face_id, error = %e, "failed to destroy orphaned face"),
            }
            return None;
        }

        if let Err(e) = self.engine.bring_up_face(face_id) {
            tracing::warn!(face_id = %face_id, error = %e, "failed to bring face up");
        }
        tracing::info!(peer = %peer_id, face_id = %face_id, "face up");
        self.publish(FaceEvent::Created {
            peer_id: peer_id.clone(),
            face_id,
        });
        Some(peer_id)
    }

    /// The engine removed a face. Unknown faces are a no-op.
    pub fn on_face_removed(&self, face_id: FaceId) -> Option<PeerId> {
        let peer_id = {
            let mut inner = self.lock();
            let peer_id = inner.by_face.get(&face_id).cloned()?;
            inner.unbind(&peer_id);
            peer_id
        };
        tracing::debug!(peer = %peer_id, face_id = %face_id, "face removed by engine");
        self.publish(FaceEvent::Destroyed {
            peer_id: peer_id.clone(),
            face_id: Some(face_id),
        });
        Some(peer_id)
    }

    /// Face of a peer, only while it is up.
    pub fn face_id(&self, peer_id: &PeerId) -> Option<FaceId> {
        self.lock()
            .by_peer
            .get(peer_id)
            .filter(|b| b.state == FaceState::Up)
            .and_then(|b| b.face_id)
    }

    /// Peer bound to a face.
    pub fn peer_id(&self, face_id: FaceId) -> Option<PeerId> {
        self.lock().by_face.get(&face_id).cloned()
    }

    pub fn binding(&self, peer_id: &PeerId) -> Option<FaceBinding> {
        self.lock().by_peer.get(peer_id).cloned()
    }

    pub fn snapshot(&self) -> Vec<FaceBinding> {
        let mut bindings: Vec<FaceBinding> = self.lock().by_peer.values().cloned().collect();
        bindings.sort_by(|a, b| a.peer_id.cmp(&b.peer_id));
        bindings
    }

    pub fn len(&self) -> usize {
        self.lock().by_peer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().by_peer.is_empty()
    }

    /// Drop every binding and destroy the faces behind them.
    pub fn clear(&self) -> usize {
        let bindings: Vec<FaceBinding> = {
            let mut inner = self.lock();
            inner.by_face.clear();
            inner.by_peer.drain().map(|(_, b)| b).collect()
        };
        let count = bindings.len();
        for binding in bindings {
            self.perform(FaceAction::Destroy(binding.peer_id, binding.face_id));
        }
        count
    }

    fn publish(&self, event: FaceEvent) {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{EngineCall, RecordingEngine};
    use crate::peer::{PeerChange, PeerRecord};
    use ndnopp_core::TransportAddress;
    use std::time::Instant;

    fn delta(entries: &[(&str, PeerStatus)]) -> PeerDelta {
        PeerDelta {
            changes: entries
                .iter()
                .map(|(id, status)| PeerChange {
                    record: PeerRecord {
                        peer_id: PeerId::new(*id),
                        transport_address: TransportAddress::new("aa:bb"),
                        status: *status,
                        last_seen: Instant::now(),
                    },
                    previous: None,
                })
                .collect(),
        }
    }

    fn added(peer: &str, face: u64) -> FaceDescriptor {
        FaceDescriptor {
            face_id: FaceId(face),
            uri: PeerId::new(peer).face_uri(),
            local_uri: String::new(),
            persistency: "persistent".to_string(),
        }
    }

    fn registry() -> (FaceRegistry, Arc<RecordingEngine>) {
        let engine = Arc::new(RecordingEngine::default());
        (FaceRegistry::new(engine.clone()), engine)
    }

    #[test]
    fn available_peer_requests_one_face() {
        let (faces, engine) = registry();
        faces.apply_delta(&delta(&[("p1", PeerStatus::Available)]));
        faces.apply_delta(&delta(&[("p1", PeerStatus::Connected)]));

        assert_eq!(engine.created_faces(), vec!["opp://p1".to_string()]);
        assert_eq!(faces.len(), 1);
        assert_eq!(faces.binding(&PeerId::new("p1")).unwrap().state, FaceState::PendingConfirm);
        assert_eq!(faces.face_id(&PeerId::new("p1")), None);
    }

    #[test]
    fn confirmation_brings_face_up() {
        let (faces, engine) = registry();
        let mut events = faces.subscribe();
        faces.apply_delta(&delta(&[("p1", PeerStatus::Available)]));

        assert_eq!(faces.on_face_added(&added("p1", 7)), Some(PeerId::new("p1")));
        assert_eq!(faces.face_id(&PeerId::new("p1")), Some(FaceId(7)));
        assert_eq!(faces.peer_id(FaceId(7)), Some(PeerId::new("p1")));
        assert!(engine.calls().contains(&EngineCall::BringUpFace(FaceId(7))));
        assert_eq!(
            events.try_recv().unwrap(),
            FaceEvent::Created { peer_id: PeerId::new("p1"), face_id: FaceId(7) }
        );
    }

    #[test]
    fn confirmations_match_by_peer_not_order() {
        let (faces, _) = registry();
        faces.apply_delta(&delta(&[("p1", PeerStatus::Available), ("p2", PeerStatus::Available)]));

        faces.on_face_added(&added("p2", 20));
        faces.on_face_added(&added("p1", 10));

        assert_eq!(faces.face_id(&PeerId::new("p1")), Some(FaceId(10)));
        assert_eq!(faces.face_id(&PeerId::new("p2")), Some(FaceId(20)));
    }

    #[test]
    fn late_confirmation_does_not_resurrect() {
        let (faces, engine) = registry();
        faces.apply_delta(&delta(&[("p1", PeerStatus::Available)]));
        faces.apply_delta(&delta(&[("p1", PeerStatus::Unavailable)]));
        assert!(faces.is_empty());

        assert_eq!(faces.on_face_added(&added("p1", 3)), None);
        assert!(faces.is_empty());
        assert_eq!(faces.peer_id(FaceId(3)), None);
        assert!(!engine.calls().contains(&EngineCall::BringUpFace(FaceId(3))));
        assert_eq!(
            engine.calls().iter().filter(|c| **c == EngineCall::DestroyFace(FaceId(3))).count(),
            1
        );
    }

    #[test]
    fn second_face_for_bound_peer_is_destroyed() {
        let (faces, engine) = registry();
        faces.apply_delta(&delta(&[("p1", PeerStatus::Available)]));
        faces.on_face_added(&added("p1", 4));

        assert_eq!(faces.on_face_added(&added("p1", 5)), None);
        assert_eq!(faces.face_id(&PeerId::new("p1")), Some(FaceId(4)));
        assert!(engine.calls().contains(&EngineCall::DestroyFace(FaceId(5))));
        assert!(!engine.calls().contains(&EngineCall::DestroyFace(FaceId(4))));

        // A repeated confirmation of the bound face is harmless.
        assert_eq!(faces.on_face_added(&added("p1", 4)), Some(PeerId::new("p1")));
        assert!(!engine.calls().contains(&EngineCall::DestroyFace(FaceId(4))));
    }

    #[test]
    fn unavailable_peer_destroys_face_immediately() {
        let (faces, engine) = registry();
        faces.apply_delta(&delta(&[("p1", PeerStatus::Available)]));
        faces.on_face_added(&added("p1", 4));

        faces.apply_delta(&delta(&[("p1", PeerStatus::Unavailable)]));

        assert!(faces.binding(&PeerId::new("p1")).is_none());
        assert_eq!(faces.peer_id(FaceId(4)), None);
        assert!(engine.calls().contains(&EngineCall::DestroyFace(FaceId(4))));

        // Next availability creates a fresh binding.
        faces.apply_delta(&delta(&[("p1", PeerStatus::Available)]));
        assert_eq!(engine.created_faces().len(), 2);
    }

    #[test]
    fn creation_failure_is_reported_without_retry() {
        let (faces, engine) = registry();
        engine.fail_face_creation(true);
        let mut events = faces.subscribe();

        faces.apply_delta(&delta(&[("p1", PeerStatus::Available)]));

        assert!(faces.is_empty());
        assert!(matches!(events.try_recv().unwrap(), FaceEvent::CreationFailed { .. }));
        assert_eq!(engine.created_faces().len(), 1);

        engine.fail_face_creation(false);
        faces.apply_delta(&delta(&[("p1", PeerStatus::Available)]));
        assert_eq!(faces.len(), 1);
    }

    #[test]
    fn failed_peer_brings_face_down_then_up() {
        let (faces, engine) = registry();
        faces.apply_delta(&delta(&[("p1", PeerStatus::Available)]));
        faces.on_face_added(&added("p1", 5));

        faces.apply_delta(&delta(&[("p1", PeerStatus::Failed)]));
        assert_eq!(faces.face_id(&PeerId::new("p1")), None);
        assert_eq!(faces.peer_id(FaceId(5)), Some(PeerId::new("p1")));
        assert!(engine.calls().contains(&EngineCall::BringDownFace(FaceId(5))));

        faces.apply_delta(&delta(&[("p1", PeerStatus::Available)]));
        assert_eq!(faces.face_id(&PeerId::new("p1")), Some(FaceId(5)));
        assert_eq!(engine.created_faces().len(), 1);
    }

    #[test]
    fn engine_removal_is_idempotent() {
        let (faces, _) = registry();
        faces.apply_delta(&delta(&[("p1", PeerStatus::Available)]));
        faces.on_face_added(&added("p1", 9));

        assert_eq!(faces.on_face_removed(FaceId(9)), Some(PeerId::new("p1")));
        assert_eq!(faces.on_face_removed(FaceId(9)), None);
        assert_eq!(faces.on_face_removed(FaceId(1234)), None);
        assert!(faces.is_empty());
    }

    #[test]
    fn non_opportunistic_faces_are_ignored() {
        let (faces, _) = registry();
        let descriptor = FaceDescriptor {
            face_id: FaceId(1),
            uri: "internal://".to_string(),
            local_uri: String::new(),
            persistency: String::new(),
        };
        assert_eq!(faces.on_face_added(&descriptor), None);
    }

    #[test]
    fn clear_destroys_every_face() {
        let (faces, engine) = registry();
        faces.apply_delta(&delta(&[("p1", PeerStatus::Available), ("p2", PeerStatus::Available)]));
        faces.on_face_added(&added("p1", 1));

        assert_eq!(faces.clear(), 2);
        assert!(faces.is_empty());
        assert!(engine.calls().contains(&EngineCall::DestroyFace(FaceId(1))));
    }
}
