//! In-memory adapters that record every call. Used by unit tests and,
//! through the `testing` feature, by the integration scenarios.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use ndnopp_core::{EngineError, FaceId, PacketKind, PeerId, PlatformError, TransferId, TransportError};

use crate::engine::{EngineTable, ForwardingEngine, Route};
use crate::platform::P2pPlatform;
use crate::transport::{OutboundPacket, Transport};

// ── Platform ──────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingPlatform {
    receivers: AtomicI64,
    service_requests: AtomicI64,
    discoveries: AtomicUsize,
}

impl RecordingPlatform {
    pub fn active_receivers(&self) -> i64 {
        self.receivers.load(Ordering::SeqCst)
    }

    pub fn service_requests(&self) -> i64 {
        self.service_requests.load(Ordering::SeqCst)
    }

    pub fn discoveries(&self) -> usize {
        self.discoveries.load(Ordering::SeqCst)
    }
}

impl P2pPlatform for RecordingPlatform {
    fn register_receiver(&self) -> Result<(), PlatformError> {
        self.receivers.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn unregister_receiver(&self) -> Result<(), PlatformError> {
        self.receivers.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }

    fn add_service_request(&self) -> Result<(), PlatformError> {
        self.service_requests.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn discover_services(&self) -> Result<(), PlatformError> {
        self.discoveries.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn clear_service_requests(&self) -> Result<(), PlatformError> {
        self.service_requests.store(0, Ordering::SeqCst);
        Ok(())
    }
}

// ── Engine ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    Start,
    Stop,
    CreateFace(String),
    DestroyFace(FaceId),
    BringUpFace(FaceId),
    BringDownFace(FaceId),
    AddRoute(Route),
    RemoveRoute { prefix: String, face_id: FaceId, origin: u64 },
    ReceiveOnFace(FaceId, Vec<u8>),
    InterestTransferred(FaceId, u32),
    DataTransferred(FaceId, String),
    TransferFailed(FaceId, PacketKind, String),
}

#[derive(Default)]
pub struct RecordingEngine {
    calls: Mutex<Vec<EngineCall>>,
    running: AtomicBool,
    fail_create: AtomicBool,
}

impl RecordingEngine {
    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// URIs passed to `create_face`, in call order.
    pub fn created_faces(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                EngineCall::CreateFace(uri) => Some(uri),
                _ => None,
            })
            .collect()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn fail_face_creation(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    fn record(&self, call: EngineCall) {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).push(call);
    }
}

impl ForwardingEngine for RecordingEngine {
    fn start(&self, _home_dir: &Path, _config: &str) -> Result<(), EngineError> {
        self.running.store(true, Ordering::SeqCst);
        self.record(EngineCall::Start);
        Ok(())
    }

    fn stop(&self) -> Result<(), EngineError> {
        self.running.store(false, Ordering::SeqCst);
        self.record(EngineCall::Stop);
        Ok(())
    }

    fn version(&self) -> Result<String, EngineError> {
        Ok("recording-0.1".to_string())
    }

    fn create_face(&self, uri: &str) -> Result<(), EngineError> {
        self.record(EngineCall::CreateFace(uri.to_string()));
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(EngineError::Rejected(format!("cannot create {uri}")));
        }
        Ok(())
    }

    fn destroy_face(&self, face_id: FaceId) -> Result<(), EngineError> {
        self.record(EngineCall::DestroyFace(face_id));
        Ok(())
    }

    fn bring_up_face(&self, face_id: FaceId) -> Result<(), EngineError> {
        self.record(EngineCall::BringUpFace(face_id));
        Ok(())
    }

    fn bring_down_face(&self, face_id: FaceId) -> Result<(), EngineError> {
        self.record(EngineCall::BringDownFace(face_id));
        Ok(())
    }

    fn add_route(&self, route: &Route) -> Result<(), EngineError> {
        self.record(EngineCall::AddRoute(route.clone()));
        Ok(())
    }

    fn remove_route(&self, prefix: &str, face_id: FaceId, origin: u64) -> Result<(), EngineError> {
        self.record(EngineCall::RemoveRoute {
            prefix: prefix.to_string(),
            face_id,
            origin,
        });
        Ok(())
    }

    fn receive_on_face(&self, face_id: FaceId, payload: &[u8]) -> Result<(), EngineError> {
        self.record(EngineCall::ReceiveOnFace(face_id, payload.to_vec()));
        Ok(())
    }

    fn on_interest_transferred(&self, face_id: FaceId, nonce: u32) -> Result<(), EngineError> {
        self.record(EngineCall::InterestTransferred(face_id, nonce));
        Ok(())
    }

    fn on_data_transferred(&self, face_id: FaceId, name: &str) -> Result<(), EngineError> {
        self.record(EngineCall::DataTransferred(face_id, name.to_string()));
        Ok(())
    }

    fn on_transfer_failed(&self, face_id: FaceId, kind: &PacketKind, name: &str) -> Result<(), EngineError> {
        self.record(EngineCall::TransferFailed(face_id, *kind, name.to_string()));
        Ok(())
    }

    fn snapshot(&self, table: EngineTable) -> Result<serde_json::Value, EngineError> {
        Ok(serde_json::json!({ "table": table, "entries": [] }))
    }
}

// ── Transport ─────────────────────────────────────────────────────────────────

pub struct RecordingTransport {
    dispatched: Mutex<Vec<OutboundPacket>>,
    cancelled: Mutex<Vec<(PeerId, TransferId)>>,
    cancellable: AtomicBool,
    fail: AtomicBool,
}

impl RecordingTransport {
    /// `cancellable` decides whether `cancel` can withdraw packets.
    pub fn new(cancellable: bool) -> Self {
        Self {
            dispatched: Mutex::new(Vec::new()),
            cancelled: Mutex::new(Vec::new()),
            cancellable: AtomicBool::new(cancellable),
            fail: AtomicBool::new(false),
        }
    }

    pub fn dispatched(&self) -> Vec<OutboundPacket> {
        self.dispatched.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn dispatched_to(&self, peer_id: &PeerId) -> usize {
        self.dispatched()
            .iter()
            .filter(|p| &p.peer_id == peer_id)
            .count()
    }

    pub fn cancelled(&self) -> Vec<(PeerId, TransferId)> {
        self.cancelled.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn fail_dispatch(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl Default for RecordingTransport {
    fn default() -> Self {
        Self::new(false)
    }
}

impl Transport for RecordingTransport {
    fn dispatch(&self, packet: &OutboundPacket) -> Result<(), TransportError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(TransportError::WriteFailed("link down".to_string()));
        }
        self.dispatched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(packet.clone());
        Ok(())
    }

    fn cancel(&self, peer_id: &PeerId, transfer_id: &TransferId) -> bool {
        if !self.cancellable.load(Ordering::SeqCst) {
            return false;
        }
        self.cancelled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((peer_id.clone(), *transfer_id));
        true
    }
}
