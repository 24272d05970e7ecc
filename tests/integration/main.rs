//! ndn-opp integration test harness.
//!
//! Tests drive a full `Daemon` in-process. The forwarding engine, the Wi-Fi
//! P2P platform and both transports are recording fakes, so every scenario
//! can inspect exactly what the daemon asked of them.
//!
//!   cargo test --test integration

use std::sync::Arc;

use ndnopp_core::config::OppConfig;
use ndnopp_core::{FaceDescriptor, FaceId, PeerId, PeerStatus, TransportAddress};
use ndnopp_services::fakes::{EngineCall, RecordingEngine, RecordingPlatform, RecordingTransport};
use ndnopp_services::{Adapters, Daemon, Transports};

mod discovery;
mod faces;
mod lifecycle;
mod transfers;

// ── Harness ───────────────────────────────────────────────────────────────────

/// Service instance type every test node advertises and accepts.
pub const SERVICE: &str = "_ndnopp._tcp.local.";

/// A daemon wired to recording adapters.
pub struct Node {
    pub daemon: Daemon,
    pub engine: Arc<RecordingEngine>,
    pub platform: Arc<RecordingPlatform>,
    pub direct: Arc<RecordingTransport>,
    pub store: Arc<RecordingTransport>,
}

impl Node {
    pub fn new() -> Self {
        let engine = Arc::new(RecordingEngine::default());
        let platform = Arc::new(RecordingPlatform::default());
        let direct = Arc::new(RecordingTransport::new(false));
        let store = Arc::new(RecordingTransport::new(true));

        let mut config = OppConfig::default();
        config.engine.home_dir = std::env::temp_dir().join("ndnopp-integration");
        config.engine.config_path = std::env::temp_dir().join("ndnopp-integration-missing.conf");

        let daemon = Daemon::new(
            config,
            PeerId::new("00000000-0000-4000-8000-00000000000a"),
            Adapters {
                engine: engine.clone(),
                platform: platform.clone(),
                transports: Transports {
                    connection_oriented: direct.clone(),
                    connection_less: store.clone(),
                },
            },
        );
        Self {
            daemon,
            engine,
            platform,
            direct,
            store,
        }
    }

    /// A started node.
    pub fn started() -> Self {
        let node = Self::new();
        node.daemon.start().expect("daemon should start");
        node
    }

    /// Deliver a service-discovery response for `peer` on `mac`.
    pub fn discover(&self, peer: &str, mac: &str) {
        self.daemon
            .on_service_discovered(&PeerId::new(peer), SERVICE, &TransportAddress::new(mac))
            .expect("daemon should accept discovery");
    }

    /// Deliver a peer-list scan.
    pub fn scan(&self, devices: &[(&str, PeerStatus)]) {
        let observed: Vec<(TransportAddress, PeerStatus)> = devices
            .iter()
            .map(|(mac, status)| (TransportAddress::new(mac), *status))
            .collect();
        self.daemon
            .on_scan_result(&observed)
            .expect("daemon should accept scan");
    }

    /// The engine confirms the face it was asked to create for `peer`.
    pub fn confirm_face(&self, peer: &str, face_id: u64) -> Option<PeerId> {
        self.daemon
            .after_face_added(FaceDescriptor {
                face_id: FaceId(face_id),
                uri: PeerId::new(peer).face_uri(),
                local_uri: "opp://local".to_string(),
                persistency: "on-demand".to_string(),
            })
            .expect("daemon should accept face confirmation")
    }

    /// Discover, confirm a face and report a direct link.
    pub fn connect(&self, peer: &str, mac: &str, face_id: u64) {
        self.discover(peer, mac);
        self.confirm_face(peer, face_id);
        self.scan(&[(mac, PeerStatus::Connected)]);
    }

    pub fn peer_status(&self, peer: &str) -> Option<PeerStatus> {
        let id = PeerId::new(peer);
        self.daemon
            .peers()
            .into_iter()
            .find(|p| p.peer_id == id)
            .map(|p| p.status)
    }

    pub fn count_calls(&self, predicate: impl Fn(&EngineCall) -> bool) -> usize {
        self.engine.calls().iter().filter(|c| predicate(c)).count()
    }
}
