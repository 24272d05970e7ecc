//! Host bridge — newline-delimited JSON between ndnoppd and the host process.
//!
//! The host owns the forwarding engine, the Wi-Fi P2P stack and the packet
//! links. It reports what happens to them as [`HostEvent`] lines on our
//! stdin; we ask it to act with [`HostCommand`] lines on our stdout.
//! Packet payloads travel hex-encoded.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use ndnopp_core::{
    DaemonError, EngineError, FaceDescriptor, FaceId, PacketKind, PeerId, PeerStatus,
    PlatformError, TransferId, TransportAddress, TransportError, TransportPath,
};
use ndnopp_services::{
    Adapters, Daemon, EngineTable, ForwardingEngine, OutboundPacket, P2pPlatform, Route,
    Transport, Transports,
};

mod hex_payload {
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(payload: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(payload))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map(Bytes::from).map_err(serde::de::Error::custom)
    }
}

/// One device from a peer-list scan, with its platform status code.
#[derive(Debug, Clone, Deserialize)]
pub struct ScannedDevice {
    pub address: TransportAddress,
    pub status: i32,
}

/// Events reported by the host.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HostEvent {
    Start,
    Stop,
    Flush,
    EngineInfo { version: String },
    EngineTable { table: EngineTable, snapshot: serde_json::Value },
    P2pStateChanged { enabled: bool },
    ServiceDiscovered { peer_id: PeerId, service_type: String, address: TransportAddress },
    ScanResult { devices: Vec<ScannedDevice> },
    FaceAdded { face: FaceDescriptor },
    FaceRemoved { face_id: FaceId },
    TransferInterest {
        face_id: FaceId,
        name: String,
        nonce: u32,
        #[serde(with = "hex_payload")]
        payload: Bytes,
    },
    TransferData {
        face_id: FaceId,
        name: String,
        #[serde(with = "hex_payload")]
        payload: Bytes,
    },
    CancelInterest { face_id: FaceId, nonce: u32 },
    PacketTransferred { peer_id: PeerId, transfer_id: TransferId },
    TransferFailed { peer_id: PeerId, transfer_id: TransferId, reason: String },
    PacketReceived {
        peer_id: PeerId,
        #[serde(with = "hex_payload")]
        payload: Bytes,
    },
}

/// Requests to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum HostCommand {
    StartEngine { home_dir: String, config: String },
    StopEngine,
    CreateFace { uri: String },
    DestroyFace { face_id: FaceId },
    BringUpFace { face_id: FaceId },
    BringDownFace { face_id: FaceId },
    AddRoute { route: Route },
    RemoveRoute { prefix: String, face_id: FaceId, origin: u64 },
    ReceiveOnFace {
        face_id: FaceId,
        #[serde(with = "hex_payload")]
        payload: Bytes,
    },
    InterestTransferred { face_id: FaceId, nonce: u32 },
    DataTransferred { face_id: FaceId, name: String },
    TransferFailed { face_id: FaceId, packet: PacketKind, name: String },
    RegisterReceiver,
    UnregisterReceiver,
    AddServiceRequest,
    DiscoverServices,
    ClearServiceRequests,
    Dispatch {
        path: TransportPath,
        peer_id: PeerId,
        transfer_id: TransferId,
        packet: PacketKind,
        name: String,
        #[serde(with = "hex_payload")]
        payload: Bytes,
    },
    Withdraw { peer_id: PeerId, transfer_id: TransferId },
}

/// Forwards adapter calls to the host as commands.
pub struct HostBridge {
    commands: Mutex<Option<mpsc::UnboundedSender<HostCommand>>>,
    engine_running: AtomicBool,
    engine_version: Mutex<Option<String>>,
    tables: DashMap<EngineTable, serde_json::Value>,
}

impl HostBridge {
    pub fn new(commands: mpsc::UnboundedSender<HostCommand>) -> Self {
        Self {
            commands: Mutex::new(Some(commands)),
            engine_running: AtomicBool::new(false),
            engine_version: Mutex::new(None),
            tables: DashMap::new(),
        }
    }

    /// The adapters a daemon needs, all backed by this bridge.
    pub fn adapters(self: &Arc<Self>) -> Adapters {
        Adapters {
            engine: self.clone(),
            platform: self.clone(),
            transports: Transports {
                connection_oriented: Arc::new(BridgeTransport {
                    bridge: self.clone(),
                    path: TransportPath::ConnectionOriented,
                }),
                connection_less: Arc::new(BridgeTransport {
                    bridge: self.clone(),
                    path: TransportPath::ConnectionLess,
                }),
            },
        }
    }

    /// Stop emitting commands. The writer drains what is queued and exits.
    pub fn close(&self) {
        self.commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    fn send(&self, command: HostCommand) -> Result<(), String> {
        let guard = self.commands.lock().unwrap_or_else(PoisonError::into_inner);
        let tx = guard.as_ref().ok_or_else(|| "host bridge closed".to_string())?;
        tx.send(command).map_err(|_| "host command stream closed".to_string())
    }

    fn engine_command(&self, command: HostCommand) -> Result<(), EngineError> {
        if !self.engine_running.load(Ordering::SeqCst) {
            return Err(EngineError::NotRunning);
        }
        self.send(command).map_err(EngineError::Bridge)
    }

    fn platform_command(&self, call: &'static str, command: HostCommand) -> Result<(), PlatformError> {
        self.send(command)
            .map_err(|reason| PlatformError::CallFailed { call, reason })
    }

    fn record_engine_info(&self, version: String) {
        *self
            .engine_version
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(version);
    }
}

impl ForwardingEngine for HostBridge {
    fn start(&self, home_dir: &Path, config: &str) -> Result<(), EngineError> {
        self.send(HostCommand::StartEngine {
            home_dir: home_dir.display().to_string(),
            config: config.to_string(),
        })
        .map_err(EngineError::Bridge)?;
        self.engine_running.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) -> Result<(), EngineError> {
        self.engine_running.store(false, Ordering::SeqCst);
        self.tables.clear();
        self.send(HostCommand::StopEngine).map_err(EngineError::Bridge)
    }

    fn version(&self) -> Result<String, EngineError> {
        self.engine_version
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| EngineError::Bridge("engine version not reported yet".to_string()))
    }

    fn create_face(&self, uri: &str) -> Result<(), EngineError> {
        self.engine_command(HostCommand::CreateFace { uri: uri.to_string() })
    }

    fn destroy_face(&self, face_id: FaceId) -> Result<(), EngineError> {
        self.engine_command(HostCommand::DestroyFace { face_id })
    }

    fn bring_up_face(&self, face_id: FaceId) -> Result<(), EngineError> {
        self.engine_command(HostCommand::BringUpFace { face_id })
    }

    fn bring_down_face(&self, face_id: FaceId) -> Result<(), EngineError> {
        self.engine_command(HostCommand::BringDownFace { face_id })
    }

    fn add_route(&self, route: &Route) -> Result<(), EngineError> {
        self.engine_command(HostCommand::AddRoute { route: route.clone() })
    }

    fn remove_route(&self, prefix: &str, face_id: FaceId, origin: u64) -> Result<(), EngineError> {
        self.engine_command(HostCommand::RemoveRoute {
            prefix: prefix.to_string(),
            face_id,
            origin,
        })
    }

    fn receive_on_face(&self, face_id: FaceId, payload: &[u8]) -> Result<(), EngineError> {
        self.engine_command(HostCommand::ReceiveOnFace {
            face_id,
            payload: Bytes::copy_from_slice(payload),
        })
    }

    fn on_interest_transferred(&self, face_id: FaceId, nonce: u32) -> Result<(), EngineError> {
        self.engine_command(HostCommand::InterestTransferred { face_id, nonce })
    }

    fn on_data_transferred(&self, face_id: FaceId, name: &str) -> Result<(), EngineError> {
        self.engine_command(HostCommand::DataTransferred {
            face_id,
            name: name.to_string(),
        })
    }

    fn on_transfer_failed(&self, face_id: FaceId, kind: &PacketKind, name: &str) -> Result<(), EngineError> {
        self.engine_command(HostCommand::TransferFailed {
            face_id,
            packet: *kind,
            name: name.to_string(),
        })
    }

    /// Last snapshot the host pushed for `table`.
    fn snapshot(&self, table: EngineTable) -> Result<serde_json::Value, EngineError> {
        if !self.engine_running.load(Ordering::SeqCst) {
            return Err(EngineError::NotRunning);
        }
        Ok(self
            .tables
            .get(&table)
            .map(|v| v.value().clone())
            .unwrap_or(serde_json::Value::Null))
    }
}

impl P2pPlatform for HostBridge {
    fn register_receiver(&self) -> Result<(), PlatformError> {
        self.platform_command("register_receiver", HostCommand::RegisterReceiver)
    }

    fn unregister_receiver(&self) -> Result<(), PlatformError> {
        self.platform_command("unregister_receiver", HostCommand::UnregisterReceiver)
    }

    fn add_service_request(&self) -> Result<(), PlatformError> {
        self.platform_command("add_service_request", HostCommand::AddServiceRequest)
    }

    fn discover_services(&self) -> Result<(), PlatformError> {
        self.platform_command("discover_services", HostCommand::DiscoverServices)
    }

    fn clear_service_requests(&self) -> Result<(), PlatformError> {
        self.platform_command("clear_service_requests", HostCommand::ClearServiceRequests)
    }
}

/// One delivery path over the bridge.
struct BridgeTransport {
    bridge: Arc<HostBridge>,
    path: TransportPath,
}

impl Transport for BridgeTransport {
    fn dispatch(&self, packet: &OutboundPacket) -> Result<(), TransportError> {
        self.bridge
            .send(HostCommand::Dispatch {
                path: self.path,
                peer_id: packet.peer_id.clone(),
                transfer_id: packet.transfer_id,
                packet: packet.kind,
                name: packet.name.clone(),
                payload: packet.payload.clone(),
            })
            .map_err(TransportError::WriteFailed)
    }

    fn cancel(&self, peer_id: &PeerId, transfer_id: &TransferId) -> bool {
        if self.path == TransportPath::ConnectionOriented {
            return false;
        }
        self.bridge
            .send(HostCommand::Withdraw {
                peer_id: peer_id.clone(),
                transfer_id: *transfer_id,
            })
            .is_ok()
    }
}

/// Hand one host event to the daemon.
pub fn deliver(daemon: &Daemon, bridge: &HostBridge, event: HostEvent) -> Result<(), DaemonError> {
    match event {
        HostEvent::Start => {
            daemon.start()?;
        }
        HostEvent::Stop => {
            daemon.stop()?;
        }
        HostEvent::Flush => {
            daemon.flush_pending()?;
        }
        HostEvent::EngineInfo { version } => {
            tracing::info!(version = %version, "engine reported version");
            bridge.record_engine_info(version);
        }
        HostEvent::EngineTable { table, snapshot } => {
            bridge.tables.insert(table, snapshot);
        }
        HostEvent::P2pStateChanged { enabled } => daemon.on_p2p_state_changed(enabled)?,
        HostEvent::ServiceDiscovered {
            peer_id,
            service_type,
            address,
        } => daemon.on_service_discovered(&peer_id, &service_type, &address)?,
        HostEvent::ScanResult { devices } => {
            let observed: Vec<(TransportAddress, PeerStatus)> = devices
                .into_iter()
                .map(|d| (d.address, PeerStatus::from_device_status(d.status)))
                .collect();
            daemon.on_scan_result(&observed)?;
        }
        HostEvent::FaceAdded { face } => {
            daemon.after_face_added(face)?;
        }
        HostEvent::FaceRemoved { face_id } => {
            daemon.before_face_removed(face_id)?;
        }
        HostEvent::TransferInterest {
            face_id,
            name,
            nonce,
            payload,
        } => {
            daemon.transfer_interest(face_id, &name, nonce, payload)?;
        }
        HostEvent::TransferData {
            face_id,
            name,
            payload,
        } => {
            daemon.transfer_data(face_id, &name, payload)?;
        }
        HostEvent::CancelInterest { face_id, nonce } => {
            daemon.cancel_interest(face_id, nonce)?;
        }
        HostEvent::PacketTransferred {
            peer_id,
            transfer_id,
        } => {
            daemon.on_packet_transferred(&peer_id, &transfer_id)?;
        }
        HostEvent::TransferFailed {
            peer_id,
            transfer_id,
            reason,
        } => {
            daemon.on_transport_failure(&peer_id, &transfer_id, TransportError::WriteFailed(reason))?;
        }
        HostEvent::PacketReceived { peer_id, payload } => {
            daemon.on_packet_received(&peer_id, payload)?;
        }
    }
    Ok(())
}
