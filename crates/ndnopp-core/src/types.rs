//! Identifiers and status enums shared across the ndn-opp crates.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Scheme of the face URIs the engine uses for opportunistic faces.
pub const FACE_URI_SCHEME: &str = "opp://";

// ── Peers ─────────────────────────────────────────────────────────────────────

/// Stable peer identifier, advertised through DNS-SD service discovery.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// URI of the opportunistic face the engine creates for this peer.
    pub fn face_uri(&self) -> String {
        format!("{FACE_URI_SCHEME}{}", self.0)
    }

    /// Recover the peer from an opportunistic face URI.
    /// Returns None for any other kind of face.
    pub fn from_face_uri(uri: &str) -> Option<Self> {
        uri.strip_prefix(FACE_URI_SCHEME)
            .filter(|rest| !rest.is_empty())
            .map(Self::new)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<uuid::Uuid> for PeerId {
    fn from(id: uuid::Uuid) -> Self {
        Self(id.to_string())
    }
}

/// Link-layer address of a peer device (Wi-Fi P2P MAC), lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct TransportAddress(String);

impl TransportAddress {
    pub fn new(addr: impl AsRef<str>) -> Self {
        Self(addr.as_ref().trim().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for TransportAddress {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<TransportAddress> for String {
    fn from(addr: TransportAddress) -> Self {
        addr.0
    }
}

impl fmt::Display for TransportAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Availability of a peer as reported by the Wi-Fi P2P platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerStatus {
    Available,
    Unavailable,
    Connected,
    Invited,
    Failed,
}

/// Device status codes of the Android Wi-Fi P2P framework.
pub mod device_status {
    pub const CONNECTED: i32 = 0;
    pub const INVITED: i32 = 1;
    pub const FAILED: i32 = 2;
    pub const AVAILABLE: i32 = 3;
    pub const UNAVAILABLE: i32 = 4;
}

impl PeerStatus {
    /// Convert a platform device status code. Unknown codes read as Unavailable.
    pub fn from_device_status(code: i32) -> Self {
        match code {
            device_status::CONNECTED => PeerStatus::Connected,
            device_status::INVITED => PeerStatus::Invited,
            device_status::FAILED => PeerStatus::Failed,
            device_status::AVAILABLE => PeerStatus::Available,
            _ => PeerStatus::Unavailable,
        }
    }

    /// Whether a face should exist for a peer in this state.
    pub fn is_reachable(self) -> bool {
        matches!(self, PeerStatus::Available | PeerStatus::Connected)
    }
}

// ── Faces ─────────────────────────────────────────────────────────────────────

/// Face handle allocated by the forwarding engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FaceId(pub u64);

impl fmt::Display for FaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the engine tells us about a face it just added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceDescriptor {
    pub face_id: FaceId,
    pub uri: String,
    #[serde(default)]
    pub local_uri: String,
    #[serde(default)]
    pub persistency: String,
}

impl FaceDescriptor {
    /// The peer this face belongs to, if it is an opportunistic face.
    pub fn peer_id(&self) -> Option<PeerId> {
        PeerId::from_face_uri(&self.uri)
    }
}

// ── Transfers ─────────────────────────────────────────────────────────────────

/// NDN packet type carried by a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PacketKind {
    Interest { nonce: u32 },
    Data,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Outbound,
    Inbound,
}

/// Delivery path of an outbound transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportPath {
    /// Direct link established through group formation.
    ConnectionOriented,
    /// Store now, forward on the next encounter.
    ConnectionLess,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferState {
    Pending,
    InFlight,
    Delivered,
    Cancelled,
    Failed,
}

impl TransferState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TransferState::Delivered | TransferState::Cancelled | TransferState::Failed
        )
    }
}

/// Identifier of a transfer attempt.
///
/// Interests hash their name and nonce, Data hashes its name, inbound
/// packets hash their payload. The same packet always yields the same id,
/// which is what retransmission deduplication keys on.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransferId([u8; 32]);

impl TransferId {
    pub fn for_packet(kind: &PacketKind, name: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        match kind {
            PacketKind::Interest { nonce } => {
                hasher.update(b"interest\0");
                hasher.update(name.as_bytes());
                hasher.update(b"\0");
                hasher.update(&nonce.to_be_bytes());
            }
            PacketKind::Data => {
                hasher.update(b"data\0");
                hasher.update(name.as_bytes());
            }
        }
        Self(*hasher.finalize().as_bytes())
    }

    pub fn for_payload(payload: &[u8]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"inbound\0");
        hasher.update(payload);
        Self(*hasher.finalize().as_bytes())
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        let arr: [u8; 32] = bytes.try_into().ok()?;
        Some(Self(arr))
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0[..8]))
    }
}

impl fmt::Debug for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransferId({self})")
    }
}

impl Serialize for TransferId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for TransferId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).ok_or_else(|| serde::de::Error::custom("expected 32 hex-encoded bytes"))
    }
}
