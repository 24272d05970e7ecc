//! Forwarding engine adapter.
//!
//! The native forwarding daemon owns the FIB, PIT, Content Store and the
//! forwarding decisions. This trait is the whole surface the opportunistic
//! layer is allowed to touch. Calls are requests: their effects (a face being
//! added, for instance) come back later through the daemon's boundary
//! methods.

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use ndnopp_core::{EngineError, FaceId, PacketKind};

/// Engine tables that can be read as opaque snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineTable {
    Faces,
    NameTree,
    Fib,
    Pit,
    ContentStore,
    StrategyChoice,
}

impl FromStr for EngineTable {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "faces" => Ok(EngineTable::Faces),
            "name_tree" | "nametree" => Ok(EngineTable::NameTree),
            "fib" => Ok(EngineTable::Fib),
            "pit" => Ok(EngineTable::Pit),
            "content_store" | "cs" => Ok(EngineTable::ContentStore),
            "strategy_choice" | "sct" => Ok(EngineTable::StrategyChoice),
            other => Err(format!("unknown engine table: {other}")),
        }
    }
}

/// A RIB route request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub prefix: String,
    pub face_id: FaceId,
    pub origin: u64,
    pub cost: u64,
    pub flags: u64,
}

pub trait ForwardingEngine: Send + Sync {
    fn start(&self, home_dir: &Path, config: &str) -> Result<(), EngineError>;
    fn stop(&self) -> Result<(), EngineError>;
    fn version(&self) -> Result<String, EngineError>;

    /// Ask the engine to create a face. Confirmation arrives asynchronously.
    fn create_face(&self, uri: &str) -> Result<(), EngineError>;
    fn destroy_face(&self, face_id: FaceId) -> Result<(), EngineError>;
    fn bring_up_face(&self, face_id: FaceId) -> Result<(), EngineError>;
    fn bring_down_face(&self, face_id: FaceId) -> Result<(), EngineError>;

    fn add_route(&self, route: &Route) -> Result<(), EngineError>;
    fn remove_route(&self, prefix: &str, face_id: FaceId, origin: u64) -> Result<(), EngineError>;

    /// Hand a packet received from a peer to the engine on that peer's face.
    fn receive_on_face(&self, face_id: FaceId, payload: &[u8]) -> Result<(), EngineError>;

    fn on_interest_transferred(&self, face_id: FaceId, nonce: u32) -> Result<(), EngineError>;
    fn on_data_transferred(&self, face_id: FaceId, name: &str) -> Result<(), EngineError>;

    /// Report a failed transfer. Retrying is the engine's decision.
    fn on_transfer_failed(
        &self,
        face_id: FaceId,
        kind: &PacketKind,
        name: &str,
    ) -> Result<(), EngineError>;

    fn snapshot(&self, table: EngineTable) -> Result<serde_json::Value, EngineError>;
}
