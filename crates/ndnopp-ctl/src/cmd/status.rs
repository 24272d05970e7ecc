//! Daemon status, peers, faces, transfers, flush, shutdown commands.

use anyhow::Result;
use serde::Deserialize;

use super::http::{base_url, get_json, post_json};

// ── Response types ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct StatusResponse {
    running: bool,
    local_id: String,
    uptime_secs: Option<u64>,
    peers: usize,
    reachable_peers: usize,
    faces: usize,
    transfers: usize,
}

#[derive(Deserialize)]
struct PeersResponse {
    peers: Vec<PeerInfo>,
}

#[derive(Deserialize)]
struct PeerInfo {
    peer_id: String,
    address: String,
    status: String,
    last_seen_secs: u64,
}

#[derive(Deserialize)]
struct FacesResponse {
    faces: Vec<FaceInfo>,
}

#[derive(Deserialize)]
struct FaceInfo {
    peer_id: String,
    face_id: Option<u64>,
    state: String,
}

#[derive(Deserialize)]
struct TransfersResponse {
    transfers: Vec<TransferInfo>,
}

#[derive(Deserialize)]
struct TransferInfo {
    transfer_id: String,
    peer_id: String,
    direction: String,
    kind: Option<serde_json::Value>,
    name: String,
    path: Option<String>,
    state: String,
    size: usize,
    age_ms: u64,
}

// ── Commands ──────────────────────────────────────────────────────────────────

pub async fn cmd_status(port: u16) -> Result<()> {
    let resp: StatusResponse = get_json(&format!("{}/status", base_url(port))).await?;

    println!("═══════════════════════════════════════");
    println!("  ndn-opp Daemon Status");
    println!("═══════════════════════════════════════");
    println!("  Local UUID       : {}", resp.local_id);
    println!("  Running          : {}", if resp.running { "yes" } else { "no" });
    if let Some(secs) = resp.uptime_secs {
        println!("  Uptime           : {}s", secs);
    }
    println!("  Peers known      : {}", resp.peers);
    println!("  Peers reachable  : {}", resp.reachable_peers);
    println!("  Faces            : {}", resp.faces);
    println!("  Active transfers : {}", resp.transfers);

    Ok(())
}

pub async fn cmd_peers(port: u16) -> Result<()> {
    let resp: PeersResponse = get_json(&format!("{}/peers", base_url(port))).await?;

    if resp.peers.is_empty() {
        println!("No peers discovered yet.");
        return Ok(());
    }

    println!("═══════════════════════════════════════");
    println!("  Discovered Peers ({})", resp.peers.len());
    println!("═══════════════════════════════════════");

    for p in &resp.peers {
        let icon = match p.status.as_str() {
            "connected" => "●",
            "available" => "○",
            "unavailable" => "✗",
            _ => "?",
        };
        println!("  ┌─ {} {}", icon, p.peer_id);
        println!("  │  address   : {}", p.address);
        println!("  │  status    : {}", p.status);
        println!("  └─ last seen : {}s ago", p.last_seen_secs);
    }

    Ok(())
}

pub async fn cmd_faces(port: u16) -> Result<()> {
    let resp: FacesResponse = get_json(&format!("{}/faces", base_url(port))).await?;

    if resp.faces.is_empty() {
        println!("No opportunistic faces.");
        return Ok(());
    }

    println!("═══════════════════════════════════════");
    println!("  Faces ({})", resp.faces.len());
    println!("═══════════════════════════════════════");

    for f in &resp.faces {
        let face = f
            .face_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("  {:<8} {:<16} {}", face, f.state, f.peer_id);
    }

    Ok(())
}

pub async fn cmd_transfers(port: u16) -> Result<()> {
    let resp: TransfersResponse = get_json(&format!("{}/transfers", base_url(port))).await?;

    if resp.transfers.is_empty() {
        println!("No active transfers.");
        return Ok(());
    }

    println!("═══════════════════════════════════════");
    println!("  Active Transfers ({})", resp.transfers.len());
    println!("═══════════════════════════════════════");

    for t in &resp.transfers {
        let kind = t
            .kind
            .as_ref()
            .and_then(|k| k.get("type"))
            .and_then(|v| v.as_str())
            .unwrap_or("packet");
        println!("  ┌─ {} {} {}", short_id(&t.transfer_id), t.direction, kind);
        if !t.name.is_empty() {
            println!("  │  name  : {}", t.name);
        }
        println!("  │  peer  : {}", t.peer_id);
        if let Some(path) = &t.path {
            println!("  │  path  : {}", path);
        }
        println!("  │  state : {}", t.state);
        println!("  └─ size  : {} bytes, {}ms old", t.size, t.age_ms);
    }

    Ok(())
}

pub async fn cmd_flush(port: u16) -> Result<()> {
    #[derive(Deserialize)]
    struct FlushResponse {
        dispatched: usize,
    }

    let resp: FlushResponse = post_json(&format!("{}/flush", base_url(port))).await?;
    println!("Dispatched {} queued transfers.", resp.dispatched);
    Ok(())
}

pub async fn cmd_shutdown(port: u16) -> Result<()> {
    #[derive(Deserialize)]
    struct ShutdownResponse {
        message: String,
    }

    let resp: ShutdownResponse = post_json(&format!("{}/daemon/shutdown", base_url(port))).await?;
    println!("{}", resp.message);
    Ok(())
}

/// First 16 characters of an id, or the whole id if it is shorter.
fn short_id(id: &str) -> &str {
    id.get(..16).unwrap_or(id)
}
