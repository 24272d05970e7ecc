//! Forwarding engine commands: face table, table snapshots, routes.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::http::{base_url, get_json, post_json_body};

#[derive(Deserialize)]
struct FaceTableResponse {
    faces: Vec<FaceEntry>,
}

#[derive(Deserialize)]
struct FaceEntry {
    face_id: u64,
    uri: String,
    local_uri: String,
    persistency: String,
}

#[derive(Serialize)]
struct RouteRequest<'a> {
    prefix: &'a str,
    face_id: u64,
    cost: u64,
}

#[derive(Deserialize)]
struct RouteResponse {
    prefix: String,
    face_id: u64,
}

pub async fn cmd_face_table(port: u16) -> Result<()> {
    let resp: FaceTableResponse = get_json(&format!("{}/engine/faces", base_url(port))).await?;

    println!("═══════════════════════════════════════");
    println!("  Engine Faces ({})", resp.faces.len());
    println!("═══════════════════════════════════════");

    for f in &resp.faces {
        println!("  ┌─ face {}", f.face_id);
        println!("  │  remote      : {}", f.uri);
        println!("  │  local       : {}", f.local_uri);
        println!("  └─ persistency : {}", f.persistency);
    }

    Ok(())
}

pub async fn cmd_table(port: u16, table: &str) -> Result<()> {
    let snapshot: serde_json::Value =
        get_json(&format!("{}/engine/{}", base_url(port), table)).await?;
    println!(
        "{}",
        serde_json::to_string_pretty(&snapshot).context("failed to format snapshot")?
    );
    Ok(())
}

pub async fn cmd_route_add(port: u16, prefix: &str, face_id: &str, cost: Option<&str>) -> Result<()> {
    let face_id: u64 = face_id.parse().context("face id must be a number")?;
    let cost: u64 = match cost {
        Some(c) => c.parse().context("cost must be a number")?,
        None => 0,
    };
    let resp: RouteResponse = post_json_body(
        &format!("{}/engine/routes", base_url(port)),
        &RouteRequest { prefix, face_id, cost },
    )
    .await?;
    println!("Route {} → face {} added.", resp.prefix, resp.face_id);
    Ok(())
}

pub async fn cmd_route_remove(port: u16, prefix: &str, face_id: &str) -> Result<()> {
    let face_id: u64 = face_id.parse().context("face id must be a number")?;
    let resp: RouteResponse = post_json_body(
        &format!("{}/engine/routes/remove", base_url(port)),
        &RouteRequest { prefix, face_id, cost: 0 },
    )
    .await?;
    println!("Route {} → face {} removed.", resp.prefix, resp.face_id);
    Ok(())
}
