use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::capture::{CaptureError, CaptureFn};

/// A booted simulator as reported by `simctl`.
#[derive(Debug, Clone)]
pub struct Simulator {
    pub udid: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct DeviceList {
    devices: HashMap<String, Vec<Device>>,
}

#[derive(Debug, Deserialize)]
struct Device {
    state: String,
    udid: String,
    name: String,
}

/// List booted simulators via `xcrun simctl list --json devices`.
pub async fn booted_simulators() -> Result<Vec<Simulator>, CaptureError> {
    let output = Command::new("xcrun")
        .args(["simctl", "list", "--json", "devices"])
        .output()
        .await
        .map_err(CaptureError::Spawn)?;
    if !output.status.success() {
        return Err(CaptureError::CommandFailed(output.status));
    }
    parse_booted(&output.stdout)
}

fn parse_booted(json: &[u8]) -> Result<Vec<Simulator>, CaptureError> {
    let list: DeviceList =
        serde_json::from_slice(json).map_err(|e| CaptureError::Parse(e.to_string()))?;
    let mut booted: Vec<Simulator> = list
        .devices
        .into_values()
        .flatten()
        .filter(|d| d.state == "Booted")
        .map(|d| Simulator {
            udid: d.udid,
            name: d.name,
        })
        .collect();
    booted.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(booted)
}

/// Capture function shelling out to `xcrun simctl io <udid> screenshot`.
/// The screenshot lands in a per-udid temp file that is read back and
/// overwritten on every tick.
pub fn screenshot_capture(udid: String) -> CaptureFn {
    let path = std::env::temp_dir().join(format!("framecast-{udid}.png"));
    Arc::new(move || {
        let udid = udid.clone();
        let path = path.clone();
        Box::pin(async move { capture_once(&udid, &path).await })
    })
}

async fn capture_once(udid: &str, path: &Path) -> Result<Bytes, CaptureError> {
    let output = Command::new("xcrun")
        .args(["simctl", "io", udid, "screenshot"])
        .arg(path)
        .output()
        .await
        .map_err(CaptureError::Spawn)?;
    if !output.status.success() {
        warn!(
            udid,
            stderr = %String::from_utf8_lossy(&output.stderr),
            "simctl screenshot failed"
        );
        return Err(CaptureError::CommandFailed(output.status));
    }
    let bytes = tokio::fs::read(path).await.map_err(CaptureError::ReadOutput)?;
    if bytes.is_empty() {
        return Err(CaptureError::Empty);
    }
    debug!(udid, bytes = bytes.len(), "captured simulator screenshot");
    Ok(Bytes::from(bytes))
}
