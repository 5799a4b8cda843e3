//! Response records produced by the feature operations.
//!
//! Degraded responses use the same types, so real and simulated answers share
//! one JSON schema.
use serde::{Deserialize, Serialize};

use crate::core::commands::{ActiveSession, SystemResource, TrafficSample};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Router health as shown on the dashboard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub connected: bool,
    pub board: String,
    pub version: String,
    pub uptime: String,
    pub cpu_load: u32,
    /// Megabytes
    pub free_memory: u64,
    pub tx_bps: u64,
    pub rx_bps: u64,
}

impl HealthReport {
    /// Build a report from live readings. A missing traffic sample reports
    /// zero throughput.
    pub fn live(resource: SystemResource, traffic: Option<TrafficSample>) -> Self {
        let (tx_bps, rx_bps) = traffic
            .map(|t| (t.tx_bits_per_second, t.rx_bits_per_second))
            .unwrap_or((0, 0));
        Self {
            connected: true,
            board: resource.board_name,
            version: resource.version,
            uptime: resource.uptime,
            cpu_load: resource.cpu_load,
            free_memory: resource.free_memory / (1024 * 1024),
            tx_bps,
            rx_bps,
        }
    }
}

/// One live hotspot session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnlineSession {
    pub user: String,
    pub server: String,
    pub framed_ip: String,
    pub uptime: String,
    #[serde(rename = "upload_MB")]
    pub upload_mb: f64,
    #[serde(rename = "download_MB")]
    pub download_mb: f64,
    #[serde(rename = "total_MB")]
    pub total_mb: f64,
    pub id: String,
}

impl OnlineSession {
    /// Upload is what the router received from the client (`bytes-in`),
    /// download what it sent (`bytes-out`).
    pub fn from_active(active: ActiveSession) -> Self {
        let upload_mb = active.bytes_in as f64 / BYTES_PER_MB;
        let download_mb = active.bytes_out as f64 / BYTES_PER_MB;
        Self {
            user: active.user,
            server: active.server,
            framed_ip: active.address,
            uptime: active.uptime,
            upload_mb,
            download_mb,
            total_mb: upload_mb + download_mb,
            id: active.id,
        }
    }

    /// Round traffic figures to two decimals for display
    pub fn rounded(mut self) -> Self {
        self.upload_mb = round2(self.upload_mb);
        self.download_mb = round2(self.download_mb);
        self.total_mb = round2(self.total_mb);
        self
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// `{message}` body of one-shot operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpMessage {
    pub message: String,
}

impl OpMessage {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// `{output}` body of the terminal operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalOutput {
    pub output: String,
}
