//! Synthetic responses served while a router cannot be reached.
//!
//! Numbers come from a generator seeded with `(op, ship_id, clock bucket)`,
//! so repeated dashboard polls inside one bucket see stable values and tests
//! can pin the clock.
use std::{
    fmt,
    hash::{DefaultHasher, Hash, Hasher},
    time::Duration,
};

use chrono::{DateTime, Utc};
use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::core::reports::HealthReport;

pub const SIMULATED_BOARD: &str = "MikroTik (Simulated)";
pub const OFFLINE_VERSION: &str = "Offline";

/// Wall-clock source
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that never moves
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Feature operations, used as span, metric and seed labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouterOp {
    Health,
    OnlineSessions,
    Kick,
    SyncCrew,
    ProvisionPlan,
    ProvisionVoucher,
    Firewall,
    UploadConfig,
    Reboot,
    Terminal,
}

impl RouterOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouterOp::Health => "health",
            RouterOp::OnlineSessions => "online_sessions",
            RouterOp::Kick => "kick",
            RouterOp::SyncCrew => "sync_crew",
            RouterOp::ProvisionPlan => "provision_plan",
            RouterOp::ProvisionVoucher => "provision_voucher",
            RouterOp::Firewall => "firewall",
            RouterOp::UploadConfig => "upload_config",
            RouterOp::Reboot => "reboot",
            RouterOp::Terminal => "terminal",
        }
    }
}

impl fmt::Display for RouterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Generator of degraded responses
#[derive(Debug, Clone, Copy)]
pub struct SyntheticProfile {
    bucket: Duration,
}

impl Default for SyntheticProfile {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

impl SyntheticProfile {
    pub fn new(bucket: Duration) -> Self {
        // a zero bucket would divide by zero below
        Self {
            bucket: bucket.max(Duration::from_secs(1)),
        }
    }

    fn bucket_index(&self, now: DateTime<Utc>) -> i64 {
        let width = i64::try_from(self.bucket.as_secs()).unwrap_or(i64::MAX);
        now.timestamp().div_euclid(width)
    }

    fn rng(&self, op: RouterOp, ship_id: &str, now: DateTime<Utc>) -> StdRng {
        let mut hasher = DefaultHasher::new();
        op.hash(&mut hasher);
        ship_id.hash(&mut hasher);
        self.bucket_index(now).hash(&mut hasher);
        StdRng::seed_from_u64(hasher.finish())
    }

    /// Health with `connected = false` and plausible readings
    pub fn health(&self, ship_id: &str, now: DateTime<Utc>) -> HealthReport {
        let mut rng = self.rng(RouterOp::Health, ship_id, now);
        HealthReport {
            connected: false,
            board: SIMULATED_BOARD.to_string(),
            version: OFFLINE_VERSION.to_string(),
            uptime: "0s".to_string(),
            cpu_load: rng.random_range(5..=45),
            free_memory: rng.random_range(100..=600),
            tx_bps: 0,
            rx_bps: 0,
        }
    }

    /// Message returned by one-shot operations that were not carried out
    pub fn message(&self, op: RouterOp) -> String {
        match op {
            RouterOp::Reboot => "Router offline: reboot simulated".to_string(),
            RouterOp::SyncCrew => "Router offline: crew sync simulated".to_string(),
            RouterOp::Firewall => "Router offline: firewall update simulated".to_string(),
            RouterOp::Terminal => "Error: Router Offline".to_string(),
            other => format!("Router offline: {other} simulated"),
        }
    }
}
