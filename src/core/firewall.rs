//! Application blocking through layer-7 protocol entries and filter rules.
//!
//! Every entry this module creates carries the [`MARKER`] comment, and only
//! marker-tagged entries are ever listed or removed. Reconciling is
//! delete-all-tagged followed by re-add, so it converges but is not atomic.
use serde::{Deserialize, Serialize};

use crate::{
    core::commands::{NewFilterRule, RouterCommands},
    ports::mgmt_transport::TransportResult,
};

/// Ownership marker for firewall and layer-7 entries
pub const MARKER: &str = "MARINE_BLOCK";

const FILTER_CHAIN: &str = "forward";
const FILTER_ACTION: &str = "drop";

/// An application that can be blocked
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BlockedApp {
    Youtube,
    Facebook,
    Tiktok,
    Torrent,
}

impl BlockedApp {
    pub const ALL: [BlockedApp; 4] = [
        BlockedApp::Youtube,
        BlockedApp::Facebook,
        BlockedApp::Tiktok,
        BlockedApp::Torrent,
    ];

    /// Layer-7 protocol name, also referenced by the filter rule
    pub fn name(&self) -> &'static str {
        match self {
            BlockedApp::Youtube => "Youtube",
            BlockedApp::Facebook => "Facebook",
            BlockedApp::Tiktok => "Tiktok",
            BlockedApp::Torrent => "Torrent",
        }
    }

    pub fn pattern(&self) -> &'static str {
        match self {
            BlockedApp::Youtube => r"^.+(youtube\.com|googlevideo\.com|youtu\.be).*$",
            BlockedApp::Facebook => r"^.+(facebook\.com|facebook\.net|fbcdn\.net|messenger\.com).*$",
            BlockedApp::Tiktok => r"^.+(tiktok\.com|tiktokv\.com|muscdn\.com).*$",
            BlockedApp::Torrent => r"^.+(torrent|tracker|announce|bitcomet|thunder).*$",
        }
    }
}

/// Requested blocking state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirewallPolicy {
    #[serde(default, rename = "block_youtube")]
    pub youtube: bool,
    #[serde(default, rename = "block_facebook")]
    pub facebook: bool,
    #[serde(default, rename = "block_tiktok")]
    pub tiktok: bool,
    #[serde(default, rename = "block_torrent")]
    pub torrent: bool,
}

impl FirewallPolicy {
    pub fn is_blocked(&self, app: BlockedApp) -> bool {
        match app {
            BlockedApp::Youtube => self.youtube,
            BlockedApp::Facebook => self.facebook,
            BlockedApp::Tiktok => self.tiktok,
            BlockedApp::Torrent => self.torrent,
        }
    }

    /// Blocked apps in a fixed order
    pub fn blocked(&self) -> Vec<BlockedApp> {
        BlockedApp::ALL
            .into_iter()
            .filter(|app| self.is_blocked(*app))
            .collect()
    }
}

/// What a reconcile changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub removed_layer7: usize,
    pub removed_filters: usize,
    pub blocked: Vec<BlockedApp>,
}

impl ReconcileReport {
    pub fn summary(&self) -> String {
        if self.blocked.is_empty() {
            return "Firewall updated: no applications blocked".to_string();
        }
        let names: Vec<&str> = self.blocked.iter().map(BlockedApp::name).collect();
        format!("Firewall updated: blocking {}", names.join(", "))
    }
}

/// Make the marker-tagged entries on the router match `policy`
pub async fn reconcile(
    commands: &mut RouterCommands<'_>,
    policy: &FirewallPolicy,
) -> TransportResult<ReconcileReport> {
    let mut report = ReconcileReport::default();

    for entry in commands.layer7_list(MARKER).await? {
        commands.layer7_remove(&entry.id).await?;
        report.removed_layer7 += 1;
    }
    for rule in commands.filter_list(MARKER).await? {
        commands.filter_remove(&rule.id).await?;
        report.removed_filters += 1;
    }

    for app in policy.blocked() {
        commands.layer7_add(app.name(), app.pattern(), MARKER).await?;
        commands
            .filter_add(NewFilterRule {
                chain: FILTER_CHAIN,
                layer7_protocol: app.name(),
                action: FILTER_ACTION,
                comment: MARKER,
            })
            .await?;
        report.blocked.push(app);
    }

    tracing::info!(
        removed_layer7 = report.removed_layer7,
        removed_filters = report.removed_filters,
        blocked = report.blocked.len(),
        "firewall reconciled"
    );
    Ok(report)
}
