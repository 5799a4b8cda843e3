//! Typed wrappers over the router's sentence-oriented commands.
//!
//! Numeric fields arrive as strings and are parsed here; keys a wrapper does
//! not know about are kept in an `extra` map so newer router firmware does not
//! break older callers.
use std::collections::BTreeMap;

use crate::{
    core::sentence::{Record, Reply, Sentence},
    ports::mgmt_transport::{MgmtSession, TransportError, TransportResult},
};

/// `/system/resource/print`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SystemResource {
    pub board_name: String,
    pub version: String,
    pub uptime: String,
    pub cpu_load: u32,
    /// Bytes
    pub free_memory: u64,
    /// Bytes
    pub total_memory: Option<u64>,
    pub extra: BTreeMap<String, String>,
}

impl SystemResource {
    const KNOWN: &'static [&'static str] = &[
        "board-name",
        "version",
        "uptime",
        "cpu-load",
        "free-memory",
        "total-memory",
    ];

    fn from_record(record: &Record) -> TransportResult<Self> {
        Ok(Self {
            board_name: record.text("board-name"),
            version: record.text("version"),
            uptime: record.text("uptime"),
            cpu_load: record.parse("cpu-load")?.unwrap_or(0),
            free_memory: record.parse("free-memory")?.unwrap_or(0),
            total_memory: record.parse("total-memory")?,
            extra: record.remaining(Self::KNOWN),
        })
    }
}

/// One sample of `/interface/monitor-traffic ... =once`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TrafficSample {
    pub tx_bits_per_second: u64,
    pub rx_bits_per_second: u64,
    pub extra: BTreeMap<String, String>,
}

impl TrafficSample {
    const KNOWN: &'static [&'static str] = &["tx-bits-per-second", "rx-bits-per-second"];

    fn from_record(record: &Record) -> TransportResult<Self> {
        Ok(Self {
            tx_bits_per_second: record.parse("tx-bits-per-second")?.unwrap_or(0),
            rx_bits_per_second: record.parse("rx-bits-per-second")?.unwrap_or(0),
            extra: record.remaining(Self::KNOWN),
        })
    }
}

/// An entry of `/ip/hotspot/active`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ActiveSession {
    pub id: String,
    pub user: String,
    pub server: String,
    pub address: String,
    pub uptime: String,
    /// Bytes received from the client
    pub bytes_in: u64,
    /// Bytes sent to the client
    pub bytes_out: u64,
    pub extra: BTreeMap<String, String>,
}

impl ActiveSession {
    const KNOWN: &'static [&'static str] = &[
        ".id", "user", "server", "address", "uptime", "bytes-in", "bytes-out",
    ];

    fn from_record(record: &Record) -> TransportResult<Self> {
        Ok(Self {
            id: record.text(".id"),
            user: record.text("user"),
            server: record.text("server"),
            address: record.text("address"),
            uptime: record.text("uptime"),
            bytes_in: record.parse("bytes-in")?.unwrap_or(0),
            bytes_out: record.parse("bytes-out")?.unwrap_or(0),
            extra: record.remaining(Self::KNOWN),
        })
    }
}

/// An entry of `/ip/hotspot/user`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HotspotUser {
    pub id: String,
    pub name: String,
    pub profile: String,
    pub comment: String,
}

impl HotspotUser {
    fn from_record(record: &Record) -> Self {
        Self {
            id: record.text(".id"),
            name: record.text("name"),
            profile: record.text("profile"),
            comment: record.text("comment"),
        }
    }
}

/// Fields of a new hotspot user
#[derive(Debug, Clone, Copy)]
pub struct NewHotspotUser<'a> {
    pub name: &'a str,
    pub password: &'a str,
    pub profile: &'a str,
    pub comment: &'a str,
}

/// A layer-7 protocol entry or filter rule, identified by `.id`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RuleEntry {
    pub id: String,
    pub comment: String,
    pub attrs: BTreeMap<String, String>,
}

impl RuleEntry {
    fn from_record(record: &Record) -> Self {
        Self {
            id: record.text(".id"),
            comment: record.text("comment"),
            attrs: record.remaining(&[".id", "comment"]),
        }
    }
}

/// A firewall filter rule to add
#[derive(Debug, Clone, Copy)]
pub struct NewFilterRule<'a> {
    pub chain: &'a str,
    pub layer7_protocol: &'a str,
    pub action: &'a str,
    pub comment: &'a str,
}

pub const SYSTEM_RESOURCE_PRINT: &str = "/system/resource/print";
pub const MONITOR_TRAFFIC: &str = "/interface/monitor-traffic";
pub const HOTSPOT_ACTIVE_PRINT: &str = "/ip/hotspot/active/print";
pub const HOTSPOT_ACTIVE_REMOVE: &str = "/ip/hotspot/active/remove";
pub const HOTSPOT_USER_PRINT: &str = "/ip/hotspot/user/print";
pub const HOTSPOT_USER_ADD: &str = "/ip/hotspot/user/add";
pub const HOTSPOT_USER_REMOVE: &str = "/ip/hotspot/user/remove";
pub const USER_PROFILE_ADD: &str = "/ip/hotspot/user/profile/add";
pub const LAYER7_PRINT: &str = "/ip/firewall/layer7-protocol/print";
pub const LAYER7_ADD: &str = "/ip/firewall/layer7-protocol/add";
pub const LAYER7_REMOVE: &str = "/ip/firewall/layer7-protocol/remove";
pub const FILTER_PRINT: &str = "/ip/firewall/filter/print";
pub const FILTER_ADD: &str = "/ip/firewall/filter/add";
pub const FILTER_REMOVE: &str = "/ip/firewall/filter/remove";
pub const SYSTEM_REBOOT: &str = "/system/reboot";
pub const IMPORT: &str = "/import";

/// Command layer bound to one open session
pub struct RouterCommands<'s> {
    session: &'s mut dyn MgmtSession,
}

impl<'s> RouterCommands<'s> {
    pub fn new(session: &'s mut dyn MgmtSession) -> Self {
        Self { session }
    }

    /// Issue an arbitrary sentence
    pub async fn raw(&mut self, sentence: Sentence) -> TransportResult<Reply> {
        tracing::debug!(command = sentence.head().unwrap_or_default(), "router command");
        self.session.run(sentence).await
    }

    pub async fn system_resource(&mut self) -> TransportResult<SystemResource> {
        let reply = self.raw(Sentence::command(SYSTEM_RESOURCE_PRINT)).await?;
        let record = reply.first().ok_or_else(|| {
            TransportError::Protocol(format!("{SYSTEM_RESOURCE_PRINT} returned no record"))
        })?;
        SystemResource::from_record(record)
    }

    /// One traffic sample, or `None` when the router returned no record
    pub async fn monitor_traffic(&mut self, interface: &str) -> TransportResult<Option<TrafficSample>> {
        let reply = self
            .raw(
                Sentence::command(MONITOR_TRAFFIC)
                    .attr("interface", interface)
                    .word("=once"),
            )
            .await?;
        reply.first().map(TrafficSample::from_record).transpose()
    }

    /// Active hotspot sessions, optionally filtered by `?user=`
    pub async fn hotspot_active_list(&mut self, user: Option<&str>) -> TransportResult<Vec<ActiveSession>> {
        let mut sentence = Sentence::command(HOTSPOT_ACTIVE_PRINT);
        if let Some(user) = user {
            sentence = sentence.query("user", user);
        }
        let reply = self.raw(sentence).await?;
        reply.re.iter().map(ActiveSession::from_record).collect()
    }

    pub async fn hotspot_active_remove(&mut self, id: &str) -> TransportResult<()> {
        self.raw(Sentence::command(HOTSPOT_ACTIVE_REMOVE).attr(".id", id))
            .await
            .map(|_| ())
    }

    /// Hotspot users, optionally filtered by `?comment=`
    pub async fn hotspot_user_list(&mut self, comment: Option<&str>) -> TransportResult<Vec<HotspotUser>> {
        let mut sentence = Sentence::command(HOTSPOT_USER_PRINT);
        if let Some(comment) = comment {
            sentence = sentence.query("comment", comment);
        }
        let reply = self.raw(sentence).await?;
        Ok(reply.re.iter().map(HotspotUser::from_record).collect())
    }

    /// Returns the new object id when the router reports one
    pub async fn hotspot_user_add(&mut self, user: NewHotspotUser<'_>) -> TransportResult<Option<String>> {
        let reply = self
            .raw(
                Sentence::command(HOTSPOT_USER_ADD)
                    .attr("name", user.name)
                    .attr("password", user.password)
                    .attr("profile", user.profile)
                    .attr("comment", user.comment),
            )
            .await?;
        Ok(reply.ret().map(str::to_string))
    }

    pub async fn hotspot_user_remove(&mut self, id: &str) -> TransportResult<()> {
        self.raw(Sentence::command(HOTSPOT_USER_REMOVE).attr(".id", id))
            .await
            .map(|_| ())
    }

    pub async fn user_profile_add(
        &mut self,
        name: &str,
        rate_limit: &str,
        shared_users: u32,
    ) -> TransportResult<Option<String>> {
        let reply = self
            .raw(
                Sentence::command(USER_PROFILE_ADD)
                    .attr("name", name)
                    .attr("rate-limit", rate_limit)
                    .attr("shared-users", shared_users.to_string()),
            )
            .await?;
        Ok(reply.ret().map(str::to_string))
    }

    /// Layer-7 protocol entries whose comment equals `comment`
    pub async fn layer7_list(&mut self, comment: &str) -> TransportResult<Vec<RuleEntry>> {
        let reply = self
            .raw(Sentence::command(LAYER7_PRINT).query("comment", comment))
            .await?;
        Ok(reply.re.iter().map(RuleEntry::from_record).collect())
    }

    pub async fn layer7_add(&mut self, name: &str, regexp: &str, comment: &str) -> TransportResult<Option<String>> {
        let reply = self
            .raw(
                Sentence::command(LAYER7_ADD)
                    .attr("name", name)
                    .attr("regexp", regexp)
                    .attr("comment", comment),
            )
            .await?;
        Ok(reply.ret().map(str::to_string))
    }

    pub async fn layer7_remove(&mut self, id: &str) -> TransportResult<()> {
        self.raw(Sentence::command(LAYER7_REMOVE).attr(".id", id))
            .await
            .map(|_| ())
    }

    /// Filter rules whose comment equals `comment`
    pub async fn filter_list(&mut self, comment: &str) -> TransportResult<Vec<RuleEntry>> {
        let reply = self
            .raw(Sentence::command(FILTER_PRINT).query("comment", comment))
            .await?;
        Ok(reply.re.iter().map(RuleEntry::from_record).collect())
    }

    pub async fn filter_add(&mut self, rule: NewFilterRule<'_>) -> TransportResult<Option<String>> {
        let reply = self
            .raw(
                Sentence::command(FILTER_ADD)
                    .attr("chain", rule.chain)
                    .attr("layer7-protocol", rule.layer7_protocol)
                    .attr("action", rule.action)
                    .attr("comment", rule.comment),
            )
            .await?;
        Ok(reply.ret().map(str::to_string))
    }

    pub async fn filter_remove(&mut self, id: &str) -> TransportResult<()> {
        self.raw(Sentence::command(FILTER_REMOVE).attr(".id", id))
            .await
            .map(|_| ())
    }

    /// The router may drop the connection as soon as it accepts the reboot;
    /// losing the connection here counts as accepted.
    pub async fn system_reboot(&mut self) -> TransportResult<()> {
        match self.raw(Sentence::command(SYSTEM_REBOOT)).await {
            Ok(_) => Ok(()),
            Err(TransportError::Unreachable(reason)) | Err(TransportError::Fatal(reason)) => {
                tracing::debug!(%reason, "connection lost after reboot command");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    pub async fn import(&mut self, file_name: &str) -> TransportResult<()> {
        self.raw(Sentence::command(IMPORT).attr("file-name", file_name))
            .await
            .map(|_| ())
    }
}

/// `<up>k/<down>k`, the router's rate-limit syntax for Kbps values
pub fn rate_limit(upload_kbps: u32, download_kbps: u32) -> String {
    format!("{upload_kbps}k/{download_kbps}k")
}
