//! Feature operations against a ship's onboard router.
//!
//! Each operation resolves the ship, opens its own management session, runs
//! its commands in order and closes the session on every exit path. When the
//! router is unconfigured, unreachable or rejects the login, the operation
//! answers from the [`SyntheticProfile`] instead.
use std::{future::Future, sync::Arc, time::Duration};

use bytes::Bytes;
use tracing::Instrument;

use crate::{
    core::{
        commands::{NewHotspotUser, RouterCommands, rate_limit},
        degraded::{Clock, RouterOp, SyntheticProfile, SystemClock},
        error::{ControlError, ControlResult},
        firewall::{self, FirewallPolicy},
        reports::{HealthReport, OnlineSession, OpMessage, TerminalOutput},
        sentence::{Reply, Sentence},
    },
    metrics::{self, RouterOpTimer},
    ports::{
        file_transport::FileTransport,
        mgmt_transport::{MgmtConnector, MgmtSession, TransportError, TransportResult},
        record_store::{BandwidthPlan, Voucher},
        ship_directory::{CrewAccount, RouterEndpoint, ShipDirectory},
    },
    tracing_setup::create_router_span,
};

/// Ownership marker for hotspot users created by crew sync
pub const CREW_MARKER: &str = "MARINE_CREW";

/// Comment of hotspot users created for vouchers
pub const VOUCHER_COMMENT: &str = "Voucher";

/// Profiles provisioned for bandwidth plans admit one device per user
const PLAN_SHARED_USERS: u32 = 1;

/// Timeouts and knobs of the control plane
#[derive(Debug, Clone)]
pub struct ControlSettings {
    pub mgmt_dial_timeout: Duration,
    pub health_dial_timeout: Duration,
    pub ssh_dial_timeout: Duration,
    pub monitor_interface: String,
    pub degraded_bucket: Duration,
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            mgmt_dial_timeout: Duration::from_secs(3),
            health_dial_timeout: Duration::from_secs(2),
            ssh_dial_timeout: Duration::from_secs(5),
            monitor_interface: "ether1".to_string(),
            degraded_bucket: Duration::from_secs(10),
        }
    }
}

/// Result of a best-effort provisioning side effect
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionOutcome {
    Applied,
    /// The router could not be reached; nothing was attempted
    Skipped(String),
    Failed(String),
}

/// Whether a response came from the router or from the synthetic profile
enum Served<T> {
    Live(T),
    Degraded(T),
}

pub struct RouterControl {
    directory: Arc<dyn ShipDirectory>,
    connector: Arc<dyn MgmtConnector>,
    files: Arc<dyn FileTransport>,
    clock: Arc<dyn Clock>,
    profile: SyntheticProfile,
    settings: ControlSettings,
}

impl RouterControl {
    pub fn new(
        directory: Arc<dyn ShipDirectory>,
        connector: Arc<dyn MgmtConnector>,
        files: Arc<dyn FileTransport>,
        settings: ControlSettings,
    ) -> Self {
        Self {
            directory,
            connector,
            files,
            clock: Arc::new(SystemClock),
            profile: SyntheticProfile::new(settings.degraded_bucket),
            settings,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn settings(&self) -> &ControlSettings {
        &self.settings
    }

    /// Run `body` inside the op's span and record its outcome
    async fn traced<T, F>(&self, op: RouterOp, ship_id: &str, body: F) -> ControlResult<T>
    where
        F: Future<Output = ControlResult<Served<T>>>,
    {
        let _timer = RouterOpTimer::new(op.as_str());
        let result = body.instrument(create_router_span(op.as_str(), ship_id)).await;
        match result {
            Ok(Served::Live(value)) => {
                metrics::increment_router_op(op.as_str(), "ok");
                Ok(value)
            }
            Ok(Served::Degraded(value)) => {
                metrics::increment_router_op(op.as_str(), "degraded");
                Ok(value)
            }
            Err(e) => {
                metrics::increment_router_op(op.as_str(), "error");
                Err(e)
            }
        }
    }

    /// Open an authenticated session, or `None` when the op should degrade
    async fn open(
        &self,
        endpoint: &RouterEndpoint,
        dial_timeout: Duration,
    ) -> ControlResult<Option<Box<dyn MgmtSession>>> {
        if !endpoint.is_configured() {
            tracing::warn!("router has no management address; serving degraded response");
            return Ok(None);
        }
        match self.connector.connect(endpoint, dial_timeout).await {
            Ok(session) => Ok(Some(session)),
            Err(e) if e.degrades() => {
                tracing::warn!(
                    error = %e,
                    addr = %endpoint.mgmt_addr(),
                    online = endpoint.online,
                    "router unavailable; serving degraded response"
                );
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Map a finished command run onto the op result, degrading on
    /// connection loss
    fn settle<T>(
        &self,
        outcome: TransportResult<T>,
        fallback: impl FnOnce() -> T,
    ) -> ControlResult<Served<T>> {
        match outcome {
            Ok(value) => Ok(Served::Live(value)),
            Err(e) if e.degrades() => {
                tracing::warn!(error = %e, "router lost mid-operation; serving degraded response");
                Ok(Served::Degraded(fallback()))
            }
            Err(e) => {
                tracing::warn!(error = %e, "router command failed");
                Err(e.into())
            }
        }
    }

    /// Board, version, load, memory and throughput of the ship's router
    pub async fn health(&self, ship_id: &str) -> ControlResult<HealthReport> {
        self.traced(RouterOp::Health, ship_id, self.serve_health(ship_id))
            .await
    }

    async fn serve_health(&self, ship_id: &str) -> ControlResult<Served<HealthReport>> {
        let endpoint = self.directory.resolve(ship_id).await?;
        let degraded = || self.profile.health(ship_id, self.clock.now());
        let Some(mut session) = self.open(&endpoint, self.settings.health_dial_timeout).await?
        else {
            return Ok(Served::Degraded(degraded()));
        };

        let outcome = read_health(
            &mut RouterCommands::new(session.as_mut()),
            &self.settings.monitor_interface,
        )
        .await;
        session.close().await;
        self.settle(outcome, degraded)
    }

    /// Live hotspot sessions in router order
    pub async fn online_sessions(&self, ship_id: &str) -> ControlResult<Vec<OnlineSession>> {
        self.traced(
            RouterOp::OnlineSessions,
            ship_id,
            self.serve_online_sessions(ship_id),
        )
        .await
    }

    async fn serve_online_sessions(&self, ship_id: &str) -> ControlResult<Served<Vec<OnlineSession>>> {
        let endpoint = self.directory.resolve(ship_id).await?;
        let Some(mut session) = self.open(&endpoint, self.settings.mgmt_dial_timeout).await? else {
            return Ok(Served::Degraded(Vec::new()));
        };

        let outcome = RouterCommands::new(session.as_mut())
            .hotspot_active_list(None)
            .await
            .map(|active| active.into_iter().map(OnlineSession::from_active).collect());
        session.close().await;
        self.settle(outcome, Vec::new)
    }

    /// Disconnect the first active session of `username`
    pub async fn kick(&self, ship_id: &str, username: &str) -> ControlResult<OpMessage> {
        self.traced(RouterOp::Kick, ship_id, self.serve_kick(ship_id, username))
            .await
    }

    async fn serve_kick(&self, ship_id: &str, username: &str) -> ControlResult<Served<OpMessage>> {
        let endpoint = self.directory.resolve(ship_id).await?;
        let Some(mut session) = self.open(&endpoint, self.settings.mgmt_dial_timeout).await? else {
            return Err(ControlError::NotOnline(username.to_string()));
        };

        let outcome = kick_first(&mut RouterCommands::new(session.as_mut()), username).await;
        session.close().await;
        match outcome {
            Ok(true) => {
                tracing::info!(user = username, "hotspot session disconnected");
                Ok(Served::Live(OpMessage::new(format!(
                    "User {username} disconnected"
                ))))
            }
            Ok(false) => Err(ControlError::NotOnline(username.to_string())),
            Err(e) if e.degrades() => Err(ControlError::NotOnline(username.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Make the crew-owned hotspot users match the ship's active crew
    pub async fn sync_crew(&self, ship_id: &str) -> ControlResult<OpMessage> {
        self.traced(RouterOp::SyncCrew, ship_id, self.serve_sync_crew(ship_id))
            .await
    }

    async fn serve_sync_crew(&self, ship_id: &str) -> ControlResult<Served<OpMessage>> {
        let endpoint = self.directory.resolve(ship_id).await?;
        let crew = self.directory.crew(ship_id).await?;
        let degraded = || OpMessage::new(self.profile.message(RouterOp::SyncCrew));
        let Some(mut session) = self.open(&endpoint, self.settings.mgmt_dial_timeout).await? else {
            return Ok(Served::Degraded(degraded()));
        };

        let outcome = sync_crew_accounts(&mut RouterCommands::new(session.as_mut()), &crew).await;
        session.close().await;
        self.settle(outcome, degraded)
    }

    /// Apply the blocking policy to the router's marker-tagged rules
    pub async fn reconcile_firewall(
        &self,
        ship_id: &str,
        policy: FirewallPolicy,
    ) -> ControlResult<OpMessage> {
        self.traced(
            RouterOp::Firewall,
            ship_id,
            self.serve_firewall(ship_id, policy),
        )
        .await
    }

    async fn serve_firewall(
        &self,
        ship_id: &str,
        policy: FirewallPolicy,
    ) -> ControlResult<Served<OpMessage>> {
        let endpoint = self.directory.resolve(ship_id).await?;
        let degraded = || OpMessage::new(self.profile.message(RouterOp::Firewall));
        let Some(mut session) = self.open(&endpoint, self.settings.mgmt_dial_timeout).await? else {
            return Ok(Served::Degraded(degraded()));
        };

        let outcome = firewall::reconcile(&mut RouterCommands::new(session.as_mut()), &policy)
            .await
            .map(|report| OpMessage::new(report.summary()));
        session.close().await;
        self.settle(outcome, degraded)
    }

    pub async fn reboot(&self, ship_id: &str) -> ControlResult<OpMessage> {
        self.traced(RouterOp::Reboot, ship_id, self.serve_reboot(ship_id))
            .await
    }

    async fn serve_reboot(&self, ship_id: &str) -> ControlResult<Served<OpMessage>> {
        let endpoint = self.directory.resolve(ship_id).await?;
        let degraded = || OpMessage::new(self.profile.message(RouterOp::Reboot));
        let Some(mut session) = self.open(&endpoint, self.settings.mgmt_dial_timeout).await? else {
            return Ok(Served::Degraded(degraded()));
        };

        let outcome = RouterCommands::new(session.as_mut())
            .system_reboot()
            .await
            .map(|()| OpMessage::new("Reboot command sent"));
        session.close().await;
        self.settle(outcome, degraded)
    }

    /// Push a configuration script over the file channel, then import it on
    /// a fresh management session. Uploads cannot be simulated, so an
    /// unreachable router is an upstream failure here.
    pub async fn upload_config(
        &self,
        ship_id: &str,
        file_name: &str,
        contents: Bytes,
    ) -> ControlResult<OpMessage> {
        self.traced(
            RouterOp::UploadConfig,
            ship_id,
            self.serve_upload(ship_id, file_name, contents),
        )
        .await
    }

    async fn serve_upload(
        &self,
        ship_id: &str,
        file_name: &str,
        contents: Bytes,
    ) -> ControlResult<Served<OpMessage>> {
        let file_name = script_name(file_name)?;
        let endpoint = self.directory.resolve(ship_id).await?;
        if !endpoint.is_configured() {
            return Err(ControlError::Upstream(
                "router has no management address".to_string(),
            ));
        }

        let written = self
            .files
            .upload(&endpoint, file_name, contents, self.settings.ssh_dial_timeout)
            .await?;
        tracing::info!(file = file_name, bytes = written, "configuration uploaded");

        let mut session = match self
            .connector
            .connect(&endpoint, self.settings.mgmt_dial_timeout)
            .await
        {
            Ok(session) => session,
            Err(e) if e.degrades() => {
                return Err(ControlError::Upstream(format!(
                    "uploaded {file_name} but the router is unavailable for import: {e}"
                )));
            }
            Err(e) => return Err(e.into()),
        };
        let outcome = RouterCommands::new(session.as_mut()).import(file_name).await;
        session.close().await;
        match outcome {
            Ok(()) => Ok(Served::Live(OpMessage::new(format!(
                "Uploaded and imported {file_name} ({written} bytes)"
            )))),
            Err(e) if e.degrades() => Err(ControlError::Upstream(format!(
                "connection lost while importing {file_name}: {e}"
            ))),
            Err(e) => Err(e.into()),
        }
    }

    /// Run an operator-typed command and render the reply as text.
    ///
    /// A trap is reported in the output rather than as an error.
    pub async fn terminal(&self, ship_id: &str, command: &str) -> ControlResult<TerminalOutput> {
        self.traced(
            RouterOp::Terminal,
            ship_id,
            self.serve_terminal(ship_id, command),
        )
        .await
    }

    async fn serve_terminal(
        &self,
        ship_id: &str,
        command: &str,
    ) -> ControlResult<Served<TerminalOutput>> {
        if command.trim().is_empty() {
            return Err(ControlError::BadRequest("command is required".to_string()));
        }
        let sentence = Sentence::parse_command_line(command)
            .ok_or_else(|| ControlError::BadRequest("command must start with '/'".to_string()))?;
        let endpoint = self.directory.resolve(ship_id).await?;
        let degraded = || TerminalOutput {
            output: self.profile.message(RouterOp::Terminal),
        };
        let Some(mut session) = self.open(&endpoint, self.settings.mgmt_dial_timeout).await? else {
            return Ok(Served::Degraded(degraded()));
        };

        let outcome = RouterCommands::new(session.as_mut()).raw(sentence).await;
        session.close().await;
        match outcome {
            Err(TransportError::Trap { message, .. }) => Ok(Served::Live(TerminalOutput {
                output: format!("Error: {message}"),
            })),
            other => self.settle(
                other.map(|reply| TerminalOutput {
                    output: render_reply(&reply),
                }),
                degraded,
            ),
        }
    }

    /// Create the hotspot user profile for a newly committed plan. Failures
    /// are logged and counted, never returned.
    pub async fn provision_plan(&self, ship_id: &str, plan: &BandwidthPlan) -> ProvisionOutcome {
        self.provision(RouterOp::ProvisionPlan, ship_id, Provision::Plan(plan))
            .await
    }

    /// Create the hotspot user for a newly committed voucher. Failures are
    /// logged and counted, never returned.
    pub async fn provision_voucher(&self, ship_id: &str, voucher: &Voucher) -> ProvisionOutcome {
        self.provision(RouterOp::ProvisionVoucher, ship_id, Provision::Voucher(voucher))
            .await
    }

    async fn provision(&self, op: RouterOp, ship_id: &str, request: Provision<'_>) -> ProvisionOutcome {
        let outcome = self
            .traced(op, ship_id, self.serve_provision(ship_id, request))
            .await
            .unwrap_or_else(|e| ProvisionOutcome::Failed(e.to_string()));

        match &outcome {
            ProvisionOutcome::Applied => tracing::info!(op = %op, ship_id, "provisioned on router"),
            ProvisionOutcome::Skipped(reason) | ProvisionOutcome::Failed(reason) => {
                metrics::increment_provisioning_failure(op.as_str());
                tracing::warn!(op = %op, ship_id, %reason, "router provisioning not applied; record kept");
            }
        }
        outcome
    }

    async fn serve_provision(
        &self,
        ship_id: &str,
        request: Provision<'_>,
    ) -> ControlResult<Served<ProvisionOutcome>> {
        let endpoint = self.directory.resolve(ship_id).await?;
        let Some(mut session) = self.open(&endpoint, self.settings.mgmt_dial_timeout).await? else {
            return Ok(Served::Degraded(ProvisionOutcome::Skipped(
                "router unavailable".to_string(),
            )));
        };

        let outcome = request
            .apply(&mut RouterCommands::new(session.as_mut()))
            .await;
        session.close().await;
        match outcome {
            Ok(()) => Ok(Served::Live(ProvisionOutcome::Applied)),
            Err(e) if e.degrades() => Ok(Served::Degraded(ProvisionOutcome::Skipped(e.to_string()))),
            Err(e) => Err(e.into()),
        }
    }
}

/// Router-side object created after a record is committed
#[derive(Debug, Clone, Copy)]
enum Provision<'a> {
    Plan(&'a BandwidthPlan),
    Voucher(&'a Voucher),
}

impl Provision<'_> {
    async fn apply(self, commands: &mut RouterCommands<'_>) -> TransportResult<()> {
        match self {
            Provision::Plan(plan) => {
                let rate = rate_limit(plan.upload_speed, plan.download_speed);
                commands
                    .user_profile_add(&plan.name, &rate, PLAN_SHARED_USERS)
                    .await?;
            }
            Provision::Voucher(voucher) => {
                commands
                    .hotspot_user_add(NewHotspotUser {
                        name: &voucher.code,
                        password: &voucher.code,
                        profile: &voucher.data_plan,
                        comment: VOUCHER_COMMENT,
                    })
                    .await?;
            }
        }
        Ok(())
    }
}

async fn read_health(
    commands: &mut RouterCommands<'_>,
    interface: &str,
) -> TransportResult<HealthReport> {
    let resource = commands.system_resource().await?;
    let traffic = commands.monitor_traffic(interface).await?;
    Ok(HealthReport::live(resource, traffic))
}

/// Returns whether a session was found and removed
async fn kick_first(commands: &mut RouterCommands<'_>, username: &str) -> TransportResult<bool> {
    let active = commands.hotspot_active_list(Some(username)).await?;
    let Some(first) = active.first() else {
        return Ok(false);
    };
    if active.len() > 1 {
        tracing::warn!(user = username, matches = active.len(), "several active sessions for user; removing the first");
    }
    commands.hotspot_active_remove(&first.id).await?;
    Ok(true)
}

async fn sync_crew_accounts(
    commands: &mut RouterCommands<'_>,
    crew: &[CrewAccount],
) -> TransportResult<OpMessage> {
    let wanted: Vec<&CrewAccount> = crew.iter().filter(|c| c.active).collect();
    let owned = commands.hotspot_user_list(Some(CREW_MARKER)).await?;

    let mut removed = 0;
    for user in &owned {
        if !wanted.iter().any(|c| c.username == user.name) {
            commands.hotspot_user_remove(&user.id).await?;
            removed += 1;
        }
    }

    let mut added = 0;
    for account in &wanted {
        if owned.iter().any(|u| u.name == account.username) {
            continue;
        }
        let outcome = commands
            .hotspot_user_add(NewHotspotUser {
                name: &account.username,
                password: &account.password,
                profile: &account.data_plan,
                comment: CREW_MARKER,
            })
            .await;
        match outcome {
            Ok(_) => added += 1,
            // Usually a user of the same name without the crew marker
            Err(TransportError::Trap { message, .. }) => {
                tracing::warn!(user = %account.username, %message, "router refused crew account; left untouched");
            }
            Err(e) => return Err(e),
        }
    }

    Ok(OpMessage::new(format!(
        "Synchronized {} crew accounts (added {added}, removed {removed})",
        wanted.len()
    )))
}

/// Reduce an uploaded file name to a bare script name in the router's root
fn script_name(file_name: &str) -> ControlResult<&str> {
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    if base.is_empty() || base == "." || base == ".." {
        return Err(ControlError::BadRequest(format!(
            "invalid configuration file name: {file_name:?}"
        )));
    }
    Ok(base)
}

/// One line per record, `key: value` pairs separated by two spaces
fn render_reply(reply: &Reply) -> String {
    if reply.re.is_empty() {
        return "Done.".to_string();
    }
    reply
        .re
        .iter()
        .map(|record| {
            record
                .iter()
                .map(|(k, v)| format!("{k}: {v}"))
                .collect::<Vec<_>>()
                .join("  ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}
