//! Configuration data structures for fleetlink.
//!
//! These types map directly to TOML (also JSON / YAML) configuration files. All
//! sections carry defaults so a minimal config only lists the fleet.
use std::{fmt, time::Duration};

use eyre::{Result, WrapErr};
use serde::{Deserialize, Serialize};

use crate::{
    core::control::ControlSettings,
    ports::ship_directory::{CrewAccount, RouterEndpoint},
};

/// Root of the configuration file
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub auth: AuthConfig,
    pub cors: CorsConfig,
    pub router: RouterSettings,
    pub portal: PortalConfig,
    pub logging: LoggingConfig,
    pub ships: Vec<ShipConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
            auth: AuthConfig::default(),
            cors: CorsConfig::default(),
            router: RouterSettings::default(),
            portal: PortalConfig::default(),
            logging: LoggingConfig::default(),
            ships: Vec::new(),
        }
    }
}

impl ServerConfig {
    pub fn ship(&self, id: &str) -> Option<&ShipConfig> {
        self.ships.iter().find(|s| s.id == id)
    }
}

/// Bearer token settings
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC secret for HS256 tokens
    pub jwt_secret: String,
    /// Token lifetime, parsed by humantime (e.g. "24h")
    pub token_ttl: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "CHANGE_ME_SECRET".to_string(),
            token_ttl: "24h".to_string(),
        }
    }
}

impl AuthConfig {
    pub fn token_ttl(&self) -> Result<Duration> {
        parse_duration("auth.token_ttl", &self.token_ttl)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    /// Preflight cache lifetime, parsed by humantime
    pub max_age: String,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![
                "http://localhost:5173".to_string(),
                "http://127.0.0.1:5173".to_string(),
            ],
            max_age: "12h".to_string(),
        }
    }
}

impl CorsConfig {
    pub fn max_age(&self) -> Result<Duration> {
        parse_duration("cors.max_age", &self.max_age)
    }
}

/// How the management session logs in
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LoginMode {
    /// `/login`, then answer the MD5 challenge
    #[default]
    Challenge,
    /// `/login =name= =password=` in one step
    Plain,
}

/// Router connection knobs shared by every ship
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct RouterSettings {
    pub mgmt_dial_timeout: String,
    pub health_dial_timeout: String,
    pub ssh_dial_timeout: String,
    /// Interface sampled by the health check
    pub monitor_interface: String,
    pub login: LoginMode,
    /// Width of the wall-clock bucket seeding degraded numbers
    pub degraded_bucket: String,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            mgmt_dial_timeout: "3s".to_string(),
            health_dial_timeout: "2s".to_string(),
            ssh_dial_timeout: "5s".to_string(),
            monitor_interface: "ether1".to_string(),
            login: LoginMode::Challenge,
            degraded_bucket: "10s".to_string(),
        }
    }
}

impl RouterSettings {
    /// Durations that must parse and be non-zero, with their config keys
    pub fn durations(&self) -> [(&'static str, &str); 4] {
        [
            ("router.mgmt_dial_timeout", &self.mgmt_dial_timeout),
            ("router.health_dial_timeout", &self.health_dial_timeout),
            ("router.ssh_dial_timeout", &self.ssh_dial_timeout),
            ("router.degraded_bucket", &self.degraded_bucket),
        ]
    }

    pub fn control_settings(&self) -> Result<ControlSettings> {
        Ok(ControlSettings {
            mgmt_dial_timeout: parse_duration("router.mgmt_dial_timeout", &self.mgmt_dial_timeout)?,
            health_dial_timeout: parse_duration(
                "router.health_dial_timeout",
                &self.health_dial_timeout,
            )?,
            ssh_dial_timeout: parse_duration("router.ssh_dial_timeout", &self.ssh_dial_timeout)?,
            monitor_interface: self.monitor_interface.clone(),
            degraded_bucket: parse_duration("router.degraded_bucket", &self.degraded_bucket)?,
        })
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct PortalConfig {
    /// Ship implied by `/api/online-users*` and by provisioning requests that
    /// name no ship
    pub default_ship_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
        }
    }
}

fn default_router_port() -> u16 {
    RouterEndpoint::DEFAULT_MGMT_PORT
}

fn default_ssh_port() -> u16 {
    RouterEndpoint::DEFAULT_SSH_PORT
}

fn default_true() -> bool {
    true
}

/// One vessel and its onboard router
#[derive(Serialize, Deserialize, Clone)]
pub struct ShipConfig {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Empty when the router has not been set up yet
    #[serde(default)]
    pub router_ip: String,
    #[serde(default = "default_router_port")]
    pub router_port: u16,
    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,
    #[serde(default)]
    pub router_user: String,
    #[serde(default)]
    pub router_pass: String,
    #[serde(default = "default_true")]
    pub online: bool,
    #[serde(default)]
    pub crew: Vec<CrewConfig>,
}

impl fmt::Debug for ShipConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShipConfig")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("router_ip", &self.router_ip)
            .field("router_port", &self.router_port)
            .field("ssh_port", &self.ssh_port)
            .field("router_user", &self.router_user)
            .field("router_pass", &"<redacted>")
            .field("online", &self.online)
            .field("crew", &self.crew.len())
            .finish()
    }
}

impl ShipConfig {
    pub fn endpoint(&self) -> RouterEndpoint {
        RouterEndpoint {
            ship_id: self.id.clone(),
            host: self.router_ip.clone(),
            mgmt_port: self.router_port,
            ssh_port: self.ssh_port,
            user: self.router_user.clone(),
            password: self.router_pass.clone(),
            online: self.online,
        }
    }

    pub fn crew_accounts(&self) -> Vec<CrewAccount> {
        self.crew.iter().map(CrewConfig::account).collect()
    }
}

fn default_data_plan() -> String {
    "DataPlan".to_string()
}

fn default_crew_status() -> String {
    "Active".to_string()
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CrewConfig {
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_data_plan")]
    pub data_plan: String,
    /// `Active` or anything else
    #[serde(default = "default_crew_status")]
    pub status: String,
}

impl CrewConfig {
    pub fn account(&self) -> CrewAccount {
        CrewAccount {
            username: self.username.clone(),
            password: self.password.clone(),
            data_plan: self.data_plan.clone(),
            active: self.status.eq_ignore_ascii_case("active"),
        }
    }
}

fn parse_duration(key: &str, raw: &str) -> Result<Duration> {
    humantime::parse_duration(raw.trim()).wrap_err_with(|| format!("Invalid duration for {key}: {raw:?}"))
}
