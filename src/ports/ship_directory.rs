use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

/// Error type for ship directory lookups
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DirectoryError {
    /// No ship is registered under the requested id
    #[error("ship not found: {0}")]
    NotFound(String),

    /// The directory backend could not answer
    #[error("ship directory unavailable: {0}")]
    Unavailable(String),
}

/// Result type for ship directory lookups
pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// Network coordinates and credentials of one ship's onboard router.
///
/// Looked up per request and handed to the transports by value. The password
/// never leaves the transport layer: `Debug` redacts it and the type is not
/// serializable.
#[derive(Clone, PartialEq, Eq)]
pub struct RouterEndpoint {
    pub ship_id: String,
    pub host: String,
    pub mgmt_port: u16,
    pub ssh_port: u16,
    pub user: String,
    pub password: String,
    pub online: bool,
}

impl RouterEndpoint {
    pub const DEFAULT_MGMT_PORT: u16 = 8728;
    pub const DEFAULT_SSH_PORT: u16 = 22;

    /// An endpoint with no host is "unconfigured"; every operation against it
    /// short-circuits to degraded mode.
    pub fn is_configured(&self) -> bool {
        !self.host.trim().is_empty()
    }

    /// `host:port` of the binary management channel
    pub fn mgmt_addr(&self) -> String {
        format!("{}:{}", self.host.trim(), self.mgmt_port)
    }

    /// `host:port` of the SSH/SFTP channel
    pub fn ssh_addr(&self) -> String {
        format!("{}:{}", self.host.trim(), self.ssh_port)
    }
}

impl fmt::Debug for RouterEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterEndpoint")
            .field("ship_id", &self.ship_id)
            .field("host", &self.host)
            .field("mgmt_port", &self.mgmt_port)
            .field("ssh_port", &self.ssh_port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("online", &self.online)
            .finish()
    }
}

/// A crew member's hotspot account as recorded in the portal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrewAccount {
    pub username: String,
    pub password: String,
    /// Hotspot user profile (bandwidth plan name) on the router
    pub data_plan: String,
    pub active: bool,
}

/// ShipDirectory defines the port for resolving ships to router endpoints.
///
/// Implementations must be safe to call concurrently and must not mutate
/// state on lookup.
#[async_trait]
pub trait ShipDirectory: Send + Sync {
    /// Resolve a ship id to its router endpoint
    async fn resolve(&self, ship_id: &str) -> DirectoryResult<RouterEndpoint>;

    /// Crew accounts registered on the ship
    async fn crew(&self, ship_id: &str) -> DirectoryResult<Vec<CrewAccount>>;
}
