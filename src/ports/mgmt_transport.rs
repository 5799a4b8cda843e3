use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::{
    core::sentence::{Reply, Sentence},
    ports::ship_directory::RouterEndpoint,
};

/// Error kinds of the router management channel
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportError {
    /// Dial refused, timed out, or the connection was reset
    #[error("router unreachable: {0}")]
    Unreachable(String),

    /// The router rejected the login exchange
    #[error("router rejected login: {0}")]
    AuthRejected(String),

    /// Malformed frame or unexpected reply shape
    #[error("router protocol error: {0}")]
    Protocol(String),

    /// The router answered a command with `!trap`
    #[error("{message}")]
    Trap {
        /// Trap category as sent by the router, when present
        category: Option<u32>,
        message: String,
    },

    /// The router sent `!fatal` and closed the session
    #[error("router closed the session: {0}")]
    Fatal(String),
}

impl TransportError {
    /// Whether the degradation shim should answer instead of surfacing the
    /// error. Only reachability and login failures qualify.
    pub fn degrades(&self) -> bool {
        matches!(
            self,
            TransportError::Unreachable(_) | TransportError::AuthRejected(_)
        )
    }
}

/// Result type alias for management channel operations
pub type TransportResult<T> = Result<T, TransportError>;

/// An authenticated session on one router's management port.
///
/// One session owns one connection; sentences are issued strictly one at a
/// time. Dropping a session closes its connection.
#[async_trait]
pub trait MgmtSession: Send {
    /// Send one sentence and wait for the complete reply
    async fn run(&mut self, sentence: Sentence) -> TransportResult<Reply>;

    /// Close the connection. Safe to call more than once.
    async fn close(&mut self);
}

/// MgmtConnector defines the port for dialing and logging into a router
#[async_trait]
pub trait MgmtConnector: Send + Sync {
    /// Dial `endpoint` within `dial_timeout` and perform the login exchange
    async fn connect(
        &self,
        endpoint: &RouterEndpoint,
        dial_timeout: Duration,
    ) -> TransportResult<Box<dyn MgmtSession>>;
}
