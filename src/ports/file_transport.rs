use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::ports::ship_directory::RouterEndpoint;

/// Error type for the router's file channel
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum FileTransportError {
    /// TCP dial or SSH handshake failed
    #[error("SSH connection to {addr} failed: {reason}")]
    Connect { addr: String, reason: String },

    /// Dial did not finish in time
    #[error("SSH dial to {addr} timed out after {secs}s")]
    Timeout { addr: String, secs: u64 },

    /// Password authentication was refused
    #[error("SSH authentication rejected for user {0}")]
    AuthRejected(String),

    /// The SFTP subsystem could not be opened
    #[error("SFTP session error: {0}")]
    Session(String),

    /// Creating or writing the remote file failed
    #[error("failed to write {path}: {reason}")]
    Write { path: String, reason: String },
}

/// Result type for file channel operations
pub type FileTransportResult<T> = Result<T, FileTransportError>;

/// FileTransport defines the port for pushing files onto a router
#[async_trait]
pub trait FileTransport: Send + Sync {
    /// Create (or truncate) `/<file_name>` in the router's root and write
    /// `contents` into it. Returns the number of bytes written.
    async fn upload(
        &self,
        endpoint: &RouterEndpoint,
        file_name: &str,
        contents: Bytes,
        dial_timeout: Duration,
    ) -> FileTransportResult<u64>;
}
