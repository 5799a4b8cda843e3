use thiserror::Error;

use crate::ports::{
    file_transport::FileTransportError, mgmt_transport::TransportError,
    ship_directory::DirectoryError,
};

/// Errors surfaced by feature operations after degradation has been applied
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ControlError {
    #[error("ship not found: {0}")]
    NotFound(String),

    /// Kick target has no active hotspot session
    #[error("user not online")]
    NotOnline(String),

    #[error("{0}")]
    BadRequest(String),

    /// A dependent service (file channel, unreachable router on a path that
    /// cannot be simulated) failed
    #[error("{0}")]
    Upstream(String),

    /// Management channel error that does not degrade
    #[error(transparent)]
    Transport(TransportError),

    #[error("ship directory unavailable: {0}")]
    Directory(String),
}

pub type ControlResult<T> = Result<T, ControlError>;

impl From<DirectoryError> for ControlError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::NotFound(id) => ControlError::NotFound(id),
            other => ControlError::Directory(other.to_string()),
        }
    }
}

impl From<TransportError> for ControlError {
    fn from(err: TransportError) -> Self {
        ControlError::Transport(err)
    }
}

impl From<FileTransportError> for ControlError {
    fn from(err: FileTransportError) -> Self {
        ControlError::Upstream(format!("SSH/SFTP upload failed: {err}"))
    }
}
