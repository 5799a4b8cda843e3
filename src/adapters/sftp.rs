//! SSH/SFTP file channel to a ship's router.
//!
//! Host keys are accepted without verification; routers in the fleet ship
//! with self-generated keys and no known-hosts store is configured.
use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use russh::{Disconnect, client};
use russh_sftp::client::SftpSession;
use tokio::{io::AsyncWriteExt, time::timeout};

use crate::ports::{
    file_transport::{FileTransport, FileTransportError, FileTransportResult},
    ship_directory::RouterEndpoint,
};

struct AcceptAnyHostKey;

#[async_trait]
impl client::Handler for AcceptAnyHostKey {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &russh_keys::key::PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

/// Uploads files with SSH password auth and SFTP
#[derive(Debug, Clone, Default)]
pub struct SftpFileTransport;

impl SftpFileTransport {
    pub fn new() -> Self {
        Self
    }

    async fn open(
        endpoint: &RouterEndpoint,
        addr: &str,
    ) -> FileTransportResult<client::Handle<AcceptAnyHostKey>> {
        let config = Arc::new(client::Config::default());
        let mut handle = client::connect(config, addr, AcceptAnyHostKey)
            .await
            .map_err(|e| FileTransportError::Connect {
                addr: addr.to_string(),
                reason: e.to_string(),
            })?;

        let accepted = handle
            .authenticate_password(endpoint.user.as_str(), endpoint.password.as_str())
            .await
            .map_err(|e| FileTransportError::Connect {
                addr: addr.to_string(),
                reason: e.to_string(),
            })?;
        if !accepted {
            return Err(FileTransportError::AuthRejected(endpoint.user.clone()));
        }
        Ok(handle)
    }
}

/// Remote files land in the router's root directory
pub fn remote_path(file_name: &str) -> String {
    format!("/{}", file_name.trim_start_matches('/'))
}

#[async_trait]
impl FileTransport for SftpFileTransport {
    async fn upload(
        &self,
        endpoint: &RouterEndpoint,
        file_name: &str,
        contents: Bytes,
        dial_timeout: Duration,
    ) -> FileTransportResult<u64> {
        let addr = endpoint.ssh_addr();
        let handle = timeout(dial_timeout, Self::open(endpoint, &addr))
            .await
            .map_err(|_| FileTransportError::Timeout {
                addr: addr.clone(),
                secs: dial_timeout.as_secs(),
            })??;

        let channel = handle
            .channel_open_session()
            .await
            .map_err(|e| FileTransportError::Session(e.to_string()))?;
        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| FileTransportError::Session(e.to_string()))?;
        let sftp = SftpSession::new(channel.into_stream())
            .await
            .map_err(|e| FileTransportError::Session(e.to_string()))?;

        let path = remote_path(file_name);
        let write_error = |e: &dyn std::fmt::Display| FileTransportError::Write {
            path: path.clone(),
            reason: e.to_string(),
        };
        let mut file = sftp.create(path.clone()).await.map_err(|e| write_error(&e))?;
        file.write_all(&contents).await.map_err(|e| write_error(&e))?;
        file.shutdown().await.map_err(|e| write_error(&e))?;

        let written = contents.len() as u64;
        tracing::info!(addr = %addr, path = %path, bytes = written, "file uploaded over SFTP");

        if let Err(e) = sftp.close().await {
            tracing::debug!(error = %e, "error closing SFTP session");
        }
        if let Err(e) = handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
        {
            tracing::debug!(error = %e, "error disconnecting SSH session");
        }
        Ok(written)
    }
}
