//! Remote session management.
//!
//! Wraps one authenticated SSH connection to a single host and exposes the
//! two capabilities the orchestrator needs: execute a remote command and
//! transfer a local file to a remote path. One session lives for exactly one
//! deployment run and is closed on every exit path.

use crate::channel::CommandChannel;
use crate::config::DeployTarget;
use crate::error::{DeployError, ErrorKind, Result, TransportError};
use russh::client;
use russh::keys::{PrivateKeyWithHashAlg, decode_secret_key, ssh_key};
use russh_sftp::client::SftpSession;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::debug;

struct SshHandler;

impl client::Handler for SshHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &ssh_key::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        // Host keys are accepted as-is; targets come from the operator's own
        // config, the way 1.x behaved.
        Ok(true)
    }
}

/// One authenticated SSH connection to a deployment target.
pub struct RemoteSession {
    handle: client::Handle<SshHandler>,
}

impl RemoteSession {
    /// Open and authenticate a session to the target.
    ///
    /// Private-key material takes precedence over the password when both are
    /// configured. Any failure here carries [`ErrorKind::Connection`].
    pub async fn connect(target: &DeployTarget) -> Result<Self> {
        let port = target.port();
        let endpoint = format!("{}:{port}", target.host);
        debug!("ssh -p {port} {}@{}", target.username, target.host);

        let config = Arc::new(client::Config::default());
        let mut handle = client::connect(
            config,
            (target.host.as_str(), port),
            SshHandler,
        )
        .await
        .map_err(|e| connection_error(&endpoint, e))?;

        let authenticated = if let Some(pem) = target.private_key.as_deref() {
            let key = decode_secret_key(pem, None)
                .map_err(|e| connection_error(&endpoint, e))?;
            let hash_alg = handle
                .best_supported_rsa_hash()
                .await
                .map_err(|e| connection_error(&endpoint, e))?
                .flatten();
            handle
                .authenticate_publickey(
                    &target.username,
                    PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg),
                )
                .await
                .map_err(|e| connection_error(&endpoint, e))?
                .success()
        } else if let Some(password) = target.password.as_deref() {
            handle
                .authenticate_password(&target.username, password)
                .await
                .map_err(|e| connection_error(&endpoint, e))?
                .success()
        } else {
            return Err(DeployError::new(
                ErrorKind::Connection,
                format!("cannot authenticate to {endpoint}"),
                "neither privateKey nor password is configured",
            ));
        };

        if !authenticated {
            return Err(DeployError::new(
                ErrorKind::Connection,
                format!("cannot authenticate to {endpoint}"),
                format!("authentication rejected for user {}", target.username),
            ));
        }

        Ok(Self { handle })
    }

    /// Start a remote command.
    ///
    /// `pty` must be true for commands that may prompt interactively
    /// (privileged commands); without it the remote shell will not surface a
    /// prompt the channel can detect.
    pub async fn exec(
        &mut self,
        command: &str,
        pty: bool,
    ) -> std::result::Result<CommandChannel, TransportError> {
        let mut channel = self.handle.channel_open_session().await?;
        if pty {
            channel
                .request_pty(false, "xterm", 80, 24, 0, 0, &[])
                .await?;
        }
        channel.exec(true, command).await?;
        Ok(CommandChannel::new(channel))
    }

    /// Transfer a local file to a remote path over SFTP.
    pub async fn upload(
        &mut self,
        local: &Path,
        remote: &str,
    ) -> std::result::Result<(), TransportError> {
        let mut channel = self.handle.channel_open_session().await?;
        channel.request_subsystem(true, "sftp").await?;
        let sftp = SftpSession::new(channel.into_stream()).await?;

        let mut local_file = tokio::fs::File::open(local).await?;
        let mut remote_file = sftp.create(remote).await?;
        tokio::io::copy(&mut local_file, &mut remote_file).await?;
        remote_file.shutdown().await?;

        let _ = sftp.close().await;
        Ok(())
    }

    /// Close the session. Best effort; errors on disconnect are ignored.
    pub async fn close(self) {
        let _ = self
            .handle
            .disconnect(russh::Disconnect::ByApplication, "", "English")
            .await;
    }
}

fn connection_error(endpoint: &str, cause: impl std::fmt::Display) -> DeployError {
    DeployError::new(
        ErrorKind::Connection,
        format!("cannot connect to {endpoint}"),
        cause.to_string(),
    )
}
