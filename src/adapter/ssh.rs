use ssh2::Session;
use ssh2_config::HostParams;

use crate::{
    adapter::ssh::connect::{authenticate, configure_session, try_connection, verify_host_key},
    config::ssh::SessionConfig,
    error::{ConnectionError, RemoteExecutionError},
};

pub use exec::CommandOutput;

mod connect;
pub mod exec;

/// Something that runs shell command lines on one remote host.
pub trait RemoteShell {
    fn execute(&mut self, command: &str) -> Result<CommandOutput, RemoteExecutionError>;

    /// Releases the channel. Calling it again is a no-op.
    fn close(&mut self);
}

/// One authenticated SSH session. Disconnects on [`RemoteShell::close`] or drop.
pub struct SshSession {
    host: String,
    session: Option<Session>,
}

impl SshSession {
    pub fn open(config: &SessionConfig, params: &HostParams) -> Result<Self, ConnectionError> {
        let host = params.host_name.as_deref().unwrap_or(&config.host);
        let port = params.port.unwrap_or(22);
        let connect_timeout = params.connect_timeout.unwrap_or(config.connect_timeout);

        let stream = try_connection(host, port, connect_timeout)?;
        tracing::debug!(
            peer = %stream
                .peer_addr()
                .map(|addr| addr.to_string())
                .unwrap_or("[host]".to_string()),
            "connected"
        );

        let mut session = Session::new()?;
        configure_session(&mut session, params);
        session.set_tcp_stream(stream);
        session.set_timeout(millis(connect_timeout));
        session
            .handshake()
            .map_err(|source| ConnectionError::Handshake {
                host: host.to_string(),
                source,
            })?;

        verify_host_key(&session, host, port)?;
        authenticate(&session, host, &config.user, params)?;

        if let Some(banner) = session.banner() {
            tracing::debug!("server banner: {}", banner.trim_end());
        }

        session.set_timeout(millis(config.command_timeout));
        tracing::info!(host, user = %config.user, "ssh session established");

        Ok(Self {
            host: host.to_string(),
            session: Some(session),
        })
    }
}

impl RemoteShell for SshSession {
    fn execute(&mut self, command: &str) -> Result<CommandOutput, RemoteExecutionError> {
        let session = self.session.as_ref().ok_or(RemoteExecutionError::Closed)?;
        exec::execute(session, command)
    }

    fn close(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };

        if let Err(err) = session.disconnect(None, "certrenew done", None) {
            tracing::debug!(host = %self.host, error = %err, "disconnect was not clean");
        }
        tracing::debug!(host = %self.host, "ssh session closed");
    }
}

impl Drop for SshSession {
    fn drop(&mut self) {
        self.close();
    }
}

fn millis(duration: std::time::Duration) -> u32 {
    u32::try_from(duration.as_millis()).unwrap_or(u32::MAX)
}
