use std::{io, path::PathBuf, time::Duration};

use thiserror::Error;

/// The remote session could not be opened. Fatal for the whole run.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("could not resolve {host}")]
    Resolve {
        host: String,
        #[source]
        source: io::Error,
    },

    #[error("could not reach {host} (tried {attempts} address(es))")]
    Unreachable { host: String, attempts: usize },

    #[error("ssh handshake with {host} failed")]
    Handshake {
        host: String,
        #[source]
        source: ssh2::Error,
    },

    #[error("host key of {host} is not trusted: {reason}")]
    UntrustedHostKey { host: String, reason: &'static str },

    #[error("authentication as {user} failed on {host}")]
    Authentication { host: String, user: String },

    #[error("ssh session setup failed")]
    Ssh(#[from] ssh2::Error),
}

/// A command on the remote host could not be run to a successful end.
#[derive(Debug, Error)]
pub enum RemoteExecutionError {
    #[error("session is already closed")]
    Closed,

    #[error("`{command}` failed on the channel")]
    Channel {
        command: String,
        #[source]
        source: ssh2::Error,
    },

    #[error("`{command}` did not finish in time")]
    Timeout { command: String },

    #[error("reading output of `{command}` failed")]
    Read {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("`{command}` exited with status {status}")]
    NonZeroExit {
        command: String,
        status: i32,
        stderr: String,
    },
}

/// Local filesystem or subprocess failures on the backup side.
#[derive(Debug, Error)]
pub enum LocalIoError {
    #[error("{operation} failed for {}", path.display())]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("refusing to replace {}: not a symlink", path.display())]
    NotASymlink { path: PathBuf },

    #[error("scp exited with {status}")]
    CopyFailed { status: String, stderr: String },

    #[error("scp did not finish within {0:?}")]
    CopyTimeout(Duration),

    #[error("checksum mismatch for {}: remote {remote}, local {local}", path.display())]
    ChecksumMismatch {
        path: PathBuf,
        remote: String,
        local: String,
    },

    #[error("could not read a checksum from `{0}`")]
    UnparsableChecksum(String),
}

/// Why a single pipeline step could not proceed.
#[derive(Debug, Error)]
pub enum StepError {
    #[error(transparent)]
    Remote(#[from] RemoteExecutionError),

    #[error(transparent)]
    Local(#[from] LocalIoError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting `{0}` (pass it as a flag or in the config file)")]
    Missing(&'static str),

    #[error("could not read config file {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not parse config file {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid value for `{field}`: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}
