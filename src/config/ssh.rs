use std::{
    env,
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    time::Duration,
};

use ssh2_config::{HostParams, ParseRule};

use crate::{adapter::ssh::SshSession, error::ConnectionError};

/// Host and identity of the remote session. Consumed once by [`SessionConfig::open`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub host: String,
    pub user: String,
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
}

impl SessionConfig {
    pub fn open(self) -> Result<SshSession, ConnectionError> {
        let params = host_params(&self.host);
        SshSession::open(&self, &params)
    }
}

pub fn user_ssh_dir() -> Option<PathBuf> {
    env::var_os("HOME").map(|home| PathBuf::from(home).join(".ssh"))
}

/// Looks `hostname` up in `~/.ssh/config`. A missing or unreadable file yields defaults.
pub fn host_params(hostname: &str) -> HostParams {
    let parsed = user_ssh_dir()
        .map(|dir| dir.join("config"))
        .filter(|path| path.is_file())
        .and_then(|path| parse_ssh_config(&path));

    parsed
        .unwrap_or_default()
        .query(hostname)
}

fn parse_ssh_config(path: &Path) -> Option<ssh2_config::SshConfig> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "could not open ssh config");
            return None;
        }
    };
    let mut reader = BufReader::new(file);

    match ssh2_config::SshConfig::default().parse(&mut reader, ParseRule::ALLOW_UNKNOWN_FIELDS) {
        Ok(config) => Some(config),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "ignoring unparsable ssh config");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_host_block() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config");
        std::fs::write(
            &path,
            "Host certs\n    HostName certs.example.org\n    Port 2222\n    User fedora\n",
        )
        .unwrap();

        let params = parse_ssh_config(&path).unwrap().query("certs");

        assert_eq!(params.host_name.as_deref(), Some("certs.example.org"));
        assert_eq!(params.port, Some(2222));
        assert_eq!(params.user.as_deref(), Some("fedora"));
    }

    #[test]
    fn missing_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        assert!(parse_ssh_config(&dir.path().join("nope")).is_none());
    }
}
