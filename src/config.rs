use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{config::ssh::SessionConfig, error::ConfigError, util::shell_quote};

pub mod ssh;

pub const DEFAULT_REMOTE_FOLDER: &str = "/tmp";
pub const DEFAULT_ARCHIVE_NAME: &str = "certs.tar.gz";
pub const DEFAULT_RENEW_COMMAND: &str = "sudo certbot renew --quiet";
pub const DEFAULT_ARCHIVE_PARENT: &str = "/etc/";
pub const DEFAULT_ARCHIVE_DIR: &str = "letsencrypt";
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_LOG_DIR: &str = "logs";
pub const DEFAULT_LOG_FILE: &str = "app.log";

/// Reads the optional YAML config file. Every key in it may be left out.
pub fn read_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let file = File::open(path).map_err(|source| ConfigError::Read {
        path: path.to_owned(),
        source,
    })?;
    let reader = BufReader::new(file);

    serde_yaml::from_reader(reader).map_err(|source| ConfigError::Parse {
        path: path.to_owned(),
        source,
    })
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(alias = "host")]
    pub remote_host: Option<String>,
    #[serde(alias = "user")]
    pub remote_user: Option<String>,
    #[serde(alias = "backup_root")]
    pub backup_dest: Option<PathBuf>,
    pub remote_folder: Option<String>,
    pub archive_name: Option<String>,
    pub renew_command: Option<String>,
    #[serde(default)]
    pub archive_source: ArchiveSource,
    pub command_timeout_secs: Option<u64>,
    pub connect_timeout_secs: Option<u64>,
    pub verify_checksum: Option<bool>,
    pub log_dir: Option<PathBuf>,
    pub log_file: Option<String>,
}

/// Directory archived on the remote host, given as `tar -C <parent> <dir>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveSource {
    pub parent: String,
    pub dir: String,
}

impl Default for ArchiveSource {
    fn default() -> Self {
        Self {
            parent: DEFAULT_ARCHIVE_PARENT.to_owned(),
            dir: DEFAULT_ARCHIVE_DIR.to_owned(),
        }
    }
}

/// Values given on the command line. They win over the config file.
#[derive(Debug, Default)]
pub struct ConfigOverrides {
    pub remote_host: Option<String>,
    pub remote_user: Option<String>,
    pub backup_dest: Option<PathBuf>,
    pub remote_folder: Option<String>,
    pub archive_name: Option<String>,
}

/// Everything one renewal run needs. Immutable once resolved.
#[derive(Debug, Clone)]
pub struct RenewalConfig {
    pub remote_host: String,
    pub remote_user: String,
    pub backup_root: PathBuf,
    pub remote_folder: String,
    pub archive_name: String,
    pub renew_command: String,
    pub archive_source: ArchiveSource,
    pub command_timeout: Duration,
    pub connect_timeout: Duration,
    pub verify_checksum: bool,
}

impl RenewalConfig {
    pub fn resolve(file: FileConfig, overrides: ConfigOverrides) -> Result<Self, ConfigError> {
        let remote_host = overrides
            .remote_host
            .or(file.remote_host)
            .filter(|host| !host.is_empty())
            .ok_or(ConfigError::Missing("remote_host"))?;
        let remote_user = overrides
            .remote_user
            .or(file.remote_user)
            .filter(|user| !user.is_empty())
            .ok_or(ConfigError::Missing("remote_user"))?;
        let backup_root = overrides
            .backup_dest
            .or(file.backup_dest)
            .ok_or(ConfigError::Missing("backup_dest"))?;

        let archive_name = overrides
            .archive_name
            .or(file.archive_name)
            .unwrap_or_else(|| DEFAULT_ARCHIVE_NAME.to_owned());
        if archive_name.is_empty()
            || archive_name.contains('/')
            || matches!(archive_name.as_str(), "." | "..")
        {
            return Err(ConfigError::Invalid {
                field: "archive_name",
                reason: "must be a plain file name",
            });
        }

        let command_timeout_secs = file
            .command_timeout_secs
            .unwrap_or(DEFAULT_COMMAND_TIMEOUT_SECS);
        let connect_timeout_secs = file
            .connect_timeout_secs
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS);
        if command_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "command_timeout_secs",
                reason: "must be greater than zero",
            });
        }
        if connect_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "connect_timeout_secs",
                reason: "must be greater than zero",
            });
        }

        Ok(Self {
            remote_host,
            remote_user,
            backup_root,
            remote_folder: overrides
                .remote_folder
                .or(file.remote_folder)
                .unwrap_or_else(|| DEFAULT_REMOTE_FOLDER.to_owned()),
            archive_name,
            renew_command: file
                .renew_command
                .unwrap_or_else(|| DEFAULT_RENEW_COMMAND.to_owned()),
            archive_source: file.archive_source,
            command_timeout: Duration::from_secs(command_timeout_secs),
            connect_timeout: Duration::from_secs(connect_timeout_secs),
            verify_checksum: file.verify_checksum.unwrap_or(true),
        })
    }

    pub fn session(&self) -> SessionConfig {
        SessionConfig {
            host: self.remote_host.clone(),
            user: self.remote_user.clone(),
            connect_timeout: self.connect_timeout,
            command_timeout: self.command_timeout,
        }
    }

    /// `<remote_folder>/<archive_name>` on the remote host.
    pub fn tarball_path(&self) -> String {
        let folder = self.remote_folder.trim_end_matches('/');
        format!("{folder}/{}", self.archive_name)
    }

    pub fn archive_command(&self) -> String {
        format!(
            "sudo tar -cvzf {} -C {} {}",
            shell_quote(&self.tarball_path()),
            shell_quote(&self.archive_source.parent),
            shell_quote(&self.archive_source.dir),
        )
    }
}
