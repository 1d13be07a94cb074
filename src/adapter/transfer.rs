use std::{
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use tokio::process::Command;

use crate::error::LocalIoError;

/// Pulls a file from the remote host onto the local filesystem.
pub trait ArchiveFetcher {
    async fn fetch(&self, remote_path: &str, local_target: &Path) -> Result<(), LocalIoError>;
}

impl<T: ArchiveFetcher> ArchiveFetcher for &T {
    async fn fetch(&self, remote_path: &str, local_target: &Path) -> Result<(), LocalIoError> {
        (**self).fetch(remote_path, local_target).await
    }
}

/// Runs `scp <user>@<host>:<remote> <local>` as a subprocess.
#[derive(Debug, Clone)]
pub struct ScpFetcher {
    program: PathBuf,
    remote_user: String,
    remote_host: String,
    timeout: Duration,
}

impl ScpFetcher {
    pub fn new(remote_user: &str, remote_host: &str, timeout: Duration) -> Self {
        Self {
            program: PathBuf::from("scp"),
            remote_user: remote_user.to_string(),
            remote_host: remote_host.to_string(),
            timeout,
        }
    }

    /// Uses another binary in place of `scp`. It receives the same two arguments.
    #[cfg(test)]
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    pub fn remote_source(&self, remote_path: &str) -> String {
        format!("{}@{}:{}", self.remote_user, self.remote_host, remote_path)
    }
}

impl ArchiveFetcher for ScpFetcher {
    async fn fetch(&self, remote_path: &str, local_target: &Path) -> Result<(), LocalIoError> {
        let source = self.remote_source(remote_path);
        tracing::debug!(%source, target = %local_target.display(), "running scp");

        let child = Command::new(&self.program)
            .arg(&source)
            .arg(local_target)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| LocalIoError::Io {
                operation: "spawn scp",
                path: self.program.clone(),
                source,
            })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| LocalIoError::CopyTimeout(self.timeout))?
            .map_err(|source| LocalIoError::Io {
                operation: "wait for scp",
                path: self.program.clone(),
                source,
            })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(LocalIoError::CopyFailed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::fs::PermissionsExt;

    use super::*;

    fn fake_scp(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("fake-scp");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn remote_source_joins_user_host_and_path() {
        let scp = ScpFetcher::new("fedora", "certs.example.org", Duration::from_secs(5));

        assert_eq!(
            scp.remote_source("/tmp/certs.tar.gz"),
            "fedora@certs.example.org:/tmp/certs.tar.gz"
        );
    }

    #[tokio::test]
    async fn successful_copy_writes_target() {
        let dir = tempfile::tempdir().unwrap();
        let program = fake_scp(dir.path(), r#"echo "$1" > "$2""#);
        let target = dir.path().join("certs.tar.gz");

        ScpFetcher::new("fedora", "web01", Duration::from_secs(5))
            .with_program(program)
            .fetch("/tmp/certs.tar.gz", &target)
            .await
            .unwrap();

        let written = std::fs::read_to_string(&target).unwrap();
        assert_eq!(written.trim(), "fedora@web01:/tmp/certs.tar.gz");
    }

    #[tokio::test]
    async fn non_zero_exit_is_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let program = fake_scp(dir.path(), "echo 'No such file or directory' >&2; exit 1");

        let err = ScpFetcher::new("fedora", "web01", Duration::from_secs(5))
            .with_program(program)
            .fetch("/tmp/missing.tar.gz", &dir.path().join("out"))
            .await
            .unwrap_err();

        match err {
            LocalIoError::CopyFailed { stderr, .. } => {
                assert_eq!(stderr, "No such file or directory")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn hung_copy_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let program = fake_scp(dir.path(), "exec sleep 5");

        let err = ScpFetcher::new("fedora", "web01", Duration::from_millis(100))
            .with_program(program)
            .fetch("/tmp/certs.tar.gz", &dir.path().join("out"))
            .await
            .unwrap_err();

        assert!(matches!(err, LocalIoError::CopyTimeout(_)));
    }

    #[tokio::test]
    async fn missing_program_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();

        let err = ScpFetcher::new("fedora", "web01", Duration::from_secs(1))
            .with_program(dir.path().join("does-not-exist"))
            .fetch("/tmp/certs.tar.gz", &dir.path().join("out"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            LocalIoError::Io {
                operation: "spawn scp",
                ..
            }
        ));
    }
}
