use std::path::Path;

use sha256::try_digest;

use crate::{
    adapter::ssh::RemoteShell,
    error::{LocalIoError, StepError},
    util::shell_quote,
};

/// Compares the SHA-256 of the remote archive with the copy on disk.
pub fn verify_copy(
    shell: &mut impl RemoteShell,
    remote_path: &str,
    local_path: &Path,
) -> Result<(), StepError> {
    let remote = remote_sha256(shell, remote_path)?;
    let local = local_sha256(local_path)?;

    if remote != local {
        return Err(LocalIoError::ChecksumMismatch {
            path: local_path.to_path_buf(),
            remote,
            local,
        }
        .into());
    }

    tracing::debug!(digest = %local, "archive checksum verified");
    Ok(())
}

fn remote_sha256(shell: &mut impl RemoteShell, remote_path: &str) -> Result<String, StepError> {
    let command = format!("sha256sum {}", shell_quote(remote_path));
    let output = shell.execute(&command)?.checked(&command)?;

    parse_sha256sum(&output.stdout_lossy())
        .ok_or_else(|| LocalIoError::UnparsableChecksum(output.stdout_lossy()).into())
}

fn local_sha256(path: &Path) -> Result<String, LocalIoError> {
    try_digest(path).map_err(|source| LocalIoError::Io {
        operation: "hash local archive",
        path: path.to_path_buf(),
        source,
    })
}

/// Takes the digest out of a `sha256sum` line (`<digest>  <path>`).
fn parse_sha256sum(line: &str) -> Option<String> {
    let digest = line.split_whitespace().next()?;

    (digest.len() == 64 && digest.chars().all(|c| c.is_ascii_hexdigit()))
        .then(|| digest.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::mock::MockShell;

    // sha256("archive")
    const ARCHIVE_DIGEST: &str = "0eb3e36bfb24dcd9bb1d1bece1531216b59539a8fde17ee80224af0653c92aa3";

    #[test]
    fn parses_sha256sum_output() {
        let line = format!("{ARCHIVE_DIGEST}  /tmp/certs.tar.gz\n");
        assert_eq!(parse_sha256sum(&line).as_deref(), Some(ARCHIVE_DIGEST));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_sha256sum("sha256sum: /tmp/x: No such file"), None);
        assert_eq!(parse_sha256sum(""), None);
    }

    #[test]
    fn matching_digest_passes() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("certs.tar.gz");
        std::fs::write(&local, b"archive").unwrap();
        let digest = local_sha256(&local).unwrap();
        assert_eq!(digest, ARCHIVE_DIGEST);
        let mut shell =
            MockShell::new().then_stdout(format!("{digest}  /tmp/certs.tar.gz\n").as_bytes());

        verify_copy(&mut shell, "/tmp/certs.tar.gz", &local).unwrap();

        assert_eq!(shell.commands, vec!["sha256sum /tmp/certs.tar.gz"]);
    }

    #[test]
    fn mismatching_digest_fails() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("certs.tar.gz");
        std::fs::write(&local, b"truncated").unwrap();
        let mut shell = MockShell::new()
            .then_stdout(format!("{}  /tmp/certs.tar.gz\n", "0".repeat(64)).as_bytes());

        let err = verify_copy(&mut shell, "/tmp/certs.tar.gz", &local).unwrap_err();

        assert!(matches!(
            err,
            StepError::Local(LocalIoError::ChecksumMismatch { .. })
        ));
    }
}
