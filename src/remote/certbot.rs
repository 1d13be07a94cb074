use std::sync::OnceLock;

use regex::bytes::Regex;

use crate::{adapter::ssh::RemoteShell, config::RenewalConfig, error::RemoteExecutionError};

/// certbot prints this when every certificate is still far from expiry.
pub const NO_RENEWAL_PATTERN: &str = r"(?i)no renewals were attempted";

static NO_RENEWAL_MARKER: OnceLock<Regex> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewalStatus {
    Renewed,
    NotDue,
}

pub fn interpret_renewal(stdout: &[u8]) -> RenewalStatus {
    let marker = NO_RENEWAL_MARKER
        .get_or_init(|| Regex::new(NO_RENEWAL_PATTERN).expect("marker pattern is valid"));

    if marker.is_match(stdout) {
        RenewalStatus::NotDue
    } else {
        RenewalStatus::Renewed
    }
}

pub fn renew(
    shell: &mut impl RemoteShell,
    config: &RenewalConfig,
) -> Result<RenewalStatus, RemoteExecutionError> {
    let output = shell
        .execute(&config.renew_command)?
        .checked(&config.renew_command)?;

    Ok(interpret_renewal(&output.stdout))
}

/// Archives the certificate directory on the remote host and returns where the
/// archive was written.
pub fn create_tarball(
    shell: &mut impl RemoteShell,
    config: &RenewalConfig,
) -> Result<String, RemoteExecutionError> {
    let command = config.archive_command();
    shell.execute(&command)?.checked(&command)?;

    Ok(config.tarball_path())
}
