use std::{
    net::{TcpStream, ToSocketAddrs},
    path::PathBuf,
    time::Duration,
};

use ssh2::{CheckResult, KnownHostFileKind, MethodType, Session};
use ssh2_config::HostParams;

use crate::{check, config::ssh::user_ssh_dir, error::ConnectionError};

const DEFAULT_IDENTITIES: [&str; 3] = ["id_ed25519", "id_ecdsa", "id_rsa"];

pub(super) fn try_connection(
    host: &str,
    port: u16,
    timeout: Duration,
) -> Result<TcpStream, ConnectionError> {
    let addrs: Vec<_> = (host, port)
        .to_socket_addrs()
        .map_err(|source| ConnectionError::Resolve {
            host: host.to_string(),
            source,
        })?
        .collect();

    addrs
        .iter()
        .find_map(|addr| match TcpStream::connect_timeout(addr, timeout) {
            Ok(stream) => Some(stream),
            Err(err) => {
                tracing::debug!(%addr, error = %err, "connection attempt failed");
                None
            }
        })
        .ok_or_else(|| ConnectionError::Unreachable {
            host: host.to_string(),
            attempts: addrs.len(),
        })
}

/// Checks the server key against `~/.ssh/known_hosts`. Unknown hosts are rejected.
pub(super) fn verify_host_key(
    session: &Session,
    host: &str,
    port: u16,
) -> Result<(), ConnectionError> {
    let untrusted = |reason| ConnectionError::UntrustedHostKey {
        host: host.to_string(),
        reason,
    };

    let known_hosts_file = user_ssh_dir()
        .map(|dir| dir.join("known_hosts"))
        .filter(|path| path.is_file())
        .ok_or_else(|| untrusted("no known_hosts file"))?;

    let mut known_hosts = session.known_hosts()?;
    known_hosts.read_file(&known_hosts_file, KnownHostFileKind::OpenSSH)?;

    let (key, _) = session
        .host_key()
        .ok_or_else(|| untrusted("server sent no host key"))?;

    match known_hosts.check_port(host, port, key) {
        CheckResult::Match => Ok(()),
        CheckResult::NotFound => Err(untrusted("not listed in known_hosts")),
        CheckResult::Mismatch => Err(untrusted("key differs from known_hosts entry")),
        CheckResult::Failure => Err(untrusted("known_hosts check failed")),
    }
}

/// Tries the ssh-agent first, then the identity files from the ssh config
/// (or the usual defaults when it names none).
pub(super) fn authenticate(
    session: &Session,
    host: &str,
    user: &str,
    params: &HostParams,
) -> Result<(), ConnectionError> {
    match session.userauth_agent(user) {
        Ok(()) if session.authenticated() => {
            tracing::debug!("authenticated through ssh-agent");
            return Ok(());
        }
        Ok(()) => {}
        Err(err) => tracing::debug!(error = %err, "ssh-agent authentication failed"),
    }

    for identity in identity_files(params) {
        if !identity.is_file() {
            continue;
        }
        match session.userauth_pubkey_file(user, None, &identity, None) {
            Ok(()) if session.authenticated() => {
                tracing::debug!(identity = %identity.display(), "authenticated with identity file");
                return Ok(());
            }
            Ok(()) => {}
            Err(err) => tracing::debug!(
                identity = %identity.display(),
                error = %err,
                "identity file rejected"
            ),
        }
    }

    Err(ConnectionError::Authentication {
        host: host.to_string(),
        user: user.to_string(),
    })
}

fn identity_files(params: &HostParams) -> Vec<PathBuf> {
    if let Some(files) = params.identity_file.as_ref().filter(|files| !files.is_empty()) {
        return files.clone();
    }

    user_ssh_dir()
        .map(|dir| DEFAULT_IDENTITIES.iter().map(|name| dir.join(name)).collect())
        .unwrap_or_default()
}

// Used mostly the same logic to https://github.com/veeso/ssh2-config/blob/main/examples/client.rs
pub(super) fn configure_session(session: &mut Session, params: &HostParams) {
    if let Some(compress) = params.compression {
        session.set_compress(compress);
    }
    if let (Some(true), Some(interval)) = (params.tcp_keep_alive, params.server_alive_interval) {
        session.set_keepalive(true, interval.as_secs() as u32);
    }

    macro_rules! report_if_fail {
        ($op: expr, $err: expr) => {{
            if let Err(err) = $op {
                check!(false, "{}: {}", $err, err);
            }
        }};
    }

    // algos
    if let Some(algos) = params.kex_algorithms.as_deref() {
        report_if_fail!(
            session.method_pref(MethodType::Kex, algos.join(",").as_str()),
            "Could not set KEX algorithms"
        );
    }
    if let Some(algos) = params.host_key_algorithms.as_deref() {
        report_if_fail!(
            session.method_pref(MethodType::HostKey, algos.join(",").as_str()),
            "Could not set host key algorithms"
        );
    }
    if let Some(algos) = params.ciphers.as_deref() {
        report_if_fail!(
            session.method_pref(MethodType::CryptCs, algos.join(",").as_str()),
            "Could not set crypt algorithms (client-server)"
        );
        report_if_fail!(
            session.method_pref(MethodType::CryptSc, algos.join(",").as_str()),
            "Could not set crypt algorithms (server-client)"
        );
    }
    if let Some(algos) = params.mac.as_deref() {
        report_if_fail!(
            session.method_pref(MethodType::MacCs, algos.join(",").as_str()),
            "Could not set MAC algorithms (client-server)"
        );
        report_if_fail!(
            session.method_pref(MethodType::MacSc, algos.join(",").as_str()),
            "Could not set MAC algorithms (server-client)"
        )
    }
}
