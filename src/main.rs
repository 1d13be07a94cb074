mod adapter;
mod config;
mod error;
mod remote;
mod services;
mod telemetry;
mod util;

use std::{path::PathBuf, process};

use anyhow::Result;
use clap::Parser;
use uuid::Uuid;

use crate::{
    adapter::transfer::ScpFetcher,
    config::{
        read_config, ssh::SessionConfig, ConfigOverrides, FileConfig, RenewalConfig,
        DEFAULT_LOG_DIR, DEFAULT_LOG_FILE,
    },
    services::renew_certificates::{renew_certificates, RunOutcome},
    telemetry::{init_logging, LoggingConfig, DEFAULT_LOG_LEVEL},
    util::error_chain,
};

const EXIT_FAILURE: i32 = 1;

#[derive(Debug, Parser)]
#[command(
    name = "certrenew",
    version,
    about = "Renew TLS certificates on a remote server and back them up locally"
)]
struct Cli {
    /// Hostname or IP address of the remote server.
    #[arg(long, alias = "zeppelin-host", env = "CERTRENEW_REMOTE_HOST")]
    remote_host: Option<String>,

    /// Username for the SSH connection to the remote server.
    #[arg(long, alias = "zeppelin-user", env = "CERTRENEW_REMOTE_USER")]
    remote_user: Option<String>,

    /// Local directory that receives the dated backups.
    #[arg(long, alias = "data-backup-dest", env = "CERTRENEW_BACKUP_DEST")]
    backup_dest: Option<PathBuf>,

    /// YAML file with defaults for any of the settings.
    #[arg(short, long, env = "CERTRENEW_CONFIG")]
    config: Option<PathBuf>,

    /// Remote folder the archive is written to.
    #[arg(long)]
    remote_folder: Option<String>,

    /// File name of the archive.
    #[arg(long)]
    archive_name: Option<String>,

    /// Log level, overridden by `RUST_LOG`.
    #[arg(long, default_value = DEFAULT_LOG_LEVEL)]
    log_level: String,

    /// Directory holding the log file.
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    let code = match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            EXIT_FAILURE
        }
    };

    process::exit(code);
}

async fn run(cli: Cli) -> Result<i32> {
    let file = match &cli.config {
        Some(path) => read_config(path)?,
        None => FileConfig::default(),
    };

    let log_dir = cli
        .log_dir
        .clone()
        .or_else(|| file.log_dir.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR));
    let log_file = file
        .log_file
        .clone()
        .unwrap_or_else(|| DEFAULT_LOG_FILE.to_owned());
    let logging = init_logging(&LoggingConfig {
        level: &cli.log_level,
        log_dir: &log_dir,
        log_file: &log_file,
    })?;
    tracing::debug!(path = %logging.log_path().display(), "logging to file");

    let config = match RenewalConfig::resolve(
        file,
        ConfigOverrides {
            remote_host: cli.remote_host,
            remote_user: cli.remote_user,
            backup_dest: cli.backup_dest,
            remote_folder: cli.remote_folder,
            archive_name: cli.archive_name,
        },
    ) {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %error_chain(&err), "invalid configuration");
            return Ok(EXIT_FAILURE);
        }
    };

    let run_id = Uuid::new_v4();
    let span = tracing::info_span!("renewal", %run_id, host = %config.remote_host);
    let fetcher = ScpFetcher::new(
        &config.remote_user,
        &config.remote_host,
        config.command_timeout,
    );

    match renew_certificates(&config, SessionConfig::open, fetcher, span.clone()).await {
        Ok(outcome) => {
            span.in_scope(|| summarize(&outcome));
            Ok(outcome.exit_code())
        }
        Err(_) => Ok(EXIT_FAILURE),
    }
}

fn summarize(outcome: &RunOutcome) {
    match outcome {
        RunOutcome::NoRenewal => tracing::info!("run finished: nothing renewed"),
        RunOutcome::Completed { archive } => {
            tracing::info!(archive = %archive.display(), "run finished: backup stored")
        }
        RunOutcome::Aborted { step, error } => {
            tracing::warn!(%step, error = %error_chain(error), "run finished: aborted")
        }
    }
}
