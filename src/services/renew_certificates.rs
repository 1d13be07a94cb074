use std::{fmt::Display, path::PathBuf};

use chrono::{DateTime, Local};
use tracing::{Instrument, Span};

use crate::{
    adapter::{fs::BackupTree, ssh::RemoteShell, transfer::ArchiveFetcher},
    config::{ssh::SessionConfig, RenewalConfig},
    error::{ConnectionError, StepError},
    remote::{
        certbot::{self, RenewalStatus},
        integrity,
    },
    util::error_chain,
};

pub const RUN_DATE_FORMAT: &str = "%Y%m%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Renew,
    Tarball,
    Copy,
    Symlink,
}

impl Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Step::Renew => "renew",
            Step::Tarball => "tarball",
            Step::Copy => "copy",
            Step::Symlink => "symlink",
        })
    }
}

/// How a run ended. Step failures end up here instead of being propagated.
#[derive(Debug)]
pub enum RunOutcome {
    /// certbot had nothing to renew, so nothing was backed up.
    NoRenewal,
    Completed { archive: PathBuf },
    Aborted { step: Step, error: StepError },
}

impl RunOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::NoRenewal | RunOutcome::Completed { .. } => 0,
            RunOutcome::Aborted { .. } => 2,
        }
    }
}

/// Opens the session, runs the pipeline on it and closes it again.
///
/// Only a failure to open the session is returned as an error; everything
/// after that is reported through [`RunOutcome`].
pub async fn renew_certificates<S, O, F>(
    config: &RenewalConfig,
    open: O,
    fetcher: F,
    span: Span,
) -> Result<RunOutcome, ConnectionError>
where
    S: RemoteShell,
    O: FnOnce(SessionConfig) -> Result<S, ConnectionError>,
    F: ArchiveFetcher,
{
    let mut session = match span.in_scope(|| open(config.session())) {
        Ok(session) => session,
        Err(err) => {
            span.in_scope(|| {
                tracing::error!(error = %error_chain(&err), "could not open ssh session")
            });
            return Err(err);
        }
    };

    let outcome = RenewalPipeline::new(&mut session, fetcher, config, span)
        .run()
        .await;
    session.close();

    Ok(outcome)
}

/// The renew → tarball → copy → symlink sequence against one open session.
pub struct RenewalPipeline<'a, S, F> {
    shell: &'a mut S,
    fetcher: F,
    config: &'a RenewalConfig,
    tree: BackupTree,
    run_date: String,
    span: Span,
}

impl<'a, S, F> RenewalPipeline<'a, S, F>
where
    S: RemoteShell,
    F: ArchiveFetcher,
{
    pub fn new(shell: &'a mut S, fetcher: F, config: &'a RenewalConfig, span: Span) -> Self {
        Self::new_at(shell, fetcher, config, span, Local::now())
    }

    /// The run date is taken from `now` here, so a run crossing midnight keeps one
    /// directory.
    pub fn new_at(
        shell: &'a mut S,
        fetcher: F,
        config: &'a RenewalConfig,
        span: Span,
        now: DateTime<Local>,
    ) -> Self {
        Self {
            shell,
            fetcher,
            config,
            tree: BackupTree::new(&config.backup_root),
            run_date: now.format(RUN_DATE_FORMAT).to_string(),
            span,
        }
    }

    pub async fn run(mut self) -> RunOutcome {
        let span = self.span.clone();
        self.run_steps().instrument(span).await
    }

    async fn run_steps(&mut self) -> RunOutcome {
        tracing::info!(
            run_date = %self.run_date,
            backup_root = %self.tree,
            "starting renewal and backup"
        );

        match self.renew() {
            Ok(RenewalStatus::Renewed) => {}
            Ok(RenewalStatus::NotDue) => {
                tracing::info!("certificates are not due for renewal, nothing to back up");
                return RunOutcome::NoRenewal;
            }
            Err(error) => return abort(Step::Renew, error),
        }

        let tarball = match self.tarball() {
            Ok(tarball) => tarball,
            Err(error) => return abort(Step::Tarball, error),
        };

        let archive = match self.copy(&tarball).await {
            Ok(archive) => archive,
            Err(error) => return abort(Step::Copy, error),
        };

        if let Err(error) = self.symlink() {
            return abort(Step::Symlink, error);
        }

        tracing::info!(archive = %archive.display(), "renewal completed successfully");
        RunOutcome::Completed { archive }
    }

    fn renew(&mut self) -> Result<RenewalStatus, StepError> {
        let status = certbot::renew(&mut *self.shell, self.config)?;
        tracing::debug!(?status, "renewal command finished");

        Ok(status)
    }

    fn tarball(&mut self) -> Result<String, StepError> {
        let tarball = certbot::create_tarball(&mut *self.shell, self.config)?;
        tracing::info!(%tarball, "certificate tarball created");

        Ok(tarball)
    }

    async fn copy(&mut self, tarball: &str) -> Result<PathBuf, StepError> {
        let dir = self.tree.prepare_run_dir(&self.run_date)?;
        let target = dir.join(&self.config.archive_name);

        self.fetcher.fetch(tarball, &target).await?;
        if self.config.verify_checksum {
            integrity::verify_copy(&mut *self.shell, tarball, &target)?;
        }
        tracing::info!(target = %target.display(), "certificate tarball copied");

        Ok(target)
    }

    fn symlink(&self) -> Result<(), StepError> {
        if let Some(previous) = self.tree.latest_target() {
            tracing::debug!(previous = %previous.display(), "replacing 'latest' symlink");
        }
        self.tree.point_latest_at(&self.run_date)?;
        tracing::info!("Updated 'latest' symlink to {}", self.run_date);

        Ok(())
    }
}

fn abort(step: Step, error: StepError) -> RunOutcome {
    tracing::error!(%step, error = %error_chain(&error), "step failed, stopping");
    RunOutcome::Aborted { step, error }
}
