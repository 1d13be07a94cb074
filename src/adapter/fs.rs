use std::{
    fmt::Display,
    fs, io,
    os::unix::fs::symlink,
    path::{Path, PathBuf},
};

use crate::error::LocalIoError;

pub const LATEST_LINK: &str = "latest";

/// The local backup layout: `<root>/<YYYYMMDD>/<archive>` plus `<root>/latest`.
#[derive(Debug, Clone)]
pub struct BackupTree {
    root: PathBuf,
}

impl BackupTree {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    pub fn run_dir(&self, run_date: &str) -> PathBuf {
        self.root.join(run_date)
    }

    pub fn latest_link(&self) -> PathBuf {
        self.root.join(LATEST_LINK)
    }

    /// Creates the directory for one run. Existing directories are fine.
    pub fn prepare_run_dir(&self, run_date: &str) -> Result<PathBuf, LocalIoError> {
        let dir = self.run_dir(run_date);
        fs::create_dir_all(&dir).map_err(|source| LocalIoError::Io {
            operation: "create backup directory",
            path: dir.clone(),
            source,
        })?;

        Ok(dir)
    }

    /// Re-points `latest` at `run_date`, relative to the root.
    ///
    /// Only a symlink is ever removed; anything else at that path is left alone
    /// and reported.
    pub fn point_latest_at(&self, run_date: &str) -> Result<(), LocalIoError> {
        let link = self.latest_link();

        match fs::symlink_metadata(&link) {
            Ok(meta) if meta.file_type().is_symlink() => {
                fs::remove_file(&link).map_err(|source| LocalIoError::Io {
                    operation: "remove latest symlink",
                    path: link.clone(),
                    source,
                })?;
            }
            Ok(_) => return Err(LocalIoError::NotASymlink { path: link }),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(LocalIoError::Io {
                    operation: "inspect latest symlink",
                    path: link,
                    source,
                })
            }
        }

        symlink(run_date, &link).map_err(|source| LocalIoError::Io {
            operation: "create latest symlink",
            path: link,
            source,
        })
    }

    pub fn latest_target(&self) -> Option<PathBuf> {
        fs::read_link(self.latest_link()).ok()
    }
}

impl Display for BackupTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.root.display())
    }
}
