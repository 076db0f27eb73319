//! Run directory provisioning.
//!
//! Each session executes inside its own temporary directory seeded with a
//! copy of every file in the template directory. The directory is removed
//! best-effort when the [`RunDirectory`] is dropped, whatever ended the
//! session.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::{AppError, Result};

/// Prefix of every run directory name.
const RUN_DIR_PREFIX: &str = "data-playground-";

/// Ephemeral per-session filesystem scope.
#[derive(Debug)]
pub struct RunDirectory {
    dir: TempDir,
    seeded: Vec<PathBuf>,
}

impl RunDirectory {
    /// Absolute path of the directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Files copied from the template, in copy order.
    #[must_use]
    pub fn seeded_files(&self) -> &[PathBuf] {
        &self.seeded
    }

    /// Remove the directory now, logging instead of failing.
    pub fn remove(self) {
        let path = self.dir.path().to_path_buf();
        if let Err(err) = self.dir.close() {
            warn!(path = %path.display(), %err, "failed to remove run directory");
        } else {
            debug!(path = %path.display(), "run directory removed");
        }
    }
}

/// Creates isolated run directories from a template.
#[derive(Debug, Clone)]
pub struct RunDirectoryProvisioner {
    template_dir: PathBuf,
    run_root: Option<PathBuf>,
}

impl RunDirectoryProvisioner {
    /// Create a provisioner copying from `template_dir` into fresh
    /// directories under `run_root` (the system temp dir when `None`).
    #[must_use]
    pub fn new(template_dir: impl Into<PathBuf>, run_root: Option<PathBuf>) -> Self {
        Self {
            template_dir: template_dir.into(),
            run_root,
        }
    }

    /// Template directory copied into every run directory.
    #[must_use]
    pub fn template_dir(&self) -> &Path {
        &self.template_dir
    }

    /// Create a fresh directory and copy every template file into it.
    ///
    /// The directory is only returned once all copies have completed.
    /// Subdirectories of the template are not copied. A failed copy is
    /// reported and not retried; the partially seeded directory is removed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Provisioning` if the template cannot be listed,
    /// the destination cannot be created, or any file copy fails.
    pub async fn provision(&self) -> Result<RunDirectory> {
        let files = self.template_files().await?;

        let mut builder = tempfile::Builder::new();
        builder.prefix(RUN_DIR_PREFIX);
        let created = match &self.run_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        };
        let dir = created
            .map_err(|err| AppError::Provisioning(format!("cannot create run directory: {err}")))?;

        let mut seeded = Vec::with_capacity(files.len());
        for src in files {
            let Some(name) = src.file_name() else {
                continue;
            };
            let dst = dir.path().join(name);
            tokio::fs::copy(&src, &dst).await.map_err(|err| {
                AppError::Provisioning(format!("failed to copy '{}': {err}", src.display()))
            })?;
            seeded.push(dst);
        }

        info!(
            path = %dir.path().display(),
            files = seeded.len(),
            "run directory provisioned"
        );

        Ok(RunDirectory { dir, seeded })
    }

    async fn template_files(&self) -> Result<Vec<PathBuf>> {
        let mut entries = tokio::fs::read_dir(&self.template_dir).await.map_err(|err| {
            AppError::Provisioning(format!(
                "cannot list template '{}': {err}",
                self.template_dir.display()
            ))
        })?;

        let mut files = Vec::new();
        loop {
            let entry = entries.next_entry().await.map_err(|err| {
                AppError::Provisioning(format!("cannot list template entry: {err}"))
            })?;
            let Some(entry) = entry else {
                break;
            };
            let file_type = entry.file_type().await.map_err(|err| {
                AppError::Provisioning(format!("cannot stat template entry: {err}"))
            })?;
            if file_type.is_dir() {
                debug!(path = %entry.path().display(), "skipping template subdirectory");
                continue;
            }
            files.push(entry.path());
        }
        files.sort();
        Ok(files)
    }
}
