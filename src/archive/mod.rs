//! Retention of failed job output for postmortem diagnosis.
//!
//! When a job step fails terminally, its working results are copied into
//! a shared failed-results root alongside a small provenance sidecar
//! (see [`sidecar`]). A retention sweep runs before each archival and
//! purges entries past the retention window: the results directory is
//! deleted, the sidecar renamed with the `x_` purge marker but never
//! deleted, preserving the audit trail.
//!
//! Everything here is best-effort. A sidecar that cannot be written, or
//! a single archive entry that cannot be purged, is logged and skipped;
//! only a failure to reach the archive root at all is an error.

pub mod sidecar;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::{ManagerContext, DEFAULT_MAX_RETRY_COUNT, FAILED_RESULTS_RETENTION_DAYS};
use crate::error::{Result, StagehandError};
use crate::transfer::FileOps;

pub use sidecar::FailedResultsSidecar;

/// Copies failed working results into a shared archive root and keeps
/// that root from growing without bound.
pub struct FailedResultsArchiver {
    ctx: Arc<ManagerContext>,
    ops: Arc<FileOps>,
    archive_root: PathBuf,
}

impl FailedResultsArchiver {
    pub fn new(ctx: Arc<ManagerContext>, ops: Arc<FileOps>, archive_root: impl Into<PathBuf>) -> Self {
        Self {
            ctx,
            ops,
            archive_root: archive_root.into(),
        }
    }

    pub fn archive_root(&self) -> &Path {
        &self.archive_root
    }

    /// Archive `results_dir` under the failed-results root.
    ///
    /// No-op when each job owns an isolated private working directory
    /// (nothing shared to preserve). The sidecar write and the tree copy
    /// are both best-effort; the sweep runs between them so stale
    /// entries free their space before the new copy lands.
    pub async fn archive(
        &self,
        sidecar: &FailedResultsSidecar,
        results_dir: &Path,
    ) -> Result<()> {
        if self.ctx.isolated_working_dirs {
            tracing::info!(
                results_dir = %results_dir.display(),
                "Isolated working directories; skipping failed-results archival"
            );
            return Ok(());
        }

        self.ops
            .create_directory(&self.archive_root, DEFAULT_MAX_RETRY_COUNT)
            .await?;

        match sidecar.write_to(&self.archive_root).await {
            Ok(path) => {
                if self.ctx.debug_level >= 2 {
                    tracing::debug!(path = %path.display(), "Wrote failed-results sidecar");
                }
            }
            Err(err) => {
                // The results themselves still get archived
                tracing::error!(
                    path = %self.archive_root.join(sidecar.file_name()).display(),
                    error = %err,
                    "Failed to write sidecar; archiving results anyway"
                );
            }
        }

        let purged = self.purge_expired(Utc::now()).await;
        if purged > 0 {
            tracing::info!(purged, root = %self.archive_root.display(), "Purged expired failed-results entries");
        }

        let folder_name = results_dir
            .file_name()
            .ok_or(StagehandError::EmptyPath("results directory"))?;
        let destination = self.archive_root.join(folder_name);
        tracing::info!(
            source = %results_dir.display(),
            destination = %destination.display(),
            "Archiving failed results"
        );
        self.ops
            .copy_directory_tree(results_dir, &destination, true, DEFAULT_MAX_RETRY_COUNT, true)
            .await
    }

    /// Purge archive entries whose sidecar is older than the retention
    /// window, judged by the sidecar's own modification time against
    /// `now`. Per-entry failures are logged and do not stop the sweep.
    /// Returns the number of entries purged.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let retention = chrono::Duration::days(FAILED_RESULTS_RETENTION_DAYS);
        let mut entries = match tokio::fs::read_dir(&self.archive_root).await {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!(
                    root = %self.archive_root.display(),
                    error = %err,
                    "Cannot list archive root; skipping retention sweep"
                );
                return 0;
            }
        };

        let mut purged = 0;
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(err) => {
                    tracing::warn!(error = %err, "Archive root listing failed partway");
                    break;
                }
            };
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if !sidecar::is_active_sidecar(&file_name) {
                continue;
            }

            let modified = match entry.metadata().await.and_then(|m| m.modified()) {
                Ok(modified) => DateTime::<Utc>::from(modified),
                Err(err) => {
                    tracing::warn!(sidecar = %file_name, error = %err, "Cannot read sidecar age");
                    continue;
                }
            };
            if now.signed_duration_since(modified) <= retention {
                continue;
            }

            match self.purge_entry(&file_name).await {
                Ok(()) => purged += 1,
                Err(err) => {
                    tracing::error!(
                        sidecar = %file_name,
                        error = %err,
                        "Failed to purge archive entry; continuing sweep"
                    );
                }
            }
        }
        purged
    }

    /// Delete one sidecar's paired results directory, then mark the
    /// sidecar purged by renaming it with the `x_` prefix.
    async fn purge_entry(&self, sidecar_name: &str) -> Result<()> {
        let folder = sidecar::results_folder_for(sidecar_name)
            .ok_or(StagehandError::EmptyPath("sidecar results folder"))?;
        let results_dir = self.archive_root.join(folder);
        match tokio::fs::remove_dir_all(&results_dir).await {
            Ok(()) => {}
            // Already gone is fine; the rename below still records the purge
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        tokio::fs::rename(
            self.archive_root.join(sidecar_name),
            self.archive_root.join(sidecar::purged_name(sidecar_name)),
        )
        .await?;
        tracing::info!(sidecar = %sidecar_name, results_dir = %results_dir.display(), "Purged expired archive entry");
        Ok(())
    }
}
