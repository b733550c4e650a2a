use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::config::{ManagerContext, COPY_STATS_LOG_THRESHOLD, DEFAULT_RETRY_HOLDOFF};
use crate::error::{Result, StagehandError};
use crate::lockwait::{LockQueueObserver, WaitTrackingState};
use crate::transfer::request::TransferRequest;
use crate::transfer::retry::{run_with_retry, RetryNotify};

/// Notification fired when a file copy is about to start
pub type FileNotify = dyn Fn(&Path) + Send + Sync;

/// Explicit callback values wired in at construction. No ambient event
/// subscription: whoever builds the [`FileOps`] decides what gets
/// notified.
#[derive(Clone, Default)]
pub struct TransferEvents {
    pub on_copying_file: Option<Arc<FileNotify>>,
    pub on_retry: Option<Arc<RetryNotify>>,
}

/// What a successful copy cost us.
///
/// `bytes` and `elapsed` describe the last, successful attempt; retried
/// bytes from failed attempts are unknowable and not counted.
#[derive(Debug, Clone, Copy)]
pub struct CopyStats {
    pub attempts: u32,
    pub bytes: u64,
    pub elapsed: Duration,
}

/// Resilient file operations over unreliable shared storage.
///
/// Every operation runs under the bounded-attempt retry engine; long
/// stretches of failed attempts are surfaced through the lock-queue
/// observer's escalating log-interval policy rather than one line per
/// attempt.
pub struct FileOps {
    ctx: Arc<ManagerContext>,
    events: TransferEvents,
    abort: CancellationToken,
    retry_holdoff: Duration,
    stats_log_threshold: Duration,
}

impl FileOps {
    pub fn new(ctx: Arc<ManagerContext>) -> Self {
        Self {
            ctx,
            events: TransferEvents::default(),
            abort: CancellationToken::new(),
            retry_holdoff: DEFAULT_RETRY_HOLDOFF,
            stats_log_threshold: COPY_STATS_LOG_THRESHOLD,
        }
    }

    pub fn with_events(mut self, events: TransferEvents) -> Self {
        self.events = events;
        self
    }

    /// Token polled between discrete operations (files of a tree copy).
    /// An in-flight copy or holdoff sleep is never preempted.
    pub fn with_abort_token(mut self, token: CancellationToken) -> Self {
        self.abort = token;
        self
    }

    /// Holdoff used by directory-level operations and tree copies
    pub fn with_retry_holdoff(mut self, holdoff: Duration) -> Self {
        self.retry_holdoff = holdoff.max(Duration::from_secs(1));
        self
    }

    pub fn with_stats_log_threshold(mut self, threshold: Duration) -> Self {
        self.stats_log_threshold = threshold;
        self
    }

    /// Observer for a wait on the named shared resource
    pub fn lock_queue_observer(&self, resource: impl Into<String>) -> LockQueueObserver {
        LockQueueObserver::new(Arc::clone(&self.ctx), resource)
    }

    /// Copy one file, retrying transient I/O failures.
    ///
    /// A missing source fails immediately with zero attempts consumed.
    /// With `overwrite` off, a destination that exists up front, or that
    /// appears after a failed attempt (a partial write from that
    /// attempt), is the typed would-overwrite error and is never
    /// retried. Copies slower than the stats threshold get a throughput
    /// line computed from the destination's final size.
    pub async fn copy_file(&self, request: &TransferRequest) -> Result<CopyStats> {
        if request.source.as_os_str().is_empty() {
            return Err(StagehandError::EmptyPath("source"));
        }
        if request.destination.as_os_str().is_empty() {
            return Err(StagehandError::EmptyPath("destination"));
        }
        if self.abort.is_cancelled() {
            return Err(StagehandError::Aborted(format!(
                "copy of {}",
                request.source.display()
            )));
        }
        if !path_exists(&request.source).await? {
            return Err(StagehandError::MissingSource(request.source.clone()));
        }
        if !request.overwrite && path_exists(&request.destination).await? {
            return Err(StagehandError::WouldOverwrite(request.destination.clone()));
        }

        if let Some(notify) = &self.events.on_copying_file {
            notify(&request.source);
        }
        if self.ctx.debug_level >= 2 {
            tracing::debug!(
                source = %request.source.display(),
                destination = %request.destination.display(),
                "Copying file"
            );
        }

        let observer = self.lock_queue_observer(request.destination.display().to_string());
        let wait_state = Mutex::new(WaitTrackingState::new());
        let on_retry_event = self.events.on_retry.clone();
        let notify = |attempt: u32, err: &StagehandError| {
            if let Ok(mut state) = wait_state.lock() {
                observer.still_waiting(&mut state, Instant::now());
            }
            if let Some(cb) = &on_retry_event {
                cb(attempt, err);
            }
        };

        let operation = format!("copy {}", request.source.display());
        let started = Instant::now();
        let (bytes, attempts) = run_with_retry(
            &operation,
            request.total_attempts(),
            request.retry_holdoff,
            request.increase_holdoff_on_each_retry,
            Some(&notify),
            |attempt| async move {
                // A destination that materialized after a failed attempt
                // is our own partial write; refuse rather than retry.
                if attempt > 1 && !request.overwrite && path_exists(&request.destination).await? {
                    return Err(StagehandError::WouldOverwrite(request.destination.clone()));
                }
                let bytes = tokio::fs::copy(&request.source, &request.destination).await?;
                Ok(bytes)
            },
        )
        .await?;

        let elapsed = started.elapsed();
        if let Ok(state) = wait_state.lock() {
            observer.wait_complete(&state, Instant::now());
        }
        if elapsed > self.stats_log_threshold {
            let final_bytes = tokio::fs::metadata(&request.destination)
                .await
                .map(|m| m.len())
                .unwrap_or(bytes);
            let mb = final_bytes as f64 / 1024.0 / 1024.0;
            tracing::info!(
                destination = %request.destination.display(),
                size_mb = format!("{:.1}", mb),
                rate_mb_per_sec = format!("{:.2}", mb / elapsed.as_secs_f64().max(0.001)),
                attempts,
                "Slow copy finished"
            );
        }

        Ok(CopyStats {
            attempts,
            bytes,
            elapsed,
        })
    }

    /// Check whether `path` exists and is a directory, retrying
    /// transient failures of the metadata lookup itself. A clean
    /// not-found answer is a successful `false`, not an error.
    pub async fn directory_exists(&self, path: &Path, max_retry_count: u32) -> Result<bool> {
        let operation = format!("check directory {}", path.display());
        let (found, _) = run_with_retry(
            &operation,
            max_retry_count.max(1) + 1,
            self.retry_holdoff,
            false,
            None,
            |_| async move {
                match tokio::fs::metadata(path).await {
                    Ok(meta) => Ok(meta.is_dir()),
                    Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
                    Err(err) => Err(err.into()),
                }
            },
        )
        .await?;
        Ok(found)
    }

    /// Create `path` (and any missing parents). A directory that already
    /// exists is a no-op success.
    pub async fn create_directory(&self, path: &Path, max_retry_count: u32) -> Result<()> {
        if path.as_os_str().is_empty() {
            return Err(StagehandError::EmptyPath("directory"));
        }
        let operation = format!("create directory {}", path.display());
        let (_, _) = run_with_retry(
            &operation,
            max_retry_count.max(1) + 1,
            self.retry_holdoff,
            false,
            None,
            |_| async move {
                tokio::fs::create_dir_all(path).await?;
                Ok(())
            },
        )
        .await?;
        Ok(())
    }

    /// Recursively copy `source` into `destination`, depth-first and
    /// sequentially.
    ///
    /// Policy (consistent on purpose, see DESIGN.md): with
    /// `continue_on_error` set, a missing source, a missing destination
    /// parent, and any per-file failure are each logged and skipped;
    /// without it, the first of these aborts the whole tree copy. Files
    /// already present at the destination are skipped silently when
    /// `overwrite` is off. The abort token is checked between entries.
    pub async fn copy_directory_tree(
        &self,
        source: &Path,
        destination: &Path,
        overwrite: bool,
        max_retry_count: u32,
        continue_on_error: bool,
    ) -> Result<()> {
        if !self.directory_exists(source, max_retry_count).await? {
            if continue_on_error {
                tracing::warn!(
                    source = %source.display(),
                    "Source directory not found; skipping tree copy"
                );
                return Ok(());
            }
            return Err(StagehandError::MissingSource(source.to_path_buf()));
        }

        if let Some(parent) = nonempty_parent(destination) {
            if !self.directory_exists(parent, max_retry_count).await? {
                if continue_on_error {
                    tracing::warn!(
                        destination = %destination.display(),
                        "Destination parent not found; skipping tree copy"
                    );
                    return Ok(());
                }
                return Err(StagehandError::MissingParent(destination.to_path_buf()));
            }
        }

        if let Err(err) = self.create_directory(destination, max_retry_count).await {
            if continue_on_error {
                tracing::error!(
                    destination = %destination.display(),
                    error = %err,
                    "Cannot create destination directory; skipping tree copy"
                );
                return Ok(());
            }
            return Err(err);
        }
        self.copy_tree_level(source, destination, overwrite, max_retry_count, continue_on_error)
            .await
    }

    /// One directory level; recurses into subdirectories via a boxed
    /// future (async recursion).
    fn copy_tree_level<'a>(
        &'a self,
        source: &'a Path,
        destination: &'a Path,
        overwrite: bool,
        max_retry_count: u32,
        continue_on_error: bool,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let mut entries = match tokio::fs::read_dir(source).await {
                Ok(entries) => entries,
                Err(err) if continue_on_error => {
                    tracing::error!(
                        directory = %source.display(),
                        error = %err,
                        "Cannot list directory; skipping"
                    );
                    return Ok(());
                }
                Err(err) => return Err(err.into()),
            };

            loop {
                if self.abort.is_cancelled() {
                    return Err(StagehandError::Aborted(format!(
                        "tree copy of {}",
                        source.display()
                    )));
                }
                let entry = match entries.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => break,
                    Err(err) if continue_on_error => {
                        tracing::error!(
                            directory = %source.display(),
                            error = %err,
                            "Directory listing failed partway; skipping remainder"
                        );
                        break;
                    }
                    Err(err) => return Err(err.into()),
                };

                let target = destination.join(entry.file_name());
                let file_type = match entry.file_type().await {
                    Ok(t) => t,
                    Err(err) if continue_on_error => {
                        tracing::error!(
                            path = %entry.path().display(),
                            error = %err,
                            "Cannot stat entry; skipping"
                        );
                        continue;
                    }
                    Err(err) => return Err(err.into()),
                };

                if file_type.is_dir() {
                    if let Err(err) = self.create_directory(&target, max_retry_count).await {
                        if continue_on_error {
                            tracing::error!(
                                directory = %target.display(),
                                error = %err,
                                "Cannot create subdirectory; skipping its contents"
                            );
                            continue;
                        }
                        return Err(err);
                    }
                    self.copy_tree_level(
                        &entry.path(),
                        &target,
                        overwrite,
                        max_retry_count,
                        continue_on_error,
                    )
                    .await?;
                    continue;
                }

                if !overwrite && path_exists(&target).await.unwrap_or(false) {
                    if self.ctx.debug_level >= 2 {
                        tracing::debug!(target = %target.display(), "Skipping existing file");
                    }
                    continue;
                }

                let request = TransferRequest::new(entry.path(), &target)
                    .with_overwrite(overwrite)
                    .with_max_retry_count(max_retry_count)
                    .with_retry_holdoff(self.retry_holdoff);
                match self.copy_file(&request).await {
                    Ok(_) => {}
                    Err(err @ StagehandError::Aborted(_)) => return Err(err),
                    Err(err) if continue_on_error => {
                        tracing::error!(
                            source = %entry.path().display(),
                            error = %err,
                            "File copy failed; continuing with remaining files"
                        );
                    }
                    Err(err) => return Err(err),
                }
            }

            Ok(())
        })
    }
}

async fn path_exists(path: &Path) -> Result<bool> {
    match tokio::fs::metadata(path).await {
        Ok(_) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err.into()),
    }
}

/// Destination parent, unless the destination is a bare name or a
/// filesystem root (both of which have no checkable parent).
fn nonempty_parent(path: &Path) -> Option<&Path> {
    path.parent().filter(|p| !p.as_os_str().is_empty())
}
