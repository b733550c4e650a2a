use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::archive::{FailedResultsArchiver, FailedResultsSidecar};
use crate::config::ManagerContext;
use crate::step::outcome::{CloseOut, JobStepOutcome};
use crate::step::plugin::{RemoteTransferUtility, ResourceStager, StatusReporter, ToolRunner};

/// Where a job step is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepState {
    Created,
    Staging,
    StagingFailed,
    StagingAbort,
    StagingOk,
    Executing,
    ExecFailed,
    ExecAbort,
    ExecOk,
    RemoteDispatched,
    RemoteExecuting,
    RemoteRetrieved,
    PostProcessed,
    ResultsTransferred,
    Done,
}

impl std::fmt::Display for StepState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StepState::Created => "created",
            StepState::Staging => "staging",
            StepState::StagingFailed => "staging-failed",
            StepState::StagingAbort => "staging-abort",
            StepState::StagingOk => "staging-ok",
            StepState::Executing => "executing",
            StepState::ExecFailed => "exec-failed",
            StepState::ExecAbort => "exec-abort",
            StepState::ExecOk => "exec-ok",
            StepState::RemoteDispatched => "remote-dispatched",
            StepState::RemoteExecuting => "remote-executing",
            StepState::RemoteRetrieved => "remote-retrieved",
            StepState::PostProcessed => "post-processed",
            StepState::ResultsTransferred => "results-transferred",
            StepState::Done => "done",
        };
        write!(f, "{name}")
    }
}

/// Drives one job step through staging and execution, local or remote.
///
/// The lifecycle owns the step-level [`JobStepOutcome`]: phase outcomes
/// are folded in as they arrive, the abort and memory flags are checked
/// after every plugin call regardless of the returned close-out, and any
/// terminal failure or abort archives the working results before
/// control returns to the orchestrator.
pub struct JobStepLifecycle {
    ctx: Arc<ManagerContext>,
    status: Arc<dyn StatusReporter>,
    archiver: Arc<FailedResultsArchiver>,
    abort: CancellationToken,
    tool_name: String,
    working_dir: PathBuf,
    results_folder_name: String,
    verify_remote_results: bool,
    state: StepState,
    outcome: JobStepOutcome,
}

impl JobStepLifecycle {
    pub fn new(
        ctx: Arc<ManagerContext>,
        status: Arc<dyn StatusReporter>,
        archiver: Arc<FailedResultsArchiver>,
        tool_name: impl Into<String>,
        working_dir: impl Into<PathBuf>,
        results_folder_name: impl Into<String>,
    ) -> Self {
        Self {
            ctx,
            status,
            archiver,
            abort: CancellationToken::new(),
            tool_name: tool_name.into(),
            working_dir: working_dir.into(),
            results_folder_name: results_folder_name.into(),
            verify_remote_results: true,
            state: StepState::Created,
            outcome: JobStepOutcome::success(),
        }
    }

    /// Cooperative cancellation, polled between phases only; a phase
    /// already running is not preempted.
    pub fn with_abort_token(mut self, token: CancellationToken) -> Self {
        self.abort = token;
        self
    }

    /// Whether missing files count against a remote retrieval. Off for
    /// tools whose remote outputs are optionally produced; the runner
    /// then demotes missing-file reporting to debug logging.
    pub fn with_verify_remote_results(mut self, verify: bool) -> Self {
        self.verify_remote_results = verify;
        self
    }

    pub fn state(&self) -> StepState {
        self.state
    }

    /// Run the step to a terminal outcome. With a remote transfer
    /// utility the execution phase dispatches to the remote host and
    /// reconciles its results; without one the tool runs locally.
    pub async fn run(
        &mut self,
        stager: &mut dyn ResourceStager,
        runner: &mut dyn ToolRunner,
        remote: Option<Arc<dyn RemoteTransferUtility>>,
    ) -> JobStepOutcome {
        // ---- Staging ----
        self.transition(StepState::Staging);
        self.status.set_current_operation(&format!(
            "Staging resources for {}",
            self.ctx.current_job_tool_description()
        ));

        if let Err(err) = stager
            .setup(
                &self.tool_name,
                Arc::clone(&self.ctx),
                Arc::clone(&self.status),
                remote.clone(),
            )
            .await
        {
            return self
                .fail_step(StepState::StagingFailed, &format!("Resource staging setup failed: {err}"))
                .await;
        }

        let staged = stager.get_resources().await;
        self.outcome.absorb(&staged);
        if staged.requires_abort() || self.abort.is_cancelled() {
            return self
                .abort_step(StepState::StagingAbort, "Abort requested during resource staging")
                .await;
        }
        match staged.close_out {
            CloseOut::Success => self.transition(StepState::StagingOk),
            CloseOut::SkippedNotReady => {
                tracing::info!(
                    job = %self.ctx.current_job_tool_description(),
                    "Step resources not ready; step skipped"
                );
                self.outcome.close_out = CloseOut::SkippedNotReady;
                return self.outcome.clone();
            }
            CloseOut::Aborted => {
                return self
                    .abort_step(StepState::StagingAbort, "Resource staging aborted")
                    .await;
            }
            CloseOut::Failed => {
                return self
                    .fail_step(StepState::StagingFailed, "Resource staging failed")
                    .await;
            }
        }

        // ---- Execution ----
        self.transition(StepState::Executing);
        self.status
            .set_current_operation(&format!("Running {}", self.tool_name));

        if let Err(err) = runner
            .setup(
                &self.tool_name,
                Arc::clone(&self.ctx),
                Arc::clone(&self.status),
                remote.clone(),
            )
            .await
        {
            return self
                .fail_step(StepState::ExecFailed, &format!("Tool setup failed: {err}"))
                .await;
        }

        match remote {
            Some(transfer) => {
                if !stager.copy_resources_to_remote(transfer.as_ref()).await {
                    return self
                        .fail_step(
                            StepState::ExecFailed,
                            "Failed to stage resources on the remote host",
                        )
                        .await;
                }
                self.transition(StepState::ExecOk);
                self.transition(StepState::RemoteDispatched);
                self.transition(StepState::RemoteExecuting);

                let (retrieved_ok, retrieved) = runner
                    .retrieve_remote_results(transfer.as_ref(), self.verify_remote_results)
                    .await;
                if !retrieved_ok {
                    return self
                        .fail_step(StepState::ExecFailed, "Failed to retrieve remote results")
                        .await;
                }
                self.transition(StepState::RemoteRetrieved);
                if self.ctx.debug_level >= 2 {
                    tracing::debug!(files = retrieved.len(), "Retrieved remote results");
                }

                let post = runner.post_process_remote_results().await;
                self.outcome.absorb(&post);
                if post.requires_abort() || self.abort.is_cancelled() {
                    return self
                        .abort_step(StepState::ExecAbort, "Abort requested during post-processing")
                        .await;
                }
                if post.close_out.is_terminal_failure() {
                    return self
                        .fail_step(StepState::ExecFailed, "Remote result post-processing failed")
                        .await;
                }
                self.transition(StepState::PostProcessed);
            }
            None => {
                let exec = runner.run_tool().await;
                self.report_progress(runner.progress());
                self.outcome.absorb(&exec);
                if exec.requires_abort() || self.abort.is_cancelled() {
                    return self
                        .abort_step(StepState::ExecAbort, "Abort requested during tool execution")
                        .await;
                }
                match exec.close_out {
                    CloseOut::Success => self.transition(StepState::ExecOk),
                    CloseOut::SkippedNotReady => {
                        self.outcome.close_out = CloseOut::SkippedNotReady;
                        return self.outcome.clone();
                    }
                    CloseOut::Aborted => {
                        return self
                            .abort_step(StepState::ExecAbort, "Tool execution aborted")
                            .await;
                    }
                    CloseOut::Failed => {
                        return self
                            .fail_step(StepState::ExecFailed, "Tool execution failed")
                            .await;
                    }
                }
            }
        }

        // ---- Results transfer ----
        if !runner.copy_results_to_transfer_directory(None).await {
            return self
                .fail_step(
                    StepState::ExecFailed,
                    "Failed to copy results to the transfer directory",
                )
                .await;
        }
        self.transition(StepState::ResultsTransferred);
        self.report_progress(100.0);
        self.transition(StepState::Done);
        self.status.set_current_operation(&format!(
            "Completed {}",
            self.ctx.current_job_tool_description()
        ));
        self.outcome.clone()
    }

    fn transition(&mut self, to: StepState) {
        if self.ctx.debug_level >= 2 {
            tracing::debug!(from = %self.state, to = %to, "Step state change");
        }
        self.state = to;
    }

    /// Forward progress to the status sink. Never the console: the sink
    /// rewrites a status file that other tooling watches.
    fn report_progress(&mut self, percent: f32) {
        let percent = percent.clamp(0.0, 100.0);
        if percent > self.outcome.progress_percent {
            self.outcome.progress_percent = percent;
        }
        self.status.update_and_write(percent);
    }

    async fn fail_step(&mut self, state: StepState, message: &str) -> JobStepOutcome {
        tracing::error!(
            job = %self.ctx.current_job_tool_description(),
            state = %state,
            reason = message,
            "Job step failed"
        );
        self.outcome.close_out = CloseOut::Failed;
        self.outcome.append_message(message);
        self.transition(state);
        self.archive_failed_results().await;
        self.outcome.clone()
    }

    async fn abort_step(&mut self, state: StepState, message: &str) -> JobStepOutcome {
        tracing::warn!(
            job = %self.ctx.current_job_tool_description(),
            state = %state,
            reason = message,
            "Job step aborted"
        );
        self.outcome.close_out = CloseOut::Aborted;
        self.outcome.need_to_abort_processing = true;
        self.outcome.append_message(message);
        self.transition(state);
        self.archive_failed_results().await;
        self.outcome.clone()
    }

    /// Best-effort: archival problems are logged, never escalated over
    /// the failure that brought us here.
    async fn archive_failed_results(&self) {
        let sidecar = FailedResultsSidecar::from_context(&self.ctx, &self.results_folder_name);
        if let Err(err) = self.archiver.archive(&sidecar, &self.working_dir).await {
            tracing::error!(
                working_dir = %self.working_dir.display(),
                error = %err,
                "Failed to archive failed results"
            );
        }
    }
}
