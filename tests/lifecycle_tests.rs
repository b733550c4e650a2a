use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use stagehand::archive::FailedResultsArchiver;
use stagehand::config::ManagerContext;
use stagehand::step::{
    CloseOut, JobStepLifecycle, JobStepOutcome, RemoteTransferUtility, ResourceStager,
    StatusReporter, StepState, ToolRunner,
};
use stagehand::transfer::FileOps;
use stagehand::Result;
use tempfile::TempDir;

/// Status sink that records everything instead of writing a status file
#[derive(Default)]
struct RecordingStatus {
    operations: Mutex<Vec<String>>,
    percents: Mutex<Vec<f32>>,
}

impl StatusReporter for RecordingStatus {
    fn set_current_operation(&self, text: &str) {
        self.operations.lock().unwrap().push(text.to_string());
    }
    fn update_and_write(&self, percent_complete: f32) {
        self.percents.lock().unwrap().push(percent_complete);
    }
}

/// Shared call log so tests can assert cross-plugin ordering
type CallLog = Arc<Mutex<Vec<&'static str>>>;

struct FakeStager {
    calls: CallLog,
    staging_outcome: JobStepOutcome,
    remote_ok: bool,
}

impl FakeStager {
    fn new(calls: CallLog) -> Self {
        Self {
            calls,
            staging_outcome: JobStepOutcome::success(),
            remote_ok: true,
        }
    }
}

#[async_trait]
impl ResourceStager for FakeStager {
    async fn setup(
        &mut self,
        _tool_name: &str,
        _ctx: Arc<ManagerContext>,
        _status: Arc<dyn StatusReporter>,
        _remote: Option<Arc<dyn RemoteTransferUtility>>,
    ) -> Result<()> {
        self.calls.lock().unwrap().push("stager.setup");
        Ok(())
    }

    async fn get_resources(&mut self) -> JobStepOutcome {
        self.calls.lock().unwrap().push("stager.get_resources");
        self.staging_outcome.clone()
    }

    async fn copy_resources_to_remote(&self, _transfer: &dyn RemoteTransferUtility) -> bool {
        self.calls.lock().unwrap().push("stager.copy_to_remote");
        self.remote_ok
    }
}

struct FakeRunner {
    calls: CallLog,
    exec_outcome: JobStepOutcome,
    copy_results_ok: bool,
}

impl FakeRunner {
    fn new(calls: CallLog) -> Self {
        Self {
            calls,
            exec_outcome: JobStepOutcome::success(),
            copy_results_ok: true,
        }
    }
}

#[async_trait]
impl ToolRunner for FakeRunner {
    async fn setup(
        &mut self,
        _tool_name: &str,
        _ctx: Arc<ManagerContext>,
        _status: Arc<dyn StatusReporter>,
        _remote: Option<Arc<dyn RemoteTransferUtility>>,
    ) -> Result<()> {
        self.calls.lock().unwrap().push("runner.setup");
        Ok(())
    }

    async fn run_tool(&mut self) -> JobStepOutcome {
        self.calls.lock().unwrap().push("runner.run_tool");
        self.exec_outcome.clone()
    }

    fn progress(&self) -> f32 {
        100.0
    }

    async fn copy_results_to_transfer_directory(&mut self, _override_path: Option<&Path>) -> bool {
        self.calls.lock().unwrap().push("runner.copy_results");
        self.copy_results_ok
    }

    async fn retrieve_remote_results(
        &mut self,
        _transfer: &dyn RemoteTransferUtility,
        verify_copied: bool,
    ) -> (bool, Vec<PathBuf>) {
        self.calls.lock().unwrap().push(if verify_copied {
            "runner.retrieve_remote"
        } else {
            "runner.retrieve_remote_unverified"
        });
        (true, vec![PathBuf::from("results.txt")])
    }

    async fn post_process_remote_results(&mut self) -> JobStepOutcome {
        self.calls.lock().unwrap().push("runner.post_process");
        JobStepOutcome::success()
    }
}

struct FakeRemote;

#[async_trait]
impl RemoteTransferUtility for FakeRemote {
    async fn stage_files(&self, _files: &[PathBuf]) -> Result<()> {
        Ok(())
    }
    async fn retrieve_results(&self, _into: &Path) -> Result<Vec<PathBuf>> {
        Ok(Vec::new())
    }
}

struct Fixture {
    tmp: TempDir,
    status: Arc<RecordingStatus>,
    lifecycle: JobStepLifecycle,
    calls: CallLog,
}

async fn fixture() -> Fixture {
    let tmp = TempDir::new().unwrap();
    let working_dir = tmp.path().join("work").join("MSG_Auto200");
    tokio::fs::create_dir_all(&working_dir).await.unwrap();
    tokio::fs::write(working_dir.join("results.txt"), "partial output")
        .await
        .unwrap();

    let ctx = Arc::new(
        ManagerContext::new("Pub-80-1")
            .with_job_tool_description("job 2001, step 3 (MSGFPlus)")
            .with_param("Job", "2001")
            .with_param("Step", "3"),
    );
    let ops = Arc::new(
        FileOps::new(Arc::clone(&ctx)).with_retry_holdoff(Duration::from_secs(1)),
    );
    let archiver = Arc::new(FailedResultsArchiver::new(
        Arc::clone(&ctx),
        ops,
        tmp.path().join("FailedResults"),
    ));
    let status = Arc::new(RecordingStatus::default());
    let lifecycle = JobStepLifecycle::new(
        ctx,
        Arc::clone(&status) as Arc<dyn StatusReporter>,
        archiver,
        "MSGFPlus",
        &working_dir,
        "MSG_Auto200",
    );
    Fixture {
        tmp,
        status,
        lifecycle,
        calls: Arc::new(Mutex::new(Vec::new())),
    }
}

fn archive_root(fx: &Fixture) -> PathBuf {
    fx.tmp.path().join("FailedResults")
}

#[tokio::test]
async fn successful_local_step_runs_to_done() {
    let mut fx = fixture().await;
    let mut stager = FakeStager::new(Arc::clone(&fx.calls));
    let mut runner = FakeRunner::new(Arc::clone(&fx.calls));

    let outcome = fx.lifecycle.run(&mut stager, &mut runner, None).await;

    assert_eq!(outcome.close_out, CloseOut::Success);
    assert_eq!(fx.lifecycle.state(), StepState::Done);
    assert_eq!(outcome.progress_percent, 100.0);
    assert_eq!(
        *fx.calls.lock().unwrap(),
        vec![
            "stager.setup",
            "stager.get_resources",
            "runner.setup",
            "runner.run_tool",
            "runner.copy_results",
        ]
    );
    // Progress reached the status sink, and nothing failed so nothing
    // was archived
    assert!(fx.status.percents.lock().unwrap().contains(&100.0));
    assert!(tokio::fs::metadata(archive_root(&fx)).await.is_err());
}

#[tokio::test]
async fn staging_failure_archives_and_skips_execution() {
    let mut fx = fixture().await;
    let mut stager = FakeStager::new(Arc::clone(&fx.calls));
    stager.staging_outcome = JobStepOutcome::failed("input dataset not found");
    let mut runner = FakeRunner::new(Arc::clone(&fx.calls));

    let outcome = fx.lifecycle.run(&mut stager, &mut runner, None).await;

    assert_eq!(outcome.close_out, CloseOut::Failed);
    assert_eq!(fx.lifecycle.state(), StepState::StagingFailed);
    assert!(outcome.message.contains("input dataset not found"));
    assert!(outcome.message.contains("Resource staging failed"));
    // The tool never ran
    assert!(!fx.calls.lock().unwrap().contains(&"runner.run_tool"));

    // The working results were archived with their sidecar
    let root = archive_root(&fx);
    assert!(tokio::fs::metadata(
        root.join("FailedResultsFolderInfo_MSG_Auto200.txt")
    )
    .await
    .is_ok());
    assert_eq!(
        tokio::fs::read_to_string(root.join("MSG_Auto200").join("results.txt"))
            .await
            .unwrap(),
        "partial output"
    );
}

#[tokio::test]
async fn abort_flag_overrides_successful_status() {
    let mut fx = fixture().await;
    let mut stager = FakeStager::new(Arc::clone(&fx.calls));
    // Plugin reports success but raises the abort flag; the flag wins
    stager.staging_outcome.need_to_abort_processing = true;
    let mut runner = FakeRunner::new(Arc::clone(&fx.calls));

    let outcome = fx.lifecycle.run(&mut stager, &mut runner, None).await;

    assert_eq!(outcome.close_out, CloseOut::Aborted);
    assert_eq!(fx.lifecycle.state(), StepState::StagingAbort);
    assert!(!fx.calls.lock().unwrap().contains(&"runner.setup"));
}

#[tokio::test]
async fn insufficient_memory_aborts_execution() {
    let mut fx = fixture().await;
    let mut stager = FakeStager::new(Arc::clone(&fx.calls));
    let mut runner = FakeRunner::new(Arc::clone(&fx.calls));
    runner.exec_outcome.insufficient_free_memory = true;

    let outcome = fx.lifecycle.run(&mut stager, &mut runner, None).await;

    assert_eq!(outcome.close_out, CloseOut::Aborted);
    assert_eq!(fx.lifecycle.state(), StepState::ExecAbort);
    assert!(outcome.insufficient_free_memory);
    assert!(!fx.calls.lock().unwrap().contains(&"runner.copy_results"));
}

#[tokio::test]
async fn not_ready_step_is_skipped_without_archival() {
    let mut fx = fixture().await;
    let mut stager = FakeStager::new(Arc::clone(&fx.calls));
    stager.staging_outcome = JobStepOutcome::skipped_not_ready("waiting on upstream step");
    let mut runner = FakeRunner::new(Arc::clone(&fx.calls));

    let outcome = fx.lifecycle.run(&mut stager, &mut runner, None).await;

    assert_eq!(outcome.close_out, CloseOut::SkippedNotReady);
    assert!(!fx.calls.lock().unwrap().contains(&"runner.setup"));
    assert!(tokio::fs::metadata(archive_root(&fx)).await.is_err());
}

#[tokio::test]
async fn remote_step_dispatches_retrieves_and_post_processes() {
    let mut fx = fixture().await;
    let mut stager = FakeStager::new(Arc::clone(&fx.calls));
    let mut runner = FakeRunner::new(Arc::clone(&fx.calls));

    let outcome = fx
        .lifecycle
        .run(
            &mut stager,
            &mut runner,
            Some(Arc::new(FakeRemote) as Arc<dyn RemoteTransferUtility>),
        )
        .await;

    assert_eq!(outcome.close_out, CloseOut::Success);
    assert_eq!(fx.lifecycle.state(), StepState::Done);
    assert_eq!(
        *fx.calls.lock().unwrap(),
        vec![
            "stager.setup",
            "stager.get_resources",
            "runner.setup",
            "stager.copy_to_remote",
            "runner.retrieve_remote",
            "runner.post_process",
            "runner.copy_results",
        ]
    );
    // run_tool is the remote host's job
    assert!(!fx.calls.lock().unwrap().contains(&"runner.run_tool"));
}

#[tokio::test]
async fn remote_retrieval_verification_can_be_disabled() {
    let mut fx = fixture().await;
    fx.lifecycle = fx.lifecycle.with_verify_remote_results(false);
    let mut stager = FakeStager::new(Arc::clone(&fx.calls));
    let mut runner = FakeRunner::new(Arc::clone(&fx.calls));

    let outcome = fx
        .lifecycle
        .run(
            &mut stager,
            &mut runner,
            Some(Arc::new(FakeRemote) as Arc<dyn RemoteTransferUtility>),
        )
        .await;

    assert_eq!(outcome.close_out, CloseOut::Success);
    // The runner saw verify_copied = false
    assert!(fx
        .calls
        .lock()
        .unwrap()
        .contains(&"runner.retrieve_remote_unverified"));
}

#[tokio::test]
async fn failed_remote_staging_archives_results() {
    let mut fx = fixture().await;
    let mut stager = FakeStager::new(Arc::clone(&fx.calls));
    stager.remote_ok = false;
    let mut runner = FakeRunner::new(Arc::clone(&fx.calls));

    let outcome = fx
        .lifecycle
        .run(
            &mut stager,
            &mut runner,
            Some(Arc::new(FakeRemote) as Arc<dyn RemoteTransferUtility>),
        )
        .await;

    assert_eq!(outcome.close_out, CloseOut::Failed);
    assert_eq!(fx.lifecycle.state(), StepState::ExecFailed);
    assert!(!fx.calls.lock().unwrap().contains(&"runner.retrieve_remote"));
    assert!(tokio::fs::metadata(
        archive_root(&fx).join("FailedResultsFolderInfo_MSG_Auto200.txt")
    )
    .await
    .is_ok());
}

#[tokio::test]
async fn failed_results_transfer_is_terminal() {
    let mut fx = fixture().await;
    let mut stager = FakeStager::new(Arc::clone(&fx.calls));
    let mut runner = FakeRunner::new(Arc::clone(&fx.calls));
    runner.copy_results_ok = false;

    let outcome = fx.lifecycle.run(&mut stager, &mut runner, None).await;

    assert_eq!(outcome.close_out, CloseOut::Failed);
    assert!(outcome
        .message
        .contains("Failed to copy results to the transfer directory"));
}
