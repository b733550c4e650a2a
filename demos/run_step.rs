//! Run a trivial job step end to end against a temp directory.
//!
//! The "analysis tool" here just writes one result file; the point is to
//! show the wiring: manager context, file ops, archiver, status sink,
//! and the two plugin halves driven by the lifecycle.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use stagehand::archive::FailedResultsArchiver;
use stagehand::config::ManagerContext;
use stagehand::step::{
    JobStepLifecycle, JobStepOutcome, RemoteTransferUtility, ResourceStager, StatusReporter,
    ToolRunner,
};
use stagehand::transfer::FileOps;
use stagehand::Result;

struct LogStatus;

impl StatusReporter for LogStatus {
    fn set_current_operation(&self, text: &str) {
        tracing::info!(operation = text, "Status");
    }
    fn update_and_write(&self, percent_complete: f32) {
        tracing::info!(percent_complete, "Progress");
    }
}

struct DemoStager;

#[async_trait]
impl ResourceStager for DemoStager {
    async fn setup(
        &mut self,
        tool_name: &str,
        _ctx: Arc<ManagerContext>,
        _status: Arc<dyn StatusReporter>,
        _remote: Option<Arc<dyn RemoteTransferUtility>>,
    ) -> Result<()> {
        tracing::info!(tool_name, "Stager ready");
        Ok(())
    }

    async fn get_resources(&mut self) -> JobStepOutcome {
        JobStepOutcome::success()
    }
}

struct DemoRunner {
    working_dir: PathBuf,
}

#[async_trait]
impl ToolRunner for DemoRunner {
    async fn setup(
        &mut self,
        _tool_name: &str,
        _ctx: Arc<ManagerContext>,
        _status: Arc<dyn StatusReporter>,
        _remote: Option<Arc<dyn RemoteTransferUtility>>,
    ) -> Result<()> {
        Ok(())
    }

    async fn run_tool(&mut self) -> JobStepOutcome {
        if let Err(err) =
            tokio::fs::write(self.working_dir.join("results.txt"), "42 peptides\n").await
        {
            return JobStepOutcome::failed(format!("could not write results: {err}"));
        }
        JobStepOutcome::success()
    }

    fn progress(&self) -> f32 {
        100.0
    }

    async fn copy_results_to_transfer_directory(&mut self, _override_path: Option<&Path>) -> bool {
        true
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let tmp = tempfile::tempdir().expect("create temp dir");
    let working_dir = tmp.path().join("MSG_Auto1");
    tokio::fs::create_dir_all(&working_dir)
        .await
        .expect("create working dir");

    let ctx = Arc::new(
        ManagerContext::new("Demo-Manager")
            .with_debug_level(2)
            .with_job_tool_description("job 1, step 1 (DemoTool)")
            .with_param("Job", "1")
            .with_param("Step", "1"),
    );
    let ops = Arc::new(FileOps::new(Arc::clone(&ctx)));
    let archiver = Arc::new(FailedResultsArchiver::new(
        Arc::clone(&ctx),
        ops,
        tmp.path().join("FailedResults"),
    ));

    let mut lifecycle = JobStepLifecycle::new(
        ctx,
        Arc::new(LogStatus),
        archiver,
        "DemoTool",
        &working_dir,
        "MSG_Auto1",
    );

    let mut stager = DemoStager;
    let mut runner = DemoRunner {
        working_dir: working_dir.clone(),
    };
    let outcome = lifecycle.run(&mut stager, &mut runner, None).await;

    tracing::info!(
        close_out = %outcome.close_out,
        state = ?lifecycle.state(),
        message = %outcome.message,
        "Step finished"
    );
}
