use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::ManagerContext;
use crate::error::Result;
use crate::step::outcome::JobStepOutcome;

/// Sink for live step status. The progress pump writes here and only
/// here; nothing in this crate prints progress to the console.
pub trait StatusReporter: Send + Sync {
    fn set_current_operation(&self, text: &str);
    fn update_and_write(&self, percent_complete: f32);
}

/// Opaque handle to the transport that moves files to and from a remote
/// execution host. This crate defines the call shape only.
#[async_trait]
pub trait RemoteTransferUtility: Send + Sync {
    /// Push the named local files to the remote host's working area
    async fn stage_files(&self, files: &[PathBuf]) -> Result<()>;

    /// Pull remote results into `into`, returning the paths retrieved
    async fn retrieve_results(&self, into: &Path) -> Result<Vec<PathBuf>>;
}

/// First phase of the plugin contract: gather the files and parameters
/// the analysis tool needs before it runs.
///
/// `setup` must be called before `get_resources`. After every call the
/// orchestrator checks `insufficient_free_memory` and
/// `need_to_abort_processing` on the returned outcome and aborts the
/// pipeline if either is set, regardless of the returned close-out.
#[async_trait]
pub trait ResourceStager: Send + Sync {
    async fn setup(
        &mut self,
        tool_name: &str,
        ctx: Arc<ManagerContext>,
        status: Arc<dyn StatusReporter>,
        remote: Option<Arc<dyn RemoteTransferUtility>>,
    ) -> Result<()>;

    async fn get_resources(&mut self) -> JobStepOutcome;

    /// Stage only the subset of resources a remote execution host
    /// actually needs (plus any required reference data). Plugins that
    /// never run remotely keep the default.
    async fn copy_resources_to_remote(&self, _transfer: &dyn RemoteTransferUtility) -> bool {
        true
    }
}

/// Second phase of the plugin contract: run the analysis tool and move
/// its output along.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    async fn setup(
        &mut self,
        tool_name: &str,
        ctx: Arc<ManagerContext>,
        status: Arc<dyn StatusReporter>,
        remote: Option<Arc<dyn RemoteTransferUtility>>,
    ) -> Result<()>;

    async fn run_tool(&mut self) -> JobStepOutcome;

    /// Live completion percentage, polled by the lifecycle's progress pump
    fn progress(&self) -> f32;

    /// Move final output into the results directory and on to the
    /// transfer location. `override_path` substitutes the transfer
    /// destination when given.
    async fn copy_results_to_transfer_directory(&mut self, override_path: Option<&Path>) -> bool;

    /// Pull results computed on a remote host back into the local
    /// working directory. With `verify_copied`, missing files are
    /// warnings or errors; without it they are demoted to debug logging
    /// (some outputs are optionally produced).
    async fn retrieve_remote_results(
        &mut self,
        _transfer: &dyn RemoteTransferUtility,
        _verify_copied: bool,
    ) -> (bool, Vec<PathBuf>) {
        (true, Vec::new())
    }

    /// Local-only finalization a remote host could not perform (for
    /// example database-dependent steps).
    async fn post_process_remote_results(&mut self) -> JobStepOutcome {
        JobStepOutcome::success()
    }
}
