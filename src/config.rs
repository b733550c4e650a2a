use std::collections::HashMap;
use std::time::Duration;

/// Retry attempts beyond the first, unless a caller asks for more.
pub const DEFAULT_MAX_RETRY_COUNT: u32 = 3;

/// Pause between retry attempts.
pub const DEFAULT_RETRY_HOLDOFF: Duration = Duration::from_secs(15);

/// Archived failed results older than this are purged by the sweep.
pub const FAILED_RESULTS_RETENTION_DAYS: i64 = 31;

/// Copies slower than this get a throughput log line on completion.
pub const COPY_STATS_LOG_THRESHOLD: Duration = Duration::from_secs(10);

/// Manager- and job-level context supplied by the orchestrator.
///
/// Read-only from this crate's perspective: the manager owns parameter
/// storage and parsing; we only look values up.
#[derive(Debug, Clone)]
pub struct ManagerContext {
    /// Name of the manager instance running this job step
    pub manager_name: String,
    /// Debug verbosity: 0 quiet, 1 normal, 2+ chatty (backlog stats etc.)
    pub debug_level: u8,
    /// When true, every job owns an isolated private working directory
    /// and failed-results archival is pointless (and skipped).
    pub isolated_working_dirs: bool,
    /// Human-readable "job 12345, step 3 (MSGFPlus)" style description
    pub job_tool_description: String,
    params: HashMap<String, String>,
}

impl Default for ManagerContext {
    fn default() -> Self {
        Self {
            manager_name: "unknown-manager".to_string(),
            debug_level: 1,
            isolated_working_dirs: false,
            job_tool_description: String::new(),
            params: HashMap::new(),
        }
    }
}

impl ManagerContext {
    pub fn new(manager_name: impl Into<String>) -> Self {
        Self {
            manager_name: manager_name.into(),
            ..Default::default()
        }
    }

    pub fn with_debug_level(mut self, level: u8) -> Self {
        self.debug_level = level;
        self
    }

    pub fn with_isolated_working_dirs(mut self, isolated: bool) -> Self {
        self.isolated_working_dirs = isolated;
        self
    }

    pub fn with_job_tool_description(mut self, description: impl Into<String>) -> Self {
        self.job_tool_description = description.into();
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Look up a job/step parameter by name
    pub fn get_param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Parameter lookup with a fallback for optional settings
    pub fn get_param_or(&self, key: &str, default: &'static str) -> String {
        self.params
            .get(key)
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }

    pub fn current_job_tool_description(&self) -> &str {
        &self.job_tool_description
    }
}
