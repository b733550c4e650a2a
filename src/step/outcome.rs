use serde::{Deserialize, Serialize};

/// Terminal classification of a job-step phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseOut {
    Success,
    Failed,
    /// Inputs were not ready; the step should be tried again later
    SkippedNotReady,
    Aborted,
}

impl std::fmt::Display for CloseOut {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseOut::Success => write!(f, "success"),
            CloseOut::Failed => write!(f, "failed"),
            CloseOut::SkippedNotReady => write!(f, "skipped (not ready)"),
            CloseOut::Aborted => write!(f, "aborted"),
        }
    }
}

impl CloseOut {
    pub fn is_terminal_failure(&self) -> bool {
        matches!(self, CloseOut::Failed | CloseOut::Aborted)
    }
}

/// Outcome of one job step, created at step start and mutated by the
/// plugin and the lifecycle wrapper as the step progresses.
///
/// `eval_code`/`eval_message` classify the result orthogonally to
/// pass/fail ("completed but with a quality warning"). The message field
/// accumulates: nested failures append their text rather than replacing
/// what an earlier phase reported.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStepOutcome {
    pub close_out: CloseOut,
    pub message: String,
    pub eval_code: i32,
    pub eval_message: String,
    pub insufficient_free_memory: bool,
    pub need_to_abort_processing: bool,
    pub progress_percent: f32,
}

impl Default for JobStepOutcome {
    fn default() -> Self {
        Self {
            close_out: CloseOut::Success,
            message: String::new(),
            eval_code: 0,
            eval_message: String::new(),
            insufficient_free_memory: false,
            need_to_abort_processing: false,
            progress_percent: 0.0,
        }
    }
}

impl JobStepOutcome {
    pub fn success() -> Self {
        Self::default()
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            close_out: CloseOut::Failed,
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn skipped_not_ready(message: impl Into<String>) -> Self {
        Self {
            close_out: CloseOut::SkippedNotReady,
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn aborted(message: impl Into<String>) -> Self {
        Self {
            close_out: CloseOut::Aborted,
            message: message.into(),
            ..Default::default()
        }
    }

    /// Append to the accumulated step message; earlier text is kept
    pub fn append_message(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if !self.message.is_empty() {
            self.message.push_str("; ");
        }
        self.message.push_str(text);
    }

    /// Orchestrators must abort the pipeline when either flag is set,
    /// regardless of the returned close-out.
    pub fn requires_abort(&self) -> bool {
        self.insufficient_free_memory || self.need_to_abort_processing
    }

    /// Fold a phase outcome into this step-level one: messages and eval
    /// data accumulate, flags latch on.
    pub fn absorb(&mut self, phase: &JobStepOutcome) {
        self.append_message(&phase.message);
        if phase.eval_code != 0 {
            self.eval_code = phase.eval_code;
        }
        if !phase.eval_message.is_empty() {
            self.eval_message = phase.eval_message.clone();
        }
        self.insufficient_free_memory |= phase.insufficient_free_memory;
        self.need_to_abort_processing |= phase.need_to_abort_processing;
        if phase.progress_percent > self.progress_percent {
            self.progress_percent = phase.progress_percent;
        }
    }
}
