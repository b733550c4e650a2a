//! Job-step lifecycle and the two-phase plugin contract.
//!
//! A pluggable analysis step satisfies two capability sets:
//! - [`ResourceStager`]: gather input files and parameters before the
//!   tool runs (optionally staging a subset onto a remote host)
//! - [`ToolRunner`]: run the analysis tool, expose live progress, and
//!   move final output to the transfer location
//!
//! [`JobStepLifecycle`] drives both against the state machine
//! `Created -> Staging -> Executing -> [remote dispatch/retrieve/post]
//! -> ResultsTransferred -> Done`, short-circuiting on any failure or
//! abort and handing the working results to the failed-results archiver
//! before reporting the terminal [`JobStepOutcome`].

pub mod lifecycle;
pub mod outcome;
pub mod plugin;

pub use lifecycle::{JobStepLifecycle, StepState};
pub use outcome::{CloseOut, JobStepOutcome};
pub use plugin::{RemoteTransferUtility, ResourceStager, StatusReporter, ToolRunner};
