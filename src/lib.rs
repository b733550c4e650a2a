//! Resilient execution core for a pluggable scientific-data job runner.
//!
//! Moves result files reliably across unreliable shared network storage,
//! throttles its logging cooperatively while waiting on the fleet's
//! lock-file queue, preserves failed job output for postmortem
//! diagnosis, and defines the two-phase contract (resource staging, tool
//! execution) that pluggable analysis steps satisfy, including handoff
//! to a remote execution host.

pub mod archive;
pub mod config;
pub mod error;
pub mod lockwait;
pub mod step;
pub mod transfer;

pub use error::{Result, StagehandError};
