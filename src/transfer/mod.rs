//! Resilient movement of result files across unreliable shared storage.
//!
//! Every operation here runs under a bounded-attempt retry engine:
//! - **Retry engine** ([`retry`]): transient I/O failures are retried up
//!   to `max_retry_count + 1` total attempts with an optional escalating
//!   holdoff; precondition and would-overwrite failures never are.
//! - **Requests** ([`request`]): one immutable [`TransferRequest`] per
//!   source/destination pair, with its budget clamped to sane minimums.
//! - **Operations** ([`ops`]): [`FileOps`] provides copy-file,
//!   create-directory, directory-exists, and the sequential depth-first
//!   directory-tree copy.
//!
//! # Concurrency
//!
//! One operation at a time, one attempt at a time. Fleet-level
//! coordination against the shared file server belongs to the external
//! lock-file queue; this crate only observes it (see [`crate::lockwait`]).

pub mod ops;
pub mod request;
pub mod retry;

pub use ops::{CopyStats, FileOps, TransferEvents};
pub use request::TransferRequest;
pub use retry::{holdoff_schedule, run_with_retry};
