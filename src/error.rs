use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StagehandError {
    /// The source file or directory was missing before the first attempt.
    /// No retry attempts are consumed for this.
    #[error("Source path not found: {}", .0.display())]
    MissingSource(PathBuf),

    /// The parent of the destination could not be found.
    #[error("Parent directory not found for: {}", .0.display())]
    MissingParent(PathBuf),

    /// An empty or unusable path was supplied.
    #[error("Empty path supplied for {0}")]
    EmptyPath(&'static str),

    /// The destination exists and overwriting was not requested. Never
    /// retried: the destination may be a partial write from an earlier
    /// failed attempt, and retrying could clobber real data.
    #[error("Would overwrite existing file: {}", .0.display())]
    WouldOverwrite(PathBuf),

    /// Every attempt in the retry budget failed.
    #[error("Excessive failures during {operation} ({attempts} attempts): {last_error}")]
    ExcessiveFailures {
        operation: String,
        attempts: u32,
        last_error: String,
    },

    /// Processing was cancelled via the cooperative abort token.
    #[error("Operation aborted: {0}")]
    Aborted(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StagehandError {
    /// Only raw I/O errors are worth another attempt; everything else is
    /// a precondition or a terminal classification.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StagehandError::Io(_))
    }
}

pub type Result<T> = std::result::Result<T, StagehandError>;
