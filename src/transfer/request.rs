use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::{DEFAULT_MAX_RETRY_COUNT, DEFAULT_RETRY_HOLDOFF};

const MIN_RETRY_COUNT: u32 = 1;
const MIN_HOLDOFF: Duration = Duration::from_secs(1);

/// One source-to-destination transfer, immutable for the call's duration.
///
/// The constructor clamps the retry budget and holdoff up to their
/// minimums, so every constructed request satisfies
/// `max_retry_count >= 1` and `retry_holdoff >= 1s`.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub overwrite: bool,
    pub max_retry_count: u32,
    pub retry_holdoff: Duration,
    pub increase_holdoff_on_each_retry: bool,
}

impl TransferRequest {
    pub fn new(source: impl AsRef<Path>, destination: impl AsRef<Path>) -> Self {
        Self {
            source: source.as_ref().to_path_buf(),
            destination: destination.as_ref().to_path_buf(),
            overwrite: false,
            max_retry_count: DEFAULT_MAX_RETRY_COUNT,
            retry_holdoff: DEFAULT_RETRY_HOLDOFF,
            increase_holdoff_on_each_retry: false,
        }
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn with_max_retry_count(mut self, count: u32) -> Self {
        self.max_retry_count = count.max(MIN_RETRY_COUNT);
        self
    }

    pub fn with_retry_holdoff(mut self, holdoff: Duration) -> Self {
        self.retry_holdoff = holdoff.max(MIN_HOLDOFF);
        self
    }

    pub fn with_escalating_holdoff(mut self, escalate: bool) -> Self {
        self.increase_holdoff_on_each_retry = escalate;
        self
    }

    /// Total attempts this request allows (initial try plus retries)
    pub fn total_attempts(&self) -> u32 {
        self.max_retry_count + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_applied() {
        let req = TransferRequest::new("/data/a.raw", "/proto/xfer/a.raw");
        assert!(!req.overwrite);
        assert_eq!(req.max_retry_count, 3);
        assert_eq!(req.retry_holdoff, Duration::from_secs(15));
        assert!(!req.increase_holdoff_on_each_retry);
        assert_eq!(req.total_attempts(), 4);
    }

    #[test]
    fn retry_count_clamped_to_one() {
        let req = TransferRequest::new("a", "b").with_max_retry_count(0);
        assert_eq!(req.max_retry_count, 1);
        assert_eq!(req.total_attempts(), 2);
    }

    #[test]
    fn holdoff_clamped_to_one_second() {
        let req = TransferRequest::new("a", "b").with_retry_holdoff(Duration::from_millis(200));
        assert_eq!(req.retry_holdoff, Duration::from_secs(1));
    }

    #[test]
    fn explicit_values_kept() {
        let req = TransferRequest::new("a", "b")
            .with_overwrite(true)
            .with_max_retry_count(10)
            .with_retry_holdoff(Duration::from_secs(5))
            .with_escalating_holdoff(true);
        assert!(req.overwrite);
        assert_eq!(req.max_retry_count, 10);
        assert_eq!(req.retry_holdoff, Duration::from_secs(5));
        assert!(req.increase_holdoff_on_each_retry);
    }
}
