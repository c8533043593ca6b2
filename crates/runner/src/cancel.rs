use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Cooperative cancellation flag shared between an ensemble and its runs
///
/// Runs check the handle between steps; a step in progress always completes.
/// A failing run only stops runs with a higher index, so every run below the
/// first failure still gets to complete or fail on its own.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
    failed_run: Arc<AtomicUsize>,
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            failed_run: Arc::new(AtomicUsize::new(usize::MAX)),
        }
    }
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Record that `run_index` failed; keeps the lowest index seen
    pub(crate) fn fail(&self, run_index: usize) {
        self.failed_run.fetch_min(run_index, Ordering::AcqRel);
    }

    /// Whether the run at `run_index` should stop before its next step
    pub(crate) fn stops(&self, run_index: usize) -> bool {
        self.is_cancelled() || self.failed_run.load(Ordering::Acquire) < run_index
    }

    pub(crate) fn reset(&self) {
        self.flag.store(false, Ordering::Release);
        self.failed_run.store(usize::MAX, Ordering::Release);
    }
}
